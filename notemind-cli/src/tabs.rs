//! Client-side tab and conversation cache state.
//!
//! The [`TabManager`] owns the list of open tabs, the active tab and a cache
//! of conversations keyed by id. A cache entry lives exactly as long as at
//! least one tab references its conversation. Every mutation is announced on
//! a broadcast channel so views can redraw without polling.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use notemind_core::MessageRole;
use notemind_core::api::{ConversationPatch, ConversationResponse, MessageResponse};

use crate::api::ApiClientError;

/// Title given to tabs that have no conversation yet
pub const NEW_CHAT_TITLE: &str = "New Chat";

const EVENT_CAPACITY: usize = 64;

/// Where the tab manager reads conversations from
#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// Conversation metadata, without messages.
    async fn fetch_conversation(&self, id: &str) -> Result<ConversationResponse, ApiClientError>;

    /// All messages of a conversation in sequence order.
    async fn fetch_messages(&self, id: &str) -> Result<Vec<MessageResponse>, ApiClientError>;
}

pub type TabId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    pub id: TabId,
    /// `None` until the first message creates the conversation
    pub conversation_id: Option<String>,
    pub title: String,
}

impl Tab {
    pub fn is_new(&self) -> bool {
        self.conversation_id.is_none()
    }
}

/// Whether a cached message is a local optimistic copy or a server record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    Provisional { local_id: u64 },
    Confirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedMessage {
    pub message: MessageResponse,
    pub origin: MessageOrigin,
}

impl CachedMessage {
    fn confirmed(message: MessageResponse) -> Self {
        Self {
            message,
            origin: MessageOrigin::Confirmed,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self.origin, MessageOrigin::Provisional { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub conversation: ConversationResponse,
    pub messages: Vec<CachedMessage>,
}

impl CacheEntry {
    fn new(mut conversation: ConversationResponse, messages: Vec<MessageResponse>) -> Self {
        conversation.messages = None;
        Self {
            conversation,
            messages: messages.into_iter().map(CachedMessage::confirmed).collect(),
        }
    }
}

/// Notifications sent to subscribers after each mutation
#[derive(Debug, Clone, PartialEq)]
pub enum TabEvent {
    Opened {
        tab: TabId,
        conversation_id: Option<String>,
    },
    Closed {
        tab: TabId,
    },
    Activated {
        tab: Option<TabId>,
    },
    Retitled {
        tab: TabId,
        title: String,
    },
    CacheUpdated {
        conversation_id: String,
    },
    CacheEvicted {
        conversation_id: String,
    },
}

/// An open whose fetch is still in flight.
///
/// The tab id is reserved up front; closing it before [`TabManager::complete_open`]
/// runs makes the completion a no-op.
#[derive(Debug)]
pub struct PendingOpen {
    tab: TabId,
    conversation_id: String,
}

impl PendingOpen {
    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

/// First half of an open: either done already or waiting on a fetch
#[derive(Debug)]
pub enum OpenStep {
    Ready(TabId),
    Fetch(PendingOpen),
}

pub struct TabManager {
    tabs: Vec<Tab>,
    active: Option<TabId>,
    cache: HashMap<String, CacheEntry>,
    pending: HashMap<TabId, String>,
    next_tab_id: TabId,
    next_local_id: u64,
    events: broadcast::Sender<TabEvent>,
}

impl Default for TabManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TabManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tabs: Vec::new(),
            active: None,
            cache: HashMap::new(),
            pending: HashMap::new(),
            next_tab_id: 1,
            next_local_id: 1,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }

    /// Open tabs, oldest first.
    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn tab(&self, tab_id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == tab_id)
    }

    pub fn active_tab_id(&self) -> Option<TabId> {
        self.active
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active.and_then(|id| self.tab(id))
    }

    pub fn cached(&self, conversation_id: &str) -> Option<&CacheEntry> {
        self.cache.get(conversation_id)
    }

    pub fn is_cached(&self, conversation_id: &str) -> bool {
        self.cache.contains_key(conversation_id)
    }

    /// Cache entry behind the active tab, if it has a conversation.
    pub fn active_entry(&self) -> Option<&CacheEntry> {
        self.active_tab()
            .and_then(|tab| tab.conversation_id.as_deref())
            .and_then(|id| self.cache.get(id))
    }

    fn notify(&self, event: TabEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn allocate_tab_id(&mut self) -> TabId {
        let id = self.next_tab_id;
        self.next_tab_id += 1;
        id
    }

    fn activate(&mut self, tab: Option<TabId>) {
        if self.active != tab {
            self.active = tab;
            self.notify(TabEvent::Activated { tab });
        }
    }

    fn push_tab(&mut self, id: TabId, conversation_id: Option<String>, title: String) {
        self.tabs.push(Tab {
            id,
            conversation_id: conversation_id.clone(),
            title,
        });
        self.notify(TabEvent::Opened {
            tab: id,
            conversation_id,
        });
        self.activate(Some(id));
    }

    fn retitle(&mut self, conversation_id: &str, title: &str) {
        let mut changed = Vec::new();
        for tab in &mut self.tabs {
            if tab.conversation_id.as_deref() == Some(conversation_id) && tab.title != title {
                tab.title = title.to_string();
                changed.push(tab.id);
            }
        }
        for tab in changed {
            self.notify(TabEvent::Retitled {
                tab,
                title: title.to_string(),
            });
        }
    }

    /// Start opening `conversation_id`.
    ///
    /// An existing tab is activated and a cached conversation gets a tab
    /// right away. Otherwise a tab id is reserved and the caller has to fetch
    /// and hand the result to [`complete_open`](Self::complete_open).
    pub fn begin_open(&mut self, conversation_id: &str) -> OpenStep {
        if let Some(tab) = self
            .tabs
            .iter()
            .find(|tab| tab.conversation_id.as_deref() == Some(conversation_id))
        {
            let id = tab.id;
            self.activate(Some(id));
            return OpenStep::Ready(id);
        }

        if let Some(entry) = self.cache.get(conversation_id) {
            let title = entry.conversation.title.clone();
            let id = self.allocate_tab_id();
            self.push_tab(id, Some(conversation_id.to_string()), title);
            return OpenStep::Ready(id);
        }

        let tab = self.allocate_tab_id();
        self.pending.insert(tab, conversation_id.to_string());
        OpenStep::Fetch(PendingOpen {
            tab,
            conversation_id: conversation_id.to_string(),
        })
    }

    /// Apply a fetched conversation to a pending open.
    ///
    /// Returns `None` when the reserved tab was closed while the fetch ran.
    pub fn complete_open(
        &mut self,
        pending: PendingOpen,
        conversation: ConversationResponse,
        messages: Vec<MessageResponse>,
    ) -> Option<TabId> {
        if self.pending.remove(&pending.tab).is_none() {
            debug!(
                "Dropping fetched conversation {}: tab {} was closed",
                pending.conversation_id, pending.tab
            );
            return None;
        }

        let id = pending.conversation_id;
        let title = conversation.title.clone();
        self.cache
            .insert(id.clone(), CacheEntry::new(conversation, messages));
        self.notify(TabEvent::CacheUpdated {
            conversation_id: id.clone(),
        });

        // A concurrent open of the same id may have finished first
        if let Some(existing) = self
            .tabs
            .iter()
            .find(|tab| tab.conversation_id.as_deref() == Some(id.as_str()))
            .map(|tab| tab.id)
        {
            self.retitle(&id, &title);
            self.activate(Some(existing));
            return Some(existing);
        }

        self.push_tab(pending.tab, Some(id), title);
        Some(pending.tab)
    }

    /// Give up on a pending open; nothing was created for it.
    pub fn abort_open(&mut self, pending: PendingOpen) {
        self.pending.remove(&pending.tab);
    }

    /// Open a conversation in a tab, fetching it if it is not cached.
    ///
    /// Returns `Ok(None)` if the open was superseded before the fetch resolved.
    pub async fn open_conversation(
        &mut self,
        source: &dyn ConversationSource,
        conversation_id: &str,
    ) -> Result<Option<TabId>, ApiClientError> {
        let pending = match self.begin_open(conversation_id) {
            OpenStep::Ready(tab) => return Ok(Some(tab)),
            OpenStep::Fetch(pending) => pending,
        };

        match fetch_pair(source, conversation_id).await {
            Ok((conversation, messages)) => {
                Ok(self.complete_open(pending, conversation, messages))
            }
            Err(e) => {
                self.abort_open(pending);
                Err(e)
            }
        }
    }

    /// Close a tab, evicting its conversation when no other tab shows it.
    ///
    /// Closing a reserved tab cancels its pending open.
    pub fn close_tab(&mut self, tab_id: TabId) -> bool {
        if self.pending.remove(&tab_id).is_some() {
            debug!("Cancelled pending open for tab {}", tab_id);
            return true;
        }

        let Some(index) = self.tabs.iter().position(|tab| tab.id == tab_id) else {
            return false;
        };
        let tab = self.tabs.remove(index);
        self.notify(TabEvent::Closed { tab: tab_id });

        if let Some(conversation_id) = tab.conversation_id
            && !self
                .tabs
                .iter()
                .any(|t| t.conversation_id.as_deref() == Some(conversation_id.as_str()))
            && self.cache.remove(&conversation_id).is_some()
        {
            self.notify(TabEvent::CacheEvicted { conversation_id });
        }

        if self.active == Some(tab_id) {
            let next = self.tabs.last().map(|t| t.id);
            self.activate(next);
        }
        true
    }

    /// Activate a tab. Unknown ids are ignored.
    pub fn switch_tab(&mut self, tab_id: TabId) -> bool {
        if self.tab(tab_id).is_none() {
            debug!("Ignoring switch to unknown tab {}", tab_id);
            return false;
        }
        self.activate(Some(tab_id));
        true
    }

    /// Open a blank tab for a conversation that does not exist yet.
    pub fn create_new_conversation(&mut self) -> TabId {
        let id = self.allocate_tab_id();
        self.push_tab(id, None, NEW_CHAT_TITLE.to_string());
        id
    }

    /// Attach a freshly created conversation to the tab it was started from.
    ///
    /// Only new tabs take a conversation; a tab that already shows one is
    /// left alone so its cache entry keeps a referencing tab.
    pub fn update_tab_conversation_id(
        &mut self,
        tab_id: TabId,
        mut conversation: ConversationResponse,
    ) -> bool {
        let Some(tab) = self.tabs.iter_mut().find(|tab| tab.id == tab_id) else {
            debug!(
                "Tab {} closed before conversation {} was created",
                tab_id, conversation.id
            );
            return false;
        };
        if let Some(current) = &tab.conversation_id {
            debug!(
                "Tab {} already shows {}, not attaching {}",
                tab_id, current, conversation.id
            );
            return false;
        }

        let id = conversation.id.clone();
        let title = conversation.title.clone();
        tab.conversation_id = Some(id.clone());
        tab.title = title.clone();

        let messages = conversation.messages.take().unwrap_or_default();
        self.cache
            .insert(id.clone(), CacheEntry::new(conversation, messages));
        self.notify(TabEvent::Retitled { tab: tab_id, title });
        self.notify(TabEvent::CacheUpdated {
            conversation_id: id,
        });
        true
    }

    /// Go back to the overview; tabs and cache are kept.
    pub fn clear_active_tab(&mut self) {
        self.activate(None);
    }

    /// Record a confirmed message and merge updated metadata.
    ///
    /// Messages for conversations that are not cached are dropped.
    pub fn update_conversation_after_message(
        &mut self,
        conversation_id: &str,
        message: MessageResponse,
        patch: &ConversationPatch,
    ) -> bool {
        let Some(entry) = self.cache.get_mut(conversation_id) else {
            debug!(
                "Dropping message for uncached conversation {}",
                conversation_id
            );
            return false;
        };

        entry.messages.push(CachedMessage::confirmed(message));
        patch.apply(&mut entry.conversation);
        if let Some(title) = &patch.title {
            self.retitle(conversation_id, title);
        }
        self.notify(TabEvent::CacheUpdated {
            conversation_id: conversation_id.to_string(),
        });
        true
    }

    /// Re-fetch a cached conversation and overwrite its entry.
    pub async fn refresh_conversation(
        &mut self,
        source: &dyn ConversationSource,
        conversation_id: &str,
    ) -> Result<bool, ApiClientError> {
        let (conversation, messages) = fetch_pair(source, conversation_id).await?;
        Ok(self.apply_refresh(conversation_id, conversation, messages))
    }

    /// Overwrite a cache entry with fetched data. Uncached ids are ignored.
    pub fn apply_refresh(
        &mut self,
        conversation_id: &str,
        conversation: ConversationResponse,
        messages: Vec<MessageResponse>,
    ) -> bool {
        if !self.cache.contains_key(conversation_id) {
            debug!(
                "Ignoring refresh of evicted conversation {}",
                conversation_id
            );
            return false;
        }

        let title = conversation.title.clone();
        self.cache.insert(
            conversation_id.to_string(),
            CacheEntry::new(conversation, messages),
        );
        self.retitle(conversation_id, &title);
        self.notify(TabEvent::CacheUpdated {
            conversation_id: conversation_id.to_string(),
        });
        true
    }

    /// Show a user message before the server has stored it.
    ///
    /// Returns the local id used to confirm or roll it back.
    pub fn push_provisional(&mut self, conversation_id: &str, content: &str) -> Option<u64> {
        let local_id = self.next_local_id;
        let entry = self.cache.get_mut(conversation_id)?;
        self.next_local_id += 1;

        let sequence_number = entry
            .messages
            .last()
            .map(|m| m.message.sequence_number + 1)
            .unwrap_or(0);
        entry.messages.push(CachedMessage {
            message: MessageResponse {
                id: format!("local-{}", Uuid::new_v4()),
                conversation_id: conversation_id.to_string(),
                role: MessageRole::User,
                content: content.to_string(),
                timestamp: Utc::now(),
                tokens_used: 0,
                sequence_number,
            },
            origin: MessageOrigin::Provisional { local_id },
        });
        self.notify(TabEvent::CacheUpdated {
            conversation_id: conversation_id.to_string(),
        });
        Some(local_id)
    }

    /// Swap a provisional message for the stored record, in place.
    pub fn confirm_provisional(
        &mut self,
        conversation_id: &str,
        local_id: u64,
        confirmed: MessageResponse,
    ) -> bool {
        let Some(slot) = self.provisional_mut(conversation_id, local_id) else {
            return false;
        };
        *slot = CachedMessage::confirmed(confirmed);
        self.notify(TabEvent::CacheUpdated {
            conversation_id: conversation_id.to_string(),
        });
        true
    }

    /// Remove a provisional message after a failed send.
    pub fn rollback_provisional(&mut self, conversation_id: &str, local_id: u64) -> bool {
        let Some(entry) = self.cache.get_mut(conversation_id) else {
            return false;
        };
        let before = entry.messages.len();
        entry
            .messages
            .retain(|m| m.origin != MessageOrigin::Provisional { local_id });
        if entry.messages.len() == before {
            return false;
        }
        self.notify(TabEvent::CacheUpdated {
            conversation_id: conversation_id.to_string(),
        });
        true
    }

    fn provisional_mut(
        &mut self,
        conversation_id: &str,
        local_id: u64,
    ) -> Option<&mut CachedMessage> {
        self.cache
            .get_mut(conversation_id)?
            .messages
            .iter_mut()
            .find(|m| m.origin == MessageOrigin::Provisional { local_id })
    }
}

/// Fetch metadata and messages together; either failure fails both.
async fn fetch_pair(
    source: &dyn ConversationSource,
    conversation_id: &str,
) -> Result<(ConversationResponse, Vec<MessageResponse>), ApiClientError> {
    tokio::try_join!(
        source.fetch_conversation(conversation_id),
        source.fetch_messages(conversation_id)
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::DateTime;
    use notemind_core::{ContextUsage, LlmProvider};

    use super::*;

    fn conversation(id: &str, title: &str) -> ConversationResponse {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        ConversationResponse {
            id: id.to_string(),
            user_id: "user_1".to_string(),
            title: title.to_string(),
            provider: LlmProvider::OpenAi,
            model_name: "gpt-4o".to_string(),
            folder_id: None,
            message_count: 2,
            usage: ContextUsage::compute(30, 128_000),
            created_at: at,
            updated_at: at,
            messages: None,
        }
    }

    fn message(conversation_id: &str, sequence_number: u32, role: MessageRole) -> MessageResponse {
        MessageResponse {
            id: format!("{}-msg-{}", conversation_id, sequence_number),
            conversation_id: conversation_id.to_string(),
            role,
            content: format!("message {}", sequence_number),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            tokens_used: 15,
            sequence_number,
        }
    }

    #[derive(Default)]
    struct FakeSource {
        titles: Mutex<HashMap<String, String>>,
        conversation_fetches: AtomicUsize,
        message_fetches: AtomicUsize,
        fail_messages: AtomicBool,
    }

    impl FakeSource {
        fn with(ids: &[(&str, &str)]) -> Self {
            let source = Self::default();
            {
                let mut titles = source.titles.lock().unwrap();
                for (id, title) in ids {
                    titles.insert(id.to_string(), title.to_string());
                }
            }
            source
        }

        fn set_title(&self, id: &str, title: &str) {
            self.titles
                .lock()
                .unwrap()
                .insert(id.to_string(), title.to_string());
        }

        fn fetches(&self) -> (usize, usize) {
            (
                self.conversation_fetches.load(Ordering::SeqCst),
                self.message_fetches.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl ConversationSource for FakeSource {
        async fn fetch_conversation(
            &self,
            id: &str,
        ) -> Result<ConversationResponse, ApiClientError> {
            self.conversation_fetches.fetch_add(1, Ordering::SeqCst);
            let title = self.titles.lock().unwrap().get(id).cloned();
            match title {
                Some(title) => Ok(conversation(id, &title)),
                None => Err(ApiClientError::Api {
                    status: 404,
                    message: "Conversation not found".to_string(),
                }),
            }
        }

        async fn fetch_messages(&self, id: &str) -> Result<Vec<MessageResponse>, ApiClientError> {
            self.message_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_messages.load(Ordering::SeqCst) {
                return Err(ApiClientError::Api {
                    status: 500,
                    message: "Internal server error".to_string(),
                });
            }
            Ok(vec![
                message(id, 0, MessageRole::User),
                message(id, 1, MessageRole::Assistant),
            ])
        }
    }

    fn drain(rx: &mut broadcast::Receiver<TabEvent>) -> Vec<TabEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_open_fetches_and_activates() {
        let source = FakeSource::with(&[("c1", "First")]);
        let mut tabs = TabManager::new();

        let tab = tabs.open_conversation(&source, "c1").await.unwrap().unwrap();

        assert_eq!(tabs.active_tab_id(), Some(tab));
        assert_eq!(tabs.active_tab().unwrap().title, "First");
        let entry = tabs.cached("c1").unwrap();
        assert_eq!(entry.messages.len(), 2);
        assert!(entry.conversation.messages.is_none());
        assert_eq!(source.fetches(), (1, 1));
    }

    #[tokio::test]
    async fn test_open_existing_tab_does_not_fetch() {
        let source = FakeSource::with(&[("c1", "First"), ("c2", "Second")]);
        let mut tabs = TabManager::new();

        let first = tabs.open_conversation(&source, "c1").await.unwrap();
        tabs.open_conversation(&source, "c2").await.unwrap();
        let again = tabs.open_conversation(&source, "c1").await.unwrap();

        assert_eq!(first, again);
        assert_eq!(tabs.tabs().len(), 2);
        assert_eq!(tabs.active_tab_id(), first);
        assert_eq!(source.fetches(), (2, 2));
    }

    #[tokio::test]
    async fn test_partial_fetch_failure_creates_nothing() {
        let source = FakeSource::with(&[("c1", "First")]);
        source.fail_messages.store(true, Ordering::SeqCst);
        let mut tabs = TabManager::new();

        let err = tabs.open_conversation(&source, "c1").await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert!(tabs.tabs().is_empty());
        assert!(!tabs.is_cached("c1"));
        assert_eq!(tabs.active_tab_id(), None);
    }

    #[tokio::test]
    async fn test_open_unknown_conversation() {
        let source = FakeSource::default();
        let mut tabs = TabManager::new();

        let err = tabs.open_conversation(&source, "missing").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(tabs.tabs().is_empty());
    }

    #[tokio::test]
    async fn test_close_last_reference_evicts_and_reopen_fetches() {
        let source = FakeSource::with(&[("c1", "First")]);
        let mut tabs = TabManager::new();

        let tab = tabs.open_conversation(&source, "c1").await.unwrap().unwrap();
        assert!(tabs.close_tab(tab));
        assert!(!tabs.is_cached("c1"));
        assert_eq!(tabs.active_tab_id(), None);

        tabs.open_conversation(&source, "c1").await.unwrap();
        assert_eq!(source.fetches(), (2, 2));
    }

    #[tokio::test]
    async fn test_close_active_activates_most_recent() {
        let source = FakeSource::with(&[("c1", "A"), ("c2", "B"), ("c3", "C")]);
        let mut tabs = TabManager::new();

        let a = tabs.open_conversation(&source, "c1").await.unwrap().unwrap();
        let b = tabs.open_conversation(&source, "c2").await.unwrap().unwrap();
        let c = tabs.open_conversation(&source, "c3").await.unwrap().unwrap();

        tabs.switch_tab(a);
        tabs.close_tab(a);
        assert_eq!(tabs.active_tab_id(), Some(c));

        // Closing an inactive tab leaves the active one alone
        tabs.close_tab(b);
        assert_eq!(tabs.active_tab_id(), Some(c));
        assert!(tabs.is_cached("c3"));
        assert!(!tabs.is_cached("c2"));
    }

    #[test]
    fn test_shared_conversation_survives_closing_one_tab() {
        let mut tabs = TabManager::new();
        let OpenStep::Fetch(pending) = tabs.begin_open("c1") else {
            panic!("expected a fetch");
        };
        let first = tabs
            .complete_open(pending, conversation("c1", "Shared"), vec![])
            .unwrap();

        // A second tab on the same conversation, built through a new chat
        let second = tabs.create_new_conversation();
        tabs.update_tab_conversation_id(second, conversation("c1", "Shared"));

        tabs.close_tab(first);
        assert!(tabs.is_cached("c1"));
        tabs.close_tab(second);
        assert!(!tabs.is_cached("c1"));
    }

    #[test]
    fn test_closed_before_fetch_resolves_is_ignored() {
        let mut tabs = TabManager::new();
        let OpenStep::Fetch(pending) = tabs.begin_open("c1") else {
            panic!("expected a fetch");
        };

        assert!(tabs.close_tab(pending.tab()));
        let result = tabs.complete_open(pending, conversation("c1", "Late"), vec![]);

        assert_eq!(result, None);
        assert!(tabs.tabs().is_empty());
        assert!(!tabs.is_cached("c1"));
    }

    #[test]
    fn test_duplicate_fetches_converge() {
        let mut tabs = TabManager::new();
        let OpenStep::Fetch(first) = tabs.begin_open("c1") else {
            panic!("expected a fetch");
        };
        let OpenStep::Fetch(second) = tabs.begin_open("c1") else {
            panic!("expected a second fetch");
        };

        let a = tabs.complete_open(first, conversation("c1", "Old"), vec![]);
        let b = tabs.complete_open(
            second,
            conversation("c1", "New"),
            vec![message("c1", 0, MessageRole::User)],
        );

        assert_eq!(a, b);
        assert_eq!(tabs.tabs().len(), 1);
        assert_eq!(tabs.tabs()[0].title, "New");
        assert_eq!(tabs.cached("c1").unwrap().messages.len(), 1);
    }

    #[test]
    fn test_switch_to_unknown_tab_is_noop() {
        let mut tabs = TabManager::new();
        let tab = tabs.create_new_conversation();

        assert!(!tabs.switch_tab(999));
        assert_eq!(tabs.active_tab_id(), Some(tab));
    }

    #[test]
    fn test_new_conversation_tab() {
        let mut tabs = TabManager::new();
        let tab = tabs.create_new_conversation();

        let current = tabs.active_tab().unwrap();
        assert_eq!(current.id, tab);
        assert!(current.is_new());
        assert_eq!(current.title, NEW_CHAT_TITLE);
        assert!(tabs.active_entry().is_none());

        let mut created = conversation("c9", "Fresh title");
        created.messages = Some(vec![
            message("c9", 0, MessageRole::User),
            message("c9", 1, MessageRole::Assistant),
        ]);
        assert!(tabs.update_tab_conversation_id(tab, created));

        let current = tabs.active_tab().unwrap();
        assert_eq!(current.conversation_id.as_deref(), Some("c9"));
        assert_eq!(current.title, "Fresh title");
        let entry = tabs.active_entry().unwrap();
        assert_eq!(entry.messages.len(), 2);
        assert!(entry.conversation.messages.is_none());
    }

    #[test]
    fn test_update_closed_new_tab_is_dropped() {
        let mut tabs = TabManager::new();
        let tab = tabs.create_new_conversation();
        tabs.close_tab(tab);

        assert!(!tabs.update_tab_conversation_id(tab, conversation("c1", "Gone")));
        assert!(!tabs.is_cached("c1"));
    }

    #[test]
    fn test_attach_only_to_new_tab() {
        let mut tabs = TabManager::new();
        let tab = tabs.create_new_conversation();
        assert!(tabs.update_tab_conversation_id(tab, conversation("c1", "First")));

        assert!(!tabs.update_tab_conversation_id(tab, conversation("c2", "Second")));
        assert_eq!(tabs.tab(tab).unwrap().conversation_id.as_deref(), Some("c1"));
        assert_eq!(tabs.tab(tab).unwrap().title, "First");
        assert!(tabs.is_cached("c1"));
        assert!(!tabs.is_cached("c2"));

        tabs.close_tab(tab);
        assert!(!tabs.is_cached("c1"));
        assert!(tabs.tabs().is_empty());
    }

    #[tokio::test]
    async fn test_clear_active_keeps_state() {
        let source = FakeSource::with(&[("c1", "First")]);
        let mut tabs = TabManager::new();
        let tab = tabs.open_conversation(&source, "c1").await.unwrap();

        tabs.clear_active_tab();
        assert_eq!(tabs.active_tab_id(), None);
        assert_eq!(tabs.tabs().len(), 1);
        assert!(tabs.is_cached("c1"));

        assert_eq!(tabs.open_conversation(&source, "c1").await.unwrap(), tab);
        assert_eq!(source.fetches(), (1, 1));
    }

    #[tokio::test]
    async fn test_message_update_merges_patch() {
        let source = FakeSource::with(&[("c1", "First")]);
        let mut tabs = TabManager::new();
        tabs.open_conversation(&source, "c1").await.unwrap();

        let patch = ConversationPatch {
            title: Some("Renamed".to_string()),
            message_count: Some(3),
            usage: Some(ContextUsage::compute(45, 128_000)),
            ..Default::default()
        };
        assert!(tabs.update_conversation_after_message(
            "c1",
            message("c1", 2, MessageRole::Assistant),
            &patch
        ));

        let entry = tabs.cached("c1").unwrap();
        assert_eq!(entry.messages.len(), 3);
        assert_eq!(entry.conversation.message_count, 3);
        assert_eq!(entry.conversation.usage.total_tokens_used, 45);
        assert_eq!(tabs.active_tab().unwrap().title, "Renamed");
    }

    #[test]
    fn test_message_for_uncached_conversation_is_dropped() {
        let mut tabs = TabManager::new();
        let mut rx = tabs.subscribe();

        assert!(!tabs.update_conversation_after_message(
            "ghost",
            message("ghost", 0, MessageRole::User),
            &ConversationPatch::default()
        ));
        assert!(!tabs.is_cached("ghost"));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_syncs_titles() {
        let source = FakeSource::with(&[("c1", "Before")]);
        let mut tabs = TabManager::new();
        let tab = tabs.open_conversation(&source, "c1").await.unwrap().unwrap();
        let mut rx = tabs.subscribe();

        source.set_title("c1", "After");
        assert!(tabs.refresh_conversation(&source, "c1").await.unwrap());

        assert_eq!(tabs.tab(tab).unwrap().title, "After");
        assert_eq!(tabs.cached("c1").unwrap().conversation.title, "After");
        assert_eq!(
            drain(&mut rx),
            vec![
                TabEvent::Retitled {
                    tab,
                    title: "After".to_string()
                },
                TabEvent::CacheUpdated {
                    conversation_id: "c1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_refresh_of_evicted_conversation_is_ignored() {
        let mut tabs = TabManager::new();
        assert!(!tabs.apply_refresh("c1", conversation("c1", "Late"), vec![]));
        assert!(!tabs.is_cached("c1"));
    }

    #[tokio::test]
    async fn test_provisional_confirm_replaces_in_place() {
        let source = FakeSource::with(&[("c1", "First")]);
        let mut tabs = TabManager::new();
        tabs.open_conversation(&source, "c1").await.unwrap();

        let local_id = tabs.push_provisional("c1", "hello").unwrap();
        let entry = tabs.cached("c1").unwrap();
        let pending = entry.messages.last().unwrap();
        assert!(pending.is_provisional());
        assert_eq!(pending.message.sequence_number, 2);
        assert_eq!(pending.message.content, "hello");

        let mut stored = message("c1", 2, MessageRole::User);
        stored.content = "hello".to_string();
        assert!(tabs.confirm_provisional("c1", local_id, stored.clone()));

        let entry = tabs.cached("c1").unwrap();
        assert_eq!(entry.messages.len(), 3);
        assert_eq!(entry.messages[2].origin, MessageOrigin::Confirmed);
        assert_eq!(entry.messages[2].message, stored);

        // Already confirmed
        assert!(!tabs.confirm_provisional("c1", local_id, stored));
    }

    #[tokio::test]
    async fn test_provisional_rollback() {
        let source = FakeSource::with(&[("c1", "First")]);
        let mut tabs = TabManager::new();
        tabs.open_conversation(&source, "c1").await.unwrap();

        let first = tabs.push_provisional("c1", "one").unwrap();
        let second = tabs.push_provisional("c1", "two").unwrap();
        assert_ne!(first, second);

        assert!(tabs.rollback_provisional("c1", first));
        let entry = tabs.cached("c1").unwrap();
        assert_eq!(entry.messages.len(), 3);
        assert_eq!(entry.messages[2].message.content, "two");
        assert!(!tabs.rollback_provisional("c1", first));
    }

    #[test]
    fn test_provisional_needs_cache_entry() {
        let mut tabs = TabManager::new();
        tabs.create_new_conversation();
        assert_eq!(tabs.push_provisional("c1", "hi"), None);
    }

    #[tokio::test]
    async fn test_events_follow_mutations() {
        let source = FakeSource::with(&[("c1", "First")]);
        let mut tabs = TabManager::new();
        let mut rx = tabs.subscribe();

        let tab = tabs.open_conversation(&source, "c1").await.unwrap().unwrap();
        tabs.close_tab(tab);

        assert_eq!(
            drain(&mut rx),
            vec![
                TabEvent::CacheUpdated {
                    conversation_id: "c1".to_string()
                },
                TabEvent::Opened {
                    tab,
                    conversation_id: Some("c1".to_string())
                },
                TabEvent::Activated { tab: Some(tab) },
                TabEvent::Closed { tab },
                TabEvent::CacheEvicted {
                    conversation_id: "c1".to_string()
                },
                TabEvent::Activated { tab: None },
            ]
        );
    }
}
