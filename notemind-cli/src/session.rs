use std::io::{self, Write};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use notemind_core::api::{
    ApiKeysUpdate, ConversationPatch, CreateConversationRequest, MaskedApiKeys, RegisterRequest,
    SendMessageRequest,
};
use notemind_core::model_registry;
use notemind_core::{ContextUsage, LlmProvider, MessageRole};

use crate::api::{ApiClient, ApiClientError};
use crate::commands::{Command, CommandError, HELP, SpaceCommand};
use crate::spaces::{SpaceError, SpaceTree};
use crate::tabs::{TabEvent, TabManager};

const LIST_LIMIT: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
}

fn usage_error(message: impl Into<String>) -> SessionError {
    SessionError::Usage(message.into())
}

#[derive(Debug)]
pub enum Flow {
    Continue,
    Quit,
}

/// Accounting line shown after each exchange.
pub fn format_usage(usage: &ContextUsage) -> String {
    format!(
        "{}/{} tokens, {:.1}%",
        usage.total_tokens_used, usage.total_context_size, usage.total_used_percentage
    )
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn describe_key(provider: LlmProvider, key: &Option<String>) {
    println!(
        "  {:<10} {}",
        provider.as_str(),
        key.as_deref().unwrap_or("(not set)")
    );
}

fn print_keys(keys: &MaskedApiKeys) {
    describe_key(LlmProvider::OpenAi, &keys.openai_api_key);
    describe_key(LlmProvider::Anthropic, &keys.anthropic_api_key);
    describe_key(LlmProvider::Google, &keys.google_api_key);
}

fn key_update(provider: LlmProvider, value: String) -> ApiKeysUpdate {
    let mut update = ApiKeysUpdate::default();
    match provider {
        LlmProvider::OpenAi => update.openai_api_key = Some(value),
        LlmProvider::Anthropic => update.anthropic_api_key = Some(value),
        LlmProvider::Google => update.google_api_key = Some(value),
    }
    update
}

/// One interactive client session
pub struct Session {
    api: ApiClient,
    tabs: TabManager,
    spaces: SpaceTree,
    events: broadcast::Receiver<TabEvent>,
    /// Conversation ids from the last `/list`, for `/open <n>`
    listing: Vec<String>,
    /// Model used when a new tab sends its first message
    draft_model: (LlmProvider, String),
    context_limit: u32,
}

impl Session {
    pub fn new(api: ApiClient, context_limit: u32) -> Self {
        let tabs = TabManager::new();
        let events = tabs.subscribe();
        Self {
            api,
            tabs,
            spaces: SpaceTree::new(),
            events,
            listing: Vec::new(),
            draft_model: (
                LlmProvider::OpenAi,
                model_registry::default_model(LlmProvider::OpenAi).to_string(),
            ),
            context_limit,
        }
    }

    /// Prompt shown before each input line.
    pub fn prompt_label(&self) -> String {
        match self.tabs.active_tab() {
            Some(tab) => format!("[{}]> ", tab.title),
            None => "> ".to_string(),
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => debug!("Tab event: {:?}", event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!("Skipped {} tab events", skipped);
                }
                Err(_) => break,
            }
        }
    }

    pub async fn handle(&mut self, line: &str) -> Result<Flow, SessionError> {
        let Some(command) = Command::parse(line)? else {
            return Ok(Flow::Continue);
        };

        let result = self.dispatch(command).await;
        self.drain_events();
        result
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow, SessionError> {
        match command {
            Command::Register => self.register().await?,
            Command::Login(email) => self.login(email).await?,
            Command::Me => {
                let user = self.api.me().await?;
                println!(
                    "{} {} <{}>, member since {}",
                    user.first_name,
                    user.last_name,
                    user.email,
                    user.created_at.format("%Y-%m-%d")
                );
            }
            Command::Keys => print_keys(&self.api.api_keys().await?),
            Command::SetKey { provider, key } => {
                print_keys(&self.api.update_api_keys(&key_update(provider, key)).await?);
            }
            Command::ClearKey(provider) => {
                let update = key_update(provider, String::new());
                print_keys(&self.api.update_api_keys(&update).await?);
            }
            Command::Models => self.models().await?,
            Command::Folders => {
                let folders = self.api.folders().await?;
                if folders.is_empty() {
                    println!("No folders.");
                }
                for folder in folders {
                    println!("  {}  {}", folder.id, folder.name);
                }
            }
            Command::NewFolder(name) => {
                let folder = self.api.create_folder(&name).await?;
                println!("Created folder {} ({})", folder.name, folder.id);
            }
            Command::List => self.list().await?,
            Command::Open(target) => self.open(&target).await?,
            Command::New => {
                self.tabs.create_new_conversation();
                let (provider, model) = &self.draft_model;
                println!("New chat on {} {}. Type a message to start.", provider, model);
            }
            Command::Tabs => self.print_tabs(),
            Command::Switch(n) => {
                let tab = self.tab_at(n)?;
                self.tabs.switch_tab(tab);
                self.print_history();
            }
            Command::Close(n) => {
                let tab = match n {
                    Some(n) => self.tab_at(n)?,
                    None => self
                        .tabs
                        .active_tab_id()
                        .ok_or_else(|| usage_error("No active tab"))?,
                };
                self.tabs.close_tab(tab);
            }
            Command::Back => self.tabs.clear_active_tab(),
            Command::Refresh => {
                let id = self.active_conversation_id()?;
                self.tabs.refresh_conversation(&self.api, &id).await?;
                self.print_history();
            }
            Command::Model { provider, model } => self.switch_model(provider, model).await?,
            Command::Limit(limit) => {
                if !notemind_core::context_budget::is_valid_limit(limit) {
                    return Err(usage_error(format!(
                        "Context limit must be within {}..={}",
                        notemind_core::context_budget::MIN_CONTEXT_LIMIT_TOKENS,
                        notemind_core::context_budget::MAX_CONTEXT_LIMIT_TOKENS
                    )));
                }
                self.context_limit = limit;
            }
            Command::History => self.print_history(),
            Command::Edit { sequence, text } => {
                let (conversation_id, message_id) = self.message_at(sequence)?;
                let message = self.api.edit_message(&message_id, &text).await?;
                println!("Edited message {} ({} tokens)", sequence, message.tokens_used);
                self.tabs
                    .refresh_conversation(&self.api, &conversation_id)
                    .await?;
            }
            Command::Remove(sequence) => {
                let (conversation_id, message_id) = self.message_at(sequence)?;
                self.api.delete_message(&message_id).await?;
                self.tabs
                    .refresh_conversation(&self.api, &conversation_id)
                    .await?;
            }
            Command::Delete => self.delete_conversation().await?,
            Command::Space(command) => self.space(command)?,
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(Flow::Quit),
            Command::Send(text) => self.send(text).await?,
        }
        Ok(Flow::Continue)
    }

    async fn register(&mut self) -> Result<(), SessionError> {
        let request = RegisterRequest {
            email: prompt("Email")?,
            password: prompt("Password")?,
            first_name: prompt("First name")?,
            last_name: prompt("Last name")?,
        };
        let user = self.api.register(&request).await?;
        info!("Registered {}", user.email);
        println!("Welcome, {}!", user.first_name);
        Ok(())
    }

    async fn login(&mut self, email: Option<String>) -> Result<(), SessionError> {
        let email = match email {
            Some(email) => email,
            None => prompt("Email")?,
        };
        let password = prompt("Password")?;
        let user = self.api.login(&email, &password).await?;
        println!("Logged in as {} {}.", user.first_name, user.last_name);
        Ok(())
    }

    async fn models(&self) -> Result<(), SessionError> {
        let catalogue = self.api.models().await?;
        for model in catalogue.models {
            println!(
                "  {:<10} {:<28} {:>9} tokens  {}",
                model.provider.as_str(),
                model.id,
                model.context_window,
                model.name
            );
        }
        Ok(())
    }

    async fn list(&mut self) -> Result<(), SessionError> {
        let conversations = self.api.conversations(0, LIST_LIMIT).await?;
        if conversations.is_empty() {
            println!("No conversations yet. Use /new to start one.");
        }
        self.listing = conversations.iter().map(|c| c.id.clone()).collect();
        for (n, conversation) in conversations.iter().enumerate() {
            println!(
                "  {:>2}. {:<40} {:<22} {}",
                n + 1,
                conversation.title,
                conversation.model_name,
                format_usage(&conversation.usage)
            );
        }
        Ok(())
    }

    async fn open(&mut self, target: &str) -> Result<(), SessionError> {
        let id = match target.parse::<usize>() {
            Ok(n) if n >= 1 && n <= self.listing.len() => self.listing[n - 1].clone(),
            Ok(_) => return Err(usage_error("No such entry in the last /list")),
            Err(_) => target.to_string(),
        };

        if self.tabs.open_conversation(&self.api, &id).await?.is_some() {
            self.print_history();
        }
        Ok(())
    }

    fn print_tabs(&self) {
        if self.tabs.tabs().is_empty() {
            println!("No open tabs.");
            return;
        }
        let active = self.tabs.active_tab_id();
        for (n, tab) in self.tabs.tabs().iter().enumerate() {
            let marker = if Some(tab.id) == active { '*' } else { ' ' };
            println!("{} {:>2}. {}", marker, n + 1, tab.title);
        }
    }

    fn tab_at(&self, n: usize) -> Result<u64, SessionError> {
        n.checked_sub(1)
            .and_then(|index| self.tabs.tabs().get(index))
            .map(|tab| tab.id)
            .ok_or_else(|| usage_error(format!("No tab {}", n)))
    }

    fn active_conversation_id(&self) -> Result<String, SessionError> {
        self.tabs
            .active_tab()
            .and_then(|tab| tab.conversation_id.clone())
            .ok_or_else(|| usage_error("The active tab has no conversation yet"))
    }

    /// Resolve a sequence number in the active conversation to a message id.
    fn message_at(&self, sequence: u32) -> Result<(String, String), SessionError> {
        let entry = self
            .tabs
            .active_entry()
            .ok_or_else(|| usage_error("The active tab has no conversation yet"))?;
        let message = entry
            .messages
            .iter()
            .find(|m| !m.is_provisional() && m.message.sequence_number == sequence)
            .ok_or_else(|| usage_error(format!("No message {}", sequence)))?;
        Ok((entry.conversation.id.clone(), message.message.id.clone()))
    }

    fn print_history(&self) {
        let Some(entry) = self.tabs.active_entry() else {
            if let Some(tab) = self.tabs.active_tab() {
                println!("{} (empty)", tab.title);
            }
            return;
        };

        let conversation = &entry.conversation;
        println!(
            "== {} [{} {}] ==",
            conversation.title, conversation.provider, conversation.model_name
        );
        for cached in &entry.messages {
            let message = &cached.message;
            let who = match message.role {
                MessageRole::User => "you",
                MessageRole::Assistant => "assistant",
                MessageRole::System => "system",
            };
            let pending = if cached.is_provisional() {
                " (sending)"
            } else {
                ""
            };
            println!(
                "[{}] {}{}: {}",
                message.sequence_number, who, pending, message.content
            );
        }
        println!("-- {}", format_usage(&conversation.usage));
    }

    async fn switch_model(
        &mut self,
        provider: Option<LlmProvider>,
        model: String,
    ) -> Result<(), SessionError> {
        let Some(tab) = self.tabs.active_tab() else {
            return Err(usage_error("Open a chat first"));
        };

        let Some(conversation_id) = tab.conversation_id.clone() else {
            // Nothing on the server yet; remember it for the first message
            let spec = match provider {
                Some(provider) => model_registry::lookup(provider, &model).ok(),
                None => model_registry::find(&model),
            }
            .ok_or_else(|| usage_error(format!("Unknown model {}", model)))?;
            self.draft_model = (spec.provider, spec.model.to_string());
            println!("New chat will use {} {}.", spec.provider, spec.model);
            return Ok(());
        };

        let updated = self
            .api
            .switch_model(&conversation_id, &model, provider)
            .await?;
        println!(
            "Switched to {} {}: {}",
            updated.provider,
            updated.model_name,
            format_usage(&updated.usage)
        );
        self.tabs
            .refresh_conversation(&self.api, &conversation_id)
            .await?;
        Ok(())
    }

    async fn delete_conversation(&mut self) -> Result<(), SessionError> {
        let id = self.active_conversation_id()?;
        self.api.delete_conversation(&id).await?;

        let stale: Vec<u64> = self
            .tabs
            .tabs()
            .iter()
            .filter(|tab| tab.conversation_id.as_deref() == Some(id.as_str()))
            .map(|tab| tab.id)
            .collect();
        for tab in stale {
            self.tabs.close_tab(tab);
        }
        self.listing.retain(|listed| listed != &id);
        println!("Deleted conversation.");
        Ok(())
    }

    async fn send(&mut self, text: String) -> Result<(), SessionError> {
        let Some(tab) = self.tabs.active_tab() else {
            return Err(usage_error("No active chat. Use /new or /open first."));
        };
        let tab_id = tab.id;

        let Some(conversation_id) = tab.conversation_id.clone() else {
            let (provider, model_name) = self.draft_model.clone();
            let request = CreateConversationRequest {
                provider,
                model_name,
                first_message: text,
                folder_id: None,
            };
            let conversation = self.api.create_conversation(&request).await?;
            let usage = conversation.usage;
            if let Some(reply) = conversation
                .messages
                .as_ref()
                .and_then(|messages| messages.last())
            {
                println!("assistant: {}", reply.content);
            }
            self.tabs.update_tab_conversation_id(tab_id, conversation);
            println!("-- {}", format_usage(&usage));
            return Ok(());
        };

        let local_id = self.tabs.push_provisional(&conversation_id, &text);
        let request = SendMessageRequest {
            content: text,
            context_limit_tokens: Some(self.context_limit),
        };

        let response = match self.api.send_message(&conversation_id, &request).await {
            Ok(response) => response,
            Err(e) => {
                if let Some(local_id) = local_id {
                    self.tabs.rollback_provisional(&conversation_id, local_id);
                }
                warn!("Send to {} failed: {}", conversation_id, e);
                return Err(e.into());
            }
        };

        if let Some(local_id) = local_id {
            let confirmed = match response.user_message {
                Some(stored) => self
                    .tabs
                    .confirm_provisional(&conversation_id, local_id, stored),
                None => false,
            };
            if !confirmed {
                self.tabs.rollback_provisional(&conversation_id, local_id);
            }
        }

        println!("assistant: {}", response.message.content);
        let patch = ConversationPatch::from_conversation(&response.conversation);
        self.tabs
            .update_conversation_after_message(&conversation_id, response.message, &patch);
        println!("-- {}", format_usage(&response.conversation.usage));
        Ok(())
    }

    fn space(&mut self, command: SpaceCommand) -> Result<(), SessionError> {
        match command {
            SpaceCommand::List => {
                if self.spaces.is_empty() {
                    println!("No spaces.");
                }
                for (depth, id) in self.spaces.walk() {
                    println!("{}{}", "  ".repeat(depth + 1), self.spaces.name(id)?);
                }
            }
            SpaceCommand::New(path) => {
                let (parent, name) = match path.trim_matches('/').rsplit_once('/') {
                    Some((parent, name)) => (Some(self.space_at(parent)?), name.to_string()),
                    None => (None, path.trim_matches('/').to_string()),
                };
                let id = self.spaces.create(&name, parent)?;
                println!("Created {}", self.spaces.path(id)?);
            }
            SpaceCommand::Rename { path, name } => {
                let id = self.space_at(&path)?;
                self.spaces.rename(id, &name)?;
                println!("Renamed to {}", self.spaces.path(id)?);
            }
            SpaceCommand::Move { path, to } => {
                let id = self.space_at(&path)?;
                let parent = to.as_deref().map(|to| self.space_at(to)).transpose()?;
                self.spaces.move_to(id, parent)?;
                println!("Moved to {}", self.spaces.path(id)?);
            }
            SpaceCommand::Remove(path) => {
                let id = self.space_at(&path)?;
                let removed = self.spaces.remove(id)?;
                println!("Removed {} space(s)", removed);
            }
        }
        Ok(())
    }

    fn space_at(&self, path: &str) -> Result<crate::spaces::SpaceId, SessionError> {
        self.spaces
            .resolve(path)
            .ok_or_else(|| usage_error(format!("No space at {}", path)))
    }
}
