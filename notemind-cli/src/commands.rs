use notemind_core::LlmProvider;

/// Parsed REPL input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register,
    Login(Option<String>),
    Me,
    Keys,
    SetKey { provider: LlmProvider, key: String },
    ClearKey(LlmProvider),
    Models,
    Folders,
    NewFolder(String),
    List,
    Open(String),
    New,
    Tabs,
    Switch(usize),
    Close(Option<usize>),
    Back,
    Refresh,
    Model {
        provider: Option<LlmProvider>,
        model: String,
    },
    Limit(u32),
    History,
    Edit { sequence: u32, text: String },
    Remove(u32),
    Delete,
    Space(SpaceCommand),
    Help,
    Quit,
    Send(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpaceCommand {
    List,
    New(String),
    Rename { path: String, name: String },
    Move { path: String, to: Option<String> },
    Remove(String),
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("{0}")]
pub struct CommandError(String);

fn usage(text: &str) -> CommandError {
    CommandError(format!("Usage: {}", text))
}

fn number<T: std::str::FromStr>(value: &str, text: &str) -> Result<T, CommandError> {
    value.parse().map_err(|_| usage(text))
}

fn provider(value: &str) -> Result<LlmProvider, CommandError> {
    value.parse().map_err(CommandError)
}

/// Split off the first whitespace-delimited word.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(command) = line.strip_prefix('/') else {
            return Ok(Some(Command::Send(line.to_string())));
        };

        let (name, rest) = split_word(command);
        let parsed = match name {
            "register" => Command::Register,
            "login" => Command::Login((!rest.is_empty()).then(|| rest.to_string())),
            "me" => Command::Me,
            "keys" => match split_word(rest) {
                ("", _) => Command::Keys,
                ("set", args) => match split_word(args) {
                    (p, key) if !p.is_empty() && !key.is_empty() => Command::SetKey {
                        provider: provider(p)?,
                        key: key.to_string(),
                    },
                    _ => return Err(usage("/keys set <provider> <key>")),
                },
                ("clear", p) if !p.is_empty() => Command::ClearKey(provider(p)?),
                _ => return Err(usage("/keys [set <provider> <key> | clear <provider>]")),
            },
            "models" => Command::Models,
            "folders" => Command::Folders,
            "folder" => match split_word(rest) {
                ("new", name) if !name.is_empty() => Command::NewFolder(name.to_string()),
                _ => return Err(usage("/folder new <name>")),
            },
            "list" => Command::List,
            "open" if !rest.is_empty() => Command::Open(rest.to_string()),
            "open" => return Err(usage("/open <id | number from /list>")),
            "new" => Command::New,
            "tabs" => Command::Tabs,
            "switch" => Command::Switch(number(rest, "/switch <tab number>")?),
            "close" if rest.is_empty() => Command::Close(None),
            "close" => Command::Close(Some(number(rest, "/close [tab number]")?)),
            "back" => Command::Back,
            "refresh" => Command::Refresh,
            "model" => match split_word(rest) {
                ("", _) => return Err(usage("/model [provider] <model>")),
                (model, "") => Command::Model {
                    provider: None,
                    model: model.to_string(),
                },
                (p, model) => Command::Model {
                    provider: Some(provider(p)?),
                    model: model.to_string(),
                },
            },
            "limit" => Command::Limit(number(rest, "/limit <tokens>")?),
            "history" => Command::History,
            "edit" => match split_word(rest) {
                (seq, text) if !text.is_empty() => Command::Edit {
                    sequence: number(seq, "/edit <message number> <text>")?,
                    text: text.to_string(),
                },
                _ => return Err(usage("/edit <message number> <text>")),
            },
            "rm" => Command::Remove(number(rest, "/rm <message number>")?),
            "delete" => Command::Delete,
            "space" => Command::Space(SpaceCommand::parse(rest)?),
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => {
                return Err(CommandError(format!(
                    "Unknown command /{}. Type /help for a list.",
                    other
                )));
            }
        };
        Ok(Some(parsed))
    }
}

impl SpaceCommand {
    fn parse(input: &str) -> Result<Self, CommandError> {
        let (action, rest) = split_word(input);
        match action {
            "" | "ls" => Ok(SpaceCommand::List),
            "new" if !rest.is_empty() => Ok(SpaceCommand::New(rest.to_string())),
            "rename" => match split_word(rest) {
                (path, name) if !name.is_empty() => Ok(SpaceCommand::Rename {
                    path: path.to_string(),
                    name: name.to_string(),
                }),
                _ => Err(usage("/space rename <path> <name>")),
            },
            "mv" => match split_word(rest) {
                (path, to) if !path.is_empty() && !to.is_empty() => Ok(SpaceCommand::Move {
                    path: path.to_string(),
                    to: (to != "/").then(|| to.to_string()),
                }),
                _ => Err(usage("/space mv <path> <parent path | />")),
            },
            "rm" if !rest.is_empty() => Ok(SpaceCommand::Remove(rest.to_string())),
            _ => Err(usage("/space [ls | new <path> | rename <path> <name> | mv <path> <parent> | rm <path>]")),
        }
    }
}

pub const HELP: &str = "\
Accounts   /register  /login [email]  /me  /keys [set <provider> <key> | clear <provider>]
Catalogue  /models  /folders  /folder new <name>
Chats      /list  /open <id|n>  /new  /tabs  /switch <n>  /close [n]  /back
           /refresh  /model [provider] <model>  /limit <tokens>  /history
Messages   /edit <n> <text>  /rm <n>  /delete
Spaces     /space [ls | new <path> | rename <path> <name> | mv <path> <parent|/> | rm <path>]
           /quit
Anything not starting with / is sent to the active chat.";

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_plain_text_is_a_send() {
        assert_eq!(parse("  hello there "), Command::Send("hello there".to_string()));
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_tab_commands() {
        assert_eq!(parse("/switch 2"), Command::Switch(2));
        assert_eq!(parse("/close"), Command::Close(None));
        assert_eq!(parse("/close 3"), Command::Close(Some(3)));
        assert_eq!(parse("/open abc-123"), Command::Open("abc-123".to_string()));
        assert!(Command::parse("/switch two").is_err());
        assert!(Command::parse("/open").is_err());
    }

    #[test]
    fn test_model_with_and_without_provider() {
        assert_eq!(
            parse("/model gpt-4o"),
            Command::Model {
                provider: None,
                model: "gpt-4o".to_string()
            }
        );
        assert_eq!(
            parse("/model gemini gemini-1.5-pro"),
            Command::Model {
                provider: Some(LlmProvider::Google),
                model: "gemini-1.5-pro".to_string()
            }
        );
        assert!(Command::parse("/model acme big-model").is_err());
    }

    #[test]
    fn test_key_commands() {
        assert_eq!(
            parse("/keys set openai sk-test"),
            Command::SetKey {
                provider: LlmProvider::OpenAi,
                key: "sk-test".to_string()
            }
        );
        assert_eq!(
            parse("/keys clear anthropic"),
            Command::ClearKey(LlmProvider::Anthropic)
        );
        assert!(Command::parse("/keys set openai").is_err());
    }

    #[test]
    fn test_message_commands() {
        assert_eq!(
            parse("/edit 4 actually, use bullet points"),
            Command::Edit {
                sequence: 4,
                text: "actually, use bullet points".to_string()
            }
        );
        assert_eq!(parse("/rm 2"), Command::Remove(2));
        assert!(Command::parse("/edit 4").is_err());
    }

    #[test]
    fn test_space_commands() {
        assert_eq!(parse("/space"), Command::Space(SpaceCommand::List));
        assert_eq!(
            parse("/space new work/ideas"),
            Command::Space(SpaceCommand::New("work/ideas".to_string()))
        );
        assert_eq!(
            parse("/space mv work/ideas /"),
            Command::Space(SpaceCommand::Move {
                path: "work/ideas".to_string(),
                to: None
            })
        );
        assert_eq!(
            parse("/space rename work jobs"),
            Command::Space(SpaceCommand::Rename {
                path: "work".to_string(),
                name: "jobs".to_string()
            })
        );
        assert!(Command::parse("/space mv work").is_err());
    }

    #[test]
    fn test_unknown_command() {
        let err = Command::parse("/frobnicate").unwrap_err();
        assert!(err.to_string().contains("/frobnicate"));
    }
}
