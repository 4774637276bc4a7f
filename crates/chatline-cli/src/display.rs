//! Terminal rendering and chat-mode input parsing

use std::collections::HashSet;

use anyhow::{bail, Result};

use chatline_core::{Action, AppEvent, Message, MessageId, Session};

use crate::config::CliConfig;

pub const CHAT_HELP: &str = "\
Commands:
  <text>                  send a message
  /delete <id>            delete a message (administrators)
  /login <email>          email a login link and code
  /verify [email] <code>  complete login with the emailed code
  /logout                 end the session
  /whoami                 show the current session
  /help                   show this help
  /quit                   leave the room";

// ----------------------------------------------------------------------------
// Message Formatting
// ----------------------------------------------------------------------------

/// One message line; messages written by `viewer` are tagged `(you)`
pub fn format_message(message: &Message, config: &CliConfig, viewer: &Session) -> String {
    let mut line = String::new();
    if config.show_ids {
        line.push_str(&format!("[{}] ", message.id));
    }
    if config.show_timestamps {
        if let Some(at) = message.created_at.to_datetime() {
            line.push_str(&at.format("%Y-%m-%d %H:%M:%S ").to_string());
        }
    }
    line.push_str(message.author.as_str());
    if viewer
        .identity()
        .is_some_and(|identity| message.is_authored_by(identity))
    {
        line.push_str(" (you)");
    }
    line.push_str(&format!(": {}", message.content));
    line
}

fn action_name(action: Action) -> &'static str {
    match action {
        Action::Send => "send",
        Action::Delete => "delete",
        Action::Login => "login",
        Action::Logout => "logout",
    }
}

/// One-line description of an event that is not a message list update
pub fn format_event(event: &AppEvent) -> Option<String> {
    match event {
        AppEvent::Ready { message_count } => {
            Some(format!("*** Joined the room ({} messages)", message_count))
        }
        AppEvent::SessionChanged {
            session,
            can_delete,
        } if session.is_authenticated() => Some(format!(
            "*** Logged in as {}{}",
            session,
            if *can_delete { " (admin)" } else { "" }
        )),
        AppEvent::SessionChanged { .. } => Some("*** Logged out".to_string()),
        AppEvent::ActionRejected { action, reason } => {
            Some(format!("!!! {} rejected: {}", action_name(*action), reason))
        }
        AppEvent::ActionFailed { action, error } => {
            Some(format!("!!! {} failed: {}", action_name(*action), error))
        }
        AppEvent::LoginLinkSent { email } => Some(format!(
            "*** Login link sent to {}. Use /verify <code> to finish.",
            email
        )),
        AppEvent::Stopped => Some("*** Disconnected".to_string()),
        AppEvent::MessagesChanged { .. } => None,
    }
}

// ----------------------------------------------------------------------------
// Transcript
// ----------------------------------------------------------------------------

/// A change to what the terminal has shown so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptLine {
    Posted(Message),
    Removed(Message),
}

/// Turns full snapshots into incremental terminal output
#[derive(Debug, Default)]
pub struct Transcript {
    shown: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `messages` against what was shown before
    ///
    /// Removals come first, then new messages in snapshot order.
    pub fn update(&mut self, messages: &[Message]) -> Vec<TranscriptLine> {
        let current: HashSet<&MessageId> = messages.iter().map(|m| &m.id).collect();
        let previous: HashSet<&MessageId> = self.shown.iter().map(|m| &m.id).collect();

        let mut lines: Vec<TranscriptLine> = self
            .shown
            .iter()
            .filter(|m| !current.contains(&m.id))
            .cloned()
            .map(TranscriptLine::Removed)
            .collect();
        lines.extend(
            messages
                .iter()
                .filter(|m| !previous.contains(&m.id))
                .cloned()
                .map(TranscriptLine::Posted),
        );

        self.shown = messages.to_vec();
        lines
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }
}

pub fn format_line(line: &TranscriptLine, config: &CliConfig, viewer: &Session) -> String {
    match line {
        TranscriptLine::Posted(message) => format_message(message, config, viewer),
        TranscriptLine::Removed(message) => format!("*** Message {} was deleted", message.id),
    }
}

// ----------------------------------------------------------------------------
// Chat Input
// ----------------------------------------------------------------------------

/// A line typed in chat mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Delete(MessageId),
    Login(String),
    Verify { email: Option<String>, code: String },
    Logout,
    Whoami,
    Help,
    Quit,
    Blank,
}

impl ChatInput {
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Self::Blank);
        }
        // "//text" sends a message starting with a slash
        if let Some(escaped) = trimmed.strip_prefix("//") {
            return Ok(Self::Message(format!("/{}", escaped)));
        }
        let Some(command) = trimmed.strip_prefix('/') else {
            return Ok(Self::Message(line.to_string()));
        };

        let args: Vec<&str> = command.split_whitespace().collect();
        match args.as_slice() {
            ["delete", id] => Ok(Self::Delete(MessageId::new(*id))),
            ["delete", ..] => bail!("usage: /delete <id>"),
            ["login", email] => Ok(Self::Login(email.to_string())),
            ["login", ..] => bail!("usage: /login <email>"),
            ["verify", code] => Ok(Self::Verify {
                email: None,
                code: code.to_string(),
            }),
            ["verify", email, code] => Ok(Self::Verify {
                email: Some(email.to_string()),
                code: code.to_string(),
            }),
            ["verify", ..] => bail!("usage: /verify [email] <code>"),
            ["logout"] => Ok(Self::Logout),
            ["whoami"] => Ok(Self::Whoami),
            ["help"] | ["?"] => Ok(Self::Help),
            ["quit"] | ["exit"] => Ok(Self::Quit),
            _ => bail!("unknown command '/{}', try /help", command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_core::Timestamp;

    fn message(id: i64, content: &str) -> Message {
        Message::new(id, content, "ada@example.com", Timestamp::from_millis(id))
    }

    #[test]
    fn test_transcript_reports_posts_and_removals() {
        let mut transcript = Transcript::new();
        let first = transcript.update(&[message(1, "a"), message(2, "b")]);
        assert_eq!(
            first,
            vec![
                TranscriptLine::Posted(message(1, "a")),
                TranscriptLine::Posted(message(2, "b")),
            ]
        );

        let second = transcript.update(&[message(2, "b"), message(3, "c")]);
        assert_eq!(
            second,
            vec![
                TranscriptLine::Removed(message(1, "a")),
                TranscriptLine::Posted(message(3, "c")),
            ]
        );
        assert_eq!(transcript.len(), 2);
        assert!(transcript.update(&[message(2, "b"), message(3, "c")]).is_empty());
    }

    #[test]
    fn test_format_message_respects_config() {
        let config = CliConfig {
            show_ids: false,
            show_timestamps: false,
            ..CliConfig::default()
        };
        assert_eq!(
            format_message(&message(7, "hi"), &config, &Session::Anonymous),
            "ada@example.com: hi"
        );

        let full = format_message(&message(7, "hi"), &CliConfig::default(), &Session::Anonymous);
        assert!(full.starts_with("[7] 1970-01-01 00:00:00 "));
    }

    #[test]
    fn test_own_messages_are_tagged() {
        let config = CliConfig {
            show_ids: false,
            show_timestamps: false,
            ..CliConfig::default()
        };
        let ada = Session::authenticated("ada@example.com");
        let bob = Session::authenticated("bob@example.com");

        assert_eq!(
            format_message(&message(7, "hi"), &config, &ada),
            "ada@example.com (you): hi"
        );
        assert_eq!(
            format_message(&message(7, "hi"), &config, &bob),
            "ada@example.com: hi"
        );
        assert_eq!(
            format_line(&TranscriptLine::Posted(message(7, "hi")), &config, &ada),
            "ada@example.com (you): hi"
        );
        assert_eq!(
            format_line(&TranscriptLine::Removed(message(7, "hi")), &config, &ada),
            "*** Message 7 was deleted"
        );
    }

    #[test]
    fn test_format_event() {
        let login = AppEvent::SessionChanged {
            session: Session::authenticated("root@example.com"),
            can_delete: true,
        };
        assert_eq!(
            format_event(&login).as_deref(),
            Some("*** Logged in as root@example.com (admin)")
        );
        let rejected = AppEvent::ActionRejected {
            action: Action::Send,
            reason: "not logged in".to_string(),
        };
        assert_eq!(
            format_event(&rejected).as_deref(),
            Some("!!! send rejected: not logged in")
        );
        assert!(format_event(&AppEvent::MessagesChanged { messages: vec![] }).is_none());
    }

    #[test]
    fn test_parse_chat_input() {
        assert_eq!(ChatInput::parse("  ").unwrap(), ChatInput::Blank);
        assert_eq!(
            ChatInput::parse(" hello ").unwrap(),
            ChatInput::Message(" hello ".to_string())
        );
        assert_eq!(
            ChatInput::parse("//shrug").unwrap(),
            ChatInput::Message("/shrug".to_string())
        );
        assert_eq!(
            ChatInput::parse("/delete 42").unwrap(),
            ChatInput::Delete(MessageId::new("42"))
        );
        assert_eq!(
            ChatInput::parse("/verify 123456").unwrap(),
            ChatInput::Verify {
                email: None,
                code: "123456".to_string()
            }
        );
        assert_eq!(ChatInput::parse("/quit").unwrap(), ChatInput::Quit);
        assert!(ChatInput::parse("/delete").is_err());
        assert!(ChatInput::parse("/dance").is_err());
    }
}
