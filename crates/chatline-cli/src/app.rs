//! Chatline application
//!
//! Wires the Supabase adapters into a [`ChatController`] and implements the
//! one-shot commands and the interactive room.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use chatline_core::{
    AppEvent, ChatController, Command, ControllerHandle, DeleteOutcome, LoginOutcome,
    Message, MessageId, MessageRepository, MessageStore, SendOutcome, Session,
};
use chatline_supabase::SupabaseBackend;

use crate::config::AppConfig;
use crate::display::{format_event, format_line, format_message, ChatInput, Transcript, CHAT_HELP};
use crate::error::{CliError, Result};

pub struct ChatApp {
    config: AppConfig,
    backend: SupabaseBackend,
}

impl ChatApp {
    pub fn new(config: AppConfig) -> Result<Self> {
        let backend = SupabaseBackend::new(&config.supabase, config.channels.feed_buffer_size)?;
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn controller(&self) -> Result<ChatController> {
        let (repository, feed, auth) = self.backend.collaborators();
        Ok(ChatController::new(
            &self.config.core_config(),
            repository,
            feed,
            auth,
        )?)
    }

    /// Controller with the stored session applied, without loading history
    async fn signed_in_controller(&self) -> Result<ChatController> {
        let mut controller = self.controller()?;
        controller.refresh_session().await?;
        Ok(controller)
    }

    // ------------------------------------------------------------------------
    // One-shot Commands
    // ------------------------------------------------------------------------

    /// Message history in display order, optionally only the newest `limit`
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<Message>> {
        let rows = self.backend.rest.list_messages().await?;
        let mut store = MessageStore::new();
        store.seed(rows)?;

        let messages = store.snapshot();
        let skip = limit.map_or(0, |limit| messages.len().saturating_sub(limit));
        Ok(messages[skip..].to_vec())
    }

    pub async fn print_history(&self, limit: Option<usize>) -> Result<()> {
        let viewer = match self.backend.auth.resolve_session().await {
            Ok(session) => session.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Could not resolve session, history shown anonymously");
                Session::Anonymous
            }
        };
        for message in self.history(limit).await? {
            println!("{}", format_message(&message, &self.config.cli, &viewer));
        }
        Ok(())
    }

    pub async fn send(&self, content: &str) -> Result<()> {
        let mut controller = self.signed_in_controller().await?;
        match controller.send_message(content).await {
            SendOutcome::Sent { .. } => {
                println!("Message sent as {}", controller.session());
                Ok(())
            }
            SendOutcome::Rejected(reason) => Err(CliError::Rejected {
                action: "send",
                reason: reason.to_string(),
            }),
            SendOutcome::Failed(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = MessageId::new(id.trim());
        let mut controller = self.signed_in_controller().await?;
        match controller.delete_message(&id).await {
            DeleteOutcome::Requested => {
                println!("Message {} deleted", id);
                Ok(())
            }
            DeleteOutcome::Rejected(reason) => Err(CliError::Rejected {
                action: "delete",
                reason: reason.to_string(),
            }),
            DeleteOutcome::Failed(e) => Err(e.into()),
        }
    }

    pub async fn login(&self, email: &str) -> Result<()> {
        let mut controller = self.controller()?;
        match controller.request_login(email).await {
            LoginOutcome::LinkSent => {
                println!(
                    "Login link sent to {}. Run `chatline verify {} <code>` with the emailed code.",
                    email.trim(),
                    email.trim()
                );
                Ok(())
            }
            LoginOutcome::Rejected(reason) => Err(CliError::Rejected {
                action: "login",
                reason: reason.to_string(),
            }),
            LoginOutcome::Failed(e) => Err(e.into()),
        }
    }

    pub async fn verify(&self, email: &str, code: &str) -> Result<Session> {
        let session = self.backend.auth.verify_otp(email.trim(), code).await?;
        Ok(session)
    }

    pub async fn logout(&self) -> Result<()> {
        let mut controller = self.controller()?;
        if let Err(e) = controller.refresh_session().await {
            warn!(error = %e, "Could not confirm session before logout");
        }
        controller.logout().await?;
        println!("Logged out");
        Ok(())
    }

    pub async fn whoami(&self) -> Result<()> {
        let controller = self.signed_in_controller().await?;
        let session = controller.session();
        if session.is_authenticated() {
            let role = if controller.can_delete() {
                "administrator"
            } else {
                "member"
            };
            println!("{} ({})", session, role);
        } else {
            println!("Not logged in");
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Interactive Room
    // ------------------------------------------------------------------------

    /// Join the room until `/quit`, end of input, or the feed stopping
    pub async fn run_chat(&self) -> Result<()> {
        let controller = self.controller()?;
        let mut handle = ControllerHandle::spawn(controller, &self.config.channels);
        let mut events = handle
            .take_app_event_receiver()
            .ok_or_else(|| CliError::Usage("app event receiver already taken".to_string()))?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let mut room = RoomView::default();
        info!("Joining chat room");

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        // Loop ended on its own; surfaces a failed start
                        return Ok(handle.wait().await?);
                    };
                    let stopped = matches!(event, AppEvent::Stopped);
                    self.render_event(event, &mut room);
                    if stopped {
                        break;
                    }
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("Input closed");
                        break;
                    };
                    match ChatInput::parse(&line) {
                        Ok(input) => {
                            if !self.handle_input(input, &handle, &room).await? {
                                break;
                            }
                        }
                        Err(e) => println!("{}", e),
                    }
                    self.prompt();
                }
            }
        }

        handle.shutdown().await?;
        Ok(())
    }

    fn render_event(&self, event: AppEvent, room: &mut RoomView) {
        match &event {
            AppEvent::MessagesChanged { messages } => {
                for line in room.transcript.update(messages) {
                    println!("{}", format_line(&line, &self.config.cli, &room.session));
                }
            }
            AppEvent::SessionChanged { session, .. } => room.session = session.clone(),
            AppEvent::LoginLinkSent { email } => room.login_email = Some(email.clone()),
            _ => {}
        }
        if let Some(text) = format_event(&event) {
            println!("{}", text);
        }
        self.prompt();
    }

    /// Returns `false` when the user asked to leave
    async fn handle_input(
        &self,
        input: ChatInput,
        handle: &ControllerHandle,
        room: &RoomView,
    ) -> Result<bool> {
        let command = match input {
            ChatInput::Blank => return Ok(true),
            ChatInput::Quit => return Ok(false),
            ChatInput::Help => {
                println!("{}", CHAT_HELP);
                return Ok(true);
            }
            ChatInput::Whoami => {
                println!("{}", room.session);
                return Ok(true);
            }
            ChatInput::Verify { email, code } => {
                let Some(email) = email.or_else(|| room.login_email.clone()) else {
                    println!("Use /login <email> first, or /verify <email> <code>");
                    return Ok(true);
                };
                match self.verify(&email, &code).await {
                    Ok(_) => Command::RefreshSession,
                    Err(e) => {
                        println!("!!! login failed: {}", e);
                        return Ok(true);
                    }
                }
            }
            ChatInput::Message(content) => Command::SendMessage { content },
            ChatInput::Delete(id) => Command::DeleteMessage { id },
            ChatInput::Login(email) => Command::RequestLogin { email },
            ChatInput::Logout => Command::Logout,
        };

        handle.send_command(command).await?;
        Ok(true)
    }

    fn prompt(&self) {
        print!("{}", self.config.cli.prompt);
        let _ = std::io::stdout().flush();
    }
}

/// What the terminal knows about the room from app events
#[derive(Default)]
struct RoomView {
    transcript: Transcript,
    session: Session,
    login_email: Option<String>,
}
