//! Production placeholder collaborators (spec §6 "Coding agent" and "Chat
//! platform"): both are explicitly out of scope (spec §1) — no concrete
//! coding-agent SDK or chat client ships here. These implementations let
//! `main.rs` assemble and boot a real [`sg_sessions::machine::SessionManager`]
//! in non-test code until a real client is wired in; they are distinct from
//! [`sg_sessions::mock`]'s test doubles, which assert on call sequences and
//! are not meant to run in production.

use std::path::Path;
use std::time::Duration;

use sg_domain::error::Error;
use sg_domain::model::OutputTarget;
use sg_output::{ChannelError, MessageRef};
use sg_sessions::{
    AgentSession, AgentSessionFactory, ButtonClick, ChannelInfo, ChatPlatform, IncomingMessage, UserInfo,
};

/// An [`AgentSession`] that always fails. Any call through it means a
/// channel tried to run a task with no coding-agent SDK configured.
pub struct NullAgentSession;

#[async_trait::async_trait]
impl AgentSession for NullAgentSession {
    async fn send_and_wait(&self, _prompt: &str, _timeout: Duration) -> sg_domain::error::Result<String> {
        Err(Error::ExternalFatal("no coding-agent SDK configured".into()))
    }

    async fn abort(&self) {}

    async fn destroy(&self) {}
}

/// Always succeeds at "creating" a session, handing back a
/// [`NullAgentSession`] that fails the first time it's actually used.
#[derive(Default)]
pub struct NullAgentSessionFactory;

#[async_trait::async_trait]
impl AgentSessionFactory for NullAgentSessionFactory {
    async fn create_session(&self, _working_directory: &Path, _model: &str) -> sg_domain::error::Result<Box<dyn AgentSession>> {
        Ok(Box::new(NullAgentSession))
    }
}

/// A [`ChatPlatform`] that logs instead of talking to a real chat service.
/// Messages are never collected, so anything that waits on a human
/// (push approval, question prompts) times out rather than hanging forever.
#[derive(Default)]
pub struct NullChatPlatform;

#[async_trait::async_trait]
impl ChatPlatform for NullChatPlatform {
    async fn send_message(&self, target: &OutputTarget, content: &str) -> Result<MessageRef, ChannelError> {
        tracing::info!(?target, content, "chat platform not configured; logging message instead");
        Ok(MessageRef::from("null-message"))
    }

    async fn edit_message(&self, _message: &MessageRef, content: &str) -> Result<(), ChannelError> {
        tracing::info!(content, "chat platform not configured; logging edit instead");
        Ok(())
    }

    async fn delete_message(&self, _message: &MessageRef) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_attachment(
        &self,
        target: &OutputTarget,
        filename: &str,
        _content: &str,
    ) -> Result<MessageRef, ChannelError> {
        tracing::info!(?target, filename, "chat platform not configured; logging attachment instead");
        Ok(MessageRef::from("null-message"))
    }

    async fn send_typing(&self, _target: &OutputTarget) {}

    async fn collect_button(
        &self,
        _message: &MessageRef,
        _allowed_users: &[String],
        _timeout: Duration,
    ) -> Option<ButtonClick> {
        None
    }

    async fn collect_message(
        &self,
        _target: &OutputTarget,
        _allowed_users: &[String],
        _timeout: Duration,
    ) -> Option<IncomingMessage> {
        None
    }

    async fn fetch_channel(&self, id: &str) -> Result<ChannelInfo, ChannelError> {
        Ok(ChannelInfo { id: id.to_string(), is_thread: false, parent: None })
    }

    async fn fetch_user(&self, id: &str) -> Result<UserInfo, ChannelError> {
        Ok(UserInfo { id: id.to_string(), is_bot: false })
    }

    async fn parent_channel(&self, _id: &str) -> Option<String> {
        None
    }

    async fn is_text_channel(&self, _id: &str) -> bool {
        true
    }

    async fn member_roles(&self, _target: &OutputTarget, _user: &str) -> Vec<String> {
        Vec::new()
    }
}
