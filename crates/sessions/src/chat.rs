//! Chat-platform trait seam (spec §6 "Chat platform (collaborator)").
//!
//! Message send/edit/delete/attachment mirror `sg_output::ChannelHandle`
//! exactly so a [`ChannelHandleAdapter`] can hand a `ChatPlatform` straight
//! to an `OutputSink` with no error translation. The remaining methods
//! (typing indicator, button/message collection, channel and user lookup)
//! round out the full contract the Session Machine, Push-Approval
//! Collector, and question-answer flow need. No concrete client is
//! implemented — out of scope per spec §1.

use std::time::Duration;

use sg_domain::model::OutputTarget;
use sg_output::{ChannelError, ChannelHandle, MessageRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonClick {
    pub user: String,
    pub label: String,
}

impl ButtonClick {
    pub fn approve(user: impl Into<String>) -> Self {
        Self { user: user.into(), label: "approve".into() }
    }

    pub fn reject(user: impl Into<String>) -> Self {
        Self { user: user.into(), label: "reject".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub user: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub is_thread: bool,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub is_bot: bool,
}

#[async_trait::async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_message(&self, target: &OutputTarget, content: &str) -> Result<MessageRef, ChannelError>;
    async fn edit_message(&self, message: &MessageRef, content: &str) -> Result<(), ChannelError>;
    async fn delete_message(&self, message: &MessageRef) -> Result<(), ChannelError>;
    async fn send_attachment(
        &self,
        target: &OutputTarget,
        filename: &str,
        content: &str,
    ) -> Result<MessageRef, ChannelError>;
    async fn send_typing(&self, target: &OutputTarget);

    /// Wait for a button click from one of `allowed_users` on `message`,
    /// up to `timeout`. `None` on timeout; clicks from anyone else are
    /// silently ignored (the platform is expected to give the clicker an
    /// ephemeral refusal and keep waiting).
    async fn collect_button(
        &self,
        message: &MessageRef,
        allowed_users: &[String],
        timeout: Duration,
    ) -> Option<ButtonClick>;

    /// Wait for the next non-bot message in `target` from one of
    /// `allowed_users`, up to `timeout`.
    async fn collect_message(
        &self,
        target: &OutputTarget,
        allowed_users: &[String],
        timeout: Duration,
    ) -> Option<IncomingMessage>;

    async fn fetch_channel(&self, id: &str) -> Result<ChannelInfo, ChannelError>;
    async fn fetch_user(&self, id: &str) -> Result<UserInfo, ChannelError>;
    async fn parent_channel(&self, id: &str) -> Option<String>;
    async fn is_text_channel(&self, id: &str) -> bool;
    async fn member_roles(&self, target: &OutputTarget, user: &str) -> Vec<String>;
}

/// Adapts any [`ChatPlatform`] to the narrower [`ChannelHandle`] the Output
/// Sink needs, so one collaborator implementation serves both.
pub struct ChannelHandleAdapter<C: ChatPlatform> {
    pub platform: std::sync::Arc<C>,
}

#[async_trait::async_trait]
impl<C: ChatPlatform> ChannelHandle for ChannelHandleAdapter<C> {
    async fn send(&self, target: &OutputTarget, content: &str) -> Result<MessageRef, ChannelError> {
        self.platform.send_message(target, content).await
    }

    async fn edit(&self, message: &MessageRef, content: &str) -> Result<(), ChannelError> {
        self.platform.edit_message(message, content).await
    }

    async fn send_attachment(
        &self,
        target: &OutputTarget,
        filename: &str,
        content: &str,
    ) -> Result<MessageRef, ChannelError> {
        self.platform.send_attachment(target, filename, content).await
    }
}
