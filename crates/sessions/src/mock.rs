//! Shared test doubles for [`AgentSessionFactory`]/[`AgentSession`] and
//! [`ChatPlatform`], exercised by this crate's own tests and reusable by
//! `sg-gateway`'s command-layer tests without duplicating mock plumbing.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sg_domain::error::{Error, Result};
use sg_domain::model::OutputTarget;
use sg_output::{ChannelError, MessageRef};

use crate::agent::{AgentSession, AgentSessionFactory};
use crate::chat::{ButtonClick, ChannelInfo, ChatPlatform, IncomingMessage, UserInfo};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct MockAgentSessionState {
    aborted: bool,
    destroyed: bool,
}

/// A no-op coding-agent session. Responses, failures, and timeouts are
/// scripted per call via [`MockAgentSession::script`].
pub struct MockAgentSession {
    state: Mutex<MockAgentSessionState>,
    script: Mutex<std::collections::VecDeque<MockAgentOutcome>>,
    pub workdir: PathBuf,
    pub model: String,
}

#[derive(Clone)]
pub enum MockAgentOutcome {
    Reply(String),
    Timeout,
    Fail(String),
    /// Waits on the given [`tokio::sync::Notify`] before replying, so a
    /// test can hold a session in `working` until it chooses to release it.
    Block(Arc<tokio::sync::Notify>),
}

impl MockAgentSession {
    pub fn new(workdir: PathBuf, model: String) -> Self {
        Self {
            state: Mutex::new(MockAgentSessionState::default()),
            script: Mutex::new(std::collections::VecDeque::new()),
            workdir,
            model,
        }
    }

    pub fn push_outcome(&self, outcome: MockAgentOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn was_aborted(&self) -> bool {
        self.state.lock().unwrap().aborted
    }

    pub fn was_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }
}

#[async_trait::async_trait]
impl AgentSession for MockAgentSession {
    async fn send_and_wait(&self, prompt: &str, _timeout: Duration) -> Result<String> {
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockAgentOutcome::Reply(format!("echo: {prompt}")));
        match outcome {
            MockAgentOutcome::Reply(text) => Ok(text),
            MockAgentOutcome::Timeout => Err(Error::AgentTimeout(0)),
            MockAgentOutcome::Fail(reason) => Err(Error::Other(reason)),
            MockAgentOutcome::Block(notify) => {
                notify.notified().await;
                Ok(format!("echo: {prompt}"))
            }
        }
    }

    async fn abort(&self) {
        self.state.lock().unwrap().aborted = true;
    }

    async fn destroy(&self) {
        self.state.lock().unwrap().destroyed = true;
    }
}

/// Hands out [`MockAgentSession`]s; fails creation when `fail_next_create`
/// has been set (used to exercise model hot-swap rollback).
#[derive(Default)]
pub struct MockAgentSessionFactory {
    fail_next: Mutex<bool>,
    pub created: Mutex<Vec<(PathBuf, String)>>,
    /// Outcomes to seed onto the *next* created session's script, in order.
    next_session_outcomes: Mutex<std::collections::VecDeque<MockAgentOutcome>>,
}

impl MockAgentSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    /// Scripts `outcome` onto the next session this factory creates, so a
    /// test can make a not-yet-created agent time out or fail without
    /// reaching into the session after the fact.
    pub fn queue_outcome_for_next_session(&self, outcome: MockAgentOutcome) {
        self.next_session_outcomes.lock().unwrap().push_back(outcome);
    }
}

#[async_trait::async_trait]
impl AgentSessionFactory for MockAgentSessionFactory {
    async fn create_session(&self, working_directory: &Path, model: &str) -> Result<Box<dyn AgentSession>> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(Error::ExternalTransient("agent session creation failed".into()));
        }
        self.created
            .lock()
            .unwrap()
            .push((working_directory.to_path_buf(), model.to_string()));
        let session = MockAgentSession::new(working_directory.to_path_buf(), model.to_string());
        let mut pending = self.next_session_outcomes.lock().unwrap();
        while let Some(outcome) = pending.pop_front() {
            session.push_outcome(outcome);
        }
        Ok(Box::new(session))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat platform
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MockChatPlatform {
    sent: Mutex<Vec<(OutputTarget, String)>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    deletes: Mutex<Vec<MessageRef>>,
    attachments: Mutex<Vec<(OutputTarget, String, String)>>,
    button_clicks: Mutex<std::collections::VecDeque<ButtonClick>>,
    messages: Mutex<std::collections::VecDeque<IncomingMessage>>,
    fail_next_send: Mutex<bool>,
    next_id: Mutex<u64>,
    /// When set, `collect_button` blocks forever instead of returning `None`
    /// once its queue is empty, so a test can race it against cancellation.
    hang_collect_button: Mutex<bool>,
}

impl MockChatPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_button_click(&self, click: ButtonClick) {
        self.button_clicks.lock().unwrap().push_back(click);
    }

    pub fn queue_message(&self, msg: IncomingMessage) {
        self.messages.lock().unwrap().push_back(msg);
    }

    pub fn fail_next_send(&self) {
        *self.fail_next_send.lock().unwrap() = true;
    }

    pub fn hang_collect_button(&self) {
        *self.hang_collect_button.lock().unwrap() = true;
    }

    pub fn sent_messages(&self) -> Vec<(OutputTarget, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn attachments(&self) -> Vec<(OutputTarget, String, String)> {
        self.attachments.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatPlatform for MockChatPlatform {
    async fn send_message(&self, target: &OutputTarget, content: &str) -> std::result::Result<MessageRef, ChannelError> {
        if std::mem::take(&mut *self.fail_next_send.lock().unwrap()) {
            return Err(ChannelError::Other("send failed".into()));
        }
        self.sent.lock().unwrap().push((target.clone(), content.to_string()));
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        Ok(format!("msg-{id}"))
    }

    async fn edit_message(&self, message: &MessageRef, content: &str) -> std::result::Result<(), ChannelError> {
        self.edits.lock().unwrap().push((message.clone(), content.to_string()));
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> std::result::Result<(), ChannelError> {
        self.deletes.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn send_attachment(
        &self,
        target: &OutputTarget,
        filename: &str,
        content: &str,
    ) -> std::result::Result<MessageRef, ChannelError> {
        self.attachments
            .lock()
            .unwrap()
            .push((target.clone(), filename.to_string(), content.to_string()));
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        Ok(format!("attachment-{id}"))
    }

    async fn send_typing(&self, _target: &OutputTarget) {}

    async fn collect_button(
        &self,
        _message: &MessageRef,
        allowed_users: &[String],
        _timeout: Duration,
    ) -> Option<ButtonClick> {
        {
            let mut clicks = self.button_clicks.lock().unwrap();
            while let Some(click) = clicks.pop_front() {
                if allowed_users.contains(&click.user) {
                    return Some(click);
                }
            }
        }
        if *self.hang_collect_button.lock().unwrap() {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn collect_message(
        &self,
        _target: &OutputTarget,
        allowed_users: &[String],
        _timeout: Duration,
    ) -> Option<IncomingMessage> {
        let mut messages = self.messages.lock().unwrap();
        while let Some(msg) = messages.pop_front() {
            if allowed_users.contains(&msg.user) {
                return Some(msg);
            }
        }
        None
    }

    async fn fetch_channel(&self, id: &str) -> std::result::Result<ChannelInfo, ChannelError> {
        Ok(ChannelInfo { id: id.to_string(), is_thread: false, parent: None })
    }

    async fn fetch_user(&self, id: &str) -> std::result::Result<UserInfo, ChannelError> {
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

pub fn arc_platform() -> Arc<MockChatPlatform> {
    Arc::new(MockChatPlatform::new())
}
