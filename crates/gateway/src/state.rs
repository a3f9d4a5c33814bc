//! Shared application state passed to the command layer and the process
//! entry point. Grounded on the teacher's `AppState` (struct-of-`Arc`-
//! services assembled once at startup and cloned per task), generalized
//! over the chat-platform/coding-agent seams instead of being wired to a
//! single concrete provider.

use std::sync::Arc;

use sg_domain::config::Config;
use sg_grants::GrantStore;
use sg_sessions::{AgentSessionFactory, ChatPlatform, SessionManager};
use sg_store::Store;
use sg_workspace::WorkspaceManager;

/// Shared application state: one instance is assembled at startup and
/// handed to every admin command and background sweep.
///
/// `platform` is kept alongside `sessions` (rather than reached through it)
/// because [`crate::command::gate_tool_use`] needs to hand a platform handle
/// directly to a [`sg_sessions::PushApprovalCollector`], and `SessionManager`
/// doesn't expose the one it was built with.
pub struct Core<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static> {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub grants: Arc<GrantStore>,
    pub workspace: Arc<WorkspaceManager>,
    pub sessions: Arc<SessionManager<F, C>>,
    pub platform: Arc<C>,
}

// Manual `Clone` impl: `#[derive(Clone)]` would add `F: Clone, C: Clone`
// bounds neither type parameter needs, since every field is already an
// `Arc`.
impl<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static> Clone for Core<F, C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            grants: self.grants.clone(),
            workspace: self.workspace.clone(),
            sessions: self.sessions.clone(),
            platform: self.platform.clone(),
        }
    }
}
