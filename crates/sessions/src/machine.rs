//! Queue & Session Machine (spec §4.5): owns the `absent -> creating ->
//! (idle | working)` transitions, per-channel task queues, and the
//! first-task-race / per-channel-serialization invariants from spec §5.
//! Grounded on the teacher's `gateway/src/runtime/session_lock.rs`
//! (per-key exclusion so no two tasks for one channel run at once) and
//! `gateway/src/runtime/cancel.rs` (abort flag semantics), generalized from
//! a bare lock/token pair into the full state machine.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Mutex as TokioMutex, Notify};

use sg_domain::error::{Error, Result};
use sg_domain::model::{OutputTarget, SessionRecord, SessionStatus, TaskHistoryRow, TaskStatus};
use sg_grants::GrantStore;
use sg_output::OutputSink;
use sg_store::Store;
use sg_workspace::WorkspaceManager;

use crate::agent::AgentSessionFactory;
use crate::chat::{ChannelHandleAdapter, ChatPlatform};
use crate::queue::QueuedTask;
use crate::state::{RuntimeStatus, Session};

/// Inputs needed to construct a session the first time a channel is seen.
/// Ignored (and cheap to build) if the channel already has a live session.
#[derive(Debug, Clone)]
pub struct CreationRequest {
    pub project: String,
    pub repo_dir: PathBuf,
    pub branch_override: Option<String>,
    pub global_default_branch: String,
    pub model: String,
}

/// How a task run concluded, used to pick the session's next status, the
/// stored `TaskStatus`, and the output sink's epilogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Aborted,
    TimedOut,
    Failed,
}

/// Owns every channel's session: the state machine, its queue, and the
/// collaborators (agent factory, chat platform, workspace manager, grant
/// store, durable store) needed to drive it.
pub struct SessionManager<F: AgentSessionFactory, C: ChatPlatform> {
    factory: Arc<F>,
    platform: Arc<C>,
    store: Arc<Store>,
    grants: Arc<GrantStore>,
    workspace: Arc<WorkspaceManager>,
    sessions: Mutex<HashMap<String, Arc<TokioMutex<Session<C>>>>>,
    pending_creations: Mutex<HashMap<String, Arc<Notify>>>,
    /// One cancellation handle per live session, notified by [`Self::reset`]
    /// so an in-flight [`crate::approval::PushApprovalCollector::request`]
    /// can tear its prompt down immediately instead of riding out its own
    /// deadline (spec §4.4 "Cancellation on session reset removes the
    /// prompt").
    approval_cancels: Mutex<HashMap<String, Arc<Notify>>>,
    output_flush_interval: Duration,
}

impl<F: AgentSessionFactory + 'static, C: ChatPlatform + 'static> SessionManager<F, C> {
    pub fn new(
        factory: Arc<F>,
        platform: Arc<C>,
        store: Arc<Store>,
        grants: Arc<GrantStore>,
        workspace: Arc<WorkspaceManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory,
            platform,
            store,
            grants,
            workspace,
            sessions: Mutex::new(HashMap::new()),
            pending_creations: Mutex::new(HashMap::new()),
            approval_cancels: Mutex::new(HashMap::new()),
            output_flush_interval: Duration::from_millis(700),
        })
    }

    /// Like [`Self::new`] but with a configurable output-sink edit-throttle,
    /// so tests don't have to wait out the real default.
    pub fn new_with_output_flush_interval(
        factory: Arc<F>,
        platform: Arc<C>,
        store: Arc<Store>,
        grants: Arc<GrantStore>,
        workspace: Arc<WorkspaceManager>,
        output_flush_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory,
            platform,
            store,
            grants,
            workspace,
            sessions: Mutex::new(HashMap::new()),
            pending_creations: Mutex::new(HashMap::new()),
            approval_cancels: Mutex::new(HashMap::new()),
            output_flush_interval,
        })
    }

    fn get(&self, channel: &str) -> Result<Arc<TokioMutex<Session<C>>>> {
        self.sessions
            .lock()
            .get(channel)
            .cloned()
            .ok_or_else(|| Error::InputRejected(format!("no session for channel {channel}")))
    }

    /// The cancellation handle for `channel`'s push-approval prompt, if a
    /// session is live. A [`PushApprovalCollector`](crate::approval::PushApprovalCollector)
    /// races this against the button-click wait so [`Self::reset`] can cut
    /// an in-flight approval short.
    pub fn approval_cancel_handle(&self, channel: &str) -> Option<Arc<Notify>> {
        self.approval_cancels.lock().get(channel).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// `absent -> creating`: concurrent calls for the same channel share
    /// one creation (spec §5 invariant 2).
    async fn get_or_create_session(
        self: &Arc<Self>,
        channel: &str,
        creation: CreationRequest,
    ) -> Result<Arc<TokioMutex<Session<C>>>> {
        if let Some(existing) = self.sessions.lock().get(channel).cloned() {
            return Ok(existing);
        }

        let waiter = {
            let mut pending = self.pending_creations.lock();
            if let Some(existing) = pending.get(channel) {
                Some(existing.clone())
            } else {
                pending.insert(channel.to_string(), Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = waiter {
            notify.notified().await;
            return self.get(channel);
        }

        let result = self.create_session(channel, creation).await;
        if let Ok(session_arc) = &result {
            self.sessions.lock().insert(channel.to_string(), session_arc.clone());
            self.approval_cancels.lock().insert(channel.to_string(), Arc::new(Notify::new()));
        }
        if let Some(notify) = self.pending_creations.lock().remove(channel) {
            notify.notify_waiters();
        }
        result
    }

    async fn create_session(
        self: &Arc<Self>,
        channel: &str,
        creation: CreationRequest,
    ) -> Result<Arc<TokioMutex<Session<C>>>> {
        let (worktree_path, base_ref, agent_branch) = self
            .workspace
            .create_worktree(
                channel,
                &creation.project,
                &creation.repo_dir,
                creation.branch_override.as_deref(),
                &creation.global_default_branch,
            )
            .await?;

        let agent: Arc<dyn crate::agent::AgentSession> =
            Arc::from(self.factory.create_session(&worktree_path, &creation.model).await?);
        self.grants.restore(channel)?;

        let now = Utc::now();
        let record = SessionRecord {
            channel: channel.to_string(),
            project: creation.project.clone(),
            workspace_path: worktree_path.clone(),
            base_branch: base_ref.clone(),
            agent_branch: agent_branch.clone(),
            status: SessionStatus::Idle,
            paused: false,
            model: creation.model.clone(),
            last_activity: now,
            created_at: now,
        };
        self.store.upsert_session(&record)?;

        let output = Arc::new(
            OutputSink::new(
                Arc::new(ChannelHandleAdapter { platform: self.platform.clone() }),
                OutputTarget::MainChannel(channel.to_string()),
            )
            .with_min_flush_interval(self.output_flush_interval),
        );

        let session = Session {
            channel: channel.to_string(),
            project: creation.project,
            repo_dir: creation.repo_dir,
            workspace_path: worktree_path,
            base_branch: base_ref,
            agent_branch,
            model: creation.model,
            status: RuntimeStatus::Idle,
            paused: false,
            generation: 0,
            current_aborted: false,
            queue: crate::queue::TaskQueue::new(),
            agent,
            output,
            awaiting_question: false,
            changing_model: false,
            last_activity: now,
            idle_warned_at: None,
        };
        Ok(Arc::new(TokioMutex::new(session)))
    }

    /// Enqueue a task for `channel`, creating its session first if absent.
    /// Rejects with `InputRejected` if the queue is already full (spec §8
    /// scenario 5); does not mutate existing queue state in that case.
    pub async fn enqueue_task(
        self: &Arc<Self>,
        channel: &str,
        creation: CreationRequest,
        prompt: String,
        submitter: Option<String>,
        timeout: Duration,
    ) -> Result<()> {
        let session_arc = self.get_or_create_session(channel, creation).await?;
        {
            let mut session = session_arc.lock().await;
            session.queue.push(QueuedTask {
                prompt,
                submitter,
                timeout,
                enqueued_at: Utc::now(),
            })?;
            session.last_activity = Utc::now();
        }
        self.process_queue(channel, &session_arc).await;
        Ok(())
    }

    /// `idle -> working`: dequeue and run the next task iff unpaused, a
    /// model swap isn't in progress, and the queue is non-empty.
    ///
    /// Boxed rather than a plain `async fn`: this and [`Self::run_task`]
    /// call each other across a `tokio::spawn` boundary, and the mutual
    /// recursion would otherwise give the compiler an infinitely-sized
    /// future type.
    fn process_queue<'a>(
        self: &'a Arc<Self>,
        channel: &'a str,
        session_arc: &'a Arc<TokioMutex<Session<C>>>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let task = {
                let mut session = session_arc.lock().await;
                if session.paused || session.changing_model || session.status != RuntimeStatus::Idle {
                    return;
                }
                let Some(task) = session.queue.pop() else {
                    return;
                };
                session.status = RuntimeStatus::Working;
                session.generation += 1;
                session.current_aborted = false;
                task
            };

            let generation = session_arc.lock().await.generation;
            let row_id = self
                .store
                .insert_task(&TaskHistoryRow {
                    id: 0,
                    channel: channel.to_string(),
                    prompt: task.prompt.clone(),
                    status: TaskStatus::Running,
                    started_at: Utc::now(),
                    completed_at: None,
                    timeout_ms: Some(task.timeout.as_millis() as u64),
                    submitter: task.submitter.clone(),
                })
                .ok();

            let this = self.clone();
            let channel = channel.to_string();
            let session_arc = session_arc.clone();
            tokio::spawn(async move {
                this.run_task(channel, session_arc, task, generation, row_id).await;
            });
        })
    }

    /// `working -> idle`: runs one task to completion (or abort/timeout),
    /// finalizes task-history and the output sink, then kicks the queue
    /// again unless paused.
    async fn run_task(
        self: Arc<Self>,
        channel: String,
        session_arc: Arc<TokioMutex<Session<C>>>,
        task: QueuedTask,
        generation: u64,
        row_id: Option<i64>,
    ) {
        let (agent, output) = {
            let session = session_arc.lock().await;
            (session.agent.clone(), session.output.clone())
        };
        // Lock released before the (possibly long) task runs, so abort/
        // pause/enqueue aren't blocked for the duration (spec §5).
        let result = agent.send_and_wait(&task.prompt, task.timeout).await;

        let was_aborted = session_arc.lock().await.current_aborted;
        if matches!(result, Err(Error::AgentTimeout(_))) {
            agent.abort().await;
        }

        let outcome = if was_aborted {
            Outcome::Aborted
        } else {
            match &result {
                Ok(_) => Outcome::Completed,
                Err(Error::AgentTimeout(_)) => Outcome::TimedOut,
                Err(_) => Outcome::Failed,
            }
        };

        // Stale generation: a reset or a later task already took over.
        // Discard silently rather than overwriting newer output.
        if session_arc.lock().await.generation != generation {
            return;
        }

        if let Ok(text) = &result {
            let _ = output.append(text).await;
        }
        let epilogue = match outcome {
            Outcome::Completed => None,
            Outcome::Aborted => Some("_task aborted_".to_string()),
            Outcome::TimedOut => Some("_task timed out_".to_string()),
            Outcome::Failed => Some(format!(
                "_task failed: {}_",
                result.as_ref().err().map(|e| e.to_string()).unwrap_or_default()
            )),
        };
        let _ = output.finish(epilogue.as_deref()).await;

        let task_status = match outcome {
            Outcome::Completed => TaskStatus::Completed,
            Outcome::Aborted | Outcome::TimedOut => TaskStatus::Aborted,
            Outcome::Failed => TaskStatus::Failed,
        };
        if let Some(id) = row_id {
            let _ = self.store.complete_task(id, task_status, Utc::now());
        }

        let paused = {
            let mut session = session_arc.lock().await;
            if session.generation == generation {
                session.status = RuntimeStatus::Idle;
                session.last_activity = Utc::now();
            }
            session.paused
        };
        if !paused {
            self.process_queue(&channel, &session_arc).await;
        }
    }

    /// A user abort: cancels the in-flight task (if any), optionally clears
    /// the queue, and leaves the session `idle` once the agent's abort call
    /// completes and `run_task` notices `current_aborted`.
    pub async fn abort(&self, channel: &str, clear_queue: bool) -> Result<()> {
        let session_arc = self.get(channel)?;
        let mut session = session_arc.lock().await;
        if session.status == RuntimeStatus::Working {
            session.current_aborted = true;
            session.agent.abort().await;
        }
        if clear_queue {
            session.queue.clear();
        }
        Ok(())
    }

    pub async fn pause(&self, channel: &str) -> Result<()> {
        let session_arc = self.get(channel)?;
        {
            let mut session = session_arc.lock().await;
            session.paused = true;
        }
        if let Some(mut record) = self.store.get_session(channel)? {
            record.paused = true;
            self.store.upsert_session(&record)?;
        }
        Ok(())
    }

    pub async fn resume(self: &Arc<Self>, channel: &str) -> Result<()> {
        let session_arc = self.get(channel)?;
        {
            let mut session = session_arc.lock().await;
            session.paused = false;
        }
        if let Some(mut record) = self.store.get_session(channel)? {
            record.paused = false;
            self.store.upsert_session(&record)?;
        }
        self.process_queue(channel, &session_arc).await;
        Ok(())
    }

    /// `any -> absent`: destroy the agent session and the workspace, drop
    /// the durable row.
    pub async fn reset(&self, channel: &str) -> Result<()> {
        let removed = self.sessions.lock().remove(channel);
        if let Some(cancel) = self.approval_cancels.lock().remove(channel) {
            cancel.notify_one();
        }
        if let Some(session_arc) = removed {
            let session = session_arc.lock().await;
            session.agent.abort().await;
            session.agent.destroy().await;
            let _ = self.workspace.remove_worktree(&session.repo_dir, &session.workspace_path).await;
        }
        self.store.delete_session(channel)?;
        Ok(())
    }

    /// Model hot-swap: create a new agent session on the new model; only
    /// on success destroy the old one and persist the change. Refused
    /// while `status = working`. Blocks the queue (`changing_model`) for
    /// the duration of the swap.
    pub async fn set_model(&self, channel: &str, new_model: String) -> Result<()> {
        let session_arc = self.get(channel)?;
        let workdir = {
            let mut session = session_arc.lock().await;
            if session.status == RuntimeStatus::Working {
                return Err(Error::InputRejected("cannot change model while a task is running".into()));
            }
            session.changing_model = true;
            session.workspace_path.clone()
        };

        let new_agent = self.factory.create_session(&workdir, &new_model).await;

        let mut session = session_arc.lock().await;
        session.changing_model = false;
        match new_agent {
            Ok(agent) => {
                let agent: Arc<dyn crate::agent::AgentSession> = Arc::from(agent);
                let old = std::mem::replace(&mut session.agent, agent);
                old.destroy().await;
                session.model = new_model.clone();
                drop(session);
                if let Some(mut record) = self.store.get_session(channel)? {
                    record.model = new_model;
                    self.store.upsert_session(&record)?;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn status(&self, channel: &str) -> Result<(RuntimeStatus, bool, usize)> {
        let session_arc = self.get(channel)?;
        let session = session_arc.lock().await;
        Ok((session.status, session.paused, session.queue.len()))
    }

    /// Pause-grace / idle sweep (spec §4.5): decide and apply an action for
    /// every live session. `Warn` records the in-memory warning timestamp;
    /// `DestroyNow`/`DestroyAfterGrace` tear the session down via
    /// [`Self::reset`]. Returns the action taken per channel so the caller
    /// can post a warning message where one is due.
    pub async fn sweep_idle_and_paused(&self) -> Vec<(String, crate::lifecycle::SweepAction)> {
        let channels: Vec<String> = self.sessions.lock().keys().cloned().collect();
        let now = Utc::now();
        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            let Some(session_arc) = self.sessions.lock().get(&channel).cloned() else {
                continue;
            };
            let action = {
                let session = session_arc.lock().await;
                crate::lifecycle::evaluate_pause_grace(
                    session.last_activity,
                    now,
                    session.paused,
                    session.queue.is_empty(),
                    session.idle_warned_at,
                )
            };
            match action {
                crate::lifecycle::SweepAction::None => {}
                crate::lifecycle::SweepAction::Warn => {
                    session_arc.lock().await.idle_warned_at = Some(now);
                }
                crate::lifecycle::SweepAction::DestroyNow | crate::lifecycle::SweepAction::DestroyAfterGrace => {
                    let _ = self.reset(&channel).await;
                }
            }
            results.push((channel, action));
        }
        results
    }
}
