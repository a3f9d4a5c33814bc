//! Queue & Session Machine: per-channel task queues, the `absent -> creating
//! -> (idle | working)` state machine, the Push-Approval Collector, and the
//! question-answer flow (spec §4.4/§4.5).

pub mod agent;
pub mod approval;
pub mod chat;
pub mod lifecycle;
pub mod machine;
pub mod mock;
pub mod queue;
pub mod question;
pub mod state;

pub use agent::{AgentEvent, AgentSession, AgentSessionFactory, GenEvent};
pub use approval::PushApprovalCollector;
pub use chat::{ButtonClick, ChannelHandleAdapter, ChannelInfo, ChatPlatform, IncomingMessage, UserInfo};
pub use lifecycle::{recover_from_crash, prune_task_history, evaluate_pause_grace, CrashRecovery, SweepAction};
pub use machine::{CreationRequest, SessionManager};
pub use queue::{QueuedTask, TaskQueue};
pub use question::QuestionCollector;
pub use state::{RuntimeStatus, Session};
