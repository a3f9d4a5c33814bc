use serde::Serialize;

/// Structured trace events emitted across the gateway crates. Each is
/// logged as a single `tracing::info!` with the event JSON attached, so a
/// log pipeline can index on `event` without parsing prose.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        channel: String,
        project: String,
    },
    SessionReset {
        channel: String,
        reason: String,
    },
    SessionDestroyed {
        channel: String,
        reason: String,
    },
    TaskEnqueued {
        channel: String,
        queue_depth: usize,
    },
    TaskStarted {
        channel: String,
        generation: u64,
    },
    TaskFinished {
        channel: String,
        generation: u64,
        status: String,
    },
    PolicyDenied {
        channel: String,
        tool: String,
        gate: String,
        reason: String,
    },
    GrantAdded {
        channel: String,
        path: String,
        mode: String,
        ttl_minutes: u32,
    },
    GrantRevoked {
        channel: String,
        path: String,
    },
    PushApprovalResolved {
        channel: String,
        approved: bool,
    },
    ModelHotSwap {
        channel: String,
        from: String,
        to: String,
        ok: bool,
    },
    CrashRecovered {
        channel: String,
        task_id: i64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "gateway_event");
    }
}
