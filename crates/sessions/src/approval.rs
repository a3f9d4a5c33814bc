//! Push-Approval Collector (spec §4.4). Grounded on the teacher's
//! `gateway/src/runtime/approval.rs` "gate dangerous commands behind human
//! approval" shape, adapted from an in-process `oneshot` resolution to a
//! chat-platform button click, since that's the actual mechanism spec §4.4
//! describes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use sg_domain::model::OutputTarget;

use crate::chat::ChatPlatform;

pub const APPROVAL_DEADLINE: Duration = Duration::from_secs(600);
pub const SUMMARY_MAX_CHARS: usize = 900;

/// Collects human sign-off for a push-gated tool invocation.
pub struct PushApprovalCollector<C: ChatPlatform> {
    platform: Arc<C>,
}

impl<C: ChatPlatform> PushApprovalCollector<C> {
    pub fn new(platform: Arc<C>) -> Self {
        Self { platform }
    }

    /// Request approval for a push. `commit_log` and `diff_summary` are
    /// redaction-scanned and truncated to [`SUMMARY_MAX_CHARS`] before
    /// posting. Returns `true` only for an explicit admin approval; a
    /// rejection or timeout is not persisted anywhere — the next push
    /// attempt re-prompts from scratch. If `cancel` fires first (the
    /// session was reset while the prompt was outstanding), the prompt is
    /// deleted rather than resolved, and this returns `false`.
    pub async fn request(
        &self,
        target: &OutputTarget,
        commit_log: &str,
        diff_summary: &str,
        admin_users: &[String],
        auto_approve: bool,
        cancel: Option<Arc<Notify>>,
    ) -> bool {
        if auto_approve {
            return true;
        }

        let commit_log = sg_output::redact(&truncate(commit_log, SUMMARY_MAX_CHARS));
        let diff_summary = sg_output::redact(&truncate(diff_summary, SUMMARY_MAX_CHARS));
        let body = format!(
            "Approve push?\n\n**Commits**\n{commit_log}\n\n**Diff**\n{diff_summary}\n\n_approve / reject_"
        );

        let message = match self.platform.send_message(target, &body).await {
            Ok(m) => m,
            Err(_) => return false,
        };

        let click = tokio::select! {
            click = self.platform.collect_button(&message, admin_users, APPROVAL_DEADLINE) => click,
            _ = cancel_or_pending(&cancel) => {
                let _ = self.platform.delete_message(&message).await;
                return false;
            }
        };
        let approved = matches!(&click, Some(c) if c.label == "approve");
        let outcome = match &click {
            Some(c) if c.label == "approve" => "approved",
            Some(_) => "rejected",
            None => "timed out",
        };
        let _ = self
            .platform
            .edit_message(&message, &format!("{body}\n\n_Resolved: {outcome}_"))
            .await;
        approved
    }
}

/// Waits on `cancel` if one was supplied, else never resolves — lets
/// `tokio::select!` treat "no cancellation handle" and "not yet cancelled"
/// identically.
async fn cancel_or_pending(cancel: &Option<Arc<Notify>>) {
    match cancel {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ButtonClick;
    use crate::mock::MockChatPlatform;

    fn target() -> OutputTarget {
        OutputTarget::MainChannel("chan-1".into())
    }

    #[tokio::test]
    async fn auto_approve_bypasses_the_collector_entirely() {
        let platform = Arc::new(MockChatPlatform::new());
        let collector = PushApprovalCollector::new(platform.clone());
        let approved = collector
            .request(&target(), "commit log", "diff", &["admin".into()], true, None)
            .await;
        assert!(approved);
        assert!(platform.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn admin_approval_resolves_true_and_edits_the_prompt() {
        let platform = Arc::new(MockChatPlatform::new());
        platform.queue_button_click(ButtonClick::approve("admin"));
        let collector = PushApprovalCollector::new(platform.clone());
        let approved = collector
            .request(&target(), "commit log", "diff", &["admin".into()], false, None)
            .await;
        assert!(approved);
        let edits = platform.edits();
        assert!(edits.last().unwrap().1.contains("Resolved: approved"));
    }

    #[tokio::test]
    async fn rejection_resolves_false() {
        let platform = Arc::new(MockChatPlatform::new());
        platform.queue_button_click(ButtonClick::reject("admin"));
        let collector = PushApprovalCollector::new(platform.clone());
        let approved = collector
            .request(&target(), "commit log", "diff", &["admin".into()], false, None)
            .await;
        assert!(!approved);
        assert!(platform.edits().last().unwrap().1.contains("Resolved: rejected"));
    }

    #[tokio::test]
    async fn timeout_resolves_false() {
        let platform = Arc::new(MockChatPlatform::new());
        let collector = PushApprovalCollector::new(platform.clone());
        let approved = collector
            .request(&target(), "commit log", "diff", &["admin".into()], false, None)
            .await;
        assert!(!approved);
        assert!(platform.edits().last().unwrap().1.contains("Resolved: timed out"));
    }

    #[tokio::test]
    async fn post_failure_resolves_false() {
        let platform = Arc::new(MockChatPlatform::new());
        platform.fail_next_send();
        let collector = PushApprovalCollector::new(platform.clone());
        let approved = collector
            .request(&target(), "commit log", "diff", &["admin".into()], false, None)
            .await;
        assert!(!approved);
    }

    #[tokio::test]
    async fn summary_text_is_truncated_and_redacted() {
        let platform = Arc::new(MockChatPlatform::new());
        platform.queue_button_click(ButtonClick::approve("admin"));
        let collector = PushApprovalCollector::new(platform.clone());
        let long_log = "x".repeat(2000);
        let secret_diff = format!("api_key={}", "a".repeat(40));
        collector
            .request(&target(), &long_log, &secret_diff, &["admin".into()], false, None)
            .await;
        let sent = &platform.sent_messages()[0];
        assert!(sent.1.len() < 2000);
        assert!(!sent.1.contains(&"a".repeat(40)));
    }

    #[tokio::test]
    async fn cancellation_deletes_the_prompt_and_resolves_false() {
        let platform = Arc::new(MockChatPlatform::new());
        platform.hang_collect_button();
        let collector = PushApprovalCollector::new(platform.clone());
        let cancel = Arc::new(Notify::new());
        let target = target();
        let admin_users = ["admin".into()];

        let request = collector.request(&target, "commit log", "diff", &admin_users, false, Some(cancel.clone()));
        tokio::pin!(request);

        // Give the request a turn to send its prompt and start waiting.
        tokio::task::yield_now().await;
        cancel.notify_one();
        let approved = request.await;

        assert!(!approved);
        assert_eq!(platform.deletes().len(), 1);
        assert!(platform.edits().is_empty());
    }
}
