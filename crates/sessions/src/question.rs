//! Question-answer flow (spec §4.5 "Question-answer flow"). When the agent
//! SDK's user-input hook fires, the session posts the question and waits
//! for a reply from an authorized responder. The caller is responsible for
//! setting/clearing the session's `awaiting_question` flag so normal
//! message handling doesn't re-enqueue the reply as a new task while this
//! is in flight.

use std::sync::Arc;
use std::time::Duration;

use sg_domain::model::OutputTarget;

use crate::chat::ChatPlatform;

pub const QUESTION_DEADLINE: Duration = Duration::from_secs(300);

pub struct QuestionCollector<C: ChatPlatform> {
    platform: Arc<C>,
}

impl<C: ChatPlatform> QuestionCollector<C> {
    pub fn new(platform: Arc<C>) -> Self {
        Self { platform }
    }

    /// Post `question` and wait up to [`QUESTION_DEADLINE`] for a reply
    /// from one of `authorized_responders`. `None` on timeout.
    pub async fn ask(&self, target: &OutputTarget, question: &str, authorized_responders: &[String]) -> Option<String> {
        if self.platform.send_message(target, question).await.is_err() {
            return None;
        }
        self.platform
            .collect_message(target, authorized_responders, QUESTION_DEADLINE)
            .await
            .map(|m| m.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::IncomingMessage;
    use crate::mock::MockChatPlatform;

    fn target() -> OutputTarget {
        OutputTarget::MainChannel("chan-1".into())
    }

    #[tokio::test]
    async fn authorized_reply_resolves_the_question() {
        let platform = Arc::new(MockChatPlatform::new());
        platform.queue_message(IncomingMessage { user: "admin".into(), content: "yes, go ahead".into() });
        let collector = QuestionCollector::new(platform.clone());
        let answer = collector.ask(&target(), "should I proceed?", &["admin".into()]).await;
        assert_eq!(answer.as_deref(), Some("yes, go ahead"));
        assert_eq!(platform.sent_messages()[0].1, "should I proceed?");
    }

    #[tokio::test]
    async fn unauthorized_reply_is_ignored_and_times_out() {
        let platform = Arc::new(MockChatPlatform::new());
        platform.queue_message(IncomingMessage { user: "intruder".into(), content: "nope".into() });
        let collector = QuestionCollector::new(platform.clone());
        let answer = collector.ask(&target(), "should I proceed?", &["admin".into()]).await;
        assert!(answer.is_none());
    }

    #[tokio::test]
    async fn no_reply_times_out() {
        let platform = Arc::new(MockChatPlatform::new());
        let collector = QuestionCollector::new(platform.clone());
        let answer = collector.ask(&target(), "should I proceed?", &["admin".into()]).await;
        assert!(answer.is_none());
    }
}
