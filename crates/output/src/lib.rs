//! Output Sink (spec §4.3): turns a stream of agent-generated text chunks
//! into a bounded sequence of chat messages, redacting secrets as it goes
//! and throttling how often it edits the platform.
//!
//! The external chat client is out of scope here — callers provide a
//! [`ChannelHandle`] implementation; this crate only owns the buffering,
//! redaction, splitting, and throttling policy around it.

mod redact;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex as TokioMutex;

use sg_domain::model::OutputTarget;

pub use redact::redact;

/// Characters of unconsumed raw text always held back from redaction
/// commit, so a secret split across two streaming chunks is caught once
/// the rest of it arrives.
pub const OVERLAP_WINDOW: usize = 120;
/// Preferred maximum length of a single chat message.
pub const SPLIT_THRESHOLD: usize = 1800;
/// Hard platform ceiling; content that can't be split below this goes out
/// as a file attachment instead.
pub const HARD_CEILING: usize = 1990;

pub type MessageRef = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The message was deleted, or the bot no longer has access to it.
    MessageGone,
    /// The platform rejected the edit/send (permissions, revoked token).
    Unauthorized,
    Other(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MessageGone => write!(f, "message no longer exists"),
            Self::Unauthorized => write!(f, "not authorized to edit message"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// The chat-platform operations the Output Sink needs. A real implementation
/// lives outside this crate; tests use an in-memory double.
#[async_trait::async_trait]
pub trait ChannelHandle: Send + Sync {
    async fn send(&self, target: &OutputTarget, content: &str) -> Result<MessageRef, ChannelError>;
    async fn edit(&self, message: &MessageRef, content: &str) -> Result<(), ChannelError>;
    async fn send_attachment(
        &self,
        target: &OutputTarget,
        filename: &str,
        content: &str,
    ) -> Result<MessageRef, ChannelError>;
}

struct Inner {
    /// Text appended by the caller, not yet redaction-committed.
    raw: String,
    /// Byte offset into `raw` already redacted and copied into `pending`.
    already_redacted: usize,
    /// Redacted text not yet assigned to any message.
    pending: String,
    /// The message currently open for further edits, and its full content.
    current: Option<(MessageRef, String)>,
    messages_sent: usize,
    attachments_sent: usize,
}

impl Inner {
    fn new() -> Self {
        Self {
            raw: String::new(),
            already_redacted: 0,
            pending: String::new(),
            current: None,
            messages_sent: 0,
            attachments_sent: 0,
        }
    }
}

/// Streams agent output into a chat channel: redacts secrets, splits long
/// runs across multiple messages, and coalesces bursty appends into a
/// throttled sequence of edits rather than one network call per chunk.
pub struct OutputSink<C: ChannelHandle> {
    channel: Arc<C>,
    target: OutputTarget,
    inner: TokioMutex<Inner>,
    flush_gate: TokioMutex<()>,
    rerun_requested: AtomicBool,
    finish_requested: AtomicBool,
    last_flush: TokioMutex<Option<Instant>>,
    min_flush_interval: Duration,
}

impl<C: ChannelHandle> OutputSink<C> {
    pub fn new(channel: Arc<C>, target: OutputTarget) -> Self {
        Self {
            channel,
            target,
            inner: TokioMutex::new(Inner::new()),
            flush_gate: TokioMutex::new(()),
            rerun_requested: AtomicBool::new(false),
            finish_requested: AtomicBool::new(false),
            last_flush: TokioMutex::new(None),
            min_flush_interval: Duration::from_millis(700),
        }
    }

    /// Override the default edit-throttle interval (tests want this at zero).
    pub fn with_min_flush_interval(mut self, interval: Duration) -> Self {
        self.min_flush_interval = interval;
        self
    }

    /// Append a chunk of newly generated text and (subject to throttling)
    /// flush it toward the channel.
    pub async fn append(&self, chunk: &str) -> Result<(), ChannelError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.inner.lock().await.raw.push_str(chunk);
        self.request_flush().await
    }

    /// Append an optional epilogue, flush everything with no overlap
    /// held back, and mark the sink finished.
    pub async fn finish(&self, epilogue: Option<&str>) -> Result<(), ChannelError> {
        if let Some(ep) = epilogue {
            if !ep.is_empty() {
                let mut inner = self.inner.lock().await;
                if !inner.raw.is_empty() {
                    inner.raw.push_str("\n\n");
                }
                inner.raw.push_str(ep);
            }
        }
        self.finish_requested.store(true, Ordering::SeqCst);
        self.request_flush().await
    }

    pub async fn messages_sent(&self) -> usize {
        self.inner.lock().await.messages_sent
    }

    pub async fn attachments_sent(&self) -> usize {
        self.inner.lock().await.attachments_sent
    }

    /// Either take the flush gate and run the flush loop, or — if a flush is
    /// already in progress — ask it to run one more pass after it's done.
    async fn request_flush(&self) -> Result<(), ChannelError> {
        match self.flush_gate.try_lock() {
            Ok(_guard) => self.run_flush_loop().await,
            Err(_) => {
                self.rerun_requested.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn run_flush_loop(&self) -> Result<(), ChannelError> {
        loop {
            self.rerun_requested.store(false, Ordering::SeqCst);
            self.throttle().await;
            let finishing = self.finish_requested.load(Ordering::SeqCst);
            self.do_flush_once(finishing).await?;
            *self.last_flush.lock().await = Some(Instant::now());
            if !self.rerun_requested.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
    }

    async fn throttle(&self) {
        if self.min_flush_interval.is_zero() {
            return;
        }
        let wait = {
            let last = *self.last_flush.lock().await;
            last.and_then(|t| self.min_flush_interval.checked_sub(t.elapsed()))
        };
        if let Some(d) = wait {
            if !d.is_zero() {
                tokio::time::sleep(d).await;
            }
        }
    }

    async fn do_flush_once(&self, finishing: bool) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;
        advance_redaction(&mut inner.raw, &mut inner.already_redacted, &mut inner.pending, finishing);
        trim_consumed_raw(&mut inner.raw, &mut inner.already_redacted);

        loop {
            if inner.pending.is_empty() {
                return Ok(());
            }

            let room = match &inner.current {
                Some((_, content)) => SPLIT_THRESHOLD.saturating_sub(content.len()),
                None => 0,
            };

            if room > 0 {
                let cap = floor_char_boundary(&inner.pending, room.min(inner.pending.len()));
                let (chunk, rest) = take_chunk(&inner.pending, cap);
                let (msg_ref, content) = inner.current.as_ref().unwrap();
                let mut new_content = content.clone();
                new_content.push_str(&chunk);
                let msg_ref = msg_ref.clone();
                match self.channel.edit(&msg_ref, &new_content).await {
                    Ok(()) => {
                        inner.current = Some((msg_ref, new_content));
                        inner.pending = rest;
                        continue;
                    }
                    Err(ChannelError::MessageGone) | Err(ChannelError::Unauthorized) => {
                        inner.current = None;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let boundary = floor_char_boundary(&inner.pending, HARD_CEILING.min(inner.pending.len()));
            let unsplittable =
                inner.pending.len() > HARD_CEILING && !inner.pending[..boundary].contains(char::is_whitespace);

            if unsplittable {
                let name = format!("output-{}.txt", inner.attachments_sent + 1);
                let body = std::mem::take(&mut inner.pending);
                let msg_ref = self.channel.send_attachment(&self.target, &name, &body).await?;
                inner.attachments_sent += 1;
                inner.current = Some((msg_ref, String::new()));
                continue;
            }

            let cap = floor_char_boundary(&inner.pending, SPLIT_THRESHOLD.min(inner.pending.len()));
            let (chunk, rest) = take_chunk(&inner.pending, cap);
            let msg_ref = self.channel.send(&self.target, &chunk).await?;
            inner.messages_sent += 1;
            inner.current = Some((msg_ref, chunk));
            inner.pending = rest;
        }
    }
}

/// Move whatever of `raw[already_redacted..]` is now safe to commit into
/// `pending`, holding back the last `OVERLAP_WINDOW` characters unless
/// `finishing` (nothing more is ever coming).
fn advance_redaction(raw: &str, already_redacted: &mut usize, pending: &mut String, finishing: bool) {
    let window = &raw[*already_redacted..];
    if window.is_empty() {
        return;
    }
    let scanned = redact(window);
    let safe_len = if finishing {
        scanned.len()
    } else {
        scanned.len().saturating_sub(OVERLAP_WINDOW)
    };
    let safe_len = floor_char_boundary(&scanned, safe_len);
    if safe_len == 0 {
        return;
    }
    pending.push_str(&scanned[..safe_len]);
    *already_redacted += safe_len;
}

/// Drop the already-redacted prefix of `raw` once it's grown large, so the
/// buffer we rescan each flush stays bounded by the overlap window instead
/// of the whole session's output.
fn trim_consumed_raw(raw: &mut String, already_redacted: &mut usize) {
    if *already_redacted > 4096 {
        raw.drain(..*already_redacted);
        *already_redacted = 0;
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Split `cap` bytes off the front of `pending`, preferring a trailing
/// newline, then a trailing space past 70% of `cap`, else an exact cut.
fn take_chunk(pending: &str, cap: usize) -> (String, String) {
    if pending.len() <= cap {
        return (pending.to_string(), String::new());
    }
    let window = &pending[..cap];
    if let Some(pos) = window.rfind('\n') {
        return (pending[..pos + 1].to_string(), pending[pos + 1..].to_string());
    }
    let min_pos = (cap as f64 * 0.7) as usize;
    if let Some(pos) = window.rfind(' ') {
        if pos >= min_pos {
            return (pending[..pos].to_string(), pending[pos + 1..].to_string());
        }
    }
    (pending[..cap].to_string(), pending[cap..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct MockChannel {
        sent: StdMutex<Vec<String>>,
        edits: StdMutex<Vec<String>>,
        attachments: StdMutex<Vec<(String, String)>>,
        next_id: StdMutex<u64>,
        gone_once: StdMutex<Option<MessageRef>>,
    }

    impl MockChannel {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
                edits: StdMutex::new(Vec::new()),
                attachments: StdMutex::new(Vec::new()),
                next_id: StdMutex::new(0),
                gone_once: StdMutex::new(None),
            }
        }

        fn fail_next_edit_to(&self, msg: &MessageRef) {
            *self.gone_once.lock().unwrap() = Some(msg.clone());
        }
    }

    #[async_trait::async_trait]
    impl ChannelHandle for MockChannel {
        async fn send(&self, _target: &OutputTarget, content: &str) -> Result<MessageRef, ChannelError> {
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            let msg_ref = format!("msg-{id}");
            self.sent.lock().unwrap().push(content.to_string());
            Ok(msg_ref)
        }

        async fn edit(&self, message: &MessageRef, content: &str) -> Result<(), ChannelError> {
            if self.gone_once.lock().unwrap().as_deref() == Some(message.as_str()) {
                *self.gone_once.lock().unwrap() = None;
                return Err(ChannelError::MessageGone);
            }
            self.edits.lock().unwrap().push(content.to_string());
            Ok(())
        }

        async fn send_attachment(
            &self,
            _target: &OutputTarget,
            filename: &str,
            content: &str,
        ) -> Result<MessageRef, ChannelError> {
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            let msg_ref = format!("att-{id}");
            self.attachments
                .lock()
                .unwrap()
                .push((filename.to_string(), content.to_string()));
            Ok(msg_ref)
        }
    }

    fn sink(channel: Arc<MockChannel>) -> OutputSink<MockChannel> {
        OutputSink::new(channel, OutputTarget::MainChannel("chan-1".into()))
            .with_min_flush_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn short_output_becomes_one_sent_message() {
        let channel = Arc::new(MockChannel::new());
        let sink = sink(channel.clone());
        sink.append("hello ").await.unwrap();
        sink.finish(Some("world")).await.unwrap();
        assert_eq!(sink.messages_sent().await, 1);
        assert_eq!(channel.sent.lock().unwrap().last().unwrap(), "hello \n\nworld");
    }

    #[tokio::test]
    async fn redacts_secret_split_across_two_chunks() {
        let channel = Arc::new(MockChannel::new());
        let sink = sink(channel.clone());
        sink.append("api_key=sk_live_abcdef").await.unwrap();
        sink.append("0123456789 done").await.unwrap();
        sink.finish(None).await.unwrap();
        let combined = channel.edits.lock().unwrap().last().cloned().unwrap_or_default();
        let full = if combined.is_empty() {
            channel.sent.lock().unwrap().last().cloned().unwrap()
        } else {
            combined
        };
        assert!(!full.contains("abcdef0123456789"), "leaked secret: {full}");
    }

    #[tokio::test]
    async fn long_output_splits_into_multiple_messages() {
        let channel = Arc::new(MockChannel::new());
        let sink = sink(channel.clone());
        let line = "x".repeat(60);
        for _ in 0..40 {
            sink.append(&format!("{line}\n")).await.unwrap();
        }
        sink.finish(None).await.unwrap();
        assert!(sink.messages_sent().await >= 2);
        for msg in channel.sent.lock().unwrap().iter() {
            assert!(msg.len() <= SPLIT_THRESHOLD);
        }
    }

    #[tokio::test]
    async fn splits_prefer_newline_boundary() {
        let channel = Arc::new(MockChannel::new());
        let sink = sink(channel.clone());
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!("line {i} {}\n", "y".repeat(40)));
        }
        sink.append(&text).await.unwrap();
        sink.finish(None).await.unwrap();
        let first = channel.sent.lock().unwrap()[0].clone();
        assert!(first.ends_with('\n'), "expected split on a newline boundary, got: {first:?}");
    }

    #[tokio::test]
    async fn unsplittable_overflow_goes_to_attachment() {
        let channel = Arc::new(MockChannel::new());
        let sink = sink(channel.clone());
        let blob = "a".repeat(HARD_CEILING + 500);
        sink.append(&blob).await.unwrap();
        sink.finish(None).await.unwrap();
        assert_eq!(sink.attachments_sent().await, 1);
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleted_message_is_recovered_with_a_fresh_send() {
        let channel = Arc::new(MockChannel::new());
        let sink = sink(channel.clone());
        sink.append("first chunk of output").await.unwrap();
        sink.finish(None).await.unwrap();
        let first_msg = format!("msg-{}", channel.next_id.lock().unwrap());

        channel.fail_next_edit_to(&first_msg);
        sink.append(" and more after the message was deleted").await.unwrap();
        sink.finish(None).await.unwrap();

        assert_eq!(sink.messages_sent().await, 2);
        assert_eq!(channel.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn take_chunk_prefers_newline_over_space() {
        let pending = "a".repeat(10) + "\n" + &"b".repeat(10) + " " + &"c".repeat(10);
        let (chunk, rest) = take_chunk(&pending, 15);
        assert!(chunk.ends_with('\n'));
        assert!(rest.starts_with('b'));
    }

    #[test]
    fn take_chunk_falls_back_to_hard_cutoff_without_boundaries() {
        let pending = "z".repeat(50);
        let (chunk, rest) = take_chunk(&pending, 20);
        assert_eq!(chunk.len(), 20);
        assert_eq!(rest.len(), 30);
    }
}
