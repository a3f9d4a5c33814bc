//! FIFO task queue with a bounded size (spec §8 scenario 5).

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use sg_domain::error::{Error, Result};

/// Maximum number of tasks allowed to sit in a session's queue behind the
/// one currently `working`. A full queue rejects further enqueues rather
/// than growing unbounded.
pub const MAX_QUEUE_SIZE: usize = 2;

#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub prompt: String,
    pub submitter: Option<String>,
    pub timeout: Duration,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<QueuedTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn push(&mut self, task: QueuedTask) -> Result<()> {
        if self.tasks.len() >= MAX_QUEUE_SIZE {
            return Err(Error::InputRejected(format!(
                "queue full ({} tasks already queued)",
                self.tasks.len()
            )));
        }
        self.tasks.push_back(task);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<QueuedTask> {
        self.tasks.pop_front()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(prompt: &str) -> QueuedTask {
        QueuedTask {
            prompt: prompt.into(),
            submitter: None,
            timeout: Duration::from_secs(60),
            enqueued_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_up_to_max_queue_size() {
        let mut q = TaskQueue::new();
        q.push(task("a")).unwrap();
        q.push(task("b")).unwrap();
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn rejects_past_max_queue_size_preserving_existing() {
        let mut q = TaskQueue::new();
        q.push(task("a")).unwrap();
        q.push(task("b")).unwrap();
        let err = q.push(task("c")).unwrap_err();
        assert!(matches!(err, Error::InputRejected(_)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn pop_is_fifo() {
        let mut q = TaskQueue::new();
        q.push(task("a")).unwrap();
        q.push(task("b")).unwrap();
        assert_eq!(q.pop().unwrap().prompt, "a");
        assert_eq!(q.pop().unwrap().prompt, "b");
        assert!(q.pop().is_none());
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut q = TaskQueue::new();
        q.push(task("a")).unwrap();
        q.clear();
        assert!(q.is_empty());
    }
}
