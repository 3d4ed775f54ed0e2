use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::warn;

use crate::frame::{AudioBatch, AudioFrame};

/// Bounded drop-oldest queue used on the audio path.
///
/// Overflow drops the oldest item: lossy capture is preferred over stalling
/// the stream behind a slow consumer.
pub struct DropOldestQueue<T> {
    label: &'static str,
    max_size: usize,
    inner: Mutex<VecDeque<T>>,
    notify: Notify,
}

/// Segmenter → dispatcher queue.
pub type BatchQueue = DropOldestQueue<AudioBatch>;
/// Capture source → segmenter queue.
pub type FrameQueue = DropOldestQueue<AudioFrame>;

impl BatchQueue {
    pub const DEFAULT_MAX_SIZE: usize = 100;

    pub fn for_batches() -> Self {
        Self::new("batch", Self::DEFAULT_MAX_SIZE)
    }
}

impl FrameQueue {
    pub fn for_frames(max_size: usize) -> Self {
        Self::new("frame", max_size)
    }
}

impl<T> DropOldestQueue<T> {
    pub fn new(label: &'static str, max_size: usize) -> Self {
        Self {
            label,
            max_size,
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, item: T) {
        {
            let mut queue = self.inner.lock().unwrap();
            if queue.len() >= self.max_size {
                queue.pop_front();
                warn!("{} queue overflow, dropping oldest entry", self.label);
            }
            queue.push_back(item);
        }
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Waits until an item is available.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
