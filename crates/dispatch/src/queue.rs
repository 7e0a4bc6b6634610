//! Bounded task queue
//!
//! A multi-producer/multi-consumer FIFO shared by the HTTP handlers (producers)
//! and the device workers (consumers). Producers never wait: an enqueue either
//! succeeds immediately or fails with [`EnqueueError::Full`]. Consumers park on
//! [`TaskQueue::dequeue`] until a task arrives or the queue is closed.
//!
//! Ordering is global: the oldest admitted task is handed to whichever worker
//! asks next.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::task::TaskRecord;

/// Enqueue failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// The queue holds `capacity` tasks already
    #[error("task queue is full")]
    Full,

    /// The queue was closed by the supervisor
    #[error("task queue is closed")]
    Closed,
}

struct QueueInner {
    tasks: VecDeque<TaskRecord>,
    closed: bool,
}

/// Bounded FIFO of task records
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    available: Notify,
    capacity: usize,
}

impl TaskQueue {
    /// Create a queue holding at most `capacity` tasks (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                tasks: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the number of queued tasks
    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Append a task without blocking.
    ///
    /// Returns the queue depth including the new task.
    pub fn try_enqueue(&self, task: TaskRecord) -> Result<usize, EnqueueError> {
        let depth = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(EnqueueError::Closed);
            }
            if inner.tasks.len() >= self.capacity {
                return Err(EnqueueError::Full);
            }
            inner.tasks.push_back(task);
            inner.tasks.len()
        };

        self.available.notify_one();
        Ok(depth)
    }

    /// Wait for the oldest task.
    ///
    /// Returns `None` once the queue is closed. Tasks still queued at that
    /// point are left for [`TaskQueue::drain`].
    pub async fn dequeue(&self) -> Option<TaskRecord> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return None;
                }
                if let Some(task) = inner.tasks.pop_front() {
                    return Some(task);
                }
            }

            notified.await;
        }
    }

    /// Stop admitting tasks and wake every parked consumer
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Remove and return every queued task
    pub fn drain(&self) -> Vec<TaskRecord> {
        self.inner.lock().tasks.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn task(seed: u64) -> TaskRecord {
        TaskRecord::new("a cat".into(), 512, 512, seed, 4, 0.0)
    }

    #[test]
    fn test_rejects_beyond_capacity() {
        let queue = TaskQueue::new(2);

        assert_eq!(queue.try_enqueue(task(1)), Ok(1));
        assert_eq!(queue.try_enqueue(task(2)), Ok(2));
        assert_eq!(queue.try_enqueue(task(3)), Err(EnqueueError::Full));
        assert_eq!(queue.len(), 2);
        assert!(queue.is_full());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let queue = TaskQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new(10);
        for seed in 0..5 {
            queue.try_enqueue(task(seed)).unwrap();
        }

        for seed in 0..5 {
            assert_eq!(queue.dequeue().await.unwrap().seed(), seed);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_producer() {
        let queue = Arc::new(TaskQueue::new(4));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.try_enqueue(task(7)).unwrap();
        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.map(|t| t.seed()), Some(7));
    }

    #[tokio::test]
    async fn test_close_wakes_consumers_and_rejects_producers() {
        let queue = Arc::new(TaskQueue::new(4));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.dequeue().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        for consumer in consumers {
            let result = tokio::time::timeout(Duration::from_secs(1), consumer)
                .await
                .unwrap()
                .unwrap();
            assert!(result.is_none());
        }
        assert_eq!(queue.try_enqueue(task(1)), Err(EnqueueError::Closed));
    }

    #[test]
    fn test_drain_empties_queue() {
        let queue = TaskQueue::new(4);
        queue.try_enqueue(task(1)).unwrap();
        queue.try_enqueue(task(2)).unwrap();

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }
}
