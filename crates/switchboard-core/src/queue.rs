//! Bounded FIFO of tasks that no provider could admit.
//!
//! Tasks wait here until the orchestrator's sweep re-dispatches them. The
//! queue itself is passive; it never drops a task it has accepted.

use std::collections::VecDeque;
use std::sync::Mutex;

use switchboard_types::error::OrchestratorError;
use switchboard_types::task::RequestTask;

#[derive(Debug)]
pub struct DeferredQueue {
    tasks: Mutex<VecDeque<RequestTask>>,
    capacity: usize,
}

impl DeferredQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RequestTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `task` at the back. Returns its 1-based queue position, or
    /// `QueueFull` if the queue is at capacity.
    pub fn enqueue(&self, task: RequestTask) -> Result<usize, OrchestratorError> {
        let mut tasks = self.lock();
        if tasks.len() >= self.capacity {
            return Err(OrchestratorError::QueueFull {
                capacity: self.capacity,
            });
        }
        tasks.push_back(task);
        Ok(tasks.len())
    }

    /// Put a task taken by [`pop_front`](Self::pop_front) back at the head.
    ///
    /// Not subject to the capacity check, since the task already held a slot.
    pub fn requeue_front(&self, task: RequestTask) {
        self.lock().push_front(task);
    }

    /// Take the oldest task.
    pub fn pop_front(&self) -> Option<RequestTask> {
        self.lock().pop_front()
    }

    /// Copy of the waiting tasks, oldest first.
    pub fn pending(&self) -> Vec<RequestTask> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_types::task::TaskType;

    fn task(tokens: u64) -> RequestTask {
        RequestTask::new(TaskType::Default, tokens, serde_json::Value::Null)
    }

    #[test]
    fn fifo_order_and_positions() {
        let queue = DeferredQueue::new(4);
        let first = task(1);
        let first_id = first.id;
        assert_eq!(queue.enqueue(first).unwrap(), 1);
        assert_eq!(queue.enqueue(task(2)).unwrap(), 2);

        assert_eq!(queue.pop_front().unwrap().id, first_id);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn full_queue_rejects() {
        let queue = DeferredQueue::new(1);
        queue.enqueue(task(1)).unwrap();
        let err = queue.enqueue(task(2)).unwrap_err();
        assert!(matches!(err, OrchestratorError::QueueFull { capacity: 1 }));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn requeue_front_restores_head() {
        let queue = DeferredQueue::new(2);
        queue.enqueue(task(1)).unwrap();
        queue.enqueue(task(2)).unwrap();

        let head = queue.pop_front().unwrap();
        let head_id = head.id;
        queue.enqueue(task(3)).unwrap();
        queue.requeue_front(head);

        let pending = queue.pending();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].id, head_id);
        assert_eq!(pending[2].estimated_tokens, 3);
    }
}
