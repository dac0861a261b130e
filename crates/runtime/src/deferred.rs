//! "Run on the next tick" task queue.

use std::collections::VecDeque;

type Task<C> = Box<dyn FnOnce(&mut C)>;

/// Tasks queued against a context `C` and drained once per tick.
pub(crate) struct DeferredQueue<C> {
    tasks: VecDeque<Task<C>>,
}

impl<C> DeferredQueue<C> {
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
        }
    }

    pub fn push(&mut self, task: Task<C>) {
        self.tasks.push_back(task);
    }

    /// Removes and returns every task queued so far. Tasks pushed while the
    /// returned batch runs wait for the next drain.
    pub fn take_batch(&mut self) -> VecDeque<Task<C>> {
        std::mem::take(&mut self.tasks)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}
