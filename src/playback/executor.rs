use parking_lot::Mutex;
use std::collections::VecDeque;

/// A unit of background work. It reports back over a channel, never by return value.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs analysis off the tick loop.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs each task on the global rayon pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct RayonExecutor;

impl Executor for RayonExecutor {
    fn execute(&self, task: Task) {
        rayon::spawn(task);
    }
}

/// Runs each task immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Holds tasks until the host steps them, in any order it likes.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs the oldest queued task. Returns false when nothing was queued.
    pub fn run_oldest(&self) -> bool {
        let task = self.queue.lock().pop_front();
        task.map(|task| task()).is_some()
    }

    /// Runs the most recently queued task.
    pub fn run_newest(&self) -> bool {
        let task = self.queue.lock().pop_back();
        task.map(|task| task()).is_some()
    }

    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_oldest() {
            ran += 1;
        }
        ran
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, task: Task) {
        self.queue.lock().push_back(task);
    }
}
