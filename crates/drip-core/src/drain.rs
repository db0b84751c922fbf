use std::collections::VecDeque;

/// Whether a drain cycle currently owns the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    Draining,
}

/// What the caller of [`DrainQueue::push`] has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The queue was idle: the caller must start a drain cycle.
    StartCycle,
    /// A cycle is already running and will pick the task up.
    AlreadyDraining,
}

/// FIFO of tasks released one at a time by a single drain cycle.
///
/// The state flips to [`DrainState::Draining`] on the push that finds the queue
/// idle and back to [`DrainState::Idle`] only when [`next_task`](Self::next_task)
/// finds it empty, so at most one cycle is ever told to start.
#[derive(Debug)]
pub struct DrainQueue<T> {
    tasks: VecDeque<T>,
    state: DrainState,
}

impl<T> Default for DrainQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DrainQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
            state: DrainState::Idle,
        }
    }

    pub fn push(&mut self, task: T) -> Wake {
        self.tasks.push_back(task);
        match self.state {
            DrainState::Idle => {
                self.state = DrainState::Draining;
                Wake::StartCycle
            }
            DrainState::Draining => Wake::AlreadyDraining,
        }
    }

    /// Pops the oldest task for the running cycle. Returns `None` and goes
    /// idle once the queue is empty.
    pub fn next_task(&mut self) -> Option<T> {
        let next = self.tasks.pop_front();
        if next.is_none() {
            self.state = DrainState::Idle;
        }
        next
    }

    /// Empties the queue without handing anything out and goes idle.
    pub fn release(&mut self) -> Vec<T> {
        self.state = DrainState::Idle;
        self.tasks.drain(..).collect()
    }

    /// Goes idle without touching queued tasks, for a cycle that died before
    /// it could drain them. The next push starts a new cycle.
    pub fn abandon_cycle(&mut self) {
        self.state = DrainState::Idle;
    }

    #[must_use]
    pub fn state(&self) -> DrainState {
        self.state
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{DrainQueue, DrainState, Wake};

    #[test]
    fn first_push_starts_a_cycle_and_later_pushes_join_it() {
        let mut queue = DrainQueue::new();

        assert_eq!(queue.push("t1"), Wake::StartCycle);
        assert_eq!(queue.push("t2"), Wake::AlreadyDraining);
        assert_eq!(queue.push("t3"), Wake::AlreadyDraining);
        assert_eq!(queue.state(), DrainState::Draining);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn next_task_is_fifo_and_goes_idle_when_empty() {
        let mut queue = DrainQueue::new();
        for task in ["t1", "t2", "t3"] {
            queue.push(task);
        }

        assert_eq!(queue.next_task(), Some("t1"));
        assert_eq!(queue.next_task(), Some("t2"));
        assert_eq!(queue.state(), DrainState::Draining);
        assert_eq!(queue.next_task(), Some("t3"));
        assert_eq!(queue.state(), DrainState::Draining);
        assert_eq!(queue.next_task(), None);
        assert_eq!(queue.state(), DrainState::Idle);
    }

    #[test]
    fn push_after_idle_requests_a_new_cycle() {
        let mut queue = DrainQueue::new();
        queue.push(1);
        assert_eq!(queue.next_task(), Some(1));
        assert_eq!(queue.next_task(), None);

        assert_eq!(queue.push(2), Wake::StartCycle);
    }

    #[test]
    fn push_while_last_task_runs_is_picked_up_by_same_cycle() {
        let mut queue = DrainQueue::new();
        queue.push(1);
        assert_eq!(queue.next_task(), Some(1));

        assert_eq!(queue.push(2), Wake::AlreadyDraining);
        assert_eq!(queue.next_task(), Some(2));
    }

    #[test]
    fn abandoned_cycle_keeps_tasks_for_the_next_one() {
        let mut queue = DrainQueue::new();
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.next_task(), Some(1));

        queue.abandon_cycle();

        assert_eq!(queue.state(), DrainState::Idle);
        assert_eq!(queue.push(3), Wake::StartCycle);
        assert_eq!(queue.next_task(), Some(2));
        assert_eq!(queue.next_task(), Some(3));
    }

    #[test]
    fn release_returns_unhandled_tasks_in_order() {
        let mut queue = DrainQueue::new();
        for task in [1, 2, 3] {
            queue.push(task);
        }
        let _ = queue.next_task();

        assert_eq!(queue.release(), vec![2, 3]);
        assert!(queue.is_empty());
        assert_eq!(queue.state(), DrainState::Idle);
    }
}
