use std::fmt;

use tracing::debug;

type Continuation<T> = Box<dyn FnOnce(&mut T)>;

struct Queued<T> {
    key: &'static str,
    due_frame: u64,
    run: Continuation<T>,
}

/// Work deferred to the start of a later frame, so a "please wait" notice gets at least
/// one rendered frame before the slow operation runs.
pub struct FrameContinuations<T> {
    queued: Vec<Queued<T>>,
}

impl<T> Default for FrameContinuations<T> {
    fn default() -> Self {
        Self { queued: Vec::new() }
    }
}

impl<T> fmt::Debug for FrameContinuations<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.queued.iter().map(|queued| (queued.key, queued.due_frame)))
            .finish()
    }
}

impl<T> FrameContinuations<T> {
    /// Queues `run` for `delay_frames` after `frame`. A continuation already queued
    /// under `key` is dropped; returns true when that happened.
    pub fn queue(
        &mut self,
        key: &'static str,
        frame: u64,
        delay_frames: u64,
        run: impl FnOnce(&mut T) + 'static,
    ) -> bool {
        let before = self.queued.len();
        self.queued.retain(|queued| queued.key != key);
        let superseded = self.queued.len() != before;
        if superseded {
            debug!(key, "continuation_superseded");
        }
        self.queued.push(Queued {
            key,
            due_frame: frame.saturating_add(delay_frames.max(1)),
            run: Box::new(run),
        });
        superseded
    }

    pub fn is_queued(&self, key: &str) -> bool {
        self.queued.iter().any(|queued| queued.key == key)
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Removes every continuation due at `frame`, in queue order. The caller runs them
    /// against its own state.
    pub fn take_due(&mut self, frame: u64) -> Vec<(&'static str, Box<dyn FnOnce(&mut T)>)> {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queued)
            .into_iter()
            .partition(|queued| queued.due_frame <= frame);
        self.queued = waiting;
        due.into_iter().map(|queued| (queued.key, queued.run)).collect()
    }

    pub fn clear(&mut self) {
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_waits_at_least_one_frame() {
        let mut continuations = FrameContinuations::<Vec<&'static str>>::default();
        continuations.queue("export", 10, 0, |log| log.push("export"));

        assert!(continuations.take_due(10).is_empty());
        let mut log = Vec::new();
        for (_, run) in continuations.take_due(11) {
            run(&mut log);
        }
        assert_eq!(log, vec!["export"]);
        assert!(continuations.is_empty());
    }

    #[test]
    fn same_key_supersedes_queued_continuation() {
        let mut continuations = FrameContinuations::<Vec<&'static str>>::default();
        assert!(!continuations.queue("mode", 1, 1, |log| log.push("first")));
        assert!(continuations.queue("mode", 1, 2, |log| log.push("second")));
        continuations.queue("other", 1, 1, |log| log.push("other"));

        let mut log = Vec::new();
        for (_, run) in continuations.take_due(3) {
            run(&mut log);
        }
        assert_eq!(log, vec!["second", "other"]);
    }
}
