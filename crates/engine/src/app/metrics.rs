use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

static POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn recover<G>(operation: &'static str, poisoned: PoisonError<G>) -> G {
    if !POISON_WARNED.swap(true, Ordering::Relaxed) {
        warn!(operation, "metrics_lock_poisoned");
    }
    poisoned.into_inner()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub render_time_ms: f32,
    /// Frames in the interval that reused the previous color target.
    pub skipped_frames: u32,
}

/// Shared view of the latest loop metrics, readable from outside the event loop.
#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        *self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| recover("read", poisoned))
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| recover("write", poisoned)) = snapshot;
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames: u32,
    ticks: u32,
    skipped_frames: u32,
    frame_time_sum: Duration,
    render_time_sum: Duration,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_start: Instant::now(),
            interval,
            frames: 0,
            ticks: 0,
            skipped_frames: 0,
            frame_time_sum: Duration::ZERO,
            render_time_sum: Duration::ZERO,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration, render_dt: Duration, skipped: bool) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
        self.render_time_sum = self.render_time_sum.saturating_add(render_dt);
        if skipped {
            self.skipped_frames = self.skipped_frames.saturating_add(1);
        }
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let average_ms = |sum: Duration| {
            if self.frames == 0 {
                0.0
            } else {
                sum.as_secs_f32() * 1000.0 / self.frames as f32
            }
        };
        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            tps: self.ticks as f32 / elapsed_seconds,
            frame_time_ms: average_ms(self.frame_time_sum),
            render_time_ms: average_ms(self.render_time_sum),
            skipped_frames: self.skipped_frames,
        };

        *self = Self {
            interval_start: now,
            ..Self::new(self.interval)
        };
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn poison(handle: &MetricsHandle) {
        let lock = Arc::clone(&handle.snapshot);
        let _ = thread::spawn(move || {
            let _guard = lock.write().expect("write guard");
            panic!("poison metrics lock");
        })
        .join();
    }

    #[test]
    fn snapshot_averages_frame_and_render_time() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();

        accumulator.record_frame(Duration::from_millis(16), Duration::from_millis(4), false);
        accumulator.record_frame(Duration::from_millis(16), Duration::from_millis(2), true);
        for _ in 0..4 {
            accumulator.record_tick();
        }

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("snapshot should be emitted");
        assert!((snapshot.fps - 2.0).abs() < 0.05);
        assert!((snapshot.tps - 4.0).abs() < 0.05);
        assert!((snapshot.frame_time_ms - 16.0).abs() < 0.001);
        assert!((snapshot.render_time_ms - 3.0).abs() < 0.001);
        assert_eq!(snapshot.skipped_frames, 1);
    }

    #[test]
    fn counters_restart_after_each_interval() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();
        accumulator.record_frame(Duration::from_millis(16), Duration::ZERO, true);
        assert!(accumulator
            .maybe_snapshot(base + Duration::from_millis(500))
            .is_none());

        let later = base + Duration::from_secs(1);
        assert!(accumulator.maybe_snapshot(later).is_some());
        let next = accumulator
            .maybe_snapshot(later + Duration::from_secs(1))
            .expect("second interval");
        assert_eq!(next.skipped_frames, 0);
        assert_eq!(next.fps, 0.0);
    }

    #[test]
    fn poisoned_lock_still_reads_and_publishes() {
        let handle = MetricsHandle::default();
        poison(&handle);
        assert_eq!(handle.snapshot(), LoopMetricsSnapshot::default());

        let expected = LoopMetricsSnapshot {
            fps: 15.0,
            tps: 60.0,
            frame_time_ms: 11.0,
            render_time_ms: 5.0,
            skipped_frames: 2,
        };
        handle.publish(expected);
        assert_eq!(handle.snapshot(), expected);
    }
}
