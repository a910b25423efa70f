use std::time::Duration;

pub(crate) const PERF_WINDOW_LEN: usize = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct RollingMs {
    pub last_ms: f32,
    pub avg_ms: f32,
    pub max_ms: f32,
}

/// Rolling sim and render timings for the debug panel.
#[derive(Debug, Default)]
pub(crate) struct PerfStats {
    sim: MsWindow,
    render: MsWindow,
}

impl PerfStats {
    pub(crate) fn record_sim(&mut self, duration: Duration) {
        self.sim.push(duration.as_secs_f32() * 1000.0);
    }

    pub(crate) fn record_render(&mut self, duration: Duration) {
        self.render.push(duration.as_secs_f32() * 1000.0);
    }

    pub(crate) fn sim(&self) -> RollingMs {
        self.sim.stats()
    }

    pub(crate) fn render(&self) -> RollingMs {
        self.render.stats()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        [("SIM", self.sim()), ("REN", self.render())]
            .into_iter()
            .map(|(label, stats)| {
                format!(
                    "{label} {:.1} AVG {:.1} MAX {:.1}",
                    stats.last_ms, stats.avg_ms, stats.max_ms
                )
            })
            .collect()
    }
}

#[derive(Debug)]
struct MsWindow {
    samples: [f32; PERF_WINDOW_LEN],
    next: usize,
    filled: usize,
    sum: f32,
    last: f32,
}

impl Default for MsWindow {
    fn default() -> Self {
        Self {
            samples: [0.0; PERF_WINDOW_LEN],
            next: 0,
            filled: 0,
            sum: 0.0,
            last: 0.0,
        }
    }
}

impl MsWindow {
    fn push(&mut self, value: f32) {
        self.last = value;
        if self.filled == PERF_WINDOW_LEN {
            self.sum -= self.samples[self.next];
        } else {
            self.filled += 1;
        }
        self.samples[self.next] = value;
        self.sum += value;
        self.next = (self.next + 1) % PERF_WINDOW_LEN;
    }

    fn stats(&self) -> RollingMs {
        if self.filled == 0 {
            return RollingMs::default();
        }
        RollingMs {
            last_ms: self.last,
            avg_ms: self.sum / self.filled as f32,
            max_ms: self.samples[..self.filled]
                .iter()
                .copied()
                .fold(f32::MIN, f32::max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_are_zeroed() {
        let stats = PerfStats::default();
        assert_eq!(stats.sim(), RollingMs::default());
        assert_eq!(stats.render(), RollingMs::default());
    }

    #[test]
    fn partial_window_averages_pushed_samples_only() {
        let mut window = MsWindow::default();
        for value in [1.0, 2.0, 3.0] {
            window.push(value);
        }
        let stats = window.stats();
        assert_eq!(stats.last_ms, 3.0);
        assert!((stats.avg_ms - 2.0).abs() < 0.0001);
        assert_eq!(stats.max_ms, 3.0);
    }

    #[test]
    fn evicted_max_is_forgotten() {
        let mut window = MsWindow::default();
        window.push(100.0);
        for _ in 1..PERF_WINDOW_LEN {
            window.push(10.0);
        }
        window.push(20.0);
        let stats = window.stats();

        let expected_avg = ((PERF_WINDOW_LEN as f32 - 1.0) * 10.0 + 20.0) / PERF_WINDOW_LEN as f32;
        assert_eq!(stats.max_ms, 20.0);
        assert!((stats.avg_ms - expected_avg).abs() < 0.001);
    }

    #[test]
    fn lines_format_sim_and_render() {
        let mut stats = PerfStats::default();
        stats.record_sim(Duration::from_micros(1_500));
        stats.record_render(Duration::from_millis(4));
        assert_eq!(
            stats.lines(),
            vec![
                "SIM 1.5 AVG 1.5 MAX 1.5".to_string(),
                "REN 4.0 AVG 4.0 MAX 4.0".to_string()
            ]
        );
    }
}
