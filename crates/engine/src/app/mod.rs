mod input;
mod loop_runner;
mod metrics;
mod perf_stats;
mod presenter;

pub use input::InputAction;
pub use loop_runner::{
    run_app, run_app_with_metrics, AppContent, AppError, LoopConfig, SLOW_FRAME_ENV_VAR,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
