use std::env;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use crate::level::LevelDef;
use crate::math::Vec3;
use crate::mode::Mode;
use crate::render::{RenderSettings, RenderStrategy, SoftwareDevice, SoftwarePainter, Target};
use crate::session::{Session, SessionParts};
use crate::sim::{BrainCatalog, SphereCollisionSystem};
use crate::{resolve_app_paths, StartupError};

use super::input::{Command, InputCollector, InputSnapshot};
use super::metrics::MetricsAccumulator;
use super::perf_stats::PerfStats;
use super::presenter::Presenter;
use super::{InputAction, MetricsHandle};

pub const SLOW_FRAME_ENV_VAR: &str = "SANDBOX_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub max_render_fps: Option<u32>,
    /// Frame time above which the next frame reuses the last image. Zero disables.
    pub frame_skip_budget_ms: u64,
    pub initial_mode: Mode,
    pub render: RenderSettings,
    /// World units per second for edit-mode camera panning.
    pub camera_pan_speed: f32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Sandbox".to_string(),
            window_width: 1280,
            window_height: 720,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_render_fps: None,
            frame_skip_budget_ms: 0,
            initial_mode: Mode::RunSim,
            render: RenderSettings::default(),
            camera_pan_speed: 12.0,
        }
    }
}

/// What the loop plays: a brain catalog and the level to open.
pub struct AppContent {
    pub catalog: BrainCatalog,
    pub level: LevelDef,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize presenter: {0}")]
    CreatePresenter(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(config: LoopConfig, content: AppContent) -> Result<(), AppError> {
    run_app_with_metrics(config, content, MetricsHandle::default())
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    content: AppContent,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        levels_dir = %app_paths.levels_dir.display(),
        cache_dir = %app_paths.cache_dir.display(),
        "startup"
    );

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let window_id = window.id();
    let mut presenter = Presenter::new(Arc::clone(&window)).map_err(AppError::CreatePresenter)?;
    let (width, height) = presenter.size();

    let thumbnail_path = app_paths.thumbnail_path(&content.level.name);
    let mut session = Session::new(
        SessionParts {
            device: Box::new(SoftwareDevice::new(width.max(1), height.max(1))),
            painter: Box::new(SoftwarePainter),
            collision: Box::new(SphereCollisionSystem::default()),
            catalog: content.catalog,
            render: config.render,
            autosave_path: Some(app_paths.autosave_path()),
        },
        content.level,
        config.initial_mode,
    );

    event_loop.set_control_flow(ControlFlow::Poll);

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let render_cap = config.max_render_fps.filter(|fps| *fps > 0);
    let render_frame_target = render_cap.map(|fps| Duration::from_secs_f64(1.0 / fps as f64));
    let frame_skip_budget = Duration::from_millis(config.frame_skip_budget_ms);

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        render_fps_cap = ?render_cap,
        frame_skip_budget_ms = frame_skip_budget.as_millis() as u64,
        "loop_config"
    );

    let mut input = InputCollector::default();
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut last_present_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut perf = PerfStats::default();
    let mut overlay_visible = false;
    let mut frame_skip = false;
    let mut shown_mode: Option<Mode> = None;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent {
                window_id: id,
                event,
            } if id == window_id => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(size) => match presenter.resize(size.width, size.height) {
                    Ok(true) => session.resize(size.width, size.height),
                    Ok(false) => {}
                    Err(error) => {
                        warn!(error = %error, "presenter_resize_failed");
                        window_target.exit();
                    }
                },
                WindowEvent::KeyboardInput { event, .. } => {
                    input.handle_key(event.physical_key, event.state);
                    if input.take_pressed(Command::Quit) {
                        info!(reason = "quit_key", "shutdown_requested");
                        window_target.exit();
                    }
                }
                WindowEvent::RedrawRequested => {
                    if input.take_pressed(Command::ToggleOverlay) {
                        overlay_visible = !overlay_visible;
                        info!(overlay_visible, "overlay_toggled");
                    }
                    if slow_frame_delay > Duration::ZERO {
                        // Debug perturbation only; not the render cap.
                        thread::sleep(slow_frame_delay);
                    }

                    let now = Instant::now();
                    let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                    last_frame_instant = now;
                    accumulator = accumulator.saturating_add(raw_frame_dt.min(max_frame_delta));

                    let sim_start = Instant::now();
                    let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
                    for _ in 0..step_plan.ticks_to_run {
                        let snapshot = input.snapshot_for_tick();
                        session.set_eyedropper(snapshot.is_down(InputAction::Eyedropper));
                        apply_commands(&mut session, &snapshot, &thumbnail_path);
                        pan_camera(
                            &mut session,
                            &snapshot,
                            fixed_dt_seconds,
                            config.camera_pan_speed,
                        );
                        session.update(fixed_dt_seconds);
                        metrics_accumulator.record_tick();
                    }
                    accumulator = step_plan.remaining_accumulator;
                    if step_plan.dropped_backlog > Duration::ZERO {
                        warn!(
                            dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                            max_ticks_per_frame, "sim_clamp_triggered"
                        );
                    }
                    let sim_elapsed = sim_start.elapsed();
                    perf.record_sim(sim_elapsed);

                    let cap_sleep = compute_cap_sleep(
                        Instant::now().saturating_duration_since(last_present_instant),
                        render_frame_target,
                    );
                    if cap_sleep > Duration::ZERO {
                        thread::sleep(cap_sleep);
                    }

                    let render_start = Instant::now();
                    let panel = overlay_visible.then(|| session.overlay_data(perf.lines()));
                    let report = session.render(frame_skip, panel.as_ref());
                    let render_elapsed = render_start.elapsed();
                    perf.record_render(render_elapsed);

                    match session.device().image(Target::BackBuffer) {
                        Ok(back_buffer) => match presenter.present(back_buffer) {
                            Ok(_) => {}
                            Err(error) => {
                                warn!(error = %error, "present_failed");
                                window_target.exit();
                            }
                        },
                        Err(error) => warn!(error = %error, "back_buffer_unavailable"),
                    }
                    last_present_instant = Instant::now();
                    frame_skip = should_frame_skip(raw_frame_dt, frame_skip_budget);

                    let mode = session.current_mode();
                    if shown_mode != Some(mode) {
                        presenter.set_title(&format!("{} - {mode:?}", config.window_title));
                        shown_mode = Some(mode);
                    }

                    metrics_accumulator.record_frame(
                        raw_frame_dt,
                        render_elapsed,
                        report.strategy == Some(RenderStrategy::FrameSkip),
                    );
                    if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
                        metrics_handle.publish(snapshot);
                        info!(
                            fps = snapshot.fps,
                            tps = snapshot.tps,
                            frame_time_ms = snapshot.frame_time_ms,
                            render_time_ms = snapshot.render_time_ms,
                            skipped_frames = snapshot.skipped_frames,
                            actor_count = session.world().len(),
                            budget_used = session.total_cost(),
                            mode = ?mode,
                            "loop_metrics"
                        );
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            Event::LoopExiting => {
                info!(frames = session.frame(), "shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

/// Maps one tick's command presses onto the session.
fn apply_commands(session: &mut Session, input: &InputSnapshot, thumbnail_path: &Path) {
    if input.pressed(Command::TogglePlay) {
        session.toggle_play();
    }
    if input.pressed(Command::Back) {
        let mode = session.current_mode();
        if mode.is_run_sim() {
            session.request_back();
        } else if mode != Mode::ToolMenu {
            session.set_mode(Mode::ToolMenu);
        } else {
            session.set_mode(Mode::RunSim);
        }
    }
    if input.pressed(Command::ExportThumbnail) {
        session.queue_thumbnail_export(thumbnail_path.to_path_buf());
    }
    if input.pressed(Command::Undo) {
        match session.undo_edit() {
            Ok(applied) => info!(applied, "undo_requested"),
            Err(error) => warn!(error = %error, "undo_failed"),
        }
    }
}

/// Edit modes pan the camera over the ground plane; play leaves it to the level.
fn pan_camera(session: &mut Session, input: &InputSnapshot, dt: f32, speed: f32) {
    if session.current_mode().is_run_sim() {
        return;
    }
    let camera = session.camera_mut();
    let forward = camera.view_dir().with_z(0.0).normalized_or_zero();
    let right = forward.cross(Vec3::UNIT_Z);
    let axis = |positive: InputAction, negative: InputAction| -> f32 {
        f32::from(u8::from(input.is_down(positive))) - f32::from(u8::from(input.is_down(negative)))
    };
    let delta = forward * axis(InputAction::PanForward, InputAction::PanBack)
        + right * axis(InputAction::PanRight, InputAction::PanLeft)
        + Vec3::UNIT_Z * axis(InputAction::Raise, InputAction::Lower);
    if delta == Vec3::ZERO {
        return;
    }
    let step = delta * (speed * dt);
    camera.from += step;
    camera.at += step;
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn should_frame_skip(frame_dt: Duration, budget: Duration) -> bool {
    !budget.is_zero() && frame_dt > budget
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "slow_frame_env_invalid"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(error) => {
            warn!(env_var = SLOW_FRAME_ENV_VAR, error = %error, "slow_frame_env_unreadable");
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use winit::event::ElementState;
    use winit::keyboard::{KeyCode, PhysicalKey};

    use super::*;

    fn session() -> Session {
        Session::new(
            SessionParts {
                device: Box::new(SoftwareDevice::new(32, 24)),
                painter: Box::new(SoftwarePainter),
                collision: Box::new(SphereCollisionSystem::default()),
                catalog: BrainCatalog::default(),
                render: RenderSettings::default(),
                autosave_path: None,
            },
            LevelDef::default(),
            Mode::RunSim,
        )
    }

    fn press(codes: &[KeyCode]) -> InputSnapshot {
        let mut input = InputCollector::default();
        for code in codes {
            input.handle_key(PhysicalKey::Code(*code), ElementState::Pressed);
        }
        input.snapshot_for_tick()
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let result = plan_sim_steps(Duration::from_millis(48), Duration::from_millis(16), 5);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let result = plan_sim_steps(Duration::from_millis(120), Duration::from_millis(16), 3);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn frame_skip_needs_a_budget_and_an_overrun() {
        let slow = Duration::from_millis(30);
        let budget = Duration::from_millis(20);
        assert!(!should_frame_skip(slow, Duration::ZERO));
        assert!(!should_frame_skip(Duration::from_millis(5), budget));
        assert!(should_frame_skip(slow, budget));
    }

    #[test]
    fn cap_sleep_covers_remaining_frame_time() {
        let target = Some(Duration::from_millis(16));
        assert_eq!(
            compute_cap_sleep(Duration::from_millis(10), target),
            Duration::from_millis(6)
        );
        assert_eq!(
            compute_cap_sleep(Duration::from_millis(20), target),
            Duration::ZERO
        );
        assert_eq!(compute_cap_sleep(Duration::ZERO, None), Duration::ZERO);
    }

    #[test]
    fn tab_and_escape_stage_mode_changes() {
        let mut session = session();
        let path = Path::new("unused.png");

        apply_commands(&mut session, &press(&[KeyCode::Tab]), path);
        assert_eq!(session.pending_mode(), Some(Mode::ToolMenu));
        session.update(1.0 / 60.0);

        apply_commands(&mut session, &press(&[KeyCode::Escape]), path);
        assert_eq!(session.pending_mode(), Some(Mode::RunSim));
    }

    #[test]
    fn panning_moves_camera_only_while_editing() {
        let mut session = session();
        let start = session.camera().from;
        pan_camera(&mut session, &press(&[KeyCode::KeyW]), 1.0, 2.0);
        assert_eq!(session.camera().from, start);

        session.set_mode(Mode::ToolMenu);
        session.update(1.0 / 60.0);
        let start = session.camera().from;
        pan_camera(&mut session, &press(&[KeyCode::KeyE]), 1.0, 2.0);
        assert!((session.camera().from.z - start.z - 2.0).abs() < 0.0001);
    }
}
