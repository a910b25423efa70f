use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::level::{LevelDef, LevelSpawnReport};
use crate::math::Vec3;
use crate::mode::{
    FrameContinuations, Mode, ModeHandler, ModeStateMachine, ModeTransition, SimLifecycle,
    UndoError, UndoStack,
};
use crate::render::{
    budget_hud_visible, compass_visible, draw_notice, Brush, BudgetHud, FrameReport,
    FrameRequest, GraphicsDevice, HudRequest, Image, MessageKey, MessageStack, OverlayData,
    RenderGraph, RenderSettings, ScenePainter, SceneView, ThumbnailError,
};
use crate::sim::{
    Actor, ActorId, AddRejection, BrainCatalog, Camera, CameraGhostBuffer, CameraMode,
    CameraSnapshot, CollisionSystem, Cursor3D, FlatTerrain, GhostScan, InlineGuard, LightRig,
    RefreshReport, SimWorld, SimulationTick, TerrainQuery, ThingKind, ThingState, TickInput,
    TickOutcome, CURSOR_PLACEMENT_DISTANCE,
};

const TOO_MANY_LIGHTS: MessageKey = MessageKey::new("too_many_lights", 0);
const PLEASE_WAIT: MessageKey = MessageKey::new("please_wait", 0);
/// How many rendered frames a transient notice stays up.
const NOTICE_FRAMES: u64 = 90;
/// The export waits for one rendered frame, which draws the wait notice and captures the
/// thumbnail.
const EXPORT_DELAY_FRAMES: u64 = 1;

/// Side effects carried out while committing a mode change, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    SavedPlayCamera,
    SavedEditCamera,
    HandlerSwapped(ModeHandler),
    UndoCheckpoint,
    PausedThings,
    StoppedCameraTransition,
    WorldReset,
    DayRig,
    RestoredEditCamera,
    Flushed,
    CursorPlaced,
    CreatablesShown,
    CapturedLevel,
    LevelRig,
    RestoredStartCamera,
    RestoredPlayCamera,
    ResumedThings,
    CreatablesHidden,
    CursorDeactivated,
    InlineExpanded,
}

/// External collaborators a session is assembled from.
pub struct SessionParts {
    pub device: Box<dyn GraphicsDevice>,
    pub painter: Box<dyn ScenePainter>,
    pub collision: Box<dyn CollisionSystem>,
    pub catalog: BrainCatalog,
    pub render: RenderSettings,
    pub autosave_path: Option<PathBuf>,
}

/// One open level: the live world plus everything that drives and draws it.
pub struct Session {
    world: SimWorld,
    tick: SimulationTick,
    modes: ModeStateMachine,
    handler: Option<ModeHandler>,
    collision: Box<dyn CollisionSystem>,
    terrain: Box<dyn TerrainQuery>,
    catalog: BrainCatalog,
    level: LevelDef,
    camera: Camera,
    play_camera: Option<CameraSnapshot>,
    edit_camera: Option<CameraSnapshot>,
    cursor: Cursor3D,
    light_rig: LightRig,
    ghosts: CameraGhostBuffer,
    inline_guard: InlineGuard,
    undo: UndoStack,
    messages: MessageStack,
    continuations: FrameContinuations<Session>,
    graph: RenderGraph,
    device: Box<dyn GraphicsDevice>,
    painter: Box<dyn ScenePainter>,
    frame: u64,
    clock: f64,
    focus_actor: Option<ActorId>,
    selected: Option<ActorId>,
    brush: Option<Brush>,
    editor_active: bool,
    editor_back_pressed: bool,
    modal_active: bool,
    modal_overlay: Option<Box<dyn Fn(&mut Image)>>,
    eyedropper: bool,
    last_transition_effects: Vec<TransitionEffect>,
    last_tick: Option<TickOutcome>,
}

impl Session {
    pub fn new(parts: SessionParts, level: LevelDef, initial_mode: Mode) -> Self {
        let SessionParts {
            device,
            painter,
            collision,
            catalog,
            render,
            autosave_path,
        } = parts;
        let mut camera = Camera::default();
        camera.resolution = device.back_buffer_size();
        let mut modes = ModeStateMachine::new(initial_mode);
        modes.set_lifecycle(SimLifecycle::Active);
        modes.refresh_lifecycle(false, false);

        let mut session = Self {
            world: SimWorld::default(),
            tick: SimulationTick::default(),
            handler: initial_mode.handler(),
            modes,
            collision,
            terrain: Box::new(FlatTerrain::default()),
            catalog,
            level: LevelDef::default(),
            camera,
            play_camera: None,
            edit_camera: None,
            cursor: Cursor3D::default(),
            light_rig: LightRig::day(),
            ghosts: CameraGhostBuffer::default(),
            inline_guard: InlineGuard::default(),
            undo: autosave_path.map(UndoStack::with_autosave).unwrap_or_default(),
            messages: MessageStack::default(),
            continuations: FrameContinuations::default(),
            graph: RenderGraph::new(render),
            device,
            painter,
            frame: 0,
            clock: 0.0,
            focus_actor: None,
            selected: None,
            brush: None,
            editor_active: false,
            editor_back_pressed: false,
            modal_active: false,
            modal_overlay: None,
            eyedropper: false,
            last_transition_effects: Vec::new(),
            last_tick: None,
        };
        session.load_level(level);
        session
    }

    /// Replaces the authored level and rebuilds the world from it. Undo history restarts.
    pub fn load_level(&mut self, level: LevelDef) -> LevelSpawnReport {
        self.terrain = match level.terrain.as_ref().and_then(|terrain| terrain.to_height_field()) {
            Some(field) => Box::new(field),
            None => Box::new(FlatTerrain::default()),
        };
        self.level = level;
        self.undo.clear();
        self.play_camera = None;
        self.edit_camera = None;
        let report = self.restart();
        if let Err(error) = self.undo.store(&self.level) {
            warn!(error = %error, "undo_checkpoint_failed");
        }
        info!(
            level = %self.level.name,
            mode = ?self.modes.current(),
            spawned = report.spawned,
            "level_session_started"
        );
        report
    }

    /// Rebuilds the world from the authored level without touching undo history.
    pub fn reset(&mut self) -> LevelSpawnReport {
        self.restart()
    }

    fn restart(&mut self) -> LevelSpawnReport {
        self.continuations.clear();
        self.inline_guard = InlineGuard::default();
        let report = self.reset_world();
        self.flush();
        if let Some(start) = self.level.starting_camera {
            self.camera.restore(start);
        }
        if self.modes.current().is_run_sim() {
            self.light_rig = self.level.light_rig.clone();
            self.camera.mode = CameraMode::Free;
            self.world.set_creatables_hidden(true);
            self.cursor.active = false;
            self.inline_guard
                .apply(self.frame, self.world.brain_programs_mut());
        } else {
            self.light_rig = LightRig::day();
            self.camera.mode = CameraMode::Edit;
            self.world.set_creatables_hidden(false);
            self.place_cursor();
            self.pause_all();
        }
        self.cursor.rep = self.modes.current().cursor_rep();
        self.graph.request_thumbnail_refresh();
        report
    }

    /// Frame begin: due continuations, then list and mode refresh. Continuations count
    /// rendered frames, so several ticks between two renders never make one due.
    pub fn begin_frame(&mut self) -> RefreshReport {
        self.frame += 1;
        let rendered = self.graph.frames_rendered();
        for (key, run) in self.continuations.take_due(rendered) {
            debug!(key, frame = self.frame, rendered, "continuation_run");
            run(self);
        }
        self.refresh()
    }

    /// Runs one simulation tick (skipped outside play) and the ghost scan.
    pub fn step(&mut self, dt: f32) -> TickOutcome {
        let mode = self.modes.current();
        let input = TickInput {
            frame: self.frame,
            dt,
            paused: !mode.is_run_sim() || self.modes.lifecycle() != SimLifecycle::Active,
            modal_active: self.modal_active,
        };
        let outcome = self
            .tick
            .run(&mut self.world, &mut *self.collision, &*self.terrain, input);
        if let TickOutcome::FloorDeath(id) = outcome {
            debug!(id = id.0, frame = self.frame, "tick_ended_by_floor_death");
        }
        self.clock += f64::from(dt);

        if self.graph.settings().camera_ghosting {
            self.ghosts.check(
                &mut self.world.actors,
                &*self.collision,
                GhostScan {
                    camera: &self.camera,
                    follow: &self.world.follow,
                    cursor: self.cursor.position,
                    edit_focus: self.focus_actor,
                    run_sim: mode.is_run_sim(),
                    mouse_mode: false,
                    now: self.clock,
                },
            );
        } else if !self.ghosts.is_empty() {
            self.ghosts.clear(&mut self.world.actors);
        }

        self.last_tick = Some(outcome);
        outcome
    }

    pub fn update(&mut self, dt: f32) -> TickOutcome {
        self.begin_frame();
        self.step(dt)
    }

    /// Applies deferred list changes and commits a staged mode change.
    pub fn refresh(&mut self) -> RefreshReport {
        self.last_transition_effects.clear();
        let report = self.flush();
        if self.cursor.active {
            self.cursor.position.z = self.terrain.height_at(self.cursor.position);
        }

        let back_pressed = std::mem::take(&mut self.editor_back_pressed);
        self.modes.refresh_lifecycle(self.editor_active, back_pressed);

        if let Some(transition) = self.modes.take_transition() {
            self.apply_transition(transition);
        }
        self.cursor.rep = self.modes.current().cursor_rep();
        report
    }

    fn apply_transition(&mut self, transition: ModeTransition) {
        if transition.leaves_run_sim() {
            self.play_camera = Some(self.camera.snapshot());
            self.effect(TransitionEffect::SavedPlayCamera);
        } else {
            self.edit_camera = Some(self.camera.snapshot());
            self.effect(TransitionEffect::SavedEditCamera);
        }

        if self.handler != Some(transition.to_handler) {
            debug!(from = ?self.handler, to = ?transition.to_handler, "mode_handler_swapped");
            self.handler = Some(transition.to_handler);
            self.effect(TransitionEffect::HandlerSwapped(transition.to_handler));
        }

        if !transition.leaves_run_sim() {
            self.checkpoint_if_dirty(transition);
        }

        self.modes.commit(transition);
        if !transition.to.is_run_sim() {
            self.pause_all();
            self.effect(TransitionEffect::PausedThings);
        }
        if transition.to.uses_thumbnail_backdrop() {
            self.graph.request_thumbnail_refresh();
        }

        if transition.enters_edit_from_run_sim() {
            self.enter_edit_from_run_sim();
        }
        if transition.enters_run_sim() {
            self.level = self.level.capture(&self.world);
            self.effect(TransitionEffect::CapturedLevel);
            self.enter_run_sim();
        }
    }

    fn checkpoint_if_dirty(&mut self, transition: ModeTransition) {
        let authored = self.level.capture(&self.world);
        let stored = self.undo.is_dirty(&authored).and_then(|dirty| {
            if transition.wants_undo_checkpoint(dirty) {
                self.undo.store(&authored)
            } else {
                Ok(false)
            }
        });
        match stored {
            Ok(true) => self.effect(TransitionEffect::UndoCheckpoint),
            Ok(false) => {}
            Err(error) => warn!(error = %error, "undo_checkpoint_failed"),
        }
    }

    fn enter_edit_from_run_sim(&mut self) {
        self.camera.stop_transition();
        self.effect(TransitionEffect::StoppedCameraTransition);

        self.reset_world();
        self.effect(TransitionEffect::WorldReset);

        self.light_rig = LightRig::day();
        self.effect(TransitionEffect::DayRig);

        if self.camera.mode != CameraMode::Edit {
            if let Some(edit) = self.edit_camera {
                self.camera.restore(edit);
                self.effect(TransitionEffect::RestoredEditCamera);
            }
        }
        self.camera.mode = CameraMode::Edit;

        self.flush();
        self.effect(TransitionEffect::Flushed);

        self.place_cursor();
        self.effect(TransitionEffect::CursorPlaced);

        self.pause_all();
        self.world.set_creatables_hidden(false);
        self.effect(TransitionEffect::CreatablesShown);
    }

    fn enter_run_sim(&mut self) {
        self.light_rig = self.level.light_rig.clone();
        self.effect(TransitionEffect::LevelRig);

        match (self.level.starting_camera, self.play_camera) {
            (Some(start), _) => {
                self.camera.restore(start);
                self.effect(TransitionEffect::RestoredStartCamera);
            }
            (None, Some(play)) => {
                self.camera.restore(play);
                self.effect(TransitionEffect::RestoredPlayCamera);
            }
            (None, None) => {}
        }
        self.camera.mode = CameraMode::Free;

        let mut resumed = 0usize;
        for actor in self.world.actors.iter_mut() {
            if actor.effective_state() == ThingState::Paused {
                actor.activate();
                resumed += 1;
            }
        }
        if resumed > 0 {
            self.effect(TransitionEffect::ResumedThings);
        }

        self.flush();
        self.effect(TransitionEffect::Flushed);

        self.world.set_creatables_hidden(true);
        self.effect(TransitionEffect::CreatablesHidden);

        self.cursor.active = false;
        self.effect(TransitionEffect::CursorDeactivated);

        if self
            .inline_guard
            .apply(self.frame, self.world.brain_programs_mut())
        {
            self.effect(TransitionEffect::InlineExpanded);
        }
    }

    fn effect(&mut self, effect: TransitionEffect) {
        self.last_transition_effects.push(effect);
    }

    fn reset_world(&mut self) -> LevelSpawnReport {
        self.ghosts.clear(&mut self.world.actors);
        self.world.teardown(&mut *self.collision);
        self.world.budget.limit_budget = self.level.limit_budget;
        self.level.spawn_into(&mut self.world, &self.catalog)
    }

    fn flush(&mut self) -> RefreshReport {
        self.world.refresh(&mut *self.collision, &self.catalog)
    }

    fn pause_all(&mut self) {
        for actor in self.world.actors.iter_mut() {
            actor.pause();
        }
    }

    /// Cursor lands on the focus actor, or on the ground in front of the camera.
    fn place_cursor(&mut self) {
        let focus = self
            .focus_actor
            .and_then(|id| self.world.actors.get(id))
            .map(Actor::position);
        self.cursor.position = match focus {
            Some(position) => position,
            None => {
                let ahead = self.camera.point_in_front(CURSOR_PLACEMENT_DISTANCE);
                ahead.with_z(self.terrain.height_at(ahead))
            }
        };
        self.cursor.active = true;
    }

    pub fn render(&mut self, frame_skip: bool, panel: Option<&OverlayData>) -> FrameReport {
        let mode = self.modes.current();
        let ghost_draws = if self.graph.settings().camera_ghosting {
            self.ghosts
                .draw_list(&self.world.actors, self.camera.from, self.clock)
        } else {
            Vec::new()
        };
        let budget = budget_hud_visible(
            mode,
            self.level.show_resource_meter,
            self.level.limit_budget,
        )
        .then(|| self.budget_hud());
        let scores = if mode.is_run_sim() && self.world.scores.is_visible() {
            self.world.scores.lines()
        } else {
            Vec::new()
        };

        let request = FrameRequest {
            mode,
            frame: self.frame,
            scene: SceneView {
                actors: &self.world.actors,
                content: self.world.content(),
                camera: &self.camera,
                terrain: &*self.terrain,
                ghosts: &ghost_draws,
                cursor: self.cursor.active.then_some(self.cursor.position),
                selected: self.selected,
                shadow: None,
            },
            frame_skip,
            brush: self.brush,
            editing_terrain: mode.is_terrain_tool(),
            eyedropper: self.eyedropper,
            modal: self.modal_overlay.as_deref(),
            hud: HudRequest {
                panel,
                budget,
                compass: compass_visible(mode, self.level.show_compass),
                scores: &scores,
            },
            messages: &self.messages,
        };
        self.graph
            .render(&mut *self.device, &mut *self.painter, &request)
            .clone()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.device.resize_back_buffer(width, height);
        self.camera.resolution = (width, height);
    }

    pub fn overlay_data(&self, perf_lines: Vec<String>) -> OverlayData {
        OverlayData {
            mode: self.modes.current(),
            actor_count: self.world.len(),
            ghost_count: self.ghosts.len(),
            rejected_count: self.world.rejected_count(),
            strategy: self
                .graph
                .last_report()
                .strategy
                .map_or("none", |strategy| strategy.label()),
            perf_lines,
            budget: Some(self.budget_hud()),
        }
    }

    pub fn create_actor(&mut self, name: &str, kind: ThingKind, position: Vec3) -> Actor {
        self.world.create_actor(name, kind, position)
    }

    /// Admits a thing. A light rejected while placing objects shows a notice.
    pub fn add_thing(
        &mut self,
        actor: Actor,
        ignore_budget: bool,
    ) -> Result<ActorId, AddRejection> {
        let result = self.world.add_thing(actor, ignore_budget);
        if matches!(result, Err(AddRejection::TooManyLights))
            && self.modes.current() == Mode::EditObject
        {
            self.show_timed_notice(TOO_MANY_LIGHTS, "end_too_many_lights", "TOO MANY LIGHTS");
        }
        result
    }

    pub fn remove_thing(&mut self, id: ActorId) -> bool {
        if self.focus_actor == Some(id) {
            self.focus_actor = None;
        }
        self.world.remove_thing(id, &mut *self.collision)
    }

    pub fn delete_thing_from_scene(&mut self, id: ActorId) -> bool {
        self.world.delete_thing_from_scene(id)
    }

    fn show_timed_notice(&mut self, key: MessageKey, end_key: &'static str, text: &'static str) {
        if !self.messages.contains(key) {
            self.messages
                .add_message(key, move |image: &mut Image| draw_notice(image, text));
        }
        self.continuations.queue(
            end_key,
            self.graph.frames_rendered(),
            NOTICE_FRAMES,
            move |session: &mut Session| {
                session.messages.end_message(key);
            },
        );
    }

    pub fn add_message(&mut self, key: MessageKey, render: impl Fn(&mut Image) + 'static) -> bool {
        self.messages.add_message(key, render)
    }

    pub fn end_message(&mut self, key: MessageKey) -> bool {
        self.messages.end_message(key)
    }

    pub fn messages(&self) -> &MessageStack {
        &self.messages
    }

    pub fn set_mode(&mut self, mode: Mode) -> bool {
        self.modes.set_mode(mode)
    }

    pub fn current_mode(&self) -> Mode {
        self.modes.current()
    }

    pub fn pending_mode(&self) -> Option<Mode> {
        self.modes.pending()
    }

    pub fn request_back(&mut self) -> bool {
        self.modes.request_back()
    }

    /// Play goes to the tool menu; any edit mode goes back to play.
    pub fn toggle_play(&mut self) -> bool {
        if self.modes.current().is_run_sim() {
            self.modes.set_mode(Mode::ToolMenu)
        } else {
            self.modes.set_mode(Mode::RunSim)
        }
    }

    /// A nested editor opened over the simulation.
    pub fn open_editor(&mut self) {
        self.editor_active = true;
        self.modes.set_lifecycle(SimLifecycle::Paused);
    }

    pub fn close_editor(&mut self, back_pressed: bool) {
        self.editor_active = false;
        self.editor_back_pressed = back_pressed;
    }

    pub fn lifecycle(&self) -> SimLifecycle {
        self.modes.lifecycle()
    }

    /// Opens a modal editor; its overlay is drawn over the thumbnail backdrop each frame.
    pub fn open_modal(&mut self, overlay: impl Fn(&mut Image) + 'static) {
        self.modal_active = true;
        self.modal_overlay = Some(Box::new(overlay));
        debug!(frame = self.frame, "modal_opened");
    }

    pub fn close_modal(&mut self) {
        self.modal_active = false;
        self.modal_overlay = None;
        debug!(frame = self.frame, "modal_closed");
    }

    pub fn modal_active(&self) -> bool {
        self.modal_active
    }

    pub fn total_cost(&self) -> f32 {
        self.world.budget.total_cost()
    }

    pub fn under_budget(&self) -> bool {
        self.world.budget.under_budget()
    }

    pub fn over_budget(&self) -> bool {
        self.world.budget.over_budget()
    }

    pub fn fraction_full(&self) -> f32 {
        self.world.budget.fraction_full()
    }

    pub fn fraction_full_unclamped(&self) -> f32 {
        self.world.budget.fraction_full_unclamped()
    }

    fn budget_hud(&self) -> BudgetHud {
        BudgetHud {
            total_cost: self.world.budget.total_cost(),
            budget: self.world.budget.budget(),
            fraction_full: self.world.budget.fraction_full(),
            over_budget: self.world.budget.over_budget(),
        }
    }

    pub fn request_thumbnail_refresh(&mut self) {
        self.graph.request_thumbnail_refresh();
    }

    pub fn small_thumbnail(&self) -> Option<&Image> {
        self.graph.small_thumbnail(&*self.device)
    }

    pub fn save_thumbnail(&self) -> Option<&Image> {
        self.graph.save_thumbnail(&*self.device)
    }

    pub fn export_save_thumbnail(&self, path: &Path) -> Result<(), ThumbnailError> {
        self.graph.export_save_thumbnail(&*self.device, path)
    }

    /// Captures a fresh thumbnail on the next rendered frame, which also shows the wait
    /// notice, and writes it at the following frame begin.
    pub fn queue_thumbnail_export(&mut self, path: PathBuf) {
        self.graph.request_thumbnail_refresh();
        if !self.messages.contains(PLEASE_WAIT) {
            self.messages
                .add_message(PLEASE_WAIT, |image: &mut Image| draw_notice(image, "PLEASE WAIT"));
        }
        self.continuations.queue(
            "export_thumbnail",
            self.graph.frames_rendered(),
            EXPORT_DELAY_FRAMES,
            move |session: &mut Session| {
                if let Err(error) = session.export_save_thumbnail(&path) {
                    warn!(error = %error, path = %path.display(), "thumbnail_export_failed");
                }
                session.messages.end_message(PLEASE_WAIT);
            },
        );
    }

    /// Restores the previous authored checkpoint. Only meaningful while editing.
    pub fn undo_edit(&mut self) -> Result<bool, UndoError> {
        if self.modes.current().is_run_sim() {
            return Ok(false);
        }
        match self.undo.undo::<LevelDef>()? {
            Some(level) => {
                self.level = level;
                self.restart();
                info!(depth = self.undo.len(), "undo_applied");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_render_settings(&mut self, settings: RenderSettings) {
        self.graph.set_settings(settings);
    }

    pub fn render_settings(&self) -> RenderSettings {
        self.graph.settings()
    }

    pub fn set_focus_actor(&mut self, id: Option<ActorId>) {
        self.focus_actor = id;
    }

    pub fn select(&mut self, id: Option<ActorId>) {
        self.selected = id;
    }

    pub fn set_brush(&mut self, brush: Option<Brush>) {
        self.brush = brush;
    }

    /// Eyedropper modifier state; the terrain brush is hidden while it is held.
    pub fn set_eyedropper(&mut self, held: bool) {
        self.eyedropper = held;
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut SimWorld {
        &mut self.world
    }

    pub fn level(&self) -> &LevelDef {
        &self.level
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn cursor(&self) -> &Cursor3D {
        &self.cursor
    }

    pub fn light_rig(&self) -> &LightRig {
        &self.light_rig
    }

    pub fn ghosts(&self) -> &CameraGhostBuffer {
        &self.ghosts
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn device(&self) -> &dyn GraphicsDevice {
        &*self.device
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn last_transition_effects(&self) -> &[TransitionEffect] {
        &self.last_transition_effects
    }

    pub fn last_tick(&self) -> Option<TickOutcome> {
        self.last_tick
    }

    pub fn last_frame_report(&self) -> &FrameReport {
        self.graph.last_report()
    }
}
