use tracing::{debug, info};

use crate::sim::CursorRep;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    RunSim,
    EditObject,
    /// Umbrella for the terrain and delete tools. Never set directly.
    ToolBox,
    EditWorldParameters,
    MouseEdit,
    TouchEdit,
    TweakObject,
    EditObjectParameters,
    ToolMenu,
    TerrainUpDown,
    TerrainMaterial,
    TerrainWater,
    TerrainFlatten,
    TerrainRoughHill,
    DeleteObjects,
    SelectNextLevel,
    MiniHub,
    None,
}

impl Mode {
    pub const ALL: [Mode; 18] = [
        Mode::RunSim,
        Mode::EditObject,
        Mode::ToolBox,
        Mode::EditWorldParameters,
        Mode::MouseEdit,
        Mode::TouchEdit,
        Mode::TweakObject,
        Mode::EditObjectParameters,
        Mode::ToolMenu,
        Mode::TerrainUpDown,
        Mode::TerrainMaterial,
        Mode::TerrainWater,
        Mode::TerrainFlatten,
        Mode::TerrainRoughHill,
        Mode::DeleteObjects,
        Mode::SelectNextLevel,
        Mode::MiniHub,
        Mode::None,
    ];

    pub fn is_run_sim(self) -> bool {
        self == Mode::RunSim
    }

    /// Every mode other than play, the mini hub and the empty sentinel edits the level.
    pub fn is_edit(self) -> bool {
        !matches!(self, Mode::RunSim | Mode::MiniHub | Mode::None)
    }

    pub fn is_terrain_tool(self) -> bool {
        matches!(
            self,
            Mode::TerrainUpDown
                | Mode::TerrainMaterial
                | Mode::TerrainWater
                | Mode::TerrainFlatten
                | Mode::TerrainRoughHill
        )
    }

    /// Modes whose modal editor covers the scene, letting rendering fall back to the
    /// cached thumbnail.
    pub fn uses_thumbnail_backdrop(self) -> bool {
        matches!(
            self,
            Mode::EditWorldParameters | Mode::EditObjectParameters | Mode::SelectNextLevel
        )
    }

    pub fn handler(self) -> Option<ModeHandler> {
        let handler = match self {
            Mode::RunSim | Mode::MiniHub => ModeHandler::RunSim,
            Mode::MouseEdit => ModeHandler::MouseEdit,
            Mode::TouchEdit => ModeHandler::TouchEdit,
            Mode::ToolMenu => ModeHandler::ToolMenu,
            Mode::EditObject => ModeHandler::EditObject,
            Mode::EditWorldParameters => ModeHandler::EditWorldParameters,
            Mode::SelectNextLevel => ModeHandler::SelectNextLevel,
            Mode::EditObjectParameters => ModeHandler::EditObjectParameters,
            Mode::TweakObject => ModeHandler::TweakObject,
            Mode::ToolBox
            | Mode::TerrainUpDown
            | Mode::TerrainMaterial
            | Mode::TerrainWater
            | Mode::TerrainFlatten
            | Mode::TerrainRoughHill
            | Mode::DeleteObjects => ModeHandler::ToolBox,
            Mode::None => return None,
        };
        Some(handler)
    }

    pub fn cursor_rep(self) -> CursorRep {
        match self {
            Mode::RunSim => CursorRep::RunSim,
            Mode::ToolMenu | Mode::EditObject | Mode::DeleteObjects => CursorRep::Edit,
            _ => CursorRep::Pointy,
        }
    }
}

/// Per-mode update object. Several modes share one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeHandler {
    RunSim,
    ToolMenu,
    EditObject,
    TweakObject,
    EditObjectParameters,
    EditWorldParameters,
    SelectNextLevel,
    ToolBox,
    MouseEdit,
    TouchEdit,
}

/// Whether the simulation object takes part in frame update and render at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SimLifecycle {
    #[default]
    Inactive,
    Active,
    /// A nested modal editor has suspended the simulation.
    Paused,
}

/// A staged mode change handed to the session to carry out its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
    pub from_handler: Option<ModeHandler>,
    pub to_handler: ModeHandler,
}

impl ModeTransition {
    pub fn leaves_run_sim(&self) -> bool {
        self.from.is_run_sim()
    }

    pub fn enters_run_sim(&self) -> bool {
        self.to.is_run_sim()
    }

    /// Play to edit: the world is rebuilt from its authored definition.
    pub fn enters_edit_from_run_sim(&self) -> bool {
        self.from.is_run_sim() && !self.to.is_run_sim()
    }

    /// Returning to the tool menu or mouse edit from another edit mode checkpoints a
    /// dirty level first.
    pub fn wants_undo_checkpoint(&self, level_dirty: bool) -> bool {
        level_dirty
            && matches!(self.to, Mode::ToolMenu | Mode::MouseEdit)
            && !self.from.is_run_sim()
    }
}

/// Current, pending and previous mode. Changes are staged with `set_mode` and only take
/// effect when the session refresh calls `take_transition` and `commit`.
#[derive(Debug, Default)]
pub struct ModeStateMachine {
    current: Mode,
    pending: Option<Mode>,
    previous: Mode,
    lifecycle: SimLifecycle,
    pending_lifecycle: Option<SimLifecycle>,
}

impl ModeStateMachine {
    pub fn new(initial: Mode) -> Self {
        Self {
            current: initial,
            previous: initial,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    pub fn pending(&self) -> Option<Mode> {
        self.pending
    }

    pub fn previous(&self) -> Mode {
        self.previous
    }

    /// Stages `mode`. Setting the current mode again is a no-op and returns false.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        debug_assert!(
            mode != Mode::ToolBox,
            "ToolBox is reached through one of its tools, never set directly"
        );
        debug_assert!(mode != Mode::None, "Mode::None only clears the pending slot");
        if mode == self.current || mode.handler().is_none() {
            return false;
        }
        if self.pending.is_some_and(|pending| pending != mode) {
            debug!(superseded = ?self.pending, next = ?mode, "pending_mode_superseded");
        }
        self.pending = Some(mode);
        self.previous = self.current;
        true
    }

    /// Returns the staged change, if any, leaving it pending until `commit`.
    pub fn take_transition(&self) -> Option<ModeTransition> {
        let to = self.pending?;
        Some(ModeTransition {
            from: self.current,
            to,
            from_handler: self.current.handler(),
            to_handler: to.handler()?,
        })
    }

    pub fn commit(&mut self, transition: ModeTransition) {
        self.current = transition.to;
        self.pending = None;
        info!(mode = ?transition.to, previous = ?transition.from, "mode_committed");
    }

    pub fn lifecycle(&self) -> SimLifecycle {
        self.lifecycle
    }

    pub fn set_lifecycle(&mut self, state: SimLifecycle) {
        if state != self.lifecycle {
            self.pending_lifecycle = Some(state);
        }
    }

    /// Resolves the lifecycle for this frame. A paused simulation resumes once the
    /// nested editor closes; backing out of that editor returns to the tool menu.
    pub fn refresh_lifecycle(&mut self, editor_active: bool, editor_back_pressed: bool) -> bool {
        if self.lifecycle == SimLifecycle::Paused && !editor_active {
            self.pending_lifecycle = Some(SimLifecycle::Active);
            if editor_back_pressed {
                self.set_mode(Mode::ToolMenu);
            }
        }
        match self.pending_lifecycle.take() {
            Some(next) if next != self.lifecycle => {
                debug!(from = ?self.lifecycle, to = ?next, "sim_lifecycle_changed");
                self.lifecycle = next;
                true
            }
            _ => false,
        }
    }

    /// Back from play goes to the tool menu.
    pub fn request_back(&mut self) -> bool {
        if self.current.is_run_sim() {
            return self.set_mode(Mode::ToolMenu);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_current_mode_stages_nothing() {
        let mut machine = ModeStateMachine::new(Mode::RunSim);
        assert!(!machine.set_mode(Mode::RunSim));
        assert!(machine.take_transition().is_none());
        assert_eq!(machine.previous(), Mode::RunSim);
    }

    #[test]
    fn staged_mode_commits_only_on_commit() {
        let mut machine = ModeStateMachine::new(Mode::RunSim);
        assert!(machine.set_mode(Mode::EditObject));
        assert_eq!(machine.current(), Mode::RunSim);

        let transition = machine.take_transition().expect("staged");
        assert!(transition.enters_edit_from_run_sim());
        assert_eq!(transition.to_handler, ModeHandler::EditObject);
        machine.commit(transition);

        assert_eq!(machine.current(), Mode::EditObject);
        assert_eq!(machine.previous(), Mode::RunSim);
        assert!(machine.pending().is_none());
    }

    #[test]
    fn later_request_supersedes_pending_mode() {
        let mut machine = ModeStateMachine::new(Mode::ToolMenu);
        machine.set_mode(Mode::EditObject);
        machine.set_mode(Mode::TerrainWater);
        let transition = machine.take_transition().expect("staged");
        assert_eq!(transition.to, Mode::TerrainWater);
        assert_eq!(transition.to_handler, ModeHandler::ToolBox);
    }

    #[test]
    #[should_panic(expected = "never set directly")]
    #[cfg(debug_assertions)]
    fn setting_toolbox_directly_asserts() {
        let mut machine = ModeStateMachine::new(Mode::ToolMenu);
        machine.set_mode(Mode::ToolBox);
    }

    #[test]
    fn handler_and_cursor_mapping() {
        assert_eq!(Mode::MiniHub.handler(), Some(ModeHandler::RunSim));
        assert_eq!(Mode::DeleteObjects.handler(), Some(ModeHandler::ToolBox));
        assert_eq!(Mode::None.handler(), None);
        assert_eq!(Mode::RunSim.cursor_rep(), CursorRep::RunSim);
        assert_eq!(Mode::DeleteObjects.cursor_rep(), CursorRep::Edit);
        assert_eq!(Mode::TerrainFlatten.cursor_rep(), CursorRep::Pointy);
        assert_eq!(Mode::ALL.iter().filter(|mode| mode.is_edit()).count(), 15);
    }

    #[test]
    fn undo_checkpoint_only_between_edit_modes_when_dirty() {
        let edit_to_menu = ModeTransition {
            from: Mode::EditObject,
            to: Mode::ToolMenu,
            from_handler: Mode::EditObject.handler(),
            to_handler: ModeHandler::ToolMenu,
        };
        assert!(edit_to_menu.wants_undo_checkpoint(true));
        assert!(!edit_to_menu.wants_undo_checkpoint(false));
        let play_to_menu = ModeTransition {
            from: Mode::RunSim,
            ..edit_to_menu
        };
        assert!(!play_to_menu.wants_undo_checkpoint(true));
    }

    #[test]
    fn paused_sim_resumes_when_editor_closes_and_back_goes_to_tool_menu() {
        let mut machine = ModeStateMachine::new(Mode::RunSim);
        machine.set_lifecycle(SimLifecycle::Paused);
        assert!(machine.refresh_lifecycle(true, false));
        assert_eq!(machine.lifecycle(), SimLifecycle::Paused);
        assert!(!machine.refresh_lifecycle(true, false));

        assert!(machine.refresh_lifecycle(false, true));
        assert_eq!(machine.lifecycle(), SimLifecycle::Active);
        assert_eq!(machine.pending(), Some(Mode::ToolMenu));
    }
}
