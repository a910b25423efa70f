use winit::event::ElementState;
use winit::keyboard::{KeyCode, PhysicalKey};

/// Held actions, sampled once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    PanForward,
    PanBack,
    PanLeft,
    PanRight,
    Raise,
    Lower,
    Eyedropper,
}

const ACTION_COUNT: usize = 7;

impl InputAction {
    const fn index(self) -> usize {
        match self {
            InputAction::PanForward => 0,
            InputAction::PanBack => 1,
            InputAction::PanLeft => 2,
            InputAction::PanRight => 3,
            InputAction::Raise => 4,
            InputAction::Lower => 5,
            InputAction::Eyedropper => 6,
        }
    }

    fn from_key(key: PhysicalKey) -> Option<Self> {
        let PhysicalKey::Code(code) = key else {
            return None;
        };
        match code {
            KeyCode::KeyW | KeyCode::ArrowUp => Some(InputAction::PanForward),
            KeyCode::KeyS | KeyCode::ArrowDown => Some(InputAction::PanBack),
            KeyCode::KeyA | KeyCode::ArrowLeft => Some(InputAction::PanLeft),
            KeyCode::KeyD | KeyCode::ArrowRight => Some(InputAction::PanRight),
            KeyCode::KeyE => Some(InputAction::Raise),
            KeyCode::KeyQ => Some(InputAction::Lower),
            KeyCode::AltLeft | KeyCode::AltRight => Some(InputAction::Eyedropper),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }
}

/// One-shot commands, reported once per physical press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    TogglePlay,
    Back,
    ExportThumbnail,
    ToggleOverlay,
    Undo,
    Quit,
}

const COMMAND_COUNT: usize = 6;

impl Command {
    const fn index(self) -> usize {
        match self {
            Command::TogglePlay => 0,
            Command::Back => 1,
            Command::ExportThumbnail => 2,
            Command::ToggleOverlay => 3,
            Command::Undo => 4,
            Command::Quit => 5,
        }
    }

    fn from_key(key: PhysicalKey) -> Option<Self> {
        let PhysicalKey::Code(code) = key else {
            return None;
        };
        match code {
            KeyCode::Tab => Some(Command::TogglePlay),
            KeyCode::Escape => Some(Command::Back),
            KeyCode::F5 => Some(Command::ExportThumbnail),
            KeyCode::F3 => Some(Command::ToggleOverlay),
            KeyCode::F9 => Some(Command::Undo),
            KeyCode::F10 => Some(Command::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct InputSnapshot {
    actions: ActionStates,
    pressed: [bool; COMMAND_COUNT],
}

impl InputSnapshot {
    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.actions.is_down(action)
    }

    pub(crate) fn pressed(&self, command: Command) -> bool {
        self.pressed[command.index()]
    }
}

/// Folds window key events into held state and press edges.
#[derive(Debug, Default)]
pub(crate) struct InputCollector {
    actions: ActionStates,
    command_down: [bool; COMMAND_COUNT],
    command_edge: [bool; COMMAND_COUNT],
}

impl InputCollector {
    pub(crate) fn handle_key(&mut self, key: PhysicalKey, state: ElementState) {
        let is_pressed = state == ElementState::Pressed;
        if let Some(action) = InputAction::from_key(key) {
            self.actions.set(action, is_pressed);
        }
        if let Some(command) = Command::from_key(key) {
            let index = command.index();
            if is_pressed && !self.command_down[index] {
                self.command_edge[index] = true;
            }
            self.command_down[index] = is_pressed;
        }
    }

    /// Overlay and quit are handled by the loop before ticks run.
    pub(crate) fn take_pressed(&mut self, command: Command) -> bool {
        std::mem::take(&mut self.command_edge[command.index()])
    }

    pub(crate) fn snapshot_for_tick(&mut self) -> InputSnapshot {
        InputSnapshot {
            actions: self.actions,
            pressed: std::mem::take(&mut self.command_edge),
        }
    }
}
