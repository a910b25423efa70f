mod continuations;
mod machine;
mod undo;

pub use continuations::FrameContinuations;
pub use machine::{Mode, ModeHandler, ModeStateMachine, ModeTransition, SimLifecycle};
pub use undo::{UndoError, UndoStack, UNDO_STACK_LIMIT};
