mod actor;
mod arena;
mod brain;
mod budget;
mod camera;
mod collision;
mod ghost;
mod inline;
mod registry;
mod scores;
mod terrain;
mod tick;
mod world;

pub use actor::{
    Actor, ActorId, ActorIdAllocator, Chassis, ChassisKind, Classification, ConstraintMask,
    CreatableId, CreatableLink, EopFlags, Movement, MovementConstraints, RegistrationFlags,
    TeamColor, ThingKind, ThingState, TweakModifiers, Visibility,
};
pub use arena::ActorArena;
pub use brain::{
    Actuator, Brain, BrainCatalog, BrainContext, BrainProgram, BrainSlot, IdleBrain, Reflex,
    Task, TaskId,
};
pub use budget::{BudgetTracker, TOTAL_BUDGET};
pub use camera::{
    Camera, CameraMode, CameraSnapshot, Cursor3D, CursorRep, FollowLists, LightRig,
    CURSOR_PLACEMENT_DISTANCE,
};
pub use collision::{CollisionSystem, Contact, SphereCollisionSystem};
pub use ghost::{
    CameraGhostBuffer, Ghost, GhostDraw, GhostScan, GHOST_DECAY_SECONDS, GHOST_UP_SECONDS,
    MIN_GHOST_OPACITY,
};
pub use inline::{expand_inline_tasks, InlineGuard};
pub use registry::ActorRegistry;
pub use scores::{LocalScores, Score, Scoreboard};
pub use terrain::{FlatTerrain, HeightField, TerrainBounds, TerrainQuery};
pub use tick::{
    SimulationTick, TickInput, TickOutcome, TickPhase, HELD_DRAG_RATE, TICK_PHASE_ORDER,
    WORLD_FLOOR_Z,
};
pub use world::{AddRejection, RefreshReport, SimWorld, WorldIntent, MAX_LIGHTS};
