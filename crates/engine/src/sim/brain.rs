use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::actor::{Actor, ActorId};
use super::arena::ActorArena;
use super::camera::FollowLists;
use super::scores::Scoreboard;
use super::terrain::TerrainQuery;
use super::world::WorldIntent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Actuator {
    Named(String),
    /// Copies the referenced task's reflexes in place when the simulation starts.
    InlineTask(TaskId),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reflex {
    pub sensor: Option<String>,
    pub filters: Vec<String>,
    pub actuator: Option<Actuator>,
    pub selector: Option<String>,
    pub modifiers: Vec<String>,
    pub indentation: u32,
    /// Nesting depth of inline expansion that produced this reflex; 0 when authored.
    #[serde(default)]
    pub inline_depth: u8,
}

impl Reflex {
    pub fn inline_target(&self) -> Option<TaskId> {
        match self.actuator {
            Some(Actuator::InlineTask(task)) => Some(task),
            _ => None,
        }
    }

    pub fn is_inlined_copy(&self) -> bool {
        self.inline_depth > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub reflexes: Vec<Reflex>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrainProgram {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub active_task: usize,
}

impl BrainProgram {
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0 as usize)
    }

    pub fn reflex_count(&self) -> usize {
        self.tasks.iter().map(|task| task.reflexes.len()).sum()
    }
}

/// Everything a brain may touch while it runs for one actor.
pub struct BrainContext<'a> {
    pub id: ActorId,
    pub program: &'a BrainProgram,
    pub actors: &'a mut ActorArena,
    pub terrain: &'a dyn TerrainQuery,
    pub scores: &'a mut Scoreboard,
    pub follow: &'a mut FollowLists,
    pub intents: &'a mut Vec<WorldIntent>,
    pub frame: u64,
    pub dt: f32,
}

impl BrainContext<'_> {
    pub fn actor(&self) -> Option<&Actor> {
        self.actors.get(self.id)
    }

    pub fn actor_mut(&mut self) -> Option<&mut Actor> {
        self.actors.get_mut(self.id)
    }
}

/// Behavior execution for one actor. The core only guarantees call order.
pub trait Brain {
    fn pre_brain(&mut self, _ctx: &mut BrainContext<'_>) {}

    fn update_sensors(&mut self, ctx: &mut BrainContext<'_>);

    fn update_actuators(&mut self, ctx: &mut BrainContext<'_>);

    fn post_brain(&mut self, _ctx: &mut BrainContext<'_>) {}

    /// Runs after collision resolution; the actor's contacts for this frame are filled in.
    fn post_collide(&mut self, _ctx: &mut BrainContext<'_>) {}

    fn freshen_local_scores(&mut self, ctx: &mut BrainContext<'_>) {
        if let Some(actor) = ctx.actor_mut() {
            actor.local_scores.freshen();
        }
    }
}

pub struct BrainSlot {
    pub driver_name: String,
    pub program: BrainProgram,
    pub driver: Box<dyn Brain>,
}

impl fmt::Debug for BrainSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrainSlot")
            .field("driver_name", &self.driver_name)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

type BrainMaker = Box<dyn Fn() -> Box<dyn Brain>>;

/// Named brain constructors used when actors are rebuilt from a level definition.
#[derive(Default)]
pub struct BrainCatalog {
    makers: BTreeMap<String, BrainMaker>,
}

impl BrainCatalog {
    pub fn register(
        &mut self,
        name: impl Into<String>,
        maker: impl Fn() -> Box<dyn Brain> + 'static,
    ) {
        self.makers.insert(name.into(), Box::new(maker));
    }

    pub fn instantiate(&self, name: &str, program: BrainProgram) -> Option<BrainSlot> {
        let maker = self.makers.get(name)?;
        Some(BrainSlot {
            driver_name: name.to_string(),
            program,
            driver: maker(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.makers.contains_key(name)
    }
}

impl fmt::Debug for BrainCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.makers.keys()).finish()
    }
}

/// Brain that never senses or acts. Used for props and as a catalog fallback.
#[derive(Debug, Default)]
pub struct IdleBrain;

impl Brain for IdleBrain {
    fn update_sensors(&mut self, _ctx: &mut BrainContext<'_>) {}

    fn update_actuators(&mut self, _ctx: &mut BrainContext<'_>) {}
}
