use thiserror::Error;
use tracing::{debug, warn};

use crate::math::Vec3;

use super::actor::{
    Actor, ActorId, ActorIdAllocator, CreatableId, CreatableLink, ThingKind, ThingState,
};
use super::arena::ActorArena;
use super::brain::{Brain, BrainCatalog, BrainContext, BrainProgram, BrainSlot};
use super::budget::BudgetTracker;
use super::camera::FollowLists;
use super::collision::CollisionSystem;
use super::registry::ActorRegistry;
use super::scores::Scoreboard;
use super::terrain::TerrainQuery;

/// Hard cap on lights admitted into the scene at once.
pub const MAX_LIGHTS: usize = 8;

const RECYCLE_POOL_LIMIT: usize = 32;

/// Content-list mutation requested while lists are being iterated. Applied in `refresh`.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldIntent {
    Remove(ActorId),
    SpawnClone {
        creatable: CreatableId,
        position: Vec3,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AddRejection {
    #[error("scene already holds {MAX_LIGHTS} lights")]
    TooManyLights,
    #[error("admitting cost {cost} would push total {total_cost} past the budget")]
    OverBudget { cost: f32, total_cost: f32 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub spawned: usize,
    pub state_changes: usize,
    pub removed: usize,
}

/// Live world content: the arena, the insertion-ordered content list, the update
/// registries and the cost total that gates admission.
#[derive(Debug, Default)]
pub struct SimWorld {
    pub actors: ActorArena,
    pub registry: ActorRegistry,
    pub budget: BudgetTracker,
    pub scores: Scoreboard,
    pub follow: FollowLists,
    content: Vec<ActorId>,
    intents: Vec<WorldIntent>,
    recycled: Vec<Actor>,
    ids: ActorIdAllocator,
    light_count: usize,
    rejected_count: u64,
}

impl SimWorld {
    pub fn content(&self) -> &[ActorId] {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn light_count(&self) -> usize {
        self.light_count
    }

    /// Things turned away by `add_thing` since the world was created.
    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    pub fn recycled_len(&self) -> usize {
        self.recycled.len()
    }

    pub fn pending_intents(&self) -> &[WorldIntent] {
        &self.intents
    }

    pub fn queue_intent(&mut self, intent: WorldIntent) {
        self.intents.push(intent);
    }

    /// Sum of the costs of everything on the content list.
    pub fn content_cost(&self) -> f32 {
        self.content
            .iter()
            .filter_map(|id| self.actors.get(*id))
            .map(|actor| actor.cost)
            .sum()
    }

    /// Builds a fresh thing, reusing a recycled allocation when one is pooled.
    pub fn create_actor(&mut self, name: &str, kind: ThingKind, position: Vec3) -> Actor {
        let id = self.ids.allocate();
        match self.recycled.pop() {
            Some(mut recycled) => {
                let mut contacts = std::mem::take(&mut recycled.contacts);
                contacts.clear();
                let mut actor = Actor::new(id, name, kind, position);
                actor.contacts = contacts;
                actor
            }
            None => Actor::new(id, name, kind, position),
        }
    }

    /// Admits `actor` into the scene and charges its cost. Registration happens on the
    /// next `refresh`. Rejected things are recycled.
    pub fn add_thing(
        &mut self,
        mut actor: Actor,
        ignore_budget: bool,
    ) -> Result<ActorId, AddRejection> {
        if let Err(rejection) = self.enter_scene(&actor) {
            self.reject(actor, rejection);
            return Err(rejection);
        }
        if !ignore_budget && self.budget.would_exceed(actor.cost) {
            self.leave_scene_caps(&actor);
            let rejection = AddRejection::OverBudget {
                cost: actor.cost,
                total_cost: self.budget.total_cost(),
            };
            self.reject(actor, rejection);
            return Err(rejection);
        }

        self.budget.add(actor.cost);
        actor.activate();
        let id = actor.id;
        self.content.push(id);
        self.actors.insert(actor);
        debug!(id = id.0, total_cost = self.budget.total_cost(), "thing_added");
        Ok(id)
    }

    /// Runs exit-scene, credits the cost back and drops the thing from the content list.
    pub fn remove_thing(&mut self, id: ActorId, collision: &mut dyn CollisionSystem) -> bool {
        match self.content.iter().position(|entry| *entry == id) {
            Some(index) => {
                self.remove_at(index, collision);
                true
            }
            None => false,
        }
    }

    /// Deactivates the thing; it leaves the content list on the next `refresh`.
    pub fn delete_thing_from_scene(&mut self, id: ActorId) -> bool {
        match self.actors.get_mut(id) {
            Some(actor) => {
                actor.deactivate();
                true
            }
            None => false,
        }
    }

    /// Applies queued intents and pending state changes. The content list is walked
    /// back to front so removals never shift entries still to be visited.
    pub fn refresh(
        &mut self,
        collision: &mut dyn CollisionSystem,
        catalog: &BrainCatalog,
    ) -> RefreshReport {
        let mut report = RefreshReport::default();

        for intent in std::mem::take(&mut self.intents) {
            match intent {
                WorldIntent::Remove(id) => {
                    self.delete_thing_from_scene(id);
                }
                WorldIntent::SpawnClone {
                    creatable,
                    position,
                } => {
                    if self.spawn_clone(creatable, position, catalog).is_some() {
                        report.spawned += 1;
                    }
                }
            }
        }

        for index in (0..self.content.len()).rev() {
            let id = self.content[index];
            let Some(actor) = self.actors.get_mut(id) else {
                self.content.remove(index);
                continue;
            };
            if let Some(next) = actor.pending_state.take() {
                match next {
                    ThingState::Active => self.registry.register_all(actor, collision),
                    ThingState::Paused => self.registry.unregister_brain(actor),
                    ThingState::Inactive | ThingState::Dead => {
                        self.registry.unregister_all(actor, collision)
                    }
                }
                actor.state = next;
                report.state_changes += 1;
            }
            if actor.is_done() {
                self.remove_at(index, collision);
                report.removed += 1;
            }
        }

        report
    }

    pub fn set_creatables_hidden(&mut self, hidden: bool) {
        for actor in self.actors.iter_mut().filter(|actor| actor.is_creatable()) {
            actor.hidden_creatable = hidden;
        }
    }

    pub fn brain_programs_mut(&mut self) -> impl Iterator<Item = &mut BrainProgram> {
        self.actors
            .iter_mut()
            .filter_map(|actor| actor.brain.as_mut().map(|slot| &mut slot.program))
    }

    /// Runs one brain hook with the slot detached from its actor. Returns false when the
    /// actor has no brain.
    pub fn run_brain_hook(
        &mut self,
        id: ActorId,
        terrain: &dyn TerrainQuery,
        frame: u64,
        dt: f32,
        hook: impl FnOnce(&mut dyn Brain, &mut BrainContext<'_>),
    ) -> bool {
        let Some(mut slot) = self.actors.take_brain(id) else {
            return false;
        };
        {
            let BrainSlot {
                program, driver, ..
            } = &mut slot;
            let mut ctx = BrainContext {
                id,
                program: &*program,
                actors: &mut self.actors,
                terrain,
                scores: &mut self.scores,
                follow: &mut self.follow,
                intents: &mut self.intents,
                frame,
                dt,
            };
            hook(&mut **driver, &mut ctx);
        }
        self.actors.restore_brain(id, slot);
        true
    }

    /// Exits every thing and zeroes the cost total.
    pub fn teardown(&mut self, collision: &mut dyn CollisionSystem) {
        for id in std::mem::take(&mut self.content) {
            if let Some(mut actor) = self.actors.remove(id) {
                self.exit_scene(&mut actor, collision);
            }
        }
        self.actors.clear();
        self.registry.clear(collision);
        self.budget.reset_actor_cost();
        self.scores.reset();
        self.follow.clear();
        self.intents.clear();
        self.light_count = 0;
    }

    fn spawn_clone(
        &mut self,
        creatable: CreatableId,
        position: Vec3,
        catalog: &BrainCatalog,
    ) -> Option<ActorId> {
        let template = self
            .actors
            .iter()
            .find(|actor| actor.creatable == CreatableLink::Template(creatable))?;
        let (name, kind) = (template.name.clone(), template.kind);
        let chassis = template.chassis;
        let cost = template.cost;
        let classification = template.classification;
        let holding_offset = template.holding_offset;
        let tweak = template.tweak;
        let brain = template
            .brain
            .as_ref()
            .and_then(|slot| catalog.instantiate(&slot.driver_name, slot.program.clone()));

        let mut clone = self.create_actor(&name, kind, position);
        clone.chassis = chassis;
        clone.cost = cost;
        clone.classification = classification;
        clone.holding_offset = holding_offset;
        clone.tweak = tweak;
        clone.brain = brain;
        clone.creatable = CreatableLink::Clone(creatable);
        self.add_thing(clone, false).ok()
    }

    fn remove_at(&mut self, index: usize, collision: &mut dyn CollisionSystem) {
        let id = self.content.remove(index);
        let Some(mut actor) = self.actors.remove(id) else {
            return;
        };
        self.exit_scene(&mut actor, collision);
        self.budget.subtract(actor.cost);
        debug!(id = id.0, total_cost = self.budget.total_cost(), "thing_removed");
        self.recycle(actor);
    }

    fn enter_scene(&mut self, actor: &Actor) -> Result<(), AddRejection> {
        if actor.kind == ThingKind::Light {
            if self.light_count >= MAX_LIGHTS {
                return Err(AddRejection::TooManyLights);
            }
            self.light_count += 1;
        }
        Ok(())
    }

    fn exit_scene(&mut self, actor: &mut Actor, collision: &mut dyn CollisionSystem) {
        self.registry.unregister_all(actor, collision);
        self.leave_scene_caps(actor);
    }

    fn leave_scene_caps(&mut self, actor: &Actor) {
        if actor.kind == ThingKind::Light {
            self.light_count = self.light_count.saturating_sub(1);
        }
    }

    fn reject(&mut self, actor: Actor, rejection: AddRejection) {
        self.rejected_count = self.rejected_count.saturating_add(1);
        match rejection {
            AddRejection::TooManyLights => {
                warn!(id = actor.id.0, lights = self.light_count, "add_thing_too_many_lights");
            }
            AddRejection::OverBudget { cost, total_cost } => {
                warn!(cost, total_cost, "add_thing_over_budget");
            }
        }
        self.recycle(actor);
    }

    fn recycle(&mut self, mut actor: Actor) {
        if self.recycled.len() >= RECYCLE_POOL_LIMIT {
            return;
        }
        actor.brain = None;
        actor.registration = Default::default();
        self.recycled.push(actor);
    }
}
