use std::collections::BTreeMap;

use super::actor::{Actor, ActorId};
use super::brain::BrainSlot;

/// Owning store for every thing in the session, keyed by id.
#[derive(Debug, Default)]
pub struct ActorArena {
    actors: BTreeMap<ActorId, Actor>,
}

impl ActorArena {
    pub fn insert(&mut self, actor: Actor) {
        self.actors.insert(actor.id, actor);
    }

    pub fn remove(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Actor> {
        self.actors.values_mut()
    }

    /// Detaches the brain so it can run with mutable access to the arena.
    pub fn take_brain(&mut self, id: ActorId) -> Option<BrainSlot> {
        self.actors.get_mut(&id).and_then(|actor| actor.brain.take())
    }

    /// Reattaches a brain taken with `take_brain`. Dropped if the actor is gone.
    pub fn restore_brain(&mut self, id: ActorId, brain: BrainSlot) {
        if let Some(actor) = self.actors.get_mut(&id) {
            actor.brain = Some(brain);
        }
    }

    pub fn clear(&mut self) {
        self.actors.clear();
    }
}
