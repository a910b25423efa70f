use super::actor::{Actor, ActorId};
use super::collision::CollisionSystem;

/// Ordered update lists. Every list holds an actor at most once; the actor's
/// `RegistrationFlags` mirror membership so repeat calls are no-ops.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    brain: Vec<ActorId>,
    chassis: Vec<ActorId>,
    collide: Vec<ActorId>,
}

impl ActorRegistry {
    pub fn brain_list(&self) -> &[ActorId] {
        &self.brain
    }

    pub fn chassis_list(&self) -> &[ActorId] {
        &self.chassis
    }

    pub fn collide_list(&self) -> &[ActorId] {
        &self.collide
    }

    pub fn register_brain(&mut self, actor: &mut Actor) {
        if actor.registration.brain || actor.brain.is_none() || actor.is_creatable() {
            return;
        }
        self.brain.push(actor.id);
        actor.registration.brain = true;
    }

    pub fn unregister_brain(&mut self, actor: &mut Actor) {
        if !actor.registration.brain {
            return;
        }
        self.brain.retain(|id| *id != actor.id);
        actor.registration.brain = false;
    }

    pub fn register_chassis(&mut self, actor: &mut Actor) {
        if actor.registration.chassis || actor.chassis.is_none() {
            return;
        }
        self.chassis.push(actor.id);
        actor.registration.chassis = true;
    }

    pub fn unregister_chassis(&mut self, actor: &mut Actor) {
        if !actor.registration.chassis {
            return;
        }
        self.chassis.retain(|id| *id != actor.id);
        actor.registration.chassis = false;
    }

    /// Fixed-position chassis collide as blockers, everything else as movers.
    pub fn register_collide(&mut self, actor: &mut Actor, collision: &mut dyn CollisionSystem) {
        if actor.registration.collide || actor.is_creatable() {
            return;
        }
        let Some(chassis) = actor.chassis.as_ref() else {
            return;
        };
        if chassis.is_fixed_position() {
            collision.register_blocker(actor.id);
        } else {
            collision.register_mover(actor.id);
        }
        self.collide.push(actor.id);
        actor.registration.collide = true;
    }

    pub fn unregister_collide(&mut self, actor: &mut Actor, collision: &mut dyn CollisionSystem) {
        if !actor.registration.collide {
            return;
        }
        collision.unregister(actor.id);
        self.collide.retain(|id| *id != actor.id);
        actor.registration.collide = false;
    }

    pub fn register_all(&mut self, actor: &mut Actor, collision: &mut dyn CollisionSystem) {
        self.register_brain(actor);
        self.register_chassis(actor);
        self.register_collide(actor, collision);
    }

    pub fn unregister_all(&mut self, actor: &mut Actor, collision: &mut dyn CollisionSystem) {
        self.unregister_brain(actor);
        self.unregister_chassis(actor);
        self.unregister_collide(actor, collision);
    }

    pub fn is_registered_anywhere(&self, id: ActorId) -> bool {
        self.brain.contains(&id) || self.chassis.contains(&id) || self.collide.contains(&id)
    }

    pub fn clear(&mut self, collision: &mut dyn CollisionSystem) {
        self.brain.clear();
        self.chassis.clear();
        self.collide.clear();
        collision.clear();
    }
}
