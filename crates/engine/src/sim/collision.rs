use crate::math::Vec3;

use super::actor::ActorId;
use super::arena::ActorArena;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub actor: ActorId,
    pub other: ActorId,
    /// Push direction applied to `actor`.
    pub normal: Vec3,
    pub depth: f32,
}

/// Physical collision resolution consumed by the tick as a black box.
pub trait CollisionSystem {
    fn register_mover(&mut self, id: ActorId);

    fn register_blocker(&mut self, id: ActorId);

    fn unregister(&mut self, id: ActorId);

    /// Resolves desired positions of every registered mover. Contacts are reported back
    /// so the tick can hand them to each actor.
    fn update(&mut self, actors: &mut ActorArena, dt: f32) -> Vec<Contact>;

    /// Registered actors touched by a swept sphere from `from` to `to`.
    fn test_all(&self, actors: &ActorArena, from: Vec3, to: Vec3, radius: f32) -> Vec<ActorId>;

    fn clear(&mut self);
}

/// Pairwise sphere push-out. Movers split overlap with other movers and take all of it
/// against blockers.
#[derive(Debug, Default)]
pub struct SphereCollisionSystem {
    movers: Vec<ActorId>,
    blockers: Vec<ActorId>,
}

impl SphereCollisionSystem {
    pub fn movers(&self) -> &[ActorId] {
        &self.movers
    }

    pub fn blockers(&self) -> &[ActorId] {
        &self.blockers
    }
}

impl CollisionSystem for SphereCollisionSystem {
    fn register_mover(&mut self, id: ActorId) {
        if !self.movers.contains(&id) {
            self.movers.push(id);
        }
    }

    fn register_blocker(&mut self, id: ActorId) {
        if !self.blockers.contains(&id) {
            self.blockers.push(id);
        }
    }

    fn unregister(&mut self, id: ActorId) {
        self.movers.retain(|other| *other != id);
        self.blockers.retain(|other| *other != id);
    }

    fn update(&mut self, actors: &mut ActorArena, _dt: f32) -> Vec<Contact> {
        let mut contacts = Vec::new();
        for (index, &mover) in self.movers.iter().enumerate() {
            let others = self.movers[index + 1..]
                .iter()
                .map(|id| (*id, true))
                .chain(self.blockers.iter().map(|id| (*id, false)));
            for (other, other_moves) in others {
                let (Some(a), Some(b)) = (actors.get(mover), actors.get(other)) else {
                    continue;
                };
                let delta = a.position() - b.position();
                let reach = a.collision_radius() + b.collision_radius();
                let distance = delta.length();
                if distance >= reach {
                    continue;
                }
                let normal = if distance > f32::EPSILON {
                    delta * (1.0 / distance)
                } else {
                    Vec3::new(1.0, 0.0, 0.0)
                };
                let depth = reach - distance;
                let share = if other_moves { 0.5 } else { 1.0 };
                if let Some(a) = actors.get_mut(mover) {
                    a.movement.position += normal * (depth * share);
                }
                if other_moves {
                    if let Some(b) = actors.get_mut(other) {
                        b.movement.position -= normal * (depth * share);
                    }
                }
                contacts.push(Contact {
                    actor: mover,
                    other,
                    normal,
                    depth,
                });
                contacts.push(Contact {
                    actor: other,
                    other: mover,
                    normal: -normal,
                    depth,
                });
            }
        }
        contacts
    }

    fn test_all(&self, actors: &ActorArena, from: Vec3, to: Vec3, radius: f32) -> Vec<ActorId> {
        self.movers
            .iter()
            .chain(self.blockers.iter())
            .copied()
            .filter(|id| {
                actors.get(*id).is_some_and(|actor| {
                    let reach = radius + actor.collision_radius();
                    segment_distance_squared(from, to, actor.position()) <= reach * reach
                })
            })
            .collect()
    }

    fn clear(&mut self) {
        self.movers.clear();
        self.blockers.clear();
    }
}

fn segment_distance_squared(from: Vec3, to: Vec3, point: Vec3) -> f32 {
    let segment = to - from;
    let len_sq = segment.length_squared();
    if len_sq <= f32::EPSILON {
        return point.distance_squared(from);
    }
    let t = ((point - from).dot(segment) / len_sq).clamp(0.0, 1.0);
    point.distance_squared(from + segment * t)
}
