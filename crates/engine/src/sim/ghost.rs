use std::collections::BTreeMap;

use tracing::trace;

use crate::math::{smooth_step, Vec3};

use super::actor::{ActorId, ThingState};
use super::arena::ActorArena;
use super::camera::{Camera, CameraMode, FollowLists};
use super::collision::CollisionSystem;

pub const GHOST_UP_SECONDS: f32 = 0.22;
/// Time a ghost lingers after it stops occluding. Longer than the ramp up.
pub const GHOST_DECAY_SECONDS: f32 = 0.25;
pub const GLOW_UP_SECONDS: f32 = GHOST_UP_SECONDS * 0.25;
pub const GLOW_DOWN_SECONDS: f32 = GHOST_UP_SECONDS - GLOW_UP_SECONDS;
pub const MIN_GHOST_OPACITY: f32 = 0.2;
pub const FULL_GLOW: f32 = 0.25;

const CAMERA_SPHERE_NEAR_CLIP_SCALE: f32 = 5.0;
const MAX_SIGHT_RAY: f32 = 20.0;
const CURSOR_PULLBACK: f32 = 5.0;
const SIGHT_RAY_RADIUS: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ghost {
    pub actor: ActorId,
    pub time_start: f64,
    pub time_occluding: f64,
    /// Set when the camera sits inside the actor; skips the fade in.
    pub urgent: bool,
}

impl Ghost {
    pub fn still_urgent(&self, now: f64) -> bool {
        ((now - self.time_start) as f32) < GLOW_UP_SECONDS + GLOW_DOWN_SECONDS
    }

    pub fn opacity(&self, now: f64) -> f32 {
        if self.urgent {
            return MIN_GHOST_OPACITY;
        }
        let t = ((now - self.time_start) as f32 / GHOST_UP_SECONDS).clamp(0.0, 1.0);
        1.0 + smooth_step(0.0, 1.0, t) * (MIN_GHOST_OPACITY - 1.0)
    }

    /// Bloom flash when the ghost appears, replayed in reverse while it decays.
    pub fn glow(&self, now: f64) -> f32 {
        let glow_length = GLOW_UP_SECONDS + GLOW_DOWN_SECONDS;
        let mut t = (now - self.time_start) as f32;
        let since_occluding = (now - self.time_occluding) as f32;
        if GHOST_DECAY_SECONDS - since_occluding < glow_length {
            t = GHOST_DECAY_SECONDS - since_occluding;
        }
        let ramp = if t <= GLOW_UP_SECONDS {
            t / GLOW_UP_SECONDS
        } else if t >= glow_length - GLOW_DOWN_SECONDS {
            (glow_length - t) / GLOW_DOWN_SECONDS
        } else {
            1.0
        };
        ramp.clamp(0.0, 1.0) * FULL_GLOW
    }
}

/// Per-frame inputs for the occlusion scan.
#[derive(Debug, Clone, Copy)]
pub struct GhostScan<'a> {
    pub camera: &'a Camera,
    pub follow: &'a FollowLists,
    pub cursor: Vec3,
    pub edit_focus: Option<ActorId>,
    pub run_sim: bool,
    /// Keyboard/mouse play skips the occlusion rays; only invisible actors ghost.
    pub mouse_mode: bool,
    pub now: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GhostDraw {
    pub actor: ActorId,
    pub opacity: f32,
    pub glow: f32,
}

/// Actors drawn see-through because they block the view or are flagged invisible.
#[derive(Debug, Default)]
pub struct CameraGhostBuffer {
    ghosts: BTreeMap<ActorId, Ghost>,
}

impl CameraGhostBuffer {
    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }

    pub fn get(&self, id: ActorId) -> Option<&Ghost> {
        self.ghosts.get(&id)
    }

    pub fn is_ghosted(&self, id: ActorId) -> bool {
        self.ghosts.contains_key(&id)
    }

    pub fn check(
        &mut self,
        actors: &mut ActorArena,
        collision: &dyn CollisionSystem,
        scan: GhostScan<'_>,
    ) {
        let exclude = exclusions(&scan);

        let invisible: Vec<ActorId> = actors
            .iter()
            .filter(|actor| actor.visibility.wants_ghost())
            .map(|actor| actor.id)
            .collect();
        self.merge(actors, invisible, true, scan.now);

        if !scan.mouse_mode {
            let camera = scan.camera;
            let radius = camera.near_clip * CAMERA_SPHERE_NEAR_CLIP_SCALE;
            let inside = filter_hits(
                collision.test_all(actors, camera.from, camera.from, radius),
                &exclude,
            );
            self.merge(actors, inside, true, scan.now);

            let blocking = filter_hits(sight_line_hits(actors, collision, &scan), &exclude);
            if !blocking.is_empty() {
                self.merge(actors, blocking, false, scan.now);
            }
        }

        self.prune(actors, scan.now);
    }

    /// Ghost draw list ordered far to near from `eye`.
    pub fn draw_list(&self, actors: &ActorArena, eye: Vec3, now: f64) -> Vec<GhostDraw> {
        let mut ordered: Vec<(f32, GhostDraw)> = self
            .ghosts
            .values()
            .filter_map(|ghost| {
                let actor = actors.get(ghost.actor)?;
                Some((
                    eye.distance_squared(actor.position()),
                    GhostDraw {
                        actor: ghost.actor,
                        opacity: ghost.opacity(now),
                        glow: ghost.glow(now),
                    },
                ))
            })
            .collect();
        ordered.sort_by(|a, b| b.0.total_cmp(&a.0));
        ordered.into_iter().map(|(_, draw)| draw).collect()
    }

    pub fn clear(&mut self, actors: &mut ActorArena) {
        for id in std::mem::take(&mut self.ghosts).into_keys() {
            unghost(actors, id);
        }
    }

    fn merge(
        &mut self,
        actors: &mut ActorArena,
        mut found: Vec<ActorId>,
        urgent: bool,
        now: f64,
    ) {
        found.sort();
        found.dedup();
        for id in found {
            if let Some(ghost) = self.ghosts.get_mut(&id) {
                ghost.time_occluding = now;
                ghost.urgent = ghost.still_urgent(now) || urgent;
                continue;
            }
            let Some(actor) = actors.get_mut(id) else {
                continue;
            };
            if !(actor.visibility.wants_ghost() || actor.visibility.visible) {
                continue;
            }
            actor.emitters_enabled = false;
            self.ghosts.insert(
                id,
                Ghost {
                    actor: id,
                    time_start: now,
                    time_occluding: now,
                    urgent,
                },
            );
            trace!(id = id.0, urgent, "ghost_added");
        }
    }

    fn prune(&mut self, actors: &mut ActorArena, now: f64) {
        let oldest = now - f64::from(GHOST_DECAY_SECONDS);
        let expired: Vec<ActorId> = self
            .ghosts
            .values()
            .filter(|ghost| {
                if ghost.time_occluding < oldest {
                    return true;
                }
                match actors.get(ghost.actor) {
                    None => true,
                    Some(actor) => {
                        actor.state == ThingState::Inactive
                            || (!actor.visibility.wants_ghost() && !actor.visibility.visible)
                    }
                }
            })
            .map(|ghost| ghost.actor)
            .collect();
        for id in expired {
            self.ghosts.remove(&id);
            unghost(actors, id);
        }
    }
}

fn unghost(actors: &mut ActorArena, id: ActorId) {
    if let Some(actor) = actors.get_mut(id) {
        let live = !matches!(actor.state, ThingState::Inactive | ThingState::Dead);
        if actor.visibility.visible && live {
            actor.emitters_enabled = true;
        }
    }
}

fn exclusions(scan: &GhostScan<'_>) -> Vec<ActorId> {
    let mut exclude: Vec<ActorId> = scan
        .follow
        .first_person()
        .into_iter()
        .chain(scan.edit_focus)
        .collect();
    if scan.run_sim {
        exclude.extend_from_slice(scan.follow.merged());
    }
    exclude
}

fn filter_hits(hits: Vec<ActorId>, exclude: &[ActorId]) -> Vec<ActorId> {
    hits.into_iter().filter(|id| !exclude.contains(id)).collect()
}

fn limit_ray(from: Vec3, at: Vec3, max_distance: f32) -> Vec3 {
    let delta = at - from;
    let length = delta.length();
    if length <= max_distance || length <= f32::EPSILON {
        return at;
    }
    from + delta * (max_distance / length)
}

fn sight_line_hits(
    actors: &ActorArena,
    collision: &dyn CollisionSystem,
    scan: &GhostScan<'_>,
) -> Vec<ActorId> {
    let camera = scan.camera;
    if scan.follow.first_person().is_some() || camera.mode == CameraMode::FixedTarget {
        return Vec::new();
    }

    let cursor_only = scan.follow.merged().is_empty() || !scan.run_sim;
    if cursor_only {
        let target = scan
            .edit_focus
            .and_then(|id| actors.get(id))
            .map(|actor| actor.position())
            .unwrap_or(scan.cursor);
        let target = limit_ray(camera.from, target, MAX_SIGHT_RAY)
            - camera.view_dir() * CURSOR_PULLBACK;
        return collision.test_all(actors, camera.from, target, SIGHT_RAY_RADIUS);
    }

    scan.follow
        .merged()
        .iter()
        .filter_map(|id| actors.get(*id))
        .flat_map(|actor| {
            let target = limit_ray(camera.from, actor.position(), MAX_SIGHT_RAY);
            collision.test_all(actors, camera.from, target, SIGHT_RAY_RADIUS)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::actor::{Actor, Chassis, ThingKind};
    use crate::sim::collision::SphereCollisionSystem;

    fn actor_at(
        arena: &mut ActorArena,
        collision: &mut SphereCollisionSystem,
        id: u64,
        at: Vec3,
    ) {
        let mut actor = Actor::new(ActorId(id), "bot", ThingKind::Bot, at)
            .with_chassis(Chassis::default());
        actor.state = ThingState::Active;
        arena.insert(actor);
        collision.register_mover(ActorId(id));
    }

    fn camera() -> Camera {
        Camera {
            from: Vec3::new(0.0, 0.0, 2.0),
            at: Vec3::new(10.0, 0.0, 2.0),
            ..Camera::default()
        }
    }

    fn scan<'a>(camera: &'a Camera, follow: &'a FollowLists, now: f64) -> GhostScan<'a> {
        GhostScan {
            camera,
            follow,
            cursor: Vec3::new(30.0, 0.0, 2.0),
            edit_focus: None,
            run_sim: false,
            mouse_mode: false,
            now,
        }
    }

    #[test]
    fn opacity_fades_to_minimum_over_ghost_up() {
        let ghost = Ghost {
            actor: ActorId(1),
            time_start: 10.0,
            time_occluding: 10.0,
            urgent: false,
        };
        assert!((ghost.opacity(10.0) - 1.0).abs() < 0.0001);
        let faded = ghost.opacity(10.0 + f64::from(GHOST_UP_SECONDS));
        assert!((faded - MIN_GHOST_OPACITY).abs() < 0.0001);
        let urgent = Ghost {
            urgent: true,
            ..ghost
        };
        assert!((urgent.opacity(10.0) - MIN_GHOST_OPACITY).abs() < 0.0001);
    }

    #[test]
    fn actor_on_sight_line_ghosts_and_decays() {
        let mut arena = ActorArena::default();
        let mut collision = SphereCollisionSystem::default();
        actor_at(&mut arena, &mut collision, 1, Vec3::new(8.0, 0.0, 2.0));
        actor_at(&mut arena, &mut collision, 2, Vec3::new(8.0, 9.0, 2.0));
        let camera = camera();
        let follow = FollowLists::default();
        let mut buffer = CameraGhostBuffer::default();

        buffer.check(&mut arena, &collision, scan(&camera, &follow, 1.0));

        assert!(buffer.is_ghosted(ActorId(1)));
        assert!(!buffer.is_ghosted(ActorId(2)));
        assert!(!buffer.get(ActorId(1)).expect("ghost").urgent);
        assert!(!arena.get(ActorId(1)).expect("actor").emitters_enabled);

        arena.get_mut(ActorId(1)).expect("actor").movement.position = Vec3::new(8.0, 6.0, 2.0);
        buffer.check(&mut arena, &collision, scan(&camera, &follow, 1.1));
        assert!(buffer.is_ghosted(ActorId(1)));
        buffer.check(&mut arena, &collision, scan(&camera, &follow, 1.5));
        assert!(buffer.is_empty());
        assert!(arena.get(ActorId(1)).expect("actor").emitters_enabled);
    }

    #[test]
    fn camera_inside_actor_ghosts_urgently() {
        let mut arena = ActorArena::default();
        let mut collision = SphereCollisionSystem::default();
        actor_at(&mut arena, &mut collision, 3, Vec3::new(0.2, 0.0, 2.0));
        let camera = camera();
        let follow = FollowLists::default();
        let mut buffer = CameraGhostBuffer::default();

        buffer.check(&mut arena, &collision, scan(&camera, &follow, 0.0));

        let ghost = buffer.get(ActorId(3)).expect("ghost");
        assert!(ghost.urgent);
        assert!((ghost.opacity(0.0) - MIN_GHOST_OPACITY).abs() < 0.0001);
    }

    #[test]
    fn edit_focus_is_never_ghosted_and_mouse_mode_skips_rays() {
        let mut arena = ActorArena::default();
        let mut collision = SphereCollisionSystem::default();
        actor_at(&mut arena, &mut collision, 1, Vec3::new(8.0, 0.0, 2.0));
        let camera = camera();
        let follow = FollowLists::default();
        let mut buffer = CameraGhostBuffer::default();

        let mut focused = scan(&camera, &follow, 0.0);
        focused.edit_focus = Some(ActorId(1));
        buffer.check(&mut arena, &collision, focused);
        assert!(buffer.is_empty());

        let mut mouse = scan(&camera, &follow, 0.0);
        mouse.mouse_mode = true;
        buffer.check(&mut arena, &collision, mouse);
        assert!(buffer.is_empty());

        arena.get_mut(ActorId(1)).expect("actor").visibility.invisible = true;
        buffer.check(&mut arena, &collision, mouse);
        assert!(buffer.is_ghosted(ActorId(1)));
    }

    #[test]
    fn draw_list_is_far_to_near() {
        let mut arena = ActorArena::default();
        let mut collision = SphereCollisionSystem::default();
        actor_at(&mut arena, &mut collision, 1, Vec3::new(3.0, 0.0, 2.0));
        actor_at(&mut arena, &mut collision, 2, Vec3::new(9.0, 0.0, 2.0));
        let camera = camera();
        let follow = FollowLists::default();
        let mut buffer = CameraGhostBuffer::default();
        buffer.check(&mut arena, &collision, scan(&camera, &follow, 0.0));

        let order: Vec<ActorId> = buffer
            .draw_list(&arena, camera.from, 0.0)
            .into_iter()
            .map(|draw| draw.actor)
            .collect();
        assert_eq!(order, vec![ActorId(2), ActorId(1)]);
    }
}
