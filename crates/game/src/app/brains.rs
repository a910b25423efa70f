use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sandbox_engine::sim::{Brain, BrainCatalog, BrainContext};
use sandbox_engine::Vec3;
use tracing::debug;

pub(crate) const WANDER: &str = "wander";
pub(crate) const PATROL: &str = "patrol";

const WANDER_SPEED: f32 = 3.0;
const WANDER_TURN_SECONDS: f32 = 1.5;
const PATROL_SPEED: f32 = 4.0;
const PATROL_HALF_SIDE: f32 = 6.0;
const PATROL_ARRIVE_RADIUS: f32 = 0.5;

pub(crate) fn demo_catalog() -> BrainCatalog {
    let mut catalog = BrainCatalog::default();
    catalog.register(WANDER, || Box::new(Wanderer::default()));
    catalog.register(PATROL, || Box::new(Patroller::default()));
    catalog
}

/// Drives in a straight line, picking a new heading every so often. Bumping into
/// something scores a point for the bot's team and turns it around.
#[derive(Debug, Default)]
pub(crate) struct Wanderer {
    heading: f32,
    turn_in: f32,
    /// Seeded from the actor id on first use so a level replays the same way.
    rng: Option<StdRng>,
}

impl Brain for Wanderer {
    fn update_sensors(&mut self, ctx: &mut BrainContext<'_>) {
        let seed = ctx.id.0;
        let rng = self.rng.get_or_insert_with(|| StdRng::seed_from_u64(seed));
        self.turn_in -= ctx.dt;
        if self.turn_in <= 0.0 {
            self.heading = rng.gen_range(0.0..TAU);
            self.turn_in = WANDER_TURN_SECONDS * rng.gen_range(0.5..1.5);
        }
    }

    fn update_actuators(&mut self, ctx: &mut BrainContext<'_>) {
        let heading = self.heading;
        if let Some(actor) = ctx.actor_mut() {
            actor.movement.desired_velocity =
                Vec3::new(heading.cos(), heading.sin(), 0.0) * WANDER_SPEED;
        }
    }

    fn post_collide(&mut self, ctx: &mut BrainContext<'_>) {
        let Some((color, bumped)) = ctx
            .actor()
            .map(|actor| (actor.classification.color, !actor.contacts.is_empty()))
        else {
            return;
        };
        if bumped {
            ctx.scores.add(color, 1);
            self.heading = (self.heading + TAU / 2.0) % TAU;
        }
    }
}

/// Walks a square around its spawn point. Reaching a corner raises end-of-path; the
/// next corner is chosen once that event comes back ready to process.
#[derive(Debug, Default)]
pub(crate) struct Patroller {
    origin: Option<Vec3>,
    corner: usize,
}

impl Patroller {
    fn target(&self) -> Option<Vec3> {
        const CORNERS: [(f32, f32); 4] = [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)];
        let (x, y) = CORNERS[self.corner % CORNERS.len()];
        self.origin
            .map(|origin| origin + Vec3::new(x * PATROL_HALF_SIDE, y * PATROL_HALF_SIDE, 0.0))
    }
}

impl Brain for Patroller {
    fn pre_brain(&mut self, ctx: &mut BrainContext<'_>) {
        if self.origin.is_none() {
            self.origin = ctx.actor().map(|actor| actor.position());
        }
    }

    fn update_sensors(&mut self, ctx: &mut BrainContext<'_>) {
        let target = self.target();
        let Some(actor) = ctx.actor_mut() else {
            return;
        };
        if actor.eop.ready_to_process {
            self.corner = (self.corner + 1) % 4;
            debug!(id = actor.id.0, corner = self.corner, "patrol_corner_reached");
            return;
        }
        let Some(target) = target else {
            return;
        };
        let offset = (target - actor.position()).with_z(0.0);
        if offset.length() <= PATROL_ARRIVE_RADIUS {
            actor.eop.reached = true;
        }
    }

    fn update_actuators(&mut self, ctx: &mut BrainContext<'_>) {
        let target = self.target();
        let Some(actor) = ctx.actor_mut() else {
            return;
        };
        actor.movement.desired_velocity = match target {
            Some(target) if !actor.eop.reached => {
                (target - actor.position()).with_z(0.0).normalized_or_zero() * PATROL_SPEED
            }
            _ => Vec3::ZERO,
        };
    }
}
