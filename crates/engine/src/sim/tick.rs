use tracing::info;

use crate::math::Vec3;

use super::actor::{ActorId, ThingState};
use super::collision::CollisionSystem;
use super::terrain::TerrainQuery;
use super::world::SimWorld;

/// Actors below this height are deactivated.
pub const WORLD_FLOOR_Z: f32 = -50.0;

/// Per-second pull of a held actor toward its holder's attachment point.
pub const HELD_DRAG_RATE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    PreFrame,
    PreBrain,
    Sense,
    FreshenScores,
    Act,
    EndOfPath,
    FirstPerson,
    PostBrain,
    ResolveFollow,
    PreCollision,
    Collision,
    PostCollision,
}

pub const TICK_PHASE_ORDER: [TickPhase; 12] = [
    TickPhase::PreFrame,
    TickPhase::PreBrain,
    TickPhase::Sense,
    TickPhase::FreshenScores,
    TickPhase::Act,
    TickPhase::EndOfPath,
    TickPhase::FirstPerson,
    TickPhase::PostBrain,
    TickPhase::ResolveFollow,
    TickPhase::PreCollision,
    TickPhase::Collision,
    TickPhase::PostCollision,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    pub frame: u64,
    pub dt: f32,
    pub paused: bool,
    pub modal_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped,
    Completed,
    /// The tick stopped in pre-collision after this actor crossed the world floor.
    FloorDeath(ActorId),
}

/// One frame of actor update in a fixed phase order.
#[derive(Debug, Default)]
pub struct SimulationTick {
    last_tick_phases: Vec<TickPhase>,
    ticks_run: u64,
}

impl SimulationTick {
    pub fn last_tick_phases(&self) -> &[TickPhase] {
        &self.last_tick_phases
    }

    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }

    pub fn run(
        &mut self,
        world: &mut SimWorld,
        collision: &mut dyn CollisionSystem,
        terrain: &dyn TerrainQuery,
        input: TickInput,
    ) -> TickOutcome {
        self.last_tick_phases.clear();
        if input.paused || input.modal_active {
            return TickOutcome::Skipped;
        }
        self.ticks_run = self.ticks_run.saturating_add(1);

        let TickInput { frame, dt, .. } = input;
        // Stable snapshots: intents queued by brains only land in refresh.
        let brains = world.registry.brain_list().to_vec();
        let chassis = world.registry.chassis_list().to_vec();

        self.last_tick_phases.push(TickPhase::PreFrame);
        for id in &chassis {
            if let Some(actor) = world.actors.get_mut(*id) {
                let movement = &mut actor.movement;
                movement.prev_position = movement.position;
                movement.prev_velocity = movement.velocity;
                movement.desired_velocity = Vec3::ZERO;
                actor.contacts.clear();
            }
        }
        world.follow.reset_multi_follow();

        self.last_tick_phases.push(TickPhase::PreBrain);
        for id in &brains {
            world.run_brain_hook(*id, terrain, frame, dt, |brain, ctx| brain.pre_brain(ctx));
        }

        self.last_tick_phases.push(TickPhase::Sense);
        for id in &brains {
            world.run_brain_hook(*id, terrain, frame, dt, |brain, ctx| {
                brain.update_sensors(ctx)
            });
        }

        self.last_tick_phases.push(TickPhase::FreshenScores);
        world.scores.freshen();
        for id in &brains {
            world.run_brain_hook(*id, terrain, frame, dt, |brain, ctx| {
                brain.freshen_local_scores(ctx)
            });
        }

        self.last_tick_phases.push(TickPhase::Act);
        for id in &brains {
            world.run_brain_hook(*id, terrain, frame, dt, |brain, ctx| {
                brain.update_actuators(ctx)
            });
        }

        self.last_tick_phases.push(TickPhase::EndOfPath);
        for id in &brains {
            if let Some(actor) = world.actors.get_mut(*id) {
                actor.eop.advance();
            }
        }

        self.last_tick_phases.push(TickPhase::FirstPerson);
        let first_person = world.follow.first_person_request().filter(|id| {
            world
                .actors
                .get(*id)
                .is_some_and(|actor| actor.first_person_eligible)
        });
        world.follow.set_first_person(first_person);
        for id in &brains {
            if let Some(actor) = world.actors.get_mut(*id) {
                actor.first_person_active = first_person == Some(*id);
            }
        }

        self.last_tick_phases.push(TickPhase::PostBrain);
        for id in &brains {
            world.run_brain_hook(*id, terrain, frame, dt, |brain, ctx| brain.post_brain(ctx));
        }

        self.last_tick_phases.push(TickPhase::ResolveFollow);
        world.follow.resolve();

        self.last_tick_phases.push(TickPhase::PreCollision);
        if let Some(fallen) = pre_collision(world, collision, terrain, &chassis, dt) {
            return TickOutcome::FloorDeath(fallen);
        }

        self.last_tick_phases.push(TickPhase::Collision);
        for contact in collision.update(&mut world.actors, dt) {
            if let Some(actor) = world.actors.get_mut(contact.actor) {
                actor.contacts.push(contact.other);
            }
        }

        self.last_tick_phases.push(TickPhase::PostCollision);
        post_collision(world, terrain, &chassis, frame, dt);

        TickOutcome::Completed
    }
}

/// Holders move before the actors they carry so the drag targets this frame's
/// attachment point.
fn pre_collision(
    world: &mut SimWorld,
    collision: &mut dyn CollisionSystem,
    terrain: &dyn TerrainQuery,
    chassis_ids: &[ActorId],
    dt: f32,
) -> Option<ActorId> {
    let (held, free): (Vec<ActorId>, Vec<ActorId>) =
        chassis_ids.iter().copied().partition(|id| {
            world
                .actors
                .get(*id)
                .is_some_and(|actor| actor.held_by.is_some())
        });

    for id in free.into_iter().chain(held) {
        let holder = world
            .actors
            .get(id)
            .and_then(|actor| actor.held_by)
            .and_then(|holder_id| world.actors.get(holder_id))
            .map(|holder| (holder.movement.velocity, holder.world_holding_position()));

        let Some(actor) = world.actors.get_mut(id) else {
            continue;
        };
        if actor.hidden_creatable {
            continue;
        }
        let Some(mut chassis) = actor.chassis else {
            continue;
        };
        chassis.modifiers = actor.tweak;
        actor.chassis = Some(chassis);

        match holder {
            Some((holder_velocity, mut attach)) => {
                let ground = terrain.height_at(attach);
                let surface = if chassis.stay_above_water {
                    ground.max(terrain.water_level_at(attach))
                } else {
                    ground
                };
                attach.z = attach.z.max(surface + chassis.min_height);
                let strength = (HELD_DRAG_RATE * dt).min(1.0);
                actor.movement.velocity = holder_velocity;
                actor.movement.position = actor.movement.position.lerp(attach, strength);
            }
            None => {
                actor.held_by = None;
                chassis.pre_collision_update(&mut actor.movement, dt);
            }
        }

        if actor.state == ThingState::Active && actor.movement.position.z < WORLD_FLOOR_Z {
            info!(
                id = id.0,
                z = actor.movement.position.z,
                "actor_fell_below_world_floor"
            );
            actor.deactivate();
            world.registry.unregister_all(actor, collision);
            return Some(id);
        }
    }
    None
}

fn post_collision(
    world: &mut SimWorld,
    terrain: &dyn TerrainQuery,
    chassis_ids: &[ActorId],
    frame: u64,
    dt: f32,
) {
    let bounds = terrain.bounds();
    for id in chassis_ids.iter().copied() {
        let Some(actor) = world.actors.get_mut(id) else {
            continue;
        };
        if actor.hidden_creatable {
            continue;
        }
        let Some(chassis) = actor.chassis else {
            continue;
        };

        let movement = &mut actor.movement;
        if bounds.is_some_and(|bounds| !bounds.contains(movement.position)) {
            movement.position.x = movement.prev_position.x;
            movement.position.y = movement.prev_position.y;
            movement.velocity.x = 0.0;
            movement.velocity.y = 0.0;
        }
        let position = movement.position;
        chassis.post_collision_update(
            movement,
            terrain.height_at(position),
            terrain.water_level_at(position),
        );

        world.run_brain_hook(id, terrain, frame, dt, |brain, ctx| brain.post_collide(ctx));

        let Some(actor) = world.actors.get_mut(id) else {
            continue;
        };
        if chassis.immobile {
            actor.movement.position = actor.movement.prev_position;
            actor.movement.velocity = Vec3::ZERO;
        }
        actor.constraints.apply(&mut actor.movement);
        actor.constraints.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::sim::actor::{Actor, Chassis, ChassisKind, ThingKind};
    use crate::sim::arena::ActorArena;
    use crate::sim::brain::{Brain, BrainCatalog, BrainContext, BrainProgram, BrainSlot};
    use crate::sim::collision::Contact;
    use crate::sim::terrain::FlatTerrain;

    #[derive(Default)]
    struct NullCollision;

    impl CollisionSystem for NullCollision {
        fn register_mover(&mut self, _id: ActorId) {}

        fn register_blocker(&mut self, _id: ActorId) {}

        fn unregister(&mut self, _id: ActorId) {}

        fn update(&mut self, _actors: &mut ActorArena, _dt: f32) -> Vec<Contact> {
            Vec::new()
        }

        fn test_all(
            &self,
            _actors: &ActorArena,
            _from: Vec3,
            _to: Vec3,
            _radius: f32,
        ) -> Vec<ActorId> {
            Vec::new()
        }

        fn clear(&mut self) {}
    }

    type CallLog = Rc<RefCell<Vec<(ActorId, &'static str)>>>;

    struct RecordingBrain {
        log: CallLog,
    }

    impl Brain for RecordingBrain {
        fn update_sensors(&mut self, ctx: &mut BrainContext<'_>) {
            self.log.borrow_mut().push((ctx.id, "sense"));
        }

        fn update_actuators(&mut self, ctx: &mut BrainContext<'_>) {
            self.log.borrow_mut().push((ctx.id, "act"));
        }
    }

    /// Raises end-of-path on one frame only.
    struct ArriveOnFrame(u64);

    impl Brain for ArriveOnFrame {
        fn update_sensors(&mut self, _ctx: &mut BrainContext<'_>) {}

        fn update_actuators(&mut self, ctx: &mut BrainContext<'_>) {
            if ctx.frame == self.0 {
                if let Some(actor) = ctx.actor_mut() {
                    actor.eop.reached = true;
                }
            }
        }
    }

    struct Drive(Vec3);

    impl Brain for Drive {
        fn update_sensors(&mut self, _ctx: &mut BrainContext<'_>) {}

        fn update_actuators(&mut self, ctx: &mut BrainContext<'_>) {
            let velocity = self.0;
            if let Some(actor) = ctx.actor_mut() {
                actor.movement.desired_velocity = velocity;
            }
        }
    }

    struct RequestFirstPerson(ActorId);

    impl Brain for RequestFirstPerson {
        fn update_sensors(&mut self, _ctx: &mut BrainContext<'_>) {}

        fn update_actuators(&mut self, ctx: &mut BrainContext<'_>) {
            ctx.follow.request_first_person(self.0);
        }
    }

    fn slot(driver: Box<dyn Brain>) -> BrainSlot {
        BrainSlot {
            driver_name: "test".to_string(),
            program: BrainProgram::default(),
            driver,
        }
    }

    fn admit(world: &mut SimWorld, actor: Actor) -> ActorId {
        let id = world.add_thing(actor, true).expect("admitted");
        world.refresh(&mut NullCollision, &BrainCatalog::default());
        id
    }

    fn input(frame: u64, dt: f32) -> TickInput {
        TickInput {
            frame,
            dt,
            paused: false,
            modal_active: false,
        }
    }

    #[test]
    fn every_sensor_runs_before_any_actuator() {
        let mut world = SimWorld::default();
        let log = CallLog::default();
        for _ in 0..4 {
            let actor = world
                .create_actor("bot", ThingKind::Bot, Vec3::ZERO)
                .with_chassis(Chassis::default())
                .with_brain(slot(Box::new(RecordingBrain { log: log.clone() })));
            admit(&mut world, actor);
        }
        let mut tick = SimulationTick::default();

        let terrain = FlatTerrain::default();

        let outcome = tick.run(&mut world, &mut NullCollision, &terrain, input(1, 0.016));

        assert_eq!(outcome, TickOutcome::Completed);
        let calls = log.borrow();
        assert_eq!(calls.len(), 8);
        let last_sense = calls
            .iter()
            .rposition(|(_, call)| *call == "sense")
            .expect("sense calls");
        let first_act = calls
            .iter()
            .position(|(_, call)| *call == "act")
            .expect("act calls");
        assert!(last_sense < first_act);
        let act_order: Vec<ActorId> = calls[first_act..].iter().map(|(id, _)| *id).collect();
        assert_eq!(act_order, world.registry.brain_list());
        assert_eq!(tick.last_tick_phases(), TICK_PHASE_ORDER);
    }

    #[test]
    fn first_person_goes_only_to_eligible_actors_and_keeps_authored_flags() {
        let mut world = SimWorld::default();
        let mut pilot = world
            .create_actor("pilot", ThingKind::Bot, Vec3::ZERO)
            .with_chassis(Chassis::default())
            .with_brain(slot(Box::new(RecordingBrain {
                log: CallLog::default(),
            })));
        pilot.first_person_eligible = true;
        let pilot = admit(&mut world, pilot);
        let rock = world
            .create_actor("rock", ThingKind::Bot, Vec3::new(3.0, 0.0, 0.0))
            .with_chassis(Chassis::default())
            .with_brain(slot(Box::new(RequestFirstPerson(pilot))));
        let rock = admit(&mut world, rock);
        let terrain = FlatTerrain::default();
        let mut tick = SimulationTick::default();

        tick.run(&mut world, &mut NullCollision, &terrain, input(1, 0.016));
        assert_eq!(world.follow.first_person(), Some(pilot));
        let pilot_actor = world.actors.get(pilot).expect("pilot");
        assert!(pilot_actor.first_person_eligible);
        assert!(pilot_actor.first_person_active);
        assert!(!world.actors.get(rock).expect("rock").first_person_eligible);

        if let Some(slot) = world.actors.get_mut(rock).and_then(|actor| actor.brain.as_mut()) {
            slot.driver = Box::new(RequestFirstPerson(rock));
        }
        tick.run(&mut world, &mut NullCollision, &terrain, input(2, 0.016));
        assert_eq!(world.follow.first_person(), None);
        let pilot_actor = world.actors.get(pilot).expect("pilot");
        assert!(pilot_actor.first_person_eligible);
        assert!(!pilot_actor.first_person_active);
        let rock_actor = world.actors.get(rock).expect("rock");
        assert!(!rock_actor.first_person_eligible);
        assert!(!rock_actor.first_person_active);
    }

    #[test]
    fn end_of_path_clears_one_tick_after_ready() {
        let mut world = SimWorld::default();
        let actor = world
            .create_actor("walker", ThingKind::Bot, Vec3::ZERO)
            .with_chassis(Chassis::default())
            .with_brain(slot(Box::new(ArriveOnFrame(1))));
        let id = admit(&mut world, actor);
        let mut tick = SimulationTick::default();
        let terrain = FlatTerrain::default();

        tick.run(&mut world, &mut NullCollision, &terrain, input(1, 0.016));
        let eop = world.actors.get(id).expect("walker").eop;
        assert!(eop.reached);
        assert!(eop.ready_to_process);

        tick.run(&mut world, &mut NullCollision, &terrain, input(2, 0.016));
        let eop = world.actors.get(id).expect("walker").eop;
        assert!(!eop.reached);
        assert!(!eop.ready_to_process);
    }

    #[test]
    fn held_actor_converges_geometrically_toward_holder() {
        let mut world = SimWorld::default();
        let flying = Chassis {
            kind: ChassisKind::Flying,
            ..Chassis::default()
        };
        let holder = world
            .create_actor("holder", ThingKind::Bot, Vec3::new(0.0, 0.0, 2.0))
            .with_chassis(flying)
            .with_brain(slot(Box::new(Drive(Vec3::new(2.0, 0.0, 0.0)))));
        let holder_id = admit(&mut world, holder);
        let mut held = world
            .create_actor("held", ThingKind::Bot, Vec3::new(-6.0, 4.0, 5.0))
            .with_chassis(flying);
        held.held_by = Some(holder_id);
        let held_id = admit(&mut world, held);

        let dt = 0.05;
        let ratio = 1.0 - (HELD_DRAG_RATE * dt).min(1.0);
        let terrain = FlatTerrain::default();
        let mut tick = SimulationTick::default();
        for frame in 1..=12 {
            let before = world.actors.get(held_id).expect("held").position();
            tick.run(&mut world, &mut NullCollision, &terrain, input(frame, dt));
            let holder = world.actors.get(holder_id).expect("holder");
            let attach = holder.world_holding_position();
            let held = world.actors.get(held_id).expect("held");
            let expected = (attach - before) * ratio;
            let actual = attach - held.position();
            assert!((expected.x - actual.x).abs() < 0.0001);
            assert!((expected.y - actual.y).abs() < 0.0001);
            assert!((expected.z - actual.z).abs() < 0.0001);
            assert_eq!(held.movement.velocity, holder.movement.velocity);
        }
    }

    #[test]
    fn held_actor_attachment_is_clamped_above_terrain() {
        let mut world = SimWorld::default();
        let flying = Chassis {
            kind: ChassisKind::Flying,
            ..Chassis::default()
        };
        let mut holder = world
            .create_actor("holder", ThingKind::Bot, Vec3::new(0.0, 0.0, 1.0))
            .with_chassis(flying);
        holder.holding_offset = Vec3::new(0.0, 0.0, -5.0);
        let holder_id = admit(&mut world, holder);
        let mut held = world
            .create_actor("held", ThingKind::Bot, Vec3::new(0.0, 0.0, 1.0))
            .with_chassis(flying);
        held.held_by = Some(holder_id);
        let held_id = admit(&mut world, held);

        let terrain = FlatTerrain {
            height: 0.25,
            water_level: None,
        };
        let mut tick = SimulationTick::default();
        for frame in 1..=30 {
            tick.run(&mut world, &mut NullCollision, &terrain, input(frame, 0.05));
            let z = world.actors.get(held_id).expect("held").position().z;
            assert!(z >= 0.25 + flying.min_height - 0.0001);
        }
        let z = world.actors.get(held_id).expect("held").position().z;
        assert!((z - 0.75).abs() < 0.0001);
    }

    #[test]
    fn actor_below_world_floor_is_deactivated_and_unregistered() {
        let mut world = SimWorld::default();
        let log = CallLog::default();
        let faller = world
            .create_actor("faller", ThingKind::Bot, Vec3::new(0.0, 0.0, -60.0))
            .with_chassis(Chassis {
                kind: ChassisKind::Flying,
                ..Chassis::default()
            })
            .with_brain(slot(Box::new(RecordingBrain { log })));
        let id = admit(&mut world, faller);
        assert_eq!(world.actors.get(id).expect("faller").state, ThingState::Active);
        let mut tick = SimulationTick::default();

        let outcome = tick.run(
            &mut world,
            &mut NullCollision,
            &FlatTerrain::default(),
            input(1, 0.016),
        );

        assert_eq!(outcome, TickOutcome::FloorDeath(id));
        assert_eq!(tick.last_tick_phases().last(), Some(&TickPhase::PreCollision));
        assert!(!world.registry.is_registered_anywhere(id));
        assert_eq!(
            world.actors.get(id).expect("faller").effective_state(),
            ThingState::Inactive
        );

        world.refresh(&mut NullCollision, &BrainCatalog::default());
        assert!(world.is_empty());
    }

    #[test]
    fn paused_or_modal_world_skips_tick() {
        let mut world = SimWorld::default();
        let mut tick = SimulationTick::default();
        let terrain = FlatTerrain::default();
        let mut paused = input(1, 0.016);
        paused.paused = true;
        assert_eq!(
            tick.run(&mut world, &mut NullCollision, &terrain, paused),
            TickOutcome::Skipped
        );
        let mut modal = input(1, 0.016);
        modal.modal_active = true;
        assert_eq!(
            tick.run(&mut world, &mut NullCollision, &terrain, modal),
            TickOutcome::Skipped
        );
        assert_eq!(tick.ticks_run(), 0);
        assert!(tick.last_tick_phases().is_empty());
    }

    #[test]
    fn immobile_actor_is_restored_and_constraints_cleared() {
        let mut world = SimWorld::default();
        let mut actor = world
            .create_actor("statue", ThingKind::Bot, Vec3::new(1.0, 1.0, 0.5))
            .with_chassis(Chassis {
                immobile: true,
                ..Chassis::default()
            })
            .with_brain(slot(Box::new(Drive(Vec3::new(3.0, 0.0, 0.0)))));
        actor.constraints.mask.insert(crate::sim::actor::ConstraintMask::STOP);
        let id = admit(&mut world, actor);
        let mut tick = SimulationTick::default();

        let terrain = FlatTerrain::default();
        tick.run(&mut world, &mut NullCollision, &terrain, input(1, 0.1));

        let actor = world.actors.get(id).expect("statue");
        assert_eq!(actor.position(), Vec3::new(1.0, 1.0, 0.5));
        assert!(actor.constraints.mask.is_none());
    }
}
