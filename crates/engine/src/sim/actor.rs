use serde::{Deserialize, Serialize};

use crate::math::Vec3;

use super::brain::BrainSlot;
use super::scores::LocalScores;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub u64);

#[derive(Debug, Default)]
pub struct ActorIdAllocator {
    next: u64,
}

impl ActorIdAllocator {
    pub fn allocate(&mut self) -> ActorId {
        let id = ActorId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Identity of a creatable template. `CreatableId::NIL` means "not linked".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreatableId(pub u64);

impl CreatableId {
    pub const NIL: CreatableId = CreatableId(0);

    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreatableLink {
    #[default]
    Independent,
    /// A template actor. Hidden while the simulation runs.
    Template(CreatableId),
    /// A runtime copy spawned from a template.
    Clone(CreatableId),
}

impl CreatableLink {
    pub fn is_creatable(self) -> bool {
        matches!(self, CreatableLink::Template(_))
    }

    pub fn creatable_id(self) -> CreatableId {
        match self {
            CreatableLink::Independent => CreatableId::NIL,
            CreatableLink::Template(id) | CreatableLink::Clone(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThingKind {
    #[default]
    Bot,
    Light,
    Prop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThingState {
    Active,
    Paused,
    #[default]
    Inactive,
    Dead,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamColor {
    #[default]
    White,
    Red,
    Green,
    Blue,
    Yellow,
    Purple,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub color: TeamColor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Movement {
    pub position: Vec3,
    pub velocity: Vec3,
    pub prev_position: Vec3,
    pub prev_velocity: Vec3,
    /// Per-frame accumulator written by actuators; consumed by the chassis.
    pub desired_velocity: Vec3,
}

impl Movement {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            prev_position: position,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChassisKind {
    /// Never moves; collides as a blocker.
    Fixed,
    #[default]
    Grounded,
    Hover,
    Flying,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TweakModifiers {
    pub speed: f32,
    pub turn: f32,
    pub acceleration: f32,
}

impl Default for TweakModifiers {
    fn default() -> Self {
        Self {
            speed: 1.0,
            turn: 1.0,
            acceleration: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstraintMask(u8);

impl ConstraintMask {
    pub const NONE: ConstraintMask = ConstraintMask(0);
    pub const LOCK_X: ConstraintMask = ConstraintMask(1);
    pub const LOCK_Y: ConstraintMask = ConstraintMask(1 << 1);
    pub const LOCK_Z: ConstraintMask = ConstraintMask(1 << 2);
    pub const STOP: ConstraintMask = ConstraintMask(1 << 3);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ConstraintMask) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn insert(&mut self, other: ConstraintMask) {
        self.0 |= other.0;
    }
}

/// Outstanding movement constraints, re-applied after collision each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MovementConstraints {
    pub mask: ConstraintMask,
    pub anchor: Vec3,
}

impl MovementConstraints {
    pub fn apply(&self, movement: &mut Movement) {
        if self.mask.contains(ConstraintMask::LOCK_X) {
            movement.position.x = self.anchor.x;
            movement.velocity.x = 0.0;
        }
        if self.mask.contains(ConstraintMask::LOCK_Y) {
            movement.position.y = self.anchor.y;
            movement.velocity.y = 0.0;
        }
        if self.mask.contains(ConstraintMask::LOCK_Z) {
            movement.position.z = self.anchor.z;
            movement.velocity.z = 0.0;
        }
        if self.mask.contains(ConstraintMask::STOP) {
            movement.velocity = Vec3::ZERO;
        }
    }

    pub fn clear(&mut self) {
        self.mask = ConstraintMask::NONE;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chassis {
    pub kind: ChassisKind,
    /// Clearance kept above the ground (or water) surface.
    pub min_height: f32,
    pub stay_above_water: bool,
    pub immobile: bool,
    pub collision_radius: f32,
    pub max_speed: f32,
    pub modifiers: TweakModifiers,
}

impl Default for Chassis {
    fn default() -> Self {
        Self {
            kind: ChassisKind::Grounded,
            min_height: 0.5,
            stay_above_water: false,
            immobile: false,
            collision_radius: 0.5,
            max_speed: 4.0,
            modifiers: TweakModifiers::default(),
        }
    }
}

impl Chassis {
    pub fn is_fixed_position(&self) -> bool {
        self.kind == ChassisKind::Fixed
    }

    /// Integrates the desired velocity into a desired position for the collision pass.
    pub fn pre_collision_update(&self, movement: &mut Movement, dt: f32) {
        if self.is_fixed_position() {
            movement.velocity = Vec3::ZERO;
            return;
        }
        let max_speed = self.max_speed * self.modifiers.speed;
        let mut desired = movement.desired_velocity;
        let speed = desired.length();
        if speed > max_speed && speed > 0.0 {
            desired = desired * (max_speed / speed);
        }
        let blend = (self.modifiers.acceleration * dt * 8.0).clamp(0.0, 1.0);
        movement.velocity = movement.velocity.lerp(desired, blend);
        if self.kind == ChassisKind::Grounded {
            movement.velocity.z = 0.0;
        }
        movement.position += movement.velocity * dt;
    }

    /// Settles the actor against the surface it rides on.
    pub fn post_collision_update(&self, movement: &mut Movement, ground: f32, water: f32) {
        let surface = if self.stay_above_water {
            ground.max(water)
        } else {
            ground
        };
        let floor = surface + self.min_height;
        match self.kind {
            ChassisKind::Fixed => {}
            ChassisKind::Grounded => {
                movement.position.z = floor;
            }
            ChassisKind::Hover | ChassisKind::Flying => {
                if movement.position.z < floor {
                    movement.position.z = floor;
                    movement.velocity.z = movement.velocity.z.max(0.0);
                }
            }
        }
    }
}

/// End-of-path signal with one frame of latency before clearing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EopFlags {
    pub reached: bool,
    pub ready_to_process: bool,
}

impl EopFlags {
    pub fn advance(&mut self) {
        if self.ready_to_process {
            self.ready_to_process = false;
            self.reached = false;
        } else if self.reached {
            self.ready_to_process = true;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationFlags {
    pub brain: bool,
    pub chassis: bool,
    pub collide: bool,
}

impl RegistrationFlags {
    pub fn any(self) -> bool {
        self.brain || self.chassis || self.collide
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub visible: bool,
    pub invisible: bool,
    pub ignored: bool,
    pub camouflaged: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            visible: true,
            invisible: false,
            ignored: false,
            camouflaged: false,
        }
    }
}

impl Visibility {
    /// True when the actor should be drawn see-through regardless of occlusion.
    pub fn wants_ghost(self) -> bool {
        self.invisible || self.ignored || self.camouflaged
    }
}

#[derive(Debug)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub kind: ThingKind,
    pub state: ThingState,
    pub pending_state: Option<ThingState>,
    pub movement: Movement,
    pub chassis: Option<Chassis>,
    pub brain: Option<BrainSlot>,
    pub hit_points: i32,
    pub cost: f32,
    pub classification: Classification,
    pub creatable: CreatableLink,
    pub registration: RegistrationFlags,
    pub eop: EopFlags,
    pub held_by: Option<ActorId>,
    /// Attachment point for held actors, relative to this actor's position.
    pub holding_offset: Vec3,
    pub tweak: TweakModifiers,
    pub constraints: MovementConstraints,
    /// Authored; only eligible actors may take the first-person camera.
    pub first_person_eligible: bool,
    /// Set each tick on the actor currently driving the first-person camera.
    pub first_person_active: bool,
    pub visibility: Visibility,
    pub emitters_enabled: bool,
    pub local_scores: LocalScores,
    pub contacts: Vec<ActorId>,
    pub hidden_creatable: bool,
}

impl Actor {
    pub fn new(id: ActorId, name: impl Into<String>, kind: ThingKind, position: Vec3) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            state: ThingState::Inactive,
            pending_state: None,
            movement: Movement::at(position),
            chassis: None,
            brain: None,
            hit_points: 10,
            cost: 0.0,
            classification: Classification::default(),
            creatable: CreatableLink::Independent,
            registration: RegistrationFlags::default(),
            eop: EopFlags::default(),
            held_by: None,
            holding_offset: Vec3::new(0.0, 0.0, 1.0),
            tweak: TweakModifiers::default(),
            constraints: MovementConstraints::default(),
            first_person_eligible: false,
            first_person_active: false,
            visibility: Visibility::default(),
            emitters_enabled: true,
            local_scores: LocalScores::default(),
            contacts: Vec::new(),
            hidden_creatable: false,
        }
    }

    pub fn with_chassis(mut self, chassis: Chassis) -> Self {
        self.chassis = Some(chassis);
        self
    }

    pub fn with_brain(mut self, brain: BrainSlot) -> Self {
        self.brain = Some(brain);
        self
    }

    pub fn with_cost(mut self, cost: f32) -> Self {
        self.cost = cost;
        self
    }

    pub fn is_creatable(&self) -> bool {
        self.creatable.is_creatable()
    }

    pub fn position(&self) -> Vec3 {
        self.movement.position
    }

    pub fn world_holding_position(&self) -> Vec3 {
        self.movement.position + self.holding_offset
    }

    pub fn collision_radius(&self) -> f32 {
        self.chassis
            .as_ref()
            .map(|chassis| chassis.collision_radius)
            .unwrap_or(0.5)
    }

    pub fn activate(&mut self) {
        self.pending_state = Some(ThingState::Active);
    }

    pub fn deactivate(&mut self) {
        self.pending_state = Some(ThingState::Inactive);
    }

    pub fn pause(&mut self) {
        if self.state == ThingState::Active {
            self.pending_state = Some(ThingState::Paused);
        }
    }

    pub fn effective_state(&self) -> ThingState {
        self.pending_state.unwrap_or(self.state)
    }

    /// Inactive or dead things with nothing pending are finished and leave the content list.
    pub fn is_done(&self) -> bool {
        matches!(self.state, ThingState::Inactive | ThingState::Dead)
            && self.pending_state.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_creatable_id_is_nil_unless_linked() {
        assert!(CreatableLink::Independent.creatable_id().is_nil());
        assert_eq!(
            CreatableLink::Clone(CreatableId(7)).creatable_id(),
            CreatableId(7)
        );
        assert!(CreatableLink::Template(CreatableId(7)).is_creatable());
        assert!(!CreatableLink::Clone(CreatableId(7)).is_creatable());
    }

    #[test]
    fn eop_flags_clear_one_frame_after_ready() {
        let mut eop = EopFlags {
            reached: true,
            ready_to_process: false,
        };
        eop.advance();
        assert!(eop.reached);
        assert!(eop.ready_to_process);
        eop.advance();
        assert!(!eop.reached);
        assert!(!eop.ready_to_process);
    }

    #[test]
    fn constraints_lock_axes_and_stop_velocity() {
        let mut movement = Movement::at(Vec3::new(1.0, 2.0, 3.0));
        movement.velocity = Vec3::new(4.0, 5.0, 6.0);
        let mut constraints = MovementConstraints {
            mask: ConstraintMask::LOCK_X,
            anchor: Vec3::new(-1.0, 0.0, 0.0),
        };
        constraints.mask.insert(ConstraintMask::STOP);
        constraints.apply(&mut movement);
        assert_eq!(movement.position.x, -1.0);
        assert_eq!(movement.position.y, 2.0);
        assert_eq!(movement.velocity, Vec3::ZERO);
        constraints.clear();
        assert!(constraints.mask.is_none());
    }

    #[test]
    fn grounded_chassis_rides_surface_plus_clearance() {
        let chassis = Chassis::default();
        let mut movement = Movement::at(Vec3::new(0.0, 0.0, 9.0));
        chassis.post_collision_update(&mut movement, 2.0, 0.0);
        assert!((movement.position.z - 2.5).abs() < 0.0001);
    }

    #[test]
    fn fixed_chassis_ignores_desired_velocity() {
        let chassis = Chassis {
            kind: ChassisKind::Fixed,
            ..Chassis::default()
        };
        let mut movement = Movement::at(Vec3::ZERO);
        movement.desired_velocity = Vec3::new(3.0, 0.0, 0.0);
        chassis.pre_collision_update(&mut movement, 0.1);
        assert_eq!(movement.position, Vec3::ZERO);
    }
}
