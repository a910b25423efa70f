use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::math::Vec3;
use crate::sim::{
    Actor, BrainCatalog, BrainProgram, CameraSnapshot, Chassis, ChassisKind, Classification,
    CreatableLink, HeightField, LightRig, SimWorld, TeamColor, ThingKind, TweakModifiers,
};

/// Authored level: what edit mode shows and what every run starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelDef {
    pub name: String,
    pub light_rig: LightRig,
    pub limit_budget: bool,
    pub show_resource_meter: bool,
    pub show_compass: bool,
    pub starting_camera: Option<CameraSnapshot>,
    pub terrain: Option<TerrainDef>,
    pub actors: Vec<ActorDef>,
}

impl Default for LevelDef {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            light_rig: LightRig::day(),
            limit_budget: true,
            show_resource_meter: false,
            show_compass: false,
            starting_camera: None,
            terrain: None,
            actors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainDef {
    pub width: u32,
    pub height: u32,
    pub cell_size: f32,
    pub heights: Vec<f32>,
    pub water_level: Option<f32>,
}

impl TerrainDef {
    pub fn to_height_field(&self) -> Option<HeightField> {
        HeightField::new(
            self.width,
            self.height,
            self.cell_size,
            self.heights.clone(),
            self.water_level,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChassisDef {
    pub kind: ChassisKind,
    pub min_height: f32,
    pub stay_above_water: bool,
    pub immobile: bool,
    pub radius: f32,
    pub max_speed: f32,
}

impl Default for ChassisDef {
    fn default() -> Self {
        ChassisDef::from(Chassis::default())
    }
}

impl From<Chassis> for ChassisDef {
    fn from(chassis: Chassis) -> Self {
        Self {
            kind: chassis.kind,
            min_height: chassis.min_height,
            stay_above_water: chassis.stay_above_water,
            immobile: chassis.immobile,
            radius: chassis.collision_radius,
            max_speed: chassis.max_speed,
        }
    }
}

impl ChassisDef {
    pub fn to_chassis(self) -> Chassis {
        Chassis {
            kind: self.kind,
            min_height: self.min_height,
            stay_above_water: self.stay_above_water,
            immobile: self.immobile,
            collision_radius: self.radius,
            max_speed: self.max_speed,
            modifiers: TweakModifiers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainDef {
    /// Catalog name of the driver that executes the program.
    pub driver: String,
    pub program: BrainProgram,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorDef {
    pub name: String,
    pub kind: ThingKind,
    pub position: Vec3,
    pub cost: f32,
    pub hit_points: i32,
    pub color: TeamColor,
    pub creatable: CreatableLink,
    pub chassis: Option<ChassisDef>,
    pub brain: Option<BrainDef>,
    pub first_person_eligible: bool,
    pub emitters_enabled: bool,
}

impl Default for ActorDef {
    fn default() -> Self {
        Self {
            name: "thing".to_string(),
            kind: ThingKind::Bot,
            position: Vec3::ZERO,
            cost: 0.0,
            hit_points: 10,
            color: TeamColor::White,
            creatable: CreatableLink::Independent,
            chassis: None,
            brain: None,
            first_person_eligible: false,
            emitters_enabled: true,
        }
    }
}

impl ActorDef {
    fn from_actor(actor: &Actor) -> Self {
        let brain = actor.brain.as_ref().map(|slot| {
            let mut program = slot.program.clone();
            for task in &mut program.tasks {
                task.reflexes.retain(|reflex| !reflex.is_inlined_copy());
            }
            BrainDef {
                driver: slot.driver_name.clone(),
                program,
            }
        });
        Self {
            name: actor.name.clone(),
            kind: actor.kind,
            position: actor.position(),
            cost: actor.cost,
            hit_points: actor.hit_points,
            color: actor.classification.color,
            creatable: actor.creatable,
            chassis: actor.chassis.map(ChassisDef::from),
            brain,
            first_person_eligible: actor.first_person_eligible,
            emitters_enabled: actor.emitters_enabled,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LevelSpawnReport {
    pub spawned: usize,
    pub rejected: usize,
    pub missing_brains: usize,
}

impl LevelDef {
    /// Builds every authored thing into `world`. Level loads bypass the budget; the
    /// light cap still applies.
    pub fn spawn_into(&self, world: &mut SimWorld, catalog: &BrainCatalog) -> LevelSpawnReport {
        let mut report = LevelSpawnReport::default();
        for def in &self.actors {
            let mut actor = world.create_actor(&def.name, def.kind, def.position);
            actor.cost = def.cost;
            actor.hit_points = def.hit_points;
            actor.classification = Classification { color: def.color };
            actor.creatable = def.creatable;
            actor.chassis = def.chassis.map(ChassisDef::to_chassis);
            actor.first_person_eligible = def.first_person_eligible;
            actor.emitters_enabled = def.emitters_enabled;
            if let Some(brain) = &def.brain {
                match catalog.instantiate(&brain.driver, brain.program.clone()) {
                    Some(slot) => actor.brain = Some(slot),
                    None => {
                        warn!(actor = %def.name, driver = %brain.driver, "level_brain_unknown");
                        report.missing_brains += 1;
                    }
                }
            }
            match world.add_thing(actor, true) {
                Ok(_) => report.spawned += 1,
                Err(_) => report.rejected += 1,
            }
        }
        info!(
            level = %self.name,
            spawned = report.spawned,
            rejected = report.rejected,
            "level_spawned"
        );
        report
    }

    /// Snapshot of the edited world as an authored level. Runtime clones are dropped and
    /// brain programs lose their inlined reflex copies.
    pub fn capture(&self, world: &SimWorld) -> LevelDef {
        let actors = world
            .content()
            .iter()
            .filter_map(|id| world.actors.get(*id))
            .filter(|actor| !matches!(actor.creatable, CreatableLink::Clone(_)))
            .map(ActorDef::from_actor)
            .collect();
        LevelDef {
            actors,
            ..self.clone()
        }
    }

    pub fn total_cost(&self) -> f32 {
        self.actors.iter().map(|actor| actor.cost).sum()
    }
}
