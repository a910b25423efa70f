mod def;
mod xml;

pub use def::{ActorDef, BrainDef, ChassisDef, LevelDef, LevelSpawnReport, TerrainDef};
pub use xml::{load_level, parse_level, LevelError, LevelErrorCode, SourceLocation};
