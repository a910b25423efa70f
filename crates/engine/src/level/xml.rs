use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use thiserror::Error;
use tracing::info;

use crate::math::Vec3;
use crate::sim::{
    Actuator, BrainProgram, CameraSnapshot, ChassisKind, CreatableId, CreatableLink, LightRig,
    Reflex, Task, TaskId, TeamColor, ThingKind,
};

use super::def::{ActorDef, BrainDef, ChassisDef, LevelDef, TerrainDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelErrorCode {
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    DuplicateElement,
    MissingAttribute,
    InvalidValue,
}

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("failed to read level {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{code:?}: {message} ({location})")]
    Parse {
        code: LevelErrorCode,
        message: String,
        location: SourceLocation,
    },
}

impl LevelError {
    pub fn code(&self) -> Option<LevelErrorCode> {
        match self {
            LevelError::Read { .. } => None,
            LevelError::Parse { code, .. } => Some(*code),
        }
    }

    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            LevelError::Read { .. } => None,
            LevelError::Parse { location, .. } => Some(*location),
        }
    }
}

pub fn load_level(path: &Path) -> Result<LevelDef, LevelError> {
    let raw = fs::read_to_string(path).map_err(|source| LevelError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let level = parse_level(&raw)?;
    info!(
        path = %path.display(),
        level = %level.name,
        actors = level.actors.len(),
        "level_loaded"
    );
    Ok(level)
}

/// Parses a `<Level>` document. Unknown elements and malformed values are errors with
/// the position of the offending node.
pub fn parse_level(raw: &str) -> Result<LevelDef, LevelError> {
    let doc = Document::parse(raw).map_err(|error| LevelError::Parse {
        code: LevelErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        location: SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        },
    })?;
    let parser = Parser { doc: &doc };
    let root = doc.root_element();
    if root.tag_name().name() != "Level" {
        return Err(parser.error(
            LevelErrorCode::InvalidRoot,
            "root element must be <Level>".to_string(),
            root,
        ));
    }
    parser.level(root)
}

struct Parser<'d, 'input> {
    doc: &'d Document<'input>,
}

impl Parser<'_, '_> {
    fn level(&self, node: Node<'_, '_>) -> Result<LevelDef, LevelError> {
        let mut level = LevelDef::default();
        if let Some(name) = node.attribute("name") {
            level.name = name.to_string();
        }
        if let Some(rig) = node.attribute("lightRig") {
            level.light_rig = LightRig(rig.to_string());
        }
        level.limit_budget = self.bool_attr(node, "limitBudget", true)?;
        level.show_resource_meter = self.bool_attr(node, "showResourceMeter", false)?;
        level.show_compass = self.bool_attr(node, "showCompass", false)?;

        for child in node.children().filter(|child| child.is_element()) {
            match child.tag_name().name() {
                "Camera" => {
                    if level.starting_camera.is_some() {
                        return Err(self.duplicate(child));
                    }
                    level.starting_camera = Some(CameraSnapshot {
                        from: self.vec3_attr(child, "from")?,
                        at: self.vec3_attr(child, "at")?,
                    });
                }
                "Terrain" => {
                    if level.terrain.is_some() {
                        return Err(self.duplicate(child));
                    }
                    level.terrain = Some(self.terrain(child)?);
                }
                "Actor" => level.actors.push(self.actor(child)?),
                other => {
                    return Err(self.error(
                        LevelErrorCode::UnknownElement,
                        format!("unknown element <{other}> in <Level>"),
                        child,
                    ))
                }
            }
        }
        Ok(level)
    }

    fn terrain(&self, node: Node<'_, '_>) -> Result<TerrainDef, LevelError> {
        let width = self.parsed_attr::<u32>(node, "width")?;
        let height = self.parsed_attr::<u32>(node, "height")?;
        let cell_size = self.optional_attr::<f32>(node, "cellSize")?.unwrap_or(1.0);
        let water_level = self.optional_attr::<f32>(node, "water")?;
        let text = node.text().unwrap_or_default();
        let heights = text
            .split_whitespace()
            .map(|token| {
                token.parse::<f32>().map_err(|_| {
                    self.error(
                        LevelErrorCode::InvalidValue,
                        format!("terrain height '{token}' is not a number"),
                        node,
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let terrain = TerrainDef {
            width,
            height,
            cell_size,
            heights,
            water_level,
        };
        if terrain.to_height_field().is_none() {
            return Err(self.error(
                LevelErrorCode::InvalidValue,
                format!(
                    "terrain needs {width}x{height} heights and a positive cell size, got {}",
                    terrain.heights.len()
                ),
                node,
            ));
        }
        Ok(terrain)
    }

    fn actor(&self, node: Node<'_, '_>) -> Result<ActorDef, LevelError> {
        let mut actor = ActorDef {
            name: self.required_attr(node, "name")?.to_string(),
            ..ActorDef::default()
        };
        if let Some(kind) = node.attribute("kind") {
            actor.kind = match kind {
                "Bot" => ThingKind::Bot,
                "Light" => ThingKind::Light,
                "Prop" => ThingKind::Prop,
                _ => return Err(self.invalid(node, "kind", kind, "Bot, Light, Prop")),
            };
        }
        if node.has_attribute("position") {
            actor.position = self.vec3_attr(node, "position")?;
        }
        actor.cost = self.optional_attr::<f32>(node, "cost")?.unwrap_or(0.0);
        if !actor.cost.is_finite() || actor.cost < 0.0 {
            return Err(self.error(
                LevelErrorCode::InvalidValue,
                "cost must be finite and >= 0".to_string(),
                node,
            ));
        }
        if let Some(hit_points) = self.optional_attr::<i32>(node, "hitPoints")? {
            actor.hit_points = hit_points;
        }
        if let Some(color) = node.attribute("color") {
            actor.color = match color {
                "White" => TeamColor::White,
                "Red" => TeamColor::Red,
                "Green" => TeamColor::Green,
                "Blue" => TeamColor::Blue,
                "Yellow" => TeamColor::Yellow,
                "Purple" => TeamColor::Purple,
                _ => {
                    return Err(self.invalid(
                        node,
                        "color",
                        color,
                        "White, Red, Green, Blue, Yellow, Purple",
                    ))
                }
            };
        }
        if let Some(creatable) = self.optional_attr::<u64>(node, "creatable")? {
            actor.creatable = CreatableLink::Template(CreatableId(creatable));
        }
        actor.first_person_eligible = self.bool_attr(node, "firstPerson", false)?;
        actor.emitters_enabled = self.bool_attr(node, "emitters", true)?;

        for child in node.children().filter(|child| child.is_element()) {
            match child.tag_name().name() {
                "Chassis" => {
                    if actor.chassis.is_some() {
                        return Err(self.duplicate(child));
                    }
                    actor.chassis = Some(self.chassis(child)?);
                }
                "Brain" => {
                    if actor.brain.is_some() {
                        return Err(self.duplicate(child));
                    }
                    actor.brain = Some(self.brain(child)?);
                }
                other => {
                    return Err(self.error(
                        LevelErrorCode::UnknownElement,
                        format!("unknown element <{other}> in <Actor>"),
                        child,
                    ))
                }
            }
        }
        Ok(actor)
    }

    fn chassis(&self, node: Node<'_, '_>) -> Result<ChassisDef, LevelError> {
        let mut chassis = ChassisDef::default();
        if let Some(kind) = node.attribute("kind") {
            chassis.kind = match kind {
                "Fixed" => ChassisKind::Fixed,
                "Grounded" => ChassisKind::Grounded,
                "Hover" => ChassisKind::Hover,
                "Flying" => ChassisKind::Flying,
                _ => return Err(self.invalid(node, "kind", kind, "Fixed, Grounded, Hover, Flying")),
            };
        }
        if let Some(min_height) = self.optional_attr::<f32>(node, "minHeight")? {
            chassis.min_height = min_height;
        }
        if let Some(radius) = self.optional_attr::<f32>(node, "radius")? {
            if radius <= 0.0 {
                return Err(self.error(
                    LevelErrorCode::InvalidValue,
                    "radius must be > 0".to_string(),
                    node,
                ));
            }
            chassis.radius = radius;
        }
        if let Some(max_speed) = self.optional_attr::<f32>(node, "maxSpeed")? {
            chassis.max_speed = max_speed;
        }
        chassis.stay_above_water = self.bool_attr(node, "stayAboveWater", false)?;
        chassis.immobile = self.bool_attr(node, "immobile", false)?;
        Ok(chassis)
    }

    fn brain(&self, node: Node<'_, '_>) -> Result<BrainDef, LevelError> {
        let driver = self.required_attr(node, "driver")?.to_string();
        let mut program = BrainProgram::default();
        for child in node.children().filter(|child| child.is_element()) {
            if child.tag_name().name() != "Task" {
                return Err(self.error(
                    LevelErrorCode::UnknownElement,
                    format!("unknown element <{}> in <Brain>", child.tag_name().name()),
                    child,
                ));
            }
            let mut task = Task::default();
            for reflex in child.children().filter(|reflex| reflex.is_element()) {
                if reflex.tag_name().name() != "Reflex" {
                    return Err(self.error(
                        LevelErrorCode::UnknownElement,
                        format!("unknown element <{}> in <Task>", reflex.tag_name().name()),
                        reflex,
                    ));
                }
                task.reflexes.push(self.reflex(reflex)?);
            }
            program.tasks.push(task);
        }
        if let Some(active) = self.optional_attr::<usize>(node, "activeTask")? {
            if active >= program.tasks.len().max(1) {
                return Err(self.error(
                    LevelErrorCode::InvalidValue,
                    format!("activeTask {active} is out of range"),
                    node,
                ));
            }
            program.active_task = active;
        }
        Ok(BrainDef { driver, program })
    }

    fn reflex(&self, node: Node<'_, '_>) -> Result<Reflex, LevelError> {
        let actuator = match (node.attribute("actuator"), node.attribute("inline")) {
            (Some(_), Some(_)) => {
                return Err(self.error(
                    LevelErrorCode::InvalidValue,
                    "a reflex takes either actuator or inline, not both".to_string(),
                    node,
                ))
            }
            (Some(name), None) => Some(Actuator::Named(name.to_string())),
            (None, Some(_)) => Some(Actuator::InlineTask(TaskId(
                self.parsed_attr::<u32>(node, "inline")?,
            ))),
            (None, None) => None,
        };
        Ok(Reflex {
            sensor: node.attribute("sensor").map(str::to_string),
            filters: list_attr(node, "filters"),
            actuator,
            selector: node.attribute("selector").map(str::to_string),
            modifiers: list_attr(node, "modifiers"),
            indentation: self.optional_attr::<u32>(node, "indent")?.unwrap_or(0),
            inline_depth: 0,
        })
    }

    fn required_attr<'n>(&self, node: Node<'n, '_>, name: &str) -> Result<&'n str, LevelError> {
        node.attribute(name).ok_or_else(|| {
            self.error(
                LevelErrorCode::MissingAttribute,
                format!(
                    "missing required attribute '{name}' on <{}>",
                    node.tag_name().name()
                ),
                node,
            )
        })
    }

    fn parsed_attr<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        name: &str,
    ) -> Result<T, LevelError> {
        let raw = self.required_attr(node, name)?;
        raw.trim()
            .parse::<T>()
            .map_err(|_| self.invalid(node, name, raw, "a number"))
    }

    fn optional_attr<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        name: &str,
    ) -> Result<Option<T>, LevelError> {
        if !node.has_attribute(name) {
            return Ok(None);
        }
        self.parsed_attr(node, name).map(Some)
    }

    fn bool_attr(&self, node: Node<'_, '_>, name: &str, default: bool) -> Result<bool, LevelError> {
        match node.attribute(name) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(self.invalid(node, name, other, "true, false")),
        }
    }

    fn vec3_attr(&self, node: Node<'_, '_>, name: &str) -> Result<Vec3, LevelError> {
        let raw = self.required_attr(node, name)?;
        let parts = raw
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>();
        match parts.as_deref() {
            Ok([x, y, z]) if x.is_finite() && y.is_finite() && z.is_finite() => {
                Ok(Vec3::new(*x, *y, *z))
            }
            _ => Err(self.invalid(node, name, raw, "three numbers 'x y z'")),
        }
    }

    fn invalid(&self, node: Node<'_, '_>, name: &str, value: &str, allowed: &str) -> LevelError {
        self.error(
            LevelErrorCode::InvalidValue,
            format!("invalid {name} '{value}'; expected {allowed}"),
            node,
        )
    }

    fn duplicate(&self, node: Node<'_, '_>) -> LevelError {
        self.error(
            LevelErrorCode::DuplicateElement,
            format!("duplicate element <{}>", node.tag_name().name()),
            node,
        )
    }

    fn error(&self, code: LevelErrorCode, message: String, node: Node<'_, '_>) -> LevelError {
        let pos = self.doc.text_pos_at(node.range().start);
        LevelError::Parse {
            code,
            message,
            location: SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            },
        }
    }
}

fn list_attr(node: Node<'_, '_>, name: &str) -> Vec<String> {
    node.attribute(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<Level name="Pond" lightRig="Dusk" showCompass="true">
  <Camera from="0 -20 12" at="0 0 0"/>
  <Terrain width="2" height="2" cellSize="4" water="0.5">0 1 1 2</Terrain>
  <Actor name="kodu" kind="Bot" position="1 2 0" cost="25" color="Red" creatable="3">
    <Chassis kind="Hover" minHeight="1.5" radius="0.75" stayAboveWater="true"/>
    <Brain driver="wander">
      <Task>
        <Reflex sensor="see" filters="apple, red" actuator="move"/>
        <Reflex inline="1" indent="1"/>
      </Task>
      <Task>
        <Reflex sensor="always" actuator="turn"/>
      </Task>
    </Brain>
  </Actor>
  <Actor name="lamp" kind="Light"/>
</Level>"#;

    #[test]
    fn parses_full_level() {
        let level = parse_level(SAMPLE).expect("valid level");
        assert_eq!(level.name, "Pond");
        assert_eq!(level.light_rig, LightRig("Dusk".to_string()));
        assert!(level.limit_budget);
        assert!(level.show_compass);
        let camera = level.starting_camera.expect("camera");
        assert!((camera.from.y + 20.0).abs() < 0.0001);

        let terrain = level.terrain.as_ref().expect("terrain");
        assert_eq!(terrain.heights, vec![0.0, 1.0, 1.0, 2.0]);
        assert_eq!(terrain.water_level, Some(0.5));

        let kodu = &level.actors[0];
        assert_eq!(kodu.color, TeamColor::Red);
        assert_eq!(kodu.creatable, CreatableLink::Template(CreatableId(3)));
        let chassis = kodu.chassis.expect("chassis");
        assert_eq!(chassis.kind, ChassisKind::Hover);
        assert!(chassis.stay_above_water);
        let brain = kodu.brain.as_ref().expect("brain");
        assert_eq!(brain.driver, "wander");
        assert_eq!(brain.program.tasks.len(), 2);
        let first = &brain.program.tasks[0].reflexes[0];
        assert_eq!(first.filters, vec!["apple".to_string(), "red".to_string()]);
        let inline = &brain.program.tasks[0].reflexes[1];
        assert_eq!(inline.inline_target(), Some(TaskId(1)));
        assert_eq!(inline.indentation, 1);

        assert_eq!(level.actors[1].kind, ThingKind::Light);
        assert!(level.actors[1].chassis.is_none());
    }

    #[test]
    fn malformed_xml_reports_location() {
        let error = parse_level("<Level>\n  <Actor name=\"a\">\n</Level>").expect_err("bad xml");
        assert_eq!(error.code(), Some(LevelErrorCode::XmlMalformed));
        assert!(error.location().expect("location").line >= 2);
    }

    #[test]
    fn wrong_root_is_rejected() {
        let error = parse_level("<Defs/>").expect_err("wrong root");
        assert_eq!(error.code(), Some(LevelErrorCode::InvalidRoot));
    }

    #[test]
    fn unknown_element_points_at_the_node() {
        let raw = "<Level>\n  <Actor name=\"a\"/>\n  <Weather/>\n</Level>";
        let error = parse_level(raw).expect_err("unknown element");
        assert_eq!(error.code(), Some(LevelErrorCode::UnknownElement));
        assert_eq!(
            error.location(),
            Some(SourceLocation { line: 3, column: 3 })
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let cases = [
            r#"<Level><Actor name="a" kind="Tree"/></Level>"#,
            r#"<Level><Actor name="a" position="1 2"/></Level>"#,
            r#"<Level><Actor name="a" cost="-1"/></Level>"#,
            r#"<Level limitBudget="yes"/>"#,
            r#"<Level><Terrain width="2" height="2">0 0 0</Terrain></Level>"#,
            r#"<Level><Actor name="a"><Brain driver="x"><Task><Reflex actuator="m" inline="0"/></Task></Brain></Actor></Level>"#,
        ];
        for raw in cases {
            let error = parse_level(raw).expect_err(raw);
            assert_eq!(error.code(), Some(LevelErrorCode::InvalidValue), "{raw}");
        }
    }

    #[test]
    fn missing_actor_name_is_reported() {
        let error = parse_level("<Level><Actor/></Level>").expect_err("missing name");
        assert_eq!(error.code(), Some(LevelErrorCode::MissingAttribute));
    }

    #[test]
    fn load_level_reads_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("pond.xml");
        fs::write(&path, SAMPLE).expect("write");
        let level = load_level(&path).expect("load");
        assert_eq!(level.actors.len(), 2);

        let missing = load_level(&dir.path().join("nope.xml")).expect_err("missing file");
        assert!(matches!(missing, LevelError::Read { .. }));
    }
}
