/// Written to `levels/demo.xml` the first time the sandbox starts without a level.
pub(crate) const DEMO_LEVEL_XML: &str = r#"<Level name="Demo Pond" lightRig="Day"
       showResourceMeter="true" showCompass="true">
  <Camera from="0 -30 18" at="0 0 0"/>
  <Terrain width="5" height="5" cellSize="10" water="-2">
    0 0 0 0 0
    0 1 1 1 0
    0 1 2 1 0
    0 1 1 1 0
    0 0 0 0 0
  </Terrain>
  <Actor name="red kodu" kind="Bot" position="-8 -4 0" cost="25" color="Red" firstPerson="true">
    <Chassis kind="Hover" minHeight="1" radius="1" stayAboveWater="true"/>
    <Brain driver="wander">
      <Task>
        <Reflex sensor="bump" filters="bot" actuator="score" modifiers="red"/>
        <Reflex sensor="always" actuator="wander"/>
      </Task>
    </Brain>
  </Actor>
  <Actor name="blue kodu" kind="Bot" position="8 4 0" cost="25" color="Blue">
    <Chassis kind="Hover" minHeight="1" radius="1" stayAboveWater="true"/>
    <Brain driver="wander">
      <Task>
        <Reflex sensor="bump" filters="bot" actuator="score" modifiers="blue"/>
        <Reflex sensor="always" actuator="wander"/>
      </Task>
    </Brain>
  </Actor>
  <Actor name="rover" kind="Bot" position="0 -12 0" cost="30" color="Green">
    <Chassis kind="Grounded" radius="1.2" maxSpeed="4"/>
    <Brain driver="patrol">
      <Task>
        <Reflex sensor="always" actuator="follow path"/>
        <Reflex sensor="end of path" inline="1" indent="1"/>
      </Task>
      <Task>
        <Reflex sensor="always" actuator="say" modifiers="corner"/>
      </Task>
    </Brain>
  </Actor>
  <Actor name="lamp" kind="Light" position="0 0 6" cost="5"/>
  <Actor name="rock" kind="Prop" position="-12 10 0" cost="10">
    <Chassis kind="Fixed" radius="2"/>
  </Actor>
  <Actor name="apple" kind="Prop" position="12 -10 0" cost="5" color="Red" creatable="1">
    <Chassis kind="Grounded" radius="0.5"/>
  </Actor>
</Level>
"#;

#[cfg(test)]
mod tests {
    use sandbox_engine::level::parse_level;
    use sandbox_engine::sim::{ThingKind, TOTAL_BUDGET};

    use super::*;
    use crate::app::brains::{demo_catalog, PATROL, WANDER};

    #[test]
    fn demo_level_parses_and_fits_the_budget() {
        let level = parse_level(DEMO_LEVEL_XML).expect("demo level parses");
        assert_eq!(level.name, "Demo Pond");
        assert_eq!(level.actors.len(), 6);
        assert!(level.total_cost() <= TOTAL_BUDGET);
        assert_eq!(
            level
                .actors
                .iter()
                .filter(|actor| actor.kind == ThingKind::Light)
                .count(),
            1
        );
    }

    #[test]
    fn every_demo_brain_is_in_the_catalog() {
        let level = parse_level(DEMO_LEVEL_XML).expect("demo level parses");
        let catalog = demo_catalog();
        let drivers: Vec<&str> = level
            .actors
            .iter()
            .filter_map(|actor| actor.brain.as_ref())
            .map(|brain| brain.driver.as_str())
            .collect();
        assert!(drivers.contains(&WANDER));
        assert!(drivers.contains(&PATROL));
        assert!(drivers.iter().all(|driver| catalog.contains(driver)));
    }
}
