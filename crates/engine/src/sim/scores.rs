use std::collections::BTreeMap;

use super::actor::TeamColor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub value: i32,
    /// Value at the last freshen; the difference is this frame's delta.
    pub baseline: i32,
}

impl Score {
    pub fn add(&mut self, delta: i32) {
        self.value = self.value.saturating_add(delta);
    }

    pub fn frame_delta(&self) -> i32 {
        self.value.saturating_sub(self.baseline)
    }

    pub fn freshen(&mut self) {
        self.baseline = self.value;
    }
}

/// Global team scores shown on the scoreboard overlay.
#[derive(Debug, Default)]
pub struct Scoreboard {
    scores: BTreeMap<TeamColorKey, Score>,
    visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TeamColorKey(u8);

impl From<TeamColor> for TeamColorKey {
    fn from(color: TeamColor) -> Self {
        TeamColorKey(color as u8)
    }
}

impl Scoreboard {
    pub fn add(&mut self, color: TeamColor, delta: i32) {
        self.scores.entry(color.into()).or_default().add(delta);
        self.visible = true;
    }

    pub fn get(&self, color: TeamColor) -> Score {
        self.scores
            .get(&TeamColorKey::from(color))
            .copied()
            .unwrap_or_default()
    }

    pub fn freshen(&mut self) {
        for score in self.scores.values_mut() {
            score.freshen();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn reset(&mut self) {
        self.scores.clear();
        self.visible = false;
    }

    pub fn lines(&self) -> Vec<(u8, i32)> {
        self.scores
            .iter()
            .map(|(key, score)| (key.0, score.value))
            .collect()
    }
}

/// Per-actor private scores ("local" variables in authored programs).
#[derive(Debug, Clone, Default)]
pub struct LocalScores {
    slots: BTreeMap<char, Score>,
}

impl LocalScores {
    pub fn add(&mut self, slot: char, delta: i32) {
        self.slots.entry(slot).or_default().add(delta);
    }

    pub fn get(&self, slot: char) -> Score {
        self.slots.get(&slot).copied().unwrap_or_default()
    }

    pub fn freshen(&mut self) {
        for score in self.slots.values_mut() {
            score.freshen();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshen_resets_frame_delta_without_losing_value() {
        let mut board = Scoreboard::default();
        board.add(TeamColor::Red, 3);
        assert_eq!(board.get(TeamColor::Red).frame_delta(), 3);
        board.freshen();
        let score = board.get(TeamColor::Red);
        assert_eq!(score.value, 3);
        assert_eq!(score.frame_delta(), 0);
    }

    #[test]
    fn local_scores_are_independent_per_slot() {
        let mut locals = LocalScores::default();
        locals.add('a', 2);
        locals.add('b', -1);
        locals.freshen();
        locals.add('a', 1);
        assert_eq!(locals.get('a').value, 3);
        assert_eq!(locals.get('a').frame_delta(), 1);
        assert_eq!(locals.get('b').frame_delta(), 0);
    }
}
