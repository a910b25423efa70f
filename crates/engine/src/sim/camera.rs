use serde::{Deserialize, Serialize};

use crate::math::Vec3;

use super::actor::ActorId;

/// Distance in front of the camera where the edit cursor lands without a focus actor.
pub const CURSOR_PLACEMENT_DISTANCE: f32 = 13.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CameraMode {
    #[default]
    Free,
    Edit,
    FixedTarget,
    MultiTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSnapshot {
    pub from: Vec3,
    pub at: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub from: Vec3,
    pub at: Vec3,
    pub near_clip: f32,
    pub mode: CameraMode,
    /// Pixel resolution the projection was last updated for.
    pub resolution: (u32, u32),
    /// Set while a scripted move toward a saved pose is in flight.
    pub transition: Option<CameraSnapshot>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            from: Vec3::new(0.0, -20.0, 12.0),
            at: Vec3::ZERO,
            near_clip: 0.1,
            mode: CameraMode::Free,
            resolution: (1280, 720),
            transition: None,
        }
    }
}

impl Camera {
    pub fn view_dir(&self) -> Vec3 {
        (self.at - self.from).normalized_or_zero()
    }

    pub fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            from: self.from,
            at: self.at,
        }
    }

    pub fn restore(&mut self, snapshot: CameraSnapshot) {
        self.from = snapshot.from;
        self.at = snapshot.at;
        self.transition = None;
    }

    pub fn stop_transition(&mut self) {
        self.transition = None;
    }

    pub fn point_in_front(&self, distance: f32) -> Vec3 {
        self.from + self.view_dir() * distance
    }
}

/// Camera follow votes collected from brains each frame.
#[derive(Debug, Default, Clone)]
pub struct FollowLists {
    follow: Vec<ActorId>,
    never_follow: Vec<ActorId>,
    merged: Vec<ActorId>,
    first_person: Option<ActorId>,
    first_person_request: Option<ActorId>,
}

impl FollowLists {
    /// Clears per-frame votes; the merged result of the last resolve stays readable.
    pub fn reset_multi_follow(&mut self) {
        self.follow.clear();
        self.never_follow.clear();
        self.first_person_request = None;
    }

    pub fn vote_follow(&mut self, id: ActorId) {
        if !self.follow.contains(&id) {
            self.follow.push(id);
        }
    }

    pub fn vote_never_follow(&mut self, id: ActorId) {
        if !self.never_follow.contains(&id) {
            self.never_follow.push(id);
        }
    }

    pub fn request_first_person(&mut self, id: ActorId) {
        self.first_person_request = Some(id);
    }

    pub fn first_person_request(&self) -> Option<ActorId> {
        self.first_person_request
    }

    pub fn set_first_person(&mut self, id: Option<ActorId>) {
        self.first_person = id;
    }

    pub fn first_person(&self) -> Option<ActorId> {
        self.first_person
    }

    pub fn resolve(&mut self) {
        let never = &self.never_follow;
        self.merged = self
            .follow
            .iter()
            .copied()
            .filter(|id| !never.contains(id))
            .collect();
    }

    pub fn merged(&self) -> &[ActorId] {
        &self.merged
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightRig(pub String);

impl LightRig {
    pub fn day() -> Self {
        LightRig("Day".to_string())
    }
}

impl Default for LightRig {
    fn default() -> Self {
        Self::day()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorRep {
    RunSim,
    Edit,
    #[default]
    Pointy,
}

/// 3-D edit cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cursor3D {
    pub position: Vec3,
    pub active: bool,
    pub rep: CursorRep,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_follow_vetoes_follow_votes() {
        let mut lists = FollowLists::default();
        lists.vote_follow(ActorId(1));
        lists.vote_follow(ActorId(2));
        lists.vote_follow(ActorId(2));
        lists.vote_never_follow(ActorId(1));
        lists.resolve();
        assert_eq!(lists.merged(), &[ActorId(2)]);

        lists.reset_multi_follow();
        assert_eq!(lists.merged(), &[ActorId(2)]);
        lists.resolve();
        assert!(lists.merged().is_empty());
    }

    #[test]
    fn point_in_front_follows_view_direction() {
        let camera = Camera {
            from: Vec3::new(0.0, 0.0, 5.0),
            at: Vec3::new(0.0, 10.0, 5.0),
            ..Camera::default()
        };
        let point = camera.point_in_front(CURSOR_PLACEMENT_DISTANCE);
        assert!((point.y - 13.0).abs() < 0.0001);
        assert!((point.z - 5.0).abs() < 0.0001);
    }
}
