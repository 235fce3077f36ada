use boxlight_common::LightConfig;
use boxlight_input::{Action, KeyState};
use glam::Vec3;

/// A single directional light shining from a movable marker towards a
/// fixed target.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub position: Vec3,
    pub target: Vec3,
    pub intensity: f32,
    /// Marker movement per frame while a light key is held.
    pub step: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::from_config(&LightConfig::default())
    }
}

impl DirectionalLight {
    pub fn from_config(config: &LightConfig) -> Self {
        Self {
            position: config.position,
            target: config.target,
            intensity: config.intensity,
            step: config.step,
        }
    }

    /// Unnormalized direction from the marker to the target.
    pub fn direction(&self) -> Vec3 {
        self.target - self.position
    }

    /// Move the marker in the XY plane for each held light action.
    pub fn apply_input(&mut self, keys: &KeyState) {
        if keys.is_pressed(Action::LightUp) {
            self.position.y += self.step;
        }
        if keys.is_pressed(Action::LightLeft) {
            self.position.x -= self.step;
        }
        if keys.is_pressed(Action::LightRight) {
            self.position.x += self.step;
        }
        if keys.is_pressed(Action::LightDown) {
            self.position.y -= self.step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_direction_points_at_gray_box() {
        let light = DirectionalLight::default();
        let d = light.direction();
        assert!((d - Vec3::new(0.425, -0.425, -0.625)).length() < 1e-5);
        assert_eq!(light.intensity, 0.5);
    }

    #[test]
    fn keys_move_marker() {
        let mut light = DirectionalLight::default();
        let start = light.position;
        let keys: KeyState = [Action::LightUp, Action::LightRight].into_iter().collect();
        light.apply_input(&keys);
        assert!((light.position - (start + Vec3::new(0.05, 0.05, 0.0))).length() < 1e-6);
        assert_eq!(light.target, Vec3::new(0.25, 0.25, 0.25));
    }

    #[test]
    fn camera_keys_do_not_move_light() {
        let mut light = DirectionalLight::default();
        let start = light.clone();
        light.apply_input(&[Action::MoveForward].into_iter().collect());
        assert_eq!(light, start);
    }
}
