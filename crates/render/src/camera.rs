use crate::error::RenderError;
use boxlight_common::CameraConfig;
use boxlight_input::{Action, KeyState};
use glam::{Mat4, Quat, Vec3};

/// Smallest angle allowed between the facing and up vectors.
const MIN_UP_ANGLE: f32 = std::f32::consts::PI / 180.0;

/// Floating-point aspect ratio of a framebuffer. A zero height is treated as 1.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    width as f32 / height.max(1) as f32
}

/// Free-fly camera driven by held actions.
///
/// Movement and rotation are fixed steps per frame. `facing` and `up` are
/// unit vectors and never parallel.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    facing: Vec3,
    up: Vec3,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
    pub rotation_step_degrees: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

impl Camera {
    /// Camera at `position` looking down -Z with +Y up.
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            position: config.position,
            facing: Vec3::NEG_Z,
            up: Vec3::Y,
            fov_degrees: config.fov_degrees,
            near: config.near,
            far: config.far,
            speed: config.speed,
            rotation_step_degrees: config.rotation_step_degrees,
        }
    }

    pub fn facing(&self) -> Vec3 {
        self.facing
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Unit vector to the camera's right.
    pub fn right(&self) -> Vec3 {
        self.facing.cross(self.up).normalize()
    }

    /// Set facing and up. Both are normalized; zero or parallel vectors are rejected.
    pub fn set_orientation(&mut self, facing: Vec3, up: Vec3) -> Result<(), RenderError> {
        let facing = facing.try_normalize().ok_or_else(|| {
            RenderError::DegenerateCamera(format!("facing {facing} has no direction"))
        })?;
        let up = up
            .try_normalize()
            .ok_or_else(|| RenderError::DegenerateCamera(format!("up {up} has no direction")))?;
        if !separated(facing, up) {
            return Err(RenderError::DegenerateCamera(format!(
                "facing {facing} is parallel to up {up}"
            )));
        }
        self.facing = facing;
        self.up = up;
        Ok(())
    }

    /// Apply one frame of held actions. All pressed actions are applied.
    pub fn apply_input(&mut self, keys: &KeyState) {
        let step = self.speed;
        if keys.is_pressed(Action::MoveDown) {
            self.position -= self.up * step;
        }
        if keys.is_pressed(Action::MoveUp) {
            self.position += self.up * step;
        }
        if keys.is_pressed(Action::MoveRight) {
            self.position += self.right() * step;
        }
        if keys.is_pressed(Action::MoveLeft) {
            self.position -= self.right() * step;
        }
        if keys.is_pressed(Action::MoveForward) {
            self.position += self.facing * step;
        }
        if keys.is_pressed(Action::MoveBackward) {
            self.position -= self.facing * step;
        }

        let angle = self.rotation_step_degrees.to_radians();
        let rotations = [
            (Action::RotateLeft, Vec3::Y),
            (Action::RotateRight, Vec3::NEG_Y),
            (Action::RotateUp, Vec3::X),
            (Action::RotateDown, Vec3::NEG_X),
        ];
        for (action, axis) in rotations {
            if keys.is_pressed(action) {
                self.rotate_facing(axis, angle);
            }
        }
    }

    /// Rotate the facing vector about a world axis, refusing steps that
    /// would bring it parallel to `up`.
    fn rotate_facing(&mut self, axis: Vec3, angle: f32) {
        let rotated = (Quat::from_axis_angle(axis, angle) * self.facing).normalize();
        if separated(rotated, self.up) {
            self.facing = rotated;
        } else {
            tracing::trace!(?axis, "rotation clamped at up vector");
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.facing, self.up)
    }

    /// `perspective(fov, aspect, near, far) * look_to(position, facing, up)`.
    pub fn compute_view_projection(&self, fov_degrees: f32, near: f32, far: f32, aspect: f32) -> Mat4 {
        let projection = Mat4::perspective_rh(fov_degrees.to_radians(), aspect, near, far);
        projection * self.view_matrix()
    }

    /// View-projection using the camera's own projection parameters.
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.compute_view_projection(self.fov_degrees, self.near, self.far, aspect)
    }
}

fn separated(facing: Vec3, up: Vec3) -> bool {
    facing.cross(up).length() >= MIN_UP_ANGLE.sin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera() {
        let cam = Camera::default();
        assert_eq!(cam.position, Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(cam.facing(), Vec3::NEG_Z);
        let vp = cam.view_projection(800.0 / 600.0);
        assert!(!vp.col(0).x.is_nan());
    }

    #[test]
    fn view_projection_is_pure() {
        let mut cam = Camera::default();
        cam.apply_input(&[Action::RotateLeft, Action::MoveForward].into_iter().collect());
        let a = cam.compute_view_projection(90.0, 0.1, 1000.0, 1.0);
        let b = cam.compute_view_projection(90.0, 0.1, 1000.0, 1.0);
        assert_eq!(a.to_cols_array().map(f32::to_bits), b.to_cols_array().map(f32::to_bits));
    }

    #[test]
    fn origin_is_in_front_of_camera() {
        let cam = Camera::new(Vec3::new(0.0, 0.0, 2.0));
        let vp = cam.compute_view_projection(90.0, 0.1, 1000.0, 1.0);
        let clip = vp * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(clip.w > 0.0);
        assert!(clip.z >= 0.0 && clip.z <= clip.w);
        assert!(clip.x.abs() < 1e-6 && clip.y.abs() < 1e-6);
    }

    #[test]
    fn point_behind_camera_has_negative_w() {
        let cam = Camera::new(Vec3::new(0.0, 0.0, 2.0));
        let vp = cam.compute_view_projection(90.0, 0.1, 1000.0, 1.0);
        let clip = vp * glam::Vec4::new(0.0, 0.0, 5.0, 1.0);
        assert!(clip.w < 0.0);
    }

    #[test]
    fn aspect_uses_float_division() {
        assert!((aspect_ratio(800, 600) - 4.0 / 3.0).abs() < 1e-6);
        assert!((aspect_ratio(600, 800) - 0.75).abs() < 1e-6);
        assert_eq!(aspect_ratio(640, 0), 640.0);
    }

    #[test]
    fn simultaneous_moves_compose() {
        let mut cam = Camera::new(Vec3::ZERO);
        let keys: KeyState = [Action::MoveForward, Action::MoveRight, Action::MoveUp]
            .into_iter()
            .collect();
        cam.apply_input(&keys);
        let expected = Vec3::new(0.01, 0.01, -0.01);
        assert!((cam.position - expected).length() < 1e-6);
    }

    #[test]
    fn opposite_moves_cancel() {
        let mut cam = Camera::new(Vec3::ONE);
        let keys: KeyState = [Action::MoveForward, Action::MoveBackward]
            .into_iter()
            .collect();
        cam.apply_input(&keys);
        assert!((cam.position - Vec3::ONE).length() < 1e-6);
    }

    #[test]
    fn rotate_left_turns_towards_negative_x() {
        let mut cam = Camera::default();
        let keys: KeyState = [Action::RotateLeft].into_iter().collect();
        cam.apply_input(&keys);
        assert!(cam.facing().x < 0.0);
        let angle = cam.facing().angle_between(Vec3::NEG_Z).to_degrees();
        assert!((angle - 0.5).abs() < 1e-3);
    }

    #[test]
    fn facing_stays_unit_under_rotation() {
        let mut cam = Camera::default();
        let sequences = [
            vec![Action::RotateUp],
            vec![Action::RotateLeft, Action::RotateDown],
            vec![Action::RotateRight, Action::RotateUp],
            vec![Action::RotateDown, Action::RotateLeft, Action::RotateRight],
        ];
        for i in 0..4000 {
            let keys: KeyState = sequences[i % sequences.len()].iter().copied().collect();
            cam.apply_input(&keys);
            assert!((cam.facing().length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn pitch_never_reaches_up_vector() {
        let mut cam = Camera::default();
        let keys: KeyState = [Action::RotateUp].into_iter().collect();
        for _ in 0..720 {
            cam.apply_input(&keys);
            assert!(cam.facing().cross(cam.up()).length() >= MIN_UP_ANGLE.sin() - 1e-6);
        }
        assert!(cam.facing().y > 0.99);
        assert!(cam.right().is_finite());
    }

    #[test]
    fn parallel_orientation_is_rejected() {
        let mut cam = Camera::default();
        let err = cam.set_orientation(Vec3::Y, Vec3::Y).unwrap_err();
        assert!(matches!(err, RenderError::DegenerateCamera(_)));
        assert!(cam.set_orientation(Vec3::ZERO, Vec3::Y).is_err());
        cam.set_orientation(Vec3::new(2.0, 0.0, 0.0), Vec3::Y).unwrap();
        assert_eq!(cam.facing(), Vec3::X);
    }
}
