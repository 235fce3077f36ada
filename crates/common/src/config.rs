use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors from loading or validating a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Window surface settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "boxlight".into(),
            width: 800,
            height: 600,
        }
    }
}

/// Initial camera state and projection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: Vec3,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Distance moved per frame while a movement key is held.
    pub speed: f32,
    /// Rotation applied per frame while a rotation key is held.
    pub rotation_step_degrees: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 2.0),
            fov_degrees: 90.0,
            near: 0.1,
            far: 1000.0,
            speed: 0.01,
            rotation_step_degrees: 0.5,
        }
    }
}

/// Directional light: shines from `position` towards `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub position: Vec3,
    pub target: Vec3,
    pub intensity: f32,
    /// Distance the light marker moves per frame while a light key is held.
    pub step: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(-0.175, 0.675, 0.875),
            target: Vec3::new(0.25, 0.25, 0.25),
            intensity: 0.5,
            step: 0.05,
        }
    }
}

/// Vertex and fragment source files for one program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

/// Optional shader overrides. `None` selects the built-in sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub scene: Option<StagePaths>,
    pub light: Option<StagePaths>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub camera: CameraConfig,
    pub light: LightConfig,
    pub shaders: ShaderConfig,
    pub clear_color: [f32; 4],
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            camera: CameraConfig::default(),
            light: LightConfig::default(),
            shaders: ShaderConfig::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl AppConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values the renderer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.window.width == 0 || self.window.height == 0 {
            return invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            ));
        }
        let cam = &self.camera;
        let scalars = [
            ("camera.fov_degrees", cam.fov_degrees),
            ("camera.near", cam.near),
            ("camera.far", cam.far),
            ("camera.speed", cam.speed),
            ("camera.rotation_step_degrees", cam.rotation_step_degrees),
            ("light.intensity", self.light.intensity),
            ("light.step", self.light.step),
        ];
        if let Some((name, value)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return invalid(format!("{name} must be a finite number, got {value}"));
        }
        if !(cam.position.is_finite()
            && self.light.position.is_finite()
            && self.light.target.is_finite())
        {
            return invalid("camera and light positions must be finite".into());
        }
        if cam.fov_degrees <= 0.0 || cam.fov_degrees >= 180.0 {
            return invalid(format!(
                "camera.fov_degrees must be in (0, 180), got {}",
                cam.fov_degrees
            ));
        }
        if cam.near <= 0.0 {
            return invalid(format!("camera.near must be positive, got {}", cam.near));
        }
        if cam.far <= cam.near {
            return invalid(format!(
                "camera.far ({}) must be greater than camera.near ({})",
                cam.far, cam.near
            ));
        }
        if cam.speed < 0.0 || cam.rotation_step_degrees < 0.0 {
            return invalid("camera speed and rotation step must not be negative".into());
        }
        if self.light.step < 0.0 || self.light.intensity < 0.0 {
            return invalid("light step and intensity must not be negative".into());
        }
        if self.light.position == self.light.target {
            return invalid("light position and target must differ".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_demo_scene() {
        let config = AppConfig::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.camera.position, Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(config.camera.fov_degrees, 90.0);
        assert_eq!(config.light.intensity, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml("camera:\n  speed: 0.05\n").unwrap();
        assert_eq!(config.camera.speed, 0.05);
        assert_eq!(config.camera.far, 1000.0);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn shader_paths_parse() {
        let yaml = "shaders:\n  scene:\n    vertex: a.vert.wgsl\n    fragment: a.frag.wgsl\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        let scene = config.shaders.scene.unwrap();
        assert_eq!(scene.vertex, PathBuf::from("a.vert.wgsl"));
        assert!(config.shaders.light.is_none());
    }

    #[test]
    fn rejects_far_before_near() {
        let err = AppConfig::from_yaml("camera:\n  near: 5.0\n  far: 1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_nan_clip_planes() {
        let err = AppConfig::from_yaml("camera:\n  near: .nan\n").unwrap_err();
        assert!(err.to_string().contains("camera.near"));

        let err = AppConfig::from_yaml("camera:\n  far: .nan\n").unwrap_err();
        assert!(err.to_string().contains("camera.far"));

        let err = AppConfig::from_yaml("light:\n  position: [.nan, 0.0, 0.0]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_window() {
        let err = AppConfig::from_yaml("window:\n  height: 0\n").unwrap_err();
        assert!(err.to_string().contains("non-zero"));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = AppConfig::from_yaml("camera: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "window:\n  title: test\n  width: 1024").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.window.title, "test");
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn yaml_output_parses_back() {
        let config = AppConfig::default();
        let text = config.to_yaml().unwrap();
        assert_eq!(AppConfig::from_yaml(&text).unwrap(), config);
    }
}
