use facescan_core::MissingFilePolicy;
use std::path::PathBuf;

/// Scanner configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the face data directory (default: ./face_data).
    pub data_dir: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture width; the driver may negotiate another size.
    pub camera_width: u32,
    /// Requested capture height.
    pub camera_height: u32,
    /// Directory containing the SCRFD ONNX model.
    pub model_dir: PathBuf,
    /// What cleanup does with log entries whose image is already gone.
    pub missing_file_policy: MissingFilePolicy,
}

impl Config {
    /// Load configuration from `FACESCAN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = lookup("FACESCAN_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(facescan_core::default_model_dir);

        let prune = lookup("FACESCAN_PRUNE_MISSING").is_some_and(|v| parse_flag(&v));
        let missing_file_policy = if prune {
            MissingFilePolicy::Prune
        } else {
            MissingFilePolicy::Keep
        };

        let dimension = |key: &str, default: u32| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            data_dir: lookup("FACESCAN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("face_data")),
            camera_device: lookup("FACESCAN_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            camera_width: dimension("FACESCAN_CAMERA_WIDTH", 640),
            camera_height: dimension("FACESCAN_CAMERA_HEIGHT", 480),
            model_dir,
            missing_file_policy,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(facescan_core::detector::SCRFD_MODEL_FILE)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config.data_dir, PathBuf::from("face_data"));
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!((config.camera_width, config.camera_height), (640, 480));
        assert_eq!(config.missing_file_policy, MissingFilePolicy::Keep);
    }

    #[test]
    fn test_variables_override_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("FACESCAN_DATA_DIR", "/srv/faces"),
            ("FACESCAN_CAMERA_DEVICE", "/dev/video2"),
            ("FACESCAN_CAMERA_WIDTH", "1280"),
            ("FACESCAN_CAMERA_HEIGHT", "720"),
            ("FACESCAN_MODEL_DIR", "/opt/models"),
            ("FACESCAN_PRUNE_MISSING", "yes"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/srv/faces"));
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!((config.camera_width, config.camera_height), (1280, 720));
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.missing_file_policy, MissingFilePolicy::Prune);
    }

    #[test]
    fn test_garbage_dimension_falls_back() {
        let config = Config::from_lookup(lookup_from(&[("FACESCAN_CAMERA_WIDTH", "wide")]));
        assert_eq!(config.camera_width, 640);
    }

    #[test]
    fn test_detector_model_path() {
        let mut config = Config::from_lookup(lookup_from(&[]));
        config.model_dir = PathBuf::from("/opt/models");
        assert_eq!(
            config.detector_model_path(),
            PathBuf::from("/opt/models/det_10g.onnx")
        );
    }
}
