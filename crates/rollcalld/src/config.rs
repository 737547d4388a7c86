use rollcall_core::{EncodeOptions, DEFAULT_MATCH_THRESHOLD};
use rollcall_roster::ServiceConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Daemon configuration.
///
/// Resolved from built-in defaults, then the TOML file named by
/// `ROLLCALL_CONFIG` (if set), then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory of per-identity reference images.
    pub faces_dir: PathBuf,
    /// Path to the attendance CSV log.
    pub attendance_log: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Provider settings for enrollment and reload.
    pub enroll: EncodeOptions,
    /// Provider settings for verification.
    pub verify: EncodeOptions,
    /// Serve on the system bus instead of the session bus.
    pub system_bus: bool,
}

/// Optional config file; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub faces_dir: Option<PathBuf>,
    pub attendance_log: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub match_threshold: Option<f32>,
    pub enroll_upsample: Option<u32>,
    pub enroll_jitters: Option<u32>,
    pub verify_upsample: Option<u32>,
    pub verify_jitters: Option<u32>,
    pub system_bus: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Config {
    /// Load configuration from the optional config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var_os("ROLLCALL_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                tracing::info!(path = %path.display(), "reading config file");
                FileConfig::read(&path)?
            }
            None => FileConfig::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let env_path = |key: &str| env(key).map(PathBuf::from);

        let data_dir = env_path("ROLLCALL_DATA_DIR")
            .or(file.data_dir)
            .unwrap_or_else(|| default_data_dir(&env));

        let match_threshold = env_parse::<f32>(&env, "ROLLCALL_MATCH_THRESHOLD")
            .or(file.match_threshold)
            .filter(|t| t.is_finite() && *t > 0.0)
            .unwrap_or(DEFAULT_MATCH_THRESHOLD);

        let enroll_defaults = EncodeOptions::enrollment();
        let enroll = EncodeOptions {
            upsample_count: env_parse(&env, "ROLLCALL_ENROLL_UPSAMPLE")
                .or(file.enroll_upsample)
                .unwrap_or(enroll_defaults.upsample_count),
            jitter_count: env_parse(&env, "ROLLCALL_ENROLL_JITTERS")
                .or(file.enroll_jitters)
                .unwrap_or(enroll_defaults.jitter_count),
            ..enroll_defaults
        };

        let verify_defaults = EncodeOptions::verification();
        let verify = EncodeOptions {
            upsample_count: env_parse(&env, "ROLLCALL_VERIFY_UPSAMPLE")
                .or(file.verify_upsample)
                .unwrap_or(verify_defaults.upsample_count),
            jitter_count: env_parse(&env, "ROLLCALL_VERIFY_JITTERS")
                .or(file.verify_jitters)
                .unwrap_or(verify_defaults.jitter_count),
            ..verify_defaults
        };

        Self {
            faces_dir: env_path("ROLLCALL_FACES_DIR")
                .or(file.faces_dir)
                .unwrap_or_else(|| data_dir.join("known_faces")),
            attendance_log: env_path("ROLLCALL_ATTENDANCE_LOG")
                .or(file.attendance_log)
                .unwrap_or_else(|| data_dir.join("attendance.csv")),
            model_dir: env_path("ROLLCALL_MODEL_DIR")
                .or(file.model_dir)
                .unwrap_or_else(|| data_dir.join("models")),
            match_threshold,
            enroll,
            verify,
            system_bus: env("ROLLCALL_SYSTEM_BUS")
                .map(|v| v != "0")
                .or(file.system_bus)
                .unwrap_or(false),
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            threshold: self.match_threshold,
            enroll: self.enroll,
            verify: self.verify,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::DetectionMode;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_follow_xdg_data_home() {
        let config = Config::resolve(FileConfig::default(), env_from(&[("XDG_DATA_HOME", "/data")]));

        assert_eq!(config.faces_dir, PathBuf::from("/data/rollcall/known_faces"));
        assert_eq!(config.attendance_log, PathBuf::from("/data/rollcall/attendance.csv"));
        assert_eq!(config.model_dir, PathBuf::from("/data/rollcall/models"));
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(config.enroll, EncodeOptions::enrollment());
        assert_eq!(config.verify, EncodeOptions::verification());
        assert!(!config.system_bus);
    }

    #[test]
    fn test_defaults_fall_back_to_home() {
        let config = Config::resolve(FileConfig::default(), env_from(&[("HOME", "/home/kiosk")]));
        assert_eq!(
            config.faces_dir,
            PathBuf::from("/home/kiosk/.local/share/rollcall/known_faces")
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            data_dir = "/srv/rollcall"
            match_threshold = 0.5
            enroll_jitters = 4
            verify_upsample = 1
            system_bus = true
            "#,
        )
        .unwrap();

        let config = Config::resolve(file, env_from(&[]));
        assert_eq!(config.faces_dir, PathBuf::from("/srv/rollcall/known_faces"));
        assert_eq!(config.match_threshold, 0.5);
        assert_eq!(config.enroll.jitter_count, 4);
        assert_eq!(config.enroll.mode, DetectionMode::Accurate);
        assert_eq!(config.verify.detector_input_side(), 640);
        assert!(config.system_bus);
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            faces_dir = "/file/faces"
            match_threshold = 0.5
            "#,
        )
        .unwrap();
        let env = env_from(&[
            ("ROLLCALL_FACES_DIR", "/env/faces"),
            ("ROLLCALL_MATCH_THRESHOLD", "0.45"),
            ("ROLLCALL_SYSTEM_BUS", "1"),
        ]);

        let config = Config::resolve(file, env);
        assert_eq!(config.faces_dir, PathBuf::from("/env/faces"));
        assert_eq!(config.match_threshold, 0.45);
        assert!(config.system_bus);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let env = env_from(&[
            ("ROLLCALL_MATCH_THRESHOLD", "strict"),
            ("ROLLCALL_VERIFY_JITTERS", "-2"),
        ]);
        let config = Config::resolve(FileConfig::default(), env);
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(config.verify.jitter_count, 1);

        let negative = Config::resolve(
            FileConfig::default(),
            env_from(&[("ROLLCALL_MATCH_THRESHOLD", "-1")]),
        );
        assert_eq!(negative.match_threshold, DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn test_unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("treshold = 0.5").is_err());
    }

    #[test]
    fn test_read_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rollcall.toml");
        std::fs::write(&path, "match_threshold = \"high\"").unwrap();

        let err = FileConfig::read(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("rollcall.toml"));
    }

    #[test]
    fn test_model_paths() {
        let config = Config::resolve(FileConfig::default(), env_from(&[("ROLLCALL_MODEL_DIR", "/m")]));
        assert_eq!(config.scrfd_model_path(), "/m/det_10g.onnx");
        assert_eq!(config.arcface_model_path(), "/m/w600k_r50.onnx");
    }
}
