use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_roster::AttendanceEvent;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn enroll(&self, identity: &str, image: &[u8]) -> zbus::Result<String>;
    async fn verify(&self, image: &[u8]) -> zbus::Result<String>;
    async fn reload(&self) -> zbus::Result<u32>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance CLI")]
struct Cli {
    /// Talk to rollcalld on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll (or replace) a person from a JPEG/PNG photo
    Enroll {
        /// Name to record attendance under
        identity: String,
        /// Photo containing the person's face
        image: PathBuf,
    },
    /// Identify the face in a photo and record attendance
    Verify {
        /// Photo to check
        image: PathBuf,
    },
    /// List enrolled identities
    List,
    /// Rebuild the enrollment store from the reference images on disk
    Reload,
    /// Show daemon status
    Status,
    /// Print recent attendance records
    Log {
        /// Only show the last N records
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Attendance log to read
        #[arg(long, env = "ROLLCALL_ATTENDANCE_LOG")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Enroll { identity, image } => {
            let bytes = read_image(&image)?;
            let stored = connect(cli.system).await?.enroll(&identity, &bytes).await?;
            println!("Enrolled {stored}");
        }
        Commands::Verify { image } => {
            let bytes = read_image(&image)?;
            let raw = connect(cli.system).await?.verify(&bytes).await?;
            let reply: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", describe_verification(&reply));
            if reply["identified"] != true {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::List => {
            let raw = connect(cli.system).await?.list_identities().await?;
            let identities: Vec<String> = serde_json::from_str(&raw)?;
            if identities.is_empty() {
                println!("No identities enrolled");
            }
            for identity in identities {
                println!("{identity}");
            }
        }
        Commands::Reload => {
            let loaded = connect(cli.system).await?.reload().await?;
            println!("Loaded {loaded} identities");
        }
        Commands::Status => {
            let status: serde_json::Value =
                serde_json::from_str(&connect(cli.system).await?.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Log { limit, path } => {
            // Reads the log file directly; the daemon need not be running.
            let path = match path {
                Some(path) => path,
                None => default_log_path()?,
            };
            let events = rollcall_roster::attendance::read_events(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            for event in tail(&events, limit) {
                println!("{}  {}", event.timestamp, event.identity);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn connect(system: bool) -> Result<AttendanceProxy<'static>> {
    tracing::debug!(system, "connecting to rollcalld");
    let conn = if system {
        zbus::Connection::system().await?
    } else {
        zbus::Connection::session().await?
    };
    AttendanceProxy::new(&conn)
        .await
        .context("connecting to rollcalld")
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

/// Log-related keys of the rollcalld config file; other keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct LogSettings {
    data_dir: Option<PathBuf>,
    attendance_log: Option<PathBuf>,
}

/// Resolve the attendance log with rollcalld's precedence: environment,
/// then the `ROLLCALL_CONFIG` file, then the XDG default.
fn default_log_path() -> Result<PathBuf> {
    let file = match std::env::var_os("ROLLCALL_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<LogSettings>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => LogSettings::default(),
    };
    Ok(resolve_log_path(file, |key| std::env::var(key).ok()))
}

fn resolve_log_path(file: LogSettings, env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = env("ROLLCALL_ATTENDANCE_LOG").map(PathBuf::from).or(file.attendance_log) {
        return path;
    }
    env("ROLLCALL_DATA_DIR")
        .map(PathBuf::from)
        .or(file.data_dir)
        .unwrap_or_else(|| {
            env("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                    PathBuf::from(home).join(".local/share")
                })
                .join("rollcall")
        })
        .join("attendance.csv")
}

fn tail(events: &[AttendanceEvent], limit: Option<usize>) -> &[AttendanceEvent] {
    match limit {
        Some(n) if n < events.len() => &events[events.len() - n..],
        _ => events,
    }
}

fn describe_verification(reply: &serde_json::Value) -> String {
    if reply["identified"] == true {
        let identity = reply["identity"].as_str().unwrap_or("?");
        let timestamp = reply["timestamp"].as_str().unwrap_or("?");
        match reply["distance"].as_f64() {
            Some(d) => format!("Identified {identity} at {timestamp} (distance {d:.3})"),
            None => format!("Identified {identity} at {timestamp}"),
        }
    } else if reply["reason"] == "no_face" {
        "No face detected".to_string()
    } else {
        "Unknown face".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn event(name: &str) -> AttendanceEvent {
        AttendanceEvent {
            identity: name.into(),
            timestamp: "2024-01-02 03:04:05".into(),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enroll() {
        let cli = Cli::try_parse_from(["rollcall", "enroll", "alice", "alice.jpg"]).unwrap();
        match cli.command {
            Commands::Enroll { identity, image } => {
                assert_eq!(identity, "alice");
                assert_eq!(image, PathBuf::from("alice.jpg"));
            }
            _ => panic!("expected enroll"),
        }
        assert!(!cli.system);
    }

    #[test]
    fn test_parse_global_system_flag() {
        let cli = Cli::try_parse_from(["rollcall", "verify", "probe.png", "--system"]).unwrap();
        assert!(cli.system);
    }

    #[test]
    fn test_tail_limits_to_most_recent() {
        let events = vec![event("a"), event("b"), event("c")];
        let names: Vec<_> = tail(&events, Some(2)).iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(tail(&events, Some(10)).len(), 3);
        assert_eq!(tail(&events, None).len(), 3);
        assert!(tail(&events, Some(0)).is_empty());
    }

    #[test]
    fn test_describe_verification() {
        let identified = serde_json::json!({
            "identified": true,
            "identity": "alice",
            "timestamp": "2024-01-02 03:04:05",
            "distance": 0.25,
        });
        assert_eq!(
            describe_verification(&identified),
            "Identified alice at 2024-01-02 03:04:05 (distance 0.250)"
        );

        let no_face = serde_json::json!({ "identified": false, "reason": "no_face" });
        assert_eq!(describe_verification(&no_face), "No face detected");

        let unknown = serde_json::json!({ "identified": false, "reason": "unknown", "faces": 1 });
        assert_eq!(describe_verification(&unknown), "Unknown face");
    }

    #[test]
    fn test_log_reads_recorder_output() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("attendance.csv");
        std::fs::write(&path, "Name,DateTime\nalice,2024-01-02 03:04:05\nbob,2024-01-02 03:05:00\n")
            .unwrap();

        let events = rollcall_roster::attendance::read_events(&path).unwrap();
        let last = tail(&events, Some(1));
        assert_eq!(last, &[AttendanceEvent {
            identity: "bob".into(),
            timestamp: "2024-01-02 03:05:00".into(),
        }]);
    }

    fn env_from(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let pairs = pairs.to_vec();
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_log_path_follows_config_file() {
        let file: LogSettings = toml::from_str(
            r#"
            attendance_log = "/srv/rollcall/log.csv"
            match_threshold = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(
            resolve_log_path(file, env_from(&[("ROLLCALL_DATA_DIR", "/env")])),
            PathBuf::from("/srv/rollcall/log.csv")
        );

        let file: LogSettings = toml::from_str(r#"data_dir = "/srv/rollcall""#).unwrap();
        assert_eq!(
            resolve_log_path(file, env_from(&[("XDG_DATA_HOME", "/xdg")])),
            PathBuf::from("/srv/rollcall/attendance.csv")
        );
    }

    #[test]
    fn test_log_path_env_overrides_config_file() {
        let file: LogSettings = toml::from_str(
            r#"
            data_dir = "/file"
            attendance_log = "/file/log.csv"
            "#,
        )
        .unwrap();
        let env = env_from(&[("ROLLCALL_ATTENDANCE_LOG", "/env/log.csv")]);
        assert_eq!(resolve_log_path(file, env), PathBuf::from("/env/log.csv"));

        let file: LogSettings = toml::from_str(r#"data_dir = "/file""#).unwrap();
        let env = env_from(&[("ROLLCALL_DATA_DIR", "/env")]);
        assert_eq!(resolve_log_path(file, env), PathBuf::from("/env/attendance.csv"));
    }

    #[test]
    fn test_log_path_defaults_to_xdg_data_home() {
        let env = env_from(&[("XDG_DATA_HOME", "/xdg"), ("HOME", "/home/kiosk")]);
        assert_eq!(
            resolve_log_path(LogSettings::default(), env),
            PathBuf::from("/xdg/rollcall/attendance.csv")
        );
        assert_eq!(
            resolve_log_path(LogSettings::default(), env_from(&[("HOME", "/home/kiosk")])),
            PathBuf::from("/home/kiosk/.local/share/rollcall/attendance.csv")
        );
    }
}
