//! Command line, environment and logging setup

use crate::session::Player;
use clap::Parser;
use noirnote_core::{CaseCatalog, CaseError};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use thiserror::Error;

/// Environment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local play - file-based storage
    Local,
    /// Testing - in-memory store
    Test,
}

impl Environment {
    /// Detect environment from NOIRNOTE_ENV variable
    pub fn detect() -> Self {
        Self::from_name(std::env::var("NOIRNOTE_ENV").ok().as_deref())
    }

    fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("test") | Some("testing") => Environment::Test,
            _ => Environment::Local,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "noirnote", version)]
#[command(about = "Detective deduction puzzles in the terminal")]
pub struct Cli {
    /// Case to open (defaults to the first case in the catalog)
    #[arg(long)]
    pub case: Option<String>,

    /// Player id; required to play
    #[arg(long, env = "NOIRNOTE_PLAYER")]
    pub player: Option<String>,

    /// Display name shown on leaderboards
    #[arg(long, env = "NOIRNOTE_PLAYER_NAME")]
    pub name: Option<String>,

    /// JSON case catalog (defaults to the built-in cases)
    #[arg(long)]
    pub cases: Option<PathBuf>,

    /// Directory for saved data and the log file
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Start with the network disabled; writes are queued until re-enabled
    #[arg(long)]
    pub offline: bool,

    /// Log file (defaults to noirnote.log in the data directory)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read case catalog {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CaseError),
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolved application settings
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub case_id: Option<String>,
    pub player: Option<Player>,
    pub cases_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub offline: bool,
    pub log_file: PathBuf,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Self {
        Self::resolve(cli, Environment::detect())
    }

    fn resolve(cli: Cli, environment: Environment) -> Self {
        let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
        let log_file = cli
            .log_file
            .unwrap_or_else(|| data_dir.join("noirnote.log"));
        let player = cli
            .player
            .filter(|id| !id.trim().is_empty())
            .map(|id| Player {
                display_name: cli.name,
                ..Player::new(&id)
            });

        Self {
            environment,
            case_id: cli.case,
            player,
            cases_path: cli.cases,
            data_dir,
            offline: cli.offline,
            log_file,
        }
    }

    /// Load the case catalog from `--cases`, or the built-in cases
    pub fn load_catalog(&self) -> Result<CaseCatalog, ConfigError> {
        match &self.cases_path {
            Some(path) => {
                let json = fs::read_to_string(path).map_err(|source| ConfigError::CatalogRead {
                    path: path.clone(),
                    source,
                })?;
                Ok(CaseCatalog::from_json(&json)?)
            }
            None => Ok(CaseCatalog::builtin()),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("noirnote")
}

/// Send log output to the log file; the terminal belongs to the UI.
///
/// Filtering follows `RUST_LOG`, defaulting to `warn`.
pub fn init_logging(config: &AppConfig) -> Result<(), ConfigError> {
    let path = &config.log_file;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::LogFile {
            path: path.clone(),
            source,
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ConfigError::LogFile {
            path: path.clone(),
            source,
        })?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["noirnote"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_environment_names() {
        assert_eq!(Environment::from_name(Some("test")), Environment::Test);
        assert_eq!(Environment::from_name(Some("testing")), Environment::Test);
        assert_eq!(Environment::from_name(Some("prod")), Environment::Local);
        assert_eq!(Environment::from_name(None), Environment::Local);
    }

    #[test]
    fn test_resolve_player_and_paths() {
        let cli = parse(&[
            "--player",
            "u1",
            "--name",
            "Sam",
            "--case",
            "case-002",
            "--data-dir",
            "/tmp/nn",
            "--offline",
        ]);
        let config = AppConfig::resolve(cli, Environment::Test);

        let player = config.player.unwrap();
        assert_eq!(player.id, "u1");
        assert_eq!(player.display_name.as_deref(), Some("Sam"));
        assert_eq!(config.case_id.as_deref(), Some("case-002"));
        assert_eq!(config.log_file, PathBuf::from("/tmp/nn/noirnote.log"));
        assert!(config.offline);
    }

    #[test]
    fn test_blank_player_is_anonymous() {
        let cli = parse(&["--player", "  "]);
        assert!(AppConfig::resolve(cli, Environment::Test).player.is_none());
    }

    #[test]
    fn test_builtin_catalog_by_default() {
        let config = AppConfig::resolve(parse(&[]), Environment::Test);
        let catalog = config.load_catalog().unwrap();
        assert!(catalog.get("case-001").is_some());
    }

    #[test]
    fn test_missing_catalog_file() {
        let config = AppConfig::resolve(
            parse(&["--cases", "/nonexistent/noirnote-cases.json"]),
            Environment::Test,
        );
        assert!(matches!(
            config.load_catalog(),
            Err(ConfigError::CatalogRead { .. })
        ));
    }
}
