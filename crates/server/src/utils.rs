//! Configuration and logging plumbing.
//!
//! There is exactly one config file, `sprinklerd.toml`, and one consumer of
//! it, so the whole search-and-merge lives here: clap handles CLI flags and
//! environment variables, the file fills in whatever they left unset, and
//! accessor methods apply the defaults.

use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};
use log::LevelFilter;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Application name; also the directory name in config search paths.
pub const APP_NAME: &str = "sprinklerd";

const CONFIG_FILE: &str = "sprinklerd.toml";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 9880;

/// Default snapshot interval for observation persistence (30 minutes)
pub const DEFAULT_PERSIST_INTERVAL: u64 = 1800;

/// Seconds since the Unix epoch, UTC.
pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "sprinklerd - Weather aggregation and watering-window service for sprinkler controllers"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $SPRINKLERD_CONFIG, ./sprinklerd.toml,
    /// $XDG_CONFIG_HOME/sprinklerd/sprinklerd.toml, /etc/sprinklerd/sprinklerd.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "SPRINKLERD_LEVEL")]
    pub level: Option<String>,

    /// Host to listen on (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, env = "SPRINKLERD_HOST")]
    #[serde(alias = "host")]
    pub domain: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SPRINKLERD_PORT")]
    pub port: Option<String>,

    /// Directory holding persisted observation snapshots
    #[arg(short = 'd', long, env = "PERSISTENCE_LOCATION")]
    #[serde(alias = "persistence_dir")]
    pub persistence_dir: Option<String>,

    /// Enable snapshot + restore of PWS observations
    #[arg(long, env = "LOCAL_PERSISTENCE")]
    pub local_persistence: Option<bool>,

    /// Seconds between observation snapshots
    #[arg(long, env = "SPRINKLERD_PERSIST_INTERVAL")]
    pub persist_interval: Option<u64>,

    /// OpenWeatherMap API key; the adapter registers only when set
    #[arg(long, env = "OWM_API_KEY")]
    pub owm_api_key: Option<String>,
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn host(&self) -> String {
        self.domain
            .clone()
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn port(&self) -> String {
        self.port
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_PORT.to_string())
    }

    pub fn persistence_dir(&self) -> String {
        self.persistence_dir
            .clone()
            .unwrap_or_else(|| "./data".to_string())
    }

    pub fn local_persistence(&self) -> bool {
        self.local_persistence.unwrap_or(false)
    }

    pub fn persist_interval(&self) -> u64 {
        self.persist_interval.unwrap_or(DEFAULT_PERSIST_INTERVAL)
    }

    pub fn owm_api_key(&self) -> Option<String> {
        self.owm_api_key.clone().filter(|k| !k.is_empty())
    }
}

/// First existing config file among the standard locations, most specific
/// first: `$SPRINKLERD_CONFIG`, the working directory, the user's config
/// home, `/etc/sprinklerd/`.
fn locate_config_file() -> Option<PathBuf> {
    let mut candidates = Vec::with_capacity(4);
    if let Ok(explicit) = env::var("SPRINKLERD_CONFIG") {
        candidates.push(PathBuf::from(explicit));
    }
    candidates.push(PathBuf::from(CONFIG_FILE));
    if let Some(config_home) = config_home() {
        candidates.push(config_home.join(APP_NAME).join(CONFIG_FILE));
    }
    candidates.push(Path::new("/etc").join(APP_NAME).join(CONFIG_FILE));

    candidates.into_iter().find(|p| p.is_file())
}

fn config_home() -> Option<PathBuf> {
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| {
            env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".config"))
        })
}

fn load_config_file(path: &Path) -> anyhow::Result<Cli> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load configuration. CLI args and environment variables (handled by clap)
/// take precedence; the config file fills the gaps. An unreadable or
/// unparseable file is ignored with a warning rather than refusing to start.
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    let path = cli_args
        .config
        .clone()
        .map(PathBuf::from)
        .or_else(locate_config_file);

    let file_config = match path {
        Some(path) => match load_config_file(&path) {
            Ok(config) => {
                log::info!("Loading config from: {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config file {}: {}", path.display(), e);
                Cli::default()
            }
        },
        None => Cli::default(),
    };

    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        domain: cli_args.domain.or(file_config.domain),
        port: cli_args.port.or(file_config.port),
        persistence_dir: cli_args.persistence_dir.or(file_config.persistence_dir),
        local_persistence: cli_args.local_persistence.or(file_config.local_persistence),
        persist_interval: cli_args.persist_interval.or(file_config.persist_interval),
        owm_api_key: cli_args.owm_api_key.or(file_config.owm_api_key),
    }
}

/// Effective log level: `--level` wins over `RUST_LOG`; anything
/// unrecognized falls back to info.
pub fn get_log_level(cli: &Cli) -> LevelFilter {
    cli.level
        .clone()
        .or_else(|| env::var("RUST_LOG").ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

pub fn setup_logger() -> Dispatch {
    let colors = ColoredLevelConfig::new()
        .trace(Color::BrightBlack)
        .debug(Color::Cyan)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {:<5} {}: {}",
                OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .unwrap_or_default(),
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .chain(std::io::stdout())
}
