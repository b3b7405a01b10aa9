//! Command-line flags, the persisted config file and where files live.

use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use skyrocket_client::{
    ConnectionConfig, DEFAULT_AUTH_KEY, DEFAULT_ENDPOINT, DEFAULT_GAME_TAG,
    DEFAULT_MAX_RECONNECTS, DEFAULT_RECONNECT_DELAY,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI flags (user-provided override persisted config)
#[derive(Parser, Debug, Default)]
#[command(name = "skyrocket-terminal", about = "Skyrocket crash game in the terminal")]
pub struct Args {
    /// Server WebSocket URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Game tag to select from the server's game list
    #[arg(long)]
    pub game: Option<String>,

    /// Client key sent with authentication
    #[arg(long)]
    pub auth_key: Option<String>,

    /// Page URL to present as (Origin header and reported location)
    #[arg(long)]
    pub origin: Option<String>,

    /// Reconnect attempts before giving up
    #[arg(long)]
    pub max_reconnects: Option<u32>,

    /// Base reconnect delay; attempt n waits n times this
    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,

    /// Keep the rocket parked instead of animating it
    #[arg(long, overrides_with = "animation")]
    pub no_animation: bool,

    /// Animate the rocket again after a saved --no-animation
    #[arg(long, overrides_with = "no_animation")]
    pub animation: bool,

    /// Show raw frames in the log pane and log at debug level
    #[arg(long, overrides_with = "quiet")]
    pub verbose: bool,

    /// Turn a saved --verbose back off
    #[arg(long, overrides_with = "verbose")]
    pub quiet: bool,
}

/// Resolve an on/off flag pair over the persisted value.
fn toggle(on: bool, off: bool, saved: Option<bool>, default: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => saved.unwrap_or(default),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    pub endpoint: Option<String>,
    pub game: Option<String>,
    pub auth_key: Option<String>,
    pub origin: Option<String>,
    pub max_reconnects: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
    pub animation: Option<bool>,
    pub verbose: Option<bool>,
}

/// Flags merged over the persisted config.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub endpoint: String,
    pub game: String,
    pub auth_key: String,
    pub origin: Option<String>,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
    pub animation: bool,
    pub verbose: bool,
}

impl Settings {
    pub fn resolve(args: &Args, cfg: &PersistedConfig) -> Self {
        Self {
            endpoint: args
                .endpoint
                .clone()
                .or_else(|| cfg.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            game: args
                .game
                .clone()
                .or_else(|| cfg.game.clone())
                .unwrap_or_else(|| DEFAULT_GAME_TAG.to_string()),
            auth_key: args
                .auth_key
                .clone()
                .or_else(|| cfg.auth_key.clone())
                .unwrap_or_else(|| DEFAULT_AUTH_KEY.to_string()),
            origin: args.origin.clone().or_else(|| cfg.origin.clone()),
            max_reconnects: args
                .max_reconnects
                .or(cfg.max_reconnects)
                .unwrap_or(DEFAULT_MAX_RECONNECTS),
            reconnect_delay: args
                .reconnect_delay_ms
                .or(cfg.reconnect_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RECONNECT_DELAY),
            animation: toggle(args.animation, args.no_animation, cfg.animation, true),
            verbose: toggle(args.verbose, args.quiet, cfg.verbose, false),
        }
    }

    pub fn persisted(&self) -> PersistedConfig {
        PersistedConfig {
            endpoint: Some(self.endpoint.clone()),
            game: Some(self.game.clone()),
            auth_key: Some(self.auth_key.clone()),
            origin: self.origin.clone(),
            max_reconnects: Some(self.max_reconnects),
            reconnect_delay_ms: Some(self.reconnect_delay.as_millis() as u64),
            animation: Some(self.animation),
            verbose: Some(self.verbose),
        }
    }

    pub fn connection(&self) -> Result<ConnectionConfig> {
        let mut config = ConnectionConfig::new(&self.endpoint)
            .with_context(|| format!("invalid endpoint {}", self.endpoint))?
            .with_game_tag(self.game.clone())
            .with_auth_key(self.auth_key.clone())
            .with_max_reconnects(self.max_reconnects)
            .with_reconnect_delay(self.reconnect_delay);
        if let Some(origin) = &self.origin {
            config = config
                .with_origin(origin)
                .with_context(|| format!("invalid origin {origin}"))?;
        }
        Ok(config)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "skyrocket", "terminal")
}

pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.json"))
}

pub fn snapshot_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().join("snapshot.json"))
}

pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().join("logs"))
}

pub fn load_config() -> Option<PersistedConfig> {
    load_config_from(&config_path()?)
}

pub fn save_config(cfg: &PersistedConfig) -> Result<()> {
    if let Some(path) = config_path() {
        save_config_to(&path, cfg)?;
    }
    Ok(())
}

fn load_config_from(path: &Path) -> Option<PersistedConfig> {
    let data = std::fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

fn save_config_to(path: &Path, cfg: &PersistedConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let data = serde_json::to_vec_pretty(cfg)?;
    std::fs::write(path, data)?;
    Ok(())
}
