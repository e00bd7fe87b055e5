//! Configuration management for chpsim.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`CHPSIM_DEFAULT_DELAY`, `CHPSIM_DEFAULT_ENERGY`)
//! 2. The file named by `CHPSIM_CONFIG`
//! 3. Project-local config file (`./chpsim.toml`)
//! 4. User config file (`~/.config/chpsim/config.toml`)
//! 5. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # chpsim.toml
//!
//! [chp]
//! default_delay = 10
//! default_energy = 0
//!
//! # Static costs of one process type
//! [chp.process.buffer]
//! leakage = 1.5e-6
//! area = 120
//!
//! # Per-statement costs, keyed by the assigned/communicated identifier
//! [chp.process.buffer.stmt.x]
//! D = 4
//! E = 2
//!
//! # CHP function name -> native symbol
//! [externs]
//! popcount = "chp_popcount"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Delay of a statement with no configured cost.
pub const DEFAULT_DELAY: u64 = 10;

/// chpsim configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Simulation costs.
    pub chp: ChpConfig,

    /// External function symbol mapping.
    pub externs: HashMap<String, String>,
}

/// The `[chp]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ChpConfig {
    pub default_delay: Option<u64>,
    pub default_energy: Option<u64>,
    /// Watts.
    pub default_leakage: Option<f64>,
    pub default_area: Option<u64>,
    /// Overrides per process type.
    pub process: HashMap<String, ProcessConfig>,
}

/// Costs of one process type.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ProcessConfig {
    pub leakage: Option<f64>,
    pub area: Option<u64>,
    pub stmt: HashMap<String, StmtConfig>,
}

/// Costs of statements targeting one identifier.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct StmtConfig {
    #[serde(alias = "D")]
    pub delay: Option<u64>,
    #[serde(alias = "E")]
    pub energy: Option<u64>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `$CHPSIM_CONFIG`
    /// 3. Project-local `chpsim.toml`
    /// 4. User config `~/.config/chpsim/config.toml`
    /// 5. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        if let Ok(path) = std::env::var("CHPSIM_CONFIG") {
            if let Some(explicit) = Self::load_from_file(Path::new(&path)) {
                config.merge(explicit);
            }
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Parse configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn default_delay(&self) -> u64 {
        self.chp.default_delay.unwrap_or(DEFAULT_DELAY)
    }

    pub fn default_energy(&self) -> u64 {
        self.chp.default_energy.unwrap_or(0)
    }

    /// `(delay, energy)` of a statement in process type `proc` whose target
    /// identifier is `id`.
    pub fn stmt_costs(&self, proc: &str, id: &str) -> (u64, u64) {
        let stmt = self
            .chp
            .process
            .get(proc)
            .and_then(|p| p.stmt.get(id));
        (
            stmt.and_then(|s| s.delay).unwrap_or_else(|| self.default_delay()),
            stmt.and_then(|s| s.energy).unwrap_or_else(|| self.default_energy()),
        )
    }

    /// `(leakage, area)` of process type `proc`.
    pub fn process_costs(&self, proc: &str) -> (f64, u64) {
        let p = self.chp.process.get(proc);
        (
            p.and_then(|p| p.leakage)
                .or(self.chp.default_leakage)
                .unwrap_or(0.0),
            p.and_then(|p| p.area).or(self.chp.default_area).unwrap_or(0),
        )
    }

    /// Native symbol mapped to CHP function `name`, if configured.
    pub fn extern_symbol(&self, name: &str) -> Option<&str> {
        self.externs.get(name).map(String::as_str)
    }

    /// Load user configuration from ~/.config/chpsim/config.toml
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./chpsim.toml
    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new("chpsim.toml"))
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are set in the other config.
    fn merge(&mut self, other: Self) {
        let chp = other.chp;
        if chp.default_delay.is_some() {
            self.chp.default_delay = chp.default_delay;
        }
        if chp.default_energy.is_some() {
            self.chp.default_energy = chp.default_energy;
        }
        if chp.default_leakage.is_some() {
            self.chp.default_leakage = chp.default_leakage;
        }
        if chp.default_area.is_some() {
            self.chp.default_area = chp.default_area;
        }
        for (name, p) in chp.process {
            let mine = self.chp.process.entry(name).or_default();
            if p.leakage.is_some() {
                mine.leakage = p.leakage;
            }
            if p.area.is_some() {
                mine.area = p.area;
            }
            for (id, s) in p.stmt {
                let slot = mine.stmt.entry(id).or_default();
                if s.delay.is_some() {
                    slot.delay = s.delay;
                }
                if s.energy.is_some() {
                    slot.energy = s.energy;
                }
            }
        }
        self.externs.extend(other.externs);
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(d) = env_u64("CHPSIM_DEFAULT_DELAY") {
            log::info!("Using CHPSIM_DEFAULT_DELAY from environment: {}", d);
            self.chp.default_delay = Some(d);
        }
        if let Some(e) = env_u64("CHPSIM_DEFAULT_ENERGY") {
            log::info!("Using CHPSIM_DEFAULT_ENERGY from environment: {}", e);
            self.chp.default_energy = Some(e);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("chpsim").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# chpsim configuration
# Place this file at ~/.config/chpsim/config.toml or ./chpsim.toml

[chp]
# Delay of every statement without an override
default_delay = 10
# default_energy = 0
# default_leakage = 0.0
# default_area = 0

# [chp.process.buffer]
# leakage = 1.5e-6
# area = 120

# [chp.process.buffer.stmt.x]
# D = 4
# E = 2

[externs]
# popcount = "chp_popcount"
"#
        .to_string()
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("Ignoring {}={}: {}", name, raw, e);
            None
        }
    }
}
