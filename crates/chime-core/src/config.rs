//! Server configuration schema and loader
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/chime/config.yaml

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChimeConfig {
    /// Directory holding the sound files; every clip resolves inside it
    pub sounds_dir: PathBuf,
    /// Channel used when `play`/`loop` omit one
    pub default_channel: char,
    /// Short codes expanded to file names before resolution
    pub aliases: BTreeMap<String, String>,
    /// External player settings
    pub player: PlayerConfig,
    /// Serial line input
    pub serial: SerialConfig,
    /// Console (stdin) input
    pub console: ConsoleConfig,
    /// Spoken status announcements
    pub announce: AnnounceConfig,
    /// Best-effort system volume setup at startup
    pub volume: VolumeConfig,
}

impl Default for ChimeConfig {
    fn default() -> Self {
        Self {
            sounds_dir: PathBuf::from("sounds"),
            default_channel: 'a',
            aliases: default_aliases(),
            player: PlayerConfig::default(),
            serial: SerialConfig::default(),
            console: ConsoleConfig::default(),
            announce: AnnounceConfig::platform_default(),
            volume: VolumeConfig::default(),
        }
    }
}

/// Codes sent by the controller firmware
fn default_aliases() -> BTreeMap<String, String> {
    [
        ("0", "87045__runnerpack__weapgone.wav"),
        ("1", "345833__krzysiunet__game-over-2.wav"),
        ("2", "342756__rhodesmas__failure-01.wav"),
        ("3", "173958__fins__failure.wav"),
        ("4", "328120__kianda__powerup.wav"),
    ]
    .into_iter()
    .map(|(code, file)| (code.to_string(), file.to_string()))
    .collect()
}

/// External player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Executable invoked with the clip path as its only argument
    pub program: String,
    /// How often a running task checks whether its process has exited
    pub poll_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let program = if cfg!(target_os = "macos") {
            "/usr/bin/afplay"
        } else {
            "aplay"
        };
        Self {
            program: program.to_string(),
            poll_interval_ms: 20,
        }
    }
}

impl PlayerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Serial line configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub enabled: bool,
    /// Device path prefixes scanned under /dev, first match wins
    pub device_prefixes: Vec<String>,
    pub baud: u32,
    /// If set, lines not starting with this are dropped and the prefix is stripped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Lines starting with any of these are controller debug output
    pub ignore_prefixes: Vec<String>,
    /// Upper bound on how long a read blocks; also bounds stop latency
    pub read_timeout_ms: u64,
    /// Delay between attempts to find or reopen the device
    pub retry_interval_ms: u64,
    /// Reopen attempts after a disconnect before the server gives up
    pub reconnect_attempts: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_prefixes: vec!["/dev/tty.usbmodem".to_string(), "/dev/ttyACM".to_string()],
            baud: 115_200,
            prefix: None,
            ignore_prefixes: vec!["A0=".to_string()],
            read_timeout_ms: 100,
            retry_interval_ms: 1000,
            reconnect_attempts: 3,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Console input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Readiness poll timeout, bounds how long a stop request waits
    pub poll_interval_ms: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 100,
        }
    }
}

/// Spoken announcements configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    /// Text-to-speech program called with the message as argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl AnnounceConfig {
    /// `say` on macOS, silent elsewhere
    pub fn platform_default() -> Self {
        Self {
            command: cfg!(target_os = "macos").then(|| "say".to_string()),
        }
    }
}

/// Volume adjuster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub enabled: bool,
    /// Output volume, 0-100
    pub level: u8,
    pub program: String,
    /// Arguments, `{level}` is replaced by the configured level
    pub args: Vec<String>,
    pub retry_interval_ms: u64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(target_os = "macos"),
            level: 100,
            program: "/usr/bin/osascript".to_string(),
            args: vec![
                "-e".to_string(),
                "set volume output volume {level}".to_string(),
            ],
            retry_interval_ms: 1000,
        }
    }
}

impl VolumeConfig {
    /// Arguments with the level substituted
    pub fn expanded_args(&self) -> Vec<String> {
        let level = self.level.min(100).to_string();
        self.args.iter().map(|a| a.replace("{level}", &level)).collect()
    }
}

/// Get the default config file path
///
/// Returns: ~/.config/chime/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("chime")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> ChimeConfig {
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return ChimeConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<ChimeConfig>(&contents) {
            Ok(config) => {
                log::info!(
                    "load_config: Loaded config - sounds: {:?}, player: {}, {} alias(es)",
                    config.sounds_dir,
                    config.player.program,
                    config.aliases.len()
                );
                config
            }
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                ChimeConfig::default()
            }
        },
        Err(e) => {
            log::warn!(
                "load_config: Failed to read config file: {}, using defaults",
                e
            );
            ChimeConfig::default()
        }
    }
}

/// Save configuration to a YAML file, creating parent directories
pub fn save_config(config: &ChimeConfig, path: &Path) -> anyhow::Result<()> {
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;

    log::info!("save_config: Config saved successfully");
    Ok(())
}
