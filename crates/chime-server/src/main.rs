//! chimed - sound server
//!
//! Plays sound clips on independent channels in response to text commands
//! from a USB serial controller and from the console:
//!
//! ```text
//! play <file> [channel]   play once, preempting the channel
//! loop <file> [channel]   play repeatedly until stopped
//! stop <channel>          stop the current clip, queued clips continue
//! silence [channel]       stop and drop everything on one or all channels
//! exit                    shut down
//! ```
//!
//! Set RUST_LOG=debug for verbose output.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use chime_core::config::{self, ChimeConfig};
use chime_core::input::ConsoleSource;
use chime_core::{Announcer, ChannelId, CommandLauncher, Dispatcher, Player, SoundLibrary, VolumeAdjuster};

/// Command-line arguments for chimed
#[derive(Parser, Debug)]
#[command(name = "chimed")]
#[command(about = "Multi-channel sound clip server")]
#[command(version)]
struct Args {
    /// Config file (default: ~/.config/chime/config.yaml)
    #[arg(short, long, env = "CHIME_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the sound files
    #[arg(short, long, env = "CHIME_SOUNDS_DIR")]
    sounds_dir: Option<PathBuf>,

    /// Player program invoked as `<player> <file>`
    #[arg(short, long, env = "CHIME_PLAYER")]
    player: Option<String>,

    /// Don't read commands from the serial device
    #[arg(long)]
    no_serial: bool,

    /// Don't read commands from standard input
    #[arg(long)]
    no_console: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

impl Args {
    /// Command-line values take precedence over the config file
    fn apply(&self, config: &mut ChimeConfig) {
        if let Some(dir) = &self.sounds_dir {
            config.sounds_dir = dir.clone();
        }
        if let Some(player) = &self.player {
            config.player.program = player.clone();
        }
        if self.no_serial {
            config.serial.enabled = false;
        }
        if self.no_console {
            config.console.enabled = false;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = config::load_config(&config_path);
    args.apply(&mut config);

    if args.write_default_config {
        config::save_config(&config, &config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    log::info!("chimed starting up");
    log::info!("Sounds directory: {}", config.sounds_dir.display());
    log::info!("Player: {}", config.player.program);

    let mut volume = if config.volume.enabled {
        Some(VolumeAdjuster::spawn(config.volume.clone()).context("Failed to start volume adjuster")?)
    } else {
        None
    };

    let announcer = Announcer::new(config.announce.command.clone());
    let mut dispatcher = build_dispatcher(&config, &announcer)?;

    announcer.say("sound server started");
    let outcome = dispatcher.run();

    if let Some(volume) = volume.as_mut() {
        volume.stop();
    }

    outcome.context("Sound server stopped abnormally")?;
    log::info!("chimed exited cleanly");
    Ok(())
}

fn build_dispatcher(config: &ChimeConfig, announcer: &Announcer) -> Result<Dispatcher> {
    let library = SoundLibrary::new(&config.sounds_dir, config.aliases.clone());
    if !library.sounds_dir().is_dir() {
        log::warn!(
            "Sounds directory {} does not exist, every play will fail",
            library.sounds_dir().display()
        );
    }

    let launcher = CommandLauncher::new(config.player.program.clone());
    let player = Player::new(Arc::new(launcher), config.player.poll_interval());
    let mut dispatcher = Dispatcher::new(library, player, ChannelId::new(config.default_channel));

    if config.serial.enabled {
        spawn_serial(&mut dispatcher, config, announcer)?;
    }

    if config.console.enabled {
        let console = ConsoleSource::new(Duration::from_millis(config.console.poll_interval_ms));
        dispatcher
            .spawn_input(Box::new(console))
            .context("Failed to start console input")?;
    }

    Ok(dispatcher)
}

#[cfg(unix)]
fn spawn_serial(dispatcher: &mut Dispatcher, config: &ChimeConfig, announcer: &Announcer) -> Result<()> {
    let serial = chime_core::input::SerialSource::new(config.serial.clone(), announcer.clone());
    dispatcher
        .spawn_input(Box::new(serial))
        .context("Failed to start serial input")
}

#[cfg(not(unix))]
fn spawn_serial(_dispatcher: &mut Dispatcher, _config: &ChimeConfig, _announcer: &Announcer) -> Result<()> {
    log::warn!("Serial input is only supported on Unix, skipping");
    Ok(())
}
