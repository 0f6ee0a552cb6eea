//! Command-line interface definitions and helpers.
//!
//! This module contains CLI argument parsing and the handlers for the
//! informational subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::camera;
use crate::config::{default_path as get_config_path, Config};

/// Stereo camera driver with adaptive exposure control
#[derive(Parser, Debug)]
#[command(name = "stereocam")]
#[command(version, about = "Dual-sensor stereo camera capture and exposure calibration", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Video device node
    #[arg(long, short)]
    pub device: Option<String>,

    /// Label stamped on published frames
    #[arg(long)]
    pub frame_id: Option<String>,

    /// Initial exposure value
    #[arg(long, short)]
    pub exposure: Option<i64>,

    /// Initial gain level (1-7)
    #[arg(long, short)]
    pub gain_level: Option<u8>,

    /// Disable the adaptive exposure loop
    #[arg(long)]
    pub no_auto: bool,

    /// Proportional gain coefficient
    #[arg(long)]
    pub loop_gain: Option<f64>,

    /// Target mean brightness (0-255)
    #[arg(long, short)]
    pub target: Option<f64>,

    /// Emit feedback snapshots on the reporting channel
    #[arg(long)]
    pub feedback: bool,

    /// Deinterleave pattern: pixel, pixel-right, row, row-right
    #[arg(long)]
    pub interleave: Option<String>,

    /// Config file path
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a brightness-to-exposure calibration table
    Calibrate {
        /// Table output path
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List available video devices
    ListDevices,
    /// List the device's control descriptions
    ListControls,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

/// Overlay CLI flags onto a loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(device) = &args.device {
        config.device.path = device.clone();
    }
    if let Some(frame_id) = &args.frame_id {
        config.device.frame_id = frame_id.clone();
    }
    if let Some(interleave) = &args.interleave {
        config.device.interleave = interleave.clone();
    }
    if let Some(exposure) = args.exposure {
        config.exposure.initial = exposure;
    }
    if let Some(gain_level) = args.gain_level {
        config.exposure.gain_level = gain_level;
    }
    if args.no_auto {
        config.exposure.auto = false;
    }
    if let Some(loop_gain) = args.loop_gain {
        config.exposure.loop_gain = loop_gain;
    }
    if let Some(target) = args.target {
        config.exposure.target = target;
    }
    if args.feedback {
        config.exposure.feedback = true;
    }
}

// ==================== Subcommand Handlers ====================

/// List available video devices and print them to stdout.
pub fn list_devices() {
    let devices = camera::list_devices();
    if devices.is_empty() {
        println!("No video devices found.");
        println!();
        println!("Make sure the camera is connected and you have permission");
        println!("to access /dev/video* nodes (usually the 'video' group).");
    } else {
        println!("Available devices:");
        for device in devices {
            println!("  {}", device);
        }
        println!();
        println!("Use --device <path> to select one.");
    }
}

/// Print the control descriptions of the configured device.
pub fn list_controls(config: &Config) {
    let session = match camera::DeviceSession::open(&config.device.path) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = camera::list_controls(session.device()) {
        eprintln!("Error: failed to query controls: {}", e);
        std::process::exit(1);
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, config: &Config) {
    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            println!("  Device: {}", config.device.path);
            println!("  Frame id: {}", config.device.frame_id);
            println!(
                "  Resolution: {}x{}",
                config.device.width, config.device.height
            );
            println!("  Interleave: {}", config.device.interleave);
            println!("  Grab timeout: {} ms", config.device.grab_timeout_ms);
            println!("  Exposure: {}", config.exposure.initial);
            println!("  Gain level: {}", config.exposure.gain_level);
            println!(
                "  Auto exposure: {}",
                if config.exposure.auto { "on" } else { "off" }
            );
            println!("  Target brightness: {}", config.exposure.target);
            println!("  Loop gain: {}", config.exposure.loop_gain);
            println!();

            let config_path = get_config_path();
            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => {
            let config_path = get_config_path();

            if config_path.exists() {
                eprintln!("Config file already exists: {}", config_path.display());
                eprintln!("Use 'stereocam config show' to view current settings.");
                std::process::exit(1);
            }

            if let Some(parent) = config_path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("Error creating config directory: {}", e);
                    std::process::exit(1);
                }
            }

            let default_config = r#"# stereocam configuration

[device]
# Video device node
path = "/dev/video0"
# Label stamped on published frames
frame_id = "stereo_camera"
# Per-sensor capture size
width = 752
height = 480
# Sensor payload packing: pixel, pixel-right, row, row-right
interleave = "pixel"
# Bound on the blocking wait for a frame
grab_timeout_ms = 2000

[exposure]
# Initial exposure value
initial = 1000
# Initial gain level (1-7)
gain_level = 1
# Run the adaptive exposure loop
auto = true
# Proportional gain coefficient
loop_gain = 1.0
# Target mean brightness (0-255)
target = 128.0
# Evaluate on every Nth frame
interval = 5
# Emit feedback snapshots on the reporting channel
feedback = false

[calibration]
# Calibrated gray range lower bound (upper bound mirrors it)
min_gray = 20
# Settle frames per measurement
walkthrough_settle = 5
gap_fill_settle = 8
# Table output path
output = "calibration.toml"
"#;

            if let Err(e) = std::fs::write(&config_path, default_config) {
                eprintln!("Error writing config file: {}", e);
                std::process::exit(1);
            }

            println!("Created config file: {}", config_path.display());
        }
    }
}
