use std::error::Error;
use std::path::PathBuf;
use std::sync::mpsc;

use clap::Parser;

use stereocam::auto_exposure::AutoExposure;
use stereocam::calibration::{CalibrationCurveBuilder, CalibrationOptions};
use stereocam::camera::{
    DeinterleavePattern, DeviceSession, ExposureControl, FrameGrabber, Resolution,
    V4lExposureControl,
};
use stereocam::cli::{self, Args, Command};
use stereocam::config::Config;
use stereocam::run_loop::{self, RunOptions};
use stereocam::sink::{LogFeedbackSink, SettingsUpdate, StatsSink};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match Config::load(args.config.as_deref()) {
        Ok(mut config) => {
            cli::apply_overrides(&mut config, &args);
            config
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match &args.command {
        Some(Command::ListDevices) => {
            cli::list_devices();
            Ok(())
        }
        Some(Command::ListControls) => {
            cli::list_controls(&config);
            Ok(())
        }
        Some(Command::Config { action }) => {
            cli::handle_config_action(action.clone(), &config);
            Ok(())
        }
        Some(Command::Calibrate { output }) => run_calibration(&config, output.clone()),
        None => run_capture(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn open_session(config: &Config) -> Result<(DeviceSession, DeinterleavePattern), Box<dyn Error>> {
    let pattern = DeinterleavePattern::from_name(&config.device.interleave).ok_or_else(|| {
        format!(
            "unknown interleave pattern '{}' (use pixel, pixel-right, row, or row-right)",
            config.device.interleave
        )
    })?;

    let resolution = Resolution {
        width: config.device.width,
        height: config.device.height,
    };
    let mut session = DeviceSession::open(&config.device.path)?;
    session.negotiate_format(resolution)?;
    Ok((session, pattern))
}

/// Runtime capture mode: grab, publish, adapt until interrupted.
fn run_capture(config: &Config) -> Result<(), Box<dyn Error>> {
    let (session, pattern) = open_session(config)?;

    let mut control = V4lExposureControl::new(session.device());
    control.set_gain_level(config.exposure.gain_level);
    control.set_exposure(config.exposure.initial);

    let mut grabber = FrameGrabber::new(&session, pattern, config.device.grab_timeout_ms)?;

    let mut state = AutoExposure {
        enabled: config.exposure.auto,
        exposure: config.exposure.initial,
        gain_level: config.exposure.gain_level,
        target: config.exposure.target,
        loop_gain: config.exposure.loop_gain,
        interval: config.exposure.interval,
        feedback_enabled: config.exposure.feedback,
    };

    let mut frames = StatsSink::new(&config.device.frame_id);
    let mut feedback = LogFeedbackSink;

    // External transports (parameter servers, RPC) publish overrides into
    // this channel; nothing feeds it in the standalone binary.
    let (_settings_tx, settings_rx) = mpsc::channel::<SettingsUpdate>();

    let shutdown = run_loop::shutdown_flag()?;
    log::info!(
        "capturing from {} at {}x{}, auto exposure {}",
        session.path(),
        config.device.width,
        config.device.height,
        if state.enabled { "on" } else { "off" }
    );

    run_loop::run(
        &mut grabber,
        &mut control,
        &mut state,
        &mut frames,
        &mut feedback,
        &settings_rx,
        &shutdown,
        RunOptions::default(),
    )?;
    Ok(())
}

/// Offline calibration mode; never runs alongside the capture loop.
fn run_calibration(config: &Config, output: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let (session, pattern) = open_session(config)?;

    let mut control = V4lExposureControl::new(session.device());
    control.set_gain_level(config.exposure.gain_level);

    let mut grabber = FrameGrabber::new(&session, pattern, config.device.grab_timeout_ms)?;

    let options = CalibrationOptions {
        min_gray: config.calibration.min_gray,
        walkthrough_settle: config.calibration.walkthrough_settle,
        gap_fill_settle: config.calibration.gap_fill_settle,
    };
    let builder = CalibrationCurveBuilder::new(options)?;
    let table = builder.build(&mut control, &mut grabber)?;

    let path = output.unwrap_or_else(|| PathBuf::from(&config.calibration.output));
    table.save(&path)?;
    println!(
        "Calibration table with {} entries written to {}",
        table.set_count(),
        path.display()
    );
    Ok(())
}
