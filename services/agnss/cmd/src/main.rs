//! AssistNow assistance delivery binary.
//!
//! Inspects and trims assistance blobs, and pushes them to a u-blox receiver
//! reached over a TCP serial bridge, either as online/offline messages, into
//! receiver flash, or by serving an ALP file to a legacy receiver.

use agnss_session::{AssistanceSource, MgaEngine};
use agnss_wire::{frames, AllowList, PosLlh, TimeAccuracy, TimeAdjust};
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bridge;
mod config;
mod logging;
mod source;

use bridge::{ensure_finished, log_progress, Bridge};
use config::AgnssConfig;
use logging::AgnssLogFormatter;
use source::FileSource;

// Component logging macros are defined in logging.rs and available via #[macro_export]

/// AssistNow assistance delivery for u-blox receivers
#[derive(Parser, Debug)]
#[command(name = "ubx-agnss", version, about = "AssistNow assistance delivery for u-blox receivers")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "agnss.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the frames of an assistance blob
    Inspect {
        /// Blob file
        blob: PathBuf,
    },

    /// Extract the part of an offline blob worth sending
    Subset {
        /// Offline blob file
        blob: PathBuf,

        /// Day to select, defaults to today (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Select almanac frames only
        #[arg(long)]
        almanac: bool,

        /// Output file
        #[arg(long)]
        out: PathBuf,
    },

    /// Deliver assistance data to the receiver
    Send {
        /// Delivery mode
        #[arg(long, value_enum, default_value_t = Mode::Online)]
        mode: Mode,

        /// Blob or ALP file; not used for `erase`
        blob: Option<PathBuf>,

        /// Receiver address, overrides the configuration
        #[arg(long)]
        addr: Option<String>,

        /// Replace the time in the leading time message with the host clock
        #[arg(long)]
        adjust_time: bool,

        /// Uncertainty of the host clock in seconds
        #[arg(long, default_value_t = 2)]
        time_accuracy: u16,

        /// Initial latitude in degrees (offline mode)
        #[arg(long, requires = "lon")]
        lat: Option<f64>,

        /// Initial longitude in degrees (offline mode)
        #[arg(long, requires = "lat")]
        lon: Option<f64>,

        /// Initial altitude in centimetres (offline mode)
        #[arg(long, default_value_t = 0)]
        alt_cm: i32,

        /// Initial position accuracy in centimetres (offline mode)
        #[arg(long, default_value_t = 300_000)]
        pos_acc_cm: u32,
    },

    /// Serve an ALP file to a legacy receiver until interrupted
    ServeAlp {
        /// ALP file; receiver updates are written back on exit
        file: PathBuf,

        /// Receiver address, overrides the configuration
        #[arg(long)]
        addr: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Online or offline MGA/AID messages as they are
    Online,
    /// Offline messages preceded by the host time
    Offline,
    /// Offline data written into receiver flash
    Flash,
    /// ALP file written into legacy receiver flash
    LegacyFlash,
    /// Erase offline data held in receiver flash
    Erase,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("ubx_agnss={}", args.log_level).parse()?)
        .add_directive(format!("agnss_session={}", args.log_level).parse()?)
        .add_directive(format!("agnss_wire={}", args.log_level).parse()?);

    let formatter = AgnssLogFormatter::new("ubx-agnss");

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .event_format(formatter)
        .init();

    info!("Starting ubx-agnss v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Inspect { blob } => inspect(&blob),
        Command::Subset {
            blob,
            date,
            almanac,
            out,
        } => subset(&blob, date, almanac, &out),
        Command::Send {
            mode,
            blob,
            addr,
            adjust_time,
            time_accuracy,
            lat,
            lon,
            alt_cm,
            pos_acc_cm,
        } => {
            let config = AgnssConfig::load_from_file(&args.config)?;
            let addr = addr.unwrap_or_else(|| config.receiver_addr.clone());
            let accuracy = TimeAccuracy::new(time_accuracy, 0);
            let position = lat.zip(lon).map(|(lat_deg, lon_deg)| PosLlh {
                lat_deg,
                lon_deg,
                alt_cm,
                acc_cm: pos_acc_cm,
            });

            let data = match (mode, blob) {
                (Mode::Erase, _) => None,
                (_, Some(path)) => Some(FileSource::new(path).fetch(&log_progress)?),
                (_, None) => return Err(anyhow!("a blob file is required for {:?} mode", mode)),
            };

            let bridge = Bridge::connect(&config, &addr).await?;
            let engine = bridge.engine();
            engine.session_start()?;
            let blob = data.as_deref().unwrap_or_default();
            match mode {
                Mode::Online => {
                    let adjust = adjust_time.then(|| TimeAdjust::Absolute {
                        utc: chrono::Utc::now().naive_utc(),
                        accuracy,
                    });
                    engine.send_online_data(blob, adjust)?
                }
                Mode::Offline => engine.send_offline_data(
                    blob,
                    chrono::Utc::now().naive_utc(),
                    accuracy,
                    position,
                )?,
                Mode::Flash => engine.send_offline_to_flash(blob)?,
                Mode::LegacyFlash => engine.send_legacy_offline_to_flash(blob)?,
                Mode::Erase => engine.erase_offline_flash()?,
            }

            let last = bridge.run(MgaEngine::session_stop).await?;
            ensure_finished(&last)?;
            info!("Delivery complete");
            Ok(())
        }
        Command::ServeAlp { file, addr } => {
            let config = AgnssConfig::load_from_file(&args.config)?;
            let addr = addr.unwrap_or_else(|| config.receiver_addr.clone());
            let alp = std::fs::read(&file)
                .with_context(|| format!("failed to read ALP file {:?}", file))?;
            let alp = Arc::new(Mutex::new(alp));

            let bridge = Bridge::connect(&config, &addr).await?;
            bridge.engine().session_start()?;
            let file_id = bridge.engine().start_legacy_aiding(Arc::clone(&alp))?;
            info!("Serving {:?} as file id {}", file, file_id);

            let last = bridge.run(MgaEngine::stop_legacy_aiding).await?;
            ensure_finished(&last)?;

            let updated = alp
                .lock()
                .map_err(|_| anyhow!("ALP buffer lock poisoned"))?
                .clone();
            std::fs::write(&file, updated)
                .with_context(|| format!("failed to write ALP file {:?}", file))?;
            info!("Saved receiver updates to {:?}", file);
            Ok(())
        }
    }
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let blob = std::fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
    let allow = AllowList::assistance();
    let mut total = 0usize;
    let mut accepted = 0usize;

    for item in frames(&blob) {
        let (offset, frame) = item?;
        total += 1;
        let allowed = frame.checksum_ok() && allow.contains(frame.msg_id());
        if allowed {
            accepted += 1;
        }
        println!(
            "{:>8} {} len={:<5} checksum={} transfer={}",
            offset,
            frame.msg_id(),
            frame.len(),
            if frame.checksum_ok() { "ok" } else { "bad" },
            if allowed { "yes" } else { "no" }
        );
    }

    info!("{} frames, {} would be transferred", total, accepted);
    Ok(())
}

fn subset(path: &Path, date: Option<NaiveDate>, almanac: bool, out: &Path) -> anyhow::Result<()> {
    let blob = std::fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
    let selected = if almanac {
        MgaEngine::select_almanac_subset(&blob)?
    } else {
        let date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
        info!("Selecting offline data for {}", date);
        MgaEngine::select_todays_offline_subset(date, &blob)?
    };
    std::fs::write(out, &selected).with_context(|| format!("failed to write {:?}", out))?;
    info!("Wrote {} of {} bytes to {:?}", selected.len(), blob.len(), out);
    Ok(())
}
