mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use beatglow::audio::{Band, Channel, FileSource, FrequencyTimeline, SongRef};
use beatglow::config::{self, Config};
use beatglow::playback::{PlaybackState, RayonExecutor, ServerTracker, SlotPos, SlotStore};
use cli::Cli;

const SLOT: SlotPos = SlotPos::new(0, 0, 0);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect beatglow.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("beatglow.toml");
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("beatglow").join("config.toml"))
            .filter(|path| path.exists())
    });
    let mut config = Config::default();
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            config = cfg;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }
    // Merge: CLI values win unless left at their defaults
    if cli.tick_rate != 20 {
        config.analysis.tick_rate = cli.tick_rate;
    }
    if cli.threshold == 0.5 {
        cli.threshold = config.analysis.lit_threshold;
    }
    // A one-shot run has nothing to retry, so surface failures instead of waiting them out.
    config.playback.drop_failed_songs = true;

    if !cli.input.exists() {
        bail!("Input file not found: {}", cli.input.display());
    }
    log::info!("beatglow - frequency lighting timeline");
    log::info!("Input: {}", cli.input.display());
    log::info!("Tick rate: {}/s", config.analysis.tick_rate);

    let timeline = analyse(&cli, &config)?;
    print_summary(&timeline, cli.threshold);

    if let Some(rows) = cli.preview {
        print_preview(&timeline, rows, cli.threshold);
    }

    if let Some(ref path) = cli.json {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), timeline.as_ref())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote timeline to {}", path.display());
    }

    Ok(())
}

/// Runs the file through a server tracker and waits for its timeline.
fn analyse(cli: &Cli, config: &Config) -> Result<Arc<FrequencyTimeline>> {
    let server = ServerTracker::new(
        Arc::new(SlotStore::new()),
        Arc::new(RayonExecutor),
        Arc::new(FileSource::new()),
        config,
    );
    let song = SongRef::new(cli.input.to_string_lossy());
    server.insert(SLOT, song, 0);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}% {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );
    pb.set_message("analysing");

    let timeout = Duration::from_secs(config.playback.analysis_timeout_secs);
    let deadline = Instant::now() + timeout;
    loop {
        server.wait(0, Duration::from_millis(100));
        match server.record(SLOT) {
            None => {
                pb.abandon_with_message("failed");
                bail!("Analysis of {} failed, see log for details", cli.input.display());
            }
            Some(record) if record.state() == PlaybackState::Loading => {
                pb.set_position((record.progress() * 100.0) as u64);
            }
            Some(_) => break,
        }
        if Instant::now() >= deadline {
            pb.abandon_with_message("timed out");
            bail!("Analysis did not finish within {}s", timeout.as_secs());
        }
    }
    pb.finish_with_message("done");

    server
        .timeline(SLOT)
        .context("Slot emptied after analysis finished")
}

fn print_summary(timeline: &FrequencyTimeline, threshold: f32) {
    let ticks = timeline.len() as i64;
    println!(
        "{} ticks @ {}/s ({:.1}s)",
        ticks,
        timeline.tick_rate(),
        ticks as f64 / timeline.tick_rate().max(1) as f64
    );
    println!("{:<12} {:>8} {:>8}", "band", "peak", "lit %");
    for band in Band::ALL {
        let channel = Channel::Band(band);
        let peak = (0..ticks)
            .map(|t| timeline.intensity(channel, t))
            .fold(0.0f32, f32::max);
        let lit = (0..ticks).filter(|&t| timeline.is_lit(channel, t, threshold)).count();
        let share = if ticks > 0 { lit as f64 * 100.0 / ticks as f64 } else { 0.0 };
        println!("{:<12} {:>8.3} {:>7.1}%", band.name(), peak, share);
    }
}

fn print_preview(timeline: &FrequencyTimeline, rows: usize, threshold: f32) {
    for tick in 0..rows.min(timeline.len()) as i64 {
        let row: String = Band::ALL
            .iter()
            .map(|&band| {
                if timeline.is_lit(Channel::Band(band), tick, threshold) {
                    '#'
                } else {
                    '.'
                }
            })
            .collect();
        println!("{tick:>6} {row}");
    }
}
