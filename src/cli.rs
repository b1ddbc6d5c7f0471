use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "beatglow", about = "Analyse a song into a per-tick frequency lighting timeline")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Config file (defaults to beatglow.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host ticks per second
    #[arg(long, default_value_t = 20)]
    pub tick_rate: u32,

    /// Intensity at or above which a channel counts as lit
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f32,

    /// Write the timeline as JSON to this path
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Print the first N ticks as lit/unlit rows
    #[arg(long)]
    pub preview: Option<usize>,
}
