use clap::Parser;
use std::path::PathBuf;

/// Watches a live video source for faces and forwards unidentified ones
/// to an external identification service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the settings file
    #[arg(short, long, env = "FACEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enumerator of the local video device to open
    #[arg(short, long)]
    pub device: Option<u32>,

    /// Location of the video stream to process
    #[arg(short, long)]
    pub stream: Option<String>,

    /// Location of the face identification resource
    #[arg(short = 'a', long = "api-url")]
    pub api_url: Option<String>,

    /// Enable visualization snapshots
    #[arg(short, long)]
    pub visualization: bool,

    /// Dump all messages into this log file
    #[arg(short, long)]
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
