use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process a single session folder end to end
    Process {
        /// Session folder containing the recordings
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Process every session folder under the pipeline root
    Batch {
        /// Root directory containing session folders
        #[arg(short, long)]
        input_dir: Option<PathBuf>,
    },

    /// Re-run a stored session from its last recorded state
    Repair {
        /// Session id
        #[arg(short, long)]
        session_id: String,
    },

    /// List stored sessions and their status
    Sessions,

    /// Classify a session folder without processing it
    Classify {
        /// Session folder containing the recordings
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Transcribe one audio file and write its sidecars
    Transcribe {
        /// Audio file to upload
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Run the highlight analysis over a session folder's transcript sidecars
    Analyze {
        /// Session folder containing the recordings and their sidecars
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Cut one clip out of a master recording
    Clip {
        /// Master WAV file
        #[arg(short, long)]
        input: PathBuf,

        /// Session id used in the clip output path
        #[arg(short, long)]
        session_id: String,

        /// Clip start in seconds
        #[arg(long)]
        start: f64,

        /// Clip end in seconds
        #[arg(long)]
        end: f64,
    },

    /// Write a default config.toml to the current directory
    Init {
        /// Overwrite an existing config.toml
        #[arg(long)]
        force: bool,
    },
}
