//! Command-line interface for oremine

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oremine")]
#[command(about = "oremine - Recursive asset miner for game archives", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Unpack every archive under INPUT into OUTPUT, recursively
    Unpack {
        /// Input file or directory
        input: PathBuf,

        /// Output directory
        output: PathBuf,

        /// Worker threads for top-level files
        #[arg(short, long, default_value = "4")]
        jobs: usize,

        /// Try decompression and signature cutting on unknown streams
        #[arg(long)]
        force: bool,

        /// Single worker, depth-first (reproducible output and logs)
        #[arg(long)]
        serial: bool,

        /// Also copy unextractable input files into the output
        #[arg(long)]
        persist_root: bool,

        /// Deepest nesting level that is still expanded
        #[arg(long, default_value = "32")]
        max_depth: u32,

        /// Abort on the first handler failure
        #[arg(long)]
        fail_fast: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Identify files without unpacking them
    Identify {
        /// Files to identify
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}
