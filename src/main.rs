//! oremine - Recursive asset miner for game archives

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use oremine_core::{scan, FormatIdentifier, ProgressFn, ProgressSnapshot, ScanConfig, ScanResults};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Unpack {
            input,
            output,
            jobs,
            force,
            serial,
            persist_root,
            max_depth,
            fail_fast,
            json,
        } => {
            let config = ScanConfig {
                max_parallelism: jobs,
                force,
                debug_serial: serial,
                persist_root,
                max_depth,
                fail_fast,
                ..ScanConfig::default()
            };
            unpack(&input, &output, config, json)
        }

        Commands::Identify { files } => identify(&files),
    }
}

fn unpack(input: &Path, output: &Path, mut config: ScanConfig, json: bool) -> Result<()> {
    if !json {
        println!("oremine - Unpacking: {}", input.display());
        println!("Output: {}", output.display());
        println!();
    }
    info!("{:?}", config);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )?
        .progress_chars("#>-"),
    );
    if json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let pb_clone = pb.clone();
    let progress_fn: Arc<ProgressFn> = Arc::new(move |s: &ProgressSnapshot| {
        pb_clone.set_length(s.total_bytes);
        pb_clone.set_position(s.processed_bytes);
        pb_clone.set_message(format!("{}/{} files", s.processed_files, s.total_files));
    });
    config.progress = Some(progress_fn);

    let results = scan(input, output, config)?;
    pb.finish_with_message("Complete");

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_summary(&results);
    }
    Ok(())
}

fn print_summary(results: &ScanResults) {
    let d = &results.dispositions;
    let r = &results.recovery;
    println!();
    println!("Unpacking complete!");
    println!("  Files: {}/{}", results.processed_files, results.total_files);
    println!("  Streams processed: {}", results.tasks_processed);
    println!("  Written: {}", d.persisted);
    println!("  Expanded: {}", d.expanded);
    println!("  Unknown: {}", d.unknown);
    println!("  Unsupported: {}", d.unsupported);
    println!("  Failed: {}", d.failed);
    if d.depth_limited > 0 {
        println!("  Depth limited: {}", d.depth_limited);
    }
    if r.cascade_hits + r.cuts_attempted > 0 {
        println!(
            "  Recovery: {} decoded, {}/{} cuts succeeded, {} skipped",
            r.cascade_hits, r.cuts_succeeded, r.cuts_attempted, r.cuts_skipped
        );
    }
    if let Some(log) = &results.log_path {
        println!("  Log: {}", log.display());
    }
}

fn identify(files: &[PathBuf]) -> Result<()> {
    let identifier = FormatIdentifier::new();
    for path in files {
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let extension = path
            .extension()
            .map(|e| gamearc::normalize_extension(&e.to_string_lossy()))
            .unwrap_or_default();
        let format = identifier.identify(&data, &extension);
        println!("{}: {}", path.display(), format.full_description());
    }
    Ok(())
}
