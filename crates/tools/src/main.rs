use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use foundation::feature::Feature;
use layers::query::QueryOptions;
use layers::scene::{cluster_filter, earthquake_scene};
use overlay::{CategoryCounts, ClusterGlyph};
use tools::{AppConfig, replay_frames};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quakemap", about = "Earthquake cluster map scene and overlay tooling")]
struct Cli {
    /// JSON config file; every field is optional.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the scene description handed to the map engine.
    Scene,
    /// Render one cluster glyph as SVG.
    Glyph {
        /// Per-category counts in magnitude order, e.g. `1,2,3,4,5`.
        #[arg(long, value_delimiter = ',', required = true)]
        counts: Vec<u64>,
    },
    /// Replay recorded frames through the cluster overlay reconciler.
    Replay {
        /// JSON array of frames, each an array of GeoJSON features.
        frames: PathBuf,
        /// Query filter expression; defaults to cluster features only.
        #[arg(long)]
        filter: Option<String>,
        /// Reject a malformed filter instead of ignoring it.
        #[arg(long)]
        strict: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let cli = Cli::parse();
    let config = AppConfig::resolve(cli.config.as_deref()).map_err(|e| e.to_string())?;
    debug!(style = %config.style_url, source = %config.source.id, "config resolved");

    match cli.command {
        Command::Scene => cmd_scene(&config),
        Command::Glyph { counts } => cmd_glyph(&config, counts),
        Command::Replay {
            frames,
            filter,
            strict,
        } => cmd_replay(&config, frames, filter, strict),
    }
}

fn cmd_scene(config: &AppConfig) -> Result<(), String> {
    let scene = earthquake_scene(&config.scene_settings());
    let mut json = scene.to_json();
    json["zoom"] = serde_json::json!(config.effective_view().zoom);
    let payload = serde_json::to_string_pretty(&json).map_err(|e| format!("json: {e}"))?;
    println!("{payload}");
    Ok(())
}

fn cmd_glyph(config: &AppConfig, counts: Vec<u64>) -> Result<(), String> {
    let colors = config.scene_settings().classification.colors();
    let glyph = CategoryCounts::new(counts)
        .and_then(|counts| ClusterGlyph::new(&counts, &colors))
        .map_err(|e| format!("glyph: {e}"))?;
    println!("{}", glyph.to_svg());
    Ok(())
}

fn cmd_replay(
    config: &AppConfig,
    path: PathBuf,
    filter: Option<String>,
    strict: bool,
) -> Result<(), String> {
    let text = fs::read_to_string(&path).map_err(|e| format!("read {path:?}: {e}"))?;
    let frames: Vec<Vec<Feature>> =
        serde_json::from_str(&text).map_err(|e| format!("decode frames: {e}"))?;

    let options = match filter {
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(&raw).map_err(|e| format!("--filter json: {e}"))?;
            QueryOptions::from_filter_json(&value, strict).map_err(|e| format!("--filter: {e}"))?
        }
        None => QueryOptions::filtered(cluster_filter()),
    };

    let report = replay_frames(config, options, frames);
    for (i, frame) in report.frames.iter().enumerate() {
        println!(
            "frame {i}: {} markers (+{} ={} -{})",
            frame.markers.len(),
            frame.created,
            frame.reused,
            frame.dropped
        );
        for (id, reason) in &frame.rejected {
            println!("  rejected {id}: {reason}");
        }
        for index in &frame.unkeyed {
            println!("  skipped feature #{index}: no id");
        }
    }
    for (name, value) in &report.metrics.counters {
        println!("{name} = {value}");
    }
    Ok(())
}
