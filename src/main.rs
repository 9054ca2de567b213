//! wsi-tiler - Inspect pyramidal TIFF slides and extract tiles.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tiler::{
    config::{CheckConfig, Cli, Command, InfoConfig, TileConfig},
    DecodeFailurePolicy, JpegTileEncoder, TileError, Tiler,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Info(config) => run_info(config).await,
        Command::Tile(config) => run_tile(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.tiler.verbose);

    let tiler = match Tiler::open_path(&config.file, config.tiler.to_config()).await {
        Ok(tiler) => tiler,
        Err(e) => {
            error!("Failed to open {}: {}", config.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&tiler.levels_info()) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize level info: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(config: TileConfig) -> ExitCode {
    init_logging(config.tiler.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let tiler = match Tiler::open_path(&config.file, config.tiler.to_config()).await {
        Ok(tiler) => tiler,
        Err(e) => {
            error!("Failed to open {}: {}", config.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let encoded = tiler
        .get_tile(config.level, config.col, config.row)
        .await
        .and_then(|tile| JpegTileEncoder::new().encode(&tile, config.quality));
    let encoded = match encoded {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, &encoded).await {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote tile ({}, {}) of level {} to {} ({} bytes)",
        config.col,
        config.row,
        config.level,
        config.output.display(),
        encoded.len()
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.tiler.verbose {
        init_logging(true);
    }

    // Failures must surface, whatever the configured policy says
    let tiler_config = config
        .tiler
        .to_config()
        .with_decode_failure_policy(DecodeFailurePolicy::Fail);

    println!("wsi-tiler check: {}", config.file.display());
    println!("═════════════════════════════════");

    let tiler = match Tiler::open_path(&config.file, tiler_config).await {
        Ok(tiler) => {
            println!("✓ Opened: {} level(s)", tiler.level_count());
            tiler
        }
        Err(e) => {
            println!("✗ Open failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let levels: Vec<usize> = match config.level {
        Some(level) if level >= tiler.level_count() => {
            println!("✗ Level {} does not exist", level);
            return ExitCode::FAILURE;
        }
        Some(level) => vec![level],
        None => (0..tiler.level_count()).collect(),
    };

    let mut total_failures = 0usize;
    for level in levels {
        let failures = check_level(&tiler, level).await;
        total_failures += failures.len();

        let (cols, rows) = match tiler.page(level) {
            Ok(page) => page.grid_size(),
            Err(_) => (0, 0),
        };
        if failures.is_empty() {
            println!("✓ Level {}: {}x{} tiles decoded", level, cols, rows);
        } else {
            println!(
                "✗ Level {}: {} of {} tiles failed",
                level,
                failures.len(),
                cols as usize * rows as usize
            );
            for (col, row, e) in &failures {
                println!("    ({}, {}): {}", col, row, e);
            }
        }
    }

    println!("═════════════════════════════════");
    if total_failures == 0 {
        println!("✓ All tiles decoded");
        ExitCode::SUCCESS
    } else {
        println!("✗ {} tile(s) failed", total_failures);
        ExitCode::FAILURE
    }
}

/// Decode every output tile of `level`, collecting the failures.
async fn check_level(tiler: &Tiler, level: usize) -> Vec<(u32, u32, TileError)> {
    let Ok(page) = tiler.page(level) else {
        return Vec::new();
    };
    let (cols, rows) = page.grid_size();

    let mut failures = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            if let Err(e) = page.get_tile(col, row).await {
                failures.push((col, row, e));
            }
        }
    }
    failures
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tiler=debug"
    } else {
        "wsi_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
