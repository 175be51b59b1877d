//! menu-scan
//!
//! Reads a screenshot of a color-coded course menu and prints its
//! structure report as JSON.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::io::Write;
use std::path::PathBuf;

use menu_scan::annotate::render_overlay;
use menu_scan::config::{LabelScope, RecognizerConfig};
use menu_scan::hierarchy::{HierarchyInferencer, InferenceMode};
use menu_scan::ocr::{OcrEngine, TesseractEngine};
use menu_scan::paths;

/// Where progress labels are read from.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LabelsArg {
    /// Skip OCR entirely
    None,
    /// One OCR call per leaf slot
    Slot,
    /// One OCR call per parent band
    Band,
}

impl From<LabelsArg> for LabelScope {
    fn from(arg: LabelsArg) -> Self {
        match arg {
            LabelsArg::None => LabelScope::None,
            LabelsArg::Slot => LabelScope::PerSlot,
            LabelsArg::Band => LabelScope::PerBand,
        }
    }
}

#[derive(Parser)]
#[command(name = "menu-scan")]
#[command(about = "Recognize a two-level course menu in a screenshot")]
struct Args {
    /// Screenshot to analyze
    #[arg(required_unless_present = "init_config")]
    image: Option<PathBuf>,

    /// Config file (defaults to config.json next to the executable)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Split the content area into this many parents instead of detecting them
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    split: Option<u32>,

    /// Override the label scope from the config
    #[arg(long, value_enum)]
    labels: Option<LabelsArg>,

    /// Write an annotated copy of the screenshot here
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the default config to the config path and exit
    #[arg(long)]
    init_config: bool,
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(paths::get_config_path);
    if args.init_config {
        RecognizerConfig::save_default(&config_path)?;
        info!("Default config written to {}", config_path.display());
        return Ok(());
    }

    let mut config = RecognizerConfig::load(&config_path);
    if let Some(labels) = args.labels {
        config.hierarchy.label_scope = labels.into();
    }

    let image_path = args.image.context("No screenshot given")?;
    let image = menu_scan::load_image(&image_path)?;
    info!(
        "Loaded {} ({}x{})",
        image_path.display(),
        image.width(),
        image.height()
    );

    let engine = match config.hierarchy.label_scope {
        LabelScope::None => None,
        _ => match TesseractEngine::discover(&config.ocr) {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!("OCR unavailable: {:#}. Labels will be absent.", e);
                None
            }
        },
    };

    let mode = args
        .split
        .map_or(InferenceMode::Detected, |regions| InferenceMode::ForcedEqualSplit { regions });
    let mut inferencer = HierarchyInferencer::new(
        &config,
        engine.as_ref().map(|e| e as &dyn OcrEngine),
    );
    let report = inferencer.infer(&image, mode)?;

    let json = report.to_json()?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    if let Some(path) = &args.overlay {
        render_overlay(&image, &report)
            .save(path)
            .with_context(|| format!("Failed to save overlay {}", path.display()))?;
        info!("Overlay written to {}", path.display());
    }

    let labels = report.labels();
    info!(
        "{} parents, {} items, {} labeled ({} incomplete)",
        report.top_level_regions().len(),
        report.items().len(),
        labels.labeled,
        labels.incomplete
    );
    Ok(())
}
