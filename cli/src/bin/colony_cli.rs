use clap::{Parser, Subcommand};
use cli::{BatchConfig, IdentifyRequest, write_outputs};
use color_eyre::eyre::{Result, eyre};
use colony::{
    AnalysisCommand, AnalysisManager, AnalysisOptions, BackgroundMode, BiochemicalTest,
    CircleRegion, ColorToCount, CommandOutput, ImageSource, Pipeline, PipelineBuilder,
    PipelineConfig, identify, identify_from_panel,
};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count colonies on one plate photo and write mask, overlay, CSV, JSON and GeoJSON
    Analyze {
        /// Path to the plate photo
        #[arg(short, long)]
        input: PathBuf,
        /// Output directory
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Dish center and radius in pixels; all three or none
        #[arg(long, requires_all = ["center_y", "radius"])]
        center_x: Option<f64>,
        #[arg(long, requires_all = ["center_x", "radius"])]
        center_y: Option<f64>,
        #[arg(long, requires_all = ["center_x", "center_y"])]
        radius: Option<f64>,
        /// auto, light, dark (unsure is auto)
        #[arg(long, default_value = "auto")]
        background: BackgroundMode,
        /// auto, dark, light
        #[arg(long, default_value = "auto")]
        count: ColorToCount,
        /// Count the other side of the threshold
        #[arg(long)]
        invert: bool,
        /// Smallest accepted colony in pixels
        #[arg(long, default_value = "10")]
        min_colony_size: usize,
        /// Gray levels the Otsu threshold is widened by
        #[arg(long, default_value = "20")]
        threshold_shift: u8,
        /// Size ratio below which a contained colony counts as nested
        #[arg(long, default_value = "0.5")]
        nesting_ratio: f64,
    },
    /// Analyze every plate listed in a TOML or JSON batch file
    Batch {
        #[arg(short, long)]
        config: PathBuf,
        /// Plates analyzed at once (defaults to the number of cores)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Read a biochemical test tube photo
    Tube {
        #[arg(short, long)]
        input: PathBuf,
        /// gram_stain, catalase, oxidase, coagulase, indole, citrate, urease, lactose_fermentation
        #[arg(short, long)]
        test: BiochemicalTest,
        /// Use the texture/hue detector where the test has one
        #[arg(long)]
        heuristic: bool,
    },
    /// Rank candidate species from observations and test results
    Identify {
        /// TOML or JSON file with observations, tests and an optional tube panel
        #[arg(short, long)]
        request: PathBuf,
        /// Plate photo whose colony statistics feed the rules
        #[arg(short, long)]
        plate: Option<PathBuf>,
    },
    /// Print the JSON schema of analysis commands and batch files
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            output_dir,
            center_x,
            center_y,
            radius,
            background,
            count,
            invert,
            min_colony_size,
            threshold_shift,
            nesting_ratio,
        } => {
            let region = match (center_x, center_y, radius) {
                (Some(x), Some(y), Some(r)) => Some(CircleRegion::new(x, y, r)?),
                _ => None,
            };
            let options = AnalysisOptions {
                region,
                background_mode: background,
                color_to_count: count,
                invert_detection: invert,
            };
            let config = PipelineConfig {
                min_colony_size,
                threshold_shift,
                nesting_size_ratio: nesting_ratio,
            };
            analyze_plate(&input, &output_dir, &options, &config)?;
        }
        Commands::Batch { config, jobs } => {
            run_batch(&config, jobs).await?;
        }
        Commands::Tube { input, test, heuristic } => {
            read_tube(&input, test, heuristic)?;
        }
        Commands::Identify { request, plate } => {
            identify_species(&request, plate.as_deref())?;
        }
        Commands::Schema => {
            let schemas = serde_json::json!({
                "commands": AnalysisCommand::schema(),
                "batch": schemars::schema_for!(BatchConfig),
                "identify": schemars::schema_for!(IdentifyRequest),
            });
            println!("{}", serde_json::to_string_pretty(&schemas)?);
        }
    }

    Ok(())
}

fn analyze_plate(
    input: &Path,
    output_dir: &Path,
    options: &AnalysisOptions,
    config: &PipelineConfig,
) -> Result<()> {
    let raster = ImageSource::Path(input.to_path_buf()).load()?;
    let result = PipelineBuilder::build_from_config(config).analyze(&raster, options)?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "plate".to_string());
    let outputs = write_outputs(&raster, &result, output_dir, &stem)?;

    info!(
        colonies = result.colonies.len(),
        nested = result.nested_count(),
        effective_count = result.effective_count,
        avg_size = result.avg_size,
        "{} analyzed", input.display()
    );
    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}

async fn run_batch(config_path: &Path, jobs: Option<usize>) -> Result<()> {
    let batch = BatchConfig::from_file(config_path)?;
    let jobs = jobs.unwrap_or_else(cli::default_parallelism);
    info!("Batch of {} plates -> {} ({} at a time)", batch.plates.len(), batch.output_dir, jobs);

    let reports = cli::run_batch(&batch, jobs).await?;

    let mut failures = 0usize;
    for report in &reports {
        match &report.result {
            Ok(effective) => info!("Plate '{}': effective count {}", report.name, effective),
            Err(err) => {
                failures += 1;
                error!("Plate '{}' failed: {}", report.name, err);
            }
        }
    }

    if failures > 0 {
        warn!("{} of {} plates failed", failures, reports.len());
        return Err(eyre!("{failures} plates failed"));
    }
    info!("Batch completed");
    Ok(())
}

fn read_tube(input: &Path, test: BiochemicalTest, heuristic: bool) -> Result<()> {
    let mut manager = AnalysisManager::new();
    manager.load_image(input)?;

    let command = if heuristic {
        AnalysisCommand::DetectTube { test }
    } else {
        AnalysisCommand::ClassifyTube { test }
    };
    let output = manager.execute(command)?;
    if let CommandOutput::Tube { outcome, .. } = &output {
        info!("{}: {} ({})", test.name(), outcome, test.describe(*outcome));
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn identify_species(request_path: &Path, plate: Option<&Path>) -> Result<()> {
    let request = IdentifyRequest::from_file(request_path)?;

    let colonies = match plate {
        Some(path) => {
            let raster = ImageSource::Path(path.to_path_buf()).load()?;
            Pipeline::default().analyze(&raster, &AnalysisOptions::default())?.colonies
        }
        None => Vec::new(),
    };

    let candidates = identify(&colonies, &request.observations, &request.tests);
    if candidates.is_empty() {
        warn!("No rule matched the given evidence");
    }

    let panel_match = request.panel.as_ref().and_then(identify_from_panel);
    if let Some(found) = &panel_match {
        info!("Tube panel points to {} ({}%)", found.species.name, found.confidence);
    }

    let report = serde_json::json!({
        "candidates": candidates,
        "panel_match": panel_match.map(|m| serde_json::json!({
            "species": m.species.name,
            "confidence": m.confidence,
            "explanation": m.species.explanation,
        })),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
