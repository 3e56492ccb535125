// reconstruct - Turn one photograph into an AR-viewable memory scene
//
// Pipeline:
//   1. Load the image and the optional JSON config
//   2. Analyze, estimate depth, lift, mesh, light, score
//   3. Write scene.<ext>, preview.jpg and summary.json into --out
//   4. Optionally write a web-AR bundle into --out/web
//
// Usage: reconstruct <image> --out <dir> [--config cfg.json] [--format glb|gltf|obj]

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use memory_reconstructor::{ArExporter, PipelineConfig, ProcessingOptions, Reconstructor};

#[derive(Debug, Parser)]
#[command(author, version, about = "Single-photo memory reconstruction")]
struct Args {
    /// Input photograph.
    image: PathBuf,

    /// Output directory.
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// JSON pipeline configuration. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    no_enhanced_depth: bool,

    #[arg(long)]
    no_lighting_optimization: bool,

    /// Add a ground plane under the reconstruction.
    #[arg(long)]
    background_extension: bool,

    #[arg(long, default_value = "glb", value_parser = ["glb", "gltf", "obj"])]
    format: String,

    /// Also write scene.glb, ar_config.json and viewer.html into <out>/web.
    #[arg(long)]
    web_bundle: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let opts = ProcessingOptions {
        enhanced_depth: cfg.options.enhanced_depth && !args.no_enhanced_depth,
        lighting_optimization: cfg.options.lighting_optimization && !args.no_lighting_optimization,
        background_extension: cfg.options.background_extension || args.background_extension,
    };

    let img = image::open(&args.image)
        .with_context(|| format!("failed to open {}", args.image.display()))?
        .to_rgb8();
    fs::create_dir_all(&args.out).with_context(|| format!("failed to create {}", args.out.display()))?;

    let (scene, summary) = Reconstructor::from_config(&cfg).run(&img, &opts);

    let exporter = ArExporter::new(cfg.export.clone());
    let model = exporter.export(&scene, &args.out.join(format!("scene.{}", args.format)))?;
    let preview = exporter.generate_preview(&scene, &args.out.join("preview.jpg"))?;

    let summary_path = args.out.join("summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;

    if args.web_bundle {
        let bundle = exporter.export_web_bundle(&scene, &args.out.join("web"))?;
        info!(viewer = %bundle.viewer_path.display(), "Web bundle ready");
    }

    info!(
        model = %model.display(),
        preview = %preview.display(),
        quality = summary.quality_score,
        points = summary.depth_points,
        "Done"
    );
    Ok(())
}
