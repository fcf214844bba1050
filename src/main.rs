mod config;
mod controller;
mod error;
mod inference;
mod latent;
mod model;
mod view;

use std::path::PathBuf;

use candle_core::Device;
use clap::Parser;
use eframe::egui;
use tracing_subscriber::{EnvFilter, fmt};

use config::{DEFAULT_MODEL_PATH, ViewerConfig};
use controller::Controller;
use error::Result;
use inference::InferenceAdapter;
use latent::{LatentState, SAMPLE_LATENT};
use model::DecoderArch;
use view::ViewerApp;

/// Explore the latent space of a trained autoencoder decoder
#[derive(Parser, Debug)]
#[command(name = "latent-viewer", version)]
struct Args {
    /// Path to ml model
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,
    /// JSON file describing the decoder layers
    #[arg(long)]
    arch: Option<PathBuf>,
    /// JSON file with viewer settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of leading latent coordinates bound to sliders [default: 16]
    #[arg(long)]
    controls: Option<usize>,
    /// Latent value per slider step [default: 1.0]
    #[arg(long)]
    scale: Option<f32>,
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_controller(args: &Args) -> Result<(Controller, ViewerConfig)> {
    let mut config = match &args.config {
        Some(path) => ViewerConfig::from_json_file(path)?,
        None => ViewerConfig::default(),
    };
    config.controls = args.controls.unwrap_or(config.controls);
    config.slider_scale = args.scale.unwrap_or(config.slider_scale);
    config.validate()?;

    let arch = match &args.arch {
        Some(path) => DecoderArch::from_json_file(path)?,
        None => DecoderArch::default(),
    };
    if arch.latent_dim != SAMPLE_LATENT.len() {
        return Err(error::ViewerError::Config {
            message: format!(
                "decoder expects {} latent dimensions but the sample has {}",
                arch.latent_dim,
                SAMPLE_LATENT.len()
            ),
        });
    }

    let decoder = model::load_checkpoint(&args.model, &arch, &Device::Cpu)?;
    let latent = LatentState::from_sample(config.controls)?;
    let adapter = InferenceAdapter::new(Box::new(decoder), latent, config.overlay);
    let controls = config.control_map()?;
    let controls_len = controls.len();
    let controller = Controller::new(adapter, controls, config.slider_scale)?;
    tracing::info!(
        controls = controls_len,
        scale = config.slider_scale,
        "viewer ready"
    );
    Ok((controller, config))
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let (controller, config) = match build_controller(&args) {
        Ok(built) => built,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("latent-viewer: {e}");
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("latent space viewer")
            .with_inner_size([900.0, 720.0]),
        ..Default::default()
    };
    if let Err(e) = eframe::run_native(
        "latent space viewer",
        options,
        Box::new(move |_cc| Ok(Box::new(ViewerApp::new(controller, config)))),
    ) {
        tracing::error!("window closed with error: {e}");
        std::process::exit(1);
    }
}
