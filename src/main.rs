//! CLI entry point for upscale-gan-rs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use upscale_gan_rs::config::CompletionAction;
use upscale_gan_rs::data::batch_count;
use upscale_gan_rs::device::select_device;
use upscale_gan_rs::{FrameIndex, Result, ShutdownHook, Trainer, UpscaleConfig, Upscaler};

#[derive(Parser)]
#[command(name = "upscale-gan")]
#[command(about = "Adversarial training of a 2x video-frame super-resolution generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: PathBuf,
    },
    /// Generate a default configuration file
    Init {
        /// Output path for config file
        #[arg(default_value = "upscale.yaml")]
        output: PathBuf,
        /// Directory of per-video frame folders
        #[arg(long, default_value = "data/train")]
        root: PathBuf,
    },
    /// Pretrain, then adversarially train the generator
    Train {
        /// Path to configuration file
        config: PathBuf,
        /// Load existing checkpoints before training
        #[arg(long)]
        resume: bool,
        /// Permit `on_complete: shutdown` to power off the host
        #[arg(long)]
        allow_shutdown: bool,
    },
    /// Build the frame index and report its size
    Index {
        /// Path to configuration file
        config: PathBuf,
    },
    /// Upscale one image with the trained generator
    Upscale {
        /// Path to configuration file
        config: PathBuf,
        /// Input image
        #[arg(long)]
        input: PathBuf,
        /// Output image
        #[arg(long)]
        output: PathBuf,
    },
}

fn load_config(path: &PathBuf) -> Result<UpscaleConfig> {
    let config = UpscaleConfig::from_file(path)?;
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            tracing::info!("Validating configuration: {}", config.display());
            let config = load_config(&config)?;
            println!("✓ Configuration is valid");
            println!("  Frames: {}", config.data.root.display());
            println!(
                "  HR size: {}x{}, batch size: {}",
                config.data.hr_width, config.data.hr_height, config.data.batch_size
            );
            println!(
                "  Pretrain passes: {}, epochs: {}",
                config.training.pretrain_passes, config.training.epochs
            );
        }
        Commands::Init { output, root } => {
            let config = UpscaleConfig::default_with_root(root);
            config.to_file(&output)?;
            println!("✓ Configuration written to: {}", output.display());
        }
        Commands::Train {
            config,
            resume,
            allow_shutdown,
        } => {
            tracing::info!("Starting training with config: {}", config.display());
            let mut config = load_config(&config)?;
            if resume {
                config.training.resume = true;
            }
            let shutdown = config.on_complete == CompletionAction::Shutdown;

            let mut trainer = Trainer::new(config)?;
            if shutdown {
                if allow_shutdown {
                    trainer.set_completion_hook(Box::new(ShutdownHook::default()));
                } else {
                    tracing::warn!(
                        "on_complete is shutdown but --allow-shutdown was not given; the host will stay up"
                    );
                }
            }
            let state = trainer.train()?;
            println!(
                "✓ Training complete: {} pretrain steps, {} adversarial steps",
                state.pretrain_step, state.train_step
            );
        }
        Commands::Index { config } => {
            let config = load_config(&config)?;
            let index = FrameIndex::build_for_pass(&config.data.root, config.seed, 0)?;
            println!("Videos: {}", index.videos().len());
            println!("Frames: {}", index.len());
            println!(
                "Batches per pass: {}",
                batch_count(index.len(), config.data.batch_size, config.data.drop_last)
            );
        }
        Commands::Upscale {
            config,
            input,
            output,
        } => {
            let config = load_config(&config)?;
            let device = select_device(&config.device);
            let upscaler =
                Upscaler::load(&config.output.checkpoint_dir, &config.generator, &device)?;
            let (w, h) = upscaler.upscale_file(&input, &output)?;
            println!("✓ Wrote {}x{} image to: {}", w, h, output.display());
        }
    }

    Ok(())
}
