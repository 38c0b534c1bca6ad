//! gpt-tts CLI - mel code generation and dataset inspection

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use gpt_tts::audio::AudioOutput;
use gpt_tts::data::UnsupervisedAudioDataset;
use gpt_tts::models::gpt::{generate, DecodeStrategy, GenerationConfig};
use gpt_tts::text::text_to_sequence;
use gpt_tts::{ModelConfig, ModelRegistry, VERSION};

/// gpt-tts - autoregressive text to mel-token transformer
#[derive(Parser, Debug)]
#[command(name = "gpt-tts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use CPU even when a GPU is available
    #[arg(long, global = true)]
    cpu: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate mel codes for a piece of text
    Infer {
        /// Text to synthesize
        #[arg(short, long)]
        text: String,

        /// Path to the YAML config
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Safetensors checkpoint; random weights when omitted
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Decode through a key/value cache instead of recomputing every step
        #[arg(long)]
        kv_cache: bool,

        /// Write codes as JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the first dataset samples out as WAV files
    Dataset {
        /// Path to the YAML config (needs a `dataset` section)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Number of samples to dump
        #[arg(short = 'n', long, default_value = "8")]
        count: usize,

        /// Output directory
        #[arg(short, long, default_value = "dataset_dump")]
        output_dir: PathBuf,
    },

    /// Show the parsed configuration and registered models
    Info {
        /// Path to the YAML config
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn create_progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40}] {pos}/{len} {msg}")?,
    );
    Ok(pb)
}

fn select_device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        Ok(Device::cuda_if_available(0)?)
    }
}

fn run_infer(
    config: &Path,
    text: &str,
    checkpoint: Option<&Path>,
    kv_cache: bool,
    output: Option<&Path>,
    device: &Device,
) -> Result<()> {
    let cfg = ModelConfig::load(config)?;
    let registry = ModelRegistry::with_defaults();

    let model = match checkpoint {
        Some(path) => registry.load(&cfg.network, path, device)?,
        None => {
            warn!("No checkpoint given, using random weights");
            let varmap = VarMap::new();
            registry.build(&cfg.network, VarBuilder::from_varmap(&varmap, DType::F32, device))?
        }
    };

    let ids = text_to_sequence(text);
    if ids.is_empty() {
        bail!("Text {:?} contains no known symbols", text);
    }
    info!("Text: {:?} ({} symbols)", text, ids.len());
    let text_inputs = Tensor::from_vec(ids.clone(), (1, ids.len()), device)?;

    let strategy = if kv_cache {
        DecodeStrategy::KvCache
    } else {
        DecodeStrategy::Recompute
    };
    let generation = generate(&model, &text_inputs, &GenerationConfig::for_model(&model).with_strategy(strategy))?;
    let codes: Vec<Vec<u32>> = generation.codes.to_vec2()?;
    info!(
        "Generated {} mel codes in {} steps{}",
        codes[0].len(),
        generation.steps,
        if generation.hit_frame_limit { " (frame limit reached)" } else { "" }
    );

    let json = serde_json::to_string(&codes[0])?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Codes written to {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn run_dataset(config: &Path, count: usize, output_dir: &Path) -> Result<()> {
    let cfg = ModelConfig::load(config)?;
    let dataset_config = cfg
        .dataset
        .with_context(|| format!("{:?} has no dataset section", config))?;
    let sampling_rate = dataset_config.sampling_rate;
    let dataset = UnsupervisedAudioDataset::new(dataset_config)?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {:?}", output_dir))?;

    let count = count.min(dataset.len());
    let pb = create_progress_bar(count as u64)?;
    for i in 0..count {
        let sample = dataset.get(i)?;
        pb.set_message(sample.path.display().to_string());

        AudioOutput::save_tensor(&sample.clip, sampling_rate, output_dir.join(format!("{}_clip.wav", i)))?;
        if let Some(resampled) = &sample.resampled_clip {
            AudioOutput::save_tensor(resampled, sampling_rate, output_dir.join(format!("{}_resampled_clip.wav", i)))?;
        }
        if let Some(alt_clips) = &sample.alt_clips {
            let alt_clips = if alt_clips.rank() == 2 { alt_clips.unsqueeze(0)? } else { alt_clips.clone() };
            for k in 0..alt_clips.dim(0)? {
                AudioOutput::save_tensor(&alt_clips.get(k)?, sampling_rate, output_dir.join(format!("{}_alt_{}.wav", i, k)))?;
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");
    info!("Wrote {} samples to {:?}", count, output_dir);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    info!("gpt-tts v{}", VERSION);

    match cli.command {
        Commands::Infer {
            text,
            config,
            checkpoint,
            kv_cache,
            output,
        } => {
            let device = select_device(cli.cpu)?;
            run_infer(&config, &text, checkpoint.as_deref(), kv_cache, output.as_deref(), &device)
        }

        Commands::Dataset {
            config,
            count,
            output_dir,
        } => run_dataset(&config, count, &output_dir),

        Commands::Info { config } => {
            let cfg = ModelConfig::load(&config).context("Failed to load config")?;
            println!("{:#?}", cfg);
            println!("Registered models: {:?}", ModelRegistry::with_defaults().names());
            Ok(())
        }
    }
}
