//! pdhost-render - offline multi-instance renderer
//!
//! Loads one patch into several isolated instances, drives each with its
//! own constant input level and writes one WAV file per instance.
//!
//! Usage: `pdhost-render <config.yaml>` (set RUST_LOG=debug for detail)

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use pdhost_core::config::{read_config, HostConfig};
use pdhost_core::pd::{Message, PdHost, PdInstance};
use pdhost_core::{deinterleave, Sample};

/// A message sent to an instance after its patch is loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StartupSend {
    receiver: String,
    message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InstanceSpec {
    /// Used for the output file name
    name: String,
    /// Constant value fed to every input channel
    #[serde(default)]
    input_level: Sample,
    #[serde(default)]
    sends: Vec<StartupSend>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RenderConfig {
    #[serde(default)]
    host: HostConfig,
    patch: PathBuf,
    #[serde(default = "default_ticks")]
    ticks: usize,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
    instances: Vec<InstanceSpec>,
}

fn default_ticks() -> usize {
    // ~1.5s at 44.1kHz with 64-frame blocks
    1024
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("renders")
}

struct Rendered {
    name: String,
    instance: PdInstance,
    output: Vec<Sample>,
}

fn render_one(host: &mut PdHost, config: &RenderConfig, spec: &InstanceSpec) -> Result<Rendered> {
    let instance = host.create_instance()?;
    let patch = instance
        .open_patch(&config.patch)
        .with_context(|| format!("Instance '{}': failed to open patch", spec.name))?;

    for send in &spec.sends {
        instance
            .messaging()
            .send(&send.receiver, send.message.clone())
            .with_context(|| format!("Instance '{}': send to '{}'", spec.name, send.receiver))?;
    }

    let frames = config.ticks * instance.block_size();
    let input = vec![spec.input_level; frames * instance.inputs()];
    let mut output: Vec<Sample> = vec![0.0; frames * instance.outputs()];

    instance.start()?;
    instance.process(config.ticks, &input, &mut output)?;
    instance.stop()?;
    patch.dispose()?;

    log::info!(
        "Instance '{}' (id {}): rendered {} frames, $0={}",
        spec.name,
        instance.id(),
        frames,
        patch.dollar_zero()
    );

    Ok(Rendered {
        name: spec.name.clone(),
        instance,
        output,
    })
}

fn write_wav(path: &Path, rendered: &Rendered) -> Result<()> {
    let channels = u16::try_from(rendered.instance.outputs()).with_context(|| {
        format!(
            "'{}': {} output channels do not fit in a WAV header",
            rendered.name,
            rendered.instance.outputs()
        )
    })?;
    let spec = hound::WavSpec {
        channels,
        sample_rate: rendered.instance.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in &rendered.output {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn peak(samples: &[Sample]) -> Sample {
    samples.iter().fold(0.0, |acc: Sample, s| acc.max(s.abs()))
}

fn run(config_path: &Path) -> Result<()> {
    let config: RenderConfig = read_config(config_path)?;
    if config.instances.is_empty() {
        bail!("{}: no instances configured", config_path.display());
    }

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let mut host = PdHost::new(config.host.clone());
    let mut rendered = Vec::with_capacity(config.instances.len());
    for spec in &config.instances {
        rendered.push(render_one(&mut host, &config, spec)?);
    }

    for result in &rendered {
        let path = config.output_dir.join(format!("{}.wav", result.name));
        write_wav(&path, result)?;

        let expected = config
            .instances
            .iter()
            .find(|s| s.name == result.name)
            .map(|s| s.input_level.abs())
            .unwrap_or_default();
        let channel_peaks: Vec<Sample> = deinterleave(&result.output, result.instance.outputs())
            .iter()
            .map(|channel| peak(channel))
            .collect();
        let measured = peak(&channel_peaks);
        if measured > expected && expected > 0.0 {
            log::warn!(
                "'{}': peak {} exceeds its own input level {}",
                result.name,
                measured,
                expected
            );
        }
        let per_channel: Vec<String> = channel_peaks.iter().map(|p| format!("{:.4}", p)).collect();
        println!(
            "{:<16} peak {:>8.4} [{}]  -> {}",
            result.name,
            measured,
            per_channel.join(" "),
            path.display()
        );
    }

    host.shutdown();
    Ok(())
}

fn main() {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(config_path) = args.get(1) else {
        eprintln!("usage: pdhost-render <config.yaml>");
        std::process::exit(2);
    };

    if let Err(e) = run(Path::new(config_path)) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
