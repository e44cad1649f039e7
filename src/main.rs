//! Command-line entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG` overrides the `info` default).
//! 2. Parse the command line.
//! 3. Load [`AppConfig`] (defaults on first run) and apply flag overrides.
//! 4. Create the [`tokio`] runtime and run the subcommand on it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use pcm_streamer::{
    audio::{AudioSource, CpalCaptureSource, LiveCapture, SymphoniaDecoder},
    config::{AppConfig, AppPaths, TransportKind},
    pipeline::{prepare_file, LiveStreamer, StreamOutcome, StreamReport, Transmitter},
    transport::build_transport,
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "pcm-streamer", version, about = "Stream audio as paced 16-bit PCM to an embedded sink")]
struct Cli {
    /// Settings file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode an audio file and stream it.
    Play(PlayArgs),
    /// Stream the microphone until Ctrl-C or the given duration.
    Live(LiveArgs),
    /// Tell the receiver to stop playback.
    Stop(TargetArgs),
    /// Print the effective configuration.
    Config {
        /// Write the default configuration to the settings path.
        #[arg(long)]
        write_default: bool,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Talk to the device directly over TCP (`host` or `host:port`).
    #[arg(long, value_name = "ADDR", conflicts_with = "url")]
    tcp: Option<String>,

    /// Control-plane base URL.
    #[arg(long, value_name = "URL")]
    url: Option<String>,
}

#[derive(Args)]
struct PlayArgs {
    file: PathBuf,

    /// Bytes per chunk.
    #[arg(long, value_name = "N")]
    chunk_size: Option<usize>,

    /// Delay between consecutive chunks.
    #[arg(long, value_name = "MS")]
    pacing_ms: Option<u64>,

    /// Output sample rate.
    #[arg(long, value_name = "HZ")]
    rate: Option<u32>,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Args)]
struct LiveArgs {
    /// Stop automatically after this many seconds.
    #[arg(long, value_name = "N")]
    seconds: Option<u64>,

    /// Input device name (system default when omitted).
    #[arg(long)]
    device: Option<String>,

    #[command(flatten)]
    target: TargetArgs,
}

impl TargetArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(addr) = &self.tcp {
            config.transport.kind = TransportKind::Tcp;
            config.transport.device_addr = Some(addr.clone());
        }
        if let Some(url) = &self.url {
            config.transport.kind = TransportKind::Http;
            config.transport.base_url = url.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Command line
    let cli = Cli::parse();
    let settings_file = cli
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::new().settings_file);

    // 3. Configuration
    let config = AppConfig::load_from(&settings_file).unwrap_or_else(|e| {
        log::warn!("Failed to load config from {} ({e}); using defaults", settings_file.display());
        AppConfig::default()
    });

    // 4. Runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    match cli.command {
        Command::Play(args) => rt.block_on(play(config, args)),
        Command::Live(args) => rt.block_on(live(config, args)),
        Command::Stop(target) => rt.block_on(stop(config, target)),
        Command::Config { write_default } => show_config(&config, &settings_file, write_default),
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn play(mut config: AppConfig, args: PlayArgs) -> anyhow::Result<()> {
    if let Some(n) = args.chunk_size {
        config.audio.chunk_size_bytes = n;
    }
    if let Some(ms) = args.pacing_ms {
        config.stream.pacing_ms = ms;
    }
    if let Some(hz) = args.rate {
        config.audio.target_sample_rate = hz;
    }
    args.target.apply(&mut config);
    config.validate()?;

    let source = AudioSource::from_path(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    log::info!("Decoding {} ({} bytes)", args.file.display(), source.len());

    let audio = config.audio.clone();
    let prepared = tokio::task::spawn_blocking(move || {
        prepare_file(source, &SymphoniaDecoder::new(), &audio)
    })
    .await??;

    println!(
        "{}: {:.2} s, {} Hz {} ch -> {} Hz stereo, {} bytes in {} chunks",
        args.file.display(),
        prepared.duration_secs,
        prepared.source_sample_rate,
        prepared.source_channels,
        prepared.sample_rate,
        prepared.total_bytes,
        prepared.chunks.len()
    );

    let transport = build_transport(&config.transport)?;
    let mut transmitter = Transmitter::new(transport, config.stream.clone());

    let cancel = transmitter.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; stopping after the current chunk");
            cancel.cancel();
        }
    });

    let result = transmitter.stream(prepared.chunks).await;
    interrupt.abort();

    print_report(&result?);
    Ok(())
}

async fn live(mut config: AppConfig, args: LiveArgs) -> anyhow::Result<()> {
    if args.device.is_some() {
        config.capture.device = args.device.clone();
    }
    args.target.apply(&mut config);
    config.validate()?;

    let transport = build_transport(&config.transport)?;
    let transmitter = Transmitter::new(transport, config.stream.clone());
    let source = CpalCaptureSource::new(config.capture.device.clone(), config.capture.buffer_ms);
    let capture = LiveCapture::new(
        source,
        config.capture.channels,
        config.audio.target_sample_rate,
    );
    let mut streamer = LiveStreamer::new(capture, transmitter, config.capture.queue_depth);

    streamer.start().await?;
    println!("Streaming microphone; press Ctrl-C to stop");

    let limit = async {
        match args.seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
        _ = limit => log::info!("Time limit reached"),
        _ = streamer.finished() => log::warn!("Stream ended early"),
    }

    let report = streamer.stop().await?;
    print_report(&report);
    Ok(())
}

async fn stop(mut config: AppConfig, target: TargetArgs) -> anyhow::Result<()> {
    target.apply(&mut config);
    let transport = build_transport(&config.transport)?;
    transport.stop_playback().await?;
    println!("Playback stopped");
    Ok(())
}

fn show_config(config: &AppConfig, settings_file: &Path, write_default: bool) -> anyhow::Result<()> {
    if write_default {
        AppConfig::default().save_to(settings_file)?;
        println!("Wrote default configuration to {}", settings_file.display());
        return Ok(());
    }
    println!("# {}", settings_file.display());
    print!("{}", toml::to_string_pretty(config)?);
    if let Err(e) = config.validate() {
        log::warn!("Configuration is not valid: {e}");
    }
    Ok(())
}

fn print_report(report: &StreamReport) {
    let verb = match report.outcome {
        StreamOutcome::Completed => "Sent",
        StreamOutcome::Cancelled => "Cancelled after",
    };
    println!(
        "{verb} {} chunks ({} bytes) in {:.1} s",
        report.chunks_sent,
        report.bytes_sent,
        report.elapsed.as_secs_f64()
    );
}
