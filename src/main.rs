//! SurfScale CLI
//!
//! Command-line interface for inspecting and exercising the scaler.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use surfscale::{
    negotiate, ContentDescription, FramePool, Framerate, NullSink, Resolution, ScaleConfig,
    ScaleFilter, ScalePipeline, SizeExpr, StubEngine, SurfaceFormat, VideoEngine,
};

#[derive(Parser)]
#[command(name = "surfscale")]
#[command(about = "Hardware Video Scaler - GPU surface scaling and format conversion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine information and format support
    Info,

    /// Evaluate output size expressions against an input geometry
    Negotiate {
        /// Input geometry (e.g. 1920x1080)
        #[arg(short, long, default_value = "1920x1080")]
        input: String,

        /// Width expression
        #[arg(short, long, default_value = "iw")]
        width: String,

        /// Height expression
        #[arg(short = 'H', long, default_value = "ih")]
        height: String,

        /// Output format (nv12, p010)
        #[arg(short, long, default_value = "nv12")]
        format: String,
    },

    /// Push synthetic frames through the filter on the stub engine
    Run {
        /// Number of frames to process
        #[arg(short = 'n', long, default_value = "300")]
        frames: u32,

        /// Input geometry (e.g. 1920x1080)
        #[arg(short, long, default_value = "1920x1080")]
        input: String,

        /// Width expression
        #[arg(short, long, default_value = "iw/2")]
        width: String,

        /// Height expression
        #[arg(short = 'H', long, default_value = "ih/2")]
        height: String,

        /// Output format (nv12, p010)
        #[arg(short, long, default_value = "nv12")]
        format: String,

        /// Load filter options from a TOML file instead
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("surfscale=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Negotiate {
            input,
            width,
            height,
            format,
        } => cmd_negotiate(input, width, height, format),
        Commands::Run {
            frames,
            input,
            width,
            height,
            format,
            config,
        } => cmd_run(frames, input, width, height, format, config),
    }
}

fn parse_geometry(text: &str) -> anyhow::Result<Resolution> {
    let parts: Vec<&str> = text.split('x').collect();
    if parts.len() == 2 {
        if let (Ok(w), Ok(h)) = (parts[0].parse(), parts[1].parse()) {
            return Ok(Resolution::new(w, h));
        }
    }
    anyhow::bail!("bad geometry '{}', expected WIDTHxHEIGHT", text)
}

fn cmd_info() -> anyhow::Result<()> {
    println!("SurfScale Engine Information");
    println!("============================\n");

    let engine: Arc<dyn VideoEngine> = StubEngine::new();
    println!("Device: {}", engine.device_binding());

    let desc = ContentDescription {
        input: Resolution::FHD_1080P,
        output: Resolution::FHD_1080P,
        input_rate: Framerate::FPS_60,
        output_rate: Framerate::FPS_60,
        layout: Default::default(),
        usage: Default::default(),
    };
    let enumerator = surfscale::device::Enumerator::create(&engine, &desc)?;

    println!("\nFormat support at {}:", Resolution::FHD_1080P);
    for format in [SurfaceFormat::Nv12, SurfaceFormat::P010, SurfaceFormat::Bgra] {
        let support = enumerator.check_format(format)?;
        println!(
            "  {:<5} input: {:<3} output: {}",
            format.to_string(),
            if support.input { "yes" } else { "no" },
            if support.output { "yes" } else { "no" }
        );
    }

    let caps = ScaleFilter::caps();
    println!("\nFilter capabilities:");
    println!("  hardware frames: {}", caps.hardware_frames);
    println!("  timeline:        {}", caps.timeline);

    Ok(())
}

fn cmd_negotiate(input: String, width: String, height: String, format: String) -> anyhow::Result<()> {
    let input = parse_geometry(&input)?;
    let format: SurfaceFormat = format.parse()?;
    let w = SizeExpr::parse(&width)?;
    let h = SizeExpr::parse(&height)?;

    let output = negotiate(input, &w, &h, format)?;
    println!("{} -> {} ({})", input, output, format);

    Ok(())
}

fn cmd_run(
    frames: u32,
    input: String,
    width: String,
    height: String,
    format: String,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let input = parse_geometry(&input)?;

    let config = match config_path {
        Some(path) => ScaleConfig::from_file(path)?,
        None => ScaleConfig::default()
            .with_size(width, height)
            .with_format(format.parse()?),
    };

    println!("SurfScale Run");
    println!("=============\n");
    println!("Input:  {} nv12", input);
    println!("Output: \"{}\" x \"{}\" ({})", config.width, config.height, config.format);
    println!("Frames: {}\n", frames);

    let engine: Arc<dyn VideoEngine> = StubEngine::new();
    let filter = ScaleFilter::new(engine.clone(), config)?;
    let mut pipeline = ScalePipeline::new(filter, Box::new(NullSink::new()));

    let source = FramePool::new(engine, input, SurfaceFormat::Nv12, 4)?;
    let frame_duration = Framerate::FPS_60.frame_duration_us();

    let start = std::time::Instant::now();
    for i in 0..frames {
        let mut frame = source.acquire()?;
        frame.pts = i as i64 * frame_duration;
        frame.duration = frame_duration;
        pipeline.push(frame)?;
    }
    let elapsed = start.elapsed();

    let output = pipeline
        .filter()
        .output_geometry()
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let emitted = pipeline.frames_emitted();
    let stats = pipeline.finish()?;

    println!("Results:");
    println!("  Negotiated output: {}", output);
    println!("  Frames in:  {}", stats.frames_in);
    println!("  Frames out: {} (emitted: {})", stats.frames_out, emitted);
    println!("  Total time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    println!(
        "  Throughput: {:.0} frames/s",
        frames as f64 / elapsed.as_secs_f64()
    );

    Ok(())
}
