mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;
use vidmill::config::Config;
use vidmill::lifecycle::Lifecycle;
use vidmill::pool::WorkerPool;
use vidmill::processor::JobProcessor;
use vidmill_av::{check_tools, Outcome, OperationRequest, Prober, ToolPaths};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidmill=trace,vidmill_av=trace".to_string()
        } else {
            "vidmill=info,vidmill_av=info".to_string()
        }
    });
    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Run { request } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let requests = vec![read_request(&request)?];
            run_batch(config, requests, 1).await
        }
        Commands::Batch { requests, workers } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let workers = workers.unwrap_or_else(|| config.clamped_workers());
            let requests = read_requests(&requests)?;
            run_batch(config, requests, workers).await
        }
        Commands::Probe { file, json } => probe_file(cli.config.as_deref(), &file, json).await,
        Commands::CheckTools => check_tools_cmd(cli.config.as_deref()),
        Commands::Validate { config } => {
            let path = config.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vidmill {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn read_request(path: &Path) -> Result<OperationRequest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid operation request in {}", path.display()))
}

fn read_requests(path: &Path) -> Result<Vec<OperationRequest>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid operation request list in {}", path.display()))
}

async fn run_batch(config: Config, requests: Vec<OperationRequest>, workers: usize) -> Result<()> {
    if requests.is_empty() {
        anyhow::bail!("no requests to run");
    }

    let tools = ToolPaths::discover(&config.tools)?;
    tracing::info!(
        "using ffmpeg at {}, ffprobe at {}",
        tools.ffmpeg.display(),
        tools.ffprobe.display()
    );

    let lifecycle = Lifecycle::new();
    Arc::clone(&lifecycle).install_signal_handler();

    let processor = Arc::new(JobProcessor::new(&config, tools));
    let pool = WorkerPool::new(processor, workers);

    // First signal: stop accepting, drain with grace, then cancel stragglers.
    {
        let pool = pool.clone();
        let lifecycle = Arc::clone(&lifecycle);
        let grace = config.shutdown_grace();
        tokio::spawn(async move {
            lifecycle.shutdown_requested().await;
            pool.shutdown(grace, false).await;
            lifecycle.mark_stopped();
        });
    }

    let mut handles = Vec::with_capacity(requests.len());
    for request in requests {
        if !lifecycle.is_running() {
            tracing::warn!("shutdown in progress; remaining requests not submitted");
            break;
        }
        let label = request.operation.kind();
        match pool.submit(request) {
            Ok(handle) => handles.push((label, handle)),
            Err(e) => {
                tracing::warn!("submission rejected ({label}): {e}");
                break;
            }
        }
    }

    let mut failures = 0usize;
    for (label, handle) in handles {
        let id = handle.id();
        match handle.wait().await {
            Ok(result) if result.succeeded() => {
                println!("{id} {label}: ok");
                for output in &result.outputs {
                    println!("  -> {}", output.display());
                }
            }
            Ok(result) => {
                failures += 1;
                match result.outcome {
                    Outcome::Failed => println!(
                        "{id} {label}: failed (exit {:?})\n  {}",
                        result.exit_code, result.stderr_tail
                    ),
                    Outcome::TimedOut => println!("{id} {label}: timed out"),
                    Outcome::Cancelled => println!("{id} {label}: cancelled"),
                    Outcome::Succeeded => {}
                }
            }
            Err(e) => {
                failures += 1;
                println!("{id} {label}: error: {e}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} job(s) did not succeed");
    }
    Ok(())
}

async fn probe_file(config_path: Option<&Path>, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = Config::load_or_default(config_path);
    let tools = ToolPaths::discover(&config.tools)?;
    let info = Prober::new(tools.ffprobe).probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", info.path.display());
    println!("Container: {}", info.container);
    println!("Size: {} bytes", info.size);
    if let Some(duration) = info.duration {
        println!("Duration: {}", vidmill_av::timecode::format_timecode(duration));
    }

    println!("\nStreams: {}", info.streams.len());
    for stream in &info.streams {
        print!("  [{}:{}] {}", stream.kind, stream.index, stream.codec);
        if let (Some(w), Some(h)) = (stream.width, stream.height) {
            print!(" {w}x{h}");
        }
        if let Some(channels) = stream.channels {
            print!(" {channels}ch");
        }
        if let Some(ref lang) = stream.language {
            print!(" ({lang})");
        }
        if stream.default {
            print!(" [default]");
        }
        if stream.forced {
            print!(" [forced]");
        }
        println!();
    }

    println!("\nChapters: {}", info.chapters.len());
    for chapter in &info.chapters {
        println!(
            "  [{}] {} - {}  {}",
            chapter.index,
            vidmill_av::timecode::format_timecode(chapter.start),
            vidmill_av::timecode::format_timecode(chapter.end),
            chapter.title
        );
    }

    Ok(())
}

fn check_tools_cmd(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = check_tools(&config.tools);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all operations.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = Config::load_or_default(Some(p));
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("✓ Configuration is valid");
            } else {
                for warning in &warnings {
                    println!("! {warning}");
                }
            }
            println!("  Output dir: {}", config.output_dir.display());
            println!("  Workers: {}", config.clamped_workers());
            println!("  Shutdown grace: {}s", config.shutdown_grace_secs);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!("  Output dir: {}", config.output_dir.display());
            println!("  Workers: {}", config.clamped_workers());
        }
    }

    Ok(())
}
