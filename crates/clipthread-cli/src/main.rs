use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use clipthread_core::{Config, VideoProcessor, api_key_from_env};

#[derive(Parser)]
#[command(name = "clipthread")]
#[command(about = "Chapter videos with Gemini, cut clips with ffmpeg, and generate post threads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a video into chapter clips and post threads
    Process {
        /// Path to the video file
        video_path: PathBuf,

        /// Process the video as a single chunk without splitting
        #[arg(long)]
        no_split: bool,
    },
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let Commands::Process {
        video_path,
        no_split,
    } = cli.command;

    // Validate the credential before doing any work
    api_key_from_env()?;

    let config = Config::from_cwd();
    let processor = VideoProcessor::new(config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    println!(
        "\n{}  {}\n",
        style("clipthread").cyan().bold(),
        style("Video to Post Threads").dim()
    );

    let spinner = create_spinner(if no_split {
        "Processing video as a single chunk..."
    } else {
        "Processing video into chapters..."
    });
    let results = processor
        .process_video(&video_path, !no_split, &cancel)
        .await;
    let results = match results {
        Ok(results) => results,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    let first_title = results
        .chapters
        .first()
        .map(|c| c.title.as_str())
        .unwrap_or("?");
    spinner.finish_with_message(format!(
        "{} Processing complete: {} chapter(s), starting with \"{}\"",
        style("✓").green().bold(),
        results.chapters.len(),
        style(first_title).yellow()
    ));

    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    println!(
        "\n{} {}",
        style("Saved:").dim(),
        style(format!("results/{stem}/analysis.json")).cyan()
    );

    Ok(())
}
