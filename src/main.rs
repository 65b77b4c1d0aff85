//! CLI entry point for `mboxattach`.

use std::path::PathBuf;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mboxattach::config::Config;
use mboxattach::export::{ExtractOptions, Extractor, RunSummary};

/// Default output folder when neither `--output` nor the config file sets one.
const DEFAULT_OUTPUT: &str = "attachments/";

#[derive(Parser)]
#[command(
    name = "mboxattach",
    version,
    about = "Extract attachments and inline images from an MBOX archive",
    after_help = "Files are written as \"<message index> <name>\". \
                  Check extracted files with an antivirus before opening them."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// MBOX file to read
    #[arg(short, long, value_name = "FILE", default_value = "all.mbox")]
    input: PathBuf,

    /// Folder to write attachments into [default: attachments/]
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Do not extract inline images
    #[arg(long)]
    no_inline_images: bool,

    /// Index of the first message to process
    #[arg(long, value_name = "N", default_value_t = 0)]
    start: u64,

    /// Index of the message to stop at (not included)
    #[arg(long, value_name = "N")]
    stop: Option<u64>,

    /// Only messages whose From header contains this text
    #[arg(short, long, value_name = "TEXT")]
    sender: Option<String>,

    /// Only messages whose To header contains this text
    #[arg(short, long, value_name = "TEXT")]
    recipient: Option<String>,

    /// Add an extension guessed from the content type to unnamed parts
    #[arg(long)]
    guess_extensions: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        None => {}
    }

    // Load configuration
    let config = mboxattach::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    cmd_extract(&cli, &config)
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = mboxattach::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mboxattach.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxattach", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Merge config-file defaults with command-line flags.
fn extract_options(cli: &Cli, config: &Config) -> ExtractOptions {
    let output = cli
        .output
        .clone()
        .or_else(|| config.extract.default_output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let mut options = ExtractOptions::from_config(config, &cli.input, output);
    if cli.no_inline_images {
        options.inline_images = false;
    }
    if cli.guess_extensions {
        options.guess_extensions = true;
    }
    options.start = cli.start;
    options.stop = cli.stop;
    options.sender = cli.sender.clone().filter(|s| !s.is_empty());
    options.recipient = cli.recipient.clone().filter(|s| !s.is_empty());
    options
}

/// Extract every attachment in the archive.
fn cmd_extract(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let options = extract_options(cli, config);
    if !options.input.is_file() {
        anyhow::bail!("MBOX file not found: {}", options.input.display());
    }

    let file_size = std::fs::metadata(&options.input)?.len();
    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Scanning [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut extractor = Extractor::open(
        options,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();

    let pb = ProgressBar::new(extractor.message_count());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Extracting [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let summary = extractor.run(Some(&|index, total| {
        pb.set_length(total);
        pb.set_position(index + 1);
    }));
    pb.finish_and_clear();

    if cli.json {
        print_summary_json(&summary, extractor.options(), start.elapsed())?;
    } else {
        print_summary(&summary, cli.verbose > 0);
    }

    if let Some(error) = &summary.read_error {
        anyhow::bail!("extraction stopped early: {error}");
    }
    Ok(())
}

/// Print the run summary for humans.
fn print_summary(summary: &RunSummary, verbose: bool) {
    println!();
    for line in summary_lines(summary, verbose) {
        println!("{line}");
    }
}

/// Summary text: the two totals, the byte count with `-v`, then failures.
fn summary_lines(summary: &RunSummary, verbose: bool) -> Vec<String> {
    use humansize::{format_size, BINARY};

    let totals = &summary.totals;
    let mut lines = vec![
        format!("Total files:  {}", totals.total),
        format!("Failed:       {}", totals.failed),
    ];
    if verbose {
        lines.push(format!(
            "Written:      {}",
            format_size(totals.bytes_written, BINARY)
        ));
        if totals.shortened > 0 {
            lines.push(format!("Shortened:    {}", totals.shortened));
        }
    }

    if !totals.failures.is_empty() {
        lines.push(String::new());
        for failure in &totals.failures {
            lines.push(format!(
                "  message {} part {}: {}",
                failure.message, failure.label, failure.error
            ));
        }
    }
    lines
}

/// Print the run summary as JSON.
fn print_summary_json(
    summary: &RunSummary,
    options: &ExtractOptions,
    elapsed: std::time::Duration,
) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "input": options.input.to_string_lossy(),
        "output": options.output.to_string_lossy(),
        "elapsed_ms": elapsed.as_millis(),
        "summary": summary,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mboxattach::export::{PartFailure, RunTotals};

    fn summary(failures: Vec<PartFailure>) -> RunSummary {
        RunSummary {
            totals: RunTotals {
                total: 3,
                failed: failures.len() as u64,
                bytes_written: 2048,
                shortened: 0,
                failures,
            },
            messages_seen: 2,
            messages_filtered: 0,
            messages_unparsed: 0,
            exhausted: true,
            read_error: None,
        }
    }

    #[test]
    fn test_summary_has_two_lines_by_default() {
        assert_eq!(
            summary_lines(&summary(Vec::new()), false),
            vec!["Total files:  3", "Failed:       0"]
        );
    }

    #[test]
    fn test_verbose_summary_adds_bytes_written() {
        let lines = summary_lines(&summary(Vec::new()), true);
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("Written:      2"));
    }

    #[test]
    fn test_failures_follow_totals() {
        let failure = PartFailure {
            message: 4,
            label: "2".to_string(),
            error: "disk full".to_string(),
        };
        let lines = summary_lines(&summary(vec![failure]), false);
        assert_eq!(lines[1], "Failed:       1");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "  message 4 part 2: disk full");
    }
}
