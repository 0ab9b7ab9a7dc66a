//! Conversation Archiver - Export ChatGPT conversations as Markdown.
//!
//! This tool extracts conversations from captured chat pages, renders them
//! as Markdown documents, and delivers single files or batch ZIP archives.
//!
//! QUICK START:
//!   conversation-archiver -s captures/ export        # Export the active page
//!   conversation-archiver -s captures/ history       # List the sidebar history
//!   conversation-archiver -s captures/ batch --all   # Everything as one ZIP
//!   conversation-archiver render capture.json        # One capture to stdout
//!   conversation-archiver paths                      # Where files end up

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    encode_archive, render_document, summarize_batch, ArchiveEntry, ExportCoordinator, PageAgent,
};
use cli::{Cli, Commands};
use domain::{AppConfig, ArchiveError, HistoryItem};
use infrastructure::{
    config_file_path, ensure_config_exists, load_config, load_config_from_file, save_config,
    DirectorySink, PageSnapshot, SnapshotPageHost, SnapshotView,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> domain::Result<()> {
    let mut config = match cli.config.as_deref() {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };
    if let Some(dir) = cli.snapshots {
        config.export.snapshot_dir = Some(dir);
    }

    match cli.command {
        Commands::Export => {
            cmd_export(&config, cli.page.as_deref()).await?;
        }
        Commands::Batch { ids, all } => {
            cmd_batch(&config, cli.page.as_deref(), &ids, all).await?;
        }
        Commands::History => {
            cmd_history(&config, cli.page.as_deref()).await?;
        }
        Commands::Render { file, output } => {
            cmd_render(&config, &file, output.as_deref()).await?;
        }
        Commands::Pack { files, output } => {
            cmd_pack(&files, &output)?;
        }
        Commands::Paths => {
            cmd_paths(&config);
        }
        Commands::Init { force } => {
            cmd_init(force)?;
        }
    }

    Ok(())
}

/// Wire the export pipeline against the configured snapshot directory.
fn build_coordinator(
    config: &AppConfig,
    page: Option<&Path>,
) -> domain::Result<ExportCoordinator<SnapshotPageHost>> {
    let agent = PageAgent::new(config)?;
    let host = SnapshotPageHost::new(
        &config.snapshots_dir(),
        page,
        &config.page.origin,
        Box::new(agent),
    )?;
    let sink = DirectorySink::new(config.exports_dir());
    Ok(ExportCoordinator::new(host, Box::new(sink), config))
}

/// Export the active conversation command.
async fn cmd_export(config: &AppConfig, page: Option<&Path>) -> domain::Result<()> {
    let coordinator = build_coordinator(config, page)?;
    let outcome = coordinator.export_current().await?;

    println!(
        "{} Exported {} ({} turns) → {}",
        "✓".green().bold(),
        outcome.conversation_id.cyan(),
        outcome.turn_count,
        config.exports_dir().join(&outcome.filename).display()
    );

    Ok(())
}

/// Batch export command.
async fn cmd_batch(
    config: &AppConfig,
    page: Option<&Path>,
    ids: &[String],
    all: bool,
) -> domain::Result<()> {
    let coordinator = build_coordinator(config, page)?;

    let selection: Vec<HistoryItem> = if all {
        coordinator.fetch_history().await?
    } else {
        ids.iter().map(|raw| selection_item(raw)).collect()
    };

    let outcome = coordinator.export_selected(&selection).await?;
    println!("{}", summarize_batch(&outcome));

    Ok(())
}

/// Turn a raw command-line selection into a history item. Anything with a
/// scheme is taken as a URL, everything else as a conversation id.
fn selection_item(raw: &str) -> HistoryItem {
    if raw.contains("://") {
        HistoryItem {
            id: String::new(),
            title: String::new(),
            url: raw.to_string(),
        }
    } else {
        HistoryItem {
            id: raw.to_string(),
            title: String::new(),
            url: String::new(),
        }
    }
}

/// List the sidebar history command.
async fn cmd_history(config: &AppConfig, page: Option<&Path>) -> domain::Result<()> {
    let coordinator = build_coordinator(config, page)?;
    let items = coordinator.fetch_history().await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "ID", "Title"]);

    for (i, item) in items.iter().enumerate() {
        table.add_row(vec![(i + 1).to_string(), item.id.clone(), item.title.clone()]);
    }

    println!("{table}");
    println!();
    println!("Total: {} conversation(s)", items.len());

    Ok(())
}

/// Render a single capture command.
async fn cmd_render(
    config: &AppConfig,
    file: &Path,
    output: Option<&Path>,
) -> domain::Result<()> {
    let snapshot = PageSnapshot::load(file)?;
    let view = SnapshotView::new(snapshot);
    let agent = PageAgent::new(config)?;

    let record = agent.extract_when_ready(&view).await?;
    let markdown = render_document(&record);

    match output {
        Some(path) => {
            std::fs::write(path, &markdown).map_err(|e| {
                ArchiveError::io(format!("Failed to write {}", path.display()), e)
            })?;
            println!(
                "{} Rendered {} → {}",
                "✓".green().bold(),
                record.title.cyan(),
                path.display()
            );
            println!(
                "  {} user / {} assistant turns",
                record.user_turn_count(),
                record.assistant_turn_count()
            );
        }
        None => {
            print!("{markdown}");
        }
    }

    Ok(())
}

/// Pack files into a ZIP archive command.
fn cmd_pack(files: &[PathBuf], output: &Path) -> domain::Result<()> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ArchiveError::config(format!("Not a file path: {}", path.display()))
            })?;
        if !seen.insert(name.clone()) {
            return Err(ArchiveError::config(format!("Duplicate entry name: {name}")));
        }

        let data = std::fs::read(path)
            .map_err(|e| ArchiveError::io(format!("Failed to read {}", path.display()), e))?;
        entries.push(ArchiveEntry { name, data });
    }

    let bytes = encode_archive(&entries, &Utc::now());
    std::fs::write(output, bytes)
        .map_err(|e| ArchiveError::io(format!("Failed to write {}", output.display()), e))?;

    println!(
        "{} Packed {} file(s) → {}",
        "✓".green().bold(),
        entries.len(),
        output.display()
    );

    Ok(())
}

/// Show paths command.
fn cmd_paths(config: &AppConfig) {
    println!("{}", "📂 Conversation Archiver Paths".bold());
    println!();
    println!("  config:    {}", config_file_path().display());
    println!("  data:      {}", config.data_dir().display());
    println!("  snapshots: {}", config.snapshots_dir().display());
    println!("  exports:   {}", config.exports_dir().display());
}

/// Create or normalize the configuration file command.
fn cmd_init(force: bool) -> domain::Result<()> {
    if force {
        let config = load_config()?;
        save_config(&config)?;
    } else {
        ensure_config_exists()?;
    }

    println!(
        "{} Configuration at {}",
        "✓".green().bold(),
        config_file_path().display()
    );

    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
