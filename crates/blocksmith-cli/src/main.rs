//! blocksmith command-line driver.
//!
//! Runs the editing core against an in-memory surface so snapshots can be
//! checked and transformed from a shell.
//!
//! Usage:
//!   # Load a snapshot and write back what the editor saves
//!   blocksmith render document.json
//!
//!   # Paste HTML at the end of a document
//!   blocksmith paste document.json --html '<h1>Title</h1><p>Body</p>'
//!
//!   # Print an empty editor's document
//!   blocksmith save

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use blocksmith_core::{DataTransfer, Editor, EditorConfig, MemorySurface, SaveOutput, TagSanitizer};
use blocksmith_types::OutputData;

/// Drive the blocksmith editing core from the command line.
#[derive(Parser, Debug)]
#[command(name = "blocksmith")]
#[command(about = "Render, paste into and save block documents")]
struct Args {
    /// Editor configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pretty-print the saved document
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a snapshot and print what the editor saves from it
    Render {
        /// Snapshot JSON file, `-` for stdin
        input: PathBuf,
    },
    /// Paste HTML or plain text at the end of a snapshot
    Paste {
        /// Snapshot JSON file, `-` for stdin; an empty document when omitted
        input: Option<PathBuf>,

        /// HTML clipboard content
        #[arg(long)]
        html: Option<String>,

        /// Plain-text clipboard content
        #[arg(long)]
        text: Option<String>,

        /// Treat the content as dropped rather than pasted
        #[arg(long)]
        drop: bool,
    },
    /// Print the document of an editor with no initial data
    Save,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the document.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EditorConfig::load(path)?,
        None => EditorConfig::default(),
    };

    let output = match args.command {
        Command::Render { input } => {
            let data = read_snapshot(&input)?;
            tracing::info!(blocks = data.blocks.len(), "rendering snapshot");
            let mut editor = open(config.with_data(data)).await?;
            finish(&mut editor).await
        }
        Command::Paste { input, html, text, drop } => {
            if html.is_none() && text.is_none() {
                bail!("nothing to paste: pass --html and/or --text");
            }
            let config = match input {
                Some(path) => config.with_data(read_snapshot(&path)?),
                None => config,
            };
            let mut editor = open(config).await?;

            let mut transfer = DataTransfer::new();
            if let Some(html) = html {
                transfer = transfer.with_html(html);
            }
            if let Some(text) = text {
                transfer = transfer.with_text(text);
            }
            editor.focus(true);
            let inserted = editor.handle_paste(&transfer, drop)?;
            tracing::info!(inserted = inserted.len(), "paste handled");
            finish(&mut editor).await
        }
        Command::Save => {
            let mut editor = open(config).await?;
            finish(&mut editor).await
        }
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&output.data)?
    } else {
        serde_json::to_string(&output.data)?
    };
    println!("{json}");

    if !output.is_complete() {
        for failure in &output.failures {
            tracing::warn!(
                block = %failure.block,
                tool = %failure.tool,
                index = failure.index,
                error = %failure.error,
                "block left out of saved document"
            );
        }
        bail!("{} block(s) failed to save", output.failures.len());
    }
    Ok(())
}

async fn open(config: EditorConfig) -> Result<Editor> {
    let surface = Arc::new(MemorySurface::new());
    let editor = Editor::new(config, Vec::new(), surface.clone(), surface, Arc::new(TagSanitizer))
        .await
        .context("editor failed to start")?;
    Ok(editor)
}

async fn finish(editor: &mut Editor) -> SaveOutput {
    let output = editor.save().await;
    for e in editor.destroy().await {
        tracing::warn!(error = %e, "teardown error");
    }
    output
}

fn read_snapshot(path: &Path) -> Result<OutputData> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", path.display()))
}
