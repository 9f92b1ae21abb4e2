//! waypost command-line driver.
//!
//! Spawns a language server for a workspace, opens the named document and
//! runs one navigation operation, printing normalized results with a few
//! lines of source context.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use waypost::ServerConfig;
use waypost::lsp::SourceLocation;
use waypost::lsp::client::LspClientBuilder;

/// Navigate code through a language server.
#[derive(Parser, Debug)]
#[command(name = "waypost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root directory to navigate.
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Language server command to use.
    #[arg(short, long, default_value = "ccls")]
    server: String,

    /// Arguments to pass to the language server.
    #[arg(long)]
    server_args: Vec<String>,

    /// Language ids the server handles (repeatable).
    #[arg(long)]
    language_id: Vec<String>,

    /// Per-request deadline in seconds; 0 waits indefinitely.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    operation: Operation,
}

#[derive(Subcommand, Debug)]
enum Operation {
    /// Jump to the definition of the symbol at a position.
    Definition {
        /// Position as FILE:LINE:COLUMN (1-based line and column).
        position: String,
    },
    /// List references to the symbol at a position.
    References {
        /// Position as FILE:LINE:COLUMN (1-based line and column).
        position: String,
        /// Include the declaration itself in the results.
        #[arg(long)]
        include_declaration: bool,
    },
    /// Show hover documentation for the symbol at a position.
    Hover {
        /// Position as FILE:LINE:COLUMN (1-based line and column).
        position: String,
    },
    /// List completion candidates at a position.
    Completion {
        /// Position as FILE:LINE:COLUMN (1-based line and column).
        position: String,
    },
}

impl Operation {
    fn position(&self) -> &str {
        match self {
            Self::Definition { position }
            | Self::References { position, .. }
            | Self::Hover { position }
            | Self::Completion { position } => position,
        }
    }
}

impl Args {
    /// Parses the log level string into a tracing Level.
    fn parse_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => bail!("invalid log level: {}", other),
        }
    }
}

/// Parses `FILE:LINE:COLUMN` with 1-based line and column, returning the
/// 0-based position the protocol counts in.
fn parse_position(raw: &str) -> Result<(PathBuf, u32, u32)> {
    let mut parts = raw.rsplitn(3, ':');
    let column: u32 = parts
        .next()
        .and_then(|c| c.parse().ok())
        .context("position must be FILE:LINE:COLUMN")?;
    let line: u32 = parts
        .next()
        .and_then(|l| l.parse().ok())
        .context("position must be FILE:LINE:COLUMN")?;
    let file = parts.next().context("position must be FILE:LINE:COLUMN")?;

    if line == 0 || column == 0 {
        bail!("line and column are 1-based");
    }
    Ok((PathBuf::from(file), line - 1, column - 1))
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(level: Level) -> Result<()> {
    // Respect RUST_LOG when set, with a sensible default otherwise. Logs go
    // to stderr so stdout stays clean for results.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("waypost={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true),
        )
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

/// Reads context lines around a specific 1-based line in a file.
///
/// Returns a formatted string with line numbers and a marker for the
/// target line.
fn read_context_lines(path: &Path, line: u32, context: usize) -> std::io::Result<String> {
    use std::fmt::Write as _;

    let file_content = std::fs::read_to_string(path)?;
    let lines: Vec<_> = file_content.lines().collect();
    let line_idx = line.saturating_sub(1) as usize;

    let start = line_idx.saturating_sub(context);
    let end = (line_idx + context + 1).min(lines.len());

    let mut result = String::new();
    for (idx, line_text) in lines[start..end].iter().enumerate() {
        let line_num = start + idx + 1;
        let marker = if line_num == line_idx + 1 { ">" } else { " " };
        let _ = writeln!(result, "{marker} {line_num:4} | {line_text}");
    }
    Ok(result)
}

/// Prints normalized locations, each with source context where readable.
fn print_locations(locations: &[SourceLocation]) {
    if locations.is_empty() {
        println!("No results found.");
        return;
    }

    for location in locations {
        println!("{}:{}:{}", location.path.display(), location.line, location.column);
        if let Ok(context) = read_context_lines(&location.path, location.line, 2) {
            println!("{context}");
        }
    }
}

/// Extracts readable text from hover contents.
fn extract_hover_text(content: lsp_types::HoverContents) -> String {
    use lsp_types::{HoverContents, MarkedString};

    let render = |ms: MarkedString| match ms {
        MarkedString::String(s) => s,
        MarkedString::LanguageString(ls) => {
            format!("```{}\n{}\n```", ls.language, ls.value)
        }
    };

    match content {
        HoverContents::Scalar(marked_string) => render(marked_string),
        HoverContents::Array(marked_strings) => marked_strings
            .into_iter()
            .map(render)
            .collect::<Vec<_>>()
            .join("\n\n"),
        HoverContents::Markup(markup) => markup.value,
    }
}

/// Prints completion candidates as `label - detail` lines.
fn print_completions(response: lsp_types::CompletionResponse) {
    use lsp_types::CompletionResponse;

    let items = match response {
        CompletionResponse::Array(items) => items,
        CompletionResponse::List(list) => list.items,
    };

    if items.is_empty() {
        println!("No candidates.");
        return;
    }
    for item in items {
        match item.detail {
            Some(detail) => println!("{} - {}", item.label, detail),
            None => println!("{}", item.label),
        }
    }
}

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.parse_log_level()?;
    init_tracing(log_level)?;

    let workspace = args.workspace.canonicalize().context(format!(
        "failed to canonicalize workspace path: {}",
        args.workspace.display()
    ))?;

    let mut config = ServerConfig {
        command: args.server.clone(),
        args: args.server_args.clone(),
        workspace_root: workspace.clone(),
        ..ServerConfig::default()
    };
    if !args.language_id.is_empty() {
        config.language_ids = args.language_id.clone();
    }
    if args.timeout > 0 {
        config.request_timeout = Some(Duration::from_secs(args.timeout));
    }

    let (file, line, character) = parse_position(args.operation.position())?;
    let file = if file.is_absolute() {
        file
    } else {
        workspace.join(file)
    };

    info!(
        workspace = %workspace.display(),
        server = %args.server,
        "starting language server"
    );

    let client = LspClientBuilder::from_config(config)
        .build()
        .await
        .context("failed to start LSP client")?;

    client
        .did_open(&file)
        .await
        .context("failed to open document")?;

    match &args.operation {
        Operation::Definition { .. } => {
            let locations = client.goto_definition(&file, line, character).await?;
            print_locations(&locations);
        }
        Operation::References {
            include_declaration,
            ..
        } => {
            let locations = client
                .find_references(&file, line, character, *include_declaration)
                .await?;
            print_locations(&locations);
        }
        Operation::Hover { .. } => {
            match client.hover(&file, line, character).await? {
                Some(hover) => println!("{}", extract_hover_text(hover.contents)),
                None => println!("No hover information."),
            }
        }
        Operation::Completion { .. } => {
            match client.completion(&file, line, character).await? {
                Some(response) => print_completions(response),
                None => println!("No candidates."),
            }
        }
    }

    client.shutdown().await.context("failed to shut down")?;
    Ok(())
}
