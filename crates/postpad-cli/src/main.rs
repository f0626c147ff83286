use std::io::{self, Read as _, Write as _};
use std::path::PathBuf;

use anyhow::{Context as _, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use postpad_core::{BlockKind, Editor, Point, Selection};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "postpad")]
#[command(about = "Convert and reformat blog post content")]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Convert an HTML fragment into stored JSON.
    Import {
        /// Input file; stdin when omitted
        file: Option<PathBuf>,
        /// Fail on malformed markup instead of keeping its text
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        pretty: bool,
    },
    /// Render stored content (JSON, HTML or plain text) as HTML.
    Export { file: Option<PathBuf> },
    /// Apply one block or mark toggle to stored content and print the JSON.
    Toggle {
        file: Option<PathBuf>,
        #[arg(long, value_name = "KIND", conflicts_with = "mark", required_unless_present = "mark")]
        block: Option<BlockKind>,
        #[arg(long, value_name = "NAME")]
        mark: Option<String>,
        /// Selection anchor as `path:offset`, e.g. `0.1:4`
        #[arg(long, value_parser = parse_point)]
        anchor: Point,
        /// Selection focus; defaults to the anchor
        #[arg(long, value_parser = parse_point)]
        focus: Option<Point>,
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let output = match args.command {
        Cmd::Import {
            file,
            strict,
            pretty,
        } => {
            let html = read_input(file.as_ref())?;
            let doc = if strict {
                postpad_core::try_load(&html).context("malformed html")?
            } else {
                postpad_core::load(&html)
            };
            render_json(&doc, pretty)?
        }
        Cmd::Export { file } => {
            let content = read_input(file.as_ref())?;
            postpad_core::to_html(&postpad_core::load_stored(&content))
        }
        Cmd::Toggle {
            file,
            block,
            mark,
            anchor,
            focus,
            pretty,
        } => {
            let content = read_input(file.as_ref())?;
            let doc = postpad_core::load_stored(&content);
            let focus = focus.unwrap_or_else(|| anchor.clone());
            let mut editor = Editor::new(doc, Some(Selection::new(anchor, focus)));

            let changed = match (block, mark) {
                (Some(kind), _) => editor.toggle_block(kind),
                (None, Some(mark)) => editor.toggle_mark(&mark),
                (None, None) => bail!("either --block or --mark is required"),
            };
            tracing::info!(changed, "toggle applied");
            render_json(editor.doc(), pretty)?
        }
    };

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{output}").context("failed to write output")?;
    Ok(())
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn render_json(doc: &postpad_core::Document, pretty: bool) -> Result<String> {
    let json = if pretty {
        postpad_core::save_pretty(doc)
    } else {
        postpad_core::save(doc)
    };
    json.context("failed to serialize document")
}

fn parse_point(s: &str) -> Result<Point> {
    let (path, offset) = s
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected `path:offset`, got `{s}`"))?;
    let path = path
        .split('.')
        .map(|ix| ix.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid path in `{s}`"))?;
    let offset = offset
        .trim()
        .parse::<usize>()
        .with_context(|| format!("invalid offset in `{s}`"))?;
    Ok(Point::new(path, offset))
}
