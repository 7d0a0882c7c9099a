//! CLI entry point for rowview.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rowview_app::{OrderSpec, ProjectConfig, ViewConfig, ViewSelection};
use rowview_store_json::JsonFileSource;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod commands;

/// Browse hierarchical rows stored in a JSON document.
#[derive(Parser, Debug)]
#[command(
    name = "rowview",
    version,
    about = "rowview: lazily materialized hierarchical row views"
)]
struct Cli {
    /// JSON document holding the rows.
    #[arg(long, default_value = "rows.json")]
    source: PathBuf,

    /// Directory searched for `.rowview/config.toml` (defaults to current).
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Explicit configuration file; overrides `--dir`.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count top-level rows.
    Size,

    /// Print a page of top-level rows.
    Page {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        length: usize,
        /// Ordering as `field[:asc|desc]`; repeat for tie-breakers.
        #[arg(short = 'o', long = "order")]
        orders: Vec<OrderSpec>,
    },

    /// Print one row, at any depth.
    Show {
        #[arg(long)]
        id: String,
    },

    /// Print every row as an indented tree.
    Tree,

    /// Select rows by barcode.
    Select {
        #[arg(long)]
        barcode: String,
        /// Rows already selected.
        #[arg(short = 's', long = "selected")]
        selected: Vec<String>,
    },

    /// Append a top-level row given as JSON.
    Add {
        #[arg(long)]
        json: String,
    },

    /// Remove top-level rows.
    Remove {
        #[arg(long = "id", required = true)]
        ids: Vec<String>,
    },
}

fn main() -> Result<()> {
    let Cli {
        source,
        dir,
        config,
        cmd,
    } = Cli::parse();

    install_tracing();

    let config = load_config(dir, config)?;
    let view = ViewSelection::builder()
        .source(Arc::new(JsonFileSource::open(source)))
        .config(config)
        .build()?;
    let mut out = std::io::stdout().lock();
    commands::run(cmd, &view, &mut out)
}

fn load_config(dir: Option<PathBuf>, explicit: Option<PathBuf>) -> Result<ViewConfig> {
    match explicit {
        Some(path) => ViewConfig::from_path(path),
        None => Ok(ProjectConfig::from_dir(dir.unwrap_or_else(|| PathBuf::from(".")))?.view),
    }
}

fn install_tracing() {
    // RUST_LOG is honoured; INFO by default. Logs go to stderr so stdout stays parseable.
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parse_page_command() {
        let cli = Cli::parse_from([
            "rowview",
            "--source",
            "data/rows.json",
            "page",
            "--offset",
            "1",
            "--length",
            "2",
            "-o",
            "name:desc",
            "--order",
            "qty",
        ]);

        assert_eq!(cli.source, PathBuf::from("data/rows.json"));
        match cli.cmd {
            Command::Page {
                offset,
                length,
                orders,
            } => {
                assert_eq!((offset, length), (1, 2));
                assert_eq!(orders, vec![OrderSpec::desc("name"), OrderSpec::asc("qty")]);
            }
            _ => panic!("expected page command"),
        }
    }

    #[test]
    fn rejects_malformed_order() {
        let parsed = Cli::try_parse_from(["rowview", "page", "--order", "name:up"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn parse_select_command() {
        let cli = Cli::parse_from(["rowview", "select", "--barcode", "PAL-1", "-s", "3", "-s", "7"]);
        match cli.cmd {
            Command::Select { barcode, selected } => {
                assert_eq!(barcode, "PAL-1");
                assert_eq!(selected, vec!["3", "7"]);
            }
            _ => panic!("expected select command"),
        }
    }

    #[test]
    fn remove_requires_an_id() {
        assert!(Cli::try_parse_from(["rowview", "remove"]).is_err());
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path().to_path_buf()), None).unwrap();
        assert_eq!(config.table_name, "M_HU");
    }
}
