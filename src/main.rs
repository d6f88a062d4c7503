use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mdkeymap::pipeline::{self, ReshapeSpec, Target};

/// Compile a markdown keyboard layout into firmware keymap sources.
#[derive(Parser)]
#[command(name = "mdkeymap", version, about)]
struct Cli {
    /// Markdown document containing the layout definition
    readme: PathBuf,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: String,

    /// File with two label grids: the layout's arrangement, then the
    /// physical arrangement to retarget onto
    #[arg(long)]
    reshape: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a QMK keymap.c
    Qmk {
        /// LAYOUT macro of the target keyboard
        #[arg(long, default_value = "LAYOUT")]
        layout: String,
    },
    /// Generate a ZMK keymap overlay
    Zmk {
        /// Matrix transform to select via the chosen node
        #[arg(long)]
        transform: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let markdown = fs::read_to_string(&cli.readme)
        .with_context(|| format!("reading {}", cli.readme.display()))?;

    let reshape = cli
        .reshape
        .as_deref()
        .map(|path| {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ReshapeSpec::parse(&text)
                .with_context(|| format!("parsing reshape spec {}", path.display()))
        })
        .transpose()?;

    let target = match cli.command {
        Command::Qmk { layout } => Target::Qmk { layout },
        Command::Zmk { transform } => Target::Zmk { transform },
    };
    let generated = pipeline::generate(&markdown, &target, reshape.as_ref())?;

    if cli.output == "-" {
        io::stdout()
            .write_all(generated.as_bytes())
            .context("writing to stdout")?;
    } else {
        fs::write(&cli.output, generated)
            .with_context(|| format!("writing {}", cli.output))?;
    }
    Ok(())
}
