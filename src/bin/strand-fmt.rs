//! Command-line front end: reformat Strand sources or dump parsed pools.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use strand_compiler::{parse, reformat, Error, Lexicon, UnparseOptions};

#[derive(Parser)]
#[command(name = "strand-fmt", about = "Format Strand sources and inspect their parsed pools")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a dialect lexicon JSON file; the builtin vocabulary is used
    /// when omitted.
    #[arg(long, global = true)]
    lexicon: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Reformat a source file to canonical layout.
    Fmt {
        source: PathBuf,

        /// Render everything on a single line.
        #[arg(long)]
        compact: bool,

        #[arg(long, default_value_t = 2)]
        indent: usize,
    },

    /// Parse a source file and print its node pool as JSON.
    Pool { source: PathBuf },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    let lexicon = match &cli.lexicon {
        Some(path) => Lexicon::from_json_str(&std::fs::read_to_string(path)?)?,
        None => Lexicon::new(),
    };

    match cli.command {
        Command::Fmt {
            source,
            compact,
            indent,
        } => {
            let text = std::fs::read_to_string(&source)?;
            let options = UnparseOptions {
                compact,
                indent_size: indent,
            };
            println!("{}", reformat(&text, &lexicon, &options)?);
        }
        Command::Pool { source } => {
            let text = std::fs::read_to_string(&source)?;
            let pool = parse(&text, &lexicon)?;
            let json = serde_json::to_string_pretty(&pool).expect("pools serialize to JSON");
            println!("{json}");
        }
    }
    Ok(())
}
