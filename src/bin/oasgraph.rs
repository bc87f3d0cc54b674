//! oasgraph CLI
//!
//! Loads an OpenAPI Description document set, validates it, and emits the
//! semantic graph. All documents must be supplied locally; referenced
//! documents that were not supplied are reported, never fetched.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use oasgraph::{
    build, file_url, load_file, BuildOptions, BuildOutput, ProcessingMode, Registry, TypeCatalog,
};

#[derive(Parser)]
#[command(name = "oasgraph")]
#[command(about = "Validate OpenAPI Descriptions and emit their semantic graph")]
#[command(version)]
struct Cli {
    /// Increase verbosity; can be passed twice for full debug output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a document set and report all collected diagnostics
    Validate {
        #[command(flatten)]
        set: DocumentSetArgs,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Validate a document set and emit the semantic graph as triples
    Graph {
        #[command(flatten)]
        set: DocumentSetArgs,

        /// Output file (stdout if not specified)
        #[arg(long, short = 'O')]
        output: Option<PathBuf>,

        /// Omit environment-specific triples and sort output lines for
        /// repeatable testing
        #[arg(long)]
        test_mode: bool,
    },
}

#[derive(Args)]
struct DocumentSetArgs {
    /// A document file, optionally followed by a URI for reference
    /// resolution and a semantic type for its root; repeatable
    #[arg(
        short = 'f',
        long = "file",
        num_args = 1..=3,
        value_names = ["FILE", "URI", "TYPE"],
        action = clap::ArgAction::Append,
        required = true,
    )]
    files: Vec<Vec<String>>,

    /// Map a directory to a URI prefix (prefix path must end in '/');
    /// repeatable
    #[arg(
        short = 'd',
        long = "directory",
        num_args = 1..=2,
        value_names = ["DIRECTORY", "URI_PREFIX"],
        action = clap::ArgAction::Append,
    )]
    directories: Vec<Vec<String>>,

    /// Suffixes stripped from a document's URL to derive its URI when no
    /// URI is assigned; pass without values to disable stripping
    #[arg(short = 'x', long, num_args = 0..)]
    strip_suffixes: Option<Vec<String>>,

    /// Processing model for reference resolution
    #[arg(long, value_enum, default_value = "reference")]
    mode: Mode,

    /// Pass 'false' to disable validation of examples and defaults
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    examples: bool,

    /// Treat unrecognized fields on non-extensible types as errors
    #[arg(long)]
    strict: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Only referenced targets are reached
    Reference,
    /// Whole target documents are parsed before resolving into them
    Document,
}

impl From<Mode> for ProcessingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Reference => ProcessingMode::ReferenceDriven,
            Mode::Document => ProcessingMode::DocumentDriven,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Validate { set, json } => run_validate(&set, json),
        Commands::Graph {
            set,
            output,
            test_mode,
        } => run_graph(&set, output, test_mode),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_registry(set: &DocumentSetArgs) -> Result<Registry, u8> {
    let strip = set
        .strip_suffixes
        .clone()
        .unwrap_or_else(|| oasgraph::DEFAULT_STRIP_SUFFIXES.iter().map(|s| s.to_string()).collect());
    let mut registry = Registry::with_strip_suffixes(strip);

    for dir in &set.directories {
        let mut dir_url = file_url(Path::new(&dir[0])).map_err(|e| {
            eprintln!("Error: {e}");
            e.exit_code() as u8
        })?;
        if !dir_url.ends_with('/') {
            dir_url.push('/');
        }
        let uri_prefix = dir.get(1).cloned().unwrap_or_else(|| dir_url.clone());
        registry.add_prefix(&dir_url, &uri_prefix).map_err(|e| {
            eprintln!("Error: {e}");
            e.exit_code() as u8
        })?;
    }

    for file in &set.files {
        let path = Path::new(&file[0]);
        let tree = load_file(path).map_err(|e| {
            eprintln!("Error: {e}");
            e.exit_code() as u8
        })?;
        let url = file_url(path).map_err(|e| {
            eprintln!("Error: {e}");
            e.exit_code() as u8
        })?;
        registry
            .register(
                tree,
                &url,
                file.get(1).map(String::as_str),
                file.get(2).map(String::as_str),
            )
            .map_err(|e| {
                eprintln!("Error: {e}");
                e.exit_code() as u8
            })?;
    }
    Ok(registry)
}

fn run_build(set: &DocumentSetArgs, test_mode: bool) -> Result<BuildOutput, u8> {
    let registry = build_registry(set)?;
    let catalog = TypeCatalog::oas30().map_err(|e| {
        eprintln!("Error: {e}");
        e.exit_code() as u8
    })?;
    let options = BuildOptions {
        mode: set.mode.into(),
        strict: set.strict,
        validate_examples: set.examples,
        test_mode,
    };
    build(&registry, &catalog, options).map_err(|e| {
        eprintln!("Error: {e}");
        e.exit_code() as u8
    })
}

fn report_text(output: &BuildOutput) {
    for diagnostic in &output.diagnostics {
        eprintln!("{diagnostic}");
    }
    for conflict in &output.conflicts {
        eprintln!("{conflict}");
    }
    if output.is_valid() {
        eprintln!("Your API description is valid!");
    } else {
        eprintln!("API description contains errors");
    }
}

fn run_validate(set: &DocumentSetArgs, json: bool) -> Result<(), u8> {
    let output = run_build(set, false)?;

    if json {
        let report = serde_json::json!({
            "valid": output.is_valid(),
            "errors": output.error_count(),
            "warnings": output.warning_count(),
            "diagnostics": output.diagnostics,
            "conflicts": output.conflicts,
        });
        println!("{report}");
    } else {
        report_text(&output);
    }

    if output.is_valid() {
        Ok(())
    } else {
        Err(1)
    }
}

fn run_graph(set: &DocumentSetArgs, destination: Option<PathBuf>, test_mode: bool) -> Result<(), u8> {
    let output = run_build(set, test_mode)?;

    if !output.is_valid() {
        report_text(&output);
        return Err(1);
    }
    for diagnostic in &output.diagnostics {
        // Warnings still surface alongside the graph.
        eprintln!("{diagnostic}");
    }

    let rendered = output.triples.render(test_mode);
    match destination {
        Some(path) => {
            std::fs::write(&path, &rendered).map_err(|e| {
                eprintln!("Error writing to {}: {e}", path.display());
                3u8
            })?;
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
