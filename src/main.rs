//! Chiptable CLI
//!
//! Command-line tool for identifying music players in memory images and
//! converting their tables into a destination player template.

use anyhow::{bail, Context, Result};
use chiptable::report::{HumanFormatter, JsonFormatter, ReportFormatter};
use chiptable::{ConverterOptions, EngineVariant, LayoutRegistry, Pipeline, SignatureDatabase};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Music player table converter.
///
/// Identifies the player engine of a raw memory image and converts its
/// data tables into the layout of a destination player template.
#[derive(Parser, Debug)]
#[command(name = "chiptable")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (only output essential info)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report which players a set of images were built with
    Identify {
        /// Signature database
        #[arg(short, long, env = "CHIPTABLE_SIGNATURES")]
        signatures: PathBuf,

        /// Memory images to scan
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Convert one memory image into a destination template
    Convert {
        /// Memory image (raw bytes starting at the load address)
        image: PathBuf,

        /// Load address in hex (`1000`, `0x1000` or `$1000`)
        #[arg(short, long, value_parser = parse_address)]
        load_address: u16,

        /// Destination player template
        #[arg(short, long)]
        template: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Destination engine (`driver11`, `driver12`)
        #[arg(short, long, default_value = "driver11", value_parser = parse_engine)]
        engine: EngineVariant,

        /// Signature database used to pick a known layout
        #[arg(short, long, env = "CHIPTABLE_SIGNATURES")]
        signatures: Option<PathBuf>,

        /// Known player layouts (JSON)
        #[arg(long)]
        layouts: Option<PathBuf>,

        /// Analysis mode
        #[arg(short, long, default_value = "normal")]
        mode: AnalysisMode,

        /// Report format
        #[arg(short, long, default_value = "human")]
        format: OutputFormat,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Analysis mode options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnalysisMode {
    /// Normal analysis (default)
    Normal,
    /// Fast analysis (fewer candidates)
    Fast,
    /// Thorough analysis (byte-by-byte instrument scan)
    Thorough,
}

fn parse_address(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches('$');
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address '{s}': {e}"))
}

fn parse_engine(s: &str) -> Result<EngineVariant, String> {
    EngineVariant::from_name(s).ok_or_else(|| format!("unknown engine '{s}'"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging if verbose
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("chiptable=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let outcome = match &args.command {
        Command::Identify { signatures, files } => identify(signatures, files, &args),
        Command::Convert { .. } => convert(&args),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if !args.quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn identify(signatures: &Path, files: &[PathBuf], args: &Args) -> Result<bool> {
    let db = SignatureDatabase::from_path(signatures)
        .with_context(|| format!("loading signatures from {}", signatures.display()))?;

    let mut success = true;
    for path in files {
        match std::fs::read(path) {
            Ok(data) => {
                let players = db.identify(&data);
                if players.is_empty() {
                    println!("{}: (unidentified)", path.display());
                } else {
                    println!("{}: {}", path.display(), players.join(", "));
                }
            }
            Err(e) => {
                if !args.quiet {
                    eprintln!("Error reading {}: {}", path.display(), e);
                }
                success = false;
            }
        }
    }
    Ok(success)
}

fn convert(args: &Args) -> Result<bool> {
    let Command::Convert {
        image,
        load_address,
        template,
        output,
        engine,
        signatures,
        layouts,
        mode,
        format,
    } = &args.command
    else {
        bail!("convert called without the convert subcommand");
    };

    let data = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let template_bytes =
        std::fs::read(template).with_context(|| format!("reading {}", template.display()))?;

    let db = signatures
        .as_ref()
        .map(|p| {
            SignatureDatabase::from_path(p)
                .with_context(|| format!("loading signatures from {}", p.display()))
        })
        .transpose()?;
    let registry = layouts
        .as_ref()
        .map(|p| {
            LayoutRegistry::from_path(p)
                .with_context(|| format!("loading layouts from {}", p.display()))
        })
        .transpose()?;

    let options = match mode {
        AnalysisMode::Normal => ConverterOptions::new(),
        AnalysisMode::Fast => ConverterOptions::fast(),
        AnalysisMode::Thorough => ConverterOptions::thorough(),
    }
    .with_engine(*engine);

    let mut pipeline = Pipeline::new().with_options(options);
    if let Some(db) = &db {
        pipeline = pipeline.with_signatures(db);
    }
    if let Some(registry) = &registry {
        pipeline = pipeline.with_layouts(registry);
    }

    let label = image.display().to_string();
    let report = pipeline.run(&label, &data, *load_address, &template_bytes);

    std::fs::write(output, &report.output)
        .with_context(|| format!("writing {}", output.display()))?;

    let rendered = match format {
        OutputFormat::Human if args.quiet => HumanFormatter::quiet().format_report(&report),
        OutputFormat::Human if args.verbose => HumanFormatter::verbose().format_report(&report),
        OutputFormat::Human => HumanFormatter::new().format_report(&report),
        OutputFormat::Json => JsonFormatter::new().format_report(&report),
    };
    print!("{rendered}");

    Ok(!report.degraded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("1000"), Ok(0x1000));
        assert_eq!(parse_address("0x0801"), Ok(0x0801));
        assert_eq!(parse_address("$C000"), Ok(0xC000));
        assert!(parse_address("10000").is_err());
    }

    #[test]
    fn test_parse_engine() {
        assert_eq!(parse_engine("driver12"), Ok(EngineVariant::Driver12));
        assert!(parse_engine("driver99").is_err());
    }

    #[test]
    fn test_cli_parses_convert() {
        let args = Args::try_parse_from([
            "chiptable",
            "convert",
            "tune.bin",
            "--load-address",
            "1000",
            "--template",
            "driver.bin",
            "-o",
            "out.bin",
        ])
        .unwrap();
        match args.command {
            Command::Convert {
                load_address,
                engine,
                ..
            } => {
                assert_eq!(load_address, 0x1000);
                assert_eq!(engine, EngineVariant::Driver11);
            }
            Command::Identify { .. } => panic!("expected convert"),
        }
    }
}
