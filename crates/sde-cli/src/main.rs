mod convert;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use sde::{DryRunBackend, LoadMode, Sheet, SheetConfig, SheetError, render_diagnostics};

#[derive(Parser)]
#[command(name = "sde")]
#[command(about = "Load and run an SDE sheet")]
struct Cli {
    /// Path to the SDE sheet file (the output path with --from-yaml)
    file_path: PathBuf,

    /// Convert this YAML document into a sheet at FILE_PATH instead of running
    #[arg(long, value_name = "PATH")]
    from_yaml: Option<PathBuf>,

    /// TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Reject sheets with diagnostics and fail statements on schema errors
    #[arg(long)]
    strict: bool,

    /// Only load the sheet and report diagnostics
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        // Load diagnostics are rendered below
        .filter_module("sde::sheet", log::LevelFilter::Error)
        .init();

    let cli = Cli::parse();

    if let Some(yaml_path) = &cli.from_yaml {
        let text = convert::convert_file(yaml_path)?;
        fs::write(&cli.file_path, text)
            .with_context(|| format!("Failed to write {}", cli.file_path.display()))?;
        eprintln!("Wrote {}", cli.file_path.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => SheetConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SheetConfig::default(),
    };
    if cli.strict {
        config.mode = LoadMode::Strict;
    }

    let filename = cli.file_path.display().to_string();
    let source = fs::read_to_string(&cli.file_path)
        .with_context(|| format!("Failed to read {filename}"))?;

    let sheet = match Sheet::from_source(source.as_str(), config) {
        Ok(sheet) => sheet,
        Err(SheetError::Rejected { diagnostics }) => {
            eprint!("{}", render_diagnostics(&filename, &source, &diagnostics));
            bail!("{filename} rejected with {} diagnostic(s)", diagnostics.len());
        }
        Err(error) => return Err(error.into()),
    };
    if !sheet.diagnostics().is_empty() {
        eprint!("{}", render_diagnostics(&filename, &source, sheet.diagnostics()));
    }

    if cli.check {
        eprintln!(
            "{filename}: {} kind(s), {} statement(s), {} diagnostic(s)",
            sheet.registry().len(),
            sheet.statements().len(),
            sheet.diagnostics().len()
        );
        return Ok(());
    }

    let mut backend =
        DryRunBackend::new().with_known_models(sheet.config().generator.known_models.clone());
    let mut namespace = sheet.namespace();
    let mut executor = sheet.executor(&mut backend);
    let result = executor.execute(sheet.statements(), &mut namespace);
    for line in &executor.report().output {
        println!("{line}");
    }
    result.with_context(|| format!("Execution of {filename} stopped"))?;
    Ok(())
}
