use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use tracing::warn;

use fingerprint::config::{get_config, FingerprintConfig};
use fingerprint::errors::FingerprintResult;
use fingerprint::hardware::SystemAttributes;
use fingerprint::logging::init_logging;
use fingerprint::{Category, Fingerprint, MeasurementFlags};

/// Print a stable fingerprint of this machine.
#[derive(Debug, Parser)]
#[command(name = "fingerprint", version, about)]
struct Cli {
    /// Configuration file (defaults to ./config.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Leave a measurement out (repeatable), e.g. --skip tpm --skip active_nics
    #[arg(long, value_name = "CATEGORY")]
    skip: Vec<Category>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    fingerprint: String,
    measurements: MeasurementFlags,
}

fn label(category: Category) -> &'static str {
    match category {
        Category::Baseboard => "MeasureBaseboard",
        Category::Bios => "MeasureBios",
        Category::Cpu => "MeasureCpu",
        Category::Tpm => "MeasureTpm (if available)",
        Category::ActiveNics => "MeasureActiveNICs",
        Category::Video => "MeasureVideoboard",
        Category::OsSerial => "MeasureOSSerialNumber",
        Category::SystemUuid => "MeasureSystemUUID",
        Category::HddSerial => "MeasureHDDSerialNumber",
    }
}

fn main() -> FingerprintResult<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FingerprintConfig::load_file(path)?,
        None => get_config()?.clone(),
    };
    init_logging(&config.logging);

    let system = SystemAttributes::new(config.hardware.query_timeout());
    if system.is_elevated() == Some(false) {
        warn!("not running elevated; privileged hardware values will be missing and the fingerprint will differ");
    }

    let mut fp = Fingerprint::system(&config)?;
    for category in &cli.skip {
        fp.set_measure(*category, false);
    }

    let report = Report {
        fingerprint: fp.generate()?,
        measurements: fp.flags(),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\nUnique System Fingerprint:\n{}\n", report.fingerprint);
    println!("Based on the following measurements:\n");
    for category in Category::REPORT_ORDER {
        println!("{} = {}", label(category), fp.measures(category));
    }

    Ok(())
}
