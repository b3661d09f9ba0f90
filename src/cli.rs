use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::signs::{compile, CompileReport, CompiledSignConfig, DefaultSignParser, ScanRegion};

#[derive(Parser)]
#[command(name = "fleet-operator")]
#[command(version)]
#[command(about = "Controller for a fleet of autonomous storage agents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration directory
    #[arg(short, long, default_value = "config", global = true, env = "OPERATOR_CONFIG_DIR")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and background services (default)
    Serve,
    /// Load and validate the configuration, then exit
    CheckConfig,
    /// Compile a JSON dump of scanned sign regions and print the result
    CompileSigns {
        /// File holding `{"scan_regions": [...]}` or a bare array of regions
        file: PathBuf,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScanDump {
    Wrapped { scan_regions: Vec<ScanRegion> },
    Bare(Vec<ScanRegion>),
}

/// Parse a scan dump in either accepted shape
pub fn parse_scan_dump(raw: &str) -> Result<Vec<ScanRegion>> {
    let regions = match serde_json::from_str::<ScanDump>(raw)? {
        ScanDump::Wrapped { scan_regions } => scan_regions,
        ScanDump::Bare(regions) => regions,
    };
    Ok(regions)
}

/// Compile a scan dump file with the default grammar
pub fn compile_signs_file(path: &Path) -> Result<(CompiledSignConfig, CompileReport)> {
    let raw = std::fs::read_to_string(path)?;
    let regions = parse_scan_dump(&raw)?;
    Ok(compile(&regions, &DefaultSignParser))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGION: &str = r#"{
        "signs": [{ "lines": ["[node]", "hub"], "location": { "vec3": { "x": 0, "y": 64, "z": 0 }, "dim": "Overworld" } }],
        "bounds": [{ "x": 0, "z": 0 }, { "x": 16, "z": 16 }],
        "dimension": "Overworld"
    }"#;

    #[test]
    fn test_scan_dump_shapes() {
        let wrapped = format!(r#"{{ "scan_regions": [{REGION}] }}"#);
        let bare = format!("[{REGION}]");
        assert_eq!(parse_scan_dump(&wrapped).unwrap(), parse_scan_dump(&bare).unwrap());
        assert!(parse_scan_dump("{}").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["fleet-operator", "compile-signs", "dump.json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CompileSigns { .. })));

        let cli = Cli::try_parse_from(["fleet-operator", "check-config", "--config", "/etc/op"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/op"));
    }
}
