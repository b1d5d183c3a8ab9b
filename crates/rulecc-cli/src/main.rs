//! rulecc CLI - Command-line interface for rulecc-core
//!
//! ARCHITECTURE: Thin I/O layer over rulecc-core library.
//! This binary handles:
//! - File I/O (reading the YAML document, writing the JSON outputs)
//! - CLI argument parsing (clap)
//! - Process exit codes

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

/// rulecc - compile a YAML security-rules document into realtime-database
/// JSON rules
#[derive(Parser, Debug)]
#[command(name = "rulecc")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:\n  \
    rulecc rules.yaml                  Compile rules.yaml into rules.json\n  \
    rulecc rules.yaml -o out.json      Compile into an explicit output path\n")]
struct Args {
    /// Input YAML document
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output path for the compiled rules (default: input path with
    /// .yaml/.yml replaced by .json)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let document: serde_yaml::Value = serde_yaml::from_str(&source)
        .with_context(|| format!("failed to parse {} as YAML", args.input.display()))?;

    let compiled = rulecc_core::compile_value(&document)
        .with_context(|| format!("failed to compile {}", args.input.display()))?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    let rules_json = serde_json::to_string_pretty(&json!({ "rules": compiled.rules }))
        .context("failed to serialize rules as JSON")?;
    fs::write(&output_path, rules_json)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    if let Some(firecrypt) = compiled.firecrypt {
        let firecrypt_path = firecrypt_output_path(&output_path);
        let firecrypt_json = serde_json::to_string_pretty(&json!({ "rules": firecrypt }))
            .context("failed to serialize firecrypt as JSON")?;
        fs::write(&firecrypt_path, firecrypt_json)
            .with_context(|| format!("failed to write {}", firecrypt_path.display()))?;
    }

    Ok(())
}

/// Replaces a `.yaml`/`.yml` extension with `.json`; appends `.json` if the
/// input had neither.
fn default_output_path(input: &Path) -> PathBuf {
    match input.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => input.with_extension("json"),
        _ => {
            let mut name = input.as_os_str().to_os_string();
            name.push(".json");
            PathBuf::from(name)
        }
    }
}

/// Derives `<stem>_firecrypt.json` from the rules output path.
fn firecrypt_output_path(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("rules");
    let mut name = stem.to_string();
    name.push_str("_firecrypt.json");
    match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}
