use std::path::Path;

use {anyhow::Result, synebot_config::Severity};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Load the configuration the bot would run with and report problems.
///
/// Exits with status 1 when any error is found.
pub fn check(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => match synebot_config::find_config_file() {
            Some(found) => eprintln!("Checking {}\n", found.display()),
            None => eprintln!("No config file found; checking defaults and environment.\n"),
        },
    }

    let config = crate::load_config(path)?;
    let result = synebot_config::validate(&config);

    // Secrets serialize as "[REDACTED]".
    println!("{}", serde_json::to_string_pretty(&config)?);

    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        eprintln!(
            "  {BOLD}{color}{}{RESET} {}: {}",
            d.severity, d.path, d.message
        );
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
