use std::path::Path;

use anyhow::Result;

use cadence_config::validate::{self, Severity};

use crate::jobs;

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate the config file and, if given, a job list. Exits non-zero on
/// errors.
pub fn check(config_path: Option<&Path>, jobs_path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(config_path);

    // Print which file we're checking
    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
        }
        shown += 1;
    }

    let mut errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if let Some(path) = jobs_path {
        match jobs::load_jobs(path) {
            Ok(jobs) => {
                let suspended = jobs.iter().filter(|j| j.is_suspended()).count();
                eprintln!(
                    "  {} job(s) in {} ({suspended} suspended)",
                    jobs.len(),
                    path.display()
                );
            },
            Err(e) => {
                eprintln!("  {BOLD}{RED}error{RESET} {}: {e:#}", path.display());
                errors += 1;
            },
        }
        shown += 1;
    }

    if shown > 0 {
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
