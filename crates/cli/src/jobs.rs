//! Job list files: `{ jobs = [ { id, spec, schedule, suspended }, ... ] }`.

use std::{collections::HashSet, path::Path};

use {
    anyhow::{Context, Result, bail},
    cadence_batch::JobSpec,
    serde::Deserialize,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobsFile {
    #[serde(default)]
    jobs: Vec<JobSpec>,
}

/// Load and parse a TOML/YAML/JSON job list. Ids must be unique.
pub fn load_jobs(path: &Path) -> Result<Vec<JobSpec>> {
    let value = cadence_config::load_value(path)?;
    let file: JobsFile = serde_json::from_value(value)
        .with_context(|| format!("invalid job list {}", path.display()))?;

    let mut seen = HashSet::new();
    for job in &file.jobs {
        if !seen.insert(job.id()) {
            bail!("duplicate job id '{}' in {}", job.id(), path.display());
        }
    }
    Ok(file.jobs)
}
