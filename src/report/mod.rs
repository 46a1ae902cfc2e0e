//! Result-file persistence: directory layout, artifact naming, and
//! human-readable throughput formatting.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Timestamp token used in run directories and artifact names.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Write text to `path`, creating parent directories as needed.
/// Overwrites an existing file.
pub fn save(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Make a display name safe as a single path component.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' || c == '/' { '_' } else { c })
        .collect()
}

/// Root directory for one full run-all pass.
pub fn run_dir(results_root: &Path) -> PathBuf {
    results_root.join(format!("full_test_run_{}", timestamp()))
}

/// Per-test directory inside a run directory, e.g. `04_TCP_Unidirectional...`.
pub fn test_dir(run_dir: &Path, ordinal: usize, test_name: &str) -> PathBuf {
    run_dir.join(format!("{:02}_{}", ordinal, sanitize(test_name)))
}

/// Path for one measurement artifact under `dir`.
pub fn artifact_path(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!("{}_{}.json", sanitize(prefix), timestamp()))
}

/// Human-readable bits/sec.
pub fn pretty_bps(bps: f64) -> String {
    if bps >= 1e9 {
        format!("{:.2} Gbps", bps / 1e9)
    } else if bps >= 1e6 {
        format!("{:.2} Mbps", bps / 1e6)
    } else if bps >= 1e3 {
        format!("{:.2} Kbps", bps / 1e3)
    } else {
        format!("{:.2} bps", bps)
    }
}
