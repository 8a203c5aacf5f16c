// CLI command handlers
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};

use crate::error::FileOutcome;
use crate::walker::{process_path, Exclusions};

/// Walks every input path, logging one outcome line per `.class` entry
/// found (a bare `.class` path yields one, a `.jar` one per member).
/// Returns `true` if any file failed — `main` turns that into the process
/// exit code — without aborting the remaining path list.
pub fn run(paths: &[PathBuf], exclusions: &Exclusions) -> bool {
    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap(),
    );

    let mut any_failed = false;
    for path in paths {
        pb.set_message(path.display().to_string());
        for (name, outcome) in process_path(path, exclusions) {
            any_failed |= report(&name, &outcome);
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");
    any_failed
}

fn report(name: &str, outcome: &FileOutcome) -> bool {
    match outcome {
        FileOutcome::Transformed { methods_split } => info!("{name}: split {methods_split} method(s)"),
        FileOutcome::Unchanged => debug!("{name}: unchanged"),
        FileOutcome::Skipped { reason } => debug!("{name}: skipped ({reason})"),
        FileOutcome::Failed(e) => error!("{name}: {e}"),
    }
    outcome.is_failure()
}
