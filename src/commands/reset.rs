use crate::Foam;
use crate::output;
use crate::restore::ApplyReport;
use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Reset the named folders, or every tracked folder when none are named
///
/// # Errors
///
/// Returns an error if the registry cannot be read or any folder failed
pub fn execute(foam: &Foam, folders: &[PathBuf], dry_run: bool) -> Result<()> {
    if dry_run {
        return preview(foam, folders);
    }

    let results = if folders.is_empty() {
        foam.reset_all()?
    } else {
        foam.reset(folders)
    };
    if results.is_empty() {
        output::note("No folders are tracked");
    }

    let failed = super::report_outcomes(results, print_report);
    super::finish(failed)
}

fn print_report(folder: &Path, report: ApplyReport) {
    if report.is_noop() {
        output::folder_unchanged(folder);
        return;
    }

    output::folder_done("Reset", folder, &format!("{} operation(s)", report.applied));
    let counters = [
        ("directories created", report.dirs_created),
        ("directories removed", report.dirs_removed),
        ("files written", report.files_written),
        ("files removed", report.files_removed),
        ("symlinks created", report.symlinks_created),
        ("symlinks removed", report.symlinks_removed),
        ("modes set", report.modes_set),
    ];
    for (label, count) in counters.into_iter().filter(|(_, count)| *count > 0) {
        output::detail(&format!("{count} {label}"));
    }
}

/// Print the edit script each folder's reset would apply
fn preview(foam: &Foam, folders: &[PathBuf]) -> Result<()> {
    let targets: Vec<PathBuf> = if folders.is_empty() {
        foam.list_tracked()?.into_iter().map(|info| info.folder).collect()
    } else {
        folders.to_vec()
    };

    let mut failed = 0;
    for folder in &targets {
        match foam.status(folder) {
            Ok(script) if script.is_empty() => output::folder_unchanged(folder),
            Ok(script) => {
                println!("{}", folder.display().to_string().bold());
                script.iter().for_each(output::script_op);
            }
            Err(e) => {
                failed += 1;
                output::folder_failed(&e);
            }
        }
    }
    super::finish(failed)
}
