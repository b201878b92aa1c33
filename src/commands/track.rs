use crate::Foam;
use crate::output;
use crate::utils::format_size;
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

/// Capture each folder, replacing any earlier capture
///
/// # Errors
///
/// Returns an error if no folder was given or any folder failed to track
pub fn execute(foam: &Foam, folders: &[PathBuf]) -> Result<()> {
    if folders.is_empty() {
        anyhow::bail!("Nothing to track: name at least one folder, or use --list or --undo");
    }

    let failed = super::report_outcomes(foam.track(folders), |folder, summary| {
        let verb = if summary.replaced { "Retracked" } else { "Tracked" };
        output::folder_done(
            verb,
            folder,
            &format!("{} entries, {}", summary.entries, format_size(summary.bytes)),
        );
        output::detail(&format!(
            "manifest {} with {} new blob(s)",
            summary.manifest, summary.new_blobs
        ));
    });
    super::finish(failed)
}

/// Print every tracked folder with its retained capture
///
/// # Errors
///
/// Returns an error if the registry or a retained manifest cannot be read
pub fn execute_list(foam: &Foam) -> Result<()> {
    let tracked = foam.list_tracked()?;
    if tracked.is_empty() {
        output::note("No folders are tracked");
        return Ok(());
    }

    for info in tracked {
        println!(
            "{}  {}  {} entries, {}",
            info.folder.display().to_string().bold(),
            info.captured_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
                .dimmed(),
            info.entries,
            format_size(info.bytes)
        );
    }
    Ok(())
}

/// Stop tracking every folder and release the stored data
///
/// # Errors
///
/// Returns an error if the registry cannot be cleared or collection fails
pub fn execute_undo(foam: &Foam) -> Result<()> {
    let summary = foam.undo()?;
    let released = format!(
        "released {} blob(s), {} manifest(s)",
        summary.gc.blobs_removed, summary.gc.manifests_removed
    );
    for folder in &summary.cleared {
        output::folder_done("Untracked", folder, &released);
    }
    if summary.cleared.is_empty() {
        output::note("No folders are tracked");
    }
    Ok(())
}
