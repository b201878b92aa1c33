pub mod gc;
pub mod reset;
pub mod track;

use crate::FolderResults;
use crate::output;
use std::path::Path;

/// Print the failures in `results`, handing each success to `on_success`.
/// Returns how many folders failed.
pub fn report_outcomes<T>(
    results: FolderResults<T>,
    mut on_success: impl FnMut(&Path, T),
) -> usize {
    let mut failed = 0;
    for (folder, outcome) in results {
        match outcome {
            Ok(value) => on_success(&folder, value),
            Err(e) => {
                failed += 1;
                output::folder_failed(&e);
            }
        }
    }
    failed
}

/// Turn a failure count into the command's exit status
///
/// # Errors
///
/// Returns an error naming how many folders failed when any did
pub fn finish(failed: usize) -> anyhow::Result<()> {
    if failed > 0 {
        anyhow::bail!("{failed} folder(s) failed");
    }
    Ok(())
}
