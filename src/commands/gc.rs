use crate::Foam;
use crate::output;
use anyhow::Result;

/// Delete stored data no tracked folder references
///
/// # Errors
///
/// Returns an error if the store stays busy or a retained manifest is unreadable
pub fn execute(foam: &Foam) -> Result<()> {
    let report = foam.gc()?;
    if report.blobs_removed == 0 && report.manifests_removed == 0 {
        output::note("Nothing to collect");
    } else {
        output::note(&format!(
            "Removed {} blob(s) and {} manifest(s)",
            report.blobs_removed, report.manifests_removed
        ));
    }
    Ok(())
}
