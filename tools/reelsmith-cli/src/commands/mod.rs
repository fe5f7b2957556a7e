pub mod check;
pub mod plan;
pub mod preview;
pub mod render;
pub mod subs;

use std::path::Path;

use reelsmith_timeline_model::manifest::LoadedManifest;

/// Load and validate a manifest, warning about files that are missing.
pub fn load_manifest(path: &Path) -> anyhow::Result<LoadedManifest> {
    let loaded =
        LoadedManifest::load(path).map_err(|e| anyhow::anyhow!("Failed to load manifest: {e}"))?;
    loaded
        .validate()
        .map_err(|e| anyhow::anyhow!("Manifest is invalid: {e}"))?;
    for missing in loaded.missing_files() {
        tracing::warn!(path = %missing.display(), "Referenced file does not exist");
    }
    Ok(loaded)
}
