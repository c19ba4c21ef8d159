use std::path::{Path, PathBuf};

use log::info;

use crate::artifacts::{copy_atomic, require, ArtifactLayout};
use crate::errors::PipelineResult;
use crate::stages::ceremony::CeremonyManifest;

/// Copies the browser-facing artifacts (witness program, final proving key,
/// verification key) to `<publish_dir>/<name>_js/`. Originals stay in place.
pub fn run(layout: &ArtifactLayout, publish_dir: &Path) -> PipelineResult<PathBuf> {
    let zkey = CeremonyManifest::load(layout)?.final_zkey_path(layout)?;
    let sources = [
        ("witness program", layout.wasm()),
        ("proving key", zkey),
        ("verification key", layout.verification_key()),
    ];
    for (artifact, path) in &sources {
        require(*artifact, path)?;
    }

    let target = publish_dir.join(format!("{}_js", layout.name()));
    for (_, path) in &sources {
        let name = path.file_name().unwrap_or_default();
        copy_atomic(path, &target.join(name))?;
    }
    info!("Published {} artifacts to {}", layout.name(), target.display());
    Ok(target)
}
