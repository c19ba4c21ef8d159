use std::fs;
use std::path::Path;

use log::info;

use crate::artifacts::{require, ArtifactLayout};
use crate::errors::{PipelineError, PipelineResult};
use crate::headers::R1csHeader;
use crate::toolchain::Toolchain;

/// Compiles `<circuits_dir>/<name>.circom` into the circuit's build directory.
///
/// The compiler writes into a scratch directory next to the final outputs,
/// which are only moved into place once all three exist.
pub fn run<T: Toolchain>(toolchain: &T, layout: &ArtifactLayout) -> PipelineResult<R1csHeader> {
    let source = layout.source();
    require("circuit source", &source)?;
    layout.ensure_dir()?;

    let scratch = tempfile::Builder::new()
        .prefix(".compile.")
        .tempdir_in(layout.dir())
        .map_err(|e| PipelineError::io(layout.dir(), e))?;
    toolchain.compile(&source, scratch.path())?;

    let outputs = [
        ("constraint system", layout.r1cs()),
        ("symbol file", layout.sym()),
        ("witness program", layout.wasm_dir()),
    ];
    for (artifact, target) in outputs {
        let produced = scratch.path().join(target.file_name().unwrap_or_default());
        require(artifact, &produced)?;
        replace(&produced, &target)?;
    }
    require("witness program", &layout.wasm())?;

    let header = R1csHeader::read(&layout.r1cs())?;
    info!(
        "Compiled {}: {} constraints, {} wires, {} public signals, {} private inputs",
        layout.name(),
        header.n_constraints,
        header.n_wires,
        header.n_public(),
        header.n_prv_in
    );
    Ok(header)
}

fn replace(from: &Path, to: &Path) -> PipelineResult<()> {
    if to.is_dir() {
        fs::remove_dir_all(to).map_err(|e| PipelineError::io(to, e))?;
    }
    fs::rename(from, to).map_err(|e| PipelineError::io(to, e))
}
