//! Where every artifact of a circuit lives, and how it gets written.
//!
//! Each circuit owns `<build_dir>/<name>/`, so runs for different circuits
//! never touch the same files. Everything the pipeline writes itself goes
//! through [`write_atomic`]; outputs of external tools are produced at a
//! temporary sibling path and renamed into place with [`produce`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use sha2::{Digest, Sha256};

use crate::errors::{PipelineError, PipelineResult};

pub const VERIFICATION_KEY_FILE: &str = "verification_key.json";
pub const WITNESS_FILE: &str = "witness.wtns";
pub const PROOF_FILE: &str = "proof.json";
pub const PUBLIC_FILE: &str = "public.json";
pub const CALLDATA_FILE: &str = "calldata.txt";
pub const MANIFEST_FILE: &str = "ceremony.json";

#[derive(Clone, Debug)]
pub struct ArtifactLayout {
    name: String,
    source_dir: PathBuf,
    dir: PathBuf,
    ptau_power: u32,
    verifier_file: String,
}

impl ArtifactLayout {
    /// Layout for circuit `name`. Rejects names that could escape the build directory.
    pub fn new(
        name: &str,
        source_dir: &Path,
        build_dir: &Path,
        ptau_power: u32,
        verifier_file: &str,
    ) -> PipelineResult<Self> {
        validate_circuit_name(name)?;
        Ok(Self {
            name: name.to_string(),
            source_dir: source_dir.to_path_buf(),
            dir: build_dir.join(name),
            ptau_power,
            verifier_file: verifier_file.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> PipelineResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))
    }

    pub fn source(&self) -> PathBuf {
        self.source_dir.join(format!("{}.circom", self.name))
    }

    pub fn r1cs(&self) -> PathBuf {
        self.dir.join(format!("{}.r1cs", self.name))
    }

    pub fn sym(&self) -> PathBuf {
        self.dir.join(format!("{}.sym", self.name))
    }

    pub fn wasm_dir(&self) -> PathBuf {
        self.dir.join(format!("{}_js", self.name))
    }

    pub fn wasm(&self) -> PathBuf {
        self.wasm_dir().join(format!("{}.wasm", self.name))
    }

    /// `potPP_NNNN.ptau`, where index 0 is the fresh accumulator.
    pub fn ptau(&self, index: u32) -> PathBuf {
        self.dir
            .join(format!("pot{:02}_{:04}.ptau", self.ptau_power, index))
    }

    pub fn ptau_final(&self) -> PathBuf {
        self.dir.join(format!("pot{:02}_final.ptau", self.ptau_power))
    }

    /// `<name>_NNNN.zkey`, where index 0 is the key straight out of setup.
    pub fn zkey(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{}_{:04}.zkey", self.name, index))
    }

    pub fn verification_key(&self) -> PathBuf {
        self.dir.join(VERIFICATION_KEY_FILE)
    }

    pub fn witness(&self) -> PathBuf {
        self.dir.join(WITNESS_FILE)
    }

    pub fn proof(&self) -> PathBuf {
        self.dir.join(PROOF_FILE)
    }

    pub fn public(&self) -> PathBuf {
        self.dir.join(PUBLIC_FILE)
    }

    pub fn calldata(&self) -> PathBuf {
        self.dir.join(CALLDATA_FILE)
    }

    pub fn manifest(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn verifier_contract(&self) -> PathBuf {
        self.dir.join(&self.verifier_file)
    }
}

pub fn validate_circuit_name(name: &str) -> PipelineResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Usage(format!(
            "invalid circuit name `{}`: use letters, digits, `_` or `-`",
            name
        )))
    }
}

/// Fails with `ArtifactMissing` unless `path` exists.
pub fn require(artifact: &'static str, path: &Path) -> PipelineResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::ArtifactMissing {
            artifact,
            path: path.to_path_buf(),
        })
    }
}

/// Writes `contents` to a temporary file next to `path`, then renames it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> PipelineResult<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PipelineError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::io(path, e.error))?;
    debug!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| PipelineError::json(path, e))?;
    write_atomic(path, &json)
}

pub fn read_json<T: serde::de::DeserializeOwned>(
    artifact: &'static str,
    path: &Path,
) -> PipelineResult<T> {
    require(artifact, path)?;
    let bytes = fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| PipelineError::json(path, e))
}

/// Runs `step` against a temporary sibling of `path` and renames the result into place.
///
/// If `step` fails, or leaves nothing behind, the temporary file is removed
/// and `path` is untouched.
pub fn produce<T>(
    artifact: &'static str,
    path: &Path,
    step: impl FnOnce(&Path) -> PipelineResult<T>,
) -> PipelineResult<T> {
    let tmp = partial_path(path);
    let outcome = step(&tmp);
    let value = match outcome {
        Ok(value) => value,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };
    if !tmp.exists() {
        return Err(PipelineError::ArtifactMissing {
            artifact,
            path: tmp,
        });
    }
    fs::rename(&tmp, path).map_err(|e| PipelineError::io(path, e))?;
    debug!("Produced {} at {}", artifact, path.display());
    Ok(value)
}

/// Temporary name used while an artifact is being produced, keeping its extension.
pub fn partial_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent_dir(path).join(format!(".partial.{}", file_name))
}

/// Hex SHA-256 of a file's contents.
pub fn file_digest(path: &Path) -> PipelineResult<String> {
    let mut file = fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| PipelineError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Copies `from` to `to` through a temporary file so `to` is never half-written.
pub fn copy_atomic(from: &Path, to: &Path) -> PipelineResult<()> {
    let dir = parent_dir(to);
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
    fs::copy(from, tmp.path()).map_err(|e| PipelineError::io(from, e))?;
    tmp.persist(to).map_err(|e| PipelineError::io(to, e.error))?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
