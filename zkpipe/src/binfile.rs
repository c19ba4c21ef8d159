//! Reader for the sectioned binary container shared by `.r1cs`, `.wtns`,
//! `.zkey` and `.ptau` files.
//!
//! ```text
//! magic[4] | version u32 | n_sections u32 | (type u32 | size u64 | data[size])*
//! ```
//!
//! All integers are little-endian. Only the section table is read eagerly;
//! section bodies are loaded on demand so large ptau files are never pulled
//! into memory just to inspect their header.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::errors::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy)]
struct SectionEntry {
    kind: u32,
    offset: u64,
    size: u64,
}

#[derive(Debug)]
pub struct BinFile<R> {
    reader: R,
    version: u32,
    sections: Vec<SectionEntry>,
}

impl BinFile<BufReader<File>> {
    /// Opens `path` and checks its magic. Errors are tagged with `artifact`.
    pub fn open(path: &Path, magic: &[u8; 4], artifact: &'static str) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::ArtifactMissing {
                artifact,
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        BinFile::from_reader(BufReader::new(file), magic)
            .map_err(|reason| PipelineError::format(artifact, path, reason))
    }
}

impl<R: Read + Seek> BinFile<R> {
    pub fn from_reader(mut reader: R, magic: &[u8; 4]) -> Result<Self, String> {
        let mut found = [0u8; 4];
        reader
            .read_exact(&mut found)
            .map_err(|_| "file too short for magic".to_string())?;
        if &found != magic {
            return Err(format!(
                "bad magic {:?}, expected {:?}",
                String::from_utf8_lossy(&found),
                String::from_utf8_lossy(magic)
            ));
        }
        let version = read_u32(&mut reader)?;
        let n_sections = read_u32(&mut reader)?;

        let end = reader
            .seek(SeekFrom::End(0))
            .map_err(|e| format!("seek failed: {}", e))?;
        let table = 12 + 12 * u64::from(n_sections);
        if end < table {
            return Err(format!(
                "truncated: {} section headers need {} bytes, file has {}",
                n_sections, table, end
            ));
        }
        reader
            .seek(SeekFrom::Start(12))
            .map_err(|e| format!("seek failed: {}", e))?;

        let mut sections = Vec::with_capacity(n_sections as usize);
        let mut offset = 12u64;
        for _ in 0..n_sections {
            let kind = read_u32(&mut reader)?;
            let size = read_u64(&mut reader)?;
            offset += 12;
            sections.push(SectionEntry { kind, offset, size });
            offset = offset
                .checked_add(size)
                .ok_or_else(|| "section size overflow".to_string())?;
            reader
                .seek(SeekFrom::Start(offset))
                .map_err(|e| format!("seek failed: {}", e))?;
        }
        if end < offset {
            return Err(format!(
                "truncated: section table needs {} bytes, file has {}",
                offset, end
            ));
        }

        Ok(Self {
            reader,
            version,
            sections,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn has_section(&self, kind: u32) -> bool {
        self.sections.iter().any(|s| s.kind == kind)
    }

    pub fn section_size(&self, kind: u32) -> Option<u64> {
        self.find(kind).map(|s| s.size)
    }

    /// Reads at most `limit` bytes from the start of section `kind`.
    pub fn read_section(&mut self, kind: u32, limit: Option<usize>) -> Result<Vec<u8>, String> {
        let entry = self
            .find(kind)
            .ok_or_else(|| format!("section {} not present", kind))?;
        let len = match limit {
            Some(limit) => (limit as u64).min(entry.size),
            None => entry.size,
        };
        self.reader
            .seek(SeekFrom::Start(entry.offset))
            .map_err(|e| format!("seek failed: {}", e))?;
        let mut buf = vec![0u8; len as usize];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| format!("section {} truncated: {}", kind, e))?;
        Ok(buf)
    }

    fn find(&self, kind: u32) -> Option<SectionEntry> {
        self.sections.iter().copied().find(|s| s.kind == kind)
    }
}

/// Serializes a container. Used to produce fixture artifacts.
pub fn write_binfile(magic: &[u8; 4], version: u32, sections: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(magic);
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&(sections.len() as u32).to_le_bytes());
    for (kind, data) in sections {
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&(data.len() as u64).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

/// Little-endian cursor over a section body.
pub struct SectionCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SectionCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                format!(
                    "section ends at byte {}, needed {} more at {}",
                    self.buf.len(),
                    n,
                    self.pos
                )
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn u32(&mut self) -> Result<u32, String> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.bytes(4)?);
        Ok(u32::from_le_bytes(word))
    }

    pub fn u64(&mut self) -> Result<u64, String> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(word))
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, String> {
    let mut word = [0u8; 4];
    reader
        .read_exact(&mut word)
        .map_err(|_| "unexpected end of file".to_string())?;
    Ok(u32::from_le_bytes(word))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, String> {
    let mut word = [0u8; 8];
    reader
        .read_exact(&mut word)
        .map_err(|_| "unexpected end of file".to_string())?;
    Ok(u64::from_le_bytes(word))
}
