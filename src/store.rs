//! On-disk output: one canonical JSON document per meeting id, plus optional
//! raw XML and metadata sidecars under `xml/`.
//!
//! ```text
//! output/
//!   {id}.json
//!   xml/{id}.xml
//!   xml/{id}.metadata.json
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::error::PersistenceError;
use crate::model::{DocumentMetadata, TranscriptDocument};

const RAW_DIR: &str = "xml";
const METADATA_MARKER: &str = "scraper-metadata:base64:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidecarOutcome {
    pub raw: WriteOutcome,
    pub metadata: WriteOutcome,
}

impl SidecarOutcome {
    pub fn wrote_any(&self) -> bool {
        self.raw == WriteOutcome::Written || self.metadata == WriteOutcome::Written
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub documents: usize,
    pub raw_documents: usize,
    pub metadata_files: usize,
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    raw_dir: PathBuf,
    overwrite: bool,
    keep_raw: bool,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let raw_dir = root.join(RAW_DIR);
        Self {
            root,
            raw_dir,
            overwrite: false,
            keep_raw: true,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn keep_raw(mut self, keep_raw: bool) -> Self {
        self.keep_raw = keep_raw;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn overwrites(&self) -> bool {
        self.overwrite
    }

    pub fn keeps_raw(&self) -> bool {
        self.keep_raw
    }

    pub fn record_path(&self, meeting_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(meeting_id)))
    }

    pub fn raw_path(&self, meeting_id: &str) -> PathBuf {
        self.raw_dir.join(format!("{}.xml", file_stem(meeting_id)))
    }

    pub fn metadata_path(&self, meeting_id: &str) -> PathBuf {
        self.raw_dir.join(format!("{}.metadata.json", file_stem(meeting_id)))
    }

    pub fn exists(&self, meeting_id: &str) -> bool {
        self.record_path(meeting_id).is_file()
    }

    pub fn raw_exists(&self, meeting_id: &str) -> bool {
        self.raw_path(meeting_id).is_file()
    }

    /// True when a job for this id can be skipped without any network work.
    pub fn is_satisfied(&self, meeting_id: &str) -> bool {
        !self.overwrite && self.exists(meeting_id)
    }

    pub fn write_document(&self, doc: &TranscriptDocument) -> Result<WriteOutcome, PersistenceError> {
        let path = self.record_path(&doc.meeting_id);
        if !self.overwrite && path.is_file() {
            return Ok(WriteOutcome::Skipped);
        }
        let json = serde_json::to_vec_pretty(doc)
            .map_err(|e| PersistenceError::Serialize(doc.meeting_id.clone(), e))?;
        write_atomic(&path, &json)?;
        debug!(meeting_id = %doc.meeting_id, path = %path.display(), "document written");
        Ok(WriteOutcome::Written)
    }

    /// Write the raw document copy and the metadata snapshot. Each is skipped
    /// on its own if already present, unless overwriting.
    pub fn write_raw_sidecars(
        &self,
        meeting_id: &str,
        raw_text: &str,
        metadata: &DocumentMetadata,
    ) -> Result<SidecarOutcome, PersistenceError> {
        let meta_json = serde_json::to_vec_pretty(metadata)
            .map_err(|e| PersistenceError::Serialize(meeting_id.to_string(), e))?;

        let raw_path = self.raw_path(meeting_id);
        let raw = if !self.overwrite && raw_path.is_file() {
            WriteOutcome::Skipped
        } else {
            let annotated = annotate_raw(raw_text, &meta_json);
            write_atomic(&raw_path, annotated.as_bytes())?;
            WriteOutcome::Written
        };

        let meta_path = self.metadata_path(meeting_id);
        let metadata = if !self.overwrite && meta_path.is_file() {
            WriteOutcome::Skipped
        } else {
            write_atomic(&meta_path, &meta_json)?;
            WriteOutcome::Written
        };

        Ok(SidecarOutcome { raw, metadata })
    }

    pub fn read_document(&self, meeting_id: &str) -> Result<TranscriptDocument, PersistenceError> {
        read_json(&self.record_path(meeting_id))
    }

    /// Meeting ids of every canonical document, sorted.
    pub fn list_ids(&self) -> Result<Vec<String>, PersistenceError> {
        let mut ids: Vec<String> = stems_with_suffix(&self.root, ".json")?
            .iter()
            .filter_map(|stem| meeting_id_of(stem))
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn stats(&self) -> Result<StoreStats, PersistenceError> {
        Ok(StoreStats {
            documents: stems_with_suffix(&self.root, ".json")?.len(),
            raw_documents: stems_with_suffix(&self.raw_dir, ".xml")?.len(),
            metadata_files: stems_with_suffix(&self.raw_dir, ".metadata.json")?.len(),
        })
    }
}

/// Ids become file names. `[A-Za-z0-9-]` is kept; every other byte of the
/// id, `_` included, is written as `_XX` (uppercase hex), so distinct ids
/// never share a file.
fn file_stem(meeting_id: &str) -> String {
    let mut stem = String::with_capacity(meeting_id.len());
    for b in meeting_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            stem.push(char::from(b));
        } else {
            stem.push_str(&format!("_{:02X}", b));
        }
    }
    stem
}

/// Inverse of [`file_stem`]. `None` for names this store did not write.
fn meeting_id_of(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write to a temp file in the target directory, then rename over the target.
/// Readers never observe a partially written file.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_error(parent, e))?;
    tmp.write_all(data).map_err(|e| io_error(path, e))?;
    tmp.flush().map_err(|e| io_error(path, e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

fn read_json(path: &Path) -> Result<TranscriptDocument, PersistenceError> {
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Corrupt {
        path: path.display().to_string(),
        source,
    })
}

/// Stems of regular files in `dir` ending in `suffix`. A missing directory is empty.
fn stems_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<String>, PersistenceError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir, e)),
    };
    let mut stems = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        // `.json` must not also count `x.metadata.json`.
        if suffix == ".json" && name.ends_with(".metadata.json") {
            continue;
        }
        if let Some(stem) = name.strip_suffix(suffix) {
            stems.push(stem.to_string());
        }
    }
    Ok(stems)
}

/// Embed the metadata JSON as a base64 comment right after the XML
/// declaration, or at the very top when there is none.
pub fn annotate_raw(raw_text: &str, metadata_json: &[u8]) -> String {
    let comment = format!("<!-- {}{} -->", METADATA_MARKER, STANDARD.encode(metadata_json));
    let body = raw_text.trim_start_matches('\u{feff}');
    if body.starts_with("<?xml") {
        if let Some(end) = body.find("?>") {
            let (decl, rest) = body.split_at(end + 2);
            return format!("{}\n{}{}", decl, comment, rest);
        }
    }
    format!("{}\n{}", comment, body)
}

/// Recover the metadata embedded by [`annotate_raw`], if any.
pub fn embedded_metadata(raw_text: &str) -> Option<DocumentMetadata> {
    let start = raw_text.find(METADATA_MARKER)? + METADATA_MARKER.len();
    let end = start + raw_text[start..].find("-->")?;
    let bytes = STANDARD.decode(raw_text[start..end].trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}
