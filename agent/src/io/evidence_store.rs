//! Content-addressed evidence store with an append-only integrity log.
//!
//! Layout under the store root:
//!
//! - `blobs/<sha256>`: raw body bytes, write-once.
//! - `meta/<sha256>.json`: fetch metadata, write-once, stable key order.
//! - `meta/<sha256>.envelopes.jsonl`: integrity envelopes, append-only. A
//!   record is committed once its newline is on disk; an unterminated tail
//!   left by a crash is ignored on read and dropped by the next append.
//! - `meta/<sha256>.state`: current lifecycle token, overwritten.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use crate::core::lifecycle::{EvidenceState, IntegrityEnvelope};
use crate::core::types::FetchedPage;

/// Persisted fetch metadata. Fields are declared in key order so the JSON is
/// stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    pub body_sha256: String,
    pub body_size: u64,
    pub headers: BTreeMap<String, String>,
    pub status: u16,
    pub url: String,
}

#[derive(Debug)]
pub struct EvidenceStore {
    root: PathBuf,
    blobs_dir: PathBuf,
    meta_dir: PathBuf,
    // Serializes envelope appends and the state writes that depend on them.
    log_lock: Mutex<()>,
}

impl EvidenceStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let blobs_dir = root.join("blobs");
        let meta_dir = root.join("meta");
        fs::create_dir_all(&blobs_dir)
            .with_context(|| format!("create blob dir {}", blobs_dir.display()))?;
        fs::create_dir_all(&meta_dir)
            .with_context(|| format!("create meta dir {}", meta_dir.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            blobs_dir,
            meta_dir,
            log_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a fetched page and return its evidence id (sha256 of the body).
    ///
    /// Blob and metadata are each committed only if absent; repeating a write
    /// with identical content is a no-op.
    #[instrument(skip_all, fields(url = %page.url, body_size = page.body.len()))]
    pub fn write(&self, page: &FetchedPage) -> Result<String> {
        let evidence_id = hex::encode(Sha256::digest(&page.body));

        let blob_path = self.blob_path(&evidence_id);
        let blob_written = create_if_absent(&blob_path, &page.body)?;

        let metadata = EvidenceMetadata {
            body_sha256: evidence_id.clone(),
            body_size: page.body.len() as u64,
            headers: page.headers.clone(),
            status: page.status,
            url: page.url.clone(),
        };
        let mut buf = serde_json::to_string_pretty(&metadata).context("serialize metadata")?;
        buf.push('\n');
        let meta_written = create_if_absent(&self.metadata_path(&evidence_id), buf.as_bytes())?;

        debug!(%evidence_id, blob_written, meta_written, "evidence persisted");
        Ok(evidence_id)
    }

    /// Append one envelope to the evidence id's integrity log, fsynced.
    ///
    /// Fails if the envelope is incomplete or belongs to another evidence id.
    pub fn append_envelope(&self, evidence_id: &str, envelope: &IntegrityEnvelope) -> Result<()> {
        ensure_evidence_id(evidence_id)?;
        let missing = envelope.missing_fields();
        if !missing.is_empty() {
            bail!(
                "integrity envelope for {evidence_id} missing required fields: {}",
                missing.join(", ")
            );
        }
        if envelope.evidence_id != evidence_id {
            bail!(
                "integrity envelope evidence_id {} does not match {evidence_id}",
                envelope.evidence_id
            );
        }

        let mut line = serde_json::to_string(envelope).context("serialize envelope")?;
        line.push('\n');

        let path = self.envelopes_path(evidence_id);
        let _guard = self
            .log_lock
            .lock()
            .map_err(|_| anyhow!("evidence log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open envelope log {}", path.display()))?;
        drop_torn_tail(&mut file, &path)?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append envelope {}", path.display()))?;
        file.sync_all()
            .with_context(|| format!("sync envelope log {}", path.display()))?;
        Ok(())
    }

    /// Overwrite the current lifecycle token for an evidence id.
    pub fn write_state(&self, evidence_id: &str, state: EvidenceState) -> Result<()> {
        ensure_evidence_id(evidence_id)?;
        let path = self.state_path(evidence_id);
        let _guard = self
            .log_lock
            .lock()
            .map_err(|_| anyhow!("evidence log lock poisoned"))?;
        let mut tmp = NamedTempFile::new_in(&self.meta_dir)
            .with_context(|| format!("create temp state in {}", self.meta_dir.display()))?;
        tmp.write_all(state.as_token().as_bytes())
            .context("write state token")?;
        tmp.as_file().sync_all().context("sync state token")?;
        tmp.persist(&path)
            .map_err(|err| err.error)
            .with_context(|| format!("replace state {}", path.display()))?;
        Ok(())
    }

    pub fn read_metadata(&self, evidence_id: &str) -> Result<EvidenceMetadata> {
        ensure_evidence_id(evidence_id)?;
        let path = self.metadata_path(evidence_id);
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
    }

    pub fn read_blob(&self, evidence_id: &str) -> Result<Vec<u8>> {
        ensure_evidence_id(evidence_id)?;
        let path = self.blob_path(evidence_id);
        fs::read(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Full envelope history, oldest first. Missing log yields an empty list.
    ///
    /// Only newline-terminated records count; a torn final record is skipped.
    pub fn read_envelopes(&self, evidence_id: &str) -> Result<Vec<IntegrityEnvelope>> {
        ensure_evidence_id(evidence_id)?;
        let path = self.envelopes_path(evidence_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        let committed = committed_len(&bytes);
        if committed < bytes.len() {
            warn!(
                path = %path.display(),
                torn_bytes = bytes.len() - committed,
                "ignoring unterminated envelope record"
            );
        }
        let contents = std::str::from_utf8(&bytes[..committed])
            .with_context(|| format!("decode {}", path.display()))?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(idx, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("parse {} line {}", path.display(), idx + 1))
            })
            .collect()
    }

    /// Current lifecycle state. Missing or unrecognized tokens yield `None`.
    pub fn read_state(&self, evidence_id: &str) -> Result<Option<EvidenceState>> {
        ensure_evidence_id(evidence_id)?;
        let path = self.state_path(evidence_id);
        match fs::read_to_string(&path) {
            Ok(token) => Ok(EvidenceState::from_token(&token)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    /// Committed evidence ids, sorted.
    pub fn evidence_ids(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.blobs_dir)
            .with_context(|| format!("read blob dir {}", self.blobs_dir.display()))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry =
                entry.with_context(|| format!("read blob dir {}", self.blobs_dir.display()))?;
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str()
                && is_evidence_id(name)
            {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn blob_path(&self, evidence_id: &str) -> PathBuf {
        self.blobs_dir.join(evidence_id)
    }

    pub fn metadata_path(&self, evidence_id: &str) -> PathBuf {
        self.meta_dir.join(format!("{evidence_id}.json"))
    }

    pub fn envelopes_path(&self, evidence_id: &str) -> PathBuf {
        self.meta_dir.join(format!("{evidence_id}.envelopes.jsonl"))
    }

    pub fn state_path(&self, evidence_id: &str) -> PathBuf {
        self.meta_dir.join(format!("{evidence_id}.state"))
    }
}

/// Commit `contents` at `path` unless something is already there.
///
/// Returns whether this call committed the file. Contents are synced before
/// the no-clobber rename, so a crash leaves at most an orphaned temp file.
fn create_if_absent(path: &Path, contents: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let dir = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.flush()
        .with_context(|| format!("flush temp file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp file for {}", path.display()))?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        // A concurrent writer of identical content won the race.
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(err.error).with_context(|| format!("commit {}", path.display())),
    }
}

fn is_evidence_id(candidate: &str) -> bool {
    candidate.len() == 64
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn ensure_evidence_id(evidence_id: &str) -> Result<()> {
    if !is_evidence_id(evidence_id) {
        bail!("invalid evidence id {evidence_id:?}: expected 64 lowercase hex characters");
    }
    Ok(())
}

/// Length of the newline-terminated prefix of a log.
fn committed_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|&byte| byte == b'\n')
        .map_or(0, |end| end + 1)
}

/// Truncate a log back to its last complete record.
fn drop_torn_tail(file: &mut File, path: &Path) -> Result<()> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("read envelope log {}", path.display()))?;
    let committed = committed_len(&bytes);
    if committed < bytes.len() {
        warn!(
            path = %path.display(),
            torn_bytes = bytes.len() - committed,
            "dropping unterminated envelope record"
        );
        file.set_len(committed as u64)
            .with_context(|| format!("truncate envelope log {}", path.display()))?;
    }
    Ok(())
}
