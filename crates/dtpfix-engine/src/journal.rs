//! Session journal: one append-only JSONL file per run.
//!
//! Layout:
//!
//! ```text
//! <log_dir>/sessions/session-20261016T081530.123456Z.jsonl
//! ```
//!
//! File names sort chronologically. Every entry is written as one line and
//! synced to disk before [`SessionJournal::record`] returns, so a crash loses
//! at most the line being written. The reader tolerates exactly that: a final
//! line without its newline that does not parse is dropped with a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use dtpfix_core::{FieldValue, Mutation, MutationKind, NodeRef};
use dtpfix_rules::Ontology;

use crate::error::JournalError;
use crate::executor::Mode;

pub const SESSIONS_DIR: &str = "sessions";
pub const SESSION_ENTRY_VERSION_V1: &str = "dtpfix_session_entry_v1";

const SESSION_FILE_PREFIX: &str = "session-";
const SESSION_FILE_SUFFIX: &str = ".jsonl";
const SESSION_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub version: String,
    pub session_id: Uuid,
    /// 1-based position in the session.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    pub ontology: Ontology,
    pub fix: String,
    /// IRI of the node when the mutation was issued.
    pub node: NodeRef,
    pub kind: MutationKind,
    pub key: String,
    #[serde(default)]
    pub old_value: Option<FieldValue>,
    #[serde(default)]
    pub new_value: Option<FieldValue>,
    /// IRI of the node after an `iri_replace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_iri: Option<NodeRef>,
}

impl SessionEntry {
    /// The forward mutation this entry records.
    pub fn mutation(&self) -> Mutation {
        let new_value = match (&self.kind, &self.post_iri) {
            (MutationKind::IriReplace, Some(post)) => Some(FieldValue::String(post.to_string())),
            _ => self.new_value.clone(),
        };
        Mutation {
            node: self.node.clone(),
            kind: self.kind,
            key: self.key.clone(),
            old_value: self.old_value.clone(),
            new_value,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.mode == Mode::Simulated
    }
}

// ============================================================================
// Writer
// ============================================================================

#[derive(Debug)]
pub struct SessionJournal {
    path: PathBuf,
    file: File,
    session_id: Uuid,
    ontology: Ontology,
    seq: u64,
}

impl SessionJournal {
    /// Creates a fresh session file under `<log_dir>/sessions`.
    pub fn create(log_dir: &Path, ontology: Ontology) -> Result<Self, JournalError> {
        let dir = log_dir.join(SESSIONS_DIR);
        fs::create_dir_all(&dir).map_err(|e| JournalError::io(&dir, e))?;

        let mut stamp = Utc::now();
        loop {
            let path = dir.join(session_file_name(&stamp));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    tracing::info!(path = %path.display(), "session journal opened");
                    return Ok(Self {
                        path,
                        file,
                        session_id: Uuid::new_v4(),
                        ontology,
                        seq: 0,
                    });
                }
                // Two sessions in the same microsecond: take the next one.
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    stamp += chrono::Duration::microseconds(1);
                }
                Err(e) => return Err(JournalError::io(path, e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Number of entries recorded so far.
    pub fn len(&self) -> u64 {
        self.seq
    }

    pub fn is_empty(&self) -> bool {
        self.seq == 0
    }

    /// Appends one entry and syncs it to disk.
    pub fn record(
        &mut self,
        fix: &str,
        mutation: &Mutation,
        mode: Mode,
    ) -> Result<SessionEntry, JournalError> {
        let entry = SessionEntry {
            version: SESSION_ENTRY_VERSION_V1.to_string(),
            session_id: self.session_id,
            seq: self.seq + 1,
            timestamp: Utc::now(),
            mode,
            ontology: self.ontology,
            fix: fix.to_string(),
            node: mutation.node.clone(),
            kind: mutation.kind,
            key: mutation.key.clone(),
            old_value: mutation.old_value.clone(),
            new_value: mutation.new_value.clone(),
            post_iri: (mutation.kind == MutationKind::IriReplace).then(|| mutation.post_iri()),
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_data())
            .map_err(|e| JournalError::io(&self.path, e))?;

        self.seq += 1;
        Ok(entry)
    }
}

fn session_file_name(stamp: &DateTime<Utc>) -> String {
    format!(
        "{SESSION_FILE_PREFIX}{}{SESSION_FILE_SUFFIX}",
        stamp.format(SESSION_STAMP_FORMAT)
    )
}

fn is_session_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(SESSION_FILE_PREFIX) && n.ends_with(SESSION_FILE_SUFFIX))
}

// ============================================================================
// Reader
// ============================================================================

#[derive(Debug, Clone)]
pub struct SessionLog {
    pub path: PathBuf,
    pub entries: Vec<SessionEntry>,
    /// The last line was cut short and dropped.
    pub torn_tail: bool,
}

/// Reads every entry of one session file, in the order written.
pub fn read_session(path: &Path) -> Result<SessionLog, JournalError> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => JournalError::NotFound(path.to_path_buf()),
        _ => JournalError::io(path, e),
    })?;

    let mut entries = Vec::new();
    let mut torn_tail = false;
    for (idx, raw) in text.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;
        let terminated = raw.ends_with('\n');
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let entry: SessionEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(_) if !terminated => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no,
                    "ignoring torn final journal line"
                );
                torn_tail = true;
                continue;
            }
            Err(source) => {
                return Err(JournalError::Parse {
                    path: path.to_path_buf(),
                    line: line_no,
                    source,
                })
            }
        };
        if entry.version != SESSION_ENTRY_VERSION_V1 {
            return Err(JournalError::UnsupportedVersion {
                path: path.to_path_buf(),
                line: line_no,
                version: entry.version,
            });
        }
        entries.push(entry);
    }

    Ok(SessionLog {
        path: path.to_path_buf(),
        entries,
        torn_tail,
    })
}

/// Session files addressed by `path`, oldest first.
///
/// A file is returned as is. A directory contributes every session file in
/// its `sessions/` subdirectory, or in itself when it has none.
pub fn session_files(path: &Path) -> Result<Vec<PathBuf>, JournalError> {
    if !path.exists() {
        return Err(JournalError::NotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let nested = path.join(SESSIONS_DIR);
    let dir = if nested.is_dir() { nested } else { path.to_path_buf() };
    let mut files = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| JournalError::io(&dir, e))? {
        let entry = entry.map_err(|e| JournalError::io(&dir, e))?;
        let candidate = entry.path();
        if is_session_file(&candidate) {
            files.push(candidate);
        }
    }
    files.sort();
    Ok(files)
}
