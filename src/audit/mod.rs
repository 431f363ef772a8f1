//! Tamper-evident audit log.
//!
//! One canonical-JSON event per line in `audit/audit.log`.  Events are
//! chained: each carries the hex SHA-256 of its predecessor's canonical
//! serialization (the genesis value is 64 zeros), and each is
//! authenticated with HMAC-SHA256 keyed by HKDF(DEK, "secretctl/audit/v1").
//!
//! Canonical field order is fixed by struct declaration order:
//! `seq, timestamp, operation, source, result, actor_id, key, metadata,
//! error, prev_hash` — the on-disk line appends `mac` last.  Metadata
//! keys serialize lexicographically (`BTreeMap`).
//!
//! Appends are best-effort for read operations and a precondition of
//! success for secret mutations; that policy lives in the vault store.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::{Result, SecretCtlError};
use crate::vault::fsutil;

type HmacSha256 = Hmac<Sha256>;

/// Hash of the event before the first one: 64 zeros.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Subdirectory of the vault holding audit files.
pub const AUDIT_DIR: &str = "audit";

/// The journal file name.
const AUDIT_FILE: &str = "audit.log";

/// Where an operation request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSource {
    Cli,
    Mcp,
    Desktop,
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Error,
    Denied,
}

/// Structured error attached to failed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditErrorInfo {
    pub code: String,
    pub message: String,
}

/// A single journal entry.  Field order here IS the canonical wire
/// order — do not reorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub seq: u64,
    pub timestamp: String,
    pub operation: String,
    pub source: AuditSource,
    pub result: AuditOutcome,
    pub actor_id: String,
    pub key: String,
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
    pub error: Option<AuditErrorInfo>,
    pub prev_hash: String,
    pub mac: String,
}

/// Borrowed view of an event without the mac — the canonical bytes the
/// hash and the MAC are computed over.
#[derive(Serialize)]
struct CanonicalView<'a> {
    seq: u64,
    timestamp: &'a str,
    operation: &'a str,
    source: AuditSource,
    result: AuditOutcome,
    actor_id: &'a str,
    key: &'a str,
    metadata: &'a Option<BTreeMap<String, serde_json::Value>>,
    error: &'a Option<AuditErrorInfo>,
    prev_hash: &'a str,
}

impl AuditEvent {
    /// Canonical serialization (everything but the mac).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let view = CanonicalView {
            seq: self.seq,
            timestamp: &self.timestamp,
            operation: &self.operation,
            source: self.source,
            result: self.result,
            actor_id: &self.actor_id,
            key: &self.key,
            metadata: &self.metadata,
            error: &self.error,
            prev_hash: &self.prev_hash,
        };
        serde_json::to_vec(&view)
            .map_err(|e| SecretCtlError::SerializationError(format!("audit event: {e}")))
    }

    /// Hex SHA-256 of the canonical bytes — the next event's prev_hash.
    pub fn hash(&self) -> Result<String> {
        Ok(hex::encode(Sha256::digest(self.canonical_bytes()?)))
    }
}

/// Parameters of a new event, before chaining and authentication.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub operation: String,
    pub source: AuditSource,
    pub result: AuditOutcome,
    pub key: String,
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
    pub error: Option<AuditErrorInfo>,
}

impl AuditRecord {
    pub fn success(operation: &str, source: AuditSource, key: &str) -> Self {
        Self {
            operation: operation.to_string(),
            source,
            result: AuditOutcome::Success,
            key: key.to_string(),
            metadata: None,
            error: None,
        }
    }

    pub fn failure(operation: &str, source: AuditSource, key: &str, err: &SecretCtlError) -> Self {
        Self {
            operation: operation.to_string(),
            source,
            result: AuditOutcome::Error,
            key: key.to_string(),
            metadata: None,
            error: Some(AuditErrorInfo {
                code: format!("{}", err.exit_code()),
                message: err.to_string(),
            }),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value);
        self
    }
}

/// Verification report: either the full chain checks out, or the first
/// defect is identified.
#[derive(Debug, Clone)]
pub struct AuditVerifyReport {
    pub events_checked: u64,
    pub first_defect: Option<(u64, String)>,
}

impl AuditVerifyReport {
    pub fn is_ok(&self) -> bool {
        self.first_defect.is_none()
    }
}

/// Chain tail kept in memory so appends do not re-scan the file.
struct Tail {
    last_seq: u64,
    last_hash: String,
}

/// Append-only hash-chained journal.
pub struct AuditLog {
    path: PathBuf,
    mac_key: [u8; 32],
    durable: bool,
    tail: Mutex<Tail>,
}

impl AuditLog {
    /// Open (or create) the journal under `<vault_dir>/audit/`.
    ///
    /// Scans the existing file once to recover the chain tail.
    pub fn open(vault_dir: &Path, mac_key: [u8; 32], durable: bool) -> Result<Self> {
        let dir = vault_dir.join(AUDIT_DIR);
        fsutil::create_private_dir(&dir)?;
        let path = dir.join(AUDIT_FILE);

        let tail = match read_last_event(&path)? {
            Some(event) => Tail {
                last_seq: event.seq,
                last_hash: event.hash()?,
            },
            None => Tail {
                last_seq: 0,
                last_hash: GENESIS_HASH.to_string(),
            },
        };

        Ok(Self {
            path,
            mac_key,
            durable,
            tail: Mutex::new(tail),
        })
    }

    /// Append one event: chain it to the tail, authenticate it, write
    /// the line with O_APPEND, and fsync when durable logging is on.
    pub fn append(&self, record: AuditRecord) -> Result<AuditEvent> {
        let mut tail = self
            .tail
            .lock()
            .map_err(|_| SecretCtlError::AuditError("audit tail lock poisoned".into()))?;

        let mut event = AuditEvent {
            seq: tail.last_seq + 1,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            operation: record.operation,
            source: record.source,
            result: record.result,
            actor_id: whoami(),
            key: record.key,
            metadata: record.metadata,
            error: record.error,
            prev_hash: tail.last_hash.clone(),
            mac: String::new(),
        };

        let canonical = event.canonical_bytes()?;
        event.mac = compute_mac(&self.mac_key, &canonical)?;

        let line = serde_json::to_vec(&event)
            .map_err(|e| SecretCtlError::SerializationError(format!("audit event: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        fsutil::set_mode(&self.path, fsutil::FILE_MODE)?;
        file.write_all(&line)?;
        file.write_all(b"\n")?;
        if self.durable {
            file.sync_all()?;
        }

        tail.last_seq = event.seq;
        tail.last_hash = hex::encode(Sha256::digest(&canonical));

        Ok(event)
    }

    /// Walk the whole chain from seq 1: gap-free sequence numbers, each
    /// prev_hash equal to the predecessor's hash, each MAC valid under
    /// the current key.  Stops at the first defect.
    pub fn verify(&self) -> Result<AuditVerifyReport> {
        let events = self.read_all()?;
        let mut expected_prev = GENESIS_HASH.to_string();

        for (index, event) in events.iter().enumerate() {
            let expected_seq = index as u64 + 1;
            if event.seq != expected_seq {
                return Ok(AuditVerifyReport {
                    events_checked: expected_seq,
                    first_defect: Some((
                        event.seq,
                        format!("sequence gap: expected {expected_seq}, found {}", event.seq),
                    )),
                });
            }

            if event.prev_hash != expected_prev {
                return Ok(AuditVerifyReport {
                    events_checked: event.seq,
                    first_defect: Some((event.seq, "prev_hash does not match predecessor".into())),
                });
            }

            let canonical = event.canonical_bytes()?;
            let expected_mac = compute_mac(&self.mac_key, &canonical)?;
            let matches: bool = expected_mac
                .as_bytes()
                .ct_eq(event.mac.as_bytes())
                .into();
            if !matches {
                return Ok(AuditVerifyReport {
                    events_checked: event.seq,
                    first_defect: Some((event.seq, "HMAC mismatch".into())),
                });
            }

            expected_prev = hex::encode(Sha256::digest(&canonical));
        }

        Ok(AuditVerifyReport {
            events_checked: events.len() as u64,
            first_defect: None,
        })
    }

    /// Most recent events, newest first, optionally bounded by a
    /// timestamp floor.
    pub fn query(&self, limit: usize, since: Option<&str>) -> Result<Vec<AuditEvent>> {
        let mut events = self.read_all()?;
        if let Some(floor) = since {
            events.retain(|e| e.timestamp.as_str() >= floor);
        }
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }

    /// Parse every line of the journal.
    fn read_all(&self) -> Result<Vec<AuditEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut events = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent = serde_json::from_str(&line).map_err(|e| {
                SecretCtlError::AuditChainBroken {
                    seq: line_no as u64 + 1,
                    reason: format!("unparseable event: {e}"),
                }
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Hex HMAC-SHA256 over the canonical bytes.
fn compute_mac(key: &[u8], canonical: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SecretCtlError::AuditError(format!("invalid MAC key: {e}")))?;
    mac.update(canonical);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Parse only the last line of the journal (chain tail recovery).
fn read_last_event(path: &Path) -> Result<Option<AuditEvent>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut last: Option<String> = None;
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            last = Some(line);
        }
    }

    match last {
        Some(line) => {
            let event: AuditEvent = serde_json::from_str(&line).map_err(|e| {
                SecretCtlError::AuditError(format!("corrupt journal tail: {e}"))
            })?;
            Ok(Some(event))
        }
        None => Ok(None),
    }
}

/// Local account name used as actor_id.
fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
