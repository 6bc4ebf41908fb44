//! Audit logging for the kiosk access core.
//!
//! Every classification outcome, consumption, expiry, vote registration and
//! enrollment change is appended to a tamper-evident log. Card ids are
//! masked to their trailing 4 characters before they reach the log; the
//! full id never leaves the core.
//!
//! Log format:
//! `2024-01-15 10:23:45 |  ADMIN_GRANTED | card=...WXYZ | terminal=kiosk-01 | mac=<hex>`
//!
//! The `mac` field chains each line to its predecessor with HMAC-SHA256, so
//! deleting or editing any line breaks verification of every later line.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::security::{resilient_lock, resilient_read, resilient_write};
use crate::types::{CardId, ScanOutcome};

type HmacSha256 = Hmac<Sha256>;

/// Visible suffix of a card id in the audit log.
const MASK_VISIBLE_SUFFIX: usize = 4;

/// Entries kept in memory for export.
const RECENT_CAP: usize = 10_000;

/// Mask a card id for logging, keeping only the trailing characters.
///
/// The trailing window is what identifies a card, so the suffix (not the
/// prefix) is the useful correlation handle for an auditor.
pub fn mask_card_id(id: &CardId) -> String {
    let chars: Vec<char> = id.as_str().chars().collect();
    if chars.len() <= MASK_VISIBLE_SUFFIX {
        return "****".to_string();
    }
    let suffix: String = chars[chars.len() - MASK_VISIBLE_SUFFIX..].iter().collect();
    format!("...{}", suffix)
}

/// Kinds of auditable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    AdminGranted,
    RegularGranted,
    AlreadyVoted,
    InvalidScan,
    StoreError,
    VoteRegistered,
    SessionConsumed,
    SessionExpired,
    AdminAdded,
    AdminRemoved,
}

impl AuditEvent {
    pub fn from_outcome(outcome: &ScanOutcome) -> Self {
        match outcome {
            ScanOutcome::AdminGranted(_) => Self::AdminGranted,
            ScanOutcome::RegularGranted(_) => Self::RegularGranted,
            ScanOutcome::AlreadyVoted(_) => Self::AlreadyVoted,
            ScanOutcome::Invalid => Self::InvalidScan,
            ScanOutcome::StoreError => Self::StoreError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdminGranted => "ADMIN_GRANTED",
            Self::RegularGranted => "REGULAR_GRANTED",
            Self::AlreadyVoted => "ALREADY_VOTED",
            Self::InvalidScan => "INVALID_SCAN",
            Self::StoreError => "STORE_ERROR",
            Self::VoteRegistered => "VOTE_REGISTERED",
            Self::SessionConsumed => "SESSION_CONSUMED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::AdminAdded => "ADMIN_ADDED",
            Self::AdminRemoved => "ADMIN_REMOVED",
        }
    }
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    /// Masked card id, or `-` when the event has no card (short scans).
    pub card: String,
    /// Hostname of the kiosk terminal that produced the event.
    pub terminal: String,
}

impl AuditEntry {
    pub fn new(event: AuditEvent, card: Option<&CardId>, terminal: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            card: card.map(mask_card_id).unwrap_or_else(|| "-".to_string()),
            terminal: terminal.to_string(),
        }
    }

    /// Format as a log line (without the integrity mac).
    pub fn to_log_line(&self) -> String {
        let local_time: DateTime<Local> = self.timestamp.into();
        format!(
            "{} | {:>15} | card={} | terminal={}",
            local_time.format("%Y-%m-%d %H:%M:%S"),
            self.event.as_str(),
            self.card,
            self.terminal
        )
    }
}

/// Append-only, tamper-evident audit logger.
pub struct AuditLogger {
    log_path: PathBuf,
    key_path: PathBuf,
    enabled: bool,
    terminal: String,
    key: Vec<u8>,
    /// mac of the last appended line; chains the next one.
    last_mac: Mutex<String>,
    /// In-memory buffer of recent entries (for export).
    recent_entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLogger {
    /// Create a logger writing under the default data directory.
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_dir(Self::log_dir(), enabled)
    }

    /// Create a logger writing `audit.log` / `audit.key` under `dir`.
    pub fn with_dir(dir: PathBuf, enabled: bool) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create audit directory {:?}", dir))?;

        let log_path = dir.join("audit.log");
        let key_path = dir.join("audit.key");
        let key = load_or_generate_key(&key_path)?;
        let last_mac = read_last_mac(&log_path)?;

        let terminal = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            log_path,
            key_path,
            enabled,
            terminal,
            key,
            last_mac: Mutex::new(last_mac),
            recent_entries: RwLock::new(Vec::new()),
        })
    }

    /// Default log directory.
    pub fn log_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("swipegate")
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn key_path(&self) -> &PathBuf {
        &self.key_path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Record an event. Appends to the file and to the in-memory ring.
    pub fn log(&self, event: AuditEvent, card: Option<&CardId>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let entry = AuditEntry::new(event, card, &self.terminal);

        {
            let mut recent = resilient_write(&self.recent_entries);
            recent.push(entry.clone());
            if recent.len() > RECENT_CAP {
                recent.remove(0);
            }
        }

        let line = entry.to_log_line();

        // The mac chain and the file append must move together; a writer
        // that updates one without the other corrupts verification.
        let mut last_mac = resilient_lock(&self.last_mac);
        let mac = chain_mac(&self.key, &last_mac, &line);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open audit log {:?}", self.log_path))?;
        writeln!(file, "{} | mac={}", line, mac)
            .with_context(|| format!("Failed to append to audit log {:?}", self.log_path))?;

        *last_mac = mac;
        Ok(())
    }

    /// Walk the whole log and verify the integrity chain.
    ///
    /// Returns the number of verified entries; fails at the first line whose
    /// mac does not match.
    pub fn verify_integrity(&self) -> Result<usize> {
        if !self.log_path.exists() {
            return Ok(0);
        }

        let content = fs::read_to_string(&self.log_path)
            .with_context(|| format!("Failed to read audit log {:?}", self.log_path))?;

        let mut prev = String::new();
        let mut count = 0usize;
        for (index, raw) in content.lines().enumerate() {
            let Some((line, mac)) = raw.rsplit_once(" | mac=") else {
                bail!("Audit log line {} has no integrity mac", index + 1);
            };
            let expected = chain_mac(&self.key, &prev, line);
            if expected != mac {
                bail!("Audit log integrity broken at line {}", index + 1);
            }
            prev = mac.to_string();
            count += 1;
        }
        Ok(count)
    }

    /// Get recent entries from memory.
    pub fn get_recent_entries(&self) -> Vec<AuditEntry> {
        resilient_read(&self.recent_entries).clone()
    }

    /// Read all raw lines from the log file.
    pub fn read_all_entries(&self) -> Result<Vec<String>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.log_path)?;
        Ok(content.lines().map(String::from).collect())
    }

    /// Export the in-memory entries to JSON.
    pub fn export_to_json(&self) -> Result<String> {
        let recent = self.get_recent_entries();
        Ok(serde_json::to_string_pretty(&recent)?)
    }

    /// Clear the audit log and restart the chain.
    pub fn clear(&self) -> Result<()> {
        if self.log_path.exists() {
            fs::remove_file(&self.log_path)?;
        }
        resilient_write(&self.recent_entries).clear();
        *resilient_lock(&self.last_mac) = String::new();
        Ok(())
    }
}

fn chain_mac(key: &[u8], prev_mac: &str, line: &str) -> String {
    // JUSTIFICATION for .expect(): HMAC-SHA256 accepts keys of any length;
    // new_from_slice is infallible for this algorithm.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(prev_mac.as_bytes());
    mac.update(b"\n");
    mac.update(line.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Load the chain key, generating a fresh 256-bit one on first run.
fn load_or_generate_key(key_path: &PathBuf) -> Result<Vec<u8>> {
    if key_path.exists() {
        let encoded = fs::read_to_string(key_path)
            .with_context(|| format!("Failed to read audit key {:?}", key_path))?;
        return hex::decode(encoded.trim())
            .with_context(|| format!("Audit key {:?} is not valid hex", key_path));
    }

    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    fs::write(key_path, hex::encode(key))
        .with_context(|| format!("Failed to write audit key {:?}", key_path))?;
    Ok(key.to_vec())
}

/// Recover the tail mac of an existing log so appends keep chaining.
fn read_last_mac(log_path: &PathBuf) -> Result<String> {
    if !log_path.exists() {
        return Ok(String::new());
    }
    let content = fs::read_to_string(log_path)
        .with_context(|| format!("Failed to read audit log {:?}", log_path))?;
    Ok(content
        .lines()
        .last()
        .and_then(|raw| raw.rsplit_once(" | mac=").map(|(_, mac)| mac.to_string()))
        .unwrap_or_default())
}

// ============================================================================
// GLOBAL AUDIT LOGGER
// ============================================================================

static GLOBAL_AUDIT_LOGGER: OnceLock<Arc<RwLock<AuditLogger>>> = OnceLock::new();

/// Initialize the global audit logger. Later calls are ignored.
pub fn init_audit_logger(logger: AuditLogger) {
    let _ = GLOBAL_AUDIT_LOGGER.set(Arc::new(RwLock::new(logger)));
}

/// The global audit logger, if one was initialized.
pub fn global_audit_logger() -> Option<&'static Arc<RwLock<AuditLogger>>> {
    GLOBAL_AUDIT_LOGGER.get()
}

/// Record an event on the global logger. Best-effort: a failed append is
/// traced but never interrupts the access path.
pub fn record(event: AuditEvent, card: Option<&CardId>) {
    let Some(logger) = global_audit_logger() else {
        return;
    };
    let logger = resilient_read(logger);
    if let Err(e) = logger.log(event, card) {
        tracing::error!("AUDIT: failed to record {}: {}", event, e);
    }
}

/// Record a scan outcome on the global logger.
pub fn record_scan(outcome: &ScanOutcome) {
    record(AuditEvent::from_outcome(outcome), outcome.card_id());
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn card(tag: &str) -> CardId {
        CardId::raw(format!("{:X>25}", tag))
    }

    #[test]
    fn test_mask_card_id_shows_suffix_only() {
        let id = card("WXYZ");
        assert_eq!(mask_card_id(&id), "...WXYZ");
    }

    #[test]
    fn test_mask_card_id_short() {
        assert_eq!(mask_card_id(&CardId::raw("ab")), "****");
    }

    #[test]
    fn test_entry_log_line() {
        let id = card("1234");
        let entry = AuditEntry::new(AuditEvent::RegularGranted, Some(&id), "kiosk-01");

        let line = entry.to_log_line();
        assert!(line.contains("REGULAR_GRANTED"));
        assert!(line.contains("card=...1234"));
        assert!(line.contains("terminal=kiosk-01"));
        assert!(!line.contains(id.as_str()));
    }

    #[test]
    fn test_entry_without_card() {
        let entry = AuditEntry::new(AuditEvent::InvalidScan, None, "kiosk-01");
        assert!(entry.to_log_line().contains("card=-"));
    }

    #[test]
    fn test_event_from_outcome() {
        let id = card("0");
        assert_eq!(
            AuditEvent::from_outcome(&ScanOutcome::AdminGranted(id.clone())),
            AuditEvent::AdminGranted
        );
        assert_eq!(
            AuditEvent::from_outcome(&ScanOutcome::AlreadyVoted(id)),
            AuditEvent::AlreadyVoted
        );
        assert_eq!(
            AuditEvent::from_outcome(&ScanOutcome::Invalid),
            AuditEvent::InvalidScan
        );
    }

    #[test]
    fn test_log_and_verify_chain() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::with_dir(dir.path().to_path_buf(), true).unwrap();

        logger.log(AuditEvent::RegularGranted, Some(&card("AAAA"))).unwrap();
        logger.log(AuditEvent::VoteRegistered, Some(&card("AAAA"))).unwrap();
        logger.log(AuditEvent::SessionExpired, None).unwrap();

        assert_eq!(logger.verify_integrity().unwrap(), 3);
        assert_eq!(logger.read_all_entries().unwrap().len(), 3);
    }

    #[test]
    fn test_tampered_line_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::with_dir(dir.path().to_path_buf(), true).unwrap();

        logger.log(AuditEvent::AdminGranted, Some(&card("BBBB"))).unwrap();
        logger.log(AuditEvent::SessionConsumed, None).unwrap();

        // Edit the first line's event in place.
        let content = fs::read_to_string(logger.log_path()).unwrap();
        let tampered = content.replacen("ADMIN_GRANTED", "REGULAR_GRANTED", 1);
        fs::write(logger.log_path(), tampered).unwrap();

        assert!(logger.verify_integrity().is_err());
    }

    #[test]
    fn test_chain_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let logger = AuditLogger::with_dir(dir.path().to_path_buf(), true).unwrap();
            logger.log(AuditEvent::AdminAdded, Some(&card("CCCC"))).unwrap();
        }

        let reopened = AuditLogger::with_dir(dir.path().to_path_buf(), true).unwrap();
        reopened.log(AuditEvent::AdminRemoved, Some(&card("CCCC"))).unwrap();

        assert_eq!(reopened.verify_integrity().unwrap(), 2);
    }

    #[test]
    fn test_disabled_logger_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::with_dir(dir.path().to_path_buf(), false).unwrap();

        logger.log(AuditEvent::AdminGranted, None).unwrap();
        assert_eq!(logger.read_all_entries().unwrap().len(), 0);
        assert!(logger.get_recent_entries().is_empty());
    }

    #[test]
    fn test_export_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::with_dir(dir.path().to_path_buf(), true).unwrap();
        logger.log(AuditEvent::VoteRegistered, Some(&card("DDDD"))).unwrap();

        let json = logger.export_to_json().unwrap();
        assert!(json.contains("VOTE_REGISTERED"));
        assert!(json.contains("...DDDD"));
    }

    #[test]
    fn test_clear_restarts_chain() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::with_dir(dir.path().to_path_buf(), true).unwrap();

        logger.log(AuditEvent::AdminGranted, None).unwrap();
        logger.clear().unwrap();
        logger.log(AuditEvent::SessionExpired, None).unwrap();

        assert_eq!(logger.verify_integrity().unwrap(), 1);
    }
}
