//! Content-addressable transcription result cache backed by SQLite.
//!
//! Maps a SHA-256 fingerprint of the raw uploaded bytes to a previously
//! computed [`TranscriptionResult`]. Identical bytes always hit the same
//! entry, so redundant provider work is short-circuited. Corrupted or
//! unreadable entries degrade to a cache miss rather than failing the
//! request; they are overwritten by the next successful run.

use anyhow::Result;
use chrono::Local;
use rusqlite::OptionalExtension;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::provider::{TranscriptionResult, RESULT_VERSION};

/// Hex-encoded SHA-256 digest of raw audio bytes. Cache key and the basis
/// for temp-file naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Full 64-character hex digest.
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Leading 12 hex characters, used for temp-file prefixes and log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of raw audio bytes.
///
/// Pure and deterministic: identical bytes always yield the same digest, and
/// distinct byte sequences collide only with negligible probability.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Durable fingerprint → result store.
///
/// Reads and writes are serialized through a mutex; entries are immutable
/// once written and overwritten wholesale, never partially mutated, so this
/// is sufficient for concurrent requests. The lock is never held across an
/// await point.
pub struct FingerprintCache {
    /// Path to the SQLite database file
    database_path: PathBuf,
    /// Connection to the database (lazy-loaded)
    connection: Mutex<Option<Connection>>,
}

impl FingerprintCache {
    /// Creates a cache rooted in the given directory.
    ///
    /// # Errors
    /// - If the directory cannot be created
    pub fn new(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)?;
        Ok(Self {
            database_path: cache_dir.join("transcription_cache.db"),
            connection: Mutex::new(None),
        })
    }

    /// Looks up a previously stored result.
    ///
    /// Pure storage read; never performs network or model work. Returns the
    /// stored result with `cached` set to `true`. A missing key, a corrupt
    /// row, or a version mismatch all read as `None`.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<TranscriptionResult> {
        let raw = match self.read_entry(fingerprint) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(
                    fingerprint = fingerprint.short(),
                    "Cache read failed, treating as miss: {e:#}"
                );
                return None;
            }
        };

        let mut result: TranscriptionResult = match serde_json::from_str(&raw) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    fingerprint = fingerprint.short(),
                    "Corrupt cache entry, treating as miss: {e}"
                );
                return None;
            }
        };

        if result.version != RESULT_VERSION {
            tracing::warn!(
                fingerprint = fingerprint.short(),
                entry_version = result.version,
                "Cache entry from a different result version, treating as miss"
            );
            return None;
        }

        result.cached = true;
        Some(result)
    }

    /// Stores a result for a fingerprint, overwriting any prior entry.
    ///
    /// Idempotent. Must only be called with successful terminal results;
    /// failed processing runs never populate the cache.
    ///
    /// # Errors
    /// - If the database cannot be opened or written
    pub fn store(&self, fingerprint: &Fingerprint, result: &TranscriptionResult) -> Result<()> {
        let payload = serde_json::to_string(result)?;
        let timestamp = Local::now().to_rfc3339();

        self.with_connection(|connection| {
            connection.execute(
                "INSERT OR REPLACE INTO transcriptions (fingerprint, result, created_at)
                 VALUES (?1, ?2, ?3)",
                params![fingerprint.as_hex(), payload, timestamp],
            )
        })?;

        tracing::debug!(fingerprint = fingerprint.short(), "Result cached");
        Ok(())
    }

    /// Reads the raw serialized entry for a fingerprint.
    fn read_entry(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        self.with_connection(|connection| {
            connection
                .query_row(
                    "SELECT result FROM transcriptions WHERE fingerprint = ?1",
                    params![fingerprint.as_hex()],
                    |row| row.get::<_, String>(0),
                )
                .optional()
        })
    }

    /// Runs a closure against the lazily opened connection.
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut guard = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if guard.is_none() {
            let connection = Connection::open(&self.database_path)?;

            connection.execute(
                "CREATE TABLE IF NOT EXISTS transcriptions (
                    fingerprint TEXT PRIMARY KEY,
                    result TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
                [],
            )?;

            *guard = Some(connection);
        }

        Ok(f(guard.as_ref().unwrap())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(text: &str) -> TranscriptionResult {
        TranscriptionResult {
            text: text.to_string(),
            language: "hindi".to_string(),
            confidence: 0.92,
            provider: "test".to_string(),
            cached: false,
            version: RESULT_VERSION,
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint(b"same bytes");
        let b = fingerprint(b"same bytes");
        assert_eq!(a, b);
        assert_eq!(a.as_hex().len(), 64);
    }

    #[test]
    fn distinct_bytes_yield_distinct_fingerprints() {
        assert_ne!(fingerprint(b"clip one"), fingerprint(b"clip two"));
    }

    #[test]
    fn lookup_on_unknown_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path()).unwrap();
        assert!(cache.lookup(&fingerprint(b"never stored")).is_none());
    }

    #[test]
    fn stored_result_round_trips_with_cached_flag() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path()).unwrap();
        let fp = fingerprint(b"audio bytes");
        let result = sample_result("namaste duniya");

        cache.store(&fp, &result).unwrap();
        let hit = cache.lookup(&fp).unwrap();

        assert!(hit.cached);
        assert_eq!(hit.text, result.text);
        assert_eq!(hit.language, result.language);
        assert_eq!(hit.confidence, result.confidence);
        assert_eq!(hit.provider, result.provider);
    }

    #[test]
    fn store_overwrites_prior_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path()).unwrap();
        let fp = fingerprint(b"audio bytes");

        cache.store(&fp, &sample_result("first")).unwrap();
        cache.store(&fp, &sample_result("second")).unwrap();

        assert_eq!(cache.lookup(&fp).unwrap().text, "second");
    }

    #[test]
    fn corrupt_entry_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path()).unwrap();
        let fp = fingerprint(b"audio bytes");

        // Seed the schema, then damage the row out of band.
        cache.store(&fp, &sample_result("fine")).unwrap();
        let connection = Connection::open(dir.path().join("transcription_cache.db")).unwrap();
        connection
            .execute(
                "UPDATE transcriptions SET result = 'not json' WHERE fingerprint = ?1",
                params![fp.as_hex()],
            )
            .unwrap();

        assert!(cache.lookup(&fp).is_none());
    }

    #[test]
    fn version_mismatch_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path()).unwrap();
        let fp = fingerprint(b"audio bytes");

        let mut stale = sample_result("old model output");
        stale.version = RESULT_VERSION + 1;
        cache.store(&fp, &stale).unwrap();

        assert!(cache.lookup(&fp).is_none());
    }
}
