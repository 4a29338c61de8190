//! Explanation Result Cache
//!
//! Content-addressed store of finished explanations, one JSON record per
//! fingerprint under the cache directory.
//!
//! ## Guarantees
//!
//! - Writes go to a temp file in the same directory and are renamed into
//!   place, so readers never observe a half-written record
//! - Records older than their TTL are misses and are removed on read
//! - A record that cannot be read or decoded is removed and reported as a miss
//! - Write failures are logged and never fail the request

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::constants::cache as cache_constants;
use crate::types::{ExplainError, ExplanationResult, Fingerprint, Result};

/// On-disk cache record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub fingerprint: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub result: ExplanationResult,
}

impl CacheRecord {
    /// Whether the record has outlived its TTL at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        // Records stamped in the future count as fresh
        age.num_seconds() >= 0 && age.num_seconds() as u64 >= self.ttl_secs
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entry_count: usize,
    pub expired_count: usize,
    /// Record files that could not be read or parsed; not in `entry_count`
    pub corrupt_count: usize,
    /// Size of every record file, corrupt ones included
    pub total_size_bytes: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// File-backed result cache
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.dir.clone(), Duration::from_secs(config.ttl_secs))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!(
            "{}.{}",
            fingerprint,
            cache_constants::RECORD_EXTENSION
        ))
    }

    /// Look up a fresh result
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<ExplanationResult> {
        self.get_at(fingerprint, Utc::now()).await
    }

    /// Look up a fresh result as of `now`
    pub async fn get_at(
        &self,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> Option<ExplanationResult> {
        let path = self.record_path(fingerprint);

        let record = match self.read_record(fingerprint, &path).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(fingerprint = %fingerprint, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable cache record");
                remove_quietly(&path).await;
                return None;
            }
        };

        if record.is_expired_at(now) {
            debug!(fingerprint = %fingerprint, created_at = %record.created_at, "Cache record expired");
            remove_quietly(&path).await;
            return None;
        }

        debug!(fingerprint = %fingerprint, "Cache hit");
        Some(record.result)
    }

    async fn read_record(
        &self,
        fingerprint: &Fingerprint,
        path: &Path,
    ) -> Result<Option<CacheRecord>> {
        let corruption = |reason: String| ExplainError::CacheReadCorruption {
            fingerprint: fingerprint.to_string(),
            reason,
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(corruption(e.to_string())),
        };

        let record: CacheRecord =
            serde_json::from_str(&content).map_err(|e| corruption(e.to_string()))?;

        if record.fingerprint != fingerprint.as_str() {
            return Err(corruption(format!(
                "record belongs to {}",
                record.fingerprint
            )));
        }

        Ok(Some(record))
    }

    /// Store a result; failures are logged and returned for the caller to ignore
    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        language: &str,
        result: &ExplanationResult,
    ) -> Result<()> {
        self.put_at(fingerprint, language, result, Utc::now()).await
    }

    /// Store a result stamped with `created_at`
    pub async fn put_at(
        &self,
        fingerprint: &Fingerprint,
        language: &str,
        result: &ExplanationResult,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let record = CacheRecord {
            fingerprint: fingerprint.to_string(),
            language: language.to_string(),
            created_at,
            ttl_secs: self.ttl.as_secs(),
            result: result.clone(),
        };

        match self.write_record(fingerprint, &record).await {
            Ok(bytes) => {
                debug!(fingerprint = %fingerprint, bytes, "Cached explanation");
                Ok(())
            }
            Err(e) => {
                let err = ExplainError::CacheWriteFailure {
                    fingerprint: fingerprint.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Failed to cache explanation");
                Err(err)
            }
        }
    }

    async fn write_record(&self, fingerprint: &Fingerprint, record: &CacheRecord) -> Result<usize> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let content = serde_json::to_string_pretty(record)?;
        let temp_path = self
            .dir
            .join(format!("{}{}", cache_constants::TEMP_PREFIX, Uuid::new_v4()));

        tokio::fs::write(&temp_path, &content).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, self.record_path(fingerprint)).await {
            remove_quietly(&temp_path).await;
            return Err(e.into());
        }

        Ok(content.len())
    }

    /// Remove one record; `true` when something was removed
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<bool> {
        match tokio::fs::remove_file(self.record_path(fingerprint)).await {
            Ok(()) => {
                info!(fingerprint = %fingerprint, "Invalidated cache record");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every record and stray temp file; returns the record count
    pub async fn clear(&self) -> Result<usize> {
        let mut count = 0;

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_record(&path) {
                tokio::fs::remove_file(&path).await?;
                count += 1;
            } else if is_temp_file(&path) {
                tokio::fs::remove_file(&path).await?;
            }
        }

        info!("Cleared {} cache records", count);
        Ok(count)
    }

    /// Summarize the cache directory
    pub async fn stats(&self) -> Result<CacheStats> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<CacheStats> {
        let mut stats = CacheStats::default();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_record(&path) {
                continue;
            }

            let content = match tokio::fs::read(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable cache record");
                    stats.corrupt_count += 1;
                    continue;
                }
            };
            stats.total_size_bytes += content.len() as u64;

            let record = match serde_json::from_slice::<CacheRecord>(&content) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt cache record");
                    stats.corrupt_count += 1;
                    continue;
                }
            };

            stats.entry_count += 1;
            if record.is_expired_at(now) {
                stats.expired_count += 1;
            }
            stats.oldest_entry = Some(match stats.oldest_entry {
                Some(oldest) => oldest.min(record.created_at),
                None => record.created_at,
            });
            stats.newest_entry = Some(match stats.newest_entry {
                Some(newest) => newest.max(record.created_at),
                None => record.created_at,
            });
        }

        Ok(stats)
    }
}

fn is_record(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e == cache_constants::RECORD_EXTENSION)
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(cache_constants::TEMP_PREFIX))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove cache file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PerformanceMetrics;
    use tempfile::TempDir;

    const WEEK: Duration = Duration::from_secs(604_800);

    fn sample_result() -> ExplanationResult {
        ExplanationResult {
            explanation: "Adds two numbers.".to_string(),
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            created_at: Utc::now(),
            metrics: PerformanceMetrics {
                time_to_first_token_ms: 120,
                total_time_ms: 900,
                tokens_decoded: 42,
                input_tokens: 80,
                tokens_per_second: Some(53.8),
                cache_hit: false,
            },
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path(), WEEK);
        let fp = Fingerprint::compute("def add(a, b): return a + b", "python");

        let result = sample_result();

        assert!(cache.get(&fp).await.is_none());
        cache.put(&fp, "python", &result).await.unwrap();

        assert_eq!(cache.get(&fp).await, Some(result));
        assert!(temp_dir.path().join(format!("{}.json", fp)).exists());
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path(), WEEK);
        let fp = Fingerprint::compute("SELECT 1 FROM dual", "sql");
        let result = sample_result();

        cache.put(&fp, "sql", &result).await.unwrap();
        cache.put(&fp, "sql", &result).await.unwrap();

        assert_eq!(cache.get(&fp).await, Some(result));
        assert_eq!(cache.stats().await.unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn test_expired_record_is_miss_and_removed() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path(), Duration::from_secs(60));
        let fp = Fingerprint::compute("puts 'hello world'", "ruby");
        let written = Utc::now() - chrono::Duration::seconds(120);

        cache
            .put_at(&fp, "ruby", &sample_result(), written)
            .await
            .unwrap();

        assert!(cache.get(&fp).await.is_none());
        assert!(!temp_dir.path().join(format!("{}.json", fp)).exists());
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path(), Duration::from_secs(60));
        let fp = Fingerprint::compute("console.log(42);", "javascript");
        let written = Utc::now();

        cache
            .put_at(&fp, "javascript", &sample_result(), written)
            .await
            .unwrap();

        let just_before = written + chrono::Duration::seconds(59);
        assert!(cache.get_at(&fp, just_before).await.is_some());

        let at_ttl = written + chrono::Duration::seconds(60);
        assert!(cache.get_at(&fp, at_ttl).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_miss_and_removed() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path(), WEEK);
        let fp = Fingerprint::compute("int main() { return 0; }", "c");
        let path = temp_dir.path().join(format!("{}.json", fp));

        std::fs::write(&path, "{ not json").unwrap();

        assert!(cache.get(&fp).await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_mismatched_fingerprint_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path(), WEEK);
        let original = Fingerprint::compute("fn a() {}", "rust");
        let other = Fingerprint::compute("fn b() {}", "rust");

        cache.put(&original, "rust", &sample_result()).await.unwrap();
        std::fs::copy(
            temp_dir.path().join(format!("{}.json", original)),
            temp_dir.path().join(format!("{}.json", other)),
        )
        .unwrap();

        assert!(cache.get(&other).await.is_none());
        assert!(cache.get(&original).await.is_some());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let cache = ResultCache::new(blocker.join("cache"), WEEK);
        let fp = Fingerprint::compute("echo hello world", "bash");

        let err = cache.put(&fp, "bash", &sample_result()).await.unwrap_err();
        assert!(matches!(err, ExplainError::CacheWriteFailure { .. }));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path(), WEEK);
        let first = Fingerprint::compute("x := 1 + 2 + 3", "go");
        let second = Fingerprint::compute("val x = 1 + 2", "scala");

        cache.put(&first, "go", &sample_result()).await.unwrap();
        cache.put(&second, "scala", &sample_result()).await.unwrap();
        std::fs::write(temp_dir.path().join(".tmp-leftover"), "partial").unwrap();

        assert!(cache.invalidate(&first).await.unwrap());
        assert!(!cache.invalidate(&first).await.unwrap());

        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(cache.get(&second).await.is_none());
        assert!(!temp_dir.path().join(".tmp-leftover").exists());
    }

    #[tokio::test]
    async fn test_stats() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path(), Duration::from_secs(3600));
        let now = Utc::now();

        cache
            .put_at(
                &Fingerprint::compute("let a = 1;", "rust"),
                "rust",
                &sample_result(),
                now - chrono::Duration::hours(2),
            )
            .await
            .unwrap();
        cache
            .put_at(
                &Fingerprint::compute("let b = 2;", "rust"),
                "rust",
                &sample_result(),
                now,
            )
            .await
            .unwrap();

        let stats = cache.stats_at(now).await.unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.expired_count, 1);
        assert_eq!(stats.corrupt_count, 0);
        assert!(stats.total_size_bytes > 0);
        assert!(stats.oldest_entry < stats.newest_entry);
    }

    #[tokio::test]
    async fn test_stats_counts_corrupt_records() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path(), WEEK);
        let fp = Fingerprint::compute("fn main() {}", "rust");
        cache.put(&fp, "rust", &sample_result()).await.unwrap();
        let healthy_size = cache.stats().await.unwrap().total_size_bytes;

        std::fs::write(temp_dir.path().join("deadbeef.json"), "{not json").unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.corrupt_count, 1);
        assert_eq!(stats.total_size_bytes, healthy_size + "{not json".len() as u64);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResultCache::new(temp_dir.path().join("absent"), WEEK);

        assert_eq!(cache.clear().await.unwrap(), 0);
        assert_eq!(cache.stats().await.unwrap().entry_count, 0);
    }
}
