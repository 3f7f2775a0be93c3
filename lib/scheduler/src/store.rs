//! The [`JobStore`] trait and its implementations: a file-backed store
//! (§4.1, §6.4) and an in-memory test double.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::JobStoreError;
use crate::job::{Job, JobStatus};

/// Persistent key-value store keyed by `Job::id` (§4.1).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Validates, preserves existing `created_at` on overwrite, refreshes
    /// `updated_at`, and writes atomically.
    async fn save(&self, job: Job) -> Result<Job, JobStoreError>;

    /// Returns the job or `NotFound`. An empty id is a validation error.
    async fn load(&self, id: &str) -> Result<Job, JobStoreError>;

    /// Returns all jobs sorted by `created_at` ascending. Corrupt records
    /// are skipped, not fatal.
    async fn list(&self) -> Result<Vec<Job>, JobStoreError>;

    /// Removes the job; `NotFound` if absent.
    async fn delete(&self, id: &str) -> Result<(), JobStoreError>;

    /// Load-modify-save: updates only `status` (and `updated_at`),
    /// preserving every other field.
    async fn update_status(&self, id: &str, status: JobStatus) -> Result<Job, JobStoreError> {
        let mut job = self.load(id).await?;
        job.status = status;
        job.updated_at = chrono::Utc::now();
        self.save(job).await
    }
}

fn validate_id(id: &str) -> Result<(), JobStoreError> {
    if id.trim().is_empty() {
        return Err(JobStoreError::Validation { reason: "id must not be empty".to_string() });
    }
    Ok(())
}

/// File-backed job store: one file per job, named `{id}.json`, written
/// atomically via a temp-file-then-rename so a crash mid-write leaves the
/// prior version on disk intact.
pub struct FileJobStore {
    dir: PathBuf,
    // Serializes writers against each other; atomic rename already keeps
    // readers from observing a half-written file without needing to take
    // this lock themselves.
    write_lock: Mutex<()>,
}

impl FileJobStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_lock: Mutex::new(()) }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn ensure_dir(&self) -> Result<(), JobStoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| JobStoreError::Io { reason: format!("creating store directory: {e}") })
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn save(&self, mut job: Job) -> Result<Job, JobStoreError> {
        job.validate()?;
        let _guard = self.write_lock.lock().await;
        self.ensure_dir().await?;

        let path = self.path_for(&job.id);
        let now = chrono::Utc::now();
        if let Ok(existing_bytes) = tokio::fs::read(&path).await {
            if let Ok(existing) = serde_json::from_slice::<Job>(&existing_bytes) {
                job.created_at = existing.created_at;
            }
        }
        job.updated_at = now;

        let bytes = serde_json::to_vec_pretty(&job)
            .map_err(|e| JobStoreError::Io { reason: format!("serializing job: {e}") })?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| JobStoreError::Io { reason: format!("writing temp file: {e}") })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| JobStoreError::Io { reason: format!("renaming into place: {e}") })?;

        Ok(job)
    }

    async fn load(&self, id: &str) -> Result<Job, JobStoreError> {
        validate_id(id)?;
        let path = self.path_for(id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| JobStoreError::NotFound { id: id.to_string() })?;
        serde_json::from_slice(&bytes).map_err(|e| JobStoreError::Io { reason: format!("decoding job {id}: {e}") })
    }

    async fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JobStoreError::Io { reason: format!("reading store directory: {e}") }),
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| JobStoreError::Io { reason: format!("iterating store directory: {e}") })?
        {
            let path = entry.path();
            if !is_job_file(&path) {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else { continue };
            let Ok(job) = serde_json::from_slice::<Job>(&bytes) else { continue };
            jobs.push(job);
        }

        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn delete(&self, id: &str) -> Result<(), JobStoreError> {
        validate_id(id)?;
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(id);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|_| JobStoreError::NotFound { id: id.to_string() })
    }
}

fn is_job_file(path: &Path) -> bool {
    path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false)
}

/// In-memory job store for tests.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, mut job: Job) -> Result<Job, JobStoreError> {
        job.validate()?;
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs.get(&job.id) {
            job.created_at = existing.created_at;
        }
        job.updated_at = chrono::Utc::now();
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn load(&self, id: &str) -> Result<Job, JobStoreError> {
        validate_id(id)?;
        self.jobs.read().await.get(id).cloned().ok_or_else(|| JobStoreError::NotFound { id: id.to_string() })
    }

    async fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn delete(&self, id: &str) -> Result<(), JobStoreError> {
        validate_id(id)?;
        self.jobs.write().await.remove(id).map(|_| ()).ok_or_else(|| JobStoreError::NotFound { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> Job {
        Job::new(id, id, "0 9 * * 1", "go")
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJobStore::new(dir.path());
        let saved = store.save(job("daily")).await.expect("save");
        let loaded = store.load("daily").await.expect("load");
        assert_eq!(saved.id, loaded.id);
        assert_eq!(loaded.payload, serde_json::json!({}));
    }

    #[tokio::test]
    async fn save_preserves_created_at_on_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJobStore::new(dir.path());
        let first = store.save(job("daily")).await.expect("save");
        let mut second = first.clone();
        second.created_at = chrono::Utc::now() + chrono::Duration::days(1);
        let saved = store.save(second).await.expect("save again");
        assert_eq!(saved.created_at, first.created_at);
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJobStore::new(dir.path());
        let err = store.load("nope").await.unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn load_empty_id_is_validation_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJobStore::new(dir.path());
        let err = store.load("").await.unwrap_err();
        assert!(matches!(err, JobStoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJobStore::new(dir.path());
        let err = store.delete("nope").await.unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_after_save_then_load_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJobStore::new(dir.path());
        store.save(job("daily")).await.expect("save");
        store.delete("daily").await.expect("delete");
        let err = store.load("daily").await.unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_sorted_by_created_at_ascending() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJobStore::new(dir.path());
        let mut a = job("a");
        a.created_at = chrono::Utc::now();
        let mut b = job("b");
        b.created_at = a.created_at - chrono::Duration::hours(1);
        store.save(a).await.expect("save a");
        store.save(b).await.expect("save b");

        let listed = store.list().await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "b");
        assert_eq!(listed[1].id, "a");
    }

    #[tokio::test]
    async fn list_skips_corrupt_and_non_job_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJobStore::new(dir.path());
        store.save(job("good")).await.expect("save");
        tokio::fs::write(dir.path().join("corrupt.json"), b"not json").await.expect("write corrupt");
        tokio::fs::write(dir.path().join("notes.txt"), b"ignore me").await.expect("write non-job");
        tokio::fs::create_dir(dir.path().join("subdir")).await.expect("mkdir");

        let listed = store.list().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "good");
    }

    #[tokio::test]
    async fn list_on_nonexistent_directory_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("does-not-exist-yet");
        let store = FileJobStore::new(missing);
        let listed = store.list().await.expect("list");
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn update_status_preserves_other_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJobStore::new(dir.path());
        let saved = store
            .save(job("daily").with_payload(serde_json::json!({"recipients": ["a@b.com"]})))
            .await
            .expect("save");
        let updated = store.update_status("daily", JobStatus::Paused).await.expect("update status");
        assert_eq!(updated.status, JobStatus::Paused);
        assert_eq!(updated.payload, saved.payload);
        assert_eq!(updated.created_at, saved.created_at);
    }

    #[tokio::test]
    async fn in_memory_store_roundtrips() {
        let store = InMemoryJobStore::new();
        store.save(job("daily")).await.expect("save");
        let loaded = store.load("daily").await.expect("load");
        assert_eq!(loaded.id, "daily");
    }
}
