//! Execution log store.
//!
//! Two durable artifacts per automation:
//! - one uniquely named execution-record file per run, never touched again;
//! - a rotating history file of compact entries, with an explicit rotation
//!   manifest (ordered file list with entry counts and corrupted flags)
//!   instead of filename-pattern discovery.
//!
//! History appends for the same automation are serialized through a
//! per-base async lock; the whole-array read-modify-write would otherwise
//! lose entries under concurrent runs. Reads merge the primary file and all
//! non-corrupted rotations, newest first, skipping files that fail to parse.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::LogStoreConfig;
use crate::error::LogError;
use crate::pipeline::types::{ExecutionRecord, HistoryEntry};

/// Ordered rotation state for one history base name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RotationManifest {
    files: Vec<RotatedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RotatedFile {
    name: String,
    entries: usize,
    #[serde(default)]
    corrupted: bool,
}

/// One page of merged history, newest first.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    /// Total entries across all readable files, before paging.
    pub total_entries: usize,
    /// Number of files that contributed entries to the merge.
    pub total_files: usize,
}

/// Durable store for execution records and rotating history logs.
pub struct ExecutionLogStore {
    config: LogStoreConfig,
    /// Per-base append locks. Guards the read-modify-write of the primary
    /// history file and its manifest.
    history_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ExecutionLogStore {
    pub fn new(config: LogStoreConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            history_locks: Mutex::new(HashMap::new()),
        })
    }

    fn primary_path(&self, base: &str) -> PathBuf {
        self.config.logs_dir.join(format!("{base}.json"))
    }

    fn manifest_path(&self, base: &str) -> PathBuf {
        self.config.logs_dir.join(format!("{base}.manifest.json"))
    }

    fn rotation_name(base: &str, index: usize) -> String {
        format!("{base}.{index}.json")
    }

    async fn lock_for(&self, base: &str) -> Arc<Mutex<()>> {
        self.history_locks
            .lock()
            .await
            .entry(base.to_string())
            .or_default()
            .clone()
    }

    async fn ensure_dir(&self) -> Result<(), LogError> {
        tokio::fs::create_dir_all(&self.config.logs_dir).await?;
        Ok(())
    }

    // ── Execution records ───────────────────────────────────────────

    /// Persist a full execution record as its own file.
    ///
    /// Filename: `<automation-id>-<timestamp-with-millis>.json`. One file
    /// per run; concurrent runs of the same automation write distinct files.
    pub async fn write_execution_record(
        &self,
        record: &ExecutionRecord,
    ) -> Result<PathBuf, LogError> {
        self.ensure_dir().await?;
        let suffix = record.timestamp.format("%Y%m%dT%H%M%S%3f");
        let path = self
            .config
            .logs_dir
            .join(format!("{}-{}.json", record.automation_id, suffix));
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, json).await?;
        debug!(path = %path.display(), "Execution record written");
        Ok(path)
    }

    /// Read a single execution record back (used by tooling and tests).
    pub async fn read_execution_record(&self, path: &Path) -> Result<ExecutionRecord, LogError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    // ── History log ─────────────────────────────────────────────────

    /// Append a compact entry to the automation's rotating history log.
    pub async fn append_history(&self, base: &str, entry: HistoryEntry) -> Result<(), LogError> {
        let lock = self.lock_for(base).await;
        let _guard = lock.lock().await;

        self.ensure_dir().await?;
        let primary = self.primary_path(base);

        let mut entries = match read_entry_file(&primary).await {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                // A corrupt primary is rotated aside (flagged in the
                // manifest) so future appends start clean and reads know to
                // skip it.
                warn!(base, error = %e, "Primary history file corrupt; rotating it aside");
                self.rotate_aside_corrupt(base, &primary).await?;
                Vec::new()
            }
        };

        entries.push(entry);

        if entries.len() >= self.config.max_history_entries {
            self.rotate(base, &entries).await?;
            write_entry_file(&primary, &[]).await?;
        } else {
            write_entry_file(&primary, &entries).await?;
        }
        Ok(())
    }

    /// Move the current entry set into the next numbered rotation file.
    async fn rotate(&self, base: &str, entries: &[HistoryEntry]) -> Result<(), LogError> {
        let mut manifest = self.load_manifest(base).await;
        let name = Self::rotation_name(base, manifest.files.len() + 1);
        write_entry_file(&self.config.logs_dir.join(&name), entries).await?;
        manifest.files.push(RotatedFile {
            name: name.clone(),
            entries: entries.len(),
            corrupted: false,
        });
        self.store_manifest(base, &manifest).await?;
        debug!(base, file = %name, count = entries.len(), "History rotated");
        Ok(())
    }

    async fn rotate_aside_corrupt(&self, base: &str, primary: &Path) -> Result<(), LogError> {
        let mut manifest = self.load_manifest(base).await;
        let name = Self::rotation_name(base, manifest.files.len() + 1);
        tokio::fs::rename(primary, self.config.logs_dir.join(&name)).await?;
        manifest.files.push(RotatedFile {
            name,
            entries: 0,
            corrupted: true,
        });
        self.store_manifest(base, &manifest).await?;
        Ok(())
    }

    async fn load_manifest(&self, base: &str) -> RotationManifest {
        let path = self.manifest_path(base);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(base, error = %e, "Manifest unreadable; starting a fresh one");
                RotationManifest::default()
            }),
            Err(_) => RotationManifest::default(),
        }
    }

    async fn store_manifest(&self, base: &str, manifest: &RotationManifest) -> Result<(), LogError> {
        let json = serde_json::to_string_pretty(manifest)?;
        tokio::fs::write(self.manifest_path(base), json).await?;
        Ok(())
    }

    /// Read a page of merged history, most recent entries first.
    ///
    /// File order: primary first, then rotations newest-first. Files marked
    /// corrupted in the manifest are excluded up front; files that fail to
    /// parse are logged and skipped without aborting the read. Pages are
    /// 1-based.
    pub async fn read_history(
        &self,
        base: &str,
        page: usize,
        page_size: usize,
    ) -> Result<HistoryPage, LogError> {
        let mut files: Vec<PathBuf> = vec![self.primary_path(base)];

        let manifest = self.load_manifest(base).await;
        if manifest.files.is_empty() {
            files.extend(self.scan_rotation_files(base).await);
        } else {
            files.extend(
                manifest
                    .files
                    .iter()
                    .rev()
                    .filter(|f| !f.corrupted)
                    .map(|f| self.config.logs_dir.join(&f.name)),
            );
        }

        let mut all = Vec::new();
        let mut total_files = 0usize;
        for path in &files {
            match read_entry_file(path).await {
                // An empty primary (left behind by rotation) contributes
                // nothing and is not counted.
                Ok(Some(entries)) if entries.is_empty() => {}
                Ok(Some(mut entries)) => {
                    let source = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("")
                        .to_string();
                    for entry in &mut entries {
                        if entry.source_file.is_none() {
                            entry.source_file = Some(source.clone());
                        }
                    }
                    total_files += 1;
                    all.extend(entries);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable history file");
                }
            }
        }

        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total_entries = all.len();

        let page = page.max(1);
        let offset = (page - 1) * page_size;
        let entries = all.into_iter().skip(offset).take(page_size).collect();

        Ok(HistoryPage {
            entries,
            total_entries,
            total_files,
        })
    }

    /// Legacy fallback for manifest-less directories: discover rotation
    /// files by parsing `<base>.<n>.json` names, highest n first.
    async fn scan_rotation_files(&self, base: &str) -> Vec<PathBuf> {
        let Ok(mut dir) = tokio::fs::read_dir(&self.config.logs_dir).await else {
            return Vec::new();
        };
        let prefix = format!("{base}.");
        let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
        while let Ok(Some(item)) = dir.next_entry().await {
            let name = item.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(middle) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            if let Ok(n) = middle.parse::<u32>() {
                numbered.push((n, item.path()));
            }
        }
        numbered.sort_by(|a, b| b.0.cmp(&a.0));
        numbered.into_iter().map(|(_, path)| path).collect()
    }
}

/// Read a history array file. `Ok(None)` means the file does not exist.
async fn read_entry_file(path: &Path) -> Result<Option<Vec<HistoryEntry>>, LogError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let entries = serde_json::from_str(&raw).map_err(|e| LogError::Corrupt {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(Some(entries))
}

async fn write_entry_file(path: &Path, entries: &[HistoryEntry]) -> Result<(), LogError> {
    let json = serde_json::to_string_pretty(entries)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ExecutionRecord;
    use crate::registry::test_support::chat_automation;
    use chrono::{Duration, Utc};

    fn store_at(dir: &Path, max_entries: usize) -> Arc<ExecutionLogStore> {
        ExecutionLogStore::new(LogStoreConfig {
            logs_dir: dir.to_path_buf(),
            max_history_entries: max_entries,
        })
    }

    fn entry(i: i64) -> HistoryEntry {
        HistoryEntry {
            entry_type: "sent".to_string(),
            message: format!("message {i}"),
            notes: String::new(),
            timestamp: Utc::now() - Duration::seconds(1000 - i),
            source_file: None,
        }
    }

    #[tokio::test]
    async fn execution_record_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 100);
        let record = ExecutionRecord::new(&chat_automation("a1"));

        let path = store.write_execution_record(&record).await.unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("a1-"));

        let restored = store.read_execution_record(&path).await.unwrap();
        assert_eq!(restored.run_id, record.run_id);
    }

    #[tokio::test]
    async fn history_roundtrip_all_entries_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 100);
        for i in 0..5 {
            store.append_history("base", entry(i)).await.unwrap();
        }

        let page = store.read_history("base", 1, 5).await.unwrap();
        assert_eq!(page.total_entries, 5);
        assert_eq!(page.entries.len(), 5);
        // Newest first
        assert_eq!(page.entries[0].message, "message 4");
        assert_eq!(page.entries[4].message, "message 0");
    }

    #[tokio::test]
    async fn rotation_spills_to_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 3);
        for i in 0..7 {
            store.append_history("base", entry(i)).await.unwrap();
        }

        // 7 appends at max 3: rotations at entries 3 and 6, one left in primary.
        assert!(dir.path().join("base.1.json").exists());
        assert!(dir.path().join("base.2.json").exists());
        assert!(dir.path().join("base.manifest.json").exists());

        let page = store.read_history("base", 1, 100).await.unwrap();
        assert_eq!(page.total_entries, 7);
        assert_eq!(page.total_files, 3);
        assert_eq!(page.entries[0].message, "message 6");
        assert_eq!(page.entries[6].message, "message 0");
    }

    #[tokio::test]
    async fn empty_primary_after_rotation_is_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 3);
        // Exactly max entries: everything rotates, primary is left empty.
        for i in 0..3 {
            store.append_history("base", entry(i)).await.unwrap();
        }
        assert!(dir.path().join("base.json").exists());

        let page = store.read_history("base", 1, 100).await.unwrap();
        assert_eq!(page.total_entries, 3);
        assert_eq!(page.total_files, 1);
    }

    #[tokio::test]
    async fn entries_are_tagged_with_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 3);
        for i in 0..4 {
            store.append_history("base", entry(i)).await.unwrap();
        }

        let page = store.read_history("base", 1, 100).await.unwrap();
        let sources: Vec<&str> = page
            .entries
            .iter()
            .map(|e| e.source_file.as_deref().unwrap())
            .collect();
        assert!(sources.contains(&"base.json"));
        assert!(sources.contains(&"base.1.json"));
    }

    #[tokio::test]
    async fn corrupt_rotation_file_does_not_affect_others() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 3);
        for i in 0..7 {
            store.append_history("base", entry(i)).await.unwrap();
        }

        tokio::fs::write(dir.path().join("base.1.json"), "{ not json")
            .await
            .unwrap();

        let page = store.read_history("base", 1, 100).await.unwrap();
        // The 3 entries of base.1.json are gone; the other 4 are intact.
        assert_eq!(page.total_entries, 4);
        assert_eq!(page.total_files, 2);
    }

    #[tokio::test]
    async fn corrupt_primary_is_rotated_aside_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 100);
        tokio::fs::write(dir.path().join("base.json"), "garbage")
            .await
            .unwrap();

        store.append_history("base", entry(0)).await.unwrap();

        let page = store.read_history("base", 1, 100).await.unwrap();
        assert_eq!(page.total_entries, 1);

        let manifest_raw = tokio::fs::read_to_string(dir.path().join("base.manifest.json"))
            .await
            .unwrap();
        let manifest: RotationManifest = serde_json::from_str(&manifest_raw).unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert!(manifest.files[0].corrupted);
    }

    #[tokio::test]
    async fn pagination_slices_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 100);
        for i in 0..45 {
            store.append_history("base", entry(i)).await.unwrap();
        }

        let page = store.read_history("base", 2, 20).await.unwrap();
        assert_eq!(page.total_entries, 45);
        assert_eq!(page.entries.len(), 20);
        // Offset 20 into newest-first order: messages 24..=5.
        assert_eq!(page.entries[0].message, "message 24");
        assert_eq!(page.entries[19].message, "message 5");

        let page3 = store.read_history("base", 3, 20).await.unwrap();
        assert_eq!(page3.entries.len(), 5);
    }

    #[tokio::test]
    async fn manifest_less_directory_falls_back_to_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 100);

        write_entry_file(&dir.path().join("base.json"), &[entry(3)])
            .await
            .unwrap();
        write_entry_file(&dir.path().join("base.1.json"), &[entry(1)])
            .await
            .unwrap();
        write_entry_file(&dir.path().join("base.2.json"), &[entry(2)])
            .await
            .unwrap();

        let page = store.read_history("base", 1, 100).await.unwrap();
        assert_eq!(page.total_entries, 3);
        assert_eq!(page.total_files, 3);
        assert_eq!(page.entries[0].message, "message 3");
    }

    #[tokio::test]
    async fn concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 1000);

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append_history("base", entry(i)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let page = store.read_history("base", 1, 100).await.unwrap();
        assert_eq!(page.total_entries, 20);
    }

    #[tokio::test]
    async fn missing_history_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), 100);
        let page = store.read_history("nothing", 1, 10).await.unwrap();
        assert_eq!(page.total_entries, 0);
        assert_eq!(page.total_files, 0);
        assert!(page.entries.is_empty());
    }
}
