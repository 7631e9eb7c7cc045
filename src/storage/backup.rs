//! World snapshots taken before a migration touches the store.
//!
//! A snapshot is a tar.gz of the sled directory plus a SHA-256 checksum,
//! indexed in `snapshots.json` next to the archives.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

const INDEX_FILE: &str = "snapshots.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotReason {
    PreMigration { from: String, to: String },
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Timestamp-based id, also the archive's file stem.
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub reason: SnapshotReason,
    pub size_bytes: u64,
    /// SHA-256 of the archive, hex.
    pub checksum: String,
    pub verified: bool,
    /// Archive path relative to the snapshot directory.
    pub path: PathBuf,
}

pub struct SnapshotManager {
    data_dir: PathBuf,
    snapshot_dir: PathBuf,
    /// Snapshots beyond this count are pruned, oldest first. Zero keeps all.
    keep_last: usize,
    snapshots: HashMap<String, SnapshotMetadata>,
}

impl SnapshotManager {
    pub fn new(data_dir: PathBuf, snapshot_dir: PathBuf, keep_last: usize) -> io::Result<Self> {
        fs::create_dir_all(&snapshot_dir)?;

        let mut manager = Self {
            data_dir,
            snapshot_dir,
            keep_last,
            snapshots: HashMap::new(),
        };
        manager.load_index()?;
        Ok(manager)
    }

    fn load_index(&mut self) -> io::Result<()> {
        let index_path = self.snapshot_dir.join(INDEX_FILE);
        if index_path.exists() {
            let contents = fs::read_to_string(&index_path)?;
            self.snapshots = serde_json::from_str(&contents)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }
        Ok(())
    }

    fn save_index(&self) -> io::Result<()> {
        let contents = serde_json::to_string_pretty(&self.snapshots)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.snapshot_dir.join(INDEX_FILE), contents)
    }

    /// Archive the data directory, then prune past `keep_last`.
    pub fn create(&mut self, reason: SnapshotReason) -> io::Result<SnapshotMetadata> {
        let created_at = Utc::now();
        let id = format!("world_{}", created_at.format("%Y%m%d_%H%M%S_%3f"));
        let filename = format!("{}.tar.gz", id);
        let archive_path = self.snapshot_dir.join(&filename);

        log::info!("Creating world snapshot {} ({:?})", id, reason);

        let enc = GzEncoder::new(File::create(&archive_path)?, Compression::default());
        let mut tar = Builder::new(enc);
        tar.append_dir_all("world", &self.data_dir)?;
        // The gzip stream must be finished before hashing.
        tar.into_inner()?.finish()?;

        let checksum = sha256_file(&archive_path)?;
        let size_bytes = fs::metadata(&archive_path)?.len();
        let metadata = SnapshotMetadata {
            id: id.clone(),
            created_at,
            reason,
            size_bytes,
            checksum,
            verified: false,
            path: PathBuf::from(&filename),
        };
        self.snapshots.insert(id.clone(), metadata.clone());
        self.save_index()?;
        log::info!("Snapshot {} written ({} bytes)", id, size_bytes);

        self.prune()?;
        Ok(metadata)
    }

    fn archive_of(&self, id: &str) -> io::Result<(&SnapshotMetadata, PathBuf)> {
        let metadata = self
            .snapshots
            .get(id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("snapshot {} not found", id)))?;
        let path = self.snapshot_dir.join(&metadata.path);
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("snapshot archive {} missing", path.display()),
            ));
        }
        Ok((metadata, path))
    }

    /// Recompute the checksum; marks the snapshot verified when it matches.
    pub fn verify(&mut self, id: &str) -> io::Result<bool> {
        let (metadata, path) = self.archive_of(id)?;
        let valid = sha256_file(&path)? == metadata.checksum;
        if valid {
            log::info!("Snapshot {} verified", id);
            if let Some(meta) = self.snapshots.get_mut(id) {
                meta.verified = true;
            }
            self.save_index()?;
        } else {
            log::error!("Snapshot {} checksum mismatch", id);
        }
        Ok(valid)
    }

    /// Unpack a snapshot under `target` (the store lands in `target/world`).
    pub fn restore(&self, id: &str, target: &Path) -> io::Result<()> {
        let (metadata, path) = self.archive_of(id)?;
        if sha256_file(&path)? != metadata.checksum {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "snapshot checksum mismatch"));
        }
        log::info!("Restoring snapshot {} to {}", id, target.display());
        fs::create_dir_all(target)?;
        Archive::new(GzDecoder::new(File::open(&path)?)).unpack(target)?;
        Ok(())
    }

    /// Replace the data directory with a snapshot's contents. The current
    /// directory is moved aside to `<data_dir>.pre-restore-<timestamp>` and
    /// that path is returned (`None` when there was nothing to move). The
    /// store must not be open while this runs.
    pub fn rollback(&self, id: &str) -> io::Result<Option<PathBuf>> {
        let name = self
            .data_dir
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "data directory has no name"))?
            .to_string_lossy()
            .into_owned();
        let parent = match self.data_dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let staging = parent.join(format!(".{}.restore-{}", name, stamp));

        if let Err(e) = self.restore(id, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let aside = parent.join(format!("{}.pre-restore-{}", name, stamp));
        let moved = if self.data_dir.exists() {
            fs::rename(&self.data_dir, &aside)?;
            Some(aside)
        } else {
            None
        };
        if let Err(e) = fs::rename(staging.join("world"), &self.data_dir) {
            log::error!("Rollback to {} failed: {}", id, e);
            if let Some(aside) = &moved {
                fs::rename(aside, &self.data_dir)?;
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        fs::remove_dir_all(&staging)?;
        log::info!("Data directory {} rolled back to {}", self.data_dir.display(), id);
        Ok(moved)
    }

    /// Newest first.
    pub fn list(&self) -> Vec<SnapshotMetadata> {
        let mut snapshots: Vec<_> = self.snapshots.values().cloned().collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    pub fn get(&self, id: &str) -> Option<&SnapshotMetadata> {
        self.snapshots.get(id)
    }

    fn prune(&mut self) -> io::Result<Vec<String>> {
        if self.keep_last == 0 {
            return Ok(Vec::new());
        }
        let stale: Vec<String> = self
            .list()
            .into_iter()
            .skip(self.keep_last)
            .map(|s| s.id)
            .collect();
        for id in &stale {
            if let Some(metadata) = self.snapshots.remove(id) {
                let path = self.snapshot_dir.join(&metadata.path);
                if path.exists() {
                    fs::remove_file(&path)?;
                }
                log::info!("Pruned snapshot {}", id);
            }
        }
        if !stale.is_empty() {
            self.save_index()?;
        }
        Ok(stale)
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    use sha2::{Digest, Sha256};

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
