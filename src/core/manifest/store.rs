//! On-disk artifact layout
//!
//! ```text
//! <root>/<table>/manifest.json
//! <root>/<table>/<table>.000000.<ext>[.gz]
//! ```
//!
//! Every file is written under a temporary name in the same directory and
//! renamed into place, so a reader never sees a partial batch or manifest.

use super::Manifest;
use crate::core::codec::Format;
use crate::domain::{Result, TabportError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Reads and writes batch files and manifests under one root directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_dir(&self, table: &str) -> Result<PathBuf> {
        if table.is_empty()
            || table == "."
            || table == ".."
            || table.contains(['/', '\\'])
        {
            return Err(TabportError::Configuration(format!(
                "table name '{table}' cannot be used as a directory name"
            )));
        }
        Ok(self.root.join(table))
    }

    pub fn manifest_path(&self, table: &str) -> Result<PathBuf> {
        Ok(self.table_dir(table)?.join(MANIFEST_FILE))
    }

    /// `<table>.<sequence:06>.<ext>[.gz]`
    pub fn batch_file_name(table: &str, sequence: usize, format: Format, compressed: bool) -> String {
        let mut name = format!("{table}.{sequence:06}.{}", format.extension());
        if compressed {
            name.push_str(".gz");
        }
        name
    }

    /// Create the table directory and drop a stale manifest from a previous run
    pub async fn prepare_table_dir(&self, table: &str) -> Result<PathBuf> {
        let dir = self.table_dir(table)?;
        tokio::fs::create_dir_all(&dir).await?;

        let manifest = dir.join(MANIFEST_FILE);
        if tokio::fs::try_exists(&manifest).await? {
            tokio::fs::remove_file(&manifest).await?;
        }
        Ok(dir)
    }

    /// Write one batch file atomically, compressing when asked
    ///
    /// Returns the number of bytes written to disk.
    pub async fn write_batch(
        &self,
        table: &str,
        file_name: &str,
        bytes: &[u8],
        compress: bool,
    ) -> Result<u64> {
        let path = self.table_dir(table)?.join(file_name);
        let payload = if compress {
            gzip(bytes)?
        } else {
            bytes.to_vec()
        };
        let written = payload.len() as u64;
        write_atomic(&path, &payload).await?;
        Ok(written)
    }

    /// Read one batch file, decompressing when needed
    pub async fn read_batch(&self, table: &str, file_name: &str, compressed: bool) -> Result<Vec<u8>> {
        let path = self.table_dir(table)?.join(file_name);
        let raw = tokio::fs::read(&path).await.map_err(|e| {
            TabportError::Io(format!("failed to read {}: {e}", path.display()))
        })?;

        if compressed {
            gunzip(&raw).map_err(|e| {
                TabportError::Serialization(format!("{}: {e}", path.display()))
            })
        } else {
            Ok(raw)
        }
    }

    pub async fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf> {
        let path = self.manifest_path(&manifest.table)?;
        let mut json = serde_json::to_vec_pretty(manifest)?;
        json.push(b'\n');
        write_atomic(&path, &json).await?;
        Ok(path)
    }

    /// Load and validate a table's manifest
    ///
    /// A missing or unparsable manifest is a configuration error.
    pub async fn read_manifest(&self, table: &str) -> Result<Manifest> {
        let path = self.manifest_path(table)?;
        let contents = tokio::fs::read(&path).await.map_err(|e| {
            TabportError::Configuration(format!("manifest {} unavailable: {e}", path.display()))
        })?;

        let manifest: Manifest = serde_json::from_slice(&contents).map_err(|e| {
            TabportError::Configuration(format!("manifest {} is invalid: {e}", path.display()))
        })?;

        if manifest.table != table {
            return Err(TabportError::Configuration(format!(
                "manifest {} describes table '{}'",
                path.display(),
                manifest.table
            )));
        }
        manifest.validate()?;
        Ok(manifest)
    }

    /// Table names that have a manifest under the root, sorted
    pub async fn discover(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            TabportError::Configuration(format!(
                "input directory {} unavailable: {e}",
                self.root.display()
            ))
        })?;

        let mut tables = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if tokio::fs::try_exists(entry.path().join(MANIFEST_FILE)).await? {
                if let Some(name) = entry.file_name().to_str() {
                    tables.push(name.to_string());
                }
            }
        }

        tables.sort();
        Ok(tables)
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TabportError::Io(format!("invalid path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let mut file = tokio::fs::File::create(&tmp).await?;
    let result = async {
        tokio::io::AsyncWriteExt::write_all(&mut file, bytes).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(TabportError::Io(format!("failed to write {}: {e}", path.display())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::{BatchEntry, TOOL_VERSION};
    use crate::core::verification::checksum::{calculate_checksum_bytes, EMPTY_TABLE_CHECKSUM};
    use chrono::Utc;
    use tempfile::TempDir;

    fn empty_manifest(table: &str) -> Manifest {
        Manifest {
            table: table.to_string(),
            format: Format::Sql,
            compressed: false,
            row_count: 0,
            batch_count: 0,
            checksum: EMPTY_TABLE_CHECKSUM.to_string(),
            created_at: Utc::now(),
            columns: vec!["id".to_string()],
            batches: vec![],
            where_clause: None,
            query: None,
            tool_version: TOOL_VERSION.to_string(),
        }
    }

    #[test]
    fn test_batch_file_name() {
        assert_eq!(
            ArtifactStore::batch_file_name("users", 2, Format::Csv, true),
            "users.000002.csv.gz"
        );
        assert_eq!(
            ArtifactStore::batch_file_name("users", 0, Format::Sql, false),
            "users.000000.sql"
        );
    }

    #[test]
    fn test_table_dir_rejects_paths() {
        let store = ArtifactStore::new("/tmp/out");
        assert!(store.table_dir("public.users").is_ok());
        assert!(store.table_dir("../etc").is_err());
        assert!(store.table_dir("..").is_err());
    }

    #[tokio::test]
    async fn test_compressed_batch_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.prepare_table_dir("users").await.unwrap();

        let payload = b"\"id\"\n1\n2\n".repeat(100);
        let written = store
            .write_batch("users", "users.000000.csv.gz", &payload, true)
            .await
            .unwrap();
        assert!(written < payload.len() as u64);

        let read = store
            .read_batch("users", "users.000000.csv.gz", true)
            .await
            .unwrap();
        assert_eq!(read, payload);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.prepare_table_dir("users").await.unwrap();
        store
            .write_batch("users", "users.000000.sql", b"", false)
            .await
            .unwrap();
        store.write_manifest(&empty_manifest("users")).await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path().join("users"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["manifest.json", "users.000000.sql"]);
    }

    #[tokio::test]
    async fn test_manifest_round_trip_and_discover() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        for table in ["orders", "users"] {
            store.prepare_table_dir(table).await.unwrap();
            store.write_manifest(&empty_manifest(table)).await.unwrap();
        }
        // A directory without a manifest is not a table
        std::fs::create_dir(dir.path().join("scratch")).unwrap();

        assert_eq!(store.discover().await.unwrap(), vec!["orders", "users"]);

        let manifest = store.read_manifest("users").await.unwrap();
        assert_eq!(manifest.checksum, EMPTY_TABLE_CHECKSUM);
    }

    #[tokio::test]
    async fn test_missing_or_corrupt_manifest_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let err = store.read_manifest("ghost").await.unwrap_err();
        assert!(matches!(err, TabportError::Configuration(_)));

        store.prepare_table_dir("users").await.unwrap();
        std::fs::write(dir.path().join("users").join(MANIFEST_FILE), b"{not json").unwrap();
        let err = store.read_manifest("users").await.unwrap_err();
        assert!(matches!(err, TabportError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_manifest_for_other_table_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.prepare_table_dir("users").await.unwrap();

        let mut manifest = empty_manifest("users");
        manifest.batches.push(BatchEntry {
            sequence: 0,
            rows: 0,
            file: "users.000000.sql".to_string(),
            digest: calculate_checksum_bytes(b""),
        });
        manifest.batch_count = 1;
        store.write_manifest(&manifest).await.unwrap();

        // Rename the directory so the manifest no longer matches its location
        std::fs::rename(dir.path().join("users"), dir.path().join("people")).unwrap();
        assert!(store.read_manifest("people").await.is_err());
    }
}
