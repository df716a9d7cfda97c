//! Content-addressed artifact storage
//!
//! Keys are `{repository_id}/{artifact_type}/{function_key}/{sha256}`. The
//! identifier is the SHA-256 of the content, so writing the same artifact
//! twice is a no-op.

use crate::error::StoreError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// zstd compression level for artifacts on disk
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactType {
    Diffs,
    CallGraphs,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Diffs => "diffs",
            ArtifactType::CallGraphs => "call-graphs",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hierarchical key of one artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey {
    pub repository_id: String,
    pub artifact: ArtifactType,
    pub function_key: String,
    /// Hex SHA-256 of the content
    pub identifier: String,
}

impl BlobKey {
    /// Key addressing `content`
    pub fn for_content(
        repository_id: &str,
        artifact: ArtifactType,
        function_key: &str,
        content: &[u8],
    ) -> Self {
        BlobKey {
            repository_id: repository_id.to_string(),
            artifact,
            function_key: function_key.to_string(),
            identifier: sha256_hex(content),
        }
    }

    /// Path-safe form; each segment is escaped so it stays one component
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            encode_segment(&self.repository_id),
            self.artifact,
            encode_segment(&self.function_key),
            self.identifier
        )
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.repository_id, self.artifact, self.function_key, self.identifier
        )
    }
}

fn sha256_hex(content: &[u8]) -> String {
    Sha256::digest(content)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '#' => out.push_str("%23"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    if out == "." || out == ".." {
        out = out.replace('.', "%2E");
    }
    out
}

/// Artifact store for diffs and call-graph snapshots
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `content` under `key`; rewriting an existing key is a no-op
    async fn put(&self, key: &BlobKey, content: &[u8]) -> Result<(), StoreError>;

    async fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobKey, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Keys of one artifact type, sorted
    pub async fn keys(&self, artifact: ArtifactType) -> Vec<BlobKey> {
        let mut keys: Vec<BlobKey> = self
            .blobs
            .read()
            .await
            .keys()
            .filter(|k| k.artifact == artifact)
            .cloned()
            .collect();
        keys.sort_by_key(|k| k.path());
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &BlobKey, content: &[u8]) -> Result<(), StoreError> {
        self.blobs
            .write()
            .await
            .entry(key.clone())
            .or_insert_with(|| content.to_vec());
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().await.get(key).cloned())
    }
}

/// Filesystem artifact store with zstd-compressed files
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsBlobStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, key: &BlobKey) -> PathBuf {
        self.root.join(format!("{}.zst", key.path()))
    }
}

fn write_compressed(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let compressed = zstd::encode_all(content, COMPRESSION_LEVEL)?;
    // write then rename so readers never observe a partial file
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    std::fs::write(&tmp, compressed)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_compressed(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(zstd::decode_all(bytes.as_slice())?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &BlobKey, content: &[u8]) -> Result<(), StoreError> {
        let path = self.file_for(key);
        let content = content.to_vec();
        debug!(key = %key, bytes = content.len(), "writing artifact");
        tokio::task::spawn_blocking(move || write_compressed(&path, &content))
            .await
            .map_err(|e| StoreError::Unavailable(format!("blob task failed: {}", e)))?
    }

    async fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.file_for(key);
        tokio::task::spawn_blocking(move || read_compressed(&path))
            .await
            .map_err(|e| StoreError::Unavailable(format!("blob task failed: {}", e)))?
    }
}
