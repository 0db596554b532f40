//! src/services/object_store.rs
//!
//! Object storage for raw image bytes. Callers resolve a key into either a
//! [`Readable`] or a [`Writable`] handle; the only backend shipped is
//! [`FsObjectStore`], which shards payloads beneath
//! `base_path/{prefix}/{shard}/{shard}/{name}`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    pin::Pin,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("object sink already closed")]
    SinkClosed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Readable stream of object bytes.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// A stored object that can be checked and read.
#[async_trait]
pub trait Readable: Send + Sync {
    async fn exists(&self) -> StorageResult<bool>;
    async fn open(&self) -> StorageResult<ByteStream>;
}

/// A location that bytes can be written to.
#[async_trait]
pub trait Writable: Send + Sync {
    async fn open(&self) -> StorageResult<Box<dyn ObjectSink>>;
}

/// Open write handle.
///
/// Nothing becomes visible to readers until [`ObjectSink::commit`] succeeds.
/// A sink dropped without a commit discards what was written.
#[async_trait]
pub trait ObjectSink: Send {
    async fn write(&mut self, chunk: &[u8]) -> StorageResult<()>;
    /// Flush, make durable and publish. Returns the byte count.
    async fn commit(&mut self) -> StorageResult<u64>;
    async fn abort(&mut self);
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn readable(&self, key: &str) -> StorageResult<Box<dyn Readable>>;
    fn writable(&self, key: &str) -> StorageResult<Box<dyn Writable>>;
    /// Cheap round trip used by readiness checks.
    async fn probe(&self) -> StorageResult<()>;
}

/// Copy `stream` into a fresh sink opened on `target`.
///
/// The sink is always closed: committed when every chunk was written,
/// aborted as soon as reading or writing fails.
pub async fn write_stream<S>(target: &dyn Writable, stream: S) -> StorageResult<u64>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut sink = target.open().await?;
    pin_mut!(stream);
    while let Some(chunk_res) = stream.next().await {
        let written = match chunk_res {
            Ok(chunk) => sink.write(&chunk).await,
            Err(err) => Err(StorageError::Io(err)),
        };
        if let Err(err) = written {
            sink.abort().await;
            return Err(err);
        }
    }
    match sink.commit().await {
        Ok(size) => Ok(size),
        Err(err) => {
            sink.abort().await;
            Err(err)
        }
    }
}

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Local-disk object store.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    base_path: PathBuf,
}

impl FsObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Rejects keys that could escape `base_path` or name a directory.
    pub fn ensure_key_safe(key: &str) -> StorageResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.ends_with('/')
            || key.contains("..")
            || key.contains("//")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Two-level shard directories from MD5(key), as lowercase hex.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/{prefix}/{shard}/{shard}/{name}` where `prefix` is
    /// everything before the last `/` of the key.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let (prefix, name) = key.rsplit_once('/').unwrap_or(("", key));
        let mut path = self.base_path.clone();
        if !prefix.is_empty() {
            path.push(prefix);
        }
        path.push(shard_a);
        path.push(shard_b);
        path.push(name);
        path
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn readable(&self, key: &str) -> StorageResult<Box<dyn Readable>> {
        Self::ensure_key_safe(key)?;
        Ok(Box::new(FsObject {
            key: key.to_string(),
            path: self.object_path(key),
        }))
    }

    fn writable(&self, key: &str) -> StorageResult<Box<dyn Writable>> {
        Self::ensure_key_safe(key)?;
        Ok(Box::new(FsObject {
            key: key.to_string(),
            path: self.object_path(key),
        }))
    }

    async fn probe(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "file content mismatch",
            )));
        }
        Ok(())
    }
}

struct FsObject {
    key: String,
    path: PathBuf,
}

#[async_trait]
impl Readable for FsObject {
    async fn exists(&self) -> StorageResult<bool> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn open(&self) -> StorageResult<ByteStream> {
        let file = File::open(&self.path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::NotFound(self.key.clone())
            } else {
                StorageError::Io(err)
            }
        })?;
        Ok(Box::pin(file))
    }
}

#[async_trait]
impl Writable for FsObject {
    async fn open(&self) -> StorageResult<Box<dyn ObjectSink>> {
        let parent = self.path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let file = File::create(&tmp_path).await?;
        debug!("opened {} for {}", tmp_path.display(), self.key);

        Ok(Box::new(FsSink {
            file: Some(file),
            tmp_path,
            final_path: self.path.clone(),
            size_bytes: 0,
        }))
    }
}

/// Writes into a temp file beside the final path; commit renames it in place.
struct FsSink {
    file: Option<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    size_bytes: u64,
}

#[async_trait]
impl ObjectSink for FsSink {
    async fn write(&mut self, chunk: &[u8]) -> StorageResult<()> {
        let file = self.file.as_mut().ok_or(StorageError::SinkClosed)?;
        file.write_all(chunk).await?;
        self.size_bytes += chunk.len() as u64;
        Ok(())
    }

    async fn commit(&mut self) -> StorageResult<u64> {
        let mut file = self.file.take().ok_or(StorageError::SinkClosed)?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(err) = fs::rename(&self.tmp_path, &self.final_path).await {
            if err.kind() != ErrorKind::AlreadyExists {
                return Err(StorageError::Io(err));
            }
            fs::remove_file(&self.final_path).await?;
            fs::rename(&self.tmp_path, &self.final_path).await?;
        }
        debug!(
            "committed {} bytes to {}",
            self.size_bytes,
            self.final_path.display()
        );
        Ok(self.size_bytes)
    }

    async fn abort(&mut self) {
        self.file = None;
        match fs::remove_file(&self.tmp_path).await {
            Ok(_) => debug!("discarded {}", self.tmp_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => debug!("failed to discard {}: {}", self.tmp_path.display(), err),
        }
    }
}

impl Drop for FsSink {
    fn drop(&mut self) {
        // Sink dropped mid-write, e.g. the request future was cancelled.
        if self.file.is_some() {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}
