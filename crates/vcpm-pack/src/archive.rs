#![forbid(unsafe_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;
use zip::result::ZipError;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::{CompressionMethod, DateTime};

use crate::error::{BuildError, Result};
use crate::select::FileEntry;

pub const ARCHIVE_EXTENSION: &str = "zip";

/// Finished archive held in memory until the output stage persists it.
#[derive(Debug, Clone)]
pub struct ArchiveArtifact {
    pub bytes: Vec<u8>,
    /// Entry names in archive order.
    pub entries: Vec<String>,
    pub uncompressed_bytes: u64,
    /// Hex encoded SHA-256 of `bytes`.
    pub sha256: String,
}

/// Reads every selected file and packs them in selector order.
///
/// Reads run concurrently with at most `max_concurrent_reads` in flight. The
/// first failed read aborts the rest and nothing is encoded.
pub async fn write(entries: &[FileEntry], max_concurrent_reads: usize) -> Result<ArchiveArtifact> {
    let contents = read_all(entries, max_concurrent_reads).await?;
    encode(entries, contents)
}

async fn read_all(entries: &[FileEntry], max_concurrent_reads: usize) -> Result<Vec<Vec<u8>>> {
    let limiter = Arc::new(Semaphore::new(max_concurrent_reads.max(1)));
    let mut tasks = JoinSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let limiter = Arc::clone(&limiter);
        let path = entry.absolute_path.clone();
        tasks.spawn(async move {
            let read = match limiter.acquire_owned().await {
                Ok(_permit) => tokio::fs::read(&path).await,
                Err(err) => Err(std::io::Error::other(err)),
            };
            (index, read)
        });
    }

    let mut contents = vec![Vec::new(); entries.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, read) = match joined {
            Ok(done) => done,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => return Err(BuildError::Cancelled),
        };

        match read {
            Ok(bytes) => contents[index] = bytes,
            Err(source) => {
                tasks.shutdown().await;
                return Err(BuildError::FileUnreadable {
                    path: entries[index].absolute_path.clone(),
                    source,
                });
            }
        }
    }

    Ok(contents)
}

/// Packs already-read file contents. `contents[i]` belongs to `entries[i]`.
pub fn encode(entries: &[FileEntry], contents: Vec<Vec<u8>>) -> Result<ArchiveArtifact> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut names = Vec::with_capacity(entries.len());
    let mut uncompressed_bytes = 0u64;

    for (entry, bytes) in entries.iter().zip(contents) {
        let size = bytes.len() as u64;
        zip.start_file(entry.relative_path.as_str(), entry_options(size))?;
        zip.write_all(&bytes).map_err(ZipError::from)?;
        debug!(path = %entry.relative_path, size, "added archive entry");

        uncompressed_bytes += size;
        names.push(entry.relative_path.clone());
    }

    let bytes = zip.finish()?.into_inner();
    let sha256 = hex::encode(Sha256::digest(&bytes));

    Ok(ArchiveArtifact {
        bytes,
        entries: names,
        uncompressed_bytes,
        sha256,
    })
}

/// Fixed timestamp and permissions keep archives byte-for-byte reproducible.
fn entry_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
        .large_file(size >= u64::from(u32::MAX))
}
