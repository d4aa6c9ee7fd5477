//! Content digests for change detection.
//!
//! Digests are BLAKE3 over the full file content, rendered as lower-case hex.
//! Files are read in fixed-size chunks so memory stays flat for large files.

use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Read buffer used when hashing files.
const HASH_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Incremental digest state fed with the bytes of one file.
pub trait Digester: Send + Sync {
    fn update(&mut self, data: &[u8]);

    /// Consume the state and return the hex digest.
    fn finalize_hex(self: Box<Self>) -> String;
}

/// Produces content digests for local files.
#[async_trait]
pub trait ContentHasher: Send + Sync {
    /// Digest the file at `path`.
    async fn hash_file(&self, path: &Path) -> io::Result<String>;

    /// Fresh incremental state, for digesting bytes as they stream past.
    fn digester(&self) -> Box<dyn Digester>;
}

struct Blake3Digester(blake3::Hasher);

impl Digester for Blake3Digester {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize_hex(self: Box<Self>) -> String {
        self.0.finalize().to_hex().to_string()
    }
}

/// BLAKE3 hasher; file reads run on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct Blake3Hasher;

#[async_trait]
impl ContentHasher for Blake3Hasher {
    async fn hash_file(&self, path: &Path) -> io::Result<String> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || hash_path(&path))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("hash task failed: {}", e)))?
    }

    fn digester(&self) -> Box<dyn Digester> {
        Box::new(Blake3Digester(blake3::Hasher::new()))
    }
}

/// Hash a file synchronously.
pub fn hash_path(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(HASH_READ_CHUNK_SIZE, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_READ_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
