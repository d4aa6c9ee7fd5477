//! Local filesystem access: partition discovery, traversal and hashing.

pub mod checksum;
pub mod dates;
pub mod walker;

pub use checksum::{Blake3Hasher, ContentHasher, Digester};
pub use dates::{filter_dates, DateSource, DirectoryDateSource};
pub use walker::{CollectError, FileCollector, FileDescriptor};
