pub mod backend;
pub mod local;
pub mod memory;
pub mod object;
pub mod types;

pub use backend::{BackendType, ByteStream, StorageBackend};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use object::ObjectBackend;
pub use types::{Entry, EntryKind, EntryMeta};
