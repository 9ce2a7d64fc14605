//! Storage implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "dir")]
pub mod dir;

#[cfg(feature = "memory")]
pub use memory::MemoryStorage;

#[cfg(feature = "dir")]
pub use dir::DirStorage;
