//! Conversation memory for Agentry

mod buffer;

pub use agentry_core::{Memory, MemorySnapshot};
pub use buffer::BufferMemory;
