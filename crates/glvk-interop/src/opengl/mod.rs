//! GL half of the shared texture (via `GL_EXT_memory_object_fd`).

pub mod functions;
pub mod import;

pub use functions::{GlMemoryObjectFunctions, MemoryObjectGl, GL_HANDLE_TYPE_OPAQUE_FD_EXT};
pub use import::{import_memory_fd, ForeignTexture, GL_NONE};
