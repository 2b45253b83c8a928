//! Zero-copy texture sharing between Vulkan and OpenGL.
//!
//! [`GlvkTextureSource`] allocates a linear-tiled Vulkan image on a
//! dedicated, exportable memory block, exports that memory as an opaque file
//! descriptor and imports it into GL through `GL_EXT_memory_object_fd`. The
//! result is one allocation reachable as a `VkImage`/`VkImageView` and as a
//! GL texture name.
//!
//! The Vulkan device and GL entry points are reached through the
//! [`ExternalMemoryDevice`] and [`MemoryObjectGl`] traits, implemented for
//! real drivers by [`VulkanContext`] and [`GlMemoryObjectFunctions`].

pub mod descriptor;
pub mod error;
pub mod logging;
pub mod source;

pub use descriptor::{PixelFormat, TextureDescriptor, TextureSize};
pub use error::{ErrorKind, InteropError};
pub use logging::init_logging;
pub use source::TextureSource;

// File descriptor handles only exist on Unix.

#[cfg(unix)]
pub mod interop;
#[cfg(unix)]
pub mod opengl;
#[cfg(unix)]
pub mod vulkan;

#[cfg(unix)]
pub use interop::GlvkTextureSource;
#[cfg(unix)]
pub use opengl::{GlMemoryObjectFunctions, MemoryObjectGl};
#[cfg(unix)]
pub use vulkan::{ExternalMemoryDevice, VulkanContext};

#[cfg(all(test, unix))]
pub(crate) mod testing;
