//! Vulkan half of the shared texture (Linux/Unix via `VK_KHR_external_memory_fd`).

pub mod device;
pub mod export;
pub mod handles;

pub use device::{ExternalMemoryDevice, VulkanContext};
pub use export::{
    check_external_memory_support, find_memory_type_index, ExportableImage, EXPORT_HANDLE_TYPE,
};
pub use handles::{UniqueDeviceMemory, UniqueImage, UniqueImageView};
