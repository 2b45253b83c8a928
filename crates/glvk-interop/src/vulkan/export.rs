//! Exportable image allocation.
//!
//! VMA cannot be used here: the image and its memory need export and
//! dedicated-allocation structures chained into their create infos, so the
//! memory is allocated directly.

use std::os::fd::OwnedFd;
use std::rc::Rc;

use ash::{khr, vk};
use tracing::debug;

use super::device::ExternalMemoryDevice;
use super::handles::{UniqueDeviceMemory, UniqueImage, UniqueImageView};
use crate::descriptor::TextureDescriptor;
use crate::error::InteropError;

/// Handle kind used for both the export and the GL import.
pub const EXPORT_HANDLE_TYPE: vk::ExternalMemoryHandleTypeFlags =
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD;

/// Fail unless the device can export memory as a file descriptor.
///
/// Must run before any other call in this module: the export entry point is
/// not loaded on devices without the extension.
pub fn check_external_memory_support<D: ExternalMemoryDevice + ?Sized>(
    device: &D,
) -> Result<(), InteropError> {
    if device.has_extension(khr::external_memory_fd::NAME) {
        Ok(())
    } else {
        Err(InteropError::MissingExtension("VK_KHR_external_memory_fd"))
    }
}

/// First memory type allowed by `type_bits` whose flags contain `required`.
pub fn find_memory_type_index(
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    properties: &vk::PhysicalDeviceMemoryProperties,
) -> Option<u32> {
    let count = properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count).find(|&index| {
        type_bits & (1 << index) != 0
            && properties.memory_types[index as usize]
                .property_flags
                .contains(required)
    })
}

/// An image and its dedicated memory. Drops the image before the memory.
struct DedicatedImage<D: ExternalMemoryDevice + ?Sized> {
    image: UniqueImage<D>,
    memory: UniqueDeviceMemory<D>,
}

/// A linear-tiled image bound to a dedicated, exportable memory block, plus
/// its color view.
///
/// Fields drop in declaration order: view, then image, then memory.
pub struct ExportableImage<D: ExternalMemoryDevice + ?Sized> {
    view: UniqueImageView<D>,
    dedicated: DedicatedImage<D>,
    allocation_size: vk::DeviceSize,
}

impl<D: ExternalMemoryDevice + ?Sized> ExportableImage<D> {
    /// Create, allocate, bind and view an image described by `descriptor`.
    ///
    /// Any handle created before a failing step is destroyed on return, in
    /// the same order as a full teardown.
    pub fn allocate(device: &Rc<D>, descriptor: &TextureDescriptor) -> Result<Self, InteropError> {
        let size = descriptor.size;
        let extent = size.extent().ok_or(InteropError::InvalidExtent {
            width: size.width,
            height: size.height,
        })?;
        let format = descriptor.format.vk_format();

        // Step 1: an unbound image whose memory can be exported.
        let mut external_memory_info =
            vk::ExternalMemoryImageCreateInfo::default().handle_types(EXPORT_HANDLE_TYPE);
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(descriptor.mip_count)
            .array_layers(1)
            .samples(descriptor.sample_count.vk_sample_count())
            // GL does not know Vulkan's optimal tiling.
            .tiling(vk::ImageTiling::LINEAR)
            .usage(descriptor.usage.vk_image_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .push_next(&mut external_memory_info);

        let image = unsafe { device.create_image(&image_info) }.map_err(|result| {
            InteropError::Vulkan {
                step: "vkCreateImage",
                result,
            }
        })?;
        let image = UniqueImage::new(device.clone(), image);

        // Step 2: pick a memory type for the image.
        let requirements = unsafe { device.image_memory_requirements(image.get()) };
        let required = descriptor.storage_mode.required_memory_properties();
        let memory_type_index = find_memory_type_index(
            requirements.memory_type_bits,
            required,
            &device.memory_properties(),
        )
        .ok_or(InteropError::NoCompatibleMemoryType {
            type_bits: requirements.memory_type_bits,
            required,
        })?;

        // Step 3: a dedicated allocation tagged for export.
        let mut export_info =
            vk::ExportMemoryAllocateInfo::default().handle_types(EXPORT_HANDLE_TYPE);
        let mut dedicated_info = vk::MemoryDedicatedAllocateInfo::default().image(image.get());
        let memory_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index)
            .push_next(&mut export_info)
            .push_next(&mut dedicated_info);

        let memory = unsafe { device.allocate_memory(&memory_info) }.map_err(|result| {
            InteropError::Vulkan {
                step: "vkAllocateMemory",
                result,
            }
        })?;
        let dedicated = DedicatedImage {
            image,
            memory: UniqueDeviceMemory::new(device.clone(), memory),
        };
        let (image, memory) = (dedicated.image.get(), dedicated.memory.get());

        // Step 4: bind at offset zero.
        unsafe { device.bind_image_memory(image, memory, 0) }.map_err(|result| {
            InteropError::Vulkan {
                step: "vkBindImageMemory",
                result,
            }
        })?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe { device.create_image_view(&view_info) }.map_err(|result| {
            InteropError::Vulkan {
                step: "vkCreateImageView",
                result,
            }
        })?;
        let view = UniqueImageView::new(device.clone(), view);

        debug!(
            "exportable {}x{} image bound to {} bytes of memory type {}",
            extent.width, extent.height, requirements.size, memory_type_index
        );

        Ok(Self {
            view,
            dedicated,
            allocation_size: requirements.size,
        })
    }

    /// Export the memory block as a file descriptor.
    ///
    /// Each call yields a new descriptor owned by the caller; the bridge
    /// calls this exactly once and hands the result to the GL import.
    pub fn export_fd(&self) -> Result<OwnedFd, InteropError> {
        let fd_info = vk::MemoryGetFdInfoKHR::default()
            .memory(self.memory())
            .handle_type(EXPORT_HANDLE_TYPE);

        unsafe { self.dedicated.memory.device().get_memory_fd(&fd_info) }
            .map_err(InteropError::Export)
    }

    pub fn image(&self) -> vk::Image {
        self.dedicated.image.get()
    }

    pub fn view(&self) -> vk::ImageView {
        self.view.get()
    }

    /// The exported allocation.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.dedicated.memory.get()
    }

    /// Size of the dedicated allocation, as reported by the requirements
    /// query. The import must declare exactly this size.
    pub fn allocation_size(&self) -> vk::DeviceSize {
        self.allocation_size
    }
}
