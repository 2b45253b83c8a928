//! Vulkan device access needed to create an exportable image.
//!
//! [`ExternalMemoryDevice`] is the narrow slice of a Vulkan device that the
//! shared texture uses. [`VulkanContext`] implements it on top of `ash` for
//! handles owned by the caller; instance and device creation stay with the
//! renderer.

use std::ffi::{CStr, CString};
use std::os::fd::{FromRawFd, OwnedFd};

use anyhow::{bail, Context, Result};
use ash::prelude::VkResult;
use ash::{khr, vk};
use tracing::{debug, trace};

/// Device operations used by the exportable allocator and handle exporter.
///
/// Creation calls report failure through `vk::Result`; a handle is only
/// returned on success.
pub trait ExternalMemoryDevice {
    /// Whether the named device extension was enabled at device creation.
    fn has_extension(&self, name: &CStr) -> bool;

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties;

    /// # Safety
    /// `info` and its `p_next` chain must be valid for the call.
    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image>;

    /// # Safety
    /// `image` must be a live image created by this device.
    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;

    /// # Safety
    /// `info` and its `p_next` chain must be valid for the call.
    unsafe fn allocate_memory(
        &self,
        info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory>;

    /// # Safety
    /// Both handles must be live and `image` not yet bound.
    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;

    /// # Safety
    /// `info.image` must be a live, bound image.
    unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView>;

    /// Export the memory as a file descriptor. On success the caller owns
    /// the descriptor.
    ///
    /// # Safety
    /// `info.memory` must be a live allocation exportable as `info.handle_type`.
    unsafe fn get_memory_fd(&self, info: &vk::MemoryGetFdInfoKHR<'_>) -> VkResult<OwnedFd>;

    /// # Safety
    /// The view must not be in use.
    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    /// # Safety
    /// The image must not be in use and have no live views.
    unsafe fn destroy_image(&self, image: vk::Image);

    /// # Safety
    /// No live image may still be bound to the memory.
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);
}

/// `ash`-backed [`ExternalMemoryDevice`].
///
/// Borrows nothing: the instance and device are cheap dispatch-table clones
/// and must outlive every texture created from this context.
pub struct VulkanContext {
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    external_memory_fd: khr::external_memory_fd::Device,
    enabled_extensions: Vec<CString>,
}

impl VulkanContext {
    /// Wrap caller-created handles.
    ///
    /// `enabled_extensions` lists the device extensions passed to
    /// `vkCreateDevice`. Each must be advertised by `physical_device`.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        enabled_extensions: &[&CStr],
    ) -> Result<Self> {
        let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .context("vkEnumerateDeviceExtensionProperties")?;

        for &name in enabled_extensions {
            let advertised = available
                .iter()
                .any(|props| props.extension_name_as_c_str().ok() == Some(name));
            if !advertised {
                bail!(
                    "device extension {} is not advertised by the physical device",
                    name.to_string_lossy()
                );
            }
        }

        debug!(
            "Vulkan context with {} enabled device extensions",
            enabled_extensions.len()
        );

        Ok(Self {
            instance: instance.clone(),
            physical_device,
            device: device.clone(),
            external_memory_fd: khr::external_memory_fd::Device::new(instance, device),
            enabled_extensions: enabled_extensions.iter().map(|&n| n.to_owned()).collect(),
        })
    }

    /// Borrow the logical device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }
}

impl ExternalMemoryDevice for VulkanContext {
    fn has_extension(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|e| e.as_c_str() == name)
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        }
    }

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        trace!("vkCreateImage");
        self.device.create_image(info, None)
    }

    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        self.device.get_image_memory_requirements(image)
    }

    unsafe fn allocate_memory(
        &self,
        info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory> {
        trace!("vkAllocateMemory ({} bytes)", info.allocation_size);
        self.device.allocate_memory(info, None)
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.device.bind_image_memory(image, memory, offset)
    }

    unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        self.device.create_image_view(info, None)
    }

    unsafe fn get_memory_fd(&self, info: &vk::MemoryGetFdInfoKHR<'_>) -> VkResult<OwnedFd> {
        let fd = self.external_memory_fd.get_memory_fd(info)?;
        // The driver hands over a fresh descriptor that nobody else owns.
        Ok(OwnedFd::from_raw_fd(fd))
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.device.destroy_image_view(view, None);
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.device.destroy_image(image, None);
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.device.free_memory(memory, None);
    }
}
