//! Owning wrappers that destroy Vulkan handles on drop.

use std::rc::Rc;

use ash::vk;

use super::device::ExternalMemoryDevice;

/// A raw Vulkan handle that knows how to destroy itself.
pub trait DeviceChild: Copy + Default + PartialEq {
    /// # Safety
    /// The handle must be live, created by `device` and no longer in use.
    unsafe fn destroy<D: ExternalMemoryDevice + ?Sized>(self, device: &D);
}

impl DeviceChild for vk::Image {
    unsafe fn destroy<D: ExternalMemoryDevice + ?Sized>(self, device: &D) {
        device.destroy_image(self);
    }
}

impl DeviceChild for vk::ImageView {
    unsafe fn destroy<D: ExternalMemoryDevice + ?Sized>(self, device: &D) {
        device.destroy_image_view(self);
    }
}

impl DeviceChild for vk::DeviceMemory {
    unsafe fn destroy<D: ExternalMemoryDevice + ?Sized>(self, device: &D) {
        device.free_memory(self);
    }
}

/// Exclusive owner of one device child.
pub struct Unique<H: DeviceChild, D: ExternalMemoryDevice + ?Sized> {
    device: Rc<D>,
    handle: H,
}

pub type UniqueImage<D> = Unique<vk::Image, D>;
pub type UniqueImageView<D> = Unique<vk::ImageView, D>;
pub type UniqueDeviceMemory<D> = Unique<vk::DeviceMemory, D>;

impl<H: DeviceChild, D: ExternalMemoryDevice + ?Sized> Unique<H, D> {
    /// Take ownership of a handle just returned by `device`.
    pub fn new(device: Rc<D>, handle: H) -> Self {
        Self { device, handle }
    }

    pub fn get(&self) -> H {
        self.handle
    }

    /// The device that will destroy the handle.
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<H: DeviceChild, D: ExternalMemoryDevice + ?Sized> Drop for Unique<H, D> {
    fn drop(&mut self) {
        if self.handle != H::default() {
            unsafe { self.handle.destroy(&*self.device) };
        }
    }
}

impl<H: DeviceChild + std::fmt::Debug, D: ExternalMemoryDevice + ?Sized> std::fmt::Debug
    for Unique<H, D>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Unique").field(&self.handle).finish()
    }
}
