//! Common interface for textures consumed through Vulkan.

use ash::vk;

use crate::descriptor::TextureDescriptor;

/// A texture the renderer can sample from or render into with Vulkan.
///
/// Implementations that can be in a failed state return null handles rather
/// than dangling ones.
pub trait TextureSource {
    fn descriptor(&self) -> &TextureDescriptor;

    fn image(&self) -> vk::Image;

    fn image_view(&self) -> vk::ImageView;

    /// The view to attach when rendering into this texture.
    fn render_target_view(&self) -> vk::ImageView;

    /// Whether the image belongs to a swapchain and is owned by it.
    fn is_swapchain_image(&self) -> bool;
}
