//! Logical description of the shared texture.
//!
//! The descriptor is the single place where the pixel format is mapped to
//! both the Vulkan format and the GL internal format, so the exporting and
//! importing sides can never disagree about what they share.

use ash::vk;
use gl::types::GLenum;

/// Requested texture size in pixels.
///
/// Signed so that callers passing through sizes from other layouts can hand
/// over negative values; those are rejected instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSize {
    pub width: i32,
    pub height: i32,
}

impl TextureSize {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// True when both dimensions are strictly positive.
    pub fn is_positive(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// The 2D Vulkan extent (depth 1), or `None` for a non-positive size.
    pub fn extent(&self) -> Option<vk::Extent3D> {
        if !self.is_positive() {
            return None;
        }
        Some(vk::Extent3D {
            width: self.width as u32,
            height: self.height as u32,
            depth: 1,
        })
    }
}

/// Where the texture memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// GPU-only memory, never mapped by the host.
    DevicePrivate,
}

impl StorageMode {
    /// Memory property flags a memory type must carry to back this mode.
    pub fn required_memory_properties(&self) -> vk::MemoryPropertyFlags {
        match self {
            StorageMode::DevicePrivate => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    Texture2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUsage {
    RenderTarget,
}

impl TextureUsage {
    /// Vulkan usage for the shared image. Render targets are also sampled so
    /// the GL side can read what Vulkan drew.
    pub fn vk_image_usage(&self) -> vk::ImageUsageFlags {
        match self {
            TextureUsage::RenderTarget => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCount {
    Count1,
}

impl SampleCount {
    pub fn vk_sample_count(&self) -> vk::SampleCountFlags {
        match self {
            SampleCount::Count1 => vk::SampleCountFlags::TYPE_1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No framebuffer compression; the layout must stay readable by GL.
    None,
}

/// Pixel formats that both APIs can interpret from the same memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    R8G8B8A8UNormInt,
}

impl PixelFormat {
    pub fn vk_format(&self) -> vk::Format {
        match self {
            PixelFormat::R8G8B8A8UNormInt => vk::Format::R8G8B8A8_UNORM,
        }
    }

    /// Sized internal format passed to `glTexStorageMem2DEXT`.
    pub fn gl_internal_format(&self) -> GLenum {
        match self {
            PixelFormat::R8G8B8A8UNormInt => gl::RGBA8,
        }
    }
}

/// Immutable description of the shared texture, derived from its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub storage_mode: StorageMode,
    pub texture_type: TextureType,
    pub format: PixelFormat,
    pub size: TextureSize,
    pub mip_count: u32,
    pub usage: TextureUsage,
    pub sample_count: SampleCount,
    pub compression: CompressionType,
}

impl TextureDescriptor {
    /// Describe a single-level RGBA8 render target of `size` pixels.
    pub fn for_size(size: TextureSize) -> Self {
        Self {
            storage_mode: StorageMode::DevicePrivate,
            texture_type: TextureType::Texture2D,
            format: PixelFormat::R8G8B8A8UNormInt,
            size,
            mip_count: 1,
            usage: TextureUsage::RenderTarget,
            sample_count: SampleCount::Count1,
            compression: CompressionType::None,
        }
    }
}
