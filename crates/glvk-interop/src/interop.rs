//! A Vulkan image whose memory is also a GL texture.
//!
//! The memory is allocated by Vulkan, exported as an opaque file descriptor
//! and imported into GL with `GL_EXT_memory_object_fd`. No pixels are
//! copied: both APIs see the same allocation.
//!
//! Neither API is synchronized against the other here. Callers must order
//! Vulkan submissions and GL commands touching the texture themselves, e.g.
//! with exported semaphores or by waiting on fences.

use std::rc::Rc;

use ash::vk;
use gl::types::GLuint;
use tracing::{debug, error};

use crate::descriptor::{TextureDescriptor, TextureSize};
use crate::error::InteropError;
use crate::opengl::{import_memory_fd, ForeignTexture, MemoryObjectGl, GL_NONE};
use crate::source::TextureSource;
use crate::vulkan::{check_external_memory_support, ExportableImage, ExternalMemoryDevice};

/// Owns both halves of a texture shared between Vulkan and GL.
///
/// Construction never fails outright; check [`is_valid`](Self::is_valid)
/// before use. Teardown deletes the GL texture and memory object first,
/// then the Vulkan view, image and memory.
///
/// Not `Send`: construction and destruction must happen on the thread
/// whose GL context created the names.
pub struct GlvkTextureSource<D, G>
where
    D: ExternalMemoryDevice + ?Sized,
    G: MemoryObjectGl + ?Sized,
{
    gl: Rc<G>,
    descriptor: TextureDescriptor,
    foreign: ForeignTexture,
    image: Option<ExportableImage<D>>,
    creation_error: Option<InteropError>,
    is_valid: bool,
}

impl<D, G> GlvkTextureSource<D, G>
where
    D: ExternalMemoryDevice + ?Sized,
    G: MemoryObjectGl + ?Sized,
{
    /// Create a `size` RGBA8 texture visible to both `device` and `gl`.
    ///
    /// The GL context `gl` was loaded from must be current on this thread.
    /// On failure the cause is logged and kept in
    /// [`creation_error`](Self::creation_error).
    pub fn new(device: Rc<D>, gl: Rc<G>, size: TextureSize) -> Self {
        let mut source = Self {
            gl,
            descriptor: TextureDescriptor::for_size(size),
            foreign: ForeignTexture::NONE,
            image: None,
            creation_error: None,
            is_valid: false,
        };

        match source.build(&device) {
            Ok(()) => {
                source.is_valid = true;
                debug!(
                    "GLVK texture {}x{} shared as GL texture {}",
                    size.width, size.height, source.foreign.texture
                );
            }
            Err(err) => {
                error!(
                    "Could not create GLVK texture source {}x{} ({:?}): {err}",
                    size.width,
                    size.height,
                    err.kind()
                );
                source.creation_error = Some(err);
            }
        }

        source
    }

    fn build(&mut self, device: &Rc<D>) -> Result<(), InteropError> {
        if !self.gl.is_valid() {
            return Err(InteropError::InvalidFunctionTable);
        }
        check_external_memory_support(&**device)?;

        let image = ExportableImage::allocate(device, &self.descriptor)?;
        let fd = image.export_fd()?;
        let allocation_size = image.allocation_size();

        // GL names exist from here on and there are no early returns. The
        // image is stored first so that drop releases GL before Vulkan even
        // when the import fails.
        self.image = Some(image);
        unsafe {
            import_memory_fd(
                &*self.gl,
                &mut self.foreign,
                &self.descriptor,
                allocation_size,
                fd,
            )
        }
    }

    /// True once every step succeeded. Never changes afterwards.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// The GL texture name, or `0` when invalid.
    pub fn gl_texture_handle(&self) -> GLuint {
        if self.is_valid {
            self.foreign.texture
        } else {
            GL_NONE
        }
    }

    /// Why construction failed, if it did.
    pub fn creation_error(&self) -> Option<&InteropError> {
        self.creation_error.as_ref()
    }

    /// Bytes of the shared allocation, when valid.
    pub fn allocation_size(&self) -> Option<vk::DeviceSize> {
        self.valid_image().map(ExportableImage::allocation_size)
    }

    fn valid_image(&self) -> Option<&ExportableImage<D>> {
        if self.is_valid {
            self.image.as_ref()
        } else {
            None
        }
    }
}

impl<D, G> TextureSource for GlvkTextureSource<D, G>
where
    D: ExternalMemoryDevice + ?Sized,
    G: MemoryObjectGl + ?Sized,
{
    fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    fn image(&self) -> vk::Image {
        self.valid_image()
            .map(ExportableImage::image)
            .unwrap_or_default()
    }

    fn image_view(&self) -> vk::ImageView {
        self.valid_image()
            .map(ExportableImage::view)
            .unwrap_or_default()
    }

    fn render_target_view(&self) -> vk::ImageView {
        self.image_view()
    }

    fn is_swapchain_image(&self) -> bool {
        false
    }
}

impl<D, G> Drop for GlvkTextureSource<D, G>
where
    D: ExternalMemoryDevice + ?Sized,
    G: MemoryObjectGl + ?Sized,
{
    fn drop(&mut self) {
        // Only names that were actually created are non-zero.
        unsafe { self.foreign.release(&*self.gl) };
        // `image` drops after this body: view, image, memory.
    }
}

impl<D, G> std::fmt::Debug for GlvkTextureSource<D, G>
where
    D: ExternalMemoryDevice + ?Sized,
    G: MemoryObjectGl + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlvkTextureSource")
            .field("size", &self.descriptor.size)
            .field("gl_texture", &self.foreign.texture)
            .field("gl_memory_object", &self.foreign.memory_object)
            .field("is_valid", &self.is_valid)
            .finish()
    }
}
