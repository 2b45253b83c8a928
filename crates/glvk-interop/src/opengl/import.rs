//! Import of an exported memory descriptor into a GL texture.

use std::os::fd::OwnedFd;

use gl::types::{GLenum, GLsizei, GLuint, GLuint64};
use tracing::{trace, warn};

use super::functions::{MemoryObjectGl, GL_HANDLE_TYPE_OPAQUE_FD_EXT};
use crate::descriptor::TextureDescriptor;
use crate::error::InteropError;

/// GL's "no object" name.
pub const GL_NONE: GLuint = 0;

/// Upper bound on stale errors drained before the import starts.
const MAX_PENDING_ERRORS: usize = 16;

/// GL names owned by a shared texture.
///
/// GL names have no automatic lifetime. Each field stays [`GL_NONE`] until
/// the matching creation call returns a name, so release only ever touches
/// names that exist.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForeignTexture {
    pub texture: GLuint,
    pub memory_object: GLuint,
}

impl ForeignTexture {
    pub const NONE: Self = Self {
        texture: GL_NONE,
        memory_object: GL_NONE,
    };

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Delete whatever names exist, texture first, and reset to
    /// [`ForeignTexture::NONE`].
    ///
    /// # Safety
    /// The GL context that created the names must be current.
    pub unsafe fn release<G: MemoryObjectGl + ?Sized>(&mut self, gl: &G) {
        if self.texture != GL_NONE {
            gl.delete_texture(self.texture);
            self.texture = GL_NONE;
        }
        if self.memory_object != GL_NONE {
            gl.delete_memory_object(self.memory_object);
            self.memory_object = GL_NONE;
        }
    }
}

/// Build a GL texture on top of the memory behind `fd`.
///
/// There are no early returns once the first GL name exists: every step
/// runs, every created name is written to `names` as soon as it exists, and
/// the first GL error (or missing name) is returned at the end. `fd` is
/// either owned by GL or closed once the import call returns.
///
/// # Safety
/// The GL context `gl` was loaded from must be current, and `names` must be
/// [`ForeignTexture::NONE`].
pub unsafe fn import_memory_fd<G: MemoryObjectGl + ?Sized>(
    gl: &G,
    names: &mut ForeignTexture,
    descriptor: &TextureDescriptor,
    allocation_size: GLuint64,
    fd: OwnedFd,
) -> Result<(), InteropError> {
    debug_assert!(names.is_none());

    drain_pending_errors(gl);

    let mut first_error: Option<InteropError> = None;

    names.memory_object = gl.create_memory_object();
    check(gl, "glCreateMemoryObjectsEXT", &mut first_error);
    if names.memory_object == GL_NONE && first_error.is_none() {
        first_error = Some(InteropError::GlNameUnavailable {
            step: "glCreateMemoryObjectsEXT",
        });
    }

    trace!(
        "importing {allocation_size} bytes into GL memory object {}",
        names.memory_object
    );
    let code = gl.import_memory_fd(
        names.memory_object,
        allocation_size,
        GL_HANDLE_TYPE_OPAQUE_FD_EXT,
        fd,
    );
    record("glImportMemoryFdEXT", code, &mut first_error);

    names.texture = gl.gen_texture();
    check(gl, "glGenTextures", &mut first_error);
    if names.texture == GL_NONE && first_error.is_none() {
        first_error = Some(InteropError::GlNameUnavailable {
            step: "glGenTextures",
        });
    }

    let size = descriptor.size;
    gl.bind_texture(gl::TEXTURE_2D, names.texture);
    gl.tex_storage_mem_2d(
        gl::TEXTURE_2D,
        descriptor.mip_count as GLsizei,
        descriptor.format.gl_internal_format(),
        size.width as GLsizei,
        size.height as GLsizei,
        names.memory_object,
        0,
    );
    check(gl, "glTexStorageMem2DEXT", &mut first_error);

    gl.bind_texture(gl::TEXTURE_2D, GL_NONE);
    check(gl, "glBindTexture", &mut first_error);

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Record the GL error raised by `step`, keeping only the first failure.
unsafe fn check<G: MemoryObjectGl + ?Sized>(
    gl: &G,
    step: &'static str,
    first_error: &mut Option<InteropError>,
) {
    record(step, gl.get_error(), first_error);
}

fn record(step: &'static str, code: GLenum, first_error: &mut Option<InteropError>) {
    if code != gl::NO_ERROR && first_error.is_none() {
        *first_error = Some(InteropError::Gl { step, code });
    }
}

/// Clear errors left by earlier, unrelated GL calls so they are not blamed
/// on the import.
unsafe fn drain_pending_errors<G: MemoryObjectGl + ?Sized>(gl: &G) {
    for _ in 0..MAX_PENDING_ERRORS {
        let code: GLenum = gl.get_error();
        if code == gl::NO_ERROR {
            return;
        }
        warn!("discarding pending GL error {code:#06x} before memory import");
    }
}
