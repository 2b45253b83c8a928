//! GL entry points for `GL_EXT_memory_object` / `GL_EXT_memory_object_fd`.
//!
//! The extension functions are not part of the `gl` crate's core bindings,
//! so they are resolved by hand from the proc-address loader of the current
//! context.

use std::ffi::c_void;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};
use std::sync::Once;

use gl::types::{GLenum, GLint, GLsizei, GLuint, GLuint64};
use tracing::{debug, error, trace};

/// `GL_HANDLE_TYPE_OPAQUE_FD_EXT` from `GL_EXT_memory_object_fd`.
pub const GL_HANDLE_TYPE_OPAQUE_FD_EXT: GLenum = 0x9586;

/// The GL calls the foreign importer makes.
///
/// GL reports failures through `get_error`, not through return values, and
/// object names exist as soon as the creation call returns.
pub trait MemoryObjectGl {
    /// Whether every entry point resolved. Tables built by
    /// [`GlMemoryObjectFunctions::load`] always are.
    fn is_valid(&self) -> bool {
        true
    }

    /// # Safety
    /// A GL context exposing `GL_EXT_memory_object` must be current.
    unsafe fn create_memory_object(&self) -> GLuint;

    /// Import `fd` into `memory` and return the error the import raised.
    ///
    /// GL only takes ownership of the descriptor when the import succeeds
    /// (`gl::NO_ERROR`). Otherwise the descriptor is closed before this
    /// returns.
    ///
    /// # Safety
    /// `memory` must be a memory object that has not been imported into yet.
    unsafe fn import_memory_fd(
        &self,
        memory: GLuint,
        size: GLuint64,
        handle_type: GLenum,
        fd: OwnedFd,
    ) -> GLenum;

    /// # Safety
    /// A GL context must be current.
    unsafe fn gen_texture(&self) -> GLuint;

    /// # Safety
    /// A GL context must be current.
    unsafe fn bind_texture(&self, target: GLenum, texture: GLuint);

    /// # Safety
    /// The texture bound to `target` must have no storage yet.
    #[allow(clippy::too_many_arguments)]
    unsafe fn tex_storage_mem_2d(
        &self,
        target: GLenum,
        levels: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
        memory: GLuint,
        offset: GLuint64,
    );

    /// # Safety
    /// `texture` must be a name returned by `gen_texture`.
    unsafe fn delete_texture(&self, texture: GLuint);

    /// # Safety
    /// `memory` must be a name returned by `create_memory_object`.
    unsafe fn delete_memory_object(&self, memory: GLuint);

    /// Pop the oldest pending error, `gl::NO_ERROR` when there is none.
    ///
    /// # Safety
    /// A GL context must be current.
    unsafe fn get_error(&self) -> GLenum;
}

// ---------------------------------------------------------------------------
// Extension function pointer types
// ---------------------------------------------------------------------------

type CreateMemoryObjectsExt = unsafe extern "system" fn(n: GLsizei, memory_objects: *mut GLuint);
type DeleteMemoryObjectsExt =
    unsafe extern "system" fn(n: GLsizei, memory_objects: *const GLuint);
type ImportMemoryFdExt =
    unsafe extern "system" fn(memory: GLuint, size: GLuint64, handle_type: GLenum, fd: GLint);
type TexStorageMem2dExt = unsafe extern "system" fn(
    target: GLenum,
    levels: GLsizei,
    internal_format: GLenum,
    width: GLsizei,
    height: GLsizei,
    memory: GLuint,
    offset: GLuint64,
);

static GL_INIT_ONCE: Once = Once::new();

/// Loaded memory object entry points, plus the `gl` crate's core bindings
/// for textures and errors.
pub struct GlMemoryObjectFunctions {
    create_memory_objects: CreateMemoryObjectsExt,
    delete_memory_objects: DeleteMemoryObjectsExt,
    import_memory_fd: ImportMemoryFdExt,
    tex_storage_mem_2d: TexStorageMem2dExt,
}

impl GlMemoryObjectFunctions {
    /// Resolve every entry point through `get_proc_address`.
    ///
    /// Returns `None` if any of them is missing, e.g. when the driver does
    /// not expose `GL_EXT_memory_object_fd`.
    pub fn load(mut get_proc_address: impl FnMut(&str) -> *const c_void) -> Option<Self> {
        let mut load = |name: &str| -> Option<*const c_void> {
            let ptr = get_proc_address(name);
            if ptr.is_null() {
                error!("GL entry point {name} is unavailable");
                None
            } else {
                Some(ptr)
            }
        };

        let functions = unsafe {
            Self {
                create_memory_objects: std::mem::transmute::<*const c_void, CreateMemoryObjectsExt>(
                    load("glCreateMemoryObjectsEXT")?,
                ),
                delete_memory_objects: std::mem::transmute::<*const c_void, DeleteMemoryObjectsExt>(
                    load("glDeleteMemoryObjectsEXT")?,
                ),
                import_memory_fd: std::mem::transmute::<*const c_void, ImportMemoryFdExt>(load(
                    "glImportMemoryFdEXT",
                )?),
                tex_storage_mem_2d: std::mem::transmute::<*const c_void, TexStorageMem2dExt>(
                    load("glTexStorageMem2DEXT")?,
                ),
            }
        };

        // Core entry points go through the `gl` crate's global table.
        for core in ["glGenTextures", "glBindTexture", "glDeleteTextures", "glGetError"] {
            load(core)?;
        }
        gl::load_with(|s| get_proc_address(s));

        debug!("GL_EXT_memory_object_fd entry points loaded");
        Some(functions)
    }

    /// Resolve the entry points of the GL context current on this thread.
    pub fn load_current() -> Option<Self> {
        GL_INIT_ONCE.call_once(|| {
            gl_loader::init_gl();
        });
        Self::load(|s| gl_loader::get_proc_address(s).cast())
    }
}

impl std::fmt::Debug for GlMemoryObjectFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlMemoryObjectFunctions").finish()
    }
}

impl MemoryObjectGl for GlMemoryObjectFunctions {
    unsafe fn create_memory_object(&self) -> GLuint {
        let mut memory: GLuint = 0;
        (self.create_memory_objects)(1, &mut memory);
        trace!("glCreateMemoryObjectsEXT -> {memory}");
        memory
    }

    unsafe fn import_memory_fd(
        &self,
        memory: GLuint,
        size: GLuint64,
        handle_type: GLenum,
        fd: OwnedFd,
    ) -> GLenum {
        (self.import_memory_fd)(memory, size, handle_type, fd.as_raw_fd());
        let code = gl::GetError();
        if code == gl::NO_ERROR {
            // GL owns the descriptor now.
            let _ = fd.into_raw_fd();
        } else {
            trace!("glImportMemoryFdEXT raised {code:#06x}, closing the descriptor");
            drop(fd);
        }
        code
    }

    unsafe fn gen_texture(&self) -> GLuint {
        let mut texture: GLuint = 0;
        gl::GenTextures(1, &mut texture);
        texture
    }

    unsafe fn bind_texture(&self, target: GLenum, texture: GLuint) {
        gl::BindTexture(target, texture);
    }

    unsafe fn tex_storage_mem_2d(
        &self,
        target: GLenum,
        levels: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
        memory: GLuint,
        offset: GLuint64,
    ) {
        (self.tex_storage_mem_2d)(target, levels, internal_format, width, height, memory, offset);
    }

    unsafe fn delete_texture(&self, texture: GLuint) {
        gl::DeleteTextures(1, &texture);
    }

    unsafe fn delete_memory_object(&self, memory: GLuint) {
        (self.delete_memory_objects)(1, &memory);
    }

    unsafe fn get_error(&self) -> GLenum {
        gl::GetError()
    }
}
