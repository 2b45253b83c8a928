//! Failures of the shared texture pipeline.

use ash::vk;
use gl::types::GLenum;

/// Broad class of a failure, independent of the step that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required extension or entry point is missing.
    CapabilityUnsupported,
    /// Vulkan rejected an image, memory or view creation, or the bind.
    AllocationFailure,
    /// The memory block could not be exported as a file descriptor.
    ExportFailure,
    /// GL rejected the memory import or the texture storage attach.
    ImportFailure,
}

/// One failed step of the pipeline, with the native code that was reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum InteropError {
    #[error("device extension {0} is not enabled")]
    MissingExtension(&'static str),
    #[error("GL memory object function table is not usable")]
    InvalidFunctionTable,
    #[error("invalid texture size {width}x{height}")]
    InvalidExtent { width: i32, height: i32 },
    #[error("{step} failed: {result}")]
    Vulkan {
        step: &'static str,
        result: vk::Result,
    },
    #[error("no memory type in mask {type_bits:#x} satisfies {required:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },
    #[error("vkGetMemoryFdKHR failed: {0}")]
    Export(vk::Result),
    #[error("{step} raised GL error {code:#06x}")]
    Gl { step: &'static str, code: GLenum },
    #[error("{step} returned no object name")]
    GlNameUnavailable { step: &'static str },
}

impl InteropError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InteropError::MissingExtension(_) | InteropError::InvalidFunctionTable => {
                ErrorKind::CapabilityUnsupported
            }
            InteropError::InvalidExtent { .. }
            | InteropError::Vulkan { .. }
            | InteropError::NoCompatibleMemoryType { .. } => ErrorKind::AllocationFailure,
            InteropError::Export(_) => ErrorKind::ExportFailure,
            InteropError::Gl { .. } | InteropError::GlNameUnavailable { .. } => {
                ErrorKind::ImportFailure
            }
        }
    }
}
