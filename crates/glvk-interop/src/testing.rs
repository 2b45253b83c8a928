//! Recording fakes of the Vulkan device and GL function table.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ffi::CStr;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::rc::Rc;

use ash::prelude::VkResult;
use ash::khr;
use ash::vk::{self, Handle};
use gl::types::{GLenum, GLsizei, GLuint, GLuint64};
use tracing_subscriber::EnvFilter;

use crate::opengl::MemoryObjectGl;
use crate::vulkan::ExternalMemoryDevice;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("glvk_interop=trace"))
        .with_test_writer()
        .try_init();
}

/// A real descriptor nobody cares about.
pub fn dev_null_fd() -> OwnedFd {
    OwnedFd::from(File::open("/dev/null").unwrap())
}

/// Call names from both fakes, in the order they happened.
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<&'static str>>>);

impl EventLog {
    fn push(&self, name: &'static str) {
        self.0.borrow_mut().push(name);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

// ---------------------------------------------------------------------------
// FakeDevice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    CreateImage,
    MemoryType,
    AllocateMemory,
    BindImageMemory,
    CreateImageView,
    GetMemoryFd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VkCall {
    CreateImage(vk::Image),
    AllocateMemory(vk::DeviceMemory),
    BindImageMemory(vk::Image, vk::DeviceMemory, vk::DeviceSize),
    CreateImageView(vk::ImageView),
    GetMemoryFd(vk::DeviceMemory),
    DestroyImageView(vk::ImageView),
    DestroyImage(vk::Image),
    FreeMemory(vk::DeviceMemory),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub sharing_mode: vk::SharingMode,
    pub initial_layout: vk::ImageLayout,
    pub external_handle_types: Option<vk::ExternalMemoryHandleTypeFlags>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAllocation {
    pub size: vk::DeviceSize,
    pub memory_type_index: u32,
    pub export_handle_types: Option<vk::ExternalMemoryHandleTypeFlags>,
    pub dedicated_image: Option<vk::Image>,
}

/// Vulkan device that hands out counter-based handles and records calls.
///
/// Memory type 0 is host-visible, type 1 device-local. Images accept
/// both unless [`FailAt::MemoryType`] restricts them to type 0.
pub struct FakeDevice {
    external_memory_fd: bool,
    fail_at: Option<FailAt>,
    next_handle: Cell<u64>,
    calls: RefCell<Vec<VkCall>>,
    image_info: RefCell<Option<RecordedImageInfo>>,
    allocation_info: RefCell<Option<RecordedAllocation>>,
    log: EventLog,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self {
            external_memory_fd: true,
            fail_at: None,
            next_handle: Cell::new(0x100),
            calls: RefCell::default(),
            image_info: RefCell::default(),
            allocation_info: RefCell::default(),
            log: EventLog::default(),
        }
    }
}

impl FakeDevice {
    pub const ALLOCATION_SIZE: vk::DeviceSize = 262_144;

    pub fn without_external_memory_fd() -> Self {
        Self {
            external_memory_fd: false,
            ..Self::default()
        }
    }

    pub fn failing(stage: FailAt) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn calls(&self) -> Vec<VkCall> {
        self.calls.borrow().clone()
    }

    pub fn image_info(&self) -> Option<RecordedImageInfo> {
        self.image_info.borrow().clone()
    }

    pub fn allocation_info(&self) -> Option<RecordedAllocation> {
        self.allocation_info.borrow().clone()
    }

    pub fn export_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, VkCall::GetMemoryFd(_)))
            .count()
    }

    pub fn destroyed_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    VkCall::DestroyImageView(_) | VkCall::DestroyImage(_) | VkCall::FreeMemory(_)
                )
            })
            .count()
    }

    /// Every created handle was destroyed exactly once, and nothing else was.
    pub fn all_created_destroyed_once(&self) -> bool {
        let calls = self.calls();
        let mut created = Vec::new();
        let mut destroyed = Vec::new();
        for call in &calls {
            match *call {
                VkCall::CreateImage(h) => created.push(h.as_raw()),
                VkCall::AllocateMemory(h) => created.push(h.as_raw()),
                VkCall::CreateImageView(h) => created.push(h.as_raw()),
                VkCall::DestroyImage(h) => destroyed.push(h.as_raw()),
                VkCall::FreeMemory(h) => destroyed.push(h.as_raw()),
                VkCall::DestroyImageView(h) => destroyed.push(h.as_raw()),
                VkCall::BindImageMemory(..) | VkCall::GetMemoryFd(_) => {}
            }
        }
        created.sort_unstable();
        destroyed.sort_unstable();
        created == destroyed
    }

    fn fails(&self, stage: FailAt) -> bool {
        self.fail_at == Some(stage)
    }

    fn next<H: Handle>(&self) -> H {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        H::from_raw(raw)
    }

    fn record(&self, name: &'static str, call: VkCall) {
        self.log.push(name);
        self.calls.borrow_mut().push(call);
    }
}

/// Walk a `p_next` chain, yielding each structure header.
unsafe fn chain<'a>(mut next: *const std::ffi::c_void) -> Vec<&'a vk::BaseInStructure<'a>> {
    let mut out = Vec::new();
    while !next.is_null() {
        let header = &*(next as *const vk::BaseInStructure<'a>);
        out.push(header);
        next = header.p_next as *const std::ffi::c_void;
    }
    out
}

impl ExternalMemoryDevice for FakeDevice {
    fn has_extension(&self, name: &CStr) -> bool {
        self.external_memory_fd && name == khr::external_memory_fd::NAME
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        props.memory_types[0].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props
    }

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        if self.fails(FailAt::CreateImage) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }

        let mut external_handle_types = None;
        for header in chain(info.p_next) {
            if header.s_type == vk::StructureType::EXTERNAL_MEMORY_IMAGE_CREATE_INFO {
                let ptr = header as *const vk::BaseInStructure<'_>;
                external_handle_types =
                    Some((*(ptr as *const vk::ExternalMemoryImageCreateInfo<'_>)).handle_types);
            }
        }
        *self.image_info.borrow_mut() = Some(RecordedImageInfo {
            width: info.extent.width,
            height: info.extent.height,
            format: info.format,
            tiling: info.tiling,
            usage: info.usage,
            mip_levels: info.mip_levels,
            array_layers: info.array_layers,
            samples: info.samples,
            sharing_mode: info.sharing_mode,
            initial_layout: info.initial_layout,
            external_handle_types,
        });

        let image = self.next();
        self.record("vkCreateImage", VkCall::CreateImage(image));
        Ok(image)
    }

    unsafe fn image_memory_requirements(&self, _image: vk::Image) -> vk::MemoryRequirements {
        let memory_type_bits = if self.fails(FailAt::MemoryType) {
            0b01
        } else {
            0b11
        };
        vk::MemoryRequirements {
            size: Self::ALLOCATION_SIZE,
            alignment: 4096,
            memory_type_bits,
        }
    }

    unsafe fn allocate_memory(
        &self,
        info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory> {
        if self.fails(FailAt::AllocateMemory) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }

        let mut recorded = RecordedAllocation {
            size: info.allocation_size,
            memory_type_index: info.memory_type_index,
            export_handle_types: None,
            dedicated_image: None,
        };
        for header in chain(info.p_next) {
            let ptr = header as *const vk::BaseInStructure<'_>;
            match header.s_type {
                vk::StructureType::EXPORT_MEMORY_ALLOCATE_INFO => {
                    recorded.export_handle_types =
                        Some((*(ptr as *const vk::ExportMemoryAllocateInfo<'_>)).handle_types);
                }
                vk::StructureType::MEMORY_DEDICATED_ALLOCATE_INFO => {
                    recorded.dedicated_image =
                        Some((*(ptr as *const vk::MemoryDedicatedAllocateInfo<'_>)).image);
                }
                _ => {}
            }
        }
        *self.allocation_info.borrow_mut() = Some(recorded);

        let memory = self.next();
        self.record("vkAllocateMemory", VkCall::AllocateMemory(memory));
        Ok(memory)
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        if self.fails(FailAt::BindImageMemory) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        self.record(
            "vkBindImageMemory",
            VkCall::BindImageMemory(image, memory, offset),
        );
        Ok(())
    }

    unsafe fn create_image_view(
        &self,
        _info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        if self.fails(FailAt::CreateImageView) {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let view = self.next();
        self.record("vkCreateImageView", VkCall::CreateImageView(view));
        Ok(view)
    }

    unsafe fn get_memory_fd(&self, info: &vk::MemoryGetFdInfoKHR<'_>) -> VkResult<OwnedFd> {
        if self.fails(FailAt::GetMemoryFd) {
            return Err(vk::Result::ERROR_TOO_MANY_OBJECTS);
        }
        self.record("vkGetMemoryFdKHR", VkCall::GetMemoryFd(info.memory));
        Ok(dev_null_fd())
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.record("vkDestroyImageView", VkCall::DestroyImageView(view));
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.record("vkDestroyImage", VkCall::DestroyImage(image));
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.record("vkFreeMemory", VkCall::FreeMemory(memory));
    }
}

// ---------------------------------------------------------------------------
// FakeGl
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlCall {
    CreateMemoryObject(GLuint),
    ImportMemoryFd {
        memory: GLuint,
        size: GLuint64,
        handle_type: GLenum,
    },
    GenTexture(GLuint),
    BindTexture(GLenum, GLuint),
    TexStorageMem2d {
        levels: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
        memory: GLuint,
        offset: GLuint64,
    },
    DeleteTexture(GLuint),
    DeleteMemoryObject(GLuint),
}

/// GL function table that records calls and raises errors on demand.
pub struct FakeGl {
    valid: bool,
    memory_object_names: bool,
    texture_names: bool,
    error_after: Option<(&'static str, GLenum)>,
    next_memory_object: Cell<GLuint>,
    next_texture: Cell<GLuint>,
    pending_errors: RefCell<VecDeque<GLenum>>,
    import_calls: Cell<usize>,
    owned_fds: RefCell<Vec<OwnedFd>>,
    calls: RefCell<Vec<GlCall>>,
    log: EventLog,
}

impl Default for FakeGl {
    fn default() -> Self {
        Self {
            valid: true,
            memory_object_names: true,
            texture_names: true,
            error_after: None,
            next_memory_object: Cell::new(Self::FIRST_MEMORY_OBJECT),
            next_texture: Cell::new(Self::FIRST_TEXTURE),
            pending_errors: RefCell::default(),
            import_calls: Cell::new(0),
            owned_fds: RefCell::default(),
            calls: RefCell::default(),
            log: EventLog::default(),
        }
    }
}

impl FakeGl {
    pub const FIRST_MEMORY_OBJECT: GLuint = 1;
    pub const FIRST_TEXTURE: GLuint = 10;

    pub fn invalid() -> Self {
        Self {
            valid: false,
            ..Self::default()
        }
    }

    pub fn without_memory_object_names() -> Self {
        Self {
            memory_object_names: false,
            ..Self::default()
        }
    }

    pub fn without_texture_names() -> Self {
        Self {
            texture_names: false,
            ..Self::default()
        }
    }

    /// Fail the named call with `code`: `"import"` or `"storage"`.
    pub fn with_error_after(step: &'static str, code: GLenum) -> Self {
        Self {
            error_after: Some((step, code)),
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn push_pending_error(&self, code: GLenum) {
        self.pending_errors.borrow_mut().push_back(code);
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }

    pub fn import_count(&self) -> usize {
        self.import_calls.get()
    }

    /// Descriptors GL kept after a successful import.
    pub fn owned_fd_count(&self) -> usize {
        self.owned_fds.borrow().len()
    }

    fn record(&self, name: &'static str, call: GlCall) {
        self.log.push(name);
        self.calls.borrow_mut().push(call);
    }

    fn injected_error(&self, step: &'static str) -> GLenum {
        match self.error_after {
            Some((at, code)) if at == step => code,
            _ => gl::NO_ERROR,
        }
    }
}

impl MemoryObjectGl for FakeGl {
    fn is_valid(&self) -> bool {
        self.valid
    }

    unsafe fn create_memory_object(&self) -> GLuint {
        let memory = if self.memory_object_names {
            let memory = self.next_memory_object.get();
            self.next_memory_object.set(memory + 1);
            memory
        } else {
            0
        };
        self.record("glCreateMemoryObjectsEXT", GlCall::CreateMemoryObject(memory));
        memory
    }

    unsafe fn import_memory_fd(
        &self,
        memory: GLuint,
        size: GLuint64,
        handle_type: GLenum,
        fd: OwnedFd,
    ) -> GLenum {
        self.import_calls.set(self.import_calls.get() + 1);
        let code = self.injected_error("import");
        if code == gl::NO_ERROR {
            self.owned_fds.borrow_mut().push(fd);
        }
        self.record(
            "glImportMemoryFdEXT",
            GlCall::ImportMemoryFd {
                memory,
                size,
                handle_type,
            },
        );
        code
    }

    unsafe fn gen_texture(&self) -> GLuint {
        let texture = if self.texture_names {
            let texture = self.next_texture.get();
            self.next_texture.set(texture + 1);
            texture
        } else {
            0
        };
        self.record("glGenTextures", GlCall::GenTexture(texture));
        texture
    }

    unsafe fn bind_texture(&self, target: GLenum, texture: GLuint) {
        self.record("glBindTexture", GlCall::BindTexture(target, texture));
    }

    unsafe fn tex_storage_mem_2d(
        &self,
        _target: GLenum,
        levels: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
        memory: GLuint,
        offset: GLuint64,
    ) {
        self.record(
            "glTexStorageMem2DEXT",
            GlCall::TexStorageMem2d {
                levels,
                internal_format,
                width,
                height,
                memory,
                offset,
            },
        );
        let code = self.injected_error("storage");
        if code != gl::NO_ERROR {
            self.push_pending_error(code);
        }
    }

    unsafe fn delete_texture(&self, texture: GLuint) {
        self.record("glDeleteTextures", GlCall::DeleteTexture(texture));
    }

    unsafe fn delete_memory_object(&self, memory: GLuint) {
        self.record(
            "glDeleteMemoryObjectsEXT",
            GlCall::DeleteMemoryObject(memory),
        );
    }

    unsafe fn get_error(&self) -> GLenum {
        self.pending_errors
            .borrow_mut()
            .pop_front()
            .unwrap_or(gl::NO_ERROR)
    }
}
