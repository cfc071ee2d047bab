//! Binding to the PaddleSeg native module.
//!
//! The module exports six `extern "C"` entry points and keeps all engine
//! state in process-global storage. Every buffer handed to it is a
//! [`ScratchBuffer`] owned by exactly one call: filled just before the call,
//! read back just after, and freed when the call's scope ends whatever the
//! outcome.

use std::ffi::{c_char, c_int, CString};
use std::path::Path;

use libloading::Library;

use crate::buffer::{expected_len, MaskBuffer, PixelBuffer};
use crate::errors::{Result, SegError};
use crate::options::ModelOptions;
use crate::slot::{SlotGuard, NATIVE_MODULE_SLOT};
use crate::traits::SegmentationBackend;

type InitFn = unsafe extern "C" fn(*const c_char, c_int, c_int, c_int, c_int, c_int) -> c_int;
type InferFn = unsafe extern "C" fn(*const u8, c_int, c_int, *mut u8) -> c_int;
type SetBackgroundRgbFn = unsafe extern "C" fn(u8, u8, u8) -> c_int;
type SetBackgroundImageFn = unsafe extern "C" fn(*const c_char) -> c_int;
type ApplyBackgroundFn = unsafe extern "C" fn(*const u8, c_int, c_int, *mut u8) -> c_int;
type ReleaseFn = unsafe extern "C" fn();

/// File name of the native module for the current OS family.
pub const fn library_file_name() -> &'static str {
    if cfg!(windows) {
        "PaddleSegInterence.dll"
    } else {
        "libPaddleSegInterence.so"
    }
}

#[derive(Clone, Copy)]
struct NativeApi {
    init: InitFn,
    infer: InferFn,
    set_background_rgb: SetBackgroundRgbFn,
    set_background_image: SetBackgroundImageFn,
    apply_background: ApplyBackgroundFn,
    release: ReleaseFn,
}

impl NativeApi {
    /// # Safety
    /// `library` must be the PaddleSeg module, so that each symbol has the
    /// signature declared above.
    unsafe fn resolve(library: &Library, path: &Path) -> Result<Self> {
        Ok(Self {
            init: symbol(library, path, "seg_init")?,
            infer: symbol(library, path, "seg_infer")?,
            set_background_rgb: symbol(library, path, "seg_set_background_rgb")?,
            set_background_image: symbol(library, path, "seg_set_background_image")?,
            apply_background: symbol(library, path, "seg_apply_background")?,
            release: symbol(library, path, "seg_release")?,
        })
    }
}

unsafe fn symbol<T: Copy>(library: &Library, path: &Path, name: &'static str) -> Result<T> {
    library
        .get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|source| SegError::SymbolNotFound {
            library: path.to_path_buf(),
            symbol: name,
            source,
        })
}

/// Heap memory lent to the native module for the duration of one call.
struct ScratchBuffer {
    bytes: Box<[u8]>,
}

impl ScratchBuffer {
    fn copy_from(src: &[u8]) -> Self {
        Self {
            bytes: Box::from(src),
        }
    }

    fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0; len].into_boxed_slice(),
        }
    }

    fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.bytes.as_mut_ptr()
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}

/// Dimensions as the module's `int` parameters. The largest buffer
/// (`width * height * 4`) must also stay addressable by an `int`.
fn native_dims(width: u32, height: u32) -> Result<(c_int, c_int)> {
    let fits = (width as u64) * (height as u64) * 4 <= c_int::MAX as u64;
    match (c_int::try_from(width), c_int::try_from(height)) {
        (Ok(w), Ok(h)) if fits => Ok((w, h)),
        _ => Err(SegError::Dimensions { width, height }),
    }
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    let invalid = || SegError::InvalidPath {
        path: path.to_path_buf(),
    };

    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes = path.to_str().ok_or_else(invalid)?.as_bytes().to_vec();

    CString::new(bytes).map_err(|_| invalid())
}

fn check_status(status: c_int, to_error: impl FnOnce(i32) -> SegError) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(to_error(status))
    }
}

/// The loaded native module.
///
/// Holds the process-wide module slot for its whole lifetime, so at most one
/// `NativeLibrary` exists at a time.
pub struct NativeLibrary {
    api: NativeApi,
    initialized: bool,
    // Unloaded before the slot is handed to anyone else.
    _library: Library,
    _slot: SlotGuard<'static>,
}

impl NativeLibrary {
    /// Loads the module by its platform file name through the system search path.
    pub fn load() -> Result<Self> {
        Self::load_from(library_file_name())
    }

    /// Loads the module from an explicit path.
    ///
    /// Fails with `SessionBusy` while another `NativeLibrary` is alive. A
    /// failed load leaves nothing behind, so the caller may retry with a
    /// different path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let slot = NATIVE_MODULE_SLOT.try_acquire()?;

        // SAFETY: loading runs the module's initializers; the PaddleSeg module
        // has no load-time requirements beyond its own dependencies.
        let library = unsafe { Library::new(path) }.map_err(|source| SegError::ModuleLoad {
            library: path.to_path_buf(),
            source,
        })?;
        // SAFETY: the symbol types mirror paddleseg_api.h.
        let api = unsafe { NativeApi::resolve(&library, path)? };

        tracing::info!(library = %path.display(), "loaded native segmentation module");
        Ok(Self {
            api,
            initialized: false,
            _library: library,
            _slot: slot,
        })
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(SegError::NotInitialized)
        }
    }

    /// Runs one of the two "RGBA in, buffer out" entry points.
    fn exchange(
        &self,
        input: &PixelBuffer,
        out_channels: usize,
        call: impl FnOnce(*const u8, c_int, c_int, *mut u8) -> c_int,
    ) -> Result<(c_int, Vec<u8>)> {
        let (width, height) = native_dims(input.width(), input.height())?;
        let scratch_in = ScratchBuffer::copy_from(input.as_bytes());
        let mut scratch_out =
            ScratchBuffer::zeroed(expected_len(input.width(), input.height(), out_channels));

        tracing::debug!(
            width,
            height,
            in_len = scratch_in.len(),
            out_len = scratch_out.len(),
            "native call"
        );
        let status = call(scratch_in.as_ptr(), width, height, scratch_out.as_mut_ptr());
        Ok((status, scratch_out.into_vec()))
    }
}

impl SegmentationBackend for NativeLibrary {
    fn init(&mut self, model_dir: &Path, options: &ModelOptions) -> Result<()> {
        let model_dir_c = path_to_cstring(model_dir)?;
        let (use_gpu, gpu_mem, cpu_threads, onednn, onnxruntime) = options.native_args();

        tracing::debug!(
            model_dir = %model_dir.display(),
            options = %options.to_json(),
            "seg_init"
        );
        // SAFETY: the string outlives the call; the module copies what it keeps.
        let status = unsafe {
            (self.api.init)(
                model_dir_c.as_ptr(),
                use_gpu,
                gpu_mem,
                cpu_threads,
                onednn,
                onnxruntime,
            )
        };
        check_status(status, |code| SegError::EngineInit { code })?;
        self.initialized = true;
        Ok(())
    }

    fn infer(&mut self, input: &PixelBuffer) -> Result<MaskBuffer> {
        self.ensure_initialized()?;
        let infer = self.api.infer;
        // SAFETY: input holds width*height*4 bytes and the mask scratch
        // width*height, exactly what seg_infer reads and writes.
        let (status, mask) = self.exchange(input, 1, |src, w, h, dst| unsafe {
            infer(src, w, h, dst)
        })?;
        check_status(status, |code| SegError::Infer { code })?;
        MaskBuffer::new(input.width(), input.height(), mask)
    }

    fn set_background_color(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        self.ensure_initialized()?;
        tracing::debug!(r, g, b, "seg_set_background_rgb");
        // SAFETY: scalar arguments only.
        let status = unsafe { (self.api.set_background_rgb)(r, g, b) };
        check_status(status, |code| SegError::SetBackground { code })
    }

    fn set_background_image(&mut self, path: &Path) -> Result<()> {
        self.ensure_initialized()?;
        let path_c = path_to_cstring(path)?;
        tracing::debug!(path = %path.display(), "seg_set_background_image");
        // SAFETY: the string outlives the call.
        let status = unsafe { (self.api.set_background_image)(path_c.as_ptr()) };
        check_status(status, |code| SegError::SetBackground { code })
    }

    fn apply_background(&mut self, input: &PixelBuffer) -> Result<PixelBuffer> {
        self.ensure_initialized()?;
        let apply = self.api.apply_background;
        // SAFETY: both scratch buffers hold width*height*4 bytes.
        let (status, output) = self.exchange(input, 4, |src, w, h, dst| unsafe {
            apply(src, w, h, dst)
        })?;
        check_status(status, |code| SegError::ApplyBackground { code })?;
        PixelBuffer::new(input.width(), input.height(), output)
    }

    fn release(&mut self) {
        if !self.initialized {
            return;
        }
        tracing::debug!("seg_release");
        // SAFETY: called at most once per successful seg_init.
        unsafe { (self.api.release)() };
        self.initialized = false;
    }
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        if self.initialized {
            tracing::warn!("native module dropped while initialized, releasing");
            self.release();
        }
    }
}
