use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the segmentation bindings.
///
/// Native failures keep the raw status code returned by the module. Nothing
/// beyond "zero is success" is known about those codes, so they are carried
/// as-is for diagnostics.
#[derive(Error, Debug)]
pub enum SegError {
    #[error("Failed to load native module {library:?}")]
    ModuleLoad {
        library: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Native module {library:?} does not export `{symbol}`")]
    SymbolNotFound {
        library: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("A native segmentation session is already active in this process")]
    SessionBusy,

    #[error("Failed to initialize segmentation engine. Error code: {code}")]
    EngineInit { code: i32 },

    #[error("Engine not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("Engine has been released and cannot be initialized again")]
    SessionReleased,

    #[error("Infer failed with code {code}")]
    Infer { code: i32 },

    #[error("Setting the background failed with code {code}")]
    SetBackground { code: i32 },

    #[error("ApplyBackground failed with code {code}")]
    ApplyBackground { code: i32 },

    #[error("No background has been set for this session")]
    BackgroundNotSet,

    #[error("Image not found: {path:?}")]
    FileNotFound { path: PathBuf },

    #[error("Background image not found: {path:?}")]
    BackgroundFileNotFound { path: PathBuf },

    #[error("Failed to decode image {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode image {path:?}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Image dimensions {width}x{height} are not supported by the native module")]
    Dimensions { width: u32, height: u32 },

    #[error("Path cannot be passed to the native module: {path:?}")]
    InvalidPath { path: PathBuf },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SegError>;

/// Convert I/O errors to filesystem errors.
///
/// Code that has a path at hand should construct `SegError::FileSystem`
/// directly; this is the fallback for the rest.
impl From<std::io::Error> for SegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors raised outside a specific file.
impl From<image::ImageError> for SegError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode {
            path: PathBuf::from("unknown"),
            source: err,
        }
    }
}

impl SegError {
    /// Raw status code for failures reported by the native module itself.
    pub const fn native_code(&self) -> Option<i32> {
        match self {
            Self::EngineInit { code }
            | Self::Infer { code }
            | Self::SetBackground { code }
            | Self::ApplyBackground { code } => Some(*code),
            _ => None,
        }
    }
}
