//! Safe bindings and command-line driver for the PaddleSeg native
//! segmentation module.
//!
//! The module itself is opaque: this crate loads it, moves RGBA buffers
//! across the boundary, keeps exactly one session alive per process, and
//! turns its status codes into [`SegError`]s.

pub mod buffer;
pub mod config;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod image_processor;
pub mod logger;
pub mod native;
pub mod options;
pub mod slot;
pub mod traits;

pub mod mocks;

pub use buffer::{MaskBuffer, PixelBuffer};
pub use config::Cli;
pub use engine::{Background, SegmentationEngine};
pub use errors::{Result, SegError};
pub use native::NativeLibrary;
pub use options::ModelOptions;
pub use traits::*;
