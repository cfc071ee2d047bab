use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::{ImageError, ImageFormat};
use tempfile::NamedTempFile;

use crate::buffer::PixelBuffer;
use crate::errors::{Result, SegError};

/// Decodes an image file into an RGBA `PixelBuffer`.
pub fn load_rgba(path: &Path) -> Result<PixelBuffer> {
    if !path.is_file() {
        return Err(SegError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let img = image::open(path).map_err(|e| SegError::Decode {
        path: path.to_path_buf(),
        source: e,
    })?;
    let buffer = PixelBuffer::from_rgba_image(&img.into_rgba8());
    tracing::debug!(
        path = %path.display(),
        width = buffer.width(),
        height = buffer.height(),
        "decoded image"
    );
    Ok(buffer)
}

/// Writes a `PixelBuffer` as PNG, whatever the extension of `path`.
///
/// The image is encoded into a temporary file next to `path` and renamed into
/// place, so `path` never holds a partly written image.
pub fn save_rgba(path: &Path, pixels: &PixelBuffer) -> Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| SegError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create output directory".to_string(),
                source: e,
            })?;
            parent
        }
        None => Path::new("."),
    };

    let mut staging = NamedTempFile::new_in(parent).map_err(|e| SegError::FileSystem {
        path: parent.to_path_buf(),
        operation: "create temporary output file".to_string(),
        source: e,
    })?;
    let encode_error = |source| SegError::Encode {
        path: path.to_path_buf(),
        source,
    };
    {
        let mut writer = BufWriter::new(staging.as_file_mut());
        pixels
            .to_rgba_image()
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(encode_error)?;
        writer
            .flush()
            .map_err(|e| encode_error(ImageError::IoError(e)))?;
    }

    staging.persist(path).map_err(|e| SegError::FileSystem {
        path: path.to_path_buf(),
        operation: "move output into place".to_string(),
        source: e.error,
    })?;
    tracing::debug!(path = %path.display(), "encoded image");
    Ok(())
}
