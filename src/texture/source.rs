use crate::error::{Result, TextureError};
use crate::texture::rgba_size;
use glam::UVec2;
use std::path::{Path, PathBuf};

/// Decoded RGBA8 pixels
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub extent: UVec2,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Wrap a pixel buffer, checking it matches `extent`
    pub fn new(extent: UVec2, pixels: Vec<u8>) -> Result<Self> {
        let expected = rgba_size(extent);
        if pixels.len() != expected {
            return Err(TextureError::InvalidPixels {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { extent, pixels })
    }

    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Produces pixels for a texture path.
///
/// Called from the background loader thread as well as the caller thread,
/// so implementations must be shareable.
pub trait TextureSource: Send + Sync {
    /// Dimensions of the image without decoding it, if cheaply known
    fn probe(&self, path: &Path) -> Option<UVec2>;

    /// Decode the image at `path` into RGBA8 pixels
    fn decode(&self, path: &Path, tiled: bool) -> Result<DecodedImage>;
}

/// Reads textures from disk relative to a base directory
pub struct FileSource {
    base_path: PathBuf,
}

impl FileSource {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_path.join(path)
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new("resources")
    }
}

impl TextureSource for FileSource {
    fn probe(&self, path: &Path) -> Option<UVec2> {
        image::image_dimensions(self.resolve(path))
            .ok()
            .map(|(w, h)| UVec2::new(w, h))
    }

    fn decode(&self, path: &Path, _tiled: bool) -> Result<DecodedImage> {
        let full_path = self.resolve(path);
        let rgba = image::open(&full_path)
            .map_err(|e| TextureError::DecodeFailed {
                path: full_path.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?
            .to_rgba8();
        let extent = UVec2::new(rgba.width(), rgba.height());
        DecodedImage::new(extent, rgba.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_decoded_image_size_check() {
        assert!(DecodedImage::new(UVec2::new(2, 2), vec![0; 16]).is_ok());
        let err = DecodedImage::new(UVec2::new(2, 2), vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            TextureError::InvalidPixels {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn test_file_source_probe_and_decode() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "logo.png", 8, 4);

        let source = FileSource::new(dir.path());
        assert_eq!(source.probe(Path::new("logo.png")), Some(UVec2::new(8, 4)));

        let image = source.decode(Path::new("logo.png"), false).unwrap();
        assert_eq!(image.extent, UVec2::new(8, 4));
        assert_eq!(image.byte_size(), 8 * 4 * 4);
        assert_eq!(&image.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        assert_eq!(source.probe(Path::new("missing.png")), None);
        assert!(matches!(
            source.decode(Path::new("missing.png"), true),
            Err(TextureError::DecodeFailed { .. })
        ));
    }
}
