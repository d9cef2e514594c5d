// Texture Data Module
//
// The per-texture unit shared between the manager and the loader:
// - Resource keys and texture identities
// - Load state machine with epoch-guarded decoding
// - Source (decode) and device (upload/bind) seams

pub mod data;
pub mod device;
pub mod source;

pub use data::{LoadOutcome, ResourceKey, TextureData, TextureId, TextureState};
pub use device::{DeviceTexture, HeadlessDevice, RenderDevice};
pub use source::{DecodedImage, FileSource, TextureSource};

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Byte size of an RGBA8 image with the given extent
pub fn rgba_size(extent: glam::UVec2) -> usize {
    extent.x as usize * extent.y as usize * BYTES_PER_PIXEL
}
