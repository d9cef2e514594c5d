use crate::error::{Result, TextureError};
use crate::texture::rgba_size;
use ahash::AHashMap;
use glam::UVec2;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle to a texture living on the rendering device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceTexture(u64);

impl DeviceTexture {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Upload and bind primitives of the rendering backend.
///
/// Only ever called from the caller (render) thread.
pub trait RenderDevice: Send + Sync {
    /// Upload RGBA8 pixels, returning the device handle
    fn upload(&self, pixels: &[u8], extent: UVec2, tiled: bool) -> Result<DeviceTexture>;

    /// Bind an uploaded texture to a texture unit
    fn bind(&self, texture: DeviceTexture, unit: u32);

    /// Free device memory for a texture
    fn release(&self, texture: DeviceTexture);
}

#[derive(Clone, Copy, Debug)]
struct DeviceAllocation {
    bytes: usize,
    tiled: bool,
}

/// Device without a GPU: tracks allocations and bindings.
///
/// Used for headless runs and tests.
#[derive(Default)]
pub struct HeadlessDevice {
    next_handle: AtomicU64,
    uploads: AtomicU64,
    live: Mutex<AHashMap<DeviceTexture, DeviceAllocation>>,
    bound: Mutex<AHashMap<u32, DeviceTexture>>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads performed so far
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn live_textures(&self) -> usize {
        self.live.lock().len()
    }

    /// Device bytes held by live textures
    pub fn live_bytes(&self) -> usize {
        self.live.lock().values().map(|a| a.bytes).sum()
    }

    pub fn is_tiled(&self, texture: DeviceTexture) -> Option<bool> {
        self.live.lock().get(&texture).map(|a| a.tiled)
    }

    /// Texture currently bound to `unit`
    pub fn bound_on(&self, unit: u32) -> Option<DeviceTexture> {
        self.bound.lock().get(&unit).copied()
    }
}

impl RenderDevice for HeadlessDevice {
    fn upload(&self, pixels: &[u8], extent: UVec2, tiled: bool) -> Result<DeviceTexture> {
        let expected = rgba_size(extent);
        if pixels.len() != expected {
            return Err(TextureError::UploadFailed(format!(
                "{}x{} texture needs {expected} bytes, got {}",
                extent.x,
                extent.y,
                pixels.len()
            )));
        }

        let handle = DeviceTexture::new(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.live.lock().insert(
            handle,
            DeviceAllocation {
                bytes: expected,
                tiled,
            },
        );
        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    fn bind(&self, texture: DeviceTexture, unit: u32) {
        self.bound.lock().insert(unit, texture);
    }

    fn release(&self, texture: DeviceTexture) {
        self.live.lock().remove(&texture);
        self.bound.lock().retain(|_, bound| *bound != texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_upload_and_release() {
        let device = HeadlessDevice::new();
        let handle = device.upload(&[0; 16], UVec2::new(2, 2), true).unwrap();
        assert_eq!(device.live_textures(), 1);
        assert_eq!(device.live_bytes(), 16);
        assert_eq!(device.is_tiled(handle), Some(true));

        device.bind(handle, 0);
        assert_eq!(device.bound_on(0), Some(handle));

        device.release(handle);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.bound_on(0), None);
    }

    #[test]
    fn test_headless_rejects_short_buffer() {
        let device = HeadlessDevice::new();
        assert!(device.upload(&[0; 8], UVec2::new(2, 2), false).is_err());
        assert_eq!(device.upload_count(), 0);
    }
}
