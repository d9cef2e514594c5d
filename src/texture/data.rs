use crate::error::{Result, TextureError};
use crate::texture::{rgba_size, DeviceTexture, RenderDevice, TextureSource};
use glam::UVec2;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_RESOURCE_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of the resource that owns a texture
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(u64);

impl ResourceKey {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Process-unique key for resources without a natural identity
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_KEY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one texture data unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    fn allocate() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Load state of a texture data unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureState {
    Unloaded,
    Queued,
    Loading,
    Loaded,
    Failed,
    Committed,
}

impl TextureState {
    /// Whether the data occupies (or is about to occupy) memory
    pub fn is_resident(self) -> bool {
        matches!(
            self,
            TextureState::Queued
                | TextureState::Loading
                | TextureState::Loaded
                | TextureState::Committed
        )
    }
}

/// Result of one decode attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Pixels decoded and published
    Loaded { bytes: usize },
    /// Decode failed; the error is stored on the data
    Failed { reason: String },
    /// Data was released while decoding; the result was dropped
    Discarded,
    /// Nothing to do, the data was not waiting for a load
    Skipped,
}

enum Origin {
    Empty,
    Path(PathBuf),
    Memory,
}

struct Inner {
    state: TextureState,
    origin: Origin,
    estimated_extent: Option<UVec2>,
    extent: UVec2,
    pixels: Option<Vec<u8>>,
    device: Option<DeviceTexture>,
    /// Bumped on release; a decode started under an older epoch is discarded
    epoch: u64,
    loaded_before: bool,
    last_error: Option<TextureError>,
}

/// Decoded pixels for one texture resource.
///
/// Shared between the manager and the background loader; all state lives
/// behind one lock so either side can observe transitions.
pub struct TextureData {
    id: TextureId,
    tiled: bool,
    source: Arc<dyn TextureSource>,
    inner: Mutex<Inner>,
}

impl TextureData {
    pub fn new(tiled: bool, source: Arc<dyn TextureSource>) -> Self {
        Self {
            id: TextureId::allocate(),
            tiled,
            source,
            inner: Mutex::new(Inner {
                state: TextureState::Unloaded,
                origin: Origin::Empty,
                estimated_extent: None,
                extent: UVec2::ZERO,
                pixels: None,
                device: None,
                epoch: 0,
                loaded_before: false,
                last_error: None,
            }),
        }
    }

    /// Point the data at an image on disk. Nothing is decoded yet.
    pub fn init_from_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let estimated = self.source.probe(&path);
        if estimated.is_none() {
            tracing::debug!(texture = self.id.0, path = %path.display(), "could not probe texture size");
        }

        let mut inner = self.inner.lock();
        if inner.device.is_some() {
            tracing::warn!(texture = self.id.0, "re-initialising a committed texture");
        }
        inner.epoch += 1;
        inner.state = TextureState::Unloaded;
        inner.origin = Origin::Path(path);
        inner.estimated_extent = estimated;
        inner.extent = UVec2::ZERO;
        inner.pixels = None;
        inner.last_error = None;
    }

    /// Use pixels generated in memory. Such data cannot be reloaded, so it
    /// keeps its pixels after upload and is never evicted.
    pub fn init_from_rgba(&self, pixels: Vec<u8>, extent: UVec2) -> Result<()> {
        let expected = rgba_size(extent);
        if pixels.len() != expected {
            return Err(TextureError::InvalidPixels {
                expected,
                actual: pixels.len(),
            });
        }

        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.state = TextureState::Loaded;
        inner.origin = Origin::Memory;
        inner.estimated_extent = Some(extent);
        inner.extent = extent;
        inner.pixels = Some(pixels);
        inner.loaded_before = true;
        inner.last_error = None;
        Ok(())
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn is_tiled(&self) -> bool {
        self.tiled
    }

    pub fn state(&self) -> TextureState {
        self.inner.lock().state
    }

    pub fn path(&self) -> Option<PathBuf> {
        match &self.inner.lock().origin {
            Origin::Path(path) => Some(path.clone()),
            _ => None,
        }
    }

    /// Whether released pixels can be decoded again from the source
    pub fn is_reloadable(&self) -> bool {
        matches!(self.inner.lock().origin, Origin::Path(_))
    }

    /// Whether a decode has been attempted (or pixels supplied) at least once
    pub fn has_loaded_before(&self) -> bool {
        self.inner.lock().loaded_before
    }

    /// Decoded extent, or the probed one before decoding
    pub fn extent(&self) -> Option<UVec2> {
        let inner = self.inner.lock();
        match inner.state {
            TextureState::Loaded | TextureState::Committed => Some(inner.extent),
            _ => inner.estimated_extent,
        }
    }

    pub fn last_error(&self) -> Option<TextureError> {
        self.inner.lock().last_error.clone()
    }

    /// Memory attributed to this data in its current state, in bytes.
    ///
    /// Unloaded and failed data count as zero; queued and loading data count
    /// their probed size.
    pub fn footprint(&self) -> usize {
        let inner = self.inner.lock();
        match inner.state {
            TextureState::Unloaded | TextureState::Failed => 0,
            TextureState::Queued | TextureState::Loading => {
                inner.estimated_extent.map(rgba_size).unwrap_or(0)
            }
            TextureState::Loaded => inner.pixels.as_ref().map(Vec::len).unwrap_or(0),
            TextureState::Committed => rgba_size(inner.extent),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state() == TextureState::Committed
    }

    /// Unloaded -> Queued. Returns false if the data is in any other state.
    pub(crate) fn mark_queued(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == TextureState::Unloaded {
            inner.state = TextureState::Queued;
            true
        } else {
            false
        }
    }

    /// Queued -> Unloaded, for jobs cancelled before they started
    pub(crate) fn cancel_queued(&self) {
        let mut inner = self.inner.lock();
        if inner.state == TextureState::Queued {
            inner.state = TextureState::Unloaded;
        }
    }

    /// Decode on the calling thread.
    ///
    /// The lock is not held while decoding. If the data is released in the
    /// meantime the decoded pixels are dropped instead of published.
    pub fn load(&self) -> LoadOutcome {
        self.load_from(&[TextureState::Unloaded, TextureState::Queued])
    }

    /// Decode a job taken off the loader queue. Skipped unless the data is
    /// still queued, so a release after dequeue cancels the job.
    pub(crate) fn load_queued(&self) -> LoadOutcome {
        self.load_from(&[TextureState::Queued])
    }

    fn load_from(&self, accepted: &[TextureState]) -> LoadOutcome {
        let (path, epoch) = {
            let mut inner = self.inner.lock();
            if !accepted.contains(&inner.state) {
                return LoadOutcome::Skipped;
            }
            let path = match &inner.origin {
                Origin::Path(path) => Some(path.clone()),
                Origin::Memory => return LoadOutcome::Skipped,
                Origin::Empty => None,
            };
            let Some(path) = path else {
                inner.state = TextureState::Failed;
                inner.loaded_before = true;
                inner.last_error = Some(TextureError::NoSource);
                return LoadOutcome::Failed {
                    reason: TextureError::NoSource.to_string(),
                };
            };
            inner.state = TextureState::Loading;
            (path, inner.epoch)
        };

        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("texture_decode", texture = self.id.0).entered();

        let decoded = self.source.decode(&path, self.tiled);

        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            tracing::trace!(texture = self.id.0, "texture released during decode, dropping result");
            return LoadOutcome::Discarded;
        }

        inner.loaded_before = true;
        match decoded {
            Ok(image) => {
                let bytes = image.byte_size();
                inner.extent = image.extent;
                inner.pixels = Some(image.pixels);
                inner.state = TextureState::Loaded;
                inner.last_error = None;
                LoadOutcome::Loaded { bytes }
            }
            Err(err) => {
                tracing::warn!(texture = self.id.0, path = %path.display(), "texture decode failed: {err}");
                let reason = err.to_string();
                inner.pixels = None;
                inner.state = TextureState::Failed;
                inner.last_error = Some(err);
                LoadOutcome::Failed { reason }
            }
        }
    }

    /// Upload loaded pixels to the device if not done yet.
    ///
    /// Returns the device handle, or `None` if the data is not ready.
    /// Reloadable data drops its CPU pixels once uploaded.
    pub fn commit(&self, device: &dyn RenderDevice) -> Result<Option<DeviceTexture>> {
        let mut inner = self.inner.lock();
        match inner.state {
            TextureState::Committed => Ok(inner.device),
            TextureState::Loaded => {
                let handle = {
                    let pixels = inner.pixels.as_deref().unwrap_or(&[]);
                    device.upload(pixels, inner.extent, self.tiled)
                };
                let handle = match handle {
                    Ok(handle) => handle,
                    Err(err) => {
                        inner.last_error = Some(err.clone());
                        return Err(err);
                    }
                };
                inner.device = Some(handle);
                inner.state = TextureState::Committed;
                if matches!(inner.origin, Origin::Path(_)) {
                    inner.pixels = None;
                }
                Ok(Some(handle))
            }
            _ => Ok(None),
        }
    }

    /// Free device memory and, for reloadable data, CPU pixels.
    ///
    /// Any decode in progress is discarded when it finishes.
    pub fn release(&self, device: &dyn RenderDevice) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        if let Some(handle) = inner.device.take() {
            device.release(handle);
        }
        if matches!(inner.origin, Origin::Memory) && inner.pixels.is_some() {
            inner.state = TextureState::Loaded;
        } else {
            inner.pixels = None;
            inner.state = TextureState::Unloaded;
        }
    }
}

impl fmt::Debug for TextureData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TextureData")
            .field("id", &self.id)
            .field("tiled", &self.tiled)
            .field("state", &inner.state)
            .field("extent", &inner.extent)
            .finish()
    }
}

impl PartialEq for TextureData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TextureData {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{DecodedImage, HeadlessDevice};
    use std::path::Path;

    struct SolidSource;

    impl TextureSource for SolidSource {
        fn probe(&self, path: &Path) -> Option<UVec2> {
            (path != Path::new("broken.png")).then_some(UVec2::new(4, 4))
        }

        fn decode(&self, path: &Path, _tiled: bool) -> Result<DecodedImage> {
            if path == Path::new("broken.png") {
                return Err(TextureError::DecodeFailed {
                    path: path.display().to_string(),
                    reason: "corrupt header".to_string(),
                });
            }
            DecodedImage::new(UVec2::new(4, 4), vec![255; 64])
        }
    }

    fn data(path: &str) -> TextureData {
        let data = TextureData::new(false, Arc::new(SolidSource));
        data.init_from_path(path);
        data
    }

    #[test]
    fn test_ids_are_unique() {
        let a = TextureData::new(false, Arc::new(SolidSource));
        let b = TextureData::new(false, Arc::new(SolidSource));
        assert_ne!(a.id(), b.id());
        assert_ne!(ResourceKey::next(), ResourceKey::next());
    }

    #[test]
    fn test_footprint_follows_state() {
        let tex = data("a.png");
        assert_eq!(tex.state(), TextureState::Unloaded);
        assert_eq!(tex.footprint(), 0);

        assert!(tex.mark_queued());
        assert_eq!(tex.footprint(), 64);

        assert_eq!(tex.load(), LoadOutcome::Loaded { bytes: 64 });
        assert_eq!(tex.state(), TextureState::Loaded);
        assert_eq!(tex.footprint(), 64);
    }

    #[test]
    fn test_commit_releases_cpu_pixels_for_reloadable_data() {
        let device = HeadlessDevice::new();
        let tex = data("a.png");
        tex.load();

        let handle = tex.commit(&device).unwrap();
        assert!(handle.is_some());
        assert!(tex.is_committed());
        assert_eq!(tex.footprint(), 64);
        assert!(tex.inner.lock().pixels.is_none());

        // Committing again reuses the handle
        assert_eq!(tex.commit(&device).unwrap(), handle);
        assert_eq!(device.upload_count(), 1);
    }

    #[test]
    fn test_in_memory_data_keeps_pixels() {
        let device = HeadlessDevice::new();
        let tex = TextureData::new(true, Arc::new(SolidSource));
        tex.init_from_rgba(vec![1; 16], UVec2::new(2, 2)).unwrap();
        assert!(!tex.is_reloadable());

        tex.commit(&device).unwrap();
        assert!(tex.inner.lock().pixels.is_some());

        tex.release(&device);
        assert_eq!(tex.state(), TextureState::Loaded);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn test_init_from_rgba_rejects_wrong_size() {
        let tex = TextureData::new(false, Arc::new(SolidSource));
        assert!(tex.init_from_rgba(vec![0; 3], UVec2::new(1, 1)).is_err());
        assert_eq!(tex.state(), TextureState::Unloaded);
    }

    #[test]
    fn test_decode_failure_is_recorded() {
        let device = HeadlessDevice::new();
        let tex = data("broken.png");
        assert!(matches!(tex.load(), LoadOutcome::Failed { .. }));
        assert_eq!(tex.state(), TextureState::Failed);
        assert_eq!(tex.footprint(), 0);
        assert!(matches!(
            tex.last_error(),
            Some(TextureError::DecodeFailed { .. })
        ));
        assert_eq!(tex.commit(&device).unwrap(), None);

        // No automatic retry
        assert_eq!(tex.load(), LoadOutcome::Skipped);
    }

    #[test]
    fn test_load_without_source_fails() {
        let tex = TextureData::new(false, Arc::new(SolidSource));
        assert!(matches!(tex.load(), LoadOutcome::Failed { .. }));
        assert!(matches!(tex.last_error(), Some(TextureError::NoSource)));
    }

    #[test]
    fn test_release_returns_to_unloaded() {
        let device = HeadlessDevice::new();
        let tex = data("a.png");
        tex.load();
        tex.commit(&device).unwrap();
        assert_eq!(device.live_textures(), 1);

        tex.release(&device);
        assert_eq!(tex.state(), TextureState::Unloaded);
        assert_eq!(tex.footprint(), 0);
        assert_eq!(device.live_textures(), 0);
        assert!(tex.has_loaded_before());
        assert_eq!(tex.path(), Some(PathBuf::from("a.png")));
    }

    #[test]
    fn test_release_after_dequeue_skips_decode() {
        let device = HeadlessDevice::new();
        let tex = data("a.png");
        assert!(tex.mark_queued());
        tex.release(&device);

        assert_eq!(tex.load_queued(), LoadOutcome::Skipped);
        assert_eq!(tex.state(), TextureState::Unloaded);
        assert_eq!(tex.footprint(), 0);
        assert!(!tex.has_loaded_before());
    }

    #[test]
    fn test_load_queued_decodes_queued_data() {
        let tex = data("a.png");
        assert_eq!(tex.load_queued(), LoadOutcome::Skipped);
        assert!(tex.mark_queued());
        assert_eq!(tex.load_queued(), LoadOutcome::Loaded { bytes: 64 });
        assert_eq!(tex.state(), TextureState::Loaded);
    }

    #[test]
    fn test_cancel_queued_only_affects_queued() {
        let tex = data("a.png");
        tex.cancel_queued();
        assert_eq!(tex.state(), TextureState::Unloaded);
        tex.mark_queued();
        tex.cancel_queued();
        assert_eq!(tex.state(), TextureState::Unloaded);
        assert!(!tex.has_loaded_before());
    }
}
