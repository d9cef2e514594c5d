//! Drives the texture cache through a scrolling-list workload.
//!
//! With `--features profiling` a trace is written to `texture_trace.json`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use glam::UVec2;
use texture_cache::{
    DecodedImage, HeadlessDevice, LoadPolicy, ResourceKey, Result, TextureCacheConfig,
    TextureDataManager, TextureSource,
};

#[cfg(feature = "profiling")]
use std::fs::File;

const TEXTURES: u64 = 400;
const VISIBLE: u64 = 24;
const FRAMES: u64 = 2_000;

/// Generates a flat-colour image whose size depends on the file name
struct SyntheticSource;

impl SyntheticSource {
    fn extent(path: &Path) -> UVec2 {
        let len = path.as_os_str().len() as u32;
        UVec2::new(64 + len * 8, 64 + (len % 5) * 16)
    }
}

impl TextureSource for SyntheticSource {
    fn probe(&self, path: &Path) -> Option<UVec2> {
        Some(Self::extent(path))
    }

    fn decode(&self, path: &Path, _tiled: bool) -> Result<DecodedImage> {
        let extent = Self::extent(path);
        let shade = (path.as_os_str().len() % 255) as u8;
        DecodedImage::new(extent, vec![shade; (extent.x * extent.y * 4) as usize])
    }
}

#[cfg(feature = "profiling")]
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let file = File::create("texture_trace.json").expect("create trace file");
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .init();
    guard
}

fn main() -> Result<()> {
    #[cfg(feature = "profiling")]
    let _guard = init_tracing();

    let config = TextureCacheConfig::new(8 * 1024 * 1024).with_load_policy(LoadPolicy::BlockFirstLoad);
    let device = Arc::new(HeadlessDevice::new());
    let manager = TextureDataManager::new(config, Arc::new(SyntheticSource), device.clone())?;

    let keys: Vec<ResourceKey> = (0..TEXTURES)
        .map(|i| {
            let key = ResourceKey::new(i);
            manager
                .add(key, i % 7 == 0)
                .init_from_path(format!("art/cover_{i}.png"));
            key
        })
        .collect();

    let start = Instant::now();
    for frame in 0..FRAMES {
        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("frame", frame).entered();

        manager.begin_frame();
        let first = (frame / 4) % TEXTURES;
        for offset in 0..VISIBLE {
            let key = keys[((first + offset) % TEXTURES) as usize];
            manager.bind(key, (offset % 8) as u32);
        }
    }
    let elapsed = start.elapsed();

    manager.set_exit();
    let stats = manager.stats();
    println!("{FRAMES} frames in {elapsed:?}");
    println!(
        "resident {}/{} textures, {} bytes ({} on device), {} evictions",
        stats.resident, stats.registered, stats.total_size, stats.committed_size, stats.evictions
    );
    println!(
        "loads: {} blocking, {} background; device uploads: {}",
        stats.blocking_loads,
        stats.background_loads,
        device.upload_count()
    );
    Ok(())
}
