use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::UVec2;
use std::path::Path;
use std::sync::Arc;
use texture_cache::{
    DecodedImage, HeadlessDevice, LoadPolicy, ResourceKey, Result, TextureCacheConfig,
    TextureDataManager, TextureSource,
};

// 16x16 mock texture
struct MockSource;

impl TextureSource for MockSource {
    fn probe(&self, _path: &Path) -> Option<UVec2> {
        Some(UVec2::new(16, 16))
    }

    fn decode(&self, _path: &Path, _tiled: bool) -> Result<DecodedImage> {
        DecodedImage::new(UVec2::new(16, 16), vec![0; 16 * 16 * 4])
    }
}

fn manager(ceiling: usize) -> TextureDataManager {
    TextureDataManager::new(
        TextureCacheConfig::new(ceiling).with_load_policy(LoadPolicy::Blocking),
        Arc::new(MockSource),
        Arc::new(HeadlessDevice::new()),
    )
    .unwrap()
}

fn bench_get_with_eviction(c: &mut Criterion) {
    c.bench_function("texture_get_with_eviction", |b| {
        // Room for ten textures; cycling over twenty makes every get a miss
        let manager = manager(10 * 1024);
        for raw in 0..20 {
            manager.add(ResourceKey::new(raw), false).init_from_path("cover.png");
        }
        let mut raw = 0;

        b.iter(|| {
            black_box(manager.get(ResourceKey::new(raw)).unwrap());
            raw = (raw + 1) % 20;
        });
    });
}

fn bench_bind_resident(c: &mut Criterion) {
    let manager = manager(1024 * 1024);

    // Pre-populate
    for raw in 0..1000 {
        let key = ResourceKey::new(raw);
        manager.add(key, false).init_from_path("cover.png");
        manager.bind(key, 0);
    }

    c.bench_function("texture_bind_resident", |b| {
        b.iter(|| {
            manager.bind(black_box(ResourceKey::new(500)), 0);
        });
    });
}

criterion_group!(benches, bench_get_with_eviction, bench_bind_resident);
criterion_main!(benches);
