// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Texture data manager
//!
//! Textures are registered with [`TextureDataManager::add`] and only decoded
//! once [`TextureDataManager::get`] says they are wanted. Before admitting a
//! load the manager releases least-recently-used textures until resident
//! memory is back under the configured ceiling. The ceiling is soft: when
//! nothing is evictable the load goes ahead anyway.
//!
//! [`TextureDataManager::bind`] uploads loaded pixels to the device, drops
//! the CPU copy when the texture can be decoded again from disk, and binds
//! the result. Textures that are not ready are replaced by a blank texture.

use crate::config::TextureCacheConfig;
use crate::error::{Result, TextureError};
use crate::loader::{LoadEvent, TextureLoader};
use crate::residency::Residency;
use crate::texture::{
    rgba_size, LoadOutcome, RenderDevice, ResourceKey, TextureData, TextureSource, TextureState,
};
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;

struct Record {
    data: Arc<TextureData>,
    /// Frame in which the texture was last bound
    bound_frame: Option<u64>,
}

struct ManagerState {
    records: Residency<Record>,
    frame: u64,
    evictions: u64,
    blocking_loads: u64,
    background_loads: u64,
}

impl ManagerState {
    fn total_size(&self) -> usize {
        self.records.values().map(|rec| rec.data.footprint()).sum()
    }
}

/// Snapshot of manager counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextureStats {
    pub registered: usize,
    pub resident: usize,
    pub total_size: usize,
    pub committed_size: usize,
    pub queue_size: usize,
    pub queued_bytes: usize,
    pub evictions: u64,
    pub blocking_loads: u64,
    pub background_loads: u64,
}

impl TextureStats {
    /// Resident bytes relative to the ceiling (can exceed 1.0)
    pub fn utilization(&self, ceiling: usize) -> f32 {
        if ceiling == 0 {
            0.0
        } else {
            self.total_size as f32 / ceiling as f32
        }
    }
}

/// Registry of texture data with LRU eviction under a memory ceiling.
pub struct TextureDataManager {
    config: TextureCacheConfig,
    source: Arc<dyn TextureSource>,
    device: Arc<dyn RenderDevice>,
    state: Mutex<ManagerState>,
    blank: Arc<TextureData>,
    loader: TextureLoader,
}

impl TextureDataManager {
    pub fn new(
        config: TextureCacheConfig,
        source: Arc<dyn TextureSource>,
        device: Arc<dyn RenderDevice>,
    ) -> Result<Self> {
        config.validate()?;

        let blank = Arc::new(TextureData::new(false, Arc::clone(&source)));
        blank.init_from_rgba(vec![255; rgba_size(config.blank_extent)], config.blank_extent)?;

        let loader = TextureLoader::new()?;
        tracing::debug!(
            ceiling = config.max_texture_memory,
            policy = ?config.load_policy,
            "texture data manager started"
        );

        Ok(Self {
            config,
            source,
            device,
            state: Mutex::new(ManagerState {
                records: Residency::new(),
                frame: 0,
                evictions: 0,
                blocking_loads: 0,
                background_loads: 0,
            }),
            blank,
            loader,
        })
    }

    pub fn config(&self) -> &TextureCacheConfig {
        &self.config
    }

    /// Register a texture. Adding a key twice returns the existing data.
    pub fn add(&self, key: ResourceKey, tiled: bool) -> Arc<TextureData> {
        let mut state = self.state.lock();
        if let Some(rec) = state.records.get(key) {
            if rec.data.is_tiled() != tiled {
                tracing::warn!(%key, tiled, "texture re-added with a different tiling mode");
            }
            return Arc::clone(&rec.data);
        }

        let data = Arc::new(TextureData::new(tiled, Arc::clone(&self.source)));
        state.records.insert(
            key,
            Record {
                data: Arc::clone(&data),
                bound_frame: None,
            },
        );
        data
    }

    /// Forget a texture.
    ///
    /// The data may still be decoding on the loader thread; it is released
    /// here and freed once the last reference goes away.
    pub fn remove(&self, key: ResourceKey) -> bool {
        let mut state = self.state.lock();
        match state.records.remove(key) {
            Some(rec) => {
                self.loader.remove(&rec.data);
                rec.data.release(self.device.as_ref());
                true
            }
            None => false,
        }
    }

    /// Mark a texture as wanted and start loading it if needed
    pub fn get(&self, key: ResourceKey) -> Result<Arc<TextureData>> {
        let mut state = self.state.lock();
        self.get_locked(&mut state, key)
    }

    fn get_locked(&self, state: &mut ManagerState, key: ResourceKey) -> Result<Arc<TextureData>> {
        let data = match state.records.touch(key) {
            Some(rec) => Arc::clone(&rec.data),
            None => {
                tracing::error!(%key, "texture requested before it was added");
                return Err(TextureError::UnknownKey(key));
            }
        };

        if data.state() == TextureState::Unloaded {
            let block = self.config.load_policy.should_block(data.has_loaded_before());
            self.load_locked(state, &data, block);
        }
        Ok(data)
    }

    /// Upload if necessary and bind to `unit`.
    ///
    /// Returns false when the blank texture had to be bound instead, either
    /// because the key is unknown or the data is not ready.
    pub fn bind(&self, key: ResourceKey, unit: u32) -> bool {
        let mut state = self.state.lock();
        let data = match self.get_locked(&mut state, key) {
            Ok(data) => data,
            Err(_) => {
                self.bind_blank(unit);
                return false;
            }
        };

        let frame = state.frame;
        if let Some(rec) = state.records.get_mut(key) {
            rec.bound_frame = Some(frame);
        }

        match data.commit(self.device.as_ref()) {
            Ok(Some(handle)) => {
                self.device.bind(handle, unit);
                true
            }
            Ok(None) => {
                self.bind_blank(unit);
                false
            }
            Err(err) => {
                tracing::warn!(%key, "texture upload failed: {err}");
                self.bind_blank(unit);
                false
            }
        }
    }

    fn bind_blank(&self, unit: u32) {
        match self.blank.commit(self.device.as_ref()) {
            Ok(Some(handle)) => self.device.bind(handle, unit),
            Ok(None) => tracing::warn!("blank texture is not loaded"),
            Err(err) => tracing::warn!("blank texture upload failed: {err}"),
        }
    }

    /// Load `tex`, releasing older textures first if over the ceiling.
    ///
    /// With `block` the decode runs on the calling thread, otherwise it is
    /// handed to the background loader.
    pub fn load(&self, tex: &Arc<TextureData>, block: bool) {
        let mut state = self.state.lock();
        self.load_locked(&mut state, tex, block);
    }

    fn load_locked(&self, state: &mut ManagerState, tex: &Arc<TextureData>, block: bool) {
        if tex.state() != TextureState::Unloaded {
            return;
        }

        let ceiling = self.config.max_texture_memory;
        let mut total = state.total_size();
        if total >= ceiling {
            self.evict_locked(state, tex, &mut total);
            if total >= ceiling {
                tracing::debug!(total, ceiling, "texture memory over budget, nothing left to evict");
            }
        }

        if block {
            state.blocking_loads += 1;
            if let LoadOutcome::Failed { reason } = tex.load() {
                tracing::debug!(texture = tex.id().raw(), %reason, "blocking texture load failed");
            }
        } else if self.loader.load(tex) {
            state.background_loads += 1;
        }
    }

    fn evict_locked(&self, state: &mut ManagerState, incoming: &Arc<TextureData>, total: &mut usize) {
        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("texture_evict", total = *total).entered();

        let frame = state.frame;
        let candidates: Vec<(ResourceKey, Arc<TextureData>)> = state
            .records
            .iter_lru()
            .filter(|(_, rec)| {
                !Arc::ptr_eq(&rec.data, incoming)
                    && rec.bound_frame != Some(frame)
                    && rec.data.is_reloadable()
                    && rec.data.state().is_resident()
            })
            .map(|(key, rec)| (key, Arc::clone(&rec.data)))
            .collect();

        let ceiling = self.config.max_texture_memory;
        for (key, victim) in candidates {
            if *total < ceiling {
                break;
            }
            // It may still be waiting in the loader queue
            self.loader.remove(&victim);
            *total = total.saturating_sub(victim.footprint());
            victim.release(self.device.as_ref());
            state.evictions += 1;
            tracing::debug!(%key, total = *total, "evicted texture");
        }
    }

    /// Start a new frame. Textures bound in the current frame are never
    /// evicted.
    pub fn begin_frame(&self) {
        self.state.lock().frame += 1;
    }

    /// Bytes held by resident textures, loaded or not yet uploaded
    pub fn total_size(&self) -> usize {
        self.state.lock().total_size()
    }

    /// Bytes held on the device
    pub fn committed_size(&self) -> usize {
        self.state
            .lock()
            .records
            .values()
            .filter(|rec| rec.data.is_committed())
            .map(|rec| rec.data.footprint())
            .sum()
    }

    /// Loads waiting for the background worker
    pub fn queue_size(&self) -> usize {
        self.loader.queue_size()
    }

    /// Estimated bytes of loads waiting for the background worker
    pub fn queued_bytes(&self) -> usize {
        self.loader.queued_bytes()
    }

    pub fn stats(&self) -> TextureStats {
        let state = self.state.lock();
        let mut stats = TextureStats {
            registered: state.records.len(),
            queue_size: self.loader.queue_size(),
            queued_bytes: self.loader.queued_bytes(),
            evictions: state.evictions,
            blocking_loads: state.blocking_loads,
            background_loads: state.background_loads,
            ..TextureStats::default()
        };
        for rec in state.records.values() {
            let texture_state = rec.data.state();
            let footprint = rec.data.footprint();
            if texture_state.is_resident() {
                stats.resident += 1;
            }
            if texture_state == TextureState::Committed {
                stats.committed_size += footprint;
            }
            stats.total_size += footprint;
        }
        stats
    }

    /// Keys whose data is resident, least recently used first
    pub fn resident_keys(&self) -> Vec<ResourceKey> {
        self.state
            .lock()
            .records
            .iter_lru()
            .filter(|(_, rec)| rec.data.state().is_resident())
            .map(|(key, _)| key)
            .collect()
    }

    pub fn is_registered(&self, key: ResourceKey) -> bool {
        self.state.lock().records.contains(key)
    }

    pub fn is_resident(&self, key: ResourceKey) -> bool {
        self.state
            .lock()
            .records
            .get(key)
            .is_some_and(|rec| rec.data.state().is_resident())
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Lookup index and recency order agree
    pub fn is_consistent(&self) -> bool {
        self.state.lock().records.is_consistent()
    }

    /// Completion notices from the background loader
    pub fn load_events(&self) -> Receiver<LoadEvent> {
        self.loader.events()
    }

    /// Stop the background loader. Call before tearing down the renderer.
    pub fn set_exit(&self) {
        self.loader.set_exit();
    }
}

impl Drop for TextureDataManager {
    fn drop(&mut self) {
        self.loader.set_exit();
        let state = self.state.get_mut();
        for rec in state.records.values() {
            rec.data.release(self.device.as_ref());
        }
        self.blank.release(self.device.as_ref());
    }
}
