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

//! Texture Cache - texture data residency for a frontend renderer
//!
//! Keeps decoded textures under a memory ceiling with LRU eviction and
//! decodes them on a background worker thread.

pub mod config;
pub mod error;
pub mod loader;
pub mod manager;
pub mod residency;
pub mod texture;

pub use config::{LoadPolicy, TextureCacheConfig};
pub use error::*;
pub use loader::{LoadEvent, TextureLoader};
pub use manager::{TextureDataManager, TextureStats};
pub use residency::Residency;
pub use texture::{
    DecodedImage, DeviceTexture, FileSource, HeadlessDevice, LoadOutcome, RenderDevice,
    ResourceKey, TextureData, TextureId, TextureSource, TextureState,
};
