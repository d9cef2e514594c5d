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

//! Error types

use crate::texture::ResourceKey;
use std::fmt;

/// Texture cache error type
#[derive(Debug, Clone)]
pub enum TextureError {
    /// Key was never added, or was removed
    UnknownKey(ResourceKey),

    /// Texture data has neither a source path nor in-memory pixels
    NoSource,

    /// Decoding the source image failed
    DecodeFailed { path: String, reason: String },

    /// Pixel buffer does not match the declared extent
    InvalidPixels { expected: usize, actual: usize },

    /// Device upload failed
    UploadFailed(String),

    /// Background loader could not be started
    LoaderSpawn(String),

    /// Invalid configuration value
    Config(String),

    /// IO error (file operations, etc.)
    IoError(String),
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureError::UnknownKey(key) => write!(f, "Unknown texture key: {key}"),
            TextureError::NoSource => write!(f, "Texture data has no source"),
            TextureError::DecodeFailed { path, reason } => {
                write!(f, "Failed to decode {path}: {reason}")
            }
            TextureError::InvalidPixels { expected, actual } => {
                write!(f, "Pixel buffer size mismatch: expected {expected} bytes, got {actual}")
            }
            TextureError::UploadFailed(msg) => write!(f, "Device upload failed: {msg}"),
            TextureError::LoaderSpawn(msg) => write!(f, "Failed to start texture loader: {msg}"),
            TextureError::Config(msg) => write!(f, "Configuration error: {msg}"),
            TextureError::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for TextureError {}

impl From<std::io::Error> for TextureError {
    fn from(err: std::io::Error) -> Self {
        TextureError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for TextureError {
    fn from(err: serde_json::Error) -> Self {
        TextureError::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TextureError>;
