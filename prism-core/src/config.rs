//! Graph Configuration
//!
//! Defaults used when the graph builds evaluation contexts, and the GPU
//! resource budgets handed to the resource balancer.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```rust,ignore
//! let config = GraphConfig::from_json(r#"{ "view_width": 1920, "view_height": 1080 }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Upper bounds on what a single merged shader may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Texture samplers.
    pub max_buffers: usize,
    /// Texture coordinate varyings.
    pub max_coords: usize,
    /// Texture fetches.
    pub max_fetches: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_buffers: 16,
            max_coords: 8,
            max_fetches: 128,
        }
    }
}

/// Graph-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Viewport width used by `Graph::context_for_frame`.
    pub view_width: usize,
    /// Viewport height used by `Graph::context_for_frame`.
    pub view_height: usize,
    /// Playback rate stamped on new contexts.
    pub fps: f32,
    pub limits: ResourceLimits,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            view_width: 1280,
            view_height: 720,
            fps: 24.0,
            limits: ResourceLimits::default(),
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
