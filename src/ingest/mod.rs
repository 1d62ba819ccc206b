//! Frame sources.
//!
//! A group's camera is resolved to a `FrameSource` through the backend
//! registry. Sources provided here:
//! - Local image files, cycled in order (`FileFrameSource`)
//! - Synthetic blank frames (`stub://WIDTHxHEIGHT`) for dry runs and tests
//!
//! Live camera acquisition is out of scope; deployments register their own
//! `FrameSource` implementation under the configured camera name.

use anyhow::Result;
use async_trait::async_trait;

use crate::frame::Frame;

pub mod file;

pub use file::{FileConfig, FileFrameSource, FileStats};

/// Source of camera frames.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Camera name the source is registered under.
    fn name(&self) -> &str;

    /// Capture (or decode) the next frame.
    async fn next_frame(&self) -> Result<Frame>;
}
