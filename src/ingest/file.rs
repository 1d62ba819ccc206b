//! Local file frame source.
//!
//! `FileFrameSource` cycles through a fixed list of image files, decoding
//! one per call. A single `stub://WIDTHxHEIGHT` entry produces blank frames
//! of that size instead of touching the filesystem.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use super::FrameSource;
use crate::frame::Frame;

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Camera name the source answers to.
    pub name: String,
    /// Image paths, or a single `stub://WIDTHxHEIGHT` entry.
    pub paths: Vec<String>,
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub name: String,
}

pub struct FileFrameSource {
    name: String,
    backend: FileBackend,
    frames_captured: AtomicU64,
}

enum FileBackend {
    Synthetic { width: u32, height: u32 },
    Images(Vec<PathBuf>),
}

impl FileFrameSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if config.paths.is_empty() {
            return Err(anyhow!("file source '{}' has no frames", config.name));
        }
        let backend = match config.paths.as_slice() {
            [single] if single.starts_with("stub://") => {
                let (width, height) = parse_stub_size(single)?;
                FileBackend::Synthetic { width, height }
            }
            paths => {
                if let Some(remote) = paths.iter().find(|p| !is_local_file_path(p)) {
                    return Err(anyhow!(
                        "file source only supports local paths (got {})",
                        remote
                    ));
                }
                FileBackend::Images(paths.iter().map(PathBuf::from).collect())
            }
        };
        Ok(Self {
            name: config.name,
            backend,
            frames_captured: AtomicU64::new(0),
        })
    }

    pub fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            name: self.name.clone(),
        }
    }
}

#[async_trait]
impl FrameSource for FileFrameSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_frame(&self) -> Result<Frame> {
        let n = self.frames_captured.fetch_add(1, Ordering::Relaxed);
        match &self.backend {
            FileBackend::Synthetic { width, height } => Ok(Frame::blank(*width, *height)),
            FileBackend::Images(paths) => {
                let path = paths[(n as usize) % paths.len()].clone();
                tokio::task::spawn_blocking(move || Frame::open(&path))
                    .await
                    .context("frame decode task failed")?
            }
        }
    }
}

fn parse_stub_size(url: &str) -> Result<(u32, u32)> {
    let size = url.trim_start_matches("stub://");
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| anyhow!("stub frame source must look like stub://WIDTHxHEIGHT"))?;
    let width: u32 = w
        .parse()
        .map_err(|_| anyhow!("invalid stub frame width {:?}", w))?;
    let height: u32 = h
        .parse()
        .map_err(|_| anyhow!("invalid stub frame height {:?}", h))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("stub frame size must be non-zero"));
    }
    Ok((width, height))
}

fn is_local_file_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}
