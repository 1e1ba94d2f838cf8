use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use super::FrameSource;
use crate::frame::Frame;

/// Local still image, decoded once at `open` and returned on every grab.
pub struct StillSource {
    path: PathBuf,
    frame: Option<Frame>,
}

impl StillSource {
    pub fn new(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            frame: None,
        }
    }
}

impl FrameSource for StillSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&mut self) -> Result<()> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("failed to read still image {}", self.path.display()))?;
        self.frame = Some(Frame::decode(&bytes)?);
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| anyhow!("still source not open; call open() first"))?;
        Ok(Some(Frame::new(frame.image().clone())))
    }

    fn release(&mut self) {
        self.frame = None;
    }

    fn is_open(&self) -> bool {
        self.frame.is_some()
    }
}
