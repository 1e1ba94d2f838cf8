//! Output surface of a capture session: status text, start/stop control
//! visibility and the overlay canvas.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};

use crate::config::OverlaySettings;

#[derive(Debug)]
pub struct ViewBinding {
    status: String,
    start_visible: bool,
    stop_visible: bool,
    canvas: Option<RgbImage>,
    output_path: Option<PathBuf>,
}

impl ViewBinding {
    /// Bind once at startup. The canvas starts empty with only "start" shown.
    pub fn mount(settings: &OverlaySettings) -> Self {
        Self {
            status: String::new(),
            start_visible: true,
            stop_visible: false,
            canvas: None,
            output_path: settings.output_path.clone(),
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        log::debug!("status: {}", self.status);
    }

    pub fn start_visible(&self) -> bool {
        self.start_visible
    }

    pub fn stop_visible(&self) -> bool {
        self.stop_visible
    }

    pub fn show_streaming_controls(&mut self) {
        self.start_visible = false;
        self.stop_visible = true;
    }

    pub fn reset_buttons(&mut self) {
        self.start_visible = true;
        self.stop_visible = false;
    }

    pub fn canvas(&self) -> Option<&RgbImage> {
        self.canvas.as_ref()
    }

    pub fn clear_canvas(&mut self) {
        self.canvas = None;
    }

    /// Replace the canvas and, when configured, write it to the output path.
    pub fn present(&mut self, image: RgbImage) -> Result<()> {
        let canvas = self.canvas.insert(image);
        if let Some(path) = &self.output_path {
            write_atomic(path, canvas)?;
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, image: &RgbImage) -> Result<()> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("unsupported overlay format {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    image
        .save_with_format(&tmp, format)
        .with_context(|| format!("write overlay {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("move overlay into place at {}", path.display()))?;
    Ok(())
}
