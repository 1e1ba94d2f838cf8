use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use rand::Rng;

use super::FrameSource;
use crate::frame::Frame;

/// Synthetic camera for `stub://` URLs.
///
/// Produces a drifting gradient with light sensor noise. The first grab after
/// `open` returns `None`, mimicking a device that has not decoded a frame yet.
/// `stub://denied` fails to open, mimicking a refused permission prompt.
pub struct SyntheticSource {
    url: String,
    width: u32,
    height: u32,
    open: bool,
    warmed_up: bool,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(url: &str, width: u32, height: u32) -> Self {
        Self {
            url: url.to_string(),
            width,
            height,
            open: false,
            warmed_up: false,
            frame_count: 0,
        }
    }

    fn generate(&self) -> RgbImage {
        let shift = (self.frame_count % 256) as u32;
        let mut rng = rand::thread_rng();
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let noise: u8 = rng.gen_range(0..8);
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift / 2) % 256) as u8,
                96u8.saturating_add(noise),
            ])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.url)
    }

    fn open(&mut self) -> Result<()> {
        if self.url == "stub://denied" {
            return Err(anyhow!("camera permission denied for {}", self.url));
        }
        self.open = true;
        self.warmed_up = false;
        log::info!("SyntheticSource: opened {}", self.url);
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Err(anyhow!("synthetic source not open; call open() first"));
        }
        if !self.warmed_up {
            self.warmed_up = true;
            return Ok(None);
        }
        self.frame_count += 1;
        Ok(Some(Frame::new(self.generate())))
    }

    fn release(&mut self) {
        if self.open {
            log::info!("SyntheticSource: released {}", self.url);
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
