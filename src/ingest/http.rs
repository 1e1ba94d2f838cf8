//! HTTP camera source.
//!
//! Supports two camera shapes, picked from the response `Content-Type` at
//! `open` time:
//! - `multipart/x-mixed-replace` MJPEG streams (one long-lived response)
//! - single-JPEG snapshot endpoints (one request per grab)

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;

use super::FrameSource;
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const READ_CHUNK: usize = 8192;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpSource {
    url: String,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegReader),
    Snapshot,
}

impl HttpSource {
    pub fn new(url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        Self {
            url: url.to_string(),
            agent,
            stream: None,
            frame_count: 0,
        }
    }

    fn fetch_snapshot(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("fetch jpeg snapshot from {}", self.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES as u64)
            .read_to_end(&mut bytes)
            .context("read jpeg snapshot")?;
        Ok(bytes)
    }
}

impl FrameSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn open(&mut self) -> Result<()> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("connect to camera stream {}", self.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        self.stream = if content_type.contains("multipart") {
            Some(HttpStream::Mjpeg(MjpegReader::new(response.into_reader())))
        } else {
            Some(HttpStream::Snapshot)
        };
        log::info!("HttpSource: opened {} ({})", self.url, content_type);
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        let jpeg = match self.stream.as_mut() {
            Some(HttpStream::Mjpeg(reader)) => reader.next_jpeg()?,
            Some(HttpStream::Snapshot) => self.fetch_snapshot()?,
            None => return Err(anyhow!("http camera not open; call open() first")),
        };
        if jpeg.is_empty() {
            return Ok(None);
        }
        let frame = Frame::decode(&jpeg)?;
        if frame.is_empty() {
            return Ok(None);
        }
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            log::info!(
                "HttpSource: released {} after {} frames",
                self.url,
                self.frame_count
            );
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Splits an MJPEG byte stream on JPEG SOI/EOI markers.
struct MjpegReader {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegReader {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if let Some((start, end)) = jpeg_bounds(&self.buffer) {
                let jpeg = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(jpeg);
            }
            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);
            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                // Keep a possible split marker, drop the rest.
                let drain_len = self.buffer.len() - 1;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn finds_jpeg_between_multipart_headers() {
        let mut data = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        data.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        data.extend_from_slice(b"\r\n--frame");
        let (start, end) = jpeg_bounds(&data).unwrap();
        assert_eq!(&data[start..end], &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
    }

    #[test]
    fn incomplete_jpeg_has_no_bounds() {
        assert!(jpeg_bounds(&[0xFF, 0xD8, 1, 2, 3]).is_none());
        assert!(jpeg_bounds(&[1, 2, 3]).is_none());
    }

    #[test]
    fn reader_yields_consecutive_frames_then_ends() {
        let mut data = Vec::new();
        for payload in [1u8, 2u8] {
            data.extend_from_slice(b"--frame\r\n\r\n");
            data.extend_from_slice(&[0xFF, 0xD8, payload, 0xFF, 0xD9]);
        }
        let mut reader = MjpegReader::new(Box::new(Cursor::new(data)));
        assert_eq!(reader.next_jpeg().unwrap()[2], 1);
        assert_eq!(reader.next_jpeg().unwrap()[2], 2);
        assert!(reader.next_jpeg().is_err());
    }

    #[test]
    fn grab_before_open_errors() {
        let mut source = HttpSource::new("http://127.0.0.1:9/stream");
        assert!(!source.is_open());
        assert!(source.grab().is_err());
    }
}
