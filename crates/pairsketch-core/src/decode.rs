//! Image payload decoding.
//!
//! Payloads travel as data URLs. Turning one into a [`Bitmap`] is treated as
//! an asynchronous, single-shot job: it is submitted to an [`ImageDecoder`]
//! and its outcome is collected later by polling, in completion order.

use crate::shapes::{Bitmap, ImageFormat};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;
use thiserror::Error;

/// Image decode errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not a data URL")]
    NotDataUrl,
    #[error("unsupported data URL encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("unrecognized image format")]
    UnknownFormat,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("bitmap decode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Identifies one submitted decode job.
pub type DecodeTicket = u64;

/// A decode request.
#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub ticket: DecodeTicket,
    pub data_url: String,
}

/// The result of a decode request, carrying the payload back.
#[derive(Debug)]
pub struct DecodeOutcome {
    pub ticket: DecodeTicket,
    pub data_url: String,
    pub result: Result<Bitmap, DecodeError>,
}

impl DecodeJob {
    /// Run the job on the current thread.
    pub fn run(self) -> DecodeOutcome {
        let result = decode_bitmap(&self.data_url);
        DecodeOutcome {
            ticket: self.ticket,
            data_url: self.data_url,
            result,
        }
    }
}

/// Wrap raw image bytes as a base64 data URL, sniffing the MIME type.
pub fn to_data_url(bytes: &[u8]) -> Result<String, DecodeError> {
    let format = ImageFormat::from_magic_bytes(bytes).ok_or(DecodeError::UnknownFormat)?;
    Ok(format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes)))
}

/// Extract the raw bytes from a base64 data URL.
pub fn parse_data_url(url: &str) -> Result<Vec<u8>, DecodeError> {
    let rest = url.trim().strip_prefix("data:").ok_or(DecodeError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(DecodeError::NotDataUrl)?;

    let mut params = header.split(';');
    let _mime = params.next();
    if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(DecodeError::UnsupportedEncoding(header.to_string()));
    }

    Ok(STANDARD.decode(payload.trim())?)
}

/// Decode a data URL into an RGBA8 bitmap.
pub fn decode_bitmap(data_url: &str) -> Result<Bitmap, DecodeError> {
    let bytes = parse_data_url(data_url)?;
    let rgba = image::load_from_memory(&bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Bitmap::new(width, height, rgba.into_raw()))
}

/// Executes decode jobs and hands back their outcomes.
pub trait ImageDecoder {
    /// Start a job. Never blocks on the decode itself for async decoders.
    fn submit(&mut self, job: DecodeJob);

    /// Collect finished jobs, in the order they completed.
    fn poll_completed(&mut self) -> Vec<DecodeOutcome>;

    /// Number of jobs submitted but not yet collected.
    fn in_flight(&self) -> usize;
}

/// Decodes each job on its own background thread.
pub struct ThreadedDecoder {
    tx: Sender<DecodeOutcome>,
    rx: Receiver<DecodeOutcome>,
    in_flight: usize,
}

impl ThreadedDecoder {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx, in_flight: 0 }
    }
}

impl Default for ThreadedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDecoder for ThreadedDecoder {
    fn submit(&mut self, job: DecodeJob) {
        let tx = self.tx.clone();
        self.in_flight += 1;
        log::debug!("Decoding image {} ({} bytes) in background", job.ticket, job.data_url.len());
        thread::spawn(move || {
            // Receiver gone means the engine was dropped; nothing to report to.
            let _ = tx.send(job.run());
        });
    }

    fn poll_completed(&mut self) -> Vec<DecodeOutcome> {
        let outcomes: Vec<_> = self.rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(outcomes.len());
        outcomes
    }

    fn in_flight(&self) -> usize {
        self.in_flight
    }
}

/// Decodes synchronously on submit; outcomes are still only released on poll.
///
/// Deterministic, which makes it the decoder of choice for tests.
#[derive(Debug, Default)]
pub struct InlineDecoder {
    ready: VecDeque<DecodeOutcome>,
}

impl InlineDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageDecoder for InlineDecoder {
    fn submit(&mut self, job: DecodeJob) {
        self.ready.push_back(job.run());
    }

    fn poll_completed(&mut self) -> Vec<DecodeOutcome> {
        self.ready.drain(..).collect()
    }

    fn in_flight(&self) -> usize {
        self.ready.len()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{ImageBuffer, ImageFormat as Format, Rgba};
    use std::io::Cursor;

    /// Encode a solid-color PNG of the given size.
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let buffer = ImageBuffer::from_pixel(width, height, Rgba([200u8, 30, 30, 255]));
        let mut bytes = Cursor::new(Vec::new());
        buffer
            .write_to(&mut bytes, Format::Png)
            .expect("png encoding");
        bytes.into_inner()
    }
}
