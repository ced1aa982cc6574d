use futures::Stream;
use image::{
    RgbImage,
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
};
use std::{
    io::Cursor,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Holds the most recent square-cropped camera frame for live streaming.
///
/// Writers replace the frame, readers clone the `Arc` under the lock and
/// encode outside of it.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    latest: Mutex<Option<Arc<RgbImage>>>,
}

impl FrameBuffer {
    /// JPEG quality used for the MJPEG stream.
    pub const STREAM_QUALITY: u8 = 85;
    /// Polling interval while no frame has been published yet.
    const EMPTY_POLL: Duration = Duration::from_millis(100);
    const BOUNDARY: &'static str = "frame";

    pub fn new() -> Self { Self::default() }

    fn lock_latest(&self) -> MutexGuard<'_, Option<Arc<RgbImage>>> {
        self.latest.lock().expect("[FATAL] Mutex poisoned: Failed to acquire frame lock")
    }

    pub fn publish(&self, frame: Arc<RgbImage>) { *self.lock_latest() = Some(frame); }

    pub fn latest(&self) -> Option<Arc<RgbImage>> { self.lock_latest().clone() }

    pub fn clear(&self) { *self.lock_latest() = None; }

    /// Encodes the latest frame as a single `multipart/x-mixed-replace` part.
    ///
    /// # Returns
    /// `Ok(None)` while no frame exists.
    ///
    /// # Errors
    /// Returns an error if the JPEG encoding fails.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Option<Vec<u8>>, image::ImageError> {
        let Some(frame) = self.latest() else { return Ok(None) };
        let mut writer = Cursor::new(Vec::<u8>::new());
        frame.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))?;
        let jpeg = writer.into_inner();

        let mut part = Vec::with_capacity(jpeg.len() + 64);
        part.extend_from_slice(format!("--{}\r\n", Self::BOUNDARY).as_bytes());
        part.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        part.extend_from_slice(&jpeg);
        part.extend_from_slice(b"\r\n");
        Ok(Some(part))
    }

    /// Exports the latest frame as a PNG snapshot.
    ///
    /// # Errors
    /// Returns an error if the PNG encoding fails.
    pub fn snapshot_png(&self) -> Result<Option<Vec<u8>>, image::ImageError> {
        let Some(frame) = self.latest() else { return Ok(None) };
        let mut writer = Cursor::new(Vec::<u8>::new());
        frame.write_with_encoder(PngEncoder::new(&mut writer))?;
        Ok(Some(writer.into_inner()))
    }

    /// Content type matching the parts produced by [`FrameBuffer::encode_jpeg`].
    pub fn content_type() -> String {
        format!("multipart/x-mixed-replace; boundary={}", Self::BOUNDARY)
    }

    /// Stream of MJPEG parts, one per `interval`, ending once `c_tok` is cancelled.
    pub fn mjpeg_stream(
        self: Arc<Self>,
        interval: Duration,
        c_tok: CancellationToken,
    ) -> impl Stream<Item = Vec<u8>> + Send + 'static {
        futures::stream::unfold((self, c_tok), move |(buffer, c_tok)| async move {
            loop {
                if c_tok.is_cancelled() {
                    return None;
                }
                match buffer.encode_jpeg(Self::STREAM_QUALITY) {
                    Ok(Some(part)) => {
                        tokio::time::sleep(interval).await;
                        return Some((part, (buffer, c_tok)));
                    }
                    Ok(None) => tokio::time::sleep(Self::EMPTY_POLL).await,
                    Err(e) => {
                        crate::warn!("Skipping stream frame, JPEG encoding failed: {e}");
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        })
    }
}
