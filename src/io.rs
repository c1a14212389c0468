use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::canvas::Dimensions;
use crate::error::EditorError;

// ============================================================================
// DECODE / ENCODE
// ============================================================================

/// Decode an opaque image blob (PNG, JPEG, WEBP, BMP) to RGBA8.
pub fn decode_blob(bytes: &[u8]) -> Result<RgbaImage, EditorError> {
    let img = image::load_from_memory(bytes).map_err(|e| EditorError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

/// Encode a raster as PNG.  Used for commit output and for mask snapshots,
/// since PNG is lossless and carries its own dimensions.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EditorError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
        .map_err(|e| EditorError::Encode(e.to_string()))?;
    Ok(out)
}

/// Result of loading one blob.
pub struct LoadedImage {
    /// `None` when no blob was supplied.
    pub pixels: Option<RgbaImage>,
    /// Size of `pixels`, or [`Dimensions::PLACEHOLDER`] when there are none.
    pub dimensions: Dimensions,
}

impl LoadedImage {
    pub fn absent() -> Self {
        Self {
            pixels: None,
            dimensions: Dimensions::PLACEHOLDER,
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            dimensions: Dimensions::of(&image),
            pixels: Some(image),
        }
    }
}

// ============================================================================
// BACKGROUND LOADING
// ============================================================================

/// Spawns decodes on the rayon pool and hands back a [`PendingLoad`] the UI
/// loop polls each frame.
#[derive(Clone, Copy, Debug)]
pub struct ImageLoader {
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl ImageLoader {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Start decoding `blob`.
    ///
    /// An absent blob resolves immediately to [`LoadedImage::absent`].  The
    /// blob is moved into the worker and dropped there once decoding
    /// finishes, whether it succeeded or not.
    pub fn load(&self, blob: Option<Vec<u8>>) -> PendingLoad {
        let Some(bytes) = blob else {
            return PendingLoad::resolved(Ok(LoadedImage::absent()));
        };

        let (sender, receiver) = mpsc::channel();
        log_info!("Decoding {} byte image blob", bytes.len());
        rayon::spawn(move || {
            let result = decode_blob(&bytes);
            drop(bytes);
            // The receiver is gone if the session was closed mid-decode.
            let _ = sender.send(result);
        });

        PendingLoad {
            inner: Pending::Worker(receiver),
            started: Instant::now(),
            timeout: self.timeout,
        }
    }
}

enum Pending {
    Resolved(Result<LoadedImage, EditorError>),
    Worker(mpsc::Receiver<Result<RgbaImage, EditorError>>),
}

/// An in-flight decode.  Dropping it abandons the result.
pub struct PendingLoad {
    inner: Pending,
    started: Instant,
    timeout: Option<Duration>,
}

/// Outcome of [`PendingLoad::poll`].
pub enum LoadPoll {
    Pending(PendingLoad),
    Done(Result<LoadedImage, EditorError>),
}

impl PendingLoad {
    /// A load whose outcome is already known.
    pub fn resolved(result: Result<LoadedImage, EditorError>) -> Self {
        Self {
            inner: Pending::Resolved(result),
            started: Instant::now(),
            timeout: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Check for a result without blocking.
    pub fn poll(self) -> LoadPoll {
        let receiver = match self.inner {
            Pending::Resolved(result) => return LoadPoll::Done(result),
            Pending::Worker(receiver) => receiver,
        };

        match receiver.try_recv() {
            Ok(result) => LoadPoll::Done(result.map(LoadedImage::from_image)),
            Err(mpsc::TryRecvError::Disconnected) => {
                LoadPoll::Done(Err(EditorError::LoaderDisconnected))
            }
            Err(mpsc::TryRecvError::Empty) => {
                let waited = self.started.elapsed();
                match self.timeout {
                    Some(limit) if waited >= limit => {
                        log_warn!("Image decode abandoned after {:?}", waited);
                        LoadPoll::Done(Err(EditorError::DecodeTimeout { waited }))
                    }
                    _ => LoadPoll::Pending(PendingLoad {
                        inner: Pending::Worker(receiver),
                        started: self.started,
                        timeout: self.timeout,
                    }),
                }
            }
        }
    }

    /// Block until the decode finishes or the deadline passes.
    pub fn wait(self) -> Result<LoadedImage, EditorError> {
        let receiver = match self.inner {
            Pending::Resolved(result) => return result,
            Pending::Worker(receiver) => receiver,
        };

        let received = match self.timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(self.started.elapsed());
                receiver.recv_timeout(remaining).map_err(|e| match e {
                    mpsc::RecvTimeoutError::Timeout => EditorError::DecodeTimeout {
                        waited: self.started.elapsed(),
                    },
                    mpsc::RecvTimeoutError::Disconnected => EditorError::LoaderDisconnected,
                })
            }
            None => receiver.recv().map_err(|_| EditorError::LoaderDisconnected),
        };
        received?.map(LoadedImage::from_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn png_blob(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        encode_png(&img).unwrap()
    }

    #[test]
    fn absent_blob_resolves_to_placeholder() {
        let loaded = ImageLoader::new(None).load(None).wait().unwrap();
        assert!(loaded.pixels.is_none());
        assert!(loaded.dimensions.is_placeholder());
    }

    #[test]
    fn background_decode_reports_dimensions() {
        let pending = ImageLoader::new(Some(Duration::from_secs(10))).load(Some(png_blob(7, 3)));
        let loaded = pending.wait().unwrap();
        assert_eq!(loaded.dimensions, Dimensions::new(7, 3).unwrap());
        assert_eq!(*loaded.pixels.unwrap().get_pixel(6, 2), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn garbage_blob_is_a_decode_error() {
        let result = ImageLoader::new(None).load(Some(vec![1, 2, 3, 4])).wait();
        assert!(matches!(result, Err(EditorError::Decode(_))));
    }

    #[test]
    fn polling_eventually_completes() {
        let mut pending = ImageLoader::new(Some(Duration::from_secs(10))).load(Some(png_blob(4, 4)));
        loop {
            match pending.poll() {
                LoadPoll::Pending(p) => {
                    pending = p;
                    std::thread::sleep(Duration::from_millis(1));
                }
                LoadPoll::Done(result) => {
                    assert_eq!(result.unwrap().dimensions, Dimensions::new(4, 4).unwrap());
                    break;
                }
            }
        }
    }

    #[test]
    fn stalled_decode_times_out() {
        let (sender, receiver) = mpsc::channel();
        let pending = PendingLoad {
            inner: Pending::Worker(receiver),
            started: Instant::now() - Duration::from_secs(5),
            timeout: Some(Duration::from_secs(1)),
        };
        match pending.poll() {
            LoadPoll::Done(Err(EditorError::DecodeTimeout { waited })) => {
                assert!(waited >= Duration::from_secs(5));
            }
            _ => panic!("expected a timeout"),
        }
        drop(sender);
    }

    #[test]
    fn vanished_worker_is_reported() {
        let (sender, receiver) = mpsc::channel::<Result<RgbaImage, EditorError>>();
        drop(sender);
        let pending = PendingLoad {
            inner: Pending::Worker(receiver),
            started: Instant::now(),
            timeout: None,
        };
        assert!(matches!(
            pending.poll(),
            LoadPoll::Done(Err(EditorError::LoaderDisconnected))
        ));
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let mut img = RgbaImage::new(3, 2);
        img.put_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let back = decode_blob(&encode_png(&img).unwrap()).unwrap();
        assert_eq!(back, img);
    }
}
