//! Core playback types and the decoder backend trait.
//!
//! Everything in this module is independent of the GUI layer and of the
//! concrete decoder: frames, metadata, playback state, and the
//! [`VideoDecoderBackend`] seam that the frame pump drives.

use std::time::Duration;

/// Represents the current state of a video view.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoState {
    /// Asset is being loaded/probed on a background thread
    Loading,
    /// Asset loaded, playback not yet started
    Ready,
    /// Actively playing
    Playing {
        /// Current playback position
        position: Duration,
    },
    /// Paused, keeping the decode pipeline alive
    Paused {
        /// Position when paused
        position: Duration,
    },
    /// Stopped; the decode pipeline has been torn down
    Stopped,
    /// Playback reached end of stream with looping disabled
    Ended,
    /// Asset load or playback failed
    Error(VideoError),
}

impl VideoState {
    /// Returns the current position if available.
    pub fn position(&self) -> Option<Duration> {
        match self {
            VideoState::Playing { position } => Some(*position),
            VideoState::Paused { position } => Some(*position),
            _ => None,
        }
    }

    /// Returns true if video is currently playing.
    pub fn is_playing(&self) -> bool {
        matches!(self, VideoState::Playing { .. })
    }

    /// Returns true if playback can be (re)started from this state.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            VideoState::Ready | VideoState::Paused { .. } | VideoState::Stopped | VideoState::Ended
        )
    }
}

/// Errors that can occur while loading or playing a video.
///
/// These never cross the public widget surface; the view logs them and
/// degrades to showing no video.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoError {
    /// Failed to open the video source
    OpenFailed(String),
    /// The source opened but contains no playable video track
    NotPlayable(String),
    /// Decoder initialization failed
    DecoderInit(String),
    /// Frame decoding error
    DecodeFailed(String),
    /// Seek operation failed (loop reset)
    SeekFailed(String),
}

impl std::fmt::Display for VideoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoError::OpenFailed(msg) => write!(f, "Failed to open video: {msg}"),
            VideoError::NotPlayable(url) => write!(f, "No playable video track in {url}"),
            VideoError::DecoderInit(msg) => write!(f, "Decoder initialization failed: {msg}"),
            VideoError::DecodeFailed(msg) => write!(f, "Frame decode failed: {msg}"),
            VideoError::SeekFailed(msg) => write!(f, "Seek failed: {msg}"),
        }
    }
}

impl std::error::Error for VideoError {}

/// Preferred display transform of a video stream.
///
/// Containers record the rotation the player must apply at presentation
/// time (for example phone footage shot in portrait). The decoder reports
/// it; the presentation layer applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoTransform {
    /// No rotation
    #[default]
    Identity,
    /// Rotate 90 degrees clockwise
    Rotate90,
    /// Rotate 180 degrees
    Rotate180,
    /// Rotate 270 degrees clockwise
    Rotate270,
}

impl VideoTransform {
    /// Maps a rotation in degrees (as stored in stream metadata) to a
    /// transform. Values are normalized; anything that is not a multiple
    /// of 90 falls back to identity.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => VideoTransform::Rotate90,
            180 => VideoTransform::Rotate180,
            270 => VideoTransform::Rotate270,
            _ => VideoTransform::Identity,
        }
    }

    /// Returns true if applying this transform swaps width and height.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, VideoTransform::Rotate90 | VideoTransform::Rotate270)
    }

    /// Returns the dimensions after applying this transform.
    pub fn apply(&self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

/// A decoded video frame with CPU-accessible RGBA pixel data.
///
/// Rows are tightly packed (stride == width * 4).
#[derive(Debug, Clone)]
pub struct CpuFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// RGBA8 pixel data, `width * height * 4` bytes
    pub data: Vec<u8>,
}

impl CpuFrame {
    /// Creates a new frame from tightly packed RGBA data.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            data,
        }
    }
}

/// A decoded video frame with presentation timestamp.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Presentation timestamp (when this frame should be displayed)
    pub pts: Duration,
    /// The decoded pixel data
    pub frame: CpuFrame,
}

impl VideoFrame {
    /// Creates a new VideoFrame.
    pub fn new(pts: Duration, frame: CpuFrame) -> Self {
        Self { pts, frame }
    }

    /// Returns the frame dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }
}

/// Metadata about a video stream.
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    /// Video width in pixels (before applying the transform)
    pub width: u32,
    /// Video height in pixels (before applying the transform)
    pub height: u32,
    /// Duration of the video (if known)
    pub duration: Option<Duration>,
    /// Frame rate (frames per second)
    pub frame_rate: f32,
    /// Codec name
    pub codec: String,
    /// Pixel aspect ratio (1.0 for square pixels)
    pub pixel_aspect_ratio: f32,
    /// Start time of the video stream (first PTS)
    pub start_time: Option<Duration>,
    /// Preferred display transform recorded in the container
    pub transform: VideoTransform,
}

impl VideoMetadata {
    /// Returns the display aspect ratio, accounting for the preferred
    /// transform and non-square pixels.
    pub fn aspect_ratio(&self) -> f32 {
        let (w, h) = self.transform.apply(self.width, self.height);
        if h == 0 {
            return 1.0;
        }
        (w as f32 / h as f32) * self.pixel_aspect_ratio
    }

    /// Returns the frame duration based on frame rate.
    pub fn frame_duration(&self) -> Duration {
        if self.frame_rate <= 0.0 || !self.frame_rate.is_finite() {
            return Duration::from_millis(33); // Default to ~30fps
        }
        Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }
}

/// Trait for video decoder backends.
///
/// This is the seam between the frame pump and the concrete decoder. The
/// pump owns the backend on its own thread and is the only caller, so
/// implementations need `Send` but not `Sync`.
pub trait VideoDecoderBackend: Send {
    /// Opens a video from a URL or file path.
    ///
    /// Also used by the pump to rebuild the decoder when a full restart
    /// is attempted after a decode failure.
    fn open(url: &str) -> Result<Self, VideoError>
    where
        Self: Sized;

    /// Decodes and returns the next video frame, or None if no more frames
    /// are available right now.
    fn decode_next(&mut self) -> Result<Option<VideoFrame>, VideoError>;

    /// Seeks to a specific position. The pump uses this to reset the
    /// reader to the start of the time range when looping.
    fn seek(&mut self, position: Duration) -> Result<(), VideoError>;

    /// Returns the video metadata.
    fn metadata(&self) -> &VideoMetadata;

    /// Returns the total duration if known.
    fn duration(&self) -> Option<Duration> {
        self.metadata().duration
    }

    /// Returns the video dimensions.
    fn dimensions(&self) -> (u32, u32) {
        let meta = self.metadata();
        (meta.width, meta.height)
    }

    /// Returns true if the decoder has reached end of stream.
    ///
    /// More reliable than counting None results from decode_next(), which
    /// can also mean the decoder is briefly starved.
    fn is_eof(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_state_position() {
        let playing = VideoState::Playing {
            position: Duration::from_secs(10),
        };
        assert_eq!(playing.position(), Some(Duration::from_secs(10)));

        let loading = VideoState::Loading;
        assert_eq!(loading.position(), None);
        assert!(!loading.can_start());
        assert!(VideoState::Stopped.can_start());
    }

    #[test]
    fn test_transform_from_degrees() {
        assert_eq!(VideoTransform::from_degrees(0), VideoTransform::Identity);
        assert_eq!(VideoTransform::from_degrees(90), VideoTransform::Rotate90);
        assert_eq!(VideoTransform::from_degrees(-90), VideoTransform::Rotate270);
        assert_eq!(VideoTransform::from_degrees(450), VideoTransform::Rotate90);
        // Non-quarter rotations are not representable
        assert_eq!(VideoTransform::from_degrees(45), VideoTransform::Identity);
    }

    #[test]
    fn test_transform_dimensions() {
        assert_eq!(VideoTransform::Rotate90.apply(1920, 1080), (1080, 1920));
        assert_eq!(VideoTransform::Rotate180.apply(1920, 1080), (1920, 1080));
    }

    #[test]
    fn test_metadata_aspect_ratio() {
        let mut meta = VideoMetadata {
            width: 1920,
            height: 1080,
            duration: Some(Duration::from_secs(120)),
            frame_rate: 30.0,
            codec: "h264".to_string(),
            pixel_aspect_ratio: 1.0,
            start_time: None,
            transform: VideoTransform::Identity,
        };
        assert!((meta.aspect_ratio() - 1.777).abs() < 0.01);

        // Portrait footage: the transform flips the display aspect
        meta.transform = VideoTransform::Rotate90;
        assert!((meta.aspect_ratio() - 0.5625).abs() < 0.01);
    }

    #[test]
    fn test_frame_duration_fallback() {
        let meta = VideoMetadata {
            width: 640,
            height: 360,
            duration: None,
            frame_rate: 0.0,
            codec: "unknown".to_string(),
            pixel_aspect_ratio: 1.0,
            start_time: None,
            transform: VideoTransform::Identity,
        };
        assert_eq!(meta.frame_duration(), Duration::from_millis(33));
    }

    #[test]
    fn test_error_display() {
        let err = VideoError::NotPlayable("file.mp4".to_string());
        assert_eq!(err.to_string(), "No playable video track in file.mp4");
    }
}
