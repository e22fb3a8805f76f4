//! Asset loading.
//!
//! Resolves a URL into an [`AssetDescriptor`] (duration, dimensions,
//! preferred transform, valid time range) plus an opened decoder, so
//! playback can start without a second open. Intended to run on a
//! background thread; the caller polls for the result and fences it with
//! a session ticket.

use std::sync::Arc;
use std::time::Duration;

use crate::decoder::FfmpegDecoder;
use crate::video::{VideoDecoderBackend, VideoError, VideoMetadata};

/// The valid time range of an asset.
///
/// Streams may start at a nonzero timestamp; loop resets seek to `start`,
/// not zero.
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    /// First presentation timestamp of the stream
    pub start: Duration,
    /// Length of the range (None for live/unknown)
    pub duration: Option<Duration>,
}

impl TimeRange {
    /// Returns the end of the range if the duration is known.
    pub fn end(&self) -> Option<Duration> {
        self.duration.map(|d| self.start + d)
    }
}

/// Resolved properties of a URL-backed asset.
#[derive(Debug, Clone)]
pub struct AssetDescriptor {
    /// The URL the asset was loaded from
    pub url: Arc<str>,
    /// Stream metadata (dimensions, duration, frame rate, transform)
    pub metadata: VideoMetadata,
    /// Valid time range of the video track
    pub time_range: TimeRange,
}

/// A loaded asset: its descriptor and the decoder opened for it.
pub struct LoadedAsset {
    /// Resolved asset properties
    pub descriptor: AssetDescriptor,
    /// Decoder positioned at the start of the stream
    pub decoder: FfmpegDecoder,
}

/// Loads the asset at `url`.
///
/// Opens the container, selects the best video track, and gathers
/// duration, dimensions, frame rate, codec, preferred transform, and the
/// valid time range. Fails with [`VideoError::NotPlayable`] when the
/// source has no video track. Blocking; run it on a loader thread.
pub fn load_asset(url: &str) -> Result<LoadedAsset, VideoError> {
    tracing::debug!("Loading asset {}", url);
    let decoder = FfmpegDecoder::new(url)?;
    let metadata = decoder.metadata().clone();
    let time_range = TimeRange {
        start: metadata.start_time.unwrap_or(Duration::ZERO),
        duration: metadata.duration,
    };

    tracing::info!(
        "Asset loaded: {} ({}x{}, range {:?}..{:?})",
        url,
        metadata.width,
        metadata.height,
        time_range.start,
        time_range.end()
    );

    Ok(LoadedAsset {
        descriptor: AssetDescriptor {
            url: Arc::from(url),
            metadata,
            time_range,
        },
        decoder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_end() {
        let range = TimeRange {
            start: Duration::from_secs(1),
            duration: Some(Duration::from_secs(10)),
        };
        assert_eq!(range.end(), Some(Duration::from_secs(11)));

        let live = TimeRange {
            start: Duration::ZERO,
            duration: None,
        };
        assert_eq!(live.end(), None);
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_load_asset_placeholder() {
        let asset = load_asset("https://example.com/clip.mp4").unwrap();
        assert_eq!(asset.descriptor.url.as_ref(), "https://example.com/clip.mp4");
        assert_eq!(asset.descriptor.time_range.start, Duration::ZERO);
        assert!(asset.descriptor.metadata.duration.is_some());
    }
}
