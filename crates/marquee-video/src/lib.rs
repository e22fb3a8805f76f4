//! marquee-video: a looping, self-pacing video view widget for egui.
//!
//! The widget loads a video asset from a URL, decodes frames on a
//! background thread, paces their presentation against a wall-clock
//! anchor, loops seamlessly at end of stream, and reports duration and
//! per-frame progress to a delegate:
//!
//! - [`VideoView`] - the widget itself (`configure`/`start`/`stop`/`show`)
//! - [`VideoViewExt`] - `ui.video_view(&mut view, size)` sugar
//! - [`VideoViewDelegate`] - duration/frame-progress observer
//!
//! Decoding uses FFmpeg when the `ffmpeg` feature is enabled; without it
//! a test-pattern decoder keeps the whole pipeline runnable for UI work.
//! The GUI-free machinery (decoder seam, frame pump, pacing scheduler)
//! lives in `marquee-video-core`.

pub mod delegate;
mod texture;
pub mod view;

pub use delegate::VideoViewDelegate;
pub use view::{VideoView, VideoViewExt};

// Re-export the core types hosts interact with
pub use marquee_video_core::asset::{AssetDescriptor, TimeRange};
pub use marquee_video_core::video::{VideoError, VideoMetadata, VideoState, VideoTransform};
