//! The looping video view widget.
//!
//! `VideoView` owns the whole playback stack for one asset: the session
//! identity, the background asset loader, the frame pump, the pacing
//! scheduler, and the presented texture. Hosts embed it in egui and drive
//! its lifecycle from cell appearance:
//!
//! ```ignore
//! let mut view = VideoView::new("https://example.com/clip.mp4")
//!     .with_autoplay(true)
//!     .with_looping(true);
//!
//! // In the egui update loop:
//! ui.video_view(&mut view, egui::vec2(320.0, 180.0));
//! ```
//!
//! All methods are UI-thread only. Loading and decoding happen on
//! background threads; everything that comes back is fenced by the
//! session ticket it left with.

use std::sync::Arc;
use std::time::Duration;

use egui::{Color32, Rect, Response, Sense, Ui, Vec2};
use poll_promise::Promise;

use marquee_video_core::asset::{load_asset, AssetDescriptor, LoadedAsset};
use marquee_video_core::frame_queue::FrameQueue;
use marquee_video_core::pump::{DecodeThread, PumpConfig, PumpState};
use marquee_video_core::scheduler::FrameScheduler;
use marquee_video_core::session::{PlaybackSession, SessionTicket};
use marquee_video_core::video::{VideoError, VideoState};

use crate::delegate::{DelegateEvent, DelegateQueue, VideoViewDelegate};
use crate::texture::FrameTexture;

type LoadResult = (SessionTicket, Result<LoadedAsset, VideoError>);

/// A looping, self-pacing video view.
pub struct VideoView {
    /// Identity of the current configure(); fences all async completions
    session: PlaybackSession,
    /// Current view state
    state: VideoState,
    /// Resolved asset properties, once loaded
    descriptor: Option<AssetDescriptor>,
    /// In-flight background asset load
    loader: Option<Promise<LoadResult>>,
    /// The decode thread for the current session
    pump: Option<DecodeThread>,
    /// Frames decoded ahead of presentation; replaced with each pump
    queue: Arc<FrameQueue>,
    /// Pacing clock
    scheduler: FrameScheduler,
    /// The texture being presented
    texture: FrameTexture,
    /// Delegate protocol plumbing
    delegate: DelegateQueue,
    /// Start playback as soon as the asset loads
    autoplay: bool,
    /// Loop seamlessly at end of stream
    looping: bool,
    /// start() was called before the asset finished loading
    start_pending: bool,
    /// Last error, kept for host inspection (never propagated)
    last_error: Option<VideoError>,
}

impl VideoView {
    /// Creates a view and begins loading `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let mut view = Self::empty();
        view.configure(url);
        view
    }

    /// Creates an unconfigured view.
    pub fn empty() -> Self {
        Self {
            session: PlaybackSession::new(),
            state: VideoState::Stopped,
            descriptor: None,
            loader: None,
            pump: None,
            queue: Arc::new(FrameQueue::with_default_capacity()),
            scheduler: FrameScheduler::new(),
            texture: FrameTexture::new(),
            delegate: DelegateQueue::new(),
            autoplay: false,
            looping: true,
            start_pending: false,
            last_error: None,
        }
    }

    /// Sets whether playback starts as soon as the asset loads.
    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    /// Sets whether playback loops at end of stream. Defaults to true.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Sets the delegate. Only a weak reference is kept.
    pub fn set_delegate<D: VideoViewDelegate + 'static>(&mut self, delegate: &Arc<D>) {
        self.delegate.set_delegate(delegate);
    }

    /// Removes the delegate.
    pub fn clear_delegate(&mut self) {
        self.delegate.clear_delegate();
    }

    /// Loads a new asset, invalidating the previous session.
    ///
    /// Any in-flight load or running pump for the old URL is cut loose:
    /// its completions carry a stale ticket and are discarded.
    pub fn configure(&mut self, url: impl Into<String>) {
        let url: String = url.into();
        tracing::info!("configure({})", url);
        self.pump = None; // joins the decode thread
        self.scheduler.reset();
        self.texture.clear();
        self.descriptor = None;
        self.last_error = None;
        self.start_pending = false;

        let ticket = self.session.begin(url.as_str());
        self.state = VideoState::Loading;
        self.spawn_loader(ticket);
    }

    /// Starts (or restarts) playback.
    ///
    /// If the asset is still loading, playback begins when it arrives. If
    /// the view was stopped, the asset is reloaded first.
    pub fn start(&mut self) {
        if matches!(self.state, VideoState::Ended) {
            // Replay from the beginning: the reader cannot rewind after a
            // non-looping end, so rebuild the pipeline
            self.stop();
        }
        if self.pump.is_some() {
            self.begin_playback();
            return;
        }
        self.start_pending = true;
        if self.loader.is_none() {
            if let Some(url) = self.session.url().cloned() {
                let ticket = self.session.begin(url);
                self.state = VideoState::Loading;
                self.spawn_loader(ticket);
            }
        }
    }

    /// Stops playback and tears down the decode pipeline.
    ///
    /// Pending frames are flushed; the last presented frame stays visible.
    /// In-flight loads are fenced out. A later `start()` reloads the asset.
    pub fn stop(&mut self) {
        tracing::debug!("stop()");
        self.session.invalidate();
        self.loader = None;
        self.start_pending = false;
        self.pump = None; // stops the queue, joins the decode thread
        self.scheduler.pause();
        self.session.set_reading(false);
        self.state = VideoState::Stopped;
    }

    /// Pauses playback, keeping the decode pipeline alive.
    pub fn pause(&mut self) {
        if let Some(pump) = &self.pump {
            pump.pause();
            self.scheduler.pause();
            self.session.set_reading(false);
            self.state = VideoState::Paused {
                position: self.scheduler.position(),
            };
        }
    }

    /// Resumes playback after [`pause`](VideoView::pause).
    pub fn resume(&mut self) {
        if self.pump.is_some() {
            self.begin_playback();
        }
    }

    /// Convenience for list cells: call when the cell becomes visible.
    pub fn on_appear(&mut self) {
        self.start();
    }

    /// Convenience for list cells: call when the cell scrolls away.
    pub fn on_disappear(&mut self) {
        self.stop();
    }

    /// Returns the current view state.
    pub fn state(&self) -> &VideoState {
        &self.state
    }

    /// Returns the current playback position.
    pub fn position(&self) -> Duration {
        self.scheduler.position()
    }

    /// Returns the asset duration, if known.
    pub fn duration(&self) -> Option<Duration> {
        self.descriptor
            .as_ref()
            .and_then(|d| d.metadata.duration)
            .or_else(|| self.pump.as_ref().and_then(|p| p.duration()))
    }

    /// Returns the resolved asset properties, once loaded.
    pub fn descriptor(&self) -> Option<&AssetDescriptor> {
        self.descriptor.as_ref()
    }

    /// Number of frames accepted for presentation this session.
    pub fn frames_presented(&self) -> u64 {
        self.scheduler.frames_presented()
    }

    /// Number of completed loop iterations this session.
    pub fn loops_completed(&self) -> u64 {
        self.scheduler.loops_completed()
    }

    /// The last load or playback error, if any. Errors never propagate;
    /// the view degrades to showing no video.
    pub fn last_error(&self) -> Option<&VideoError> {
        self.last_error.as_ref()
    }

    /// Renders the view and advances playback.
    pub fn show(&mut self, ui: &mut Ui, size: Vec2) -> Response {
        self.poll_loader();

        let (rect, response) = ui.allocate_exact_size(size, Sense::click());

        // Surface the preview frame as a poster before playback starts
        if self.pump.is_some()
            && self.texture.handle().is_none()
            && !self.scheduler.is_playback_requested()
        {
            if let Some(frame) = self.queue.pop() {
                let transform = self
                    .descriptor
                    .as_ref()
                    .map(|d| d.metadata.transform)
                    .unwrap_or_default();
                self.texture.upload(ui.ctx(), &frame.frame, transform);
            }
        }

        // Pull the frame that is due and upload it
        let presented_before = self.scheduler.frames_presented();
        let frame = if self.pump.is_some() {
            self.scheduler.get_next_frame(&self.queue)
        } else {
            None
        };
        if self.scheduler.frames_presented() > presented_before {
            if let Some(frame) = &frame {
                let transform = self
                    .descriptor
                    .as_ref()
                    .map(|d| d.metadata.transform)
                    .unwrap_or_default();
                self.texture.upload(ui.ctx(), &frame.frame, transform);
                if let Some(ticket) = self.session.ticket() {
                    let _ = self.delegate.sender().send(DelegateEvent::FrameRendered {
                        ticket,
                        pts: frame.pts,
                    });
                }
            }
        }

        self.update_state();

        if ui.is_rect_visible(rect) {
            ui.painter()
                .rect_filled(rect, egui::CornerRadius::ZERO, Color32::BLACK);
            if let Some(texture) = self.texture.handle() {
                let image_rect = fit_rect(rect, self.display_aspect());
                egui::Image::new(texture).paint_at(ui, image_rect);
            }
        }

        // Keep repainting while content can still change
        if self.state.is_playing() || matches!(self.state, VideoState::Loading) {
            let interval = self
                .descriptor
                .as_ref()
                .map(|d| d.metadata.frame_duration() / 2)
                .unwrap_or(Duration::from_millis(16));
            ui.ctx().request_repaint_after(interval);
        }

        self.delegate.drain(&self.session);

        response
    }

    fn spawn_loader(&mut self, ticket: SessionTicket) {
        let events = self.delegate.sender();
        let load_ticket = ticket;
        self.loader = Some(Promise::spawn_thread("asset-loader", move || {
            let result = load_asset(load_ticket.url());
            if let Ok(asset) = &result {
                if let Some(duration) = asset.descriptor.metadata.duration {
                    let _ = events.send(DelegateEvent::DurationLoaded {
                        ticket: load_ticket.clone(),
                        duration,
                    });
                }
            }
            (load_ticket, result)
        }));
    }

    fn poll_loader(&mut self) {
        let Some(promise) = self.loader.take() else {
            return;
        };
        match promise.try_take() {
            Ok((ticket, result)) => {
                if !self.session.accepts(&ticket) {
                    tracing::debug!("Discarding asset load for a stale session: {}", ticket.url());
                    return;
                }
                match result {
                    Ok(asset) => {
                        let config = PumpConfig {
                            loop_playback: self.looping,
                            range_start: asset.descriptor.time_range.start,
                        };
                        // Fresh queue per pump; the old one is stopped
                        self.queue = Arc::new(FrameQueue::with_default_capacity());
                        self.pump = Some(DecodeThread::new(
                            asset.decoder,
                            ticket.url(),
                            config,
                            Arc::clone(&self.queue),
                        ));
                        self.descriptor = Some(asset.descriptor);
                        self.state = VideoState::Ready;
                        if self.start_pending || self.autoplay {
                            self.start_pending = false;
                            self.begin_playback();
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Asset load failed for {}: {}", ticket.url(), e);
                        self.last_error = Some(e.clone());
                        self.state = VideoState::Error(e);
                    }
                }
            }
            Err(promise) => self.loader = Some(promise),
        }
    }

    fn begin_playback(&mut self) {
        let Some(pump) = &self.pump else { return };
        pump.play();
        self.scheduler.start();
        self.session.set_reading(true);
        self.state = VideoState::Playing {
            position: self.scheduler.position(),
        };
    }

    fn update_state(&mut self) {
        let Some(pump) = &self.pump else { return };
        if !self.state.is_playing() {
            return;
        }
        let ended = !self.looping
            && pump.state() == PumpState::Stopped
            && self.queue.is_eos()
            && self.queue.is_empty();
        if ended {
            tracing::debug!("Playback ended at {:?}", self.scheduler.position());
            self.scheduler.pause();
            self.session.set_reading(false);
            self.state = VideoState::Ended;
        } else {
            self.state = VideoState::Playing {
                position: self.scheduler.position(),
            };
        }
    }

    fn display_aspect(&self) -> f32 {
        if let Some(descriptor) = &self.descriptor {
            return descriptor.metadata.aspect_ratio();
        }
        if let Some(texture) = self.texture.handle() {
            let size = texture.size_vec2();
            if size.y > 0.0 {
                return size.x / size.y;
            }
        }
        16.0 / 9.0
    }
}

/// Largest rect of the given aspect ratio centered in `container`.
fn fit_rect(container: Rect, aspect: f32) -> Rect {
    let available = container.size();
    if available.x <= 0.0 || available.y <= 0.0 || !aspect.is_finite() || aspect <= 0.0 {
        return container;
    }
    let size = if available.x / aspect <= available.y {
        Vec2::new(available.x, available.x / aspect)
    } else {
        Vec2::new(available.y * aspect, available.y)
    };
    Rect::from_center_size(container.center(), size)
}

/// Extension trait to embed a [`VideoView`] like a built-in widget.
pub trait VideoViewExt {
    /// Shows the video view at the given size.
    fn video_view(&mut self, view: &mut VideoView, size: Vec2) -> Response;
}

impl VideoViewExt for Ui {
    fn video_view(&mut self, view: &mut VideoView, size: Vec2) -> Response {
        view.show(self, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_rect_letterboxes_wide_container() {
        let container = Rect::from_min_size(egui::pos2(0.0, 0.0), Vec2::new(1000.0, 200.0));
        let fitted = fit_rect(container, 16.0 / 9.0);
        assert!((fitted.height() - 200.0).abs() < 0.5);
        assert!((fitted.width() - 200.0 * 16.0 / 9.0).abs() < 0.5);
        assert_eq!(fitted.center(), container.center());
    }

    #[test]
    fn test_fit_rect_pillarboxes_tall_container() {
        let container = Rect::from_min_size(egui::pos2(0.0, 0.0), Vec2::new(200.0, 1000.0));
        let fitted = fit_rect(container, 2.0);
        assert!((fitted.width() - 200.0).abs() < 0.5);
        assert!((fitted.height() - 100.0).abs() < 0.5);
    }

    #[test]
    fn test_fit_rect_degenerate_aspect() {
        let container = Rect::from_min_size(egui::pos2(0.0, 0.0), Vec2::new(100.0, 100.0));
        assert_eq!(fit_rect(container, 0.0), container);
        assert_eq!(fit_rect(container, f32::NAN), container);
    }

    // Lifecycle tests drive the loader with the placeholder decoder, so
    // they only exist without the ffmpeg feature.
    #[cfg(not(feature = "ffmpeg"))]
    mod lifecycle {
        use super::*;
        use std::sync::Mutex;
        use std::thread;
        use std::time::Instant;

        fn wait_for_pump(view: &mut VideoView) {
            let deadline = Instant::now() + Duration::from_secs(2);
            while view.pump.is_none() && Instant::now() < deadline {
                view.poll_loader();
                thread::sleep(Duration::from_millis(5));
            }
            assert!(view.pump.is_some(), "asset load did not complete");
        }

        #[derive(Default)]
        struct RecordingDelegate {
            durations: Mutex<Vec<Duration>>,
        }

        impl VideoViewDelegate for RecordingDelegate {
            fn duration_loaded(&self, duration: Duration) {
                self.durations.lock().unwrap().push(duration);
            }

            fn frame_rendered(&self, _pts: Duration) {}
        }

        #[test]
        fn test_configure_load_start_stop() {
            let mut view = VideoView::new("placeholder://clip.mp4");
            assert!(matches!(view.state(), VideoState::Loading));

            wait_for_pump(&mut view);
            assert!(matches!(view.state(), VideoState::Ready));
            assert!(view.descriptor().is_some());

            view.start();
            assert!(view.state().is_playing());

            view.stop();
            assert!(matches!(view.state(), VideoState::Stopped));
            assert!(view.pump.is_none());
        }

        #[test]
        fn test_start_after_stop_reloads() {
            let mut view = VideoView::new("placeholder://clip.mp4");
            wait_for_pump(&mut view);
            view.stop();

            view.start();
            assert!(matches!(view.state(), VideoState::Loading));
            wait_for_pump(&mut view);
            assert!(view.state().is_playing());
        }

        #[test]
        fn test_duration_delegate_fires_once_per_load() {
            let delegate = Arc::new(RecordingDelegate::default());
            let mut view = VideoView::new("placeholder://clip.mp4");
            view.set_delegate(&delegate);

            wait_for_pump(&mut view);
            view.delegate.drain(&view.session);
            assert_eq!(delegate.durations.lock().unwrap().len(), 1);

            // Draining again delivers nothing new
            view.delegate.drain(&view.session);
            assert_eq!(delegate.durations.lock().unwrap().len(), 1);
        }

        #[test]
        fn test_reconfigure_fences_old_load() {
            let mut view = VideoView::new("placeholder://a.mp4");
            // Reconfigure immediately; the first load's ticket is stale
            view.configure("placeholder://b.mp4");
            wait_for_pump(&mut view);
            assert_eq!(
                view.descriptor().unwrap().url.as_ref(),
                "placeholder://b.mp4"
            );
        }

        #[test]
        fn test_autoplay_starts_on_load() {
            let mut view = VideoView::empty().with_autoplay(true);
            view.configure("placeholder://clip.mp4");
            wait_for_pump(&mut view);
            assert!(view.state().is_playing());
        }
    }
}
