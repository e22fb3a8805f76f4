//! Frame scheduler: paces decoded frames against a wall-clock anchor.
//!
//! The scheduler is polled from the UI thread once per repaint. It owns the
//! pacing clock (an `Instant` anchor plus the position that anchor
//! represents) and decides, for each poll, whether the next queued frame is
//! due, stale, or so far from the clock that the clock itself must be
//! re-anchored.
//!
//! The clock only starts once the first frame is accepted; until then the
//! reported position holds still. An empty queue during playback freezes
//! the clock (stall) instead of letting position run ahead of content.

use std::time::{Duration, Instant};

use crate::frame_queue::FrameQueue;
use crate::video::VideoFrame;

/// Maximum divergence between a frame's presentation timestamp and the
/// pacing clock before the clock is re-anchored to the frame instead of
/// presenting stale content. Loop wrap-around and post-stall recovery both
/// land here.
pub const DRIFT_RESYNC_THRESHOLD: Duration = Duration::from_millis(250);

/// How far ahead of the clock a frame may be and still be presented now.
/// Absorbs timer jitter between UI repaints.
const AHEAD_TOLERANCE: Duration = Duration::from_millis(15);

/// Poll gap indicating the UI stopped repainting (window hidden, app
/// backgrounded). Queued frames are stale after a gap this long.
const RENDERING_GAP_THRESHOLD: Duration = Duration::from_secs(1);

/// How far the reported position may run past the last presented frame
/// before it is clamped (prevents runaway position during short hiccups).
const POSITION_SLACK: Duration = Duration::from_secs(1);

/// Paces frame presentation against a wall-clock anchor.
pub struct FrameScheduler {
    /// The current playback position (updated from frame PTS)
    current_position: Duration,
    /// The last frame that was presented
    current_frame: Option<VideoFrame>,
    /// Wall-clock anchor; None while the clock is not running
    playback_start_time: Option<Instant>,
    /// Position the anchor represents
    playback_start_position: Duration,
    /// True if we're waiting for the first frame after start/resume
    waiting_for_first_frame: bool,
    /// True if playback has been requested (even if still buffering)
    playback_requested: bool,
    /// True if the queue ran empty during playback
    stalled: bool,
    /// Last time get_next_frame() was called, for rendering gap detection
    last_poll: Option<Instant>,
    /// Frames accepted for presentation
    frames_presented: u64,
    /// Frames popped but superseded by a newer due frame
    frames_dropped: u64,
    /// Completed loop iterations, detected as backward PTS jumps
    loops_completed: u64,
}

impl FrameScheduler {
    /// Creates a new frame scheduler.
    pub fn new() -> Self {
        Self {
            current_position: Duration::ZERO,
            current_frame: None,
            playback_start_time: None,
            playback_start_position: Duration::ZERO,
            waiting_for_first_frame: false,
            playback_requested: false,
            stalled: false,
            last_poll: None,
            frames_presented: 0,
            frames_dropped: 0,
            loops_completed: 0,
        }
    }

    /// Starts or resumes playback.
    /// The clock doesn't actually start until the next frame is accepted.
    pub fn start(&mut self) {
        self.playback_requested = true;
        self.waiting_for_first_frame = true;
        self.stalled = false;
        self.last_poll = None;
    }

    /// Pauses playback, freezing the reported position.
    pub fn pause(&mut self) {
        self.current_position = self.position();
        self.playback_requested = false;
        self.waiting_for_first_frame = false;
        self.stalled = false;
        self.playback_start_time = None;
    }

    /// Resets all state for a new session.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Returns the current playback position.
    pub fn position(&self) -> Duration {
        // When stalled, hold the last known position so progress doesn't
        // advance while buffering.
        if self.stalled {
            return self.current_position;
        }

        let wall_clock_pos = match self.playback_start_time {
            Some(start) => self.playback_start_position + start.elapsed(),
            None => return self.current_position,
        };

        // Clamp to the last presented frame to prevent runaway position
        if let Some(ref frame) = self.current_frame {
            let max_pos = frame.pts + POSITION_SLACK;
            if wall_clock_pos > max_pos {
                return frame.pts;
            }
        }

        wall_clock_pos
    }

    /// Returns true if the pacing clock is running.
    pub fn is_playing(&self) -> bool {
        self.playback_start_time.is_some()
    }

    /// Returns true if playback has been requested (even while buffering).
    pub fn is_playback_requested(&self) -> bool {
        self.playback_requested
    }

    /// Returns true if the queue ran empty during playback.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Returns the last presented frame, if any.
    pub fn current_frame(&self) -> Option<&VideoFrame> {
        self.current_frame.as_ref()
    }

    /// Number of frames accepted for presentation.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Number of frames dropped because a newer frame was already due.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Number of completed loop iterations.
    pub fn loops_completed(&self) -> u64 {
        self.loops_completed
    }

    /// Returns the frame to present for this poll.
    ///
    /// Returns the previously presented frame when nothing new is due, so
    /// callers can unconditionally draw the result.
    pub fn get_next_frame(&mut self, queue: &FrameQueue) -> Option<VideoFrame> {
        if !self.playback_requested {
            return self.current_frame.clone();
        }

        let now = Instant::now();

        // Rendering gap: when the widget stops being polled (window hidden),
        // decoding may have continued and everything queued is stale. Drain
        // and re-anchor on the next frame so foregrounding doesn't fast-
        // forward through old content.
        if let Some(last) = self.last_poll.replace(now) {
            let gap = now.duration_since(last);
            if gap > RENDERING_GAP_THRESHOLD && !self.waiting_for_first_frame {
                let mut drained = 0;
                while queue.pop().is_some() {
                    drained += 1;
                }
                tracing::info!(
                    "Rendering gap of {}ms: drained {} stale frames, re-anchoring clock",
                    gap.as_millis(),
                    drained
                );
                self.waiting_for_first_frame = true;
            }
        }

        // First frame after start/resume/gap: accept anything to anchor
        // the clock.
        if self.waiting_for_first_frame {
            let Some(frame) = queue.pop() else {
                return self.current_frame.clone();
            };
            tracing::debug!("Clock anchored at {:?}", frame.pts);
            self.anchor(now, frame.pts);
            self.waiting_for_first_frame = false;
            self.stalled = false;
            return self.present(frame);
        }

        let Some(next_pts) = queue.peek_pts() else {
            self.enter_stall();
            return self.current_frame.clone();
        };
        self.exit_stall_if_needed(now);

        let pos = self.clock_position(now);

        // Drift policy: a frame that diverges from the clock by more than
        // the threshold re-anchors the clock to the frame's timestamp
        // instead of being presented stale (or being held for seconds).
        // A backward jump is the loop wrapping around.
        let divergence = next_pts.abs_diff(pos);
        if divergence > DRIFT_RESYNC_THRESHOLD {
            if self
                .current_frame
                .as_ref()
                .is_some_and(|current| next_pts < current.pts)
            {
                self.loops_completed += 1;
                tracing::debug!(
                    "Loop {} completed, clock rewinds {:?} -> {:?}",
                    self.loops_completed,
                    pos,
                    next_pts
                );
            } else {
                tracing::debug!(
                    "Drift {}ms exceeds threshold, resyncing clock to {:?}",
                    divergence.as_millis(),
                    next_pts
                );
            }
            let Some(frame) = queue.pop() else {
                return self.current_frame.clone();
            };
            self.anchor(now, frame.pts);
            return self.present(frame);
        }

        // Present the newest due frame, dropping older late ones.
        let mut due: Option<VideoFrame> = None;
        while let Some(pts) = queue.peek_pts() {
            if pts > pos + AHEAD_TOLERANCE {
                break;
            }
            let Some(popped) = queue.pop() else {
                break;
            };
            if let Some(superseded) = due.replace(popped) {
                self.frames_dropped += 1;
                tracing::trace!("Dropped late frame at {:?}", superseded.pts);
            }
        }

        match due {
            Some(frame) => self.present(frame),
            None => self.current_frame.clone(),
        }
    }

    /// Re-anchors the pacing clock: `position` is now.
    fn anchor(&mut self, now: Instant, position: Duration) {
        self.playback_start_time = Some(now);
        self.playback_start_position = position;
        self.current_position = position;
    }

    fn clock_position(&self, now: Instant) -> Duration {
        match self.playback_start_time {
            Some(start) => self.playback_start_position + now.duration_since(start),
            None => self.current_position,
        }
    }

    fn present(&mut self, frame: VideoFrame) -> Option<VideoFrame> {
        self.current_position = frame.pts;
        self.frames_presented += 1;
        self.current_frame = Some(frame.clone());
        Some(frame)
    }

    fn enter_stall(&mut self) {
        if !self.stalled {
            self.current_position = self.position();
            self.playback_start_time = None;
            self.stalled = true;
            tracing::debug!("Queue empty, clock frozen at {:?}", self.current_position);
        }
    }

    fn exit_stall_if_needed(&mut self, now: Instant) {
        if self.stalled {
            self.stalled = false;
            self.anchor(now, self.current_position);
            tracing::debug!("Frames available again, clock resumed");
        }
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}
