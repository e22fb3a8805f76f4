//! Frame pump: the decode thread and its state machine.
//!
//! The pump owns the decoder backend on a dedicated background thread and
//! fills the frame queue, so the UI thread never blocks on decode work.
//! It is driven by commands (Play/Pause/Stop) and advances through
//! `Idle → Reading → Looping → Reading | Stopped`:
//!
//! - On end of stream with looping enabled, the reader is seeked back to
//!   the start of the asset's time range and reading resumes. The wrapped
//!   timestamps make the scheduler re-anchor its pacing clock.
//! - On a decoder failure the pump tears the decoder down and attempts a
//!   full restart by reopening the URL, a bounded number of times. When
//!   restarts are exhausted it signals end of stream and stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::frame_queue::FrameQueue;
use crate::video::VideoDecoderBackend;

/// Full-restart attempts after a decoder failure before giving up.
const RESTART_ATTEMPTS: u32 = 3;

/// Delay between restart attempts.
const RESTART_BACKOFF: Duration = Duration::from_millis(250);

/// Preview-frame decode attempts before giving up (remote sources may need
/// a moment to produce the first frame).
const PREVIEW_ATTEMPTS: u32 = 5;

/// State of the frame pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Created or paused; not consuming the decoder
    Idle,
    /// Actively decoding and enqueueing frames
    Reading,
    /// Resetting the reader to the start of the time range
    Looping,
    /// Terminal: end of stream without looping, restart exhaustion, or stop
    Stopped,
}

/// Commands sent to the decode thread.
#[derive(Debug, Clone, Copy)]
pub enum PumpCommand {
    /// Start or resume decoding
    Play,
    /// Pause decoding, keeping the decoder alive
    Pause,
    /// Terminate the decode thread
    Stop,
}

/// Pump configuration fixed for the lifetime of one session.
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    /// Whether to loop at end of stream
    pub loop_playback: bool,
    /// Start of the asset's valid time range; loop resets seek here
    pub range_start: Duration,
}

/// Shared cells the decode thread publishes for the UI thread to read.
struct PumpShared {
    state: Mutex<PumpState>,
    duration: Mutex<Option<Duration>>,
    dimensions: Mutex<Option<(u32, u32)>>,
    frame_rate: Mutex<Option<f32>>,
}

/// A video decode thread that fills a frame queue.
pub struct DecodeThread {
    /// Handle to the decode thread
    handle: Option<JoinHandle<()>>,
    /// Channel to send commands to the decode thread
    command_tx: crossbeam_channel::Sender<PumpCommand>,
    /// The frame queue being filled
    frame_queue: Arc<FrameQueue>,
    /// Flag to signal the thread should stop
    stop_flag: Arc<AtomicBool>,
    /// Metadata and state published by the decode thread
    shared: Arc<PumpShared>,
}

impl DecodeThread {
    /// Creates and starts a new decode thread.
    ///
    /// The thread starts paused; send [`PumpCommand::Play`] via [`play`]
    /// to begin reading. One preview frame is decoded immediately so a
    /// poster is available before playback starts.
    ///
    /// [`play`]: DecodeThread::play
    pub fn new<D: VideoDecoderBackend + 'static>(
        decoder: D,
        url: impl Into<String>,
        config: PumpConfig,
        frame_queue: Arc<FrameQueue>,
    ) -> Self {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(PumpShared {
            state: Mutex::new(PumpState::Idle),
            duration: Mutex::new(None),
            dimensions: Mutex::new(None),
            frame_rate: Mutex::new(None),
        });

        let queue = Arc::clone(&frame_queue);
        let stop = Arc::clone(&stop_flag);
        let thread_shared = Arc::clone(&shared);
        let url = url.into();

        let handle = thread::Builder::new()
            .name("frame-pump".into())
            .spawn(move || {
                decode_loop(decoder, url, config, queue, command_rx, stop, thread_shared);
            })
            .expect("failed to spawn frame pump thread");

        Self {
            handle: Some(handle),
            command_tx,
            frame_queue,
            stop_flag,
            shared,
        }
    }

    /// Starts or resumes decoding.
    pub fn play(&self) {
        let _ = self.command_tx.send(PumpCommand::Play);
    }

    /// Pauses decoding.
    pub fn pause(&self) {
        let _ = self.command_tx.send(PumpCommand::Pause);
    }

    /// Stops the decode thread.
    ///
    /// The frame queue is stopped first to wake any blocked push() call,
    /// preventing deadlock during shutdown.
    pub fn stop(&self) {
        self.frame_queue.stop();
        self.stop_flag.store(true, Ordering::Release);
        let _ = self.command_tx.send(PumpCommand::Stop);
    }

    /// Returns a reference to the frame queue.
    pub fn frame_queue(&self) -> &Arc<FrameQueue> {
        &self.frame_queue
    }

    /// Returns the current pump state.
    pub fn state(&self) -> PumpState {
        *self.shared.state.lock()
    }

    /// Returns the duration published by the decode thread.
    pub fn duration(&self) -> Option<Duration> {
        *self.shared.duration.lock()
    }

    /// Returns the dimensions published by the decode thread.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        *self.shared.dimensions.lock()
    }

    /// Returns the frame rate published by the decode thread.
    pub fn frame_rate(&self) -> Option<f32> {
        *self.shared.frame_rate.lock()
    }
}

impl Drop for DecodeThread {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Result of processing a pump command.
enum CommandOutcome {
    /// Continue processing, optionally updating the playing flag
    Continue(Option<bool>),
    /// Stop the decode loop
    Stop,
}

fn process_command(cmd: PumpCommand, frame_queue: &FrameQueue) -> CommandOutcome {
    match cmd {
        PumpCommand::Stop => CommandOutcome::Stop,
        PumpCommand::Play => {
            frame_queue.clear_eos();
            CommandOutcome::Continue(Some(true))
        }
        PumpCommand::Pause => CommandOutcome::Continue(Some(false)),
    }
}

/// The main decode loop running on the pump thread.
fn decode_loop<D: VideoDecoderBackend>(
    mut decoder: D,
    url: String,
    config: PumpConfig,
    frame_queue: Arc<FrameQueue>,
    command_rx: crossbeam_channel::Receiver<PumpCommand>,
    stop_flag: Arc<AtomicBool>,
    shared: Arc<PumpShared>,
) {
    publish_metadata(&decoder, &shared);

    // Decode one frame ahead of the Play command so a poster frame is
    // visible as soon as the asset loads.
    for attempt in 0..PREVIEW_ATTEMPTS {
        if stop_flag.load(Ordering::Acquire) {
            *shared.state.lock() = PumpState::Stopped;
            return;
        }
        match decoder.decode_next() {
            Ok(Some(frame)) => {
                tracing::debug!("Decoded preview frame at {:?}", frame.pts);
                let _ = frame_queue.try_push(frame);
                break;
            }
            Ok(None) => {
                if attempt + 1 < PREVIEW_ATTEMPTS {
                    thread::sleep(Duration::from_millis(50));
                }
            }
            Err(e) => {
                tracing::warn!("Failed to decode preview frame: {}", e);
                break;
            }
        }
    }

    let mut playing = false;

    loop {
        if stop_flag.load(Ordering::Acquire) {
            break;
        }

        // Process commands (non-blocking)
        let mut should_stop = false;
        while let Ok(cmd) = command_rx.try_recv() {
            match process_command(cmd, &frame_queue) {
                CommandOutcome::Stop => should_stop = true,
                CommandOutcome::Continue(Some(new_playing)) => playing = new_playing,
                CommandOutcome::Continue(None) => {}
            }
        }
        if should_stop {
            break;
        }

        // When paused, block on the channel instead of spinning
        if !playing {
            if *shared.state.lock() != PumpState::Stopped {
                *shared.state.lock() = PumpState::Idle;
            }
            match command_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(cmd) => match process_command(cmd, &frame_queue) {
                    CommandOutcome::Stop => break,
                    CommandOutcome::Continue(Some(new_playing)) => playing = new_playing,
                    CommandOutcome::Continue(None) => {}
                },
                Err(_) => continue,
            }
            continue;
        }

        *shared.state.lock() = PumpState::Reading;

        // Don't decode if the queue is full
        if frame_queue.is_full() {
            thread::sleep(Duration::from_millis(5));
            continue;
        }

        match decoder.decode_next() {
            Ok(Some(frame)) => {
                if !frame_queue.push(frame) && frame_queue.is_stopped() {
                    break;
                }
            }
            Ok(None) if decoder.is_eof() => {
                if config.loop_playback {
                    *shared.state.lock() = PumpState::Looping;
                    match decoder.seek(config.range_start) {
                        Ok(()) => {
                            tracing::debug!(
                                "End of stream, reader reset to {:?}",
                                config.range_start
                            );
                            frame_queue.clear_eos();
                        }
                        Err(e) => {
                            tracing::warn!("Loop reset failed: {}", e);
                            match attempt_restart::<D>(&url, &config, &stop_flag) {
                                Some(reopened) => {
                                    decoder = reopened;
                                    frame_queue.flush();
                                }
                                None => {
                                    frame_queue.set_eos();
                                    break;
                                }
                            }
                        }
                    }
                } else {
                    tracing::debug!("End of stream");
                    frame_queue.set_eos();
                    playing = false;
                    *shared.state.lock() = PumpState::Stopped;
                }
            }
            Ok(None) => {
                // Decoder briefly starved (network source); retry shortly
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => {
                tracing::error!("Decode failed: {}", e);
                match attempt_restart::<D>(&url, &config, &stop_flag) {
                    Some(reopened) => {
                        decoder = reopened;
                        publish_metadata(&decoder, &shared);
                        frame_queue.flush();
                    }
                    None => {
                        frame_queue.set_eos();
                        break;
                    }
                }
            }
        }
    }

    *shared.state.lock() = PumpState::Stopped;
}

fn publish_metadata<D: VideoDecoderBackend>(decoder: &D, shared: &PumpShared) {
    let meta = decoder.metadata();
    *shared.duration.lock() = meta.duration;
    if meta.width > 0 && meta.height > 0 {
        *shared.dimensions.lock() = Some((meta.width, meta.height));
    }
    if meta.frame_rate > 0.0 {
        *shared.frame_rate.lock() = Some(meta.frame_rate);
    }
}

/// Attempts a full restart by reopening the URL.
///
/// Returns the reopened decoder, seeked to the range start, or None when
/// attempts are exhausted or the pump was asked to stop meanwhile.
fn attempt_restart<D: VideoDecoderBackend>(
    url: &str,
    config: &PumpConfig,
    stop_flag: &AtomicBool,
) -> Option<D> {
    for attempt in 1..=RESTART_ATTEMPTS {
        if stop_flag.load(Ordering::Acquire) {
            return None;
        }
        thread::sleep(RESTART_BACKOFF);
        match D::open(url) {
            Ok(mut decoder) => {
                tracing::info!("Restart attempt {} succeeded for {}", attempt, url);
                if config.range_start > Duration::ZERO {
                    if let Err(e) = decoder.seek(config.range_start) {
                        tracing::warn!("Seek after restart failed: {}", e);
                    }
                }
                return Some(decoder);
            }
            Err(e) => {
                tracing::warn!("Restart attempt {}/{} failed: {}", attempt, RESTART_ATTEMPTS, e);
            }
        }
    }
    tracing::error!("Giving up on {} after {} restart attempts", url, RESTART_ATTEMPTS);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_command_clears_eos() {
        let queue = FrameQueue::with_default_capacity();
        queue.set_eos();
        match process_command(PumpCommand::Play, &queue) {
            CommandOutcome::Continue(Some(true)) => {}
            _ => panic!("Play should continue with playing=true"),
        }
        assert!(!queue.is_eos());
    }

    #[test]
    fn test_pause_and_stop_commands() {
        let queue = FrameQueue::with_default_capacity();
        assert!(matches!(
            process_command(PumpCommand::Pause, &queue),
            CommandOutcome::Continue(Some(false))
        ));
        assert!(matches!(
            process_command(PumpCommand::Stop, &queue),
            CommandOutcome::Stop
        ));
    }
}
