//! Frame pump integration tests.
//!
//! These drive the decode thread with scripted decoder backends and verify
//! the loop state machine end to end: seamless looping at end of stream,
//! end-of-stream signaling when looping is disabled, and the full-restart
//! path after a decoder failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use marquee_video_core::frame_queue::FrameQueue;
use marquee_video_core::pump::{DecodeThread, PumpConfig, PumpState};
use marquee_video_core::video::{
    CpuFrame, VideoDecoderBackend, VideoError, VideoFrame, VideoMetadata, VideoTransform,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(40);
const SCRIPT_FRAMES: u32 = 5;

fn scripted_metadata() -> VideoMetadata {
    VideoMetadata {
        width: 4,
        height: 4,
        duration: Some(FRAME_INTERVAL * SCRIPT_FRAMES),
        frame_rate: 25.0,
        codec: "scripted".to_string(),
        pixel_aspect_ratio: 1.0,
        start_time: None,
        transform: VideoTransform::Identity,
    }
}

fn scripted_frame(index: u32) -> VideoFrame {
    VideoFrame::new(
        FRAME_INTERVAL * index,
        CpuFrame::new(4, 4, vec![index as u8; 64]),
    )
}

/// Decodes a fixed number of frames, then reports EOF. Seeking rewinds.
struct ScriptedDecoder {
    index: u32,
    metadata: VideoMetadata,
    eof: bool,
}

impl ScriptedDecoder {
    fn new() -> Self {
        Self {
            index: 0,
            metadata: scripted_metadata(),
            eof: false,
        }
    }
}

impl VideoDecoderBackend for ScriptedDecoder {
    fn open(_url: &str) -> Result<Self, VideoError> {
        Ok(Self::new())
    }

    fn decode_next(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        if self.index >= SCRIPT_FRAMES {
            self.eof = true;
            return Ok(None);
        }
        let frame = scripted_frame(self.index);
        self.index += 1;
        Ok(Some(frame))
    }

    fn seek(&mut self, position: Duration) -> Result<(), VideoError> {
        self.index = (position.as_millis() / FRAME_INTERVAL.as_millis()) as u32;
        self.eof = false;
        Ok(())
    }

    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

/// Fails mid-stream exactly once per process, then behaves like
/// [`ScriptedDecoder`] on every reopen.
static FLAKY_RECOVERED: AtomicBool = AtomicBool::new(false);

struct FlakyDecoder {
    inner: ScriptedDecoder,
}

impl VideoDecoderBackend for FlakyDecoder {
    fn open(_url: &str) -> Result<Self, VideoError> {
        Ok(Self {
            inner: ScriptedDecoder::new(),
        })
    }

    fn decode_next(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        if !FLAKY_RECOVERED.load(Ordering::Acquire) && self.inner.index == 2 {
            FLAKY_RECOVERED.store(true, Ordering::Release);
            return Err(VideoError::DecodeFailed("injected failure".to_string()));
        }
        self.inner.decode_next()
    }

    fn seek(&mut self, position: Duration) -> Result<(), VideoError> {
        self.inner.seek(position)
    }

    fn metadata(&self) -> &VideoMetadata {
        self.inner.metadata()
    }

    fn is_eof(&self) -> bool {
        self.inner.is_eof()
    }
}

/// Pops `count` frames from the queue, polling until `deadline`.
fn collect_frames(queue: &FrameQueue, count: usize, deadline: Duration) -> Vec<VideoFrame> {
    let start = Instant::now();
    let mut frames = Vec::with_capacity(count);
    while frames.len() < count && start.elapsed() < deadline {
        match queue.pop() {
            Some(frame) => frames.push(frame),
            None => thread::sleep(Duration::from_millis(5)),
        }
    }
    frames
}

#[test]
fn test_looping_wraps_timestamps_back_to_range_start() {
    let queue = Arc::new(FrameQueue::with_default_capacity());
    let pump = DecodeThread::new(
        ScriptedDecoder::new(),
        "scripted://loop",
        PumpConfig {
            loop_playback: true,
            range_start: Duration::ZERO,
        },
        Arc::clone(&queue),
    );
    pump.play();

    let frames = collect_frames(&queue, 12, Duration::from_secs(3));
    assert_eq!(frames.len(), 12, "pump should keep producing across loops");

    // First pass plays straight through
    for (i, frame) in frames.iter().take(SCRIPT_FRAMES as usize).enumerate() {
        assert_eq!(frame.pts, FRAME_INTERVAL * i as u32);
    }
    // The next frame wrapped back to the start of the time range
    assert_eq!(frames[SCRIPT_FRAMES as usize].pts, Duration::ZERO);
    assert!(!queue.is_eos(), "looping playback must not signal EOS");
}

#[test]
fn test_non_looping_signals_eos_and_stops() {
    let queue = Arc::new(FrameQueue::with_default_capacity());
    let pump = DecodeThread::new(
        ScriptedDecoder::new(),
        "scripted://once",
        PumpConfig {
            loop_playback: false,
            range_start: Duration::ZERO,
        },
        Arc::clone(&queue),
    );
    pump.play();

    let frames = collect_frames(&queue, SCRIPT_FRAMES as usize, Duration::from_secs(2));
    assert_eq!(frames.len(), SCRIPT_FRAMES as usize);

    // Queue drains, then EOS arrives and the pump parks itself
    let deadline = Instant::now() + Duration::from_secs(2);
    while !(queue.is_eos() && pump.state() == PumpState::Stopped) {
        assert!(Instant::now() < deadline, "pump did not reach EOS/Stopped");
        thread::sleep(Duration::from_millis(10));
    }
    assert!(queue.pop().is_none());
}

#[test]
fn test_decoder_failure_triggers_full_restart() {
    let queue = Arc::new(FrameQueue::with_default_capacity());
    let pump = DecodeThread::new(
        FlakyDecoder {
            inner: ScriptedDecoder::new(),
        },
        "scripted://flaky",
        PumpConfig {
            loop_playback: true,
            range_start: Duration::ZERO,
        },
        Arc::clone(&queue),
    );
    pump.play();

    // The decoder dies after two frames; the pump reopens the URL and
    // keeps going. Count frames across the failure.
    let frames = collect_frames(&queue, 8, Duration::from_secs(5));
    assert_eq!(frames.len(), 8, "pump should recover via restart");
    assert!(!queue.is_eos());
}

#[test]
fn test_pump_publishes_metadata() {
    let queue = Arc::new(FrameQueue::with_default_capacity());
    let pump = DecodeThread::new(
        ScriptedDecoder::new(),
        "scripted://meta",
        PumpConfig {
            loop_playback: true,
            range_start: Duration::ZERO,
        },
        Arc::clone(&queue),
    );

    let deadline = Instant::now() + Duration::from_secs(1);
    while pump.duration().is_none() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(pump.duration(), Some(FRAME_INTERVAL * SCRIPT_FRAMES));
    assert_eq!(pump.dimensions(), Some((4, 4)));
    assert_eq!(pump.frame_rate(), Some(25.0));
}
