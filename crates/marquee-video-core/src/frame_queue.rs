//! Bounded queue of decoded frames.
//!
//! The queue decouples the decode thread (producer) from the UI thread
//! (consumer). The producer blocks when the queue is full so decoding
//! never runs ahead of presentation by more than a few frames; the
//! consumer polls and never blocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::video::VideoFrame;

/// Default number of frames to buffer ahead.
const DEFAULT_BUFFER_SIZE: usize = 5;

/// A thread-safe queue of decoded video frames.
pub struct FrameQueue {
    /// The decoded frames ready for display
    frames: Arc<Mutex<VecDeque<VideoFrame>>>,
    /// Maximum number of frames to buffer
    capacity: usize,
    /// Condition variable for signaling when space is available
    space_available: Arc<Condvar>,
    /// Flag indicating the queue is being flushed
    flushing: Arc<AtomicBool>,
    /// Flag indicating end of stream reached
    eos: Arc<AtomicBool>,
    /// Flag indicating the queue has been stopped (for shutdown)
    stopped: Arc<AtomicBool>,
}

impl FrameQueue {
    /// Creates a new frame queue with the specified capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            space_available: Arc::new(Condvar::new()),
            flushing: Arc::new(AtomicBool::new(false)),
            eos: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a new frame queue with the default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }

    /// Pushes a frame onto the queue.
    ///
    /// Blocks while the queue is full. Returns false if the queue is being
    /// flushed or stopped, in which case the frame should be discarded.
    pub fn push(&self, frame: VideoFrame) -> bool {
        let mut frames = self.frames.lock();

        while frames.len() >= self.capacity {
            // Check both flushing and stopped to avoid deadlock on shutdown
            if self.flushing.load(Ordering::Acquire) || self.stopped.load(Ordering::Acquire) {
                return false;
            }
            self.space_available.wait(&mut frames);
        }

        // Check again after waiting
        if self.flushing.load(Ordering::Acquire) || self.stopped.load(Ordering::Acquire) {
            return false;
        }

        frames.push_back(frame);
        true
    }

    /// Pushes a frame without blocking.
    ///
    /// Returns false if the queue is full, being flushed, or stopped.
    pub fn try_push(&self, frame: VideoFrame) -> bool {
        if self.flushing.load(Ordering::Acquire) || self.stopped.load(Ordering::Acquire) {
            return false;
        }

        let mut frames = self.frames.lock();
        if frames.len() >= self.capacity {
            return false;
        }

        frames.push_back(frame);
        true
    }

    /// Takes the next frame from the queue, if any.
    pub fn pop(&self) -> Option<VideoFrame> {
        let mut frames = self.frames.lock();
        let frame = frames.pop_front();
        if frame.is_some() {
            self.space_available.notify_one();
        }
        frame
    }

    /// Returns the presentation timestamp of the next frame without
    /// removing it.
    pub fn peek_pts(&self) -> Option<Duration> {
        let frames = self.frames.lock();
        frames.front().map(|f| f.pts)
    }

    /// Returns the number of frames currently in the queue.
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the queue is full.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Clears all queued frames.
    ///
    /// The ordering is intentional:
    /// 1. Set flushing=true - blocks producers from pushing new frames
    /// 2. Clear the queue
    /// 3. Clear eos=false - reset end-of-stream state
    /// 4. Clear flushing=false - allow producers to push again
    ///
    /// Producers check flushing before pushing, so by the time a push can
    /// succeed again the eos reset is already visible.
    pub fn flush(&self) {
        self.flushing.store(true, Ordering::Release);

        // Wake up any blocked producers
        self.space_available.notify_all();

        let dropped_count = {
            let mut frames = self.frames.lock();
            let count = frames.len();
            frames.clear();
            count
        };

        if dropped_count > 0 {
            tracing::debug!("FrameQueue::flush: dropped {} frames", dropped_count);
        }

        self.eos.store(false, Ordering::Release);
        self.flushing.store(false, Ordering::Release);
    }

    /// Marks that end-of-stream has been reached.
    pub fn set_eos(&self) {
        self.eos.store(true, Ordering::Release);
    }

    /// Returns true if end-of-stream has been reached.
    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::Acquire)
    }

    /// Resets the end-of-stream flag (loop reset).
    pub fn clear_eos(&self) {
        self.eos.store(false, Ordering::Release);
    }

    /// Stops the queue, waking any blocked producers.
    ///
    /// Called during shutdown so the decode thread doesn't deadlock while
    /// waiting for space in push().
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.space_available.notify_all();
    }

    /// Returns true if the queue has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::CpuFrame;
    use std::thread;

    fn frame(pts_ms: u64) -> VideoFrame {
        VideoFrame::new(
            Duration::from_millis(pts_ms),
            CpuFrame::new(2, 2, vec![0u8; 16]),
        )
    }

    #[test]
    fn test_push_pop_order() {
        let queue = FrameQueue::new(3);
        assert!(queue.try_push(frame(0)));
        assert!(queue.try_push(frame(33)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek_pts(), Some(Duration::from_millis(0)));

        let first = queue.pop().unwrap();
        assert_eq!(first.pts, Duration::from_millis(0));
        assert_eq!(queue.peek_pts(), Some(Duration::from_millis(33)));
    }

    #[test]
    fn test_try_push_full() {
        let queue = FrameQueue::new(2);
        assert!(queue.try_push(frame(0)));
        assert!(queue.try_push(frame(1)));
        assert!(!queue.try_push(frame(2)));
        assert!(queue.is_full());
    }

    #[test]
    fn test_flush_clears_frames_and_eos() {
        let queue = FrameQueue::new(3);
        queue.try_push(frame(0));
        queue.set_eos();
        queue.flush();
        assert!(queue.is_empty());
        assert!(!queue.is_eos());
    }

    #[test]
    fn test_stop_wakes_blocked_producer() {
        let queue = Arc::new(FrameQueue::new(1));
        queue.try_push(frame(0));

        let producer_queue = Arc::clone(&queue);
        let producer = thread::spawn(move || producer_queue.push(frame(1)));

        // Give the producer time to block on the full queue
        thread::sleep(Duration::from_millis(50));
        queue.stop();

        // The blocked push must return false instead of deadlocking
        assert!(!producer.join().unwrap());
    }

    #[test]
    fn test_pop_makes_space() {
        let queue = Arc::new(FrameQueue::new(1));
        queue.try_push(frame(0));

        let producer_queue = Arc::clone(&queue);
        let producer = thread::spawn(move || producer_queue.push(frame(1)));

        thread::sleep(Duration::from_millis(50));
        assert!(queue.pop().is_some());

        assert!(producer.join().unwrap());
        assert_eq!(queue.peek_pts(), Some(Duration::from_millis(1)));
    }
}
