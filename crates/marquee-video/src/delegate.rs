//! Delegate protocol and UI-thread event delivery.
//!
//! The view notifies a weakly referenced observer of two things: the asset
//! duration (once per successful load) and each presented frame's
//! timestamp. Events may originate on background threads (the asset
//! loader), so they are queued and drained in `show()`; delegate methods
//! are therefore always invoked on the UI thread. Every event carries the
//! session ticket it was produced under and is discarded if the session
//! has moved on.

use std::sync::{Arc, Weak};
use std::time::Duration;

use marquee_video_core::session::{PlaybackSession, SessionTicket};

/// Observer of playback progress.
///
/// Implementations are held weakly; dropping the observer silently stops
/// notifications.
pub trait VideoViewDelegate: Send + Sync {
    /// The asset's duration became known. Fires once per successful load.
    fn duration_loaded(&self, duration: Duration);

    /// A frame was accepted for presentation.
    fn frame_rendered(&self, pts: Duration);
}

/// A delegate notification, tagged with the session it belongs to.
pub(crate) enum DelegateEvent {
    DurationLoaded {
        ticket: SessionTicket,
        duration: Duration,
    },
    FrameRendered {
        ticket: SessionTicket,
        pts: Duration,
    },
}

impl DelegateEvent {
    fn ticket(&self) -> &SessionTicket {
        match self {
            DelegateEvent::DurationLoaded { ticket, .. } => ticket,
            DelegateEvent::FrameRendered { ticket, .. } => ticket,
        }
    }
}

/// Queues delegate events from any thread and dispatches them on the UI
/// thread, fenced by session identity.
pub(crate) struct DelegateQueue {
    tx: crossbeam_channel::Sender<DelegateEvent>,
    rx: crossbeam_channel::Receiver<DelegateEvent>,
    delegate: Option<Weak<dyn VideoViewDelegate>>,
}

impl DelegateQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            delegate: None,
        }
    }

    /// Sets the observer. Only a weak reference is kept.
    pub fn set_delegate<D: VideoViewDelegate + 'static>(&mut self, delegate: &Arc<D>) {
        let delegate: Arc<dyn VideoViewDelegate> = delegate.clone();
        let weak: Weak<dyn VideoViewDelegate> = Arc::downgrade(&delegate);
        self.delegate = Some(weak);
    }

    /// Removes the observer.
    pub fn clear_delegate(&mut self) {
        self.delegate = None;
    }

    /// Returns a sender for producing events from any thread.
    pub fn sender(&self) -> crossbeam_channel::Sender<DelegateEvent> {
        self.tx.clone()
    }

    /// Dispatches all queued events that still belong to the live session.
    /// Must be called from the UI thread.
    pub fn drain(&self, session: &PlaybackSession) {
        while let Ok(event) = self.rx.try_recv() {
            if !session.accepts(event.ticket()) {
                tracing::trace!(
                    "Dropping delegate event for stale session (generation {})",
                    event.ticket().generation()
                );
                continue;
            }
            let Some(delegate) = self.delegate.as_ref().and_then(Weak::upgrade) else {
                continue;
            };
            match event {
                DelegateEvent::DurationLoaded { duration, .. } => {
                    delegate.duration_loaded(duration);
                }
                DelegateEvent::FrameRendered { pts, .. } => {
                    delegate.frame_rendered(pts);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDelegate {
        durations: Mutex<Vec<Duration>>,
        frames: Mutex<Vec<Duration>>,
    }

    impl VideoViewDelegate for RecordingDelegate {
        fn duration_loaded(&self, duration: Duration) {
            self.durations.lock().unwrap().push(duration);
        }

        fn frame_rendered(&self, pts: Duration) {
            self.frames.lock().unwrap().push(pts);
        }
    }

    #[test]
    fn test_events_for_live_session_are_delivered() {
        let mut session = PlaybackSession::new();
        let ticket = session.begin("a.mp4");

        let delegate = Arc::new(RecordingDelegate::default());
        let mut queue = DelegateQueue::new();
        queue.set_delegate(&delegate);

        let tx = queue.sender();
        tx.send(DelegateEvent::DurationLoaded {
            ticket: ticket.clone(),
            duration: Duration::from_secs(10),
        })
        .unwrap();
        tx.send(DelegateEvent::FrameRendered {
            ticket,
            pts: Duration::from_millis(33),
        })
        .unwrap();

        queue.drain(&session);
        assert_eq!(*delegate.durations.lock().unwrap(), vec![Duration::from_secs(10)]);
        assert_eq!(*delegate.frames.lock().unwrap(), vec![Duration::from_millis(33)]);
    }

    #[test]
    fn test_stale_session_events_are_dropped() {
        let mut session = PlaybackSession::new();
        let stale = session.begin("a.mp4");
        session.begin("b.mp4");

        let delegate = Arc::new(RecordingDelegate::default());
        let mut queue = DelegateQueue::new();
        queue.set_delegate(&delegate);

        queue
            .sender()
            .send(DelegateEvent::DurationLoaded {
                ticket: stale,
                duration: Duration::from_secs(10),
            })
            .unwrap();

        queue.drain(&session);
        assert!(delegate.durations.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_delegate_is_ignored() {
        let mut session = PlaybackSession::new();
        let ticket = session.begin("a.mp4");

        let mut queue = DelegateQueue::new();
        {
            let delegate = Arc::new(RecordingDelegate::default());
            queue.set_delegate(&delegate);
            // delegate dropped here
        }

        queue
            .sender()
            .send(DelegateEvent::FrameRendered {
                ticket,
                pts: Duration::ZERO,
            })
            .unwrap();

        // Must not panic; the weak reference is simply dead
        queue.drain(&session);
    }
}
