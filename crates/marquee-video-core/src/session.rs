//! Playback session identity.
//!
//! A view owns exactly one active session at a time. Configuring a new URL
//! (or stopping) bumps the generation; every deferred completion (asset
//! load results, queued delegate events) carries a [`SessionTicket`] that
//! must still match the live session before it may touch shared state.
//! This is the only fencing mechanism against in-flight async work
//! outliving a reconfiguration; there are no cancellation tokens.

use std::sync::Arc;

/// Identity of one configure() call: the URL plus a generation counter.
///
/// Tickets are cheap to clone and cross thread boundaries with the work
/// they fence.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    url: Arc<str>,
    generation: u64,
}

impl SessionTicket {
    /// The URL this ticket was issued for.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The generation this ticket was issued at.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Transient per-view playback state.
#[derive(Debug, Default)]
pub struct PlaybackSession {
    /// URL of the current asset, if configured
    url: Option<Arc<str>>,
    /// Bumped on every configure() and invalidate()
    generation: u64,
    /// True while the frame pump is reading
    reading: bool,
}

impl PlaybackSession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a session for `url`, invalidating all outstanding tickets.
    pub fn begin(&mut self, url: impl Into<Arc<str>>) -> SessionTicket {
        self.generation += 1;
        self.reading = false;
        let url = url.into();
        self.url = Some(Arc::clone(&url));
        SessionTicket {
            url,
            generation: self.generation,
        }
    }

    /// Invalidates outstanding tickets without changing the URL.
    /// Used by stop(), so a load still in flight cannot resurrect playback.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.reading = false;
    }

    /// Returns a ticket for the live session, if one is configured.
    pub fn ticket(&self) -> Option<SessionTicket> {
        self.url.as_ref().map(|url| SessionTicket {
            url: Arc::clone(url),
            generation: self.generation,
        })
    }

    /// Returns true if `ticket` still identifies the live session.
    pub fn accepts(&self, ticket: &SessionTicket) -> bool {
        ticket.generation == self.generation
            && self
                .url
                .as_deref()
                .is_some_and(|url| url == ticket.url())
    }

    /// The current URL, if any.
    pub fn url(&self) -> Option<&Arc<str>> {
        self.url.as_ref()
    }

    /// The current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Marks whether the frame pump is actively reading.
    pub fn set_reading(&mut self, reading: bool) {
        self.reading = reading;
    }

    /// True while the frame pump is actively reading.
    pub fn is_reading(&self) -> bool {
        self.reading
    }
}
