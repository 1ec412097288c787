//! Widget event delivery
//!
//! Each subscription owns a side connection that carries nothing but event
//! frames for one widget. Nothing is read in the background: the caller either
//! dispatches a subscription directly when its descriptor becomes readable, or
//! hands several of them to an [`EventLoop`].

use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::time::{Duration, Instant};

use polling::{Event, Events, Poller};

use crate::codec::Frame;
use crate::error::Result;
use crate::session::channel::Channel;

type Callback<'s> = Box<dyn FnMut(&[u8]) -> Result<()> + 's>;

/// Events pushed by a button or line edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    Clicked,
    /// New text of a line edit
    ValueSet(String),
    /// Anything else, passed through as text
    Raw(String),
}

impl WidgetEvent {
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        if text == "clicked" {
            WidgetEvent::Clicked
        } else if let Some(value) = text.strip_prefix("valueSet:") {
            WidgetEvent::ValueSet(value.to_string())
        } else {
            WidgetEvent::Raw(text.into_owned())
        }
    }
}

/// Side channel delivering one widget's events to a callback
pub struct EventSubscription<'s> {
    widget: String,
    channel: Channel,
    callback: Callback<'s>,
    backlog: VecDeque<Vec<u8>>,
    delivered: u64,
}

impl<'s> EventSubscription<'s> {
    pub(crate) fn new(widget: String, channel: Channel, callback: Callback<'s>) -> Self {
        Self {
            widget,
            channel,
            callback,
            backlog: VecDeque::new(),
            delivered: 0,
        }
    }

    pub fn widget(&self) -> &str {
        &self.widget
    }

    /// The remote end hung up or `close` was called
    ///
    /// Events received before the hang-up are still delivered by `dispatch`.
    pub fn is_closed(&self) -> bool {
        self.channel.transport.is_closed() && self.backlog.is_empty()
    }

    /// Total callbacks run so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Block until the side channel is readable or `timeout` elapses
    pub fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        if !self.backlog.is_empty() {
            return Ok(true);
        }
        if self.channel.transport.is_closed() {
            return Ok(false);
        }
        self.channel.transport.wait_readable(timeout)
    }

    /// Run the callback for every event that has already arrived
    ///
    /// Never blocks. Returns how many callbacks ran. If a callback fails, its
    /// error is returned and the events behind it stay queued for the next call.
    /// A stream that can no longer be framed closes the subscription.
    pub fn dispatch(&mut self) -> Result<usize> {
        if !self.channel.transport.is_closed() {
            let (frames, hung_up) = match self.channel.drain() {
                Ok(drained) => drained,
                Err(e) => {
                    tracing::warn!(
                        widget = %self.widget,
                        error = %e,
                        "closing unreadable event channel"
                    );
                    self.channel.transport.close();
                    return Err(e);
                }
            };
            for frame in frames {
                self.accept(frame);
            }
            if hung_up {
                tracing::info!(widget = %self.widget, "event channel closed by remote");
                self.channel.transport.close();
            }
        }

        let mut ran = 0;
        while let Some(payload) = self.backlog.pop_front() {
            self.delivered += 1;
            ran += 1;
            (self.callback)(&payload)?;
        }
        Ok(ran)
    }

    fn accept(&mut self, frame: Frame) {
        match frame {
            Frame::Event { key, payload } if key == self.widget => {
                self.backlog.push_back(payload);
            }
            Frame::Event { key, .. } => {
                tracing::warn!(widget = %self.widget, %key, "dropping event for another widget");
            }
            Frame::Response { id, .. } | Frame::Request { id, .. } => {
                tracing::warn!(widget = %self.widget, id, "unexpected frame on event channel");
            }
        }
    }

    fn has_backlog(&self) -> bool {
        !self.backlog.is_empty()
    }

    /// Stop receiving events
    pub fn close(&mut self) {
        self.backlog.clear();
        self.channel.transport.close();
    }
}

impl AsRawFd for EventSubscription<'_> {
    fn as_raw_fd(&self) -> RawFd {
        self.channel.transport.as_raw_fd()
    }
}

impl std::fmt::Debug for EventSubscription<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("widget", &self.widget)
            .field("closed", &self.is_closed())
            .field("delivered", &self.delivered)
            .finish()
    }
}

struct Registered<'s> {
    fd: RawFd,
    subscription: EventSubscription<'s>,
}

/// Drives several subscriptions from one thread
pub struct EventLoop<'s> {
    poller: Poller,
    entries: Vec<Option<Registered<'s>>>,
}

impl<'s> EventLoop<'s> {
    pub fn new() -> Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            entries: Vec::new(),
        })
    }

    /// Take ownership of a subscription; returns its key
    pub fn register(&mut self, subscription: EventSubscription<'s>) -> Result<usize> {
        let key = self
            .entries
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.entries.len());
        let fd = subscription.as_raw_fd();
        if !subscription.channel.transport.is_closed() {
            // SAFETY: the descriptor is deleted from the poller in `remove`
            // before the subscription (and with it the socket) is dropped.
            unsafe {
                self.poller.add(fd, Event::readable(key))?;
            }
        }

        let entry = Some(Registered { fd, subscription });
        if key == self.entries.len() {
            self.entries.push(entry);
        } else {
            self.entries[key] = entry;
        }
        tracing::debug!(key, "subscription registered");
        Ok(key)
    }

    /// Subscriptions still registered
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: usize) -> Option<&EventSubscription<'s>> {
        self.entries.get(key)?.as_ref().map(|entry| &entry.subscription)
    }

    /// Unregister a subscription and hand it back
    pub fn remove(&mut self, key: usize) -> Option<EventSubscription<'s>> {
        let entry = self.entries.get_mut(key)?.take()?;
        if !entry.subscription.channel.transport.is_closed() {
            // SAFETY: the subscription still owns the open descriptor here.
            let fd = unsafe { BorrowedFd::borrow_raw(entry.fd) };
            let _ = self.poller.delete(fd);
        }
        Some(entry.subscription)
    }

    /// Wait up to `timeout` and dispatch every subscription that became ready
    ///
    /// Subscriptions still holding queued events are dispatched without
    /// waiting. Every ready subscription is dispatched even when an earlier
    /// callback fails; the first error is returned after the pass. Returns the
    /// number of callbacks that ran. Closed subscriptions leave the loop once
    /// their queued events are delivered.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        self.sweep_closed();
        if self.is_empty() {
            return Ok(0);
        }

        let mut due: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.as_ref().is_some_and(|e| e.subscription.has_backlog()))
            .map(|(key, _)| key)
            .collect();
        let timeout = if due.is_empty() {
            timeout
        } else {
            Some(Duration::ZERO)
        };

        let mut events = Events::new();
        match self.poller.wait(&mut events, timeout) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
        for key in events.iter().map(|event| event.key) {
            if !due.contains(&key) {
                due.push(key);
            }
        }

        let mut ran = 0;
        let mut first_error = None;
        for key in due {
            let Some(Some(entry)) = self.entries.get_mut(key) else {
                continue;
            };
            let before = entry.subscription.delivered;
            let result = entry.subscription.dispatch();
            ran += (entry.subscription.delivered - before) as usize;
            if let Err(e) = result {
                tracing::debug!(key, error = %e, "dispatch failed");
                first_error.get_or_insert(e);
            }

            if entry.subscription.channel.transport.is_closed() {
                if !entry.subscription.has_backlog() {
                    self.remove(key);
                }
            } else {
                // Oneshot interest, re-arm for the next readiness
                // SAFETY: the subscription is still open and registered.
                let fd = unsafe { BorrowedFd::borrow_raw(entry.fd) };
                if let Err(e) = self.poller.modify(fd, Event::readable(key)) {
                    first_error.get_or_insert(e.into());
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(ran),
        }
    }

    // Closed with nothing queued: the poller will never report these again
    fn sweep_closed(&mut self) {
        for key in 0..self.entries.len() {
            let closed = self.entries[key]
                .as_ref()
                .is_some_and(|entry| entry.subscription.is_closed());
            if closed {
                tracing::debug!(key, "dropping closed subscription");
                self.remove(key);
            }
        }
    }

    /// Keep dispatching until `done` returns true or no subscription is left
    ///
    /// `done` is checked before every wait. `timeout` bounds the whole run;
    /// `Ok(false)` means it elapsed first.
    pub fn run_until(
        &mut self,
        timeout: Option<Duration>,
        mut done: impl FnMut() -> bool,
    ) -> Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if done() || self.is_empty() {
                return Ok(true);
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            self.run_once(remaining)?;
        }
    }
}

impl Drop for EventLoop<'_> {
    fn drop(&mut self) {
        for key in 0..self.entries.len() {
            self.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_widget_events() {
        assert_eq!(WidgetEvent::parse(b"clicked"), WidgetEvent::Clicked);
        assert_eq!(
            WidgetEvent::parse(b"valueSet:hello world"),
            WidgetEvent::ValueSet("hello world".to_string())
        );
        assert_eq!(WidgetEvent::parse(b"valueSet:"), WidgetEvent::ValueSet(String::new()));
        assert_eq!(
            WidgetEvent::parse(b"pressed"),
            WidgetEvent::Raw("pressed".to_string())
        );
    }

    #[test]
    fn test_empty_loop_returns_immediately() {
        let mut events = EventLoop::new().unwrap();
        assert!(events.is_empty());
        assert_eq!(events.run_once(Some(Duration::from_secs(5))).unwrap(), 0);
        assert!(events.run_until(None, || false).unwrap());
    }
}
