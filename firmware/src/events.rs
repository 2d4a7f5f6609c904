//! Event queue between interrupt-priority producers and the supervisor.
//!
//! Sensor and link tasks run on the interrupt executor and only ever post
//! [`HubEvent`]s here. The supervisor drains the queue from thread mode
//! through [`QueuedEvents`]. Poll ticks are coalesced so a busy program can
//! never fill the queue with them.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use supervisor_core::hub::{EventSource, HubEvent};

/// Depth of the event queue.
pub const EVENT_QUEUE_DEPTH: usize = 32;

#[cfg(target_os = "none")]
type EventMutex = CriticalSectionRawMutex;
#[cfg(not(target_os = "none"))]
type EventMutex = NoopRawMutex;

/// Channel carrying hub events to the supervisor.
pub type EventQueue = Channel<EventMutex, HubEvent, EVENT_QUEUE_DEPTH>;

/// Producer handle used by interrupt-priority tasks.
pub type EventSender<'a> = Sender<'a, EventMutex, HubEvent, EVENT_QUEUE_DEPTH>;

/// Consumer handle owned by the supervisor.
pub type EventReceiver<'a> = Receiver<'a, EventMutex, HubEvent, EVENT_QUEUE_DEPTH>;

/// Set while a poll tick sits in the queue.
static TICK_PENDING: AtomicBool = AtomicBool::new(false);
/// Events dropped because the queue was full.
static DROPPED: AtomicU32 = AtomicU32::new(0);

/// Posts `event` without waiting. Returns `false` when the queue was full.
pub fn post(sender: &EventSender<'_>, event: HubEvent) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            DROPPED.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}

/// Posts a poll tick unless one is already queued.
pub fn post_tick(sender: &EventSender<'_>) {
    if TICK_PENDING.swap(true, Ordering::AcqRel) {
        return;
    }
    if !post(sender, HubEvent::PollTimer) {
        TICK_PENDING.store(false, Ordering::Release);
    }
}

/// Number of events dropped since boot.
pub fn dropped() -> u32 {
    DROPPED.load(Ordering::Relaxed)
}

/// [`EventSource`] over the receiving end of the queue.
pub struct QueuedEvents<'a> {
    receiver: EventReceiver<'a>,
}

impl<'a> QueuedEvents<'a> {
    pub fn new(receiver: EventReceiver<'a>) -> Self {
        Self { receiver }
    }
}

impl EventSource for QueuedEvents<'_> {
    fn poll_event(&mut self) -> Option<HubEvent> {
        let event = self.receiver.try_receive().ok()?;
        if event == HubEvent::PollTimer {
            TICK_PENDING.store(false, Ordering::Release);
        }
        Some(event)
    }
}
