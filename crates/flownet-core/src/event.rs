//! Topic-keyed event bus with pre-allocated ring buffers.
//!
//! Events are published while a tick executes (production, consumption,
//! transfer, reconciliation) and delivered in batch once the tick has fully
//! applied, so subscribers always observe consistent post-tick state. Each
//! topic has its own [`EventBuffer`] ring buffer with a configurable
//! capacity.
//!
//! # Delivery
//!
//! Subscribers on one topic run in subscription order. A subscriber that
//! returns an error is logged and skipped; it never aborts its siblings or
//! the tick.
//!
//! # Muting
//!
//! Topics can be muted via [`EventBus::mute`], which prevents any allocation
//! or recording for that topic. Muted topics have zero cost.

use crate::fixed::Fixed64;
use crate::id::{ConnectionId, NodeId, SubscriberId};
use crate::node::NodeStatus;
use crate::resource::ResourceType;
use crate::sim::SimTime;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the simulated time at which they
/// occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A production task added to the ledger, or a converter emitted output
    /// into its node buffer (`node` is set in the converter case).
    ResourceProduced {
        resource: ResourceType,
        amount: Fixed64,
        node: Option<NodeId>,
        at: SimTime,
    },
    /// A consumption task drew from the ledger, or a consumer node drained
    /// its own buffer (`node` is set in the node case).
    ResourceConsumed {
        resource: ResourceType,
        amount: Fixed64,
        node: Option<NodeId>,
        at: SimTime,
    },
    /// A connection moved resources between two node buffers.
    ResourceTransferred {
        connection: ConnectionId,
        from: NodeId,
        to: NodeId,
        resource: ResourceType,
        amount: Fixed64,
        at: SimTime,
    },
    /// Demand could not be fully served. `available` is what was actually
    /// deliverable when `required` was asked for.
    ResourceShortage {
        resource: ResourceType,
        required: Fixed64,
        available: Fixed64,
        node: Option<NodeId>,
        at: SimTime,
    },
    /// A node changed lifecycle status, or the ledger clamped.
    StatusChanged { detail: StatusDetail, at: SimTime },
}

/// What a `StatusChanged` event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusDetail {
    /// A node moved between active/depleted/paused.
    Node {
        node: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },
    /// A ledger add overflowed capacity; `overflow` was discarded.
    LedgerClamped {
        resource: ResourceType,
        overflow: Fixed64,
    },
    /// A capacity change discarded stock that no longer fit.
    CapacityReduced {
        resource: ResourceType,
        discarded: Fixed64,
    },
}

/// Discriminant tag for event topics, used for muting and subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ResourceProduced,
    ResourceConsumed,
    ResourceTransferred,
    ResourceShortage,
    StatusChanged,
}

/// Total number of event topics.
const KIND_COUNT: usize = 5;

impl EventKind {
    pub const ALL: [EventKind; KIND_COUNT] = [
        EventKind::ResourceProduced,
        EventKind::ResourceConsumed,
        EventKind::ResourceTransferred,
        EventKind::ResourceShortage,
        EventKind::StatusChanged,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl Event {
    /// Get the topic for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ResourceProduced { .. } => EventKind::ResourceProduced,
            Event::ResourceConsumed { .. } => EventKind::ResourceConsumed,
            Event::ResourceTransferred { .. } => EventKind::ResourceTransferred,
            Event::ResourceShortage { .. } => EventKind::ResourceShortage,
            Event::StatusChanged { .. } => EventKind::StatusChanged,
        }
    }

    /// Simulated time at which the event occurred.
    pub fn at(&self) -> SimTime {
        match self {
            Event::ResourceProduced { at, .. }
            | Event::ResourceConsumed { at, .. }
            | Event::ResourceTransferred { at, .. }
            | Event::ResourceShortage { at, .. }
            | Event::StatusChanged { at, .. } => *at,
        }
    }

    /// The resource the event is about, when it is about exactly one.
    /// Node status transitions carry no resource.
    pub fn resource(&self) -> Option<ResourceType> {
        match self {
            Event::ResourceProduced { resource, .. }
            | Event::ResourceConsumed { resource, .. }
            | Event::ResourceTransferred { resource, .. }
            | Event::ResourceShortage { resource, .. } => Some(*resource),
            Event::StatusChanged { detail, .. } => match detail {
                StatusDetail::Node { .. } => None,
                StatusDetail::LedgerClamped { resource, .. }
                | StatusDetail::CapacityReduced { resource, .. } => Some(*resource),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// EventBuffer -- pre-allocated ring buffer
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer for events. Fixed capacity; when full, the
/// oldest events are dropped.
#[derive(Debug)]
pub struct EventBuffer {
    /// Pre-allocated storage.
    events: Vec<Option<Event>>,
    /// Write position (wraps around).
    head: usize,
    /// Number of events currently stored (may be less than capacity).
    len: usize,
    /// Total events ever written (including dropped).
    total_written: u64,
}

impl EventBuffer {
    /// Create a new ring buffer with the given capacity.
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    /// Push an event. If full, the oldest event is dropped.
    pub fn push(&mut self, event: Event) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total events written since creation (including dropped).
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Number of events dropped because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Iterate over events in order from oldest to newest.
    pub fn iter(&self) -> EventBufferIter<'_> {
        let start = if self.len < self.capacity() {
            0
        } else {
            // head points to the next write position, which is the oldest entry
            self.head
        };
        EventBufferIter {
            buffer: self,
            index: start,
            remaining: self.len,
        }
    }

    /// Clear all events from the buffer.
    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

/// Iterator over events in an [`EventBuffer`], from oldest to newest.
pub struct EventBufferIter<'a> {
    buffer: &'a EventBuffer,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for EventBufferIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let event = self.buffer.events[self.index].as_ref();
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        event
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for EventBufferIter<'_> {}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// Result returned by a subscriber callback. An `Err` is logged and skipped.
pub type SubscriberResult = Result<(), Box<dyn std::error::Error>>;

/// A subscriber callback. Receives events read-only.
pub type EventHandler = Box<dyn FnMut(&Event) -> SubscriberResult>;

/// One subscription on a topic. Vec position is subscription order.
struct SubscriberEntry {
    id: SubscriberId,
    /// When set, only events about this resource are delivered. Events that
    /// carry no resource (node status transitions) never match a filter.
    filter: Option<ResourceType>,
    handler: EventHandler,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// The central event bus. Holds one ring buffer per topic, subscriber lists,
/// and mute flags.
pub struct EventBus {
    /// One ring buffer per topic, lazily allocated on first publish.
    buffers: [Option<EventBuffer>; KIND_COUNT],

    /// Muted topics. Muted events are never buffered.
    muted: [bool; KIND_COUNT],

    /// Subscribers indexed by topic.
    subscribers: [Vec<SubscriberEntry>; KIND_COUNT],

    /// Default buffer capacity for new event buffers.
    default_capacity: usize,

    /// Id source for subscriptions.
    next_subscriber: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("muted", &self.muted)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

const fn empty_subscriber_array() -> [Vec<SubscriberEntry>; KIND_COUNT] {
    // Cannot use Default in const context, so build it manually.
    [Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new()]
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity per topic.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            muted: [false; KIND_COUNT],
            subscribers: empty_subscriber_array(),
            default_capacity,
            next_subscriber: 0,
        }
    }

    /// Mute a topic. Muted events are never allocated or buffered.
    pub fn mute(&mut self, kind: EventKind) {
        self.muted[kind.index()] = true;
        // Drop the buffer if it exists -- zero allocation while muted.
        self.buffers[kind.index()] = None;
    }

    /// Unmute a topic. Recording resumes with the next publish.
    pub fn unmute(&mut self, kind: EventKind) {
        self.muted[kind.index()] = false;
    }

    pub fn is_muted(&self, kind: EventKind) -> bool {
        self.muted[kind.index()]
    }

    /// Publish an event into its topic buffer. No-ops when the topic is
    /// muted.
    pub fn publish(&mut self, event: Event) {
        let idx = event.kind().index();

        if self.muted[idx] {
            return;
        }

        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(self.default_capacity))
            .push(event);
    }

    /// Subscribe to a topic. Subscribers on one topic are invoked in
    /// subscription order during delivery.
    pub fn subscribe(&mut self, kind: EventKind, handler: EventHandler) -> SubscriberId {
        self.subscribe_entry(kind, None, handler)
    }

    /// Subscribe to a topic, receiving only events about one resource.
    pub fn subscribe_filtered(
        &mut self,
        kind: EventKind,
        resource: ResourceType,
        handler: EventHandler,
    ) -> SubscriberId {
        self.subscribe_entry(kind, Some(resource), handler)
    }

    fn subscribe_entry(
        &mut self,
        kind: EventKind,
        filter: Option<ResourceType>,
        handler: EventHandler,
    ) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers[kind.index()].push(SubscriberEntry {
            id,
            filter,
            handler,
        });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        for list in &mut self.subscribers {
            let before = list.len();
            list.retain(|entry| entry.id != id);
            if list.len() != before {
                return true;
            }
        }
        false
    }

    /// Deliver all buffered events to subscribers and clear the buffers.
    /// Called once the tick has fully applied. Returns the number of events
    /// drained.
    ///
    /// For each topic with buffered events, each subscriber (in subscription
    /// order) receives the events oldest-to-newest, skipping those its
    /// filter rejects. A subscriber error is logged and never aborts
    /// siblings.
    pub fn deliver(&mut self) -> usize {
        let mut drained = 0;
        for (idx, kind) in EventKind::ALL.into_iter().enumerate() {
            if self.muted[idx] {
                continue;
            }

            let Some(buffer) = self.buffers[idx].as_ref() else {
                continue;
            };
            if buffer.is_empty() {
                continue;
            }

            // Snapshot into a temporary Vec to avoid borrow conflicts
            // between the buffer and subscribers.
            let events: Vec<Event> = buffer.iter().cloned().collect();

            for entry in &mut self.subscribers[idx] {
                for event in &events {
                    if let Some(filter) = entry.filter
                        && event.resource() != Some(filter)
                    {
                        continue;
                    }
                    if let Err(err) = (entry.handler)(event) {
                        log::warn!("subscriber {:?} failed on {:?}: {err}", entry.id, kind);
                    }
                }
            }

            drained += events.len();
            if let Some(buffer) = self.buffers[idx].as_mut() {
                buffer.clear();
            }
        }
        drained
    }

    /// Read-only view of a topic's buffer.
    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    /// Events currently buffered for a topic.
    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Total events ever published to a topic (including dropped).
    pub fn total_published(&self, kind: EventKind) -> u64 {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.total_written())
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers[kind.index()].len()
    }

    /// Clear all buffers. Does not touch subscriptions or mute flags.
    pub fn clear_all(&mut self) {
        for buffer in &mut self.buffers {
            if let Some(b) = buffer.as_mut() {
                b.clear();
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
