//! Event types for Farfield
//!
//! Events are emitted from each listener's audio callback through a bounded
//! channel and polled from the control thread via
//! [`FarfieldWorld::poll_events`](crate::world::FarfieldWorld::poll_events).
//! The audio side never blocks on a full channel; overflow is dropped.

use crate::call::CallId;
use crate::world::ListenerId;

/// Capacity of the world event channel. Emission past this between two polls
/// drops the newest events.
pub(crate) const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FarfieldEvent {
    /// A queued call was merged into a listener's active set.
    CallStarted { listener: ListenerId, call: CallId },
    /// A one-shot call played past the end of its store and retired.
    CallCompleted { listener: ListenerId, call: CallId },
    /// A looping call wrapped; `loop_count` is the total completed so far.
    CallLooped {
        listener: ListenerId,
        call: CallId,
        loop_count: u32,
    },
    /// A call was removed by a stop request.
    CallStopped { listener: ListenerId, call: CallId },
    /// The host buffer length changed; both pipeline buffers were reallocated
    /// and that callback went out silent.
    BufferResized { listener: ListenerId, frames: usize },
    /// The previous render was still in flight, so the last completed buffer
    /// was replayed instead of dispatching a new one.
    RenderOverrun { listener: ListenerId },
}

impl FarfieldEvent {
    /// The listener lane this event came from.
    pub fn listener(&self) -> ListenerId {
        match self {
            Self::CallStarted { listener, .. }
            | Self::CallCompleted { listener, .. }
            | Self::CallLooped { listener, .. }
            | Self::CallStopped { listener, .. }
            | Self::BufferResized { listener, .. }
            | Self::RenderOverrun { listener } => *listener,
        }
    }

    pub fn call(&self) -> Option<CallId> {
        match self {
            Self::CallStarted { call, .. }
            | Self::CallCompleted { call, .. }
            | Self::CallLooped { call, .. }
            | Self::CallStopped { call, .. } => Some(*call),
            _ => None,
        }
    }

    pub fn is_call_event(&self) -> bool {
        self.call().is_some()
    }
}
