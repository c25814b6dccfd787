//! Event types for SonicWeave

use crate::playback::HandleId;
use crossbeam_channel::{Sender, TrySendError};

/// Events emitted by a device's mixing loop, collected with
/// [`Device::poll_events`](crate::Device::poll_events).
#[derive(Debug, Clone, PartialEq)]
pub enum SonicWeaveEvent {
    /// The mixer picked up a newly played handle.
    HandleStarted { handle: HandleId },
    /// The handle's reader ran out of samples.
    HandleFinished { handle: HandleId },
    /// The handle was stopped explicitly and has been removed from the mix.
    HandleStopped { handle: HandleId },
    /// The output stream reported an error. The mixing loop keeps running.
    StreamError { error: String },
    DeviceClosed,
}

impl SonicWeaveEvent {
    pub fn handle_id(&self) -> Option<HandleId> {
        match self {
            Self::HandleStarted { handle }
            | Self::HandleFinished { handle }
            | Self::HandleStopped { handle } => Some(*handle),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::StreamError { .. })
    }

    /// True for events that retire a handle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::HandleFinished { .. } | Self::HandleStopped { .. }
        )
    }
}

/// Queue `event` without blocking. A full queue drops the event with a
/// warning; a disconnected one means nobody is polling. Returns whether the
/// event was queued.
pub(crate) fn send_event(events: &Sender<SonicWeaveEvent>, event: SonicWeaveEvent) -> bool {
    match events.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            log::warn!("Event queue full, dropping {:?}", event);
            false
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}
