// # Connectivity Source Trait
//
// Defines the interface for observing the platform's online/offline signal.
//
// ## Implementations
//
// - HTTP probe: `studyroom-net-http` crate
// - Channel-backed (platform signals, tests): `SignalConnectivity` in this crate
//
// Connectivity sources are observers, not decision-makers: they report
// transitions and must not trigger sync work themselves. The engine
// mirrors their state into the published status immediately, without
// debounce.

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// A detected connectivity transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityEvent {
    /// Whether the device is now online
    pub online: bool,
    /// The previous state, if known
    pub previous: Option<bool>,
}

impl ConnectivityEvent {
    /// Create a new connectivity event
    pub fn new(online: bool, previous: Option<bool>) -> Self {
        Self { online, previous }
    }

    /// True when this event is an offline→online transition
    pub fn came_online(&self) -> bool {
        self.online && self.previous != Some(true)
    }
}

/// Trait for connectivity source implementations
///
/// Two capabilities:
/// 1. **current()**: the present online/offline state
/// 2. **watch()**: a stream of transition events
///
/// Implementations must be thread-safe and usable across async tasks.
/// The stream should emit only on actual transitions, must run
/// indefinitely under normal conditions, and must be cancellation-safe
/// (dropping the stream cleans up resources).
#[async_trait]
pub trait ConnectivitySource: Send + Sync {
    /// Get the current connectivity state without waiting for a change
    async fn current(&self) -> Result<bool, crate::Error>;

    /// Watch for connectivity transitions
    fn watch(&self) -> Pin<Box<dyn Stream<Item = ConnectivityEvent> + Send + 'static>>;
}
