//! Out-of-band control messages from the host page.

use serde::{Deserialize, Serialize};

/// Control messages a host page can send to a running worker.
///
/// The contract is closed: anything that does not parse to one of these
/// variants is ignored by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Leave the waiting phase immediately so this worker can activate
    /// without every tab closing first.
    SkipWaiting,
    /// Fetch and cache every manifest resource not already cached, making
    /// the full application available offline.
    PrimeOffline,
}

impl ControlMessage {
    /// Parse a host-page wire string.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "skipWaiting" => Some(Self::SkipWaiting),
            "downloadOffline" => Some(Self::PrimeOffline),
            _ => None,
        }
    }
}
