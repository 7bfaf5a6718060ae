//! Cross-tab logout propagation.
//!
//! ARCHITECTURE
//! ============
//! Every tab holds a clone of one `LogoutChannel`. The tab that logs out
//! resets its own state synchronously and then publishes a `TabSignal`; each
//! tab runs a listener task that resets local state and navigates to the
//! unauthenticated landing page when a signal arrives. The signal carries
//! nothing beyond "logout happened at `at`".
//!
//! On the channel each signal travels in a `LogoutNotice` naming the tab
//! that sent it. A listener skips notices from its own tab: that tab already
//! reset itself, and a late reset could wipe a session signed in since.
//!
//! TRADE-OFFS
//! ==========
//! A lagging receiver may miss signals. Since the only signal is logout, a
//! lag is handled as a logout rather than ignored.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::state::SessionContext;

const CHANNEL_CAPACITY: usize = 16;

/// Wire schema: `{"type":"logout","at":<unix millis>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TabSignal {
    Logout { at: u64 },
}

/// A signal plus the tab that published it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutNotice {
    pub origin: Uuid,
    pub signal: TabSignal,
}

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> u64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// CHANNEL
// =============================================================================

#[derive(Clone)]
pub struct LogoutChannel {
    tx: broadcast::Sender<LogoutNotice>,
}

impl Default for LogoutChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LogoutChannel {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a logout marker from tab `origin`, stamped with the current time.
    pub fn broadcast_logout(&self, origin: Uuid) -> TabSignal {
        let signal = TabSignal::Logout { at: now_ms() };
        // No subscribers just means no other tab is open.
        let receivers = self.tx.send(LogoutNotice { origin, signal }).unwrap_or(0);
        tracing::info!(%origin, receivers, "logout broadcast");
        signal
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogoutNotice> {
        self.tx.subscribe()
    }
}

// =============================================================================
// LISTENER
// =============================================================================

/// UI navigation collaborator.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Spawn the task that applies other tabs' logout signals to tab `tab_id`.
pub fn spawn_logout_listener(
    ctx: SessionContext,
    mut rx: broadcast::Receiver<LogoutNotice>,
    navigator: Arc<dyn Navigator>,
    landing_path: String,
    tab_id: Uuid,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notice) if notice.origin == tab_id => continue,
                Ok(LogoutNotice { origin, signal: TabSignal::Logout { at } }) => {
                    tracing::info!(%origin, at, "logout signal received");
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "logout listener lagged; treating as logout");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
            ctx.reset();
            navigator.navigate(&landing_path);
        }
    })
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod tests;
