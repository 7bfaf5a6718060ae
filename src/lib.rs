//! Client-side session authentication coordinator.
//!
//! Owns one tab's credential lifecycle: sign-in, stamping outgoing requests,
//! recovering from authorization failures with a single-flight refresh and
//! one retry, validating persisted sessions on startup, and propagating
//! logout to every other tab. [`SessionManager`] wires it all together.

pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod error;
pub mod guard;
pub mod profile;
pub mod refresh;
pub mod request;
pub mod session;
pub mod state;
pub mod storage;
pub mod token;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use bootstrap::{Navigation, RouteGuard, RouteTable, SessionBootstrap};
pub use channel::{LogoutChannel, LogoutNotice, Navigator, TabSignal};
pub use config::{RefreshMode, SessionConfig};
pub use error::{AuthError, RefreshFailure};
pub use profile::Profile;
pub use request::{ApiRequest, TrackedRequest};
pub use session::{SessionManager, SignInRequest};
pub use state::{RefreshPhase, SessionContext, SessionSnapshot};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{ApiResponse, HttpTransport, Transport};
