// ABOUTME: Root library module exposing the console host, replay harness and logging setup
// ABOUTME: Re-exports the bridge core and engine boundary for the binary and tests

pub mod console_host;
pub mod logging;
pub mod replay;

// Re-export platform-agnostic modules from mdbridge-core
pub use mdbridge_core::config;
pub use mdbridge_core::metrics;
pub use mdbridge_core::paths;
pub use mdbridge_core::session;
pub use mdbridge_core::sniff;

// Re-export mdbridge-core traits and types
pub use mdbridge_core::traits;
pub use mdbridge_core::{ErrorSeverity, HostCallbacks, Session, SessionRegistry};

// Re-export engine types for convenience
pub use mdbridge_engine::{Jid, ProtocolClient, ProtocolEvent};
