// ABOUTME: Platform-agnostic bridge logic between the protocol engine and a chat host.
// ABOUTME: Sessions, event dispatch, caches, receipts, avatars, file sending and config.

pub mod avatar;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod media;
pub mod message_cache;
pub mod metrics;
pub mod paths;
pub mod receipts;
pub mod registry;
pub mod send_file;
pub mod session;
pub mod sniff;
pub mod testing;
pub mod traits;

pub use avatar::{
    avatar_channel, AvatarFetcher, AvatarQueue, HttpAvatarFetcher, ProfilePictureRequest,
    ProfilePictureWorker,
};
pub use config::{Config, ReceiptPolicy};
pub use dispatcher::HandleResult;
pub use error::{ErrorSeverity, RegistryError, SendError, EXIT_OK};
pub use lifecycle::{AnnounceOutcome, ConnectionLifecycle, ConnectionState, LifecycleSignal};
pub use message_cache::MessageCache;
pub use receipts::DeferredReceiptTracker;
pub use registry::SessionRegistry;
pub use session::{Session, SessionDeps};
pub use sniff::sniff_content_type;
pub use traits::{CredentialStore, DisplayMessage, HostCallbacks, StoredDevice, TypingState};
