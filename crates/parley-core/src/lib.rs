pub mod archive;
pub mod errors;
pub mod events;
pub mod ids;
pub mod protocol;
pub mod session;
pub mod verify;

pub use archive::{ArchiveStore, MessageRecord, Rating, SessionSummary};
pub use errors::ChatError;
pub use events::{ChatEvent, EndReason};
pub use ids::{SessionId, UserId};
pub use protocol::{ClientFrame, ServerFrame};
pub use session::Session;
pub use verify::IdentityVerifier;
