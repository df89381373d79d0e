pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::events;
pub use envelope::Envelope;
pub use messages::{
    AlertRequest, AuthenticateRequest, AuthenticatedPayload, RoomJoinErrorPayload,
    RoomJoinedPayload, RoomRequest, UnauthorizedPayload,
};
pub use types::RoomKind;
