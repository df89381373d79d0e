//! Real-time connection manager.
//!
//! Owns one long-lived connection to the intelligence server: authenticates
//! it, recovers it across network failures, keeps vessel/area room
//! subscriptions consistent across reconnects, queues operations issued
//! before authentication and fans inbound push events out to local
//! handlers.

pub mod backoff;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod machine;
pub mod manager;
pub mod queue;
pub mod rooms;
pub mod scheduler;
pub mod transport;
pub mod types;
pub mod ws_transport;

pub(crate) mod pumps;
pub(crate) mod reconnection;

pub use backoff::BackoffConfig;
pub use config::{ManagerConfig, TransportConfig, default_config_path};
pub use dispatcher::{Dispatcher, Event, Handler, HandlerId};
pub use error::{ConfigError, ManagerError, TransportError};
pub use machine::Machine;
pub use manager::{ConnectionManager, Subscription};
pub use scheduler::{ManualScheduler, Scheduler, TimerKey, TimerTicket, TokioScheduler};
pub use transport::{EventCallback, Outbound, Transport, TransportEvent};
pub use types::{
    ConnectionSnapshot, ConnectionState, OperationKind, QueuedOperation, RoomKey,
    RoomSubscription,
};
pub use ws_transport::WsTransport;

pub use harborlink_protocol::RoomKind;
