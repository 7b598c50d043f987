#![doc(html_root_url = "https://docs.rs/pubsql/latest")]
//! Client session engine for publish/subscribe SQL servers.
//!
//! This crate maintains a persistent connection to a pub/sub SQL server,
//! issues SQL-like commands, delivers synchronous query results, and routes
//! asynchronous push notifications to subscribers, safely under concurrent
//! use from a UI task and the background wire reader.

pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod preamble;
mod reader;
pub mod result;
pub mod session;
pub mod subscription;
pub mod tracker;

pub use codec::{FrameError, WireCodec};
pub use command::{Command, CommandOutcome};
pub use config::{DEFAULT_PORT, ServerAddr, SessionConfig};
pub use connection::Connection;
pub use error::{ConnectError, HandshakeError, SessionError};
pub use frame::Frame;
pub use result::{QueryResult, Row, Status};
pub use session::{Session, SessionState};
pub use subscription::{PushEvent, Subscription, SubscriptionRegistry};
pub use tracker::RequestTracker;
