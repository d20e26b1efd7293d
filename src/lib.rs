//! Core library for a multi-tenant request brokering system: the request
//! lifecycle state machine, a quota-aware broker, a crash-recoverable worker, and
//! a garbage collector, all built over pluggable store/queue/staging/data-source
//! backends.
//!
//! # Example
//! ```ignore
//! use brokercore::request::{Request, RequestData, Verb, Waiting};
//! use brokercore::user::User;
//!
//! let data = RequestData::new(
//!     User::new("alice", "ecmwf"),
//!     Verb::Retrieve,
//!     "debug",
//!     serde_json::json!({}),
//!     None,
//! );
//! let request = Request { state: Waiting {}, data };
//! ```

pub mod broker;
pub mod coercion;
pub mod collection;
pub mod config;
pub mod datasource;
pub mod error;
pub mod gc;
pub mod queue;
pub mod request;
pub mod staging;
pub mod store;
pub mod user;
pub mod worker;

pub use error::{Error, ErrorKind, Result};
