//! batfish - Client for the Batfish network configuration analysis service.
//!
//! This crate submits analysis questions to a Batfish coordinator as
//! asynchronous work items, polls them to a terminal state, and deserializes
//! the resulting answers into typed table rows.
//!
//! The pieces compose in one direction: a [`session::Session`] instantiates a
//! [`question::Question`] from a template, the question validates its
//! parameter values, the work layer submits and polls a [`work::WorkItem`],
//! and the answer layer turns the raw payload into a
//! [`answer::TableAnswer`] whose cells are converted through the schema
//! registry in [`schema`].

pub mod acl;
pub mod answer;
pub mod error;
pub mod facts;
pub mod flow;
pub mod primitives;
pub mod question;
pub mod route;
pub mod schema;
pub mod session;
pub mod trace;
pub mod transport;
pub mod work;

pub use error::{Error, Result};
pub use session::Session;

/// Version string sent with every request to the coordinator.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default coordinator host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default port for the original work-manager service.
pub const DEFAULT_PORT_V1: u16 = 9997;

/// Default port for the v2 JSON API.
pub const DEFAULT_PORT_V2: u16 = 9996;

/// Service base path for the work-manager endpoints.
pub const SERVICE_BASE_V1: &str = "/batfishservice";

/// Service base path for the v2 JSON API.
pub const SERVICE_BASE_V2: &str = "/v2";
