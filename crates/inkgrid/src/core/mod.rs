//! Session orchestration, configuration and resource I/O.
//!
//! - **Session**: [`AtlasSession`](session::AtlasSession) ties the index,
//!   analysis cache, feature memo and scheduler together
//! - **Configuration**: loading and validating [`AtlasConfig`](config::AtlasConfig)
//! - **I/O**: file reading and resource path helpers

pub mod config;
pub mod io;
pub mod session;

pub use config::AtlasConfig;
pub use session::{AtlasSession, ResourceStatus, Selection};
