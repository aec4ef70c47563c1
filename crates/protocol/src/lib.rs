//! Shared protocol types for stackboard
//!
//! Defines the entity shapes, ordering helpers and the tagged event
//! messages exchanged between the host and its clients.

pub mod codec;
pub mod messages;
pub mod model;
pub mod ordering;

pub use codec::*;
pub use messages::*;
pub use model::*;
pub use ordering::*;
