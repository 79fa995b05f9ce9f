//! Helpdesk Shared Protocol Types
//!
//! This crate contains the realtime wire vocabulary shared by the end-user
//! chat widget and the agent portal: event tags, caller roles, topic naming
//! and the payload key-case conversion used on the wire.

pub mod casing;
pub mod error;
pub mod types;

pub use casing::{keys_to_camel, keys_to_snake, to_camel_case, to_snake_case};
pub use error::*;
pub use types::*;
