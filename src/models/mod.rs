//! Domain model module declarations.

pub mod batch;
pub mod message;
pub mod record;
