//! Discord event source: gateway client, frame shapes and channel cache.

pub mod directory;
pub mod gateway;
pub mod protocol;
