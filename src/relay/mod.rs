//! The relay core: intake, pending queue, batch dispatcher and lifecycle.

pub mod dispatcher;
pub mod intake;
pub mod lifecycle;
pub mod normalizer;
pub mod queue;
