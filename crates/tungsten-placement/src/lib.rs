//! Tungsten Placement - writer-group placement engine
//!
//! Assigns unplaced writer groups to live publisher agents in their site,
//! best-effort and eventually converging: the engine never throws to its
//! caller, and the periodic sweep retries whatever did not place.

pub mod engine;
pub mod sync;

pub use engine::{PlacementEngine, WriterGroupActivator};
pub use sync::WriterGroupSync;
