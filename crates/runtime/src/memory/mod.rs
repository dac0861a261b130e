//! Reference in-memory host adapter.
//!
//! Items are reference-counted records; several [`MemoryItem`] handles may
//! alias one record and share its stable id. [`MemoryAccessor`] supports
//! per-operation fault injection so failure paths can be driven
//! deterministically. Used by the crate's tests and handy for embedders
//! prototyping against the engine before writing a real adapter.

mod accessor;
mod item;
mod population;

pub use accessor::{AccessOp, MemoryAccessor};
pub use item::{ItemRecord, MemoryItem};
pub use population::{MemoryContainers, MemoryPopulation};
