//! Data model and host contracts for the item persistence engine.
//!
//! `item-core` holds everything that does not schedule work: the dirty-kind
//! flags, the [`ItemAccessor`] capability a host implements per entity type,
//! frozen [`ItemSnapshot`]s, the persisted [`ItemMeta`] record, payload
//! encoding helpers and the engine configuration. The `item-runtime` crate
//! builds the scheduler, event sources and transactions on top of these types.
pub mod accessor;
pub mod checksum;
pub mod config;
pub mod dirty;
pub mod error;
pub mod meta;
pub mod snapshot;

pub use accessor::{AccessResult, ItemAccessor, StableId, VarValue};
pub use checksum::{decode_payload, encode_payload, payload_checksum, verify_embedded};
pub use config::{EngineConfig, EventSourceConfig, PersistenceConfig, WorldDropConfig};
pub use dirty::DirtyKind;
pub use error::{AccessError, EngineError, ErrorCode, Result};
pub use meta::{FORMAT_VERSION, FragmentMap, ItemMeta, META_VERSION};
pub use snapshot::{ItemSnapshot, ModifierEntry, ModifierKind, SlotEntry, StatEntry, VariableEntry};
