//! sysd-snapshot - Static systemd unit-tree analyzer
//!
//! A Rust implementation that:
//! - Crawls the systemd search paths of a filesystem tree (live host or
//!   unpacked firmware image) without executing anything in it
//! - Reconstructs every unit with drop-ins, aliases, template instances
//!   and implicit dependencies resolved the way systemd would at boot
//! - Emits durable JSON artifacts for forensic review and diffing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 sysd-snapshot                    │
//! ├──────────────┬──────────────────┬───────────────┤
//! │  Unit Lexer  │ Snapshot Builder │ Dep Resolver  │
//! ├──────────────┴──────────────────┴───────────────┤
//! │        Master Structure (unit graph)             │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod deps;
pub mod enrich;
pub mod master;
pub mod paths;
pub mod snapshot;
pub mod units;

// Re-exports for the common build-then-resolve flow
pub use deps::{DepMap, ResolveError};
pub use enrich::{ArtifactEnricher, Enrichment};
pub use master::{MasterStruct, Origin, Relation, RelationKind, UnitRecord};
pub use snapshot::{SnapshotBuilder, SnapshotError};
pub use units::{UnitName, UnitType};
