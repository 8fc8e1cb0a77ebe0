//! Storage and concurrency core of a disk-oriented relational database
//! engine: a buffer pool with a pluggable LRU replacement policy, a
//! parallel buffer pool sharding it across independent instances, an
//! extendible hash index built on top, and a tuple-granularity lock
//! manager enforcing strict two-phase locking under Wound-Wait.
//!
//! Higher-level concerns — execution operators, the catalog, the SQL
//! planner and parser, client I/O, crash recovery, and MVCC — are
//! deliberately not part of this crate; see each module's documentation
//! for the external interfaces it consumes or provides instead.

pub mod buffer;
pub mod common;
pub mod concurrency;
pub mod container;
pub mod storage;
