//! Domain model for the ingest -> plan -> execute -> write pipeline.
//!
//! # Responsibility
//! - Define canonical data structures shared by store, executor and workers.
//!
//! # Invariants
//! - Every event is identified by a stable id and is never deleted.
//! - Task status belongs to the executor; related event ids are read-only
//!   back-references, never ownership edges.

pub mod artifact;
pub mod event;
pub mod task;
