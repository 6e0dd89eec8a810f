//! Core domain types
//!
//! This module contains the entities the local control plane manages.
//! They are owned by in-memory containers in `bk-local` (agent pool,
//! scheduler, step queue) and rendered onto the wire through `dto`.

pub mod agent;
pub mod build;
pub mod job;
pub mod pipeline;
