//! Data Transfer Objects for the agent wire protocol
//!
//! Request and response bodies exchanged between the build agent and the
//! local control plane. Field names follow what the agent sends and expects.

pub mod agent;
pub mod job;
pub mod meta_data;
