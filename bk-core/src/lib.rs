//! bk Core
//!
//! Core types shared by the local pipeline runner and its agent-protocol client.
//!
//! This crate contains:
//! - Domain types: Agent, Build, Job and the pipeline document model
//! - DTOs: Request/response bodies of the agent wire protocol

pub mod domain;
pub mod dto;
