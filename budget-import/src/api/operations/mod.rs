//! Dataverse Operations Module
//!
//! This module provides a unified interface for Dataverse write operations
//! that can be executed individually or in batches.

pub mod batch;
pub mod operation;

pub use batch::{BatchOperation, BatchRequest, BatchResponseParser, parse_entity_id};
pub use operation::{BatchOperationResult, Operation};
