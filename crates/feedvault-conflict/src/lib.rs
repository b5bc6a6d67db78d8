//! Feedvault Conflict - Queue conflict resolution and failure classification
//!
//! Provides:
//! - The decision table that folds a newly submitted operation into the
//!   pending entry for the same logical record
//! - Classification of repository failures into retry decisions

pub mod classify;
pub mod resolver;

pub use classify::{classify, FailureClass};
pub use resolver::{resolve, Resolution};
