//! Foundation types for Folio.
//!
//! This crate contains the types shared by every Folio crate: the preview
//! request and probe result data model, viewer states and recovery options,
//! configuration, and error types.

pub mod config;
pub mod error;
pub mod model;
