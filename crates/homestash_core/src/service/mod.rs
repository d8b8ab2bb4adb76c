//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep every location-displaying caller on one shared resolution engine
//!   instead of per-view ad hoc log walks.

pub mod inventory;
pub mod location;
