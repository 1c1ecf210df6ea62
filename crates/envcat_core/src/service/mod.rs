//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep callers (CLI, API) decoupled from storage details.

pub mod entry_service;
pub mod group_service;
pub mod identity_registry;
pub mod result_set;
pub mod vocabulary_service;
