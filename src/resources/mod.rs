// src/resources/mod.rs

//! Worker resource descriptions and capacity updates.
//!
//! The scheduler is generic over [`ResourceDescription`]; the crate ships
//! one concrete description, [`MethodResources`], covering CPUs, GPUs and
//! memory.

pub mod description;
pub mod update;

pub use description::{MethodResources, ResourceDescription};
pub use update::{ResourceUpdate, UpdateKind};
