//! Domain model for teams and experiments.
//!
//! # Responsibility
//! - Define the records shared by repositories, services and views.
//! - Hold the field-level rules that do not need storage to check.
//!
//! # Invariants
//! - Ids are assigned by storage and never reused.
//! - An experiment links 1 or 2 teams; the count is fixed after creation.

pub mod experiment;
pub mod team;
