//! Core types for treating an externally executed simulation as a function.
//!
//! Optimizers want a synchronous `f(params) -> observations`, but the
//! simulations behind it run out-of-process and may take days. This crate
//! defines the shared vocabulary that stores, the evaluation engine, and the
//! drivers build on:
//!
//! - [`StudyConfig`]: the immutable description of active parameters,
//!   observations, scales, targets, and ensemble size
//! - [`ParameterVector`] and [`EnsembleMember`]: points in parameter space and
//!   their content-addressed [`Fingerprint`]
//! - [`SimulationRecord`] and [`RunState`]: one persisted simulation case
//! - [`ModelCache`]: the boundary that resolves a member to a record, creating
//!   new work on a miss
//! - [`Outcome`]: either a ready value or the [`PendingRuns`] that must finish
//!   before the caller retries
//! - [`Observer`]: receives driver events and optionally returns an action
//! - [`ParameterAdapter`]: the seam per-model collaborators implement to turn
//!   parameters into file edits

mod adapter;
mod cache;
mod config;
mod fingerprint;
mod observer;
mod outcome;
mod params;
mod record;

pub use adapter::{AdapterError, FileEdit, NamelistAdapter, ParameterAdapter};
pub use cache::ModelCache;
pub use config::{ConfigError, ObsSpec, ParamSpec, StudyConfig};
pub use fingerprint::Fingerprint;
pub use observer::Observer;
pub use outcome::{Outcome, PendingRuns};
pub use params::{EnsembleMember, Parameter, ParameterVector};
pub use record::{ObservationVector, ParseStateError, RunState, SimulationRecord};
