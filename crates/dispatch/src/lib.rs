//! Migration-event dispatch: filter evaluation, per-event analysis
//! snapshots, and the orchestrator that turns matches into buy jobs.

pub mod aux;
pub mod filters;
pub mod orchestrator;

pub use aux::{AuxCache, AuxFetchSettings};
pub use filters::{evaluate, on_unavailable, FilterContext, FilterKind, FilterMiss, OnUnavailable};
pub use orchestrator::{DispatchOrchestrator, DispatchReport};
