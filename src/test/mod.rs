//! Shared test fixtures and end-to-end tournament workloads.

pub mod tournament_workload;
