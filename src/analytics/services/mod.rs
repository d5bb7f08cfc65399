// src/analytics/services/mod.rs

pub mod dune;
pub mod footprint;
