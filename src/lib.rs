// lib.rs
pub mod assembly;
pub mod comparisons;
pub mod genomes;
pub mod intervals;
pub mod markers;
pub mod optimize;
pub mod pipeline;
