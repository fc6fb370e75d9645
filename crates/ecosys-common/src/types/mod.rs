//! Core data types for the Ecosys meta-controller

pub mod allocation;
pub mod component;
pub mod generation;
pub mod metrics;
