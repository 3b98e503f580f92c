//! Custom resource types for the canary rollout control core.

pub mod canary;

pub use canary::*;

#[cfg(test)]
#[path = "canary_test.rs"]
mod tests;
