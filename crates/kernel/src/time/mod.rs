//! Time keeping: the 1 kHz tick and the hierarchical timer wheel.

pub mod tick;
pub mod wheel;
