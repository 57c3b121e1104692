//! Operations: statistics shared between the loop and the control surface.

pub mod stats;
