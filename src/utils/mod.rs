//! Utility modules for the association library.

mod random;

pub use random::Random;
