//! Write-path orchestration.
//!
//! The composer is the only place the three admission components meet; none
//! of them call each other.

pub mod composer;

pub use composer::{Composer, Draft, Reported, Sent};
