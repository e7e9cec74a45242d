//! Test Fixtures Module
//!
//! - Audio fixtures (programmatically generated)
//! - Scripted collaborators for driving turns

// Allow dead code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]

pub mod audio_fixtures;
pub mod collaborators;

pub use audio_fixtures::*;
pub use collaborators::*;
