//! Turn-taking for one call session.
//!
//! [`TurnController`] owns the lifecycle of each reply: it runs the
//! collaborator pipeline for a submitted utterance, streams the synthesized
//! audio into the session's [`OutboundScheduler`](crate::core::scheduler::OutboundScheduler)
//! and cancels all of it when the caller barges in.

mod controller;
mod state;

pub use controller::{TurnController, TurnSettings, TurnStats};
pub use state::{TurnState, TurnStateCell};
