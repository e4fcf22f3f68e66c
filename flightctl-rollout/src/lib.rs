//! Rollout Controller (§4.3): the per-fleet batch-sequencing state machine
//! that is the core of the control plane. [`controller::RolloutController`]
//! is the entry point a scheduler drives once per fleet per reconcile tick,
//! never concurrently for the same fleet (§5).

pub mod batch_state;
pub mod controller;
pub mod disruption;
pub mod error;
pub mod evaluation;

pub use batch_state::FleetRuntimeState;
pub use controller::RolloutController;
pub use error::{RolloutError, RolloutResult};
