//! Price tracking: session state, polling engine and its control surface

pub mod engine;
pub mod manager;
pub mod session;

pub use engine::{CycleError, CycleOutcome, EngineConfig, EngineDeps, LoopControl, PollingEngine};
pub use manager::{validate_start, StartRequest, TrackingManager};
pub use session::{CycleCheck, EngineState, StartOutcome, StatusSnapshot, TrackingSession, TrackingTarget};
