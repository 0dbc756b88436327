//! Core library for the ADKAR change assistant: the generation relay to a
//! locally hosted inference engine, the NDJSON reframing transform, the
//! out-of-band readiness probe, the client-side streaming consumer, and the
//! cross-context widget bus.

pub mod assistant;
pub mod bus;
pub mod cache;
pub mod consumer;
pub mod decode;
pub mod engine;
pub mod error;
pub mod probe;
pub mod stage;

pub use engine::{EngineClient, GenerationRequest, DEFAULT_MODEL};
pub use error::RelayError;
pub use stage::Stage;
