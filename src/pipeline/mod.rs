//! Per-request pipeline: staging, decoding, concurrent analysis

pub mod cancel;
pub mod orchestrator;
pub mod staging;

pub use cancel::CancellationToken;
pub use orchestrator::{Orchestrator, RequestOutcome, RequestState};
pub use staging::StagedUpload;
