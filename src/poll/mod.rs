//! Poll cycle execution: batched dispatch and orchestration.

mod dispatcher;
mod orchestrator;

pub use dispatcher::*;
pub use orchestrator::*;
