#[allow(clippy::module_inception)]
pub mod error;
pub mod exec;
pub mod outcome;

pub use error::{CliError, EngineError};
pub use exec::ExecError;
pub use outcome::{RetVal, TaskOutcome};
