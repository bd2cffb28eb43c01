mod executor;
mod process;
mod session;

pub use executor::SandboxExecutor;
pub use process::{ExecutionOutcome, ProcessSpec, ResourceLimits, execute};
pub use session::SandboxSession;
