//! fieldlink-exec: Command execution abstraction
//!
//! Provides the executor trait used by the remote command dispatcher and a
//! local implementation backed by `tokio::process`.

pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use error::ExecError;
pub use local::{ExecMode, LocalExecutor};
pub use result::CommandResult;
pub use traits::CommandExecutor;
