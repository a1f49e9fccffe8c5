//! Actor implementations

pub mod session;

pub use session::{SessionActor, SessionActorArgs};
