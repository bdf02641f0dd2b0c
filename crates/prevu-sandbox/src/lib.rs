#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]

pub mod messages;
pub mod sandbox;
pub mod session;
pub mod store;

pub use messages::{Envelope, LogLevel, SandboxMessage};
pub use sandbox::{Sandbox, SandboxError};
pub use session::{ConsoleLogEntry, PreviewSession, SessionError};
pub use store::{PersistentStore, SharedStore};
