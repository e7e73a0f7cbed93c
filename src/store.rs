//! In-memory state and the command/query engine.

pub mod engine;
pub use engine::{Engine, RecordPatch};

mod error;
pub use error::{CommandError, ErrorKind};

pub mod registry;
pub use registry::Registry;
