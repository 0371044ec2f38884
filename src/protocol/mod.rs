//! Worker transport protocol: message shapes and JSONL I/O.

mod io;
mod message;

pub use io::{parse_message, serialize_message, JsonlReader};
pub use message::{Channel, UiState, WorkerMessage, ANONYMOUS_PID, NO_OWNER_PID};
