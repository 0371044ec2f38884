//! Worker pool: process creation, idling, assignment, teardown, and crash
//! recovery plumbing.

mod manager;
mod worker;

pub use manager::WorkerPool;
pub use worker::{
    find_executable, ProcessHandle, ProcessSpawner, WorkerHandle, WorkerKind, WorkerSpawner,
};

#[cfg(unix)]
pub use worker::{kill_process_group, process_group_alive, SIGKILL, SIGTERM};

#[cfg(test)]
pub use worker::testing;
