//! The surface command channel.
//!
//! Rendering is out of scope; the UI layer attaches to the receiving end of
//! this channel and interprets the commands however it draws. The
//! orchestrator only ever *sends* - a detached or slow surface must never
//! stall arbitration, so sends are fire-and-forget and a closed channel is
//! logged once at debug level.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::debug;

use crate::bounds::PromptBounds;
use crate::protocol::WorkerMessage;

/// Commands addressed to the shared UI surface.
#[derive(Debug, Clone)]
pub enum SurfaceCommand {
    /// A new script is taking over; the current session should yield.
    Start(PathBuf),
    /// The worker now bound to the surface.
    SetPid(u32),
    SetBounds(PromptBounds),
    Show,
    Hide,
    /// Force-reload the surface (unresponsive worker recovery).
    Reload,
    /// A worker message multiplexed back to the surface.
    Forward { pid: u32, message: WorkerMessage },
    /// No worker could be obtained; show a generic failure state but stay
    /// usable for future requests.
    CouldNotStart(PathBuf),
}

/// Sender half handed to orchestrator components.
#[derive(Clone)]
pub struct SurfaceLink {
    tx: Sender<SurfaceCommand>,
}

impl SurfaceLink {
    pub fn new() -> (Self, Receiver<SurfaceCommand>) {
        let (tx, rx) = channel();
        (SurfaceLink { tx }, rx)
    }

    pub fn send(&self, command: SurfaceCommand) {
        if self.tx.send(command).is_err() {
            debug!("Surface receiver detached, dropping command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_order() {
        let (link, rx) = SurfaceLink::new();
        link.send(SurfaceCommand::Show);
        link.send(SurfaceCommand::SetPid(9));
        link.send(SurfaceCommand::Hide);

        assert!(matches!(rx.try_recv().unwrap(), SurfaceCommand::Show));
        assert!(matches!(rx.try_recv().unwrap(), SurfaceCommand::SetPid(9)));
        assert!(matches!(rx.try_recv().unwrap(), SurfaceCommand::Hide));
    }

    #[test]
    fn test_detached_receiver_does_not_panic() {
        let (link, rx) = SurfaceLink::new();
        drop(rx);
        link.send(SurfaceCommand::Reload);
    }
}
