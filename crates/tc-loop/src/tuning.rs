//! Live tuning over a message channel.
//!
//! The runner owns every controller, so other threads (a console, a UI) never
//! touch them directly. They send [`TuningRequest`]s through a
//! [`TuningHandle`]; the runner answers them at the top of each tick.

use std::sync::mpsc::{self, Receiver, Sender};

use tc_controls::ControllerParameters;

use crate::error::{LoopError, LoopResult};

/// Reply to a parameter read or write.
pub type ParamReply = Result<ControllerParameters, LoopError>;

/// Request serviced by the runner.
#[derive(Debug)]
pub enum TuningRequest {
    /// Names of all bound controllers, in binding order.
    List { reply: Sender<Vec<String>> },
    /// Parameter snapshot of one controller.
    Get { name: String, reply: Sender<ParamReply> },
    /// Partial update of one controller; replies with the new snapshot.
    Set {
        name: String,
        overrides: ControllerParameters,
        reply: Sender<ParamReply>,
    },
}

/// Cloneable sender side of the tuning channel.
#[derive(Debug, Clone)]
pub struct TuningHandle {
    tx: Sender<TuningRequest>,
}

impl TuningHandle {
    pub(crate) fn channel() -> (Self, Receiver<TuningRequest>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    pub fn list(&self) -> LoopResult<Vec<String>> {
        let (reply, rx) = mpsc::channel();
        self.send(TuningRequest::List { reply })?;
        rx.recv().map_err(|_| LoopError::Disconnected)
    }

    pub fn get(&self, name: &str) -> LoopResult<ControllerParameters> {
        let (reply, rx) = mpsc::channel();
        self.send(TuningRequest::Get {
            name: name.to_string(),
            reply,
        })?;
        rx.recv().map_err(|_| LoopError::Disconnected)?
    }

    /// Apply `overrides` atomically to controller `name`.
    ///
    /// Blocks until the runner reaches its next tick boundary.
    pub fn set(&self, name: &str, overrides: ControllerParameters) -> LoopResult<ControllerParameters> {
        let (reply, rx) = mpsc::channel();
        self.send(TuningRequest::Set {
            name: name.to_string(),
            overrides,
            reply,
        })?;
        rx.recv().map_err(|_| LoopError::Disconnected)?
    }

    fn send(&self, request: TuningRequest) -> LoopResult<()> {
        self.tx.send(request).map_err(|_| LoopError::Disconnected)
    }
}
