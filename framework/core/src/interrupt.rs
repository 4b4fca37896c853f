use std::sync::Arc;

use tokio::sync::watch::{self, Receiver, Sender};

use crate::error::InterruptedError;

/// The owning side of an interrupt signal.
///
/// A handle can be fired once; firing again is a no-op. Handles created with
/// [InterruptHandle::child] are also considered fired when any of their ancestors fire, which is
/// how a run-wide interrupt (Ctrl-C) reaches the journey that is currently running.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    sender: Arc<Sender<bool>>,
    ancestors: Vec<Receiver<bool>>,
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
            ancestors: Vec::new(),
        }
    }

    /// Create a handle that can be fired on its own but also observes this handle.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.sender.subscribe());

        Self {
            sender: Arc::new(watch::channel(false).0),
            ancestors,
        }
    }

    pub fn interrupt(&self) {
        if self.sender.send_replace(true) {
            log::trace!("Interrupt already fired");
        }
    }

    /// True if this handle or any ancestor has been fired.
    pub fn is_interrupted(&self) -> bool {
        *self.sender.borrow() || self.ancestors.iter().any(|r| *r.borrow())
    }

    pub fn new_listener(&self) -> InterruptListener {
        let mut receivers = self.ancestors.clone();
        receivers.push(self.sender.subscribe());
        InterruptListener { receivers }
    }
}

/// The observing side of an [InterruptHandle], handed to journey code and to waits.
#[derive(Clone, Debug)]
pub struct InterruptListener {
    receivers: Vec<Receiver<bool>>,
}

impl InterruptListener {
    /// Point in time check. A fired interrupt stays fired, so this keeps returning true.
    pub fn should_interrupt(&self) -> bool {
        self.receivers.iter().any(|r| *r.borrow())
    }

    /// Convenience for journey code that wants to bail out with `?`.
    pub fn check(&self) -> Result<(), InterruptedError> {
        if self.should_interrupt() {
            Err(InterruptedError::default())
        } else {
            Ok(())
        }
    }

    /// Wait until the interrupt fires. It is safe to race this with another future so that the
    /// interrupt can be used to cancel work in progress.
    pub async fn wait_for_interrupt(&mut self) {
        let waits = self.receivers.iter_mut().map(|receiver| {
            Box::pin(async move {
                let closed = receiver.wait_for(|fired| *fired).await.is_err();
                if closed {
                    // The handle went away without firing, this source can never fire now.
                    std::future::pending::<()>().await;
                }
            })
        });

        futures::future::select_all(waits).await;
    }
}
