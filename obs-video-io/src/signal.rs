//! Counting wake-up signal for the dispatch thread
//!
//! Every post is one queued message; every successful wait consumes one.
//! Both channel ends live in the same struct, so waits never observe a
//! disconnect while the signal is alive.

use crossbeam::channel::{self, Receiver, Sender};

pub struct WorkSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl WorkSignal {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    pub fn post(&self) {
        // Cannot fail: `rx` is owned by `self`.
        let _ = self.tx.send(());
    }

    /// Block until a post is available. Returns false only if the signal is gone.
    pub fn wait(&self) -> bool {
        self.rx.recv().is_ok()
    }

    /// Posts not yet consumed
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for WorkSignal {
    fn default() -> Self {
        Self::new()
    }
}
