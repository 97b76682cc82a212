//! N-to-M stage barrier.
//!
//! A barrier waits for one "finished" signal from each of its sources, then
//! sends one "start" signal to each of its sinks, and repeats. Signals travel
//! over zero-capacity channels, so a sender blocks until the receiving side
//! takes the signal. Chaining barriers in a ring advances a set of workers in
//! lockstep without any other coordination.
//!
//! ## Shutdown
//!
//! A source whose sender was dropped has retired and is removed from the wait
//! set; a sink whose receiver was dropped is removed from the release set. The
//! barrier exits once either set is empty, dropping its own channel ends and
//! cascading shutdown to its neighbours.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Sending half of a stage signal.
pub type SignalSender = Sender<()>;

/// Receiving half of a stage signal.
pub type SignalReceiver = Receiver<()>;

/// Create a rendezvous channel for stage signals.
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    bounded(0)
}

/// Create `n` rendezvous channels, split into senders and receivers.
pub fn signal_channels(n: usize) -> (Vec<SignalSender>, Vec<SignalReceiver>) {
    (0..n).map(|_| signal_channel()).unzip()
}

/// Barrier between two groups of stages.
pub struct StageBarrier {
    name: String,
    sources: Vec<SignalReceiver>,
    sinks: Vec<SignalSender>,
    primed: bool,
}

impl StageBarrier {
    /// Create a barrier waiting on `sources` and releasing `sinks`.
    pub fn new(
        name: impl Into<String>,
        sources: Vec<SignalReceiver>,
        sinks: Vec<SignalSender>,
    ) -> Self {
        Self {
            name: name.into(),
            sources,
            sinks,
            primed: false,
        }
    }

    /// Release the sinks once before the first wait.
    ///
    /// Used for the barrier that starts the first cycle.
    pub fn primed(mut self) -> Self {
        self.primed = true;
        self
    }

    /// Barrier name used in logs and the thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the barrier loop on the current thread.
    ///
    /// Returns the number of completed rounds (all sources heard from and
    /// sinks released), not counting the priming release.
    pub fn run(mut self) -> u64 {
        let mut rounds = 0;

        if self.primed && !self.release() {
            debug!(barrier = %self.name, "No sinks left after priming");
            return rounds;
        }

        loop {
            if !self.wait_all() {
                debug!(barrier = %self.name, rounds, "All sources retired");
                break;
            }

            rounds += 1;
            trace!(barrier = %self.name, round = rounds, "Sources finished, releasing sinks");

            if !self.release() {
                debug!(barrier = %self.name, rounds, "All sinks retired");
                break;
            }
        }

        rounds
    }

    /// Run the barrier loop on a dedicated named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<u64>> {
        thread::Builder::new()
            .name(format!("barrier-{}", self.name))
            .spawn(move || self.run())
    }

    /// Block until every live source has signalled once.
    fn wait_all(&mut self) -> bool {
        let name = &self.name;
        self.sources.retain(|source| match source.recv() {
            Ok(()) => true,
            Err(_) => {
                debug!(barrier = %name, "Source retired");
                false
            }
        });
        !self.sources.is_empty()
    }

    /// Signal every live sink once.
    fn release(&mut self) -> bool {
        let name = &self.name;
        self.sinks.retain(|sink| match sink.send(()) {
            Ok(()) => true,
            Err(_) => {
                debug!(barrier = %name, "Sink retired");
                false
            }
        });
        !self.sinks.is_empty()
    }
}
