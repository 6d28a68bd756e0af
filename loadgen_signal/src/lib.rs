//! Module to signal phase changes in loadgen.
//!
//! Loadgen coordinates a controller, a pool of workers and a transport, and
//! must tell each of them when to stop. The mechanism here has two components,
//! a `Broadcaster` and a `Watcher`. The `Broadcaster` signals every `Watcher`
//! that a phase has been reached. This is a one-time event; tracking several
//! phases needs several signal pairs.
//!
//! There is only one `Broadcaster` and potentially many `Watcher` instances.
//! Dropping the `Broadcaster` without signaling counts as a signal.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

use tokio::sync::watch;

/// Construct a `Watcher` and `Broadcaster` pair.
#[must_use]
pub fn signal() -> (Watcher, Broadcaster) {
    let (sender, receiver) = watch::channel(false);
    (Watcher { receiver }, Broadcaster { sender })
}

#[derive(Debug)]
/// Mechanism to notify one or more `Watcher` instances that a phase has been
/// achieved.
pub struct Broadcaster {
    sender: watch::Sender<bool>,
}

impl Broadcaster {
    /// Send the signal through any `Watcher` instances.
    ///
    /// Function will NOT block until all peers have received the signal.
    pub fn signal(self) {
        self.sender.send_replace(true);
    }
}

#[derive(Debug, Clone)]
/// Mechanism to watch for phase changes, typically used to control shutdown.
pub struct Watcher {
    receiver: watch::Receiver<bool>,
}

impl Watcher {
    /// Receive the signal. This function will block if the signal has not
    /// already been sent.
    pub async fn recv(mut self) {
        // An error means the `Broadcaster` is gone, which is also a signal.
        let _ = self.receiver.wait_for(|signaled| *signaled).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::signal;

    #[tokio::test]
    async fn signal_reaches_every_watcher() {
        let (watcher, broadcaster) = signal();
        let cloned = watcher.clone();
        broadcaster.signal();
        watcher.recv().await;
        cloned.recv().await;
    }

    #[tokio::test]
    async fn dropped_broadcaster_is_a_signal() {
        let (watcher, broadcaster) = signal();
        drop(broadcaster);
        watcher.recv().await;
    }

    #[tokio::test(start_paused = true)]
    async fn recv_blocks_until_signal() {
        let (watcher, broadcaster) = signal();
        let handle = tokio::spawn(watcher.recv());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.is_finished());
        broadcaster.signal();
        handle.await.expect("watcher task");
    }
}
