//! Connectivity signal used to gate remote refreshes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shared "currently reachable" flag.
///
/// Consumers call [`Reachability::subscribe`] and read the current value;
/// nothing ever waits for a particular transition.
#[derive(Clone)]
pub struct Reachability {
    state: Arc<watch::Sender<bool>>,
    fixed: bool,
}

impl Reachability {
    pub fn new(initial: bool) -> Self {
        Self::with_state(initial, false)
    }

    /// A signal that never changes. `set` and `spawn_probe` leave it as is.
    pub fn fixed(reachable: bool) -> Self {
        Self::with_state(reachable, true)
    }

    fn with_state(initial: bool, fixed: bool) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
            fixed,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Publishes `reachable`; subscribers are only woken on a transition.
    pub fn set(&self, reachable: bool) {
        if self.fixed {
            tracing::debug!(reachable, "ignoring update to fixed reachability");
            return;
        }
        let changed = self.state.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });
        if changed {
            tracing::info!(reachable, "reachability changed");
        }
    }

    pub fn is_reachable(&self) -> bool {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Probes `url` every `interval` in the background.
    ///
    /// Any HTTP response, whatever its status, counts as reachable. The
    /// task runs until the returned handle is aborted. A fixed signal is
    /// never probed and its task finishes immediately.
    pub fn spawn_probe(&self, url: String, interval: Duration, timeout: Duration) -> JoinHandle<()> {
        if self.fixed {
            tracing::debug!(url, "reachability is fixed, not probing");
            return tokio::spawn(async {});
        }
        let this = self.clone();
        tokio::spawn(async move {
            let client = match reqwest::Client::builder().timeout(timeout).build() {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot build probe client, leaving reachability unchanged");
                    return;
                }
            };

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                this.set(probe(&client, &url).await);
            }
        })
    }
}

/// Returns true if `url` answered with any HTTP response.
pub async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match client.head(url).send().await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(url, error = %e, "probe failed");
            false
        }
    }
}
