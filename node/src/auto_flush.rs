//! Timer-driven flushing.
//!
//! One background task per node. The period lives in a `watch` channel:
//! changing it restarts the timer inside the same task, so there is never a
//! second timer firing alongside the first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::LocalNode;

pub struct AutoFlusher {
    period: watch::Sender<Option<Duration>>,
    handle: JoinHandle<()>,
}

impl AutoFlusher {
    /// Spawn the flush task. `None` (or a zero period) starts it paused.
    pub fn spawn(node: Arc<LocalNode>, period: Option<Duration>) -> Self {
        let (tx, rx) = watch::channel(normalize(period));
        let handle = tokio::spawn(run(node, rx));
        Self { period: tx, handle }
    }

    /// Replace the period and restart the timer. `None` pauses flushing.
    pub fn set_period(&self, period: Option<Duration>) {
        self.period.send_replace(normalize(period));
    }

    pub fn period(&self) -> Option<Duration> {
        *self.period.borrow()
    }

    /// End the task, waiting for an in-progress flush to finish.
    pub async fn stop(self) {
        let Self { period, handle } = self;
        drop(period);
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "auto-flush task ended abnormally");
        }
    }
}

fn normalize(period: Option<Duration>) -> Option<Duration> {
    period.filter(|p| !p.is_zero())
}

async fn run(node: Arc<LocalNode>, mut rx: watch::Receiver<Option<Duration>>) {
    loop {
        let period = *rx.borrow_and_update();
        let Some(period) = period else {
            if rx.changed().await.is_err() {
                break;
            }
            continue;
        };

        tracing::debug!(period_ms = period.as_millis() as u64, "auto-flush timer armed");
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                changed = rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("auto-flush task shutting down");
                        return;
                    }
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = node.flush().await {
                        tracing::warn!(error = %e, "auto-flush failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeSettings;
    use chainpay_crypto::keypair_from_seed;
    use chainpay_nullables::NullLedger;
    use chainpay_types::{Amount, Asset, NodeId};

    fn node() -> Arc<LocalNode> {
        Arc::new(LocalNode::new(
            NodeSettings {
                node_id: NodeId::from("node-s"),
                fee: Amount::ZERO,
                asset: Asset::new("XLM"),
                accumulate: true,
            },
            keypair_from_seed(&[9; 32]),
            Arc::new(NullLedger::new()),
        ))
    }

    #[tokio::test]
    async fn flushes_on_every_tick() {
        let node = node();
        let flusher = AutoFlusher::spawn(node.clone(), Some(Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(node.metrics().flush_runs.get() >= 2);
        flusher.stop().await;
    }

    #[tokio::test]
    async fn paused_flusher_does_not_fire() {
        let node = node();
        let flusher = AutoFlusher::spawn(node.clone(), None);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(node.metrics().flush_runs.get(), 0);

        flusher.set_period(Some(Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(node.metrics().flush_runs.get() >= 1);

        flusher.set_period(None);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let runs = node.metrics().flush_runs.get();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(node.metrics().flush_runs.get(), runs);
        flusher.stop().await;
    }

    #[tokio::test]
    async fn zero_period_means_paused() {
        let flusher = AutoFlusher::spawn(node(), Some(Duration::ZERO));
        assert_eq!(flusher.period(), None);
        flusher.set_period(Some(Duration::from_secs(5)));
        assert_eq!(flusher.period(), Some(Duration::from_secs(5)));
        flusher.stop().await;
    }

    #[tokio::test]
    async fn resetting_period_restarts_timer() {
        let node = node();
        let flusher = AutoFlusher::spawn(node.clone(), Some(Duration::from_millis(200)));
        tokio::time::sleep(Duration::from_millis(120)).await;
        // Re-arming before the first tick pushes the deadline out again.
        flusher.set_period(Some(Duration::from_millis(200)));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(node.metrics().flush_runs.get(), 0);
        flusher.stop().await;
    }
}
