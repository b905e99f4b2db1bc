use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::command::RemoteCommand;

/// Source of remote commands. Polled; a push transport can implement it by
/// returning whatever arrived since the previous call.
#[async_trait]
pub trait CommandFeed: Send {
    async fn fetch(&mut self) -> Result<Vec<RemoteCommand>>;
}

/// Long-lived task moving commands from a feed into the main loop's queue.
pub struct CommandPoller<F> {
    feed: F,
    interval: Duration,
    tx: mpsc::UnboundedSender<RemoteCommand>,
}

impl<F: CommandFeed + 'static> CommandPoller<F> {
    pub fn new(feed: F, interval: Duration, tx: mpsc::UnboundedSender<RemoteCommand>) -> Self {
        Self { feed, interval, tx }
    }

    /// Runs until `shutdown` turns true (or its sender drops). A fetch in
    /// flight when shutdown arrives is allowed to finish.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "command poller started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.feed.fetch().await {
                        Ok(commands) => {
                            for command in commands {
                                debug!(id = command.id, name = %command.name, "command received");
                                if self.tx.send(command).is_err() {
                                    info!("command queue closed, poller exiting");
                                    return;
                                }
                            }
                        }
                        Err(e) => warn!(error = %format!("{e:#}"), "command poll failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("command poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::Value;
    use std::collections::VecDeque;

    struct ScriptedFeed {
        batches: VecDeque<Result<Vec<RemoteCommand>>>,
    }

    #[async_trait]
    impl CommandFeed for ScriptedFeed {
        async fn fetch(&mut self) -> Result<Vec<RemoteCommand>> {
            self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[tokio::test]
    async fn forwards_batches_in_order_and_survives_errors() {
        let feed = ScriptedFeed {
            batches: VecDeque::from(vec![
                Ok(vec![RemoteCommand::new("PING", Value::Null)]),
                Err(anyhow!("network down")),
                Ok(vec![
                    RemoteCommand::new("SAY", Value::Null),
                    RemoteCommand::new("STOP", Value::Null),
                ]),
            ]),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = CommandPoller::new(feed, Duration::from_millis(5), tx).spawn(stop_rx);

        let mut names = Vec::new();
        while names.len() < 3 {
            let cmd = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            names.push(cmd.name);
        }
        assert_eq!(names, vec!["PING", "SAY", "STOP"]);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn exits_when_queue_closes() {
        let feed = ScriptedFeed {
            batches: VecDeque::from(vec![Ok(vec![RemoteCommand::new("PING", Value::Null)])]),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = CommandPoller::new(feed, Duration::from_millis(5), tx).spawn(stop_rx);
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
