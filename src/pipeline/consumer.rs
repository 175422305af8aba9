use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{error, info};

use crate::domain::ports::{BrokerMessage, BrokerRef};
use crate::error::Result;

/// Per-message processing logic plugged into a [`ConsumerLoop`].
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: BrokerMessage) -> Result<()>;
}

/// One consumption loop over a single topic: a dedicated fetch task feeding
/// a fixed pool of workers through a capacity-1 channel.
///
/// The tiny channel is the backpressure mechanism: when every worker is busy
/// the fetch stalls, which stalls offset commits and so throttles the whole
/// stage without an explicit rate limiter. Offsets are committed once a
/// message has been handed to the pool: a crash before the commit redelivers
/// the message, while a crash after it loses any handed-off message a worker
/// has not finished with.
///
/// A fetch or commit failure is fatal to the loop and surfaces through
/// `run`'s return value; the process is expected to terminate rather than
/// run headless. A handler failure is logged and the message skipped.
pub struct ConsumerLoop<H> {
    broker: BrokerRef,
    topic: String,
    group: String,
    pool_size: usize,
    handler: Arc<H>,
}

impl<H: MessageHandler> ConsumerLoop<H> {
    pub fn new(
        broker: BrokerRef,
        topic: impl Into<String>,
        group: impl Into<String>,
        pool_size: usize,
        handler: Arc<H>,
    ) -> Self {
        Self {
            broker,
            topic: topic.into(),
            group: group.into(),
            pool_size: pool_size.max(1),
            handler,
        }
    }

    /// Runs until the shutdown signal flips or the broker fails.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let (sender, receiver) = mpsc::channel::<BrokerMessage>(1);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(self.pool_size);
        for _ in 0..self.pool_size {
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(&self.handler);
            let topic = self.topic.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let message = { receiver.lock().await.recv().await };
                    let Some(message) = message else { break };
                    let offset = message.offset;
                    if let Err(err) = handler.handle(message).await {
                        error!(%topic, offset, %err, "failed to handle message, skipping");
                    }
                }
            }));
        }

        let outcome = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            let fetched = tokio::select! {
                fetched = self.broker.fetch(&self.topic, &self.group) => fetched,
                _ = shutdown.changed() => break Ok(()),
            };
            let message = match fetched {
                Ok(message) => message,
                Err(err) => {
                    error!(topic = %self.topic, %err, "fetch failed, terminating loop");
                    break Err(err);
                }
            };
            let offset = message.offset;
            if sender.send(message).await.is_err() {
                break Ok(());
            }
            if let Err(err) = self.broker.commit(&self.topic, &self.group, offset).await {
                error!(topic = %self.topic, %err, "commit failed, terminating loop");
                break Err(err);
            }
        };

        drop(sender);
        for worker in workers {
            let _ = worker.await;
        }
        info!(topic = %self.topic, group = %self.group, "consumer loop stopped");
        outcome
    }
}
