//! Named pub/sub channels.
//!
//! Channels are identified by opaque names: the head publishes on the
//! broadcast channel or on a factory's unicast channel, and every factory
//! publishes its feedbacks on the feedback channel. A channel is created
//! lazily on first use by either side.

use std::collections::HashMap;

use tokio::sync::{RwLock, broadcast};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, trace};

use crate::error::Error;
use crate::result::Result;
use crate::types::ChannelName;

const DEFAULT_CAPACITY: usize = 1024;

/// Subscription handle for receiving the messages of one channel.
pub struct ChannelSubscription<T> {
    channel: ChannelName,
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> ChannelSubscription<T> {
    /// Receive the next message.
    ///
    /// # Errors
    ///
    /// Returns `ChannelLagged` when messages were overwritten before being
    /// read and `ChannelClosed` when the hub was dropped.
    pub async fn recv(&mut self) -> Result<T> {
        self.receiver.recv().await.map_err(|e| match e {
            RecvError::Lagged(skipped) => Error::ChannelLagged {
                channel: self.channel.clone(),
                skipped,
            },
            RecvError::Closed => Error::channel_closed(self.channel.clone()),
        })
    }

    /// Receive a message without waiting, `None` when nothing is pending.
    ///
    /// # Errors
    ///
    /// Same as [`ChannelSubscription::recv`].
    pub fn try_recv(&mut self) -> Result<Option<T>> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Lagged(skipped)) => Err(Error::ChannelLagged {
                channel: self.channel.clone(),
                skipped,
            }),
            Err(TryRecvError::Closed) => Err(Error::channel_closed(self.channel.clone())),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Registry of named broadcast channels.
pub struct ChannelHub<T> {
    channels: RwLock<HashMap<ChannelName, broadcast::Sender<T>>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> ChannelHub<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<T> {
        if let Some(sender) = self.channels.read().await.get(channel) {
            return sender.clone();
        }
        self.channels
            .write()
            .await
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish a message, returning the number of subscribers reached.
    ///
    /// Publishing on a channel without subscribers is not an error: the
    /// message is dropped.
    pub async fn publish(&self, channel: &str, message: T) -> usize {
        let sender = self.sender(channel).await;
        match sender.send(message) {
            Ok(receivers) => {
                trace!(channel = %channel, receivers, "Message published");
                receivers
            }
            Err(_) => {
                debug!(channel = %channel, "No active subscribers, message dropped");
                0
            }
        }
    }

    /// Subscribe to the messages published on a channel from now on.
    pub async fn subscribe(&self, channel: &str) -> ChannelSubscription<T> {
        ChannelSubscription {
            channel: channel.to_string(),
            receiver: self.sender(channel).await.subscribe(),
        }
    }

    /// Number of live subscribers of a channel.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl<T: Clone + Send + 'static> Default for ChannelHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers_of_channel_only() {
        let hub: ChannelHub<u32> = ChannelHub::new();
        let mut unicast = hub.subscribe("unicast-1").await;
        let mut broadcast = hub.subscribe("broadcast").await;

        let reached = hub.publish("unicast-1", 7).await;

        assert_eq!(reached, 1);
        assert_eq!(unicast.recv().await.unwrap(), 7);
        assert_eq!(broadcast.try_recv().unwrap(), None);
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_dropped() {
        let hub: ChannelHub<u32> = ChannelHub::new();
        assert_eq!(hub.publish("nobody", 1).await, 0);
        assert_eq!(hub.subscriber_count("nobody").await, 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_reported() {
        let hub: ChannelHub<u32> = ChannelHub::with_capacity(1);
        let mut sub = hub.subscribe("c").await;
        hub.publish("c", 1).await;
        hub.publish("c", 2).await;

        let result = sub.recv().await;
        assert!(matches!(result, Err(Error::ChannelLagged { skipped: 1, .. })));
        assert_eq!(sub.recv().await.unwrap(), 2);
    }
}
