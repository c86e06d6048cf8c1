//! Outbound commands.

use crate::ack::WriteListener;
use crate::connection::ConnectionState;
use crate::counters::{CounterId, CounterReporter};
use crate::error::{BridgeError, BridgeResult};
use crate::transport::ControllerTransport;
use async_trait::async_trait;
use lxbridge_protocol::{Command, ControllerUuid, StateValue};
use std::sync::Arc;
use tracing::debug;

/// Sends commands to the controller.
pub struct CommandChannel {
    transport: Arc<dyn ControllerTransport>,
    counters: Arc<CounterReporter>,
    connection: Arc<ConnectionState>,
}

impl CommandChannel {
    /// Creates a channel over the given transport.
    pub fn new(
        transport: Arc<dyn ControllerTransport>,
        counters: Arc<CounterReporter>,
        connection: Arc<ConnectionState>,
    ) -> Self {
        Self {
            transport,
            counters,
            connection,
        }
    }

    /// Sends `action` to the control identified by `uuid`.
    ///
    /// The sent-counter is incremented once the transport accepted the request.
    pub async fn send_command(&self, uuid: &ControllerUuid, action: &str) -> BridgeResult<String> {
        if !self.connection.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        let path = Command::new(uuid.clone(), action).path()?;
        debug!(%uuid, action, "sending command");

        let response = self.transport.send(&path).await?;
        self.counters.increment(CounterId::CommandsSent);
        Ok(response)
    }
}

/// A write listener that forwards every written value as a command.
pub struct CommandListener {
    channel: Arc<CommandChannel>,
    uuid: ControllerUuid,
}

impl CommandListener {
    /// Creates a listener sending to `uuid`.
    pub fn new(channel: Arc<CommandChannel>, uuid: ControllerUuid) -> Self {
        Self { channel, uuid }
    }
}

#[async_trait]
impl WriteListener for CommandListener {
    async fn on_write(&self, _previous: Option<StateValue>, value: StateValue) -> BridgeResult<()> {
        self.channel
            .send_command(&self.uuid, &value.to_command_action())
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, Endpoint};
    use crate::queue::EventQueue;
    use crate::store::{MemoryStateStore, StateStore};
    use crate::transport::{EventSink, MockTransport};
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    async fn channel(connected: bool) -> (Arc<CommandChannel>, Arc<MockTransport>, Arc<CounterReporter>) {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let counters = Arc::new(CounterReporter::new(store, Duration::from_secs(30)));
        let transport = Arc::new(MockTransport::new());
        let connection = Arc::new(ConnectionState::new());

        if connected {
            let (tx, _rx) = mpsc::unbounded_channel();
            let sink = EventSink::new(
                1,
                Arc::new(EventQueue::new()),
                Arc::clone(&counters),
                Arc::new(Notify::new()),
                tx,
            );
            transport
                .open(&Endpoint::default(), &Credentials::default(), sink)
                .await
                .unwrap();
            connection.set_connected(true);
        }

        let channel = Arc::new(CommandChannel::new(
            Arc::clone(&transport) as Arc<dyn ControllerTransport>,
            Arc::clone(&counters),
            connection,
        ));
        (channel, transport, counters)
    }

    #[tokio::test]
    async fn send_command_counts_and_sends_path() {
        let (channel, transport, counters) = channel(true).await;

        channel
            .send_command(&ControllerUuid::from("0f1e-ab"), "on")
            .await
            .unwrap();
        assert_eq!(transport.sent_paths(), vec!["jdev/sps/io/0f1e-ab/on"]);
        assert_eq!(counters.value(CounterId::CommandsSent), 1);
    }

    #[tokio::test]
    async fn send_command_requires_connection() {
        let (channel, transport, counters) = channel(false).await;

        let err = channel
            .send_command(&ControllerUuid::from("0f1e-ab"), "on")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
        assert!(transport.sent_paths().is_empty());
        assert_eq!(counters.value(CounterId::CommandsSent), 0);
    }

    #[tokio::test]
    async fn failed_send_is_not_counted() {
        let (channel, transport, counters) = channel(true).await;
        transport.fail_path("jdev/sps/io/0f1e-ab/off");

        assert!(channel
            .send_command(&ControllerUuid::from("0f1e-ab"), "off")
            .await
            .is_err());
        assert_eq!(counters.value(CounterId::CommandsSent), 0);
    }

    #[tokio::test]
    async fn listener_renders_value_as_action() {
        let (channel, transport, _counters) = channel(true).await;
        let listener = CommandListener::new(channel, ControllerUuid::from("dim"));

        listener.on_write(None, StateValue::Number(42.0)).await.unwrap();
        listener.on_write(None, StateValue::Bool(true)).await.unwrap();
        assert_eq!(
            transport.sent_paths(),
            vec!["jdev/sps/io/dim/42", "jdev/sps/io/dim/1"]
        );
    }
}
