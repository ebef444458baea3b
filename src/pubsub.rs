//! The pub/sub broker interface (spec.md §6): two logical channels, an
//! outbound broadcast of everything the engine forwards to the
//! application and an inbound inject point a subscriber can use to submit
//! a message as if it came from the application. The broker itself is an
//! external collaborator; this module is the plumbing plus the envelope
//! shared with `admin.rs`.

use tokio::sync::{broadcast, mpsc};

use crate::admin::AdminEnvelope;
use crate::dictionary::GroupRegistry;
use crate::error::{FixError, Result};
use crate::message::Message;

/// Default outbound broadcast capacity. A slow subscriber that falls this
/// far behind starts missing messages (`broadcast::error::RecvError::Lagged`);
/// spec.md names no backpressure contract for pub/sub, so this crate does
/// not attempt to enforce one.
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Publishes forwarded application messages; subscribers each get their
/// own `Receiver`.
pub struct OutboundBroker {
    tx: broadcast::Sender<AdminEnvelope>,
}

impl OutboundBroker {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdminEnvelope> {
        self.tx.subscribe()
    }

    /// Publishes `msg`. Silently a no-op if there are currently no
    /// subscribers (`broadcast::Sender::send` errors in that case, which is
    /// not a failure worth propagating).
    pub fn publish(&self, msg: &Message) {
        let _ = self.tx.send(AdminEnvelope::from_message(msg));
    }
}

impl Default for OutboundBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Inbound inject channel: a subscriber submits an envelope here, it is
/// decoded and handed to the engine as an application-originated send.
pub struct InboundInjector {
    tx: mpsc::UnboundedSender<AdminEnvelope>,
}

pub struct InboundInjectorHandle {
    rx: mpsc::UnboundedReceiver<AdminEnvelope>,
    begin_string: String,
    registry: GroupRegistry,
}

impl InboundInjector {
    pub fn new(begin_string: impl Into<String>, registry: GroupRegistry) -> (Self, InboundInjectorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { tx },
            InboundInjectorHandle {
                rx,
                begin_string: begin_string.into(),
                registry,
            },
        )
    }

    pub fn inject(&self, envelope: AdminEnvelope) -> Result<()> {
        self.tx.send(envelope).map_err(|_| FixError::ChannelClosed)
    }
}

impl InboundInjectorHandle {
    /// Awaits the next injected envelope and decodes it into a [`Message`]
    /// ready for [`crate::client::Engine::send`].
    pub async fn recv(&mut self) -> Option<Result<Message>> {
        let envelope = self.rx.recv().await?;
        Some(envelope.into_message(self.begin_string.clone(), &self.registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::tags;
    use crate::fieldmap::FieldMap;

    #[tokio::test]
    async fn outbound_broker_fans_out_to_subscribers() {
        let broker = OutboundBroker::new();
        let mut sub1 = broker.subscribe();
        let mut sub2 = broker.subscribe();

        let mut msg = Message::new("FIX.4.4", FieldMap::list());
        msg.set(tags::MSG_TYPE, "D").unwrap();
        broker.publish(&msg);

        assert_eq!(sub1.recv().await.unwrap().msg_type, "D");
        assert_eq!(sub2.recv().await.unwrap().msg_type, "D");
    }

    #[tokio::test]
    async fn inbound_injector_round_trips_an_envelope() {
        let (injector, mut handle) = InboundInjector::new("FIX.4.4", GroupRegistry::standard());
        let mut msg = Message::new("FIX.4.4", FieldMap::list());
        msg.set(tags::MSG_TYPE, "D").unwrap();
        msg.set(tags::CL_ORD_ID, "ORD1").unwrap();

        injector.inject(AdminEnvelope::from_message(&msg)).unwrap();
        let decoded = handle.recv().await.unwrap().unwrap();
        assert_eq!(decoded.get(tags::CL_ORD_ID).unwrap(), "ORD1");
    }
}
