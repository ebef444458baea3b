//! Ties the wire codec, session state machine, message store, and pipeline
//! together into a runnable client (spec.md's supplement to §4: nothing in
//! the distilled spec names this file, but something has to own the
//! read/decode/dispatch loop). Grounded on the teacher's `FixClient::run`
//! event loop, generalized from gateway-relayed events to owning the
//! transport and codec directly.
//!
//! The session sits logically at the bottom of the pipeline (spec.md
//! §4.3/§4.4) but is held here as a concrete [`SessionProcessor`] rather
//! than inside [`Pipeline`]'s `Vec<Box<dyn Processor>>`: the engine needs
//! typed access to `initiate_logon`/`initiate_logout`/`state` that a
//! type-erased trait object can't expose. [`Pipeline`] holds the
//! application-facing processors (`P0..Pn-2`); the engine composes
//! `wire <-> session <-> pipeline <-> handler` by hand.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::codec::Codec;
use crate::config::Config;
use crate::error::Result;
use crate::message::Message;
use crate::pipeline::Pipeline;
use crate::processor::Processor;
use crate::session::{SessionConfig, SessionProcessor, SessionState};
use crate::store::{Direction, MessageStore};
use crate::transport::{TcpTransport, Transport};

/// The terminal application sink: whatever survives traversal through
/// every pipeline processor lands here (spec.md §4.4's "closest to the
/// application" end).
#[async_trait]
pub trait FixHandler: Send {
    async fn on_message(&mut self, msg: Message) -> Result<()>;

    async fn on_state_change(&mut self, _state: SessionState) {}
}

pub struct Engine {
    transport: Box<dyn Transport>,
    codec: Arc<Codec>,
    session: SessionProcessor,
    session_rx: mpsc::UnboundedReceiver<Message>,
    pipeline: Pipeline,
    store: Arc<dyn MessageStore>,
    connection_name: String,
    read_buf: BytesMut,
}

impl Engine {
    pub fn new(
        config: &Config,
        transport: Box<dyn Transport>,
        store: Arc<dyn MessageStore>,
        app_processors: Vec<Box<dyn Processor>>,
    ) -> Self {
        let codec = Arc::new(Codec::standard());
        let session_config = SessionConfig::from(config);
        let sid_path = Some(config.sid_path());
        let (session, session_rx) =
            SessionProcessor::new(session_config, store.clone(), codec.clone(), sid_path);
        Self {
            transport,
            codec,
            session,
            session_rx,
            pipeline: Pipeline::new(app_processors),
            store,
            connection_name: config.connection_name.clone(),
            read_buf: BytesMut::new(),
        }
    }

    /// Convenience constructor: dials a real TCP connection.
    pub async fn connect(
        config: &Config,
        store: Arc<dyn MessageStore>,
        app_processors: Vec<Box<dyn Processor>>,
    ) -> Result<Self> {
        let transport = TcpTransport::connect(&config.host, config.port).await?;
        Ok(Self::new(config, Box::new(transport), store, app_processors))
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Starts the application pipeline and sends our Logon. Must be called
    /// before [`Engine::run`].
    pub async fn logon(&mut self) -> Result<()> {
        self.pipeline.start().await?;
        let msg = self.session.initiate_logon()?;
        self.send_wire(&msg).await
    }

    /// Initiates an orderly logout (spec.md §6 exit code 0 path).
    pub async fn logout(&mut self, text: Option<&str>) -> Result<()> {
        let msg = self.session.initiate_logout(text)?;
        self.send_wire(&msg).await
    }

    async fn send_wire(&mut self, msg: &Message) -> Result<()> {
        let encoded = self.codec.encode(msg)?;
        let seq = msg.seq_num().unwrap_or(0);
        let sending_time = msg.sending_time().unwrap_or_else(Utc::now);
        self.store
            .put(&self.connection_name, Direction::Sent, seq, encoded.clone(), sending_time)
            .await?;
        self.transport.write(&encoded).await
    }

    /// Sends an application message down through the pipeline, then the
    /// session (which assigns the real sequence number), then the wire.
    pub async fn send(&mut self, msg: Message) -> Result<()> {
        match self.pipeline.dispatch_outbound(msg).await {
            Ok(Some(m)) => match self.session.on_send(m).await? {
                Some(m) => self.send_wire(&m).await,
                None => Ok(()),
            },
            Ok(None) => Ok(()),
            Err(e) => {
                self.pipeline.halt_and_stop().await;
                Err(e)
            }
        }
    }

    /// Flushes every admin message the session queued internally
    /// (heartbeat replies, resend replays, logon/logout acks) straight to
    /// the wire, bypassing the application pipeline.
    async fn drain_session_outbound(&mut self) -> Result<()> {
        while let Ok(msg) = self.session_rx.try_recv() {
            self.send_wire(&msg).await?;
        }
        Ok(())
    }

    async fn drain_decoded(&mut self, handler: &mut dyn FixHandler) -> Result<()> {
        loop {
            match self.codec.try_decode(&self.read_buf) {
                Ok(Some((msg, n))) => {
                    let seq = msg.seq_num().unwrap_or(0);
                    let sending_time = msg.sending_time().unwrap_or_else(Utc::now);
                    let raw = self.read_buf.split_to(n).freeze();
                    self.store
                        .put(&self.connection_name, Direction::Received, seq, raw, sending_time)
                        .await?;

                    match self.session.on_receive(msg).await {
                        Ok(forwarded) => {
                            let mut deliverable: Vec<Message> = forwarded.into_iter().collect();
                            deliverable.extend(self.session.take_ready_inbound());
                            for app_msg in deliverable {
                                match self.pipeline.dispatch_inbound(app_msg).await {
                                    Ok(Some(final_msg)) => handler.on_message(final_msg).await?,
                                    Ok(None) => {}
                                    Err(e) => {
                                        self.pipeline.halt_and_stop().await;
                                        return Err(e);
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            self.drain_session_outbound().await.ok();
                            self.pipeline.halt_and_stop().await;
                            return Err(e);
                        }
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    if let Some(resync_at) = self.codec.resync(&self.read_buf) {
                        warn!(%e, "framing error, resynchronizing to next message boundary");
                        let _ = self.read_buf.split_to(resync_at);
                    } else {
                        self.read_buf.clear();
                        return Err(e);
                    }
                }
            }
        }
    }

    /// The main read/dispatch/tick loop (spec.md §5's cooperative
    /// concurrency model): interleaves transport reads, the heartbeat
    /// ticker, and session-originated admin traffic on a single task, so
    /// inbound and outbound each make independent progress without a
    /// shared lock.
    pub async fn run(&mut self, handler: &mut dyn FixHandler) -> Result<()> {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    if let Err(e) = self.session.on_tick(Utc::now()).await {
                        self.drain_session_outbound().await.ok();
                        self.pipeline.halt_and_stop().await;
                        return Err(e);
                    }
                    self.drain_session_outbound().await?;
                }
                read = self.transport.read() => {
                    match read? {
                        None => {
                            self.pipeline.halt_and_stop().await;
                            return Ok(());
                        }
                        Some(chunk) => {
                            self.read_buf.extend_from_slice(&chunk);
                            self.drain_decoded(handler).await?;
                            self.drain_session_outbound().await?;
                            if self.session.state() == SessionState::Disconnected {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::tags;
    use crate::store::MemoryMessageStore;

    struct RecordingHandler {
        received: Vec<Message>,
    }

    #[async_trait]
    impl FixHandler for RecordingHandler {
        async fn on_message(&mut self, msg: Message) -> Result<()> {
            self.received.push(msg);
            Ok(())
        }
    }

    fn test_config() -> Config {
        Config::parse_toml(
            r#"
                host = "127.0.0.1"
                port = 1
                sender_comp_id = "INITIATOR"
                target_comp_id = "ACCEPTOR"
                connection_name = "engine-test"
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn logon_then_ack_reaches_logged_in_and_forwards_app_message() {
        let config = test_config();
        let store: Arc<dyn MessageStore> = Arc::new(MemoryMessageStore::new());
        let mut engine = Engine::new(&config, Box::new(crate::transport::MockTransport::new(vec![])), store, vec![]);

        engine.logon().await.unwrap();
        assert_eq!(engine.session_state(), crate::session::SessionState::LogonSent);

        let mut ack = Message::logon("FIX.4.4", "ACCEPTOR", "INITIATOR", 30, false, None, None).unwrap();
        ack.set_seq_num(1).unwrap();
        let encoded = engine.codec.encode(&ack).unwrap();
        engine.read_buf.extend_from_slice(&encoded);

        let mut handler = RecordingHandler { received: Vec::new() };
        engine.drain_decoded(&mut handler).await.unwrap();
        assert_eq!(engine.session_state(), crate::session::SessionState::LoggedIn);
        assert!(handler.received.is_empty());

        let mut app = Message::new("FIX.4.4", crate::fieldmap::FieldMap::dict());
        app.set(tags::MSG_TYPE, "D").unwrap();
        app.set_seq_num(2).unwrap();
        let encoded_app = engine.codec.encode(&app).unwrap();
        engine.read_buf.extend_from_slice(&encoded_app);
        engine.drain_decoded(&mut handler).await.unwrap();
        assert_eq!(handler.received.len(), 1);
    }
}
