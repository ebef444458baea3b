//! The session state machine (spec.md §4.3): sequence numbers, heartbeats,
//! logon/logout, and resend/gap-fill recovery. Implemented as the
//! wire-facing [`Processor`] at the bottom of the pipeline — it owns the
//! administrative message set (Logon/Logout/Heartbeat/TestRequest/
//! ResendRequest/SequenceReset/Reject) and only forwards application
//! messages on up. Session-generated admin traffic (heartbeat replies,
//! resend replays, the logon/logout it sends itself) does not re-enter the
//! pipeline from the top; it is pushed onto an internal channel the engine
//! drains directly to the wire, alongside transport reads.
//!
//! Grounded on the teacher's `session.rs` handle/config split, generalized
//! from a thin Aeron-backed actor handle into the full state machine
//! spec.md §4.3 names, and on `ext-sakamoro-ALICE-FIX`'s
//! `FixSession`/`SessionState` shape for the sequence-number bookkeeping.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::dictionary::{tags, MsgType};
use crate::error::{FixError, Result};
use crate::message::Message;
use crate::processor::Processor;
use crate::store::{Direction, MessageStore};

/// spec.md §4.3: `Disconnected -> Connecting -> LogonSent -> LoggedIn`, with
/// `Resending` a sub-state of being logged in while a gap is being filled,
/// `LogoutSent` on the way back out, and `Errored` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    LogonSent,
    LoggedIn,
    Resending,
    LogoutSent,
    Errored,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub begin_string: String,
    pub sender_comp_id: String,
    pub target_comp_id: String,
    pub heartbeat_interval_secs: u32,
    pub reset_on_logon: bool,
    pub connection_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl From<&crate::config::Config> for SessionConfig {
    fn from(cfg: &crate::config::Config) -> Self {
        Self {
            begin_string: cfg.begin_string.clone(),
            sender_comp_id: cfg.sender_comp_id.clone(),
            target_comp_id: cfg.target_comp_id.clone(),
            heartbeat_interval_secs: cfg.heartbeat_interval,
            reset_on_logon: cfg.reset_on_logon,
            connection_name: cfg.connection_name.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        }
    }
}

/// Fraction of `heartbeat_interval` tolerated beyond the interval itself
/// before liveness action is taken (spec.md §4.3's 20% grace period).
const GRACE_FRACTION: f64 = 0.2;

enum SeqOutcome {
    InOrder,
    Duplicate,
    Gap,
}

/// The [`Processor`] implementation. Sits at the bottom of the pipeline
/// (closest to the wire).
pub struct SessionProcessor {
    config: SessionConfig,
    store: Arc<dyn MessageStore>,
    codec: Arc<Codec>,
    sid_path: Option<PathBuf>,
    state: SessionState,
    next_send_seq: u32,
    next_expect_seq: u32,
    last_send: DateTime<Utc>,
    last_recv: DateTime<Utc>,
    test_request_outstanding: Option<String>,
    resend_target: Option<u32>,
    /// Higher-numbered messages received while a gap is open, keyed by their
    /// MsgSeqNum (spec.md §4.3: "queues the higher-numbered messages").
    pending_inbound: BTreeMap<u32, Message>,
    /// Buffered messages that became deliverable once the gap closed, drained
    /// by the engine via [`SessionProcessor::take_ready_inbound`].
    ready_inbound: Vec<Message>,
    out_tx: mpsc::UnboundedSender<Message>,
}

impl SessionProcessor {
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn MessageStore>,
        codec: Arc<Codec>,
        sid_path: Option<PathBuf>,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let now = Utc::now();
        (
            Self {
                config,
                store,
                codec,
                sid_path,
                state: SessionState::Disconnected,
                next_send_seq: 1,
                next_expect_seq: 1,
                last_send: now,
                last_recv: now,
                test_request_outstanding: None,
                resend_target: None,
                pending_inbound: BTreeMap::new(),
                ready_inbound: Vec::new(),
                out_tx,
            },
            out_rx,
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drains application messages that arrived out of order during a gap
    /// and have since become deliverable (spec.md §4.3's gap-closure
    /// invariant). Call after [`Processor::on_receive`] alongside its
    /// direct return value.
    pub fn take_ready_inbound(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.ready_inbound)
    }

    pub fn next_send_seq(&self) -> u32 {
        self.next_send_seq
    }

    pub fn next_expect_seq(&self) -> u32 {
        self.next_expect_seq
    }

    fn emit(&self, msg: Message) {
        if self.out_tx.send(msg).is_err() {
            warn!("session outbound channel closed, dropping admin message");
        }
    }

    fn assign_outbound_headers(&mut self, mut msg: Message) -> Result<Message> {
        msg.set(tags::SENDER_COMP_ID, self.config.sender_comp_id.clone())?;
        msg.set(tags::TARGET_COMP_ID, self.config.target_comp_id.clone())?;
        msg.set_seq_num(self.next_send_seq)?;
        self.next_send_seq += 1;
        msg.set_sending_time(Utc::now())?;
        self.last_send = Utc::now();
        Ok(msg)
    }

    /// Reads persisted sequence state (spec.md §4.3 "sid-file session
    /// identity persistence"): if the sid file's recorded identity no
    /// longer matches this session's (sender, target) pair, the store is
    /// wiped and sequence numbers restart at 1; otherwise they resume from
    /// wherever the store left off.
    async fn restore_sequence_state(&mut self) -> Result<()> {
        let identity = format!("{}-{}", self.config.sender_comp_id, self.config.target_comp_id);
        let resume = match &self.sid_path {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(existing) if existing.trim() == identity => true,
                _ => {
                    self.store.reset(&self.config.connection_name, Direction::Sent).await?;
                    self.store.reset(&self.config.connection_name, Direction::Received).await?;
                    tokio::fs::write(path, &identity)
                        .await
                        .map_err(|e| FixError::Store(e.to_string()))?;
                    false
                }
            },
            None => true,
        };
        if resume {
            let sent = self.store.get_current_seq(&self.config.connection_name, Direction::Sent).await?;
            let received = self
                .store
                .get_current_seq(&self.config.connection_name, Direction::Received)
                .await?;
            self.next_send_seq = sent + 1;
            self.next_expect_seq = received + 1;
        } else {
            self.next_send_seq = 1;
            self.next_expect_seq = 1;
        }
        Ok(())
    }

    /// Builds and sends our own Logon, moving to `LogonSent`. Called by the
    /// engine before the pipeline starts normal message traversal.
    pub fn initiate_logon(&mut self) -> Result<Message> {
        if self.config.reset_on_logon {
            self.next_send_seq = 1;
            self.next_expect_seq = 1;
        }
        let msg = Message::logon(
            self.config.begin_string.clone(),
            &self.config.sender_comp_id,
            &self.config.target_comp_id,
            self.config.heartbeat_interval_secs,
            self.config.reset_on_logon,
            self.config.username.as_deref(),
            self.config.password.as_deref(),
        )?;
        let msg = self.assign_outbound_headers(msg)?;
        self.state = SessionState::LogonSent;
        Ok(msg)
    }

    /// Builds our own Logout, moving to `LogoutSent`. Called by the engine
    /// on an orderly user-requested shutdown.
    pub fn initiate_logout(&mut self, text: Option<&str>) -> Result<Message> {
        let msg = Message::logout(
            self.config.begin_string.clone(),
            &self.config.sender_comp_id,
            &self.config.target_comp_id,
            text,
        )?;
        let msg = self.assign_outbound_headers(msg)?;
        self.state = SessionState::LogoutSent;
        Ok(msg)
    }

    fn check_sequence(&mut self, seq_num: u32, poss_dup: bool) -> Result<SeqOutcome> {
        use std::cmp::Ordering;
        match seq_num.cmp(&self.next_expect_seq) {
            Ordering::Equal => Ok(SeqOutcome::InOrder),
            Ordering::Less => {
                if poss_dup {
                    Ok(SeqOutcome::Duplicate)
                } else {
                    self.state = SessionState::Errored;
                    Err(FixError::Sequence {
                        reason: "MsgSeqNum lower than expected without PossDupFlag".to_string(),
                        expected: self.next_expect_seq,
                        received: seq_num,
                    })
                }
            }
            Ordering::Greater => Ok(SeqOutcome::Gap),
        }
    }

    fn begin_resend(&mut self, gap_trigger_seq: u32) -> Result<()> {
        let req = Message::resend_request(
            self.config.begin_string.clone(),
            &self.config.sender_comp_id,
            &self.config.target_comp_id,
            self.next_expect_seq,
            gap_trigger_seq.saturating_sub(1),
        )?;
        let req = self.assign_outbound_headers(req)?;
        self.emit(req);
        self.state = SessionState::Resending;
        self.resend_target = Some(gap_trigger_seq);
        Ok(())
    }

    async fn handle_logon(&mut self, msg: &Message) -> Result<()> {
        match self.state {
            SessionState::LogonSent => {
                self.state = SessionState::LoggedIn;
                info!(target = %self.config.connection_name, "logon acknowledged");
            }
            SessionState::Disconnected | SessionState::Connecting => {
                let reset = msg
                    .get(tags::RESET_SEQ_NUM_FLAG)
                    .and_then(|f| f.as_bool().ok().flatten())
                    .unwrap_or(false);
                if reset {
                    self.next_send_seq = 1;
                }
                let reply = Message::logon(
                    self.config.begin_string.clone(),
                    &self.config.sender_comp_id,
                    &self.config.target_comp_id,
                    self.config.heartbeat_interval_secs,
                    reset,
                    self.config.username.as_deref(),
                    self.config.password.as_deref(),
                )?;
                let reply = self.assign_outbound_headers(reply)?;
                self.emit(reply);
                self.state = SessionState::LoggedIn;
                info!(target = %self.config.connection_name, "accepted counterparty logon");
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_logout(&mut self, _msg: &Message) -> Result<()> {
        match self.state {
            SessionState::LogoutSent => {
                self.state = SessionState::Disconnected;
            }
            _ => {
                let reply = Message::logout(
                    self.config.begin_string.clone(),
                    &self.config.sender_comp_id,
                    &self.config.target_comp_id,
                    None,
                )?;
                let reply = self.assign_outbound_headers(reply)?;
                self.emit(reply);
                self.state = SessionState::Disconnected;
            }
        }
        Ok(())
    }

    fn handle_heartbeat(&mut self, msg: &Message) {
        if let Some(outstanding) = &self.test_request_outstanding {
            if let Some(id) = msg.get(tags::TEST_REQ_ID).and_then(|f| f.as_str().ok()) {
                if outstanding == id {
                    self.test_request_outstanding = None;
                }
            }
        }
    }

    fn handle_test_request(&mut self, msg: &Message) -> Result<()> {
        let id = msg
            .get(tags::TEST_REQ_ID)
            .and_then(|f| f.as_str().ok())
            .unwrap_or("")
            .to_string();
        let reply = Message::heartbeat(
            self.config.begin_string.clone(),
            &self.config.sender_comp_id,
            &self.config.target_comp_id,
            Some(&id),
        )?;
        let reply = self.assign_outbound_headers(reply)?;
        self.emit(reply);
        Ok(())
    }

    fn handle_sequence_reset(&mut self, msg: &Message) -> Result<()> {
        let new_seq_no = msg
            .get(tags::NEW_SEQ_NO)
            .and_then(|f| f.as_int().ok().flatten())
            .ok_or_else(|| FixError::Protocol {
                reason: "SequenceReset missing NewSeqNo".to_string(),
                ref_seq_num: msg.seq_num(),
                ref_tag_id: Some(tags::NEW_SEQ_NO),
            })? as u32;
        let gap_fill = msg
            .get(tags::GAP_FILL_FLAG)
            .and_then(|f| f.as_bool().ok().flatten())
            .unwrap_or(false);
        if gap_fill {
            if new_seq_no < self.next_expect_seq {
                return Err(FixError::Sequence {
                    reason: "gap-fill NewSeqNo is less than the current expectation".to_string(),
                    expected: self.next_expect_seq,
                    received: new_seq_no,
                });
            }
            self.next_expect_seq = new_seq_no;
        } else if new_seq_no > self.next_expect_seq {
            // Reset mode only ever advances next_expect_seq (spec.md §4.3); a
            // NewSeqNo at or below the current expectation is not an error,
            // just a no-op.
            self.next_expect_seq = new_seq_no;
        }
        self.purge_stale_pending();
        if self.state == SessionState::Resending {
            if let Some(target) = self.resend_target {
                if self.next_expect_seq > target {
                    self.state = SessionState::LoggedIn;
                    self.resend_target = None;
                }
            }
        }
        Ok(())
    }

    /// Replays our own previously sent messages in `[begin, end]`
    /// (`end == 0` meaning "through whatever we've sent so far"), marking
    /// each with `PossDupFlag=Y` and `OrigSendingTime`. Runs of
    /// administrative messages (which are not meaningfully replayable) are
    /// collapsed into a single gap-fill `SequenceReset` each, rather than
    /// resent one by one (spec.md §4.3).
    async fn handle_resend_request(&mut self, msg: &Message) -> Result<()> {
        let begin = msg
            .get(tags::BEGIN_SEQ_NO)
            .and_then(|f| f.as_int().ok().flatten())
            .ok_or_else(|| FixError::Protocol {
                reason: "ResendRequest missing BeginSeqNo".to_string(),
                ref_seq_num: msg.seq_num(),
                ref_tag_id: Some(tags::BEGIN_SEQ_NO),
            })? as u32;
        let end_raw = msg
            .get(tags::END_SEQ_NO)
            .and_then(|f| f.as_int().ok().flatten())
            .unwrap_or(0) as u32;
        let end = if end_raw == 0 {
            self.next_send_seq.saturating_sub(1)
        } else {
            end_raw
        };
        if begin > end {
            return Ok(());
        }

        let records = self
            .store
            .range(&self.config.connection_name, Direction::Sent, begin, end)
            .await?;

        if records.is_empty() {
            self.emit_gap_fill(begin, self.next_send_seq)?;
            return Ok(());
        }

        let mut gap_start: Option<u32> = None;
        for record in &records {
            let decoded = self.codec.try_decode(&record.raw)?;
            let is_admin = match &decoded {
                Some((decoded_msg, _)) => decoded_msg
                    .msg_type()
                    .map(|mt| MsgType::from(mt).is_admin())
                    .unwrap_or(false),
                None => false,
            };
            if is_admin {
                gap_start.get_or_insert(record.seq_num);
                continue;
            }
            if let Some(start) = gap_start.take() {
                self.emit_gap_fill(start, record.seq_num)?;
            }
            if let Some((mut replay, _)) = decoded {
                replay.set(tags::POSS_DUP_FLAG, "Y")?;
                replay.set(tags::ORIG_SENDING_TIME, crate::message::format_timestamp(record.sending_time))?;
                self.emit(replay);
            }
        }
        if let Some(start) = gap_start {
            self.emit_gap_fill(start, end + 1)?;
        }
        Ok(())
    }

    fn emit_gap_fill(&mut self, begin_seq: u32, new_seq_no: u32) -> Result<()> {
        let mut reset = Message::sequence_reset(
            self.config.begin_string.clone(),
            &self.config.sender_comp_id,
            &self.config.target_comp_id,
            true,
            new_seq_no,
        )?;
        reset.set(tags::SENDER_COMP_ID, self.config.sender_comp_id.clone())?;
        reset.set(tags::TARGET_COMP_ID, self.config.target_comp_id.clone())?;
        reset.set_seq_num(begin_seq)?;
        reset.set_sending_time(Utc::now())?;
        self.emit(reset);
        Ok(())
    }

    /// Drops any buffered out-of-order messages a jump in `next_expect_seq`
    /// has subsumed (e.g. a gap-fill `SequenceReset` that skips straight
    /// past a buffered message's own sequence number).
    fn purge_stale_pending(&mut self) {
        let next = self.next_expect_seq;
        self.pending_inbound.retain(|&seq, _| seq >= next);
    }

    /// Delivers buffered messages whose MsgSeqNum is now contiguous with
    /// `next_expect_seq`, in order, same as spec.md §4.3 requires once a gap
    /// closes. Runs after every admin dispatch in [`SessionProcessor::
    /// on_receive`] since any of them (resend replay, gap-fill
    /// SequenceReset) may have just advanced `next_expect_seq`.
    async fn drain_ready_pending(&mut self) -> Result<()> {
        while let Some(msg) = self.pending_inbound.remove(&self.next_expect_seq) {
            self.next_expect_seq += 1;
            if self.state == SessionState::Resending {
                if let Some(target) = self.resend_target {
                    if self.next_expect_seq > target {
                        self.state = SessionState::LoggedIn;
                        self.resend_target = None;
                    }
                }
            }

            let msg_type_str = msg.msg_type().ok_or_else(|| FixError::Protocol {
                reason: "message has no MsgType".to_string(),
                ref_seq_num: msg.seq_num(),
                ref_tag_id: Some(tags::MSG_TYPE),
            })?;
            let msg_type = MsgType::from(msg_type_str);
            match msg_type {
                MsgType::Logon => self.handle_logon(&msg).await?,
                MsgType::Logout => self.handle_logout(&msg)?,
                MsgType::Heartbeat => self.handle_heartbeat(&msg),
                MsgType::TestRequest => self.handle_test_request(&msg)?,
                MsgType::ResendRequest => self.handle_resend_request(&msg).await?,
                MsgType::SequenceReset => self.handle_sequence_reset(&msg)?,
                MsgType::Reject => warn!(seq_num = msg.seq_num().unwrap_or(0), "received Reject from counterparty"),
                _ => {}
            }

            if !msg_type.is_admin() {
                self.ready_inbound.push(msg);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for SessionProcessor {
    fn name(&self) -> &str {
        "session"
    }

    async fn start(&mut self) -> Result<()> {
        self.restore_sequence_state().await
    }

    async fn stop(&mut self) -> Result<()> {
        if matches!(self.state, SessionState::LoggedIn | SessionState::Resending) {
            let logout = Message::logout(
                self.config.begin_string.clone(),
                &self.config.sender_comp_id,
                &self.config.target_comp_id,
                None,
            )?;
            let logout = self.assign_outbound_headers(logout)?;
            self.emit(logout);
            self.state = SessionState::LogoutSent;
        }
        Ok(())
    }

    async fn on_receive(&mut self, msg: Message) -> Result<Option<Message>> {
        self.last_recv = Utc::now();
        let msg_type_str = msg.msg_type().ok_or_else(|| FixError::Protocol {
            reason: "message has no MsgType".to_string(),
            ref_seq_num: msg.seq_num(),
            ref_tag_id: Some(tags::MSG_TYPE),
        })?;
        let msg_type = MsgType::from(msg_type_str);
        let seq_num = msg.seq_num().ok_or_else(|| FixError::Protocol {
            reason: "message has no MsgSeqNum".to_string(),
            ref_seq_num: None,
            ref_tag_id: Some(tags::MSG_SEQ_NUM),
        })?;
        let poss_dup = msg.poss_dup_flag();

        let is_reset_logon = msg_type == MsgType::Logon
            && msg
                .get(tags::RESET_SEQ_NUM_FLAG)
                .and_then(|f| f.as_bool().ok().flatten())
                .unwrap_or(false);

        if is_reset_logon {
            self.next_expect_seq = seq_num + 1;
            self.purge_stale_pending();
        } else {
            match self.check_sequence(seq_num, poss_dup)? {
                SeqOutcome::Duplicate => {
                    debug!(seq_num, "ignoring duplicate message");
                    return Ok(None);
                }
                SeqOutcome::Gap => {
                    warn!(expected = self.next_expect_seq, received = seq_num, "sequence gap detected");
                    self.begin_resend(seq_num)?;
                    self.pending_inbound.insert(seq_num, msg);
                    return Ok(None);
                }
                SeqOutcome::InOrder => {
                    self.next_expect_seq = seq_num + 1;
                    if self.state == SessionState::Resending {
                        if let Some(target) = self.resend_target {
                            if self.next_expect_seq > target {
                                self.state = SessionState::LoggedIn;
                                self.resend_target = None;
                            }
                        }
                    }
                }
            }
        }

        match msg_type {
            MsgType::Logon => self.handle_logon(&msg).await?,
            MsgType::Logout => self.handle_logout(&msg)?,
            MsgType::Heartbeat => self.handle_heartbeat(&msg),
            MsgType::TestRequest => self.handle_test_request(&msg)?,
            MsgType::ResendRequest => self.handle_resend_request(&msg).await?,
            MsgType::SequenceReset => self.handle_sequence_reset(&msg)?,
            MsgType::Reject => warn!(seq_num, "received Reject from counterparty"),
            _ => {}
        }

        self.drain_ready_pending().await?;

        if msg_type.is_admin() {
            Ok(None)
        } else {
            Ok(Some(msg))
        }
    }

    async fn on_send(&mut self, msg: Message) -> Result<Option<Message>> {
        let msg = self.assign_outbound_headers(msg)?;
        Ok(Some(msg))
    }

    async fn on_tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.state != SessionState::LoggedIn && self.state != SessionState::Resending {
            return Ok(());
        }
        let interval = chrono::Duration::seconds(self.config.heartbeat_interval_secs as i64);
        let grace = chrono::Duration::milliseconds(
            (self.config.heartbeat_interval_secs as f64 * 1000.0 * GRACE_FRACTION) as i64,
        );

        if now - self.last_send >= interval {
            let hb = Message::heartbeat(
                self.config.begin_string.clone(),
                &self.config.sender_comp_id,
                &self.config.target_comp_id,
                None,
            )?;
            let hb = self.assign_outbound_headers(hb)?;
            self.emit(hb);
        }

        let silence = now - self.last_recv;
        if self.test_request_outstanding.is_none() {
            if silence >= interval + grace {
                let id = uuid::Uuid::new_v4().to_string();
                let req = Message::test_request(
                    self.config.begin_string.clone(),
                    &self.config.sender_comp_id,
                    &self.config.target_comp_id,
                    &id,
                )?;
                let req = self.assign_outbound_headers(req)?;
                self.emit(req);
                self.test_request_outstanding = Some(id);
            }
        } else if silence >= interval + grace + grace {
            let logout = Message::logout(
                self.config.begin_string.clone(),
                &self.config.sender_comp_id,
                &self.config.target_comp_id,
                Some("no response to TestRequest"),
            )?;
            let logout = self.assign_outbound_headers(logout)?;
            self.emit(logout);
            self.state = SessionState::Errored;
            return Err(FixError::Timeout {
                kind: "test_request",
                elapsed_ms: silence.num_milliseconds().max(0) as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMessageStore;

    fn config() -> SessionConfig {
        SessionConfig {
            begin_string: "FIX.4.4".to_string(),
            sender_comp_id: "INITIATOR".to_string(),
            target_comp_id: "ACCEPTOR".to_string(),
            heartbeat_interval_secs: 30,
            reset_on_logon: false,
            connection_name: "demo".to_string(),
            username: None,
            password: None,
        }
    }

    fn session() -> (SessionProcessor, mpsc::UnboundedReceiver<Message>) {
        SessionProcessor::new(
            config(),
            Arc::new(MemoryMessageStore::new()),
            Arc::new(Codec::standard()),
            None,
        )
    }

    #[tokio::test]
    async fn clean_logon_transitions_to_logged_in() {
        let (mut session, _rx) = session();
        session.start().await.unwrap();
        let logon = session.initiate_logon().unwrap();
        assert_eq!(session.state(), SessionState::LogonSent);

        let mut ack = Message::logon("FIX.4.4", "ACCEPTOR", "INITIATOR", 30, false, None, None).unwrap();
        ack.set_seq_num(logon.seq_num().unwrap()).unwrap();
        let forwarded = session.on_receive(ack).await.unwrap();
        assert!(forwarded.is_none());
        assert_eq!(session.state(), SessionState::LoggedIn);
    }

    #[tokio::test]
    async fn gap_detected_triggers_resend_request() {
        let (mut session, mut rx) = session();
        session.start().await.unwrap();
        session.initiate_logon().unwrap();
        let mut ack = Message::logon("FIX.4.4", "ACCEPTOR", "INITIATOR", 30, false, None, None).unwrap();
        ack.set_seq_num(1).unwrap();
        session.on_receive(ack).await.unwrap();

        let mut gapped = Message::heartbeat("FIX.4.4", "ACCEPTOR", "INITIATOR", None).unwrap();
        gapped.set_seq_num(5).unwrap();
        let forwarded = session.on_receive(gapped).await.unwrap();
        assert!(forwarded.is_none());
        assert_eq!(session.state(), SessionState::Resending);

        let resend_req = rx.try_recv().unwrap();
        assert_eq!(resend_req.msg_type(), Some(MsgType::ResendRequest.as_str()));
        assert_eq!(resend_req.get(tags::BEGIN_SEQ_NO).unwrap(), 2i64);
    }

    #[tokio::test]
    async fn duplicate_with_poss_dup_is_ignored_silently() {
        let (mut session, _rx) = session();
        session.start().await.unwrap();
        session.initiate_logon().unwrap();
        let mut ack = Message::logon("FIX.4.4", "ACCEPTOR", "INITIATOR", 30, false, None, None).unwrap();
        ack.set_seq_num(1).unwrap();
        session.on_receive(ack).await.unwrap();

        let mut dup = Message::heartbeat("FIX.4.4", "ACCEPTOR", "INITIATOR", None).unwrap();
        dup.set_seq_num(1).unwrap();
        dup.set(tags::POSS_DUP_FLAG, "Y").unwrap();
        let forwarded = session.on_receive(dup).await.unwrap();
        assert!(forwarded.is_none());
        assert_eq!(session.state(), SessionState::LoggedIn);
        assert_eq!(session.next_expect_seq(), 2);
    }

    #[tokio::test]
    async fn fatal_low_seq_without_poss_dup_errors_out() {
        let (mut session, _rx) = session();
        session.start().await.unwrap();
        session.initiate_logon().unwrap();
        let mut ack = Message::logon("FIX.4.4", "ACCEPTOR", "INITIATOR", 30, false, None, None).unwrap();
        ack.set_seq_num(1).unwrap();
        session.on_receive(ack).await.unwrap();

        let mut low = Message::heartbeat("FIX.4.4", "ACCEPTOR", "INITIATOR", None).unwrap();
        low.set_seq_num(1).unwrap();
        let err = session.on_receive(low).await.unwrap_err();
        assert!(matches!(err, FixError::Sequence { .. }));
        assert_eq!(session.state(), SessionState::Errored);
    }

    #[tokio::test]
    async fn gap_fill_closes_resend_and_returns_to_logged_in() {
        let (mut session, mut rx) = session();
        session.start().await.unwrap();
        session.initiate_logon().unwrap();
        let mut ack = Message::logon("FIX.4.4", "ACCEPTOR", "INITIATOR", 30, false, None, None).unwrap();
        ack.set_seq_num(1).unwrap();
        session.on_receive(ack).await.unwrap();

        let mut gapped = Message::heartbeat("FIX.4.4", "ACCEPTOR", "INITIATOR", None).unwrap();
        gapped.set_seq_num(5).unwrap();
        session.on_receive(gapped).await.unwrap();
        rx.try_recv().unwrap(); // drain the ResendRequest we just sent

        let mut fill = Message::sequence_reset("FIX.4.4", "ACCEPTOR", "INITIATOR", true, 6).unwrap();
        fill.set_seq_num(2).unwrap();
        let forwarded = session.on_receive(fill).await.unwrap();
        assert!(forwarded.is_none());
        assert_eq!(session.state(), SessionState::LoggedIn);
        assert_eq!(session.next_expect_seq(), 6);
    }

    #[tokio::test]
    async fn resend_request_replays_stored_sent_messages_with_poss_dup() {
        let store = Arc::new(MemoryMessageStore::new());
        let codec = Arc::new(Codec::standard());
        let (mut session, mut rx) = SessionProcessor::new(config(), store.clone(), codec.clone(), None);
        session.start().await.unwrap();
        session.initiate_logon().unwrap();
        let mut ack = Message::logon("FIX.4.4", "ACCEPTOR", "INITIATOR", 30, false, None, None).unwrap();
        ack.set_seq_num(1).unwrap();
        session.on_receive(ack).await.unwrap();

        let mut app_msg = Message::new("FIX.4.4", crate::fieldmap::FieldMap::dict());
        app_msg.set(tags::MSG_TYPE, "D").unwrap();
        app_msg.set(tags::SENDER_COMP_ID, "INITIATOR").unwrap();
        app_msg.set(tags::TARGET_COMP_ID, "ACCEPTOR").unwrap();
        let mut app_msg = session.on_send(app_msg).await.unwrap().unwrap();
        app_msg.set_seq_num(2).unwrap();
        let encoded = codec.encode(&app_msg).unwrap();
        store
            .put("demo", Direction::Sent, 2, encoded, Utc::now())
            .await
            .unwrap();

        let mut resend_req = Message::resend_request("FIX.4.4", "ACCEPTOR", "INITIATOR", 2, 2).unwrap();
        resend_req.set_seq_num(2).unwrap();
        session.on_receive(resend_req).await.unwrap();

        let replayed = rx.try_recv().unwrap();
        assert!(replayed.poss_dup_flag());
        assert!(replayed.get(tags::ORIG_SENDING_TIME).is_some());
    }

    #[tokio::test]
    async fn heartbeat_timeout_without_test_request_reply_errors_session() {
        let (mut session, mut rx) = session();
        session.start().await.unwrap();
        session.initiate_logon().unwrap();
        let mut ack = Message::logon("FIX.4.4", "ACCEPTOR", "INITIATOR", 30, false, None, None).unwrap();
        ack.set_seq_num(1).unwrap();
        session.on_receive(ack).await.unwrap();

        let far_future = Utc::now() + chrono::Duration::seconds(120);
        session.on_tick(far_future).await.unwrap();
        let test_req = rx.try_recv().unwrap();
        assert_eq!(test_req.msg_type(), Some(MsgType::TestRequest.as_str()));

        let even_later = far_future + chrono::Duration::seconds(60);
        let err = session.on_tick(even_later).await.unwrap_err();
        assert!(matches!(err, FixError::Timeout { .. }));
        assert_eq!(session.state(), SessionState::Errored);
    }
}
