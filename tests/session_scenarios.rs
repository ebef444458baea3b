//! End-to-end session scenarios (spec.md §8), driven entirely through the
//! public crate API rather than `session.rs`'s own white-box unit tests.

use std::sync::Arc;

use chrono::Utc;

use fixg::codec::Codec;
use fixg::dictionary::{tags, MsgType};
use fixg::message::Message;
use fixg::processor::Processor;
use fixg::store::{Direction, MemoryMessageStore};
use fixg::{SessionConfig, SessionProcessor, SessionState};

fn session_config() -> SessionConfig {
    SessionConfig {
        begin_string: "FIX.4.4".to_string(),
        sender_comp_id: "INITIATOR".to_string(),
        target_comp_id: "ACCEPTOR".to_string(),
        heartbeat_interval_secs: 30,
        reset_on_logon: false,
        connection_name: "scenario".to_string(),
        username: Some("u".to_string()),
        password: Some("p".to_string()),
    }
}

fn ack(seq: u32) -> Message {
    let mut m = Message::logon("FIX.4.4", "ACCEPTOR", "INITIATOR", 30, false, None, None).unwrap();
    m.set_seq_num(seq).unwrap();
    m
}

#[tokio::test]
async fn scenario_1_clean_logon_reaches_logged_in() {
    let store = Arc::new(MemoryMessageStore::new());
    let codec = Arc::new(Codec::standard());
    let (mut session, _rx) = SessionProcessor::new(session_config(), store, codec, None);
    session.start().await.unwrap();

    let logon = session.initiate_logon().unwrap();
    assert_eq!(logon.seq_num(), Some(1));
    assert_eq!(session.state(), SessionState::LogonSent);

    let forwarded = session.on_receive(ack(1)).await.unwrap();
    assert!(forwarded.is_none());
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert_eq!(session.next_expect_seq(), 2);
    assert_eq!(session.next_send_seq(), 2);
}

#[tokio::test]
async fn scenario_2_gap_detected_triggers_resend_and_gap_fill_advances_expectation() {
    let store = Arc::new(MemoryMessageStore::new());
    let codec = Arc::new(Codec::standard());
    let (mut session, mut rx) = SessionProcessor::new(session_config(), store, codec, None);
    session.start().await.unwrap();
    session.initiate_logon().unwrap();
    session.on_receive(ack(1)).await.unwrap();

    let mut gapped = Message::heartbeat("FIX.4.4", "ACCEPTOR", "INITIATOR", None).unwrap();
    gapped.set_seq_num(5).unwrap();
    let forwarded = session.on_receive(gapped).await.unwrap();
    assert!(forwarded.is_none());
    assert_eq!(session.state(), SessionState::Resending);

    let resend_req = rx.try_recv().unwrap();
    assert_eq!(resend_req.msg_type(), Some(MsgType::ResendRequest.as_str()));
    assert_eq!(resend_req.get(tags::BEGIN_SEQ_NO).unwrap(), 2i64);
    assert_eq!(resend_req.get(tags::END_SEQ_NO).unwrap(), 4i64);

    let mut fill = Message::sequence_reset("FIX.4.4", "ACCEPTOR", "INITIATOR", true, 6).unwrap();
    fill.set_seq_num(2).unwrap();
    session.on_receive(fill).await.unwrap();
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert_eq!(session.next_expect_seq(), 6);
}

#[tokio::test]
async fn scenario_3_duplicate_with_poss_dup_is_discarded_with_no_state_change() {
    let store = Arc::new(MemoryMessageStore::new());
    let codec = Arc::new(Codec::standard());
    let (mut session, _rx) = SessionProcessor::new(session_config(), store, codec, None);
    session.start().await.unwrap();
    session.initiate_logon().unwrap();
    session.on_receive(ack(1)).await.unwrap();

    let mut dup = Message::heartbeat("FIX.4.4", "ACCEPTOR", "INITIATOR", None).unwrap();
    dup.set_seq_num(2).unwrap();
    session.on_receive(dup).await.unwrap();
    assert_eq!(session.next_expect_seq(), 3);

    let mut redelivered = Message::heartbeat("FIX.4.4", "ACCEPTOR", "INITIATOR", None).unwrap();
    redelivered.set_seq_num(2).unwrap();
    redelivered.set(tags::POSS_DUP_FLAG, "Y").unwrap();
    let forwarded = session.on_receive(redelivered).await.unwrap();

    assert!(forwarded.is_none());
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert_eq!(session.next_expect_seq(), 3);
}

#[tokio::test]
async fn scenario_4_fatal_low_seq_without_poss_dup_logs_out_and_errors() {
    let store = Arc::new(MemoryMessageStore::new());
    let codec = Arc::new(Codec::standard());
    let (mut session, _rx) = SessionProcessor::new(session_config(), store, codec, None);
    session.start().await.unwrap();
    session.initiate_logon().unwrap();
    session.on_receive(ack(1)).await.unwrap();

    let mut in_order = Message::heartbeat("FIX.4.4", "ACCEPTOR", "INITIATOR", None).unwrap();
    in_order.set_seq_num(2).unwrap();
    session.on_receive(in_order).await.unwrap();
    assert_eq!(session.next_expect_seq(), 3);

    let mut low = Message::heartbeat("FIX.4.4", "ACCEPTOR", "INITIATOR", None).unwrap();
    low.set_seq_num(2).unwrap();
    let err = session.on_receive(low).await.unwrap_err();

    assert!(matches!(err, fixg::FixError::Sequence { expected: 3, received: 2, .. }));
    assert_eq!(session.state(), SessionState::Errored);
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn scenario_5_heartbeat_timeout_emits_test_request_then_errors_session() {
    let store = Arc::new(MemoryMessageStore::new());
    let codec = Arc::new(Codec::standard());
    let (mut session, mut rx) = SessionProcessor::new(session_config(), store, codec, None);
    session.start().await.unwrap();
    session.initiate_logon().unwrap();
    session.on_receive(ack(1)).await.unwrap();

    let after_30_plus_6 = Utc::now() + chrono::Duration::seconds(36);
    session.on_tick(after_30_plus_6).await.unwrap();
    let test_req = rx.try_recv().unwrap();
    assert_eq!(test_req.msg_type(), Some(MsgType::TestRequest.as_str()));

    let after_another_30_plus_6 = after_30_plus_6 + chrono::Duration::seconds(36);
    let err = session.on_tick(after_another_30_plus_6).await.unwrap_err();
    assert!(matches!(err, fixg::FixError::Timeout { .. }));
    assert_eq!(session.state(), SessionState::Errored);
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn scenario_6_gap_fill_on_resend_replays_app_messages_and_skips_heartbeat() {
    let store = Arc::new(MemoryMessageStore::new());
    let codec = Arc::new(Codec::standard());
    let (mut session, mut rx) =
        SessionProcessor::new(session_config(), store.clone(), codec.clone(), None);
    session.start().await.unwrap();
    session.initiate_logon().unwrap();
    session.on_receive(ack(1)).await.unwrap();

    // Seed the sent store with: app msg at 2, Heartbeat at 3, app msg at 4.
    for (seq, msg_type) in [(2u32, "D"), (3, "0"), (4, "D")] {
        let mut msg = Message::new("FIX.4.4", fixg::fieldmap::FieldMap::dict());
        msg.set(tags::MSG_TYPE, msg_type).unwrap();
        msg.set(tags::SENDER_COMP_ID, "INITIATOR").unwrap();
        msg.set(tags::TARGET_COMP_ID, "ACCEPTOR").unwrap();
        msg.set_seq_num(seq).unwrap();
        msg.set_sending_time(Utc::now()).unwrap();
        let encoded = codec.encode(&msg).unwrap();
        store
            .put("scenario", Direction::Sent, seq, encoded, Utc::now())
            .await
            .unwrap();
    }

    let mut req = Message::resend_request("FIX.4.4", "ACCEPTOR", "INITIATOR", 2, 4).unwrap();
    req.set_seq_num(2).unwrap();
    session.on_receive(req).await.unwrap();

    let replay_2 = rx.try_recv().unwrap();
    assert_eq!(replay_2.seq_num(), Some(2));
    assert!(replay_2.poss_dup_flag());

    let gap_fill = rx.try_recv().unwrap();
    assert_eq!(gap_fill.msg_type(), Some(MsgType::SequenceReset.as_str()));
    assert_eq!(gap_fill.get(tags::GAP_FILL_FLAG).unwrap(), "Y");
    assert_eq!(gap_fill.get(tags::NEW_SEQ_NO).unwrap(), 4i64);
    assert_eq!(gap_fill.seq_num(), Some(3));

    let replay_4 = rx.try_recv().unwrap();
    assert_eq!(replay_4.seq_num(), Some(4));
    assert!(replay_4.poss_dup_flag());

    assert!(rx.try_recv().is_err());
}
