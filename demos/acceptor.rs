//! Toy always-accept counterparty for `demos/initiator.rs`: speaks just
//! enough of the session-level protocol (Logon/Heartbeat/TestRequest/Logout)
//! to exercise the initiator end to end. Built directly on `fixg::codec`
//! and `fixg::message` rather than a second copy of the session state
//! machine, since all this demo needs is a passive echo of whatever the
//! initiator's own `SessionProcessor` already drives correctly.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{self, Duration, Instant};

use fixg::codec::Codec;
use fixg::dictionary::tags;
use fixg::message::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind(("127.0.0.1", 9876)).await?;
    println!("toy acceptor listening on 127.0.0.1:9876");

    loop {
        let (socket, addr) = listener.accept().await?;
        println!("accepted connection from {addr}");
        tokio::spawn(async move {
            if let Err(e) = serve(socket).await {
                println!("connection from {addr} ended: {e}");
            }
        });
    }
}

async fn serve(mut socket: tokio::net::TcpStream) -> Result<(), Box<dyn std::error::Error>> {
    let codec = Codec::standard();
    let mut read_buf = BytesMut::with_capacity(16 * 1024);
    let mut out_seq_num: u32 = 1;
    let mut last_rx = Instant::now();
    let mut hb_interval = Duration::from_secs(30);
    let mut sender_comp = String::from("ACCEPTOR");
    let mut target_comp = String::from("INITIATOR");
    let begin_string = "FIX.4.4";

    let mut ticker = time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            biased;

            n = socket.read_buf(&mut read_buf) => {
                let n = n?;
                if n == 0 {
                    println!("peer closed");
                    return Ok(());
                }
                last_rx = Instant::now();
                loop {
                    match codec.try_decode(&read_buf) {
                        Ok(Some((msg, consumed))) => {
                            let _ = read_buf.split_to(consumed);
                            match msg.msg_type() {
                                Some("A") => {
                                    if let Some(field) = msg.get(tags::HEART_BT_INT) {
                                        if let Some(secs) = field.as_int()? {
                                            hb_interval = Duration::from_secs(secs as u64);
                                        }
                                    }
                                    if let Some(s) = msg.sender_comp_id() {
                                        target_comp = s.to_string();
                                    }
                                    if let Some(t) = msg.target_comp_id() {
                                        sender_comp = t.to_string();
                                    }
                                    let mut logon = Message::logon(
                                        begin_string,
                                        &sender_comp,
                                        &target_comp,
                                        hb_interval.as_secs() as u32,
                                        false,
                                        None,
                                        None,
                                    )?;
                                    logon.set(tags::MSG_SEQ_NUM, out_seq_num.to_string())?;
                                    out_seq_num += 1;
                                    socket.write_all(&codec.encode(&logon)?).await?;
                                }
                                Some("1") => {
                                    let test_req_id = msg.get(tags::TEST_REQ_ID).map(|f| f.as_str().map(str::to_string)).transpose()?;
                                    let mut hb = Message::heartbeat(begin_string, &sender_comp, &target_comp, test_req_id.as_deref())?;
                                    hb.set(tags::MSG_SEQ_NUM, out_seq_num.to_string())?;
                                    out_seq_num += 1;
                                    socket.write_all(&codec.encode(&hb)?).await?;
                                }
                                Some("5") => {
                                    let mut logout = Message::logout(begin_string, &sender_comp, &target_comp, None)?;
                                    logout.set(tags::MSG_SEQ_NUM, out_seq_num.to_string())?;
                                    out_seq_num += 1;
                                    socket.write_all(&codec.encode(&logout)?).await?;
                                    socket.shutdown().await.ok();
                                    return Ok(());
                                }
                                _ => {}
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            println!("framing error: {e}");
                            if let Some(skip) = codec.resync(&read_buf) {
                                let _ = read_buf.split_to(skip);
                            } else {
                                read_buf.clear();
                            }
                        }
                    }
                }
            }

            _ = ticker.tick() => {
                if last_rx.elapsed() >= hb_interval {
                    let mut hb = Message::heartbeat(begin_string, &sender_comp, &target_comp, None)?;
                    hb.set(tags::MSG_SEQ_NUM, out_seq_num.to_string())?;
                    out_seq_num += 1;
                    socket.write_all(&codec.encode(&hb)?).await?;
                    last_rx = Instant::now();
                }
            }
        }
    }
}
