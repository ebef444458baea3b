//! Minimal initiator demo: connects, logs on, and prints whatever
//! application messages come back. Pair with `cargo run --example acceptor`.

use std::sync::Arc;

use async_trait::async_trait;
use fixg::store::MemoryMessageStore;
use fixg::{Config, Engine, FixHandler, Message};

struct PrintingHandler;

#[async_trait]
impl FixHandler for PrintingHandler {
    async fn on_message(&mut self, msg: Message) -> fixg::Result<()> {
        println!("received application message: {:?}", msg.msg_type());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::parse_toml(
        r#"
            host = "127.0.0.1"
            port = 9876
            sender_comp_id = "INITIATOR"
            target_comp_id = "ACCEPTOR"
            connection_name = "demo-initiator"
            heartbeat_interval = 30
        "#,
    )?;

    let store = Arc::new(MemoryMessageStore::new());
    let mut engine = Engine::connect(&config, store, vec![]).await?;
    engine.logon().await?;

    let mut handler = PrintingHandler;
    engine.run(&mut handler).await?;
    Ok(())
}
