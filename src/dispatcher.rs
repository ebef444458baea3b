//! Per-processor MsgType -> handler routing (spec.md §4.5). A processor
//! that wants type-specific behavior embeds a [`Dispatcher`] built once at
//! construction (registration is static; there is no method to mutate the
//! table after `build()`) and calls [`Dispatcher::dispatch`] from its
//! `on_receive`/`on_send`, falling back to its own default handling when
//! the dispatcher reports [`Dispatched::Unhandled`].

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&mut self, msg: Message) -> Result<Option<Message>>;
}

/// Adapts a plain closure into a [`MessageHandler`] for the common case of
/// a stateless handler.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: FnMut(Message) -> Result<Option<Message>> + Send + Sync,
{
    async fn handle(&mut self, msg: Message) -> Result<Option<Message>> {
        (self.0)(msg)
    }
}

pub enum Dispatched {
    Handled(Option<Message>),
    Unhandled(Message),
}

#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<String, Box<dyn MessageHandler>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, msg_type: impl Into<String>, handler: Box<dyn MessageHandler>) -> Self {
        self.handlers.insert(msg_type.into(), handler);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            handlers: self.handlers,
        }
    }
}

/// A static MsgType -> handler table.
pub struct Dispatcher {
    handlers: HashMap<String, Box<dyn MessageHandler>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn has_handler(&self, msg_type: &str) -> bool {
        self.handlers.contains_key(msg_type)
    }

    /// Looks up `msg.msg_type()` and routes to the registered handler if
    /// one exists; otherwise returns [`Dispatched::Unhandled`] so the
    /// caller can fall back to its own `on_receive`/`on_send`.
    pub async fn dispatch(&mut self, msg: Message) -> Result<Dispatched> {
        let msg_type = msg.msg_type().unwrap_or("").to_string();
        match self.handlers.get_mut(&msg_type) {
            Some(handler) => Ok(Dispatched::Handled(handler.handle(msg).await?)),
            None => Ok(Dispatched::Unhandled(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::MsgType;

    struct CountingHandler {
        count: usize,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&mut self, msg: Message) -> Result<Option<Message>> {
            self.count += 1;
            Ok(Some(msg))
        }
    }

    #[tokio::test]
    async fn routes_to_registered_handler_by_msg_type() {
        let mut dispatcher = Dispatcher::builder()
            .register(MsgType::Heartbeat.as_str(), Box::new(CountingHandler { count: 0 }))
            .build();
        let msg = Message::heartbeat("FIX.4.4", "S", "T", None).unwrap();
        match dispatcher.dispatch(msg).await.unwrap() {
            Dispatched::Handled(Some(_)) => {}
            _ => panic!("expected handled"),
        }
        assert!(dispatcher.has_handler("0"));
    }

    #[tokio::test]
    async fn falls_through_to_unhandled_when_no_handler_registered() {
        let mut dispatcher = Dispatcher::builder().build();
        let msg = Message::logout("FIX.4.4", "S", "T", None).unwrap();
        match dispatcher.dispatch(msg).await.unwrap() {
            Dispatched::Unhandled(_) => {}
            _ => panic!("expected unhandled"),
        }
    }
}
