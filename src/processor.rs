//! The processor contract a [`crate::pipeline::Pipeline`] chains together
//! (spec.md §4.4). Default method bodies make implementing only the hooks
//! a given processor cares about idiomatic — mirrors the teacher's
//! `FixHandler` trait, generalized from a single terminal sink to a link
//! in an ordered chain.

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One stage of the pipeline. `P0` (the first entry in
/// [`crate::pipeline::Pipeline::new`]) sits closest to the application;
/// the last entry sits closest to the wire.
#[async_trait]
pub trait Processor: Send + Sync {
    /// A short name used in logs and in error attribution
    /// (spec.md §7 "processor errors").
    fn name(&self) -> &str;

    /// Called once, bottom-up across the whole pipeline, before any
    /// message traversal begins.
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once, top-down, during an orderly or error-triggered
    /// shutdown. A `stop()` that returns `Err` must not prevent the other
    /// processors from being given a chance to stop (spec.md §5).
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Inbound traversal hook. Returning `None` halts further propagation
    /// toward the application; returning `Some` forwards to the next
    /// stage up.
    async fn on_receive(&mut self, msg: Message) -> Result<Option<Message>> {
        Ok(Some(msg))
    }

    /// Outbound traversal hook, symmetric to [`Processor::on_receive`].
    async fn on_send(&mut self, msg: Message) -> Result<Option<Message>> {
        Ok(Some(msg))
    }

    /// Periodic timer hook the engine drives independently of message
    /// traversal (spec.md §5 "timer awaits" as a suspension point). Only
    /// the session processor does anything with it (heartbeats, test
    /// request timeouts); other processors keep the default no-op.
    async fn on_tick(&mut self, _now: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}
