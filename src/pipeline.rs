//! The ordered, bidirectional processor chain (spec.md §4.4). `processors`
//! is stored top-to-bottom: index 0 (`P0`) sits closest to the
//! application, the last entry sits closest to the wire. Inbound messages
//! traverse bottom-up (reverse order); outbound messages traverse
//! top-down (forward order).
//!
//! The pipeline itself is single-threaded-cooperative (spec.md §5): one
//! owner drives both directions by interleaving `dispatch_inbound` and
//! `dispatch_outbound` calls from a single `tokio::select!` loop (see
//! `client::Engine`), so there is never a concurrent `&mut self` borrow to
//! reconcile and no locking is required inside the pipeline.

use crate::error::{FixError, Result};
use crate::message::Message;
use crate::processor::Processor;
use chrono::{DateTime, Utc};

/// Raised once a processor failure has halted the pipeline
/// (spec.md §4.4 "Error handling").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

pub struct Pipeline {
    processors: Vec<Box<dyn Processor>>,
    halted: bool,
}

impl Pipeline {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self {
            processors,
            halted: false,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Starts every processor bottom-up (spec.md §4.4: "start bottom-up").
    pub async fn start(&mut self) -> Result<()> {
        for p in self.processors.iter_mut().rev() {
            p.start().await.map_err(|e| {
                FixError::Processor {
                    processor: p.name().to_string(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Stops every processor top-down, collecting every error raised
    /// rather than aborting at the first one (spec.md §5: "A misbehaving
    /// `stop()` ... must not prevent other processors from stopping").
    pub async fn stop(&mut self) -> Vec<FixError> {
        let mut errors = Vec::new();
        for p in self.processors.iter_mut() {
            if let Err(e) = p.stop().await {
                errors.push(FixError::Processor {
                    processor: p.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
        errors
    }

    /// Drives `msg` from the wire-facing end up toward the application.
    /// `None` at any stage halts further propagation for that message
    /// without halting the pipeline. A processor error halts the whole
    /// pipeline for both directions (spec.md §4.4).
    pub async fn dispatch_inbound(&mut self, msg: Message) -> Result<Option<Message>> {
        self.dispatch(msg, Direction::Inbound).await
    }

    /// Drives `msg` from the application down toward the wire.
    pub async fn dispatch_outbound(&mut self, msg: Message) -> Result<Option<Message>> {
        self.dispatch(msg, Direction::Outbound).await
    }

    async fn dispatch(&mut self, msg: Message, direction: Direction) -> Result<Option<Message>> {
        if self.halted {
            return Err(FixError::Processor {
                processor: "pipeline".to_string(),
                reason: "pipeline is halted after a prior processor error".to_string(),
            });
        }
        let mut current = Some(msg);
        let order: Box<dyn Iterator<Item = &mut Box<dyn Processor>>> = match direction {
            Direction::Inbound => Box::new(self.processors.iter_mut().rev()),
            Direction::Outbound => Box::new(self.processors.iter_mut()),
        };
        for p in order {
            let Some(m) = current else { break };
            current = match direction {
                Direction::Inbound => p.on_receive(m).await,
                Direction::Outbound => p.on_send(m).await,
            }
            .map_err(|e| FixError::Processor {
                processor: p.name().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(current)
    }

    /// Drives every processor's timer hook once. Order does not matter for
    /// correctness (only the session processor acts on it today) so this
    /// runs top-down, matching `stop()`.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<FixError> {
        let mut errors = Vec::new();
        for p in self.processors.iter_mut() {
            if let Err(e) = p.on_tick(now).await {
                errors.push(FixError::Processor {
                    processor: p.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
        errors
    }

    /// Marks the pipeline halted and runs the top-down stop sequence. Called
    /// by the engine when `dispatch_inbound`/`dispatch_outbound` returns an
    /// error (spec.md §4.4).
    pub async fn halt_and_stop(&mut self) -> Vec<FixError> {
        self.halted = true;
        self.stop().await
    }
}
