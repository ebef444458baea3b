#![doc = include_str!("../README.md")]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod admin;
pub mod client;
pub mod codec;
pub mod config;
pub mod dictionary;
pub mod dispatcher;
pub mod error;
pub mod field;
pub mod fieldmap;
pub mod message;
pub mod messages;
pub mod pipeline;
pub mod processor;
pub mod pubsub;
pub mod session;
pub mod store;
pub mod transport;

pub use client::{Engine, FixHandler};
pub use config::Config;
pub use error::{FixError, Result};
pub use message::Message;
pub use pipeline::Pipeline;
pub use processor::Processor;
pub use session::{SessionConfig, SessionProcessor, SessionState};
