use thiserror::Error;

/// Framing-layer failures raised while splitting the wire stream into
/// discrete messages, before the message model gets involved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("malformed framing: {0}")]
    Malformed(String),

    #[error("BodyLength mismatch: header said {declared}, body was {actual}")]
    BodyLengthMismatch { declared: usize, actual: usize },

    #[error("CheckSum mismatch: header said {declared:03}, computed {actual:03}")]
    CheckSumMismatch { declared: u8, actual: u8 },

    #[error("unknown tag {0} in strict mode")]
    UnknownTag(u32),

    #[error("group parse error: {0}")]
    GroupParseError(String),
}

/// The crate-wide error type. Mirrors the taxonomy of spec.md §7: framing,
/// protocol, sequence, session, processor, and transport errors each get
/// their own shape so a caller can match on cause without parsing strings.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("protocol error: {reason} (ref_seq_num={ref_seq_num:?}, ref_tag_id={ref_tag_id:?})")]
    Protocol {
        reason: String,
        ref_seq_num: Option<u32>,
        ref_tag_id: Option<u32>,
    },

    #[error("sequence error: {reason} (expected={expected}, received={received})")]
    Sequence {
        reason: String,
        expected: u32,
        received: u32,
    },

    #[error("session error: {0}")]
    Session(String),

    #[error("processor '{processor}' failed: {reason}")]
    Processor { processor: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid tag: {0}")]
    InvalidTag(u32),

    #[error("field {0} is not valid UTF-8")]
    NotUtf8(u32),

    #[error("field {tag} could not be parsed as {expected}: {value}")]
    FieldFormat {
        tag: u32,
        expected: &'static str,
        value: String,
    },

    #[error("channel closed")]
    ChannelClosed,

    #[error("store error: {0}")]
    Store(String),

    #[error("{kind} timed out after {elapsed_ms}ms")]
    Timeout { kind: &'static str, elapsed_ms: u64 },
}

impl FixError {
    /// Maps a terminal cause to the process exit code spec.md §6 defines:
    /// 0 normal logout, 1 fatal protocol error, 2 transport failure,
    /// 3 configuration error. Non-terminal causes (e.g. a single Reject)
    /// are not mapped here; this is for the supervisor's final exit path.
    pub fn exit_code(&self) -> i32 {
        match self {
            FixError::Transport(_) => 2,
            FixError::InvalidConfig(_) => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, FixError>;
