//! Static FIX 4.4 tag and message-type dictionary.
//!
//! Re-architected from the source's dynamic attribute lookup (Design Note
//! "Cyclic references / dynamic dispatch"): tags and repeating-group shapes
//! are plain hand-written consts rather than runtime name resolution or a
//! code-generated table. Name-based lookup goes through [`tag_by_name`], a
//! small linear table — the administrative dictionary is short enough that
//! a `HashMap` buys nothing over a `match`.

use std::collections::HashMap;

pub mod tags {
    //! Standard header, trailer, and administrative body tags.
    pub const BEGIN_STRING: u32 = 8;
    pub const BODY_LENGTH: u32 = 9;
    pub const CHECK_SUM: u32 = 10;
    pub const MSG_TYPE: u32 = 35;
    pub const MSG_SEQ_NUM: u32 = 34;
    pub const SENDER_COMP_ID: u32 = 49;
    pub const TARGET_COMP_ID: u32 = 56;
    pub const SENDING_TIME: u32 = 52;
    pub const ORIG_SENDING_TIME: u32 = 122;

    pub const ENCRYPT_METHOD: u32 = 98;
    pub const HEART_BT_INT: u32 = 108;
    pub const TEST_REQ_ID: u32 = 112;
    pub const RESET_SEQ_NUM_FLAG: u32 = 141;
    pub const USERNAME: u32 = 553;
    pub const PASSWORD: u32 = 554;

    pub const POSS_DUP_FLAG: u32 = 43;
    pub const POSS_RESEND: u32 = 97;

    pub const BEGIN_SEQ_NO: u32 = 7;
    pub const END_SEQ_NO: u32 = 16;

    pub const NEW_SEQ_NO: u32 = 36;
    pub const GAP_FILL_FLAG: u32 = 123;

    pub const TEXT: u32 = 58;
    pub const REF_SEQ_NUM: u32 = 45;
    pub const REF_TAG_ID: u32 = 371;
    pub const REF_MSG_TYPE: u32 = 372;
    pub const SESSION_REJECT_REASON: u32 = 373;

    pub const CL_ORD_ID: u32 = 11;
    pub const ORDER_ID: u32 = 37;
    pub const EXEC_ID: u32 = 17;
    pub const SYMBOL: u32 = 55;
    pub const SIDE: u32 = 54;
    pub const EXEC_TYPE: u32 = 150;
    pub const ORD_STATUS: u32 = 39;
    pub const LAST_PX: u32 = 31;
    pub const LAST_QTY: u32 = 32;
    pub const CUM_QTY: u32 = 14;
    pub const LEAVES_QTY: u32 = 151;

    pub const NO_MISC_FEES: u32 = 136;
    pub const MISC_FEE_AMT: u32 = 137;
    pub const MISC_FEE_CURR: u32 = 138;
    pub const MISC_FEE_TYPE: u32 = 139;

    pub const NO_MSG_TYPES: u32 = 384;
    pub const MSG_DIRECTION: u32 = 385;
}

/// Small name -> tag lookup table for the tags a user app is likely to
/// address by alias rather than by number.
const NAME_TABLE: &[(&str, u32)] = &[
    ("BeginString", tags::BEGIN_STRING),
    ("BodyLength", tags::BODY_LENGTH),
    ("CheckSum", tags::CHECK_SUM),
    ("MsgType", tags::MSG_TYPE),
    ("MsgSeqNum", tags::MSG_SEQ_NUM),
    ("SenderCompID", tags::SENDER_COMP_ID),
    ("TargetCompID", tags::TARGET_COMP_ID),
    ("SendingTime", tags::SENDING_TIME),
    ("OrigSendingTime", tags::ORIG_SENDING_TIME),
    ("EncryptMethod", tags::ENCRYPT_METHOD),
    ("HeartBtInt", tags::HEART_BT_INT),
    ("TestReqID", tags::TEST_REQ_ID),
    ("ResetSeqNumFlag", tags::RESET_SEQ_NUM_FLAG),
    ("Username", tags::USERNAME),
    ("Password", tags::PASSWORD),
    ("PossDupFlag", tags::POSS_DUP_FLAG),
    ("PossResend", tags::POSS_RESEND),
    ("BeginSeqNo", tags::BEGIN_SEQ_NO),
    ("EndSeqNo", tags::END_SEQ_NO),
    ("NewSeqNo", tags::NEW_SEQ_NO),
    ("GapFillFlag", tags::GAP_FILL_FLAG),
    ("Text", tags::TEXT),
    ("RefSeqNum", tags::REF_SEQ_NUM),
    ("RefTagID", tags::REF_TAG_ID),
    ("RefMsgType", tags::REF_MSG_TYPE),
    ("SessionRejectReason", tags::SESSION_REJECT_REASON),
    ("ClOrdID", tags::CL_ORD_ID),
    ("OrderID", tags::ORDER_ID),
    ("ExecID", tags::EXEC_ID),
    ("Symbol", tags::SYMBOL),
    ("Side", tags::SIDE),
    ("ExecType", tags::EXEC_TYPE),
    ("OrdStatus", tags::ORD_STATUS),
    ("LastPx", tags::LAST_PX),
    ("LastQty", tags::LAST_QTY),
    ("CumQty", tags::CUM_QTY),
    ("LeavesQty", tags::LEAVES_QTY),
    ("NoMiscFees", tags::NO_MISC_FEES),
    ("MiscFeeAmt", tags::MISC_FEE_AMT),
    ("MiscFeeCurr", tags::MISC_FEE_CURR),
    ("MiscFeeType", tags::MISC_FEE_TYPE),
    ("NoMsgTypes", tags::NO_MSG_TYPES),
    ("MsgDirection", tags::MSG_DIRECTION),
];

/// Resolves a tag-name alias (e.g. `"ClOrdID"`) to its numeric tag.
pub fn tag_by_name(name: &str) -> Option<u32> {
    NAME_TABLE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, t)| *t)
}

/// The standard FIX 4.4 administrative message types plus a handful of
/// common application types, used for typed dispatch and group lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MsgType {
    Heartbeat,
    TestRequest,
    ResendRequest,
    Reject,
    SequenceReset,
    Logout,
    Logon,
    ExecutionReport,
    NewOrderSingle,
    Custom(String),
}

impl MsgType {
    pub fn as_str(&self) -> &str {
        match self {
            MsgType::Heartbeat => "0",
            MsgType::TestRequest => "1",
            MsgType::ResendRequest => "2",
            MsgType::Reject => "3",
            MsgType::SequenceReset => "4",
            MsgType::Logout => "5",
            MsgType::Logon => "A",
            MsgType::ExecutionReport => "8",
            MsgType::NewOrderSingle => "D",
            MsgType::Custom(s) => s.as_str(),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            MsgType::Heartbeat
                | MsgType::TestRequest
                | MsgType::ResendRequest
                | MsgType::Reject
                | MsgType::SequenceReset
                | MsgType::Logout
                | MsgType::Logon
        )
    }
}

impl From<&str> for MsgType {
    fn from(s: &str) -> Self {
        match s {
            "0" => MsgType::Heartbeat,
            "1" => MsgType::TestRequest,
            "2" => MsgType::ResendRequest,
            "3" => MsgType::Reject,
            "4" => MsgType::SequenceReset,
            "5" => MsgType::Logout,
            "A" => MsgType::Logon,
            "8" => MsgType::ExecutionReport,
            "D" => MsgType::NewOrderSingle,
            other => MsgType::Custom(other.to_string()),
        }
    }
}

/// Describes one repeating group: the count tag that introduces it, the
/// delimiter tag that marks the start of each instance, and the set of
/// tags permitted within an instance (including the delimiter).
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub count_tag: u32,
    pub delimiter_tag: u32,
    pub member_tags: &'static [u32],
}

/// NoMsgTypeGrp (384) — RefMsgType is the delimiter tag. Appears on Reject
/// and on session-level messages that enumerate supported message types.
pub const MSG_TYPES_GROUP: GroupSpec = GroupSpec {
    count_tag: tags::NO_MSG_TYPES,
    delimiter_tag: tags::REF_MSG_TYPE,
    member_tags: &[tags::REF_MSG_TYPE, tags::MSG_DIRECTION],
};

/// NoMiscFees (136) — MiscFeeAmt is the delimiter tag. Appears on
/// ExecutionReport; used throughout this crate's tests as the
/// representative application-level repeating group (spec.md §8 scenario 6
/// uses administrative groups only, so this one exercises the general
/// group-parsing path against a non-administrative message).
pub const MISC_FEES_GROUP: GroupSpec = GroupSpec {
    count_tag: tags::NO_MISC_FEES,
    delimiter_tag: tags::MISC_FEE_AMT,
    member_tags: &[
        tags::MISC_FEE_AMT,
        tags::MISC_FEE_CURR,
        tags::MISC_FEE_TYPE,
    ],
};

/// Keyed by (MsgType wire code, count tag) -> group shape. Decoding looks
/// up a group template here before falling back to list form for the whole
/// message (see [`crate::codec`]).
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    specs: HashMap<(String, u32), GroupSpec>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// The registry used by default: the standard administrative set plus
    /// the ExecutionReport MiscFees group.
    pub fn standard() -> Self {
        let mut reg = Self::new();
        reg.register(MsgType::Reject.as_str(), MSG_TYPES_GROUP.clone());
        reg.register(
            MsgType::ExecutionReport.as_str(),
            MISC_FEES_GROUP.clone(),
        );
        reg
    }

    pub fn register(&mut self, msg_type: &str, spec: GroupSpec) {
        self.specs.insert((msg_type.to_string(), spec.count_tag), spec);
    }

    pub fn lookup(&self, msg_type: &str, count_tag: u32) -> Option<&GroupSpec> {
        self.specs.get(&(msg_type.to_string(), count_tag))
    }

    /// True if any group is registered for this message type. The codec
    /// uses this to decide, per message, whether to attempt dict-form
    /// parsing or fall straight through to list form (see DESIGN.md, Open
    /// Question: per-message vs per-group templating granularity).
    pub fn has_groups_for(&self, msg_type: &str) -> bool {
        self.specs.keys().any(|(mt, _)| mt == msg_type)
    }

    pub fn count_tags_for(&self, msg_type: &str) -> impl Iterator<Item = u32> + '_ {
        self.specs
            .keys()
            .filter(move |(mt, _)| mt == msg_type)
            .map(|(_, tag)| *tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_resolves_known_alias() {
        assert_eq!(tag_by_name("ClOrdID"), Some(tags::CL_ORD_ID));
        assert_eq!(tag_by_name("NotARealTag"), None);
    }

    #[test]
    fn msg_type_round_trips_through_wire_code() {
        assert_eq!(MsgType::from("A"), MsgType::Logon);
        assert_eq!(MsgType::Logon.as_str(), "A");
        assert!(MsgType::Logon.is_admin());
        assert!(!MsgType::ExecutionReport.is_admin());
    }

    #[test]
    fn custom_msg_type_round_trips() {
        let mt = MsgType::from("Z9");
        assert_eq!(mt, MsgType::Custom("Z9".to_string()));
        assert_eq!(mt.as_str(), "Z9");
    }

    #[test]
    fn standard_registry_knows_exec_report_group() {
        let reg = GroupRegistry::standard();
        assert!(reg.has_groups_for("8"));
        assert!(!reg.has_groups_for("D"));
        let spec = reg.lookup("8", tags::NO_MISC_FEES).unwrap();
        assert_eq!(spec.delimiter_tag, tags::MISC_FEE_AMT);
    }
}
