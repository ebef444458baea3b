//! The in-memory representation of a FIX message: a [`FieldMap`] plus
//! derived accessors and the two construction paths spec.md §4.2 names —
//! typed constructors for the administrative set, and a generic factory
//! from (tag, value) pairs.

use crate::dictionary::{self, tags, GroupRegistry, MsgType};
use crate::error::{FixError, Result};
use crate::field::Field;
use crate::fieldmap::{FieldMap, Group, GroupInstance};
use bytes::Bytes;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    begin_string: String,
    fields: FieldMap,
}

impl Message {
    pub fn new(begin_string: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            begin_string: begin_string.into(),
            fields,
        }
    }

    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldMap {
        &mut self.fields
    }

    pub fn get(&self, tag: u32) -> Option<&Field> {
        self.fields.get(tag)
    }

    pub fn set(&mut self, tag: u32, value: impl Into<Bytes>) -> Result<()> {
        self.fields.set(tag, value)
    }

    /// Sets a field by tag-name alias (e.g. `"ClOrdID"`), resolved through
    /// the static [`dictionary`].
    pub fn set_alias(&mut self, name: &str, value: impl Into<Bytes>) -> Result<()> {
        let tag = dictionary::tag_by_name(name).ok_or_else(|| {
            FixError::InvalidConfig(format!("unknown tag alias '{name}'"))
        })?;
        self.fields.set(tag, value)
    }

    pub fn remove(&mut self, tag: u32) {
        self.fields.remove(tag)
    }

    pub fn msg_type(&self) -> Option<&str> {
        self.get(tags::MSG_TYPE).and_then(|f| f.as_str().ok())
    }

    pub fn seq_num(&self) -> Option<u32> {
        self.get(tags::MSG_SEQ_NUM)
            .and_then(|f| f.as_int().ok().flatten())
            .map(|n| n as u32)
    }

    pub fn set_seq_num(&mut self, seq: u32) -> Result<()> {
        self.set(tags::MSG_SEQ_NUM, seq.to_string())
    }

    pub fn sender_comp_id(&self) -> Option<&str> {
        self.get(tags::SENDER_COMP_ID).and_then(|f| f.as_str().ok())
    }

    pub fn target_comp_id(&self) -> Option<&str> {
        self.get(tags::TARGET_COMP_ID).and_then(|f| f.as_str().ok())
    }

    pub fn sending_time(&self) -> Option<DateTime<Utc>> {
        self.get(tags::SENDING_TIME).and_then(|f| f.as_timestamp().ok().flatten())
    }

    pub fn set_sending_time(&mut self, ts: DateTime<Utc>) -> Result<()> {
        self.set(tags::SENDING_TIME, format_timestamp(ts))
    }

    pub fn poss_dup_flag(&self) -> bool {
        self.get(tags::POSS_DUP_FLAG)
            .and_then(|f| f.as_bool().ok().flatten())
            .unwrap_or(false)
    }

    /// Generic factory (spec.md §4.2): builds a [`FieldMap`] from flat
    /// (tag, value) pairs, producing dict form if the registry knows every
    /// repeating group referenced by `msg_type`, else list form.
    pub fn from_pairs(
        begin_string: impl Into<String>,
        msg_type: &str,
        pairs: Vec<(u32, Bytes)>,
        registry: &GroupRegistry,
    ) -> Result<Self> {
        let fields = build_fieldmap(msg_type, pairs, registry)?;
        Ok(Self::new(begin_string, fields))
    }

    // ---- typed constructors (spec.md §4.2) ----

    pub fn logon(
        begin_string: impl Into<String>,
        sender_comp_id: &str,
        target_comp_id: &str,
        heartbeat_interval_secs: u32,
        reset_seq_num_flag: bool,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        let mut m = Self::new(begin_string, FieldMap::dict());
        m.set(tags::MSG_TYPE, MsgType::Logon.as_str())?;
        m.set(tags::SENDER_COMP_ID, sender_comp_id.to_string())?;
        m.set(tags::TARGET_COMP_ID, target_comp_id.to_string())?;
        m.set(tags::ENCRYPT_METHOD, "0")?;
        m.set(tags::HEART_BT_INT, heartbeat_interval_secs.to_string())?;
        if reset_seq_num_flag {
            m.set(tags::RESET_SEQ_NUM_FLAG, "Y")?;
        }
        if let Some(u) = username {
            m.set(tags::USERNAME, u.to_string())?;
        }
        if let Some(p) = password {
            m.set(tags::PASSWORD, p.to_string())?;
        }
        Ok(m)
    }

    pub fn logout(
        begin_string: impl Into<String>,
        sender_comp_id: &str,
        target_comp_id: &str,
        text: Option<&str>,
    ) -> Result<Self> {
        let mut m = Self::new(begin_string, FieldMap::dict());
        m.set(tags::MSG_TYPE, MsgType::Logout.as_str())?;
        m.set(tags::SENDER_COMP_ID, sender_comp_id.to_string())?;
        m.set(tags::TARGET_COMP_ID, target_comp_id.to_string())?;
        if let Some(t) = text {
            m.set(tags::TEXT, t.to_string())?;
        }
        Ok(m)
    }

    pub fn heartbeat(
        begin_string: impl Into<String>,
        sender_comp_id: &str,
        target_comp_id: &str,
        test_req_id: Option<&str>,
    ) -> Result<Self> {
        let mut m = Self::new(begin_string, FieldMap::dict());
        m.set(tags::MSG_TYPE, MsgType::Heartbeat.as_str())?;
        m.set(tags::SENDER_COMP_ID, sender_comp_id.to_string())?;
        m.set(tags::TARGET_COMP_ID, target_comp_id.to_string())?;
        if let Some(id) = test_req_id {
            m.set(tags::TEST_REQ_ID, id.to_string())?;
        }
        Ok(m)
    }

    pub fn test_request(
        begin_string: impl Into<String>,
        sender_comp_id: &str,
        target_comp_id: &str,
        test_req_id: &str,
    ) -> Result<Self> {
        let mut m = Self::new(begin_string, FieldMap::dict());
        m.set(tags::MSG_TYPE, MsgType::TestRequest.as_str())?;
        m.set(tags::SENDER_COMP_ID, sender_comp_id.to_string())?;
        m.set(tags::TARGET_COMP_ID, target_comp_id.to_string())?;
        m.set(tags::TEST_REQ_ID, test_req_id.to_string())?;
        Ok(m)
    }

    pub fn resend_request(
        begin_string: impl Into<String>,
        sender_comp_id: &str,
        target_comp_id: &str,
        begin_seq_no: u32,
        end_seq_no: u32,
    ) -> Result<Self> {
        let mut m = Self::new(begin_string, FieldMap::dict());
        m.set(tags::MSG_TYPE, MsgType::ResendRequest.as_str())?;
        m.set(tags::SENDER_COMP_ID, sender_comp_id.to_string())?;
        m.set(tags::TARGET_COMP_ID, target_comp_id.to_string())?;
        m.set(tags::BEGIN_SEQ_NO, begin_seq_no.to_string())?;
        m.set(tags::END_SEQ_NO, end_seq_no.to_string())?;
        Ok(m)
    }

    pub fn sequence_reset(
        begin_string: impl Into<String>,
        sender_comp_id: &str,
        target_comp_id: &str,
        gap_fill: bool,
        new_seq_no: u32,
    ) -> Result<Self> {
        let mut m = Self::new(begin_string, FieldMap::dict());
        m.set(tags::MSG_TYPE, MsgType::SequenceReset.as_str())?;
        m.set(tags::SENDER_COMP_ID, sender_comp_id.to_string())?;
        m.set(tags::TARGET_COMP_ID, target_comp_id.to_string())?;
        m.set(tags::GAP_FILL_FLAG, if gap_fill { "Y" } else { "N" })?;
        m.set(tags::NEW_SEQ_NO, new_seq_no.to_string())?;
        Ok(m)
    }

    pub fn reject(
        begin_string: impl Into<String>,
        sender_comp_id: &str,
        target_comp_id: &str,
        ref_seq_num: u32,
        ref_tag_id: Option<u32>,
        reason: u32,
        text: Option<&str>,
    ) -> Result<Self> {
        let mut m = Self::new(begin_string, FieldMap::dict());
        m.set(tags::MSG_TYPE, MsgType::Reject.as_str())?;
        m.set(tags::SENDER_COMP_ID, sender_comp_id.to_string())?;
        m.set(tags::TARGET_COMP_ID, target_comp_id.to_string())?;
        m.set(tags::REF_SEQ_NUM, ref_seq_num.to_string())?;
        if let Some(t) = ref_tag_id {
            m.set(tags::REF_TAG_ID, t.to_string())?;
        }
        m.set(tags::SESSION_REJECT_REASON, reason.to_string())?;
        if let Some(t) = text {
            m.set(tags::TEXT, t.to_string())?;
        }
        Ok(m)
    }
}

/// `YYYYMMDD-HH:MM:SS.sss` — millisecond precision, per spec.md §4.1's
/// encode contract.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d-%H:%M:%S%.3f").to_string()
}

/// Builds a [`FieldMap`] from flat (tag, value) pairs. If the registry has
/// any group registered for `msg_type`, every count tag it names is parsed
/// into a [`Group`] and the result is dict form; otherwise the pairs are
/// kept flat as list form (spec.md §4.1 "If no template is known, the
/// message falls through to list form").
pub(crate) fn build_fieldmap(
    msg_type: &str,
    pairs: Vec<(u32, Bytes)>,
    registry: &GroupRegistry,
) -> Result<FieldMap> {
    if !registry.has_groups_for(msg_type) {
        let mut list = FieldMap::list();
        for (tag, value) in pairs {
            list.set(tag, value)?;
        }
        return Ok(list);
    }

    let mut dict = FieldMap::dict();
    let mut i = 0usize;
    while i < pairs.len() {
        let (tag, value) = &pairs[i];
        if let Some(spec) = registry.lookup(msg_type, *tag) {
            let count_text = std::str::from_utf8(value).unwrap_or("0");
            let count: usize = count_text.parse().unwrap_or(0);
            i += 1;
            let mut group = Group::new(spec);
            let mut found = 0usize;
            while found < count && i < pairs.len() && pairs[i].0 == spec.delimiter_tag {
                let mut instance = GroupInstance::new();
                loop {
                    if i >= pairs.len() {
                        break;
                    }
                    let (t, v) = &pairs[i];
                    if !instance.fields().is_empty() && *t == spec.delimiter_tag {
                        break;
                    }
                    if !spec.member_tags.contains(t) {
                        break;
                    }
                    instance.push(Field::new(*t, v.clone()));
                    i += 1;
                }
                group.push_instance(instance);
                found += 1;
            }
            if found < count {
                return Err(FixError::Framing(
                    crate::error::FramingError::GroupParseError(format!(
                        "expected {count} instances of group {}, found {found}",
                        spec.count_tag
                    )),
                ));
            }
            dict.set_group(group);
        } else {
            dict.set(*tag, value.clone())?;
            i += 1;
        }
    }
    Ok(dict)
}
