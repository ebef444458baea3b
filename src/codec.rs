//! Converts between byte buffers and [`Message`] objects (spec.md §4.1).
//!
//! Framing and the streaming decode entry point are grounded on the
//! teacher's `protocol::try_extract_one` / `decode` pair (memchr-based SOH
//! scanning); group-aware construction is delegated to
//! [`crate::message::build_fieldmap`].

use crate::dictionary::{tags, GroupRegistry};
use crate::error::{FixError, FramingError, Result};
use crate::message::{self, Message};
use bytes::{BufMut, Bytes, BytesMut};
use memchr::memchr;
use std::collections::HashSet;

pub const SOH: u8 = 0x01;

fn compute_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn malformed(reason: impl Into<String>) -> FixError {
    FixError::Framing(FramingError::Malformed(reason.into()))
}

/// Stateless codec parameterized by the group-template registry it uses
/// to decide dict vs list form per message.
pub struct Codec {
    registry: GroupRegistry,
}

impl Codec {
    pub fn new(registry: GroupRegistry) -> Self {
        Self { registry }
    }

    pub fn standard() -> Self {
        Self::new(GroupRegistry::standard())
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    /// Attempts to carve one complete message out of the front of `buf`.
    /// Returns `Ok(None)` when more bytes are needed, `Ok(Some((msg, n)))`
    /// with the number of bytes to advance the buffer on success, or an
    /// error on malformed/mismatched framing. On error the caller should
    /// not advance the buffer; [`Codec::resync`] locates the next
    /// plausible message start.
    pub fn try_decode(&self, buf: &[u8]) -> Result<Option<(Message, usize)>> {
        if buf.len() < 2 {
            return Ok(None);
        }
        if !buf.starts_with(b"8=") {
            return Err(malformed("message does not begin with 8="));
        }
        let soh1 = match memchr(SOH, buf) {
            Some(p) => p,
            None => return Ok(None),
        };
        let begin_string = std::str::from_utf8(&buf[2..soh1])
            .map_err(|_| malformed("BeginString is not valid UTF-8"))?
            .to_string();

        let rest = &buf[soh1 + 1..];
        if rest.len() < 2 {
            return Ok(None);
        }
        if !rest.starts_with(b"9=") {
            return Err(malformed("second field is not 9= (BodyLength)"));
        }
        let soh2_rel = match memchr(SOH, rest) {
            Some(p) => p,
            None => return Ok(None),
        };
        let body_length: usize = std::str::from_utf8(&rest[2..soh2_rel])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| malformed("BodyLength is not a valid integer"))?;

        let header_end = soh1 + 1 + soh2_rel + 1;
        let trailer_start = header_end + body_length;

        if buf.len() < trailer_start + 3 {
            return Ok(None);
        }
        if &buf[trailer_start..trailer_start + 3] != b"10=" {
            let actual = memchr::memmem::find(&buf[header_end..], b"\x0110=")
                .map(|p| p + 1)
                .unwrap_or(body_length);
            return Err(FixError::Framing(FramingError::BodyLengthMismatch {
                declared: body_length,
                actual,
            }));
        }
        let trailer_rest = &buf[trailer_start + 3..];
        let soh3_rel = match memchr(SOH, trailer_rest) {
            Some(p) => p,
            None => return Ok(None),
        };
        let declared_checksum: u8 = std::str::from_utf8(&trailer_rest[..soh3_rel])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| malformed("CheckSum is not a valid 3-digit integer"))?;

        let computed = compute_checksum(&buf[..trailer_start]);
        if computed != declared_checksum {
            return Err(FixError::Framing(FramingError::CheckSumMismatch {
                declared: declared_checksum,
                actual: computed,
            }));
        }

        let body = &buf[header_end..trailer_start];
        let mut pairs = Vec::new();
        for field_bytes in body.split(|&b| b == SOH) {
            if field_bytes.is_empty() {
                continue;
            }
            let eq = field_bytes
                .iter()
                .position(|&b| b == b'=')
                .ok_or_else(|| malformed("field missing '='"))?;
            let tag: u32 = std::str::from_utf8(&field_bytes[..eq])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| malformed("field tag is not numeric"))?;
            pairs.push((tag, Bytes::copy_from_slice(&field_bytes[eq + 1..])));
        }

        let msg_type = pairs
            .iter()
            .find(|(t, _)| *t == tags::MSG_TYPE)
            .and_then(|(_, v)| std::str::from_utf8(v).ok())
            .ok_or_else(|| FixError::Protocol {
                reason: "message has no MsgType (35)".to_string(),
                ref_seq_num: None,
                ref_tag_id: Some(tags::MSG_TYPE),
            })?
            .to_string();

        let fields = message::build_fieldmap(&msg_type, pairs, &self.registry)?;
        let total_len = trailer_start + 3 + soh3_rel + 1;
        Ok(Some((Message::new(begin_string, fields), total_len)))
    }

    /// Serializes a message to wire bytes in canonical tag order
    /// (8, 9, 35, then other header tags, then body, then 10), recomputing
    /// BodyLength and CheckSum.
    pub fn encode(&self, msg: &Message) -> Result<Bytes> {
        let header_order = [
            tags::MSG_TYPE,
            tags::MSG_SEQ_NUM,
            tags::SENDER_COMP_ID,
            tags::TARGET_COMP_ID,
            tags::SENDING_TIME,
        ];
        let mut written: HashSet<u32> = HashSet::new();
        let mut body = BytesMut::new();
        for tag in header_order {
            if let Some(field) = msg.get(tag) {
                write_field(&mut body, tag, field.as_bytes());
                written.insert(tag);
            }
        }
        for (tag, value) in msg.fields().flatten() {
            if tag == tags::BEGIN_STRING || tag == tags::BODY_LENGTH || tag == tags::CHECK_SUM {
                continue;
            }
            if written.contains(&tag) {
                continue;
            }
            write_field(&mut body, tag, &value);
        }

        let mut out = BytesMut::new();
        write_field(&mut out, tags::BEGIN_STRING, msg.begin_string().as_bytes());
        write_field(&mut out, tags::BODY_LENGTH, body.len().to_string().as_bytes());
        out.extend_from_slice(&body);

        let checksum = compute_checksum(&out);
        out.extend_from_slice(format!("10={checksum:03}").as_bytes());
        out.put_u8(SOH);
        Ok(out.freeze())
    }

    /// Scans forward from the start of `buf` for the next plausible
    /// message boundary (an `8=` immediately following an SOH), used by
    /// the session to resynchronize after a framing error (spec.md §4.1).
    pub fn resync(&self, buf: &[u8]) -> Option<usize> {
        let search_from = usize::from(buf.starts_with(b"8="));
        memchr::memmem::find(&buf[search_from..], b"\x018=").map(|p| p + search_from + 1)
    }
}

fn write_field(buf: &mut BytesMut, tag: u32, value: &[u8]) {
    buf.extend_from_slice(tag.to_string().as_bytes());
    buf.put_u8(b'=');
    buf.extend_from_slice(value);
    buf.put_u8(SOH);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::tags;

    fn fix(s: &str) -> Bytes {
        Bytes::from(s.replace('|', "\u{1}"))
    }

    #[test]
    fn decode_needs_more_data_on_partial_buffer() {
        let codec = Codec::standard();
        let partial = fix("8=FIX.4.4|9=12|35=A");
        assert!(codec.try_decode(&partial).unwrap().is_none());
    }

    #[test]
    fn round_trip_logon() {
        let codec = Codec::standard();
        let msg = Message::logon("FIX.4.4", "SENDER", "TARGET", 30, false, None, None).unwrap();
        let encoded = codec.encode(&msg).unwrap();
        let (decoded, consumed) = codec.try_decode(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.msg_type(), Some("A"));
        assert_eq!(decoded.sender_comp_id(), Some("SENDER"));
        assert_eq!(decoded.get(tags::HEART_BT_INT).unwrap(), 30i64);
    }

    #[test]
    fn checksum_is_verified() {
        let codec = Codec::standard();
        let good = fix("8=FIX.4.4|9=5|35=0|10=000|");
        let err = codec.try_decode(&good).unwrap_err();
        assert!(matches!(
            err,
            FixError::Framing(FramingError::CheckSumMismatch { .. })
        ));
    }

    #[test]
    fn body_length_mismatch_does_not_advance() {
        let codec = Codec::standard();
        let msg = Message::heartbeat("FIX.4.4", "S", "T", None).unwrap();
        let mut encoded = codec.encode(&msg).unwrap().to_vec();
        // Corrupt the declared BodyLength so it no longer lines up with 10=.
        encoded[5] = b'9';
        let err = codec.try_decode(&encoded).unwrap_err();
        assert!(matches!(
            err,
            FixError::Framing(FramingError::BodyLengthMismatch { .. })
        ));
    }

    #[test]
    fn resync_finds_next_message_start() {
        let codec = Codec::standard();
        let garbage = fix("garbled|8=FIX.4.4|9=5|35=0|10=000|");
        let pos = codec.resync(&garbage).expect("should find resync point");
        assert!(garbage[pos..].starts_with(b"8="));
    }

    #[test]
    fn checksum_invariant_holds_for_every_encoded_message() {
        let codec = Codec::standard();
        let msg = Message::test_request("FIX.4.4", "S", "T", "TR1").unwrap();
        let encoded = codec.encode(&msg).unwrap();
        let trailer_pos = encoded.len() - 7; // "10=NNN" + SOH
        let sum = compute_checksum(&encoded[..trailer_pos]);
        let declared: u8 = std::str::from_utf8(&encoded[trailer_pos + 3..trailer_pos + 6])
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(sum, declared);
    }

    #[test]
    fn round_trip_preserves_repeating_group() {
        let codec = Codec::standard();
        let pairs = vec![
            (tags::MSG_TYPE, Bytes::from_static(b"8")),
            (tags::SENDER_COMP_ID, Bytes::from_static(b"S")),
            (tags::TARGET_COMP_ID, Bytes::from_static(b"T")),
            (tags::ORDER_ID, Bytes::from_static(b"O1")),
            (tags::NO_MISC_FEES, Bytes::from_static(b"1")),
            (tags::MISC_FEE_AMT, Bytes::from_static(b"2.00")),
            (tags::MISC_FEE_CURR, Bytes::from_static(b"USD")),
        ];
        let msg = Message::from_pairs("FIX.4.4", "8", pairs, codec.registry()).unwrap();
        let encoded = codec.encode(&msg).unwrap();
        let (decoded, _) = codec.try_decode(&encoded).unwrap().unwrap();
        let group = decoded.fields().group(tags::NO_MISC_FEES).unwrap();
        assert_eq!(group.size(), 1);
        assert_eq!(group.instances()[0].get(tags::MISC_FEE_CURR).unwrap(), "USD");
    }
}
