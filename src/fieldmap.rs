//! The ordered, multi-field container backing [`crate::message::Message`].
//!
//! Two concrete shapes (Design Note "Tagged variants"): [`DictFieldMap`] for
//! O(1) top-level lookup when every repeating group in the message has a
//! known template, [`ListFieldMap`] as the flat O(n) fallback. Both are
//! wrapped by [`FieldMap`], which is the uniform interface callers use.

use crate::dictionary::GroupSpec;
use crate::error::{FixError, Result};
use crate::field::Field;
use bytes::Bytes;
use std::collections::HashMap;

/// Lower/upper bounds for the standard tag range and the user-defined
/// custom tag range (spec.md §3). Anything outside both is `InvalidTag`.
pub const STANDARD_TAG_RANGE: std::ops::RangeInclusive<u32> = 1..=956;
pub const CUSTOM_TAG_RANGE: std::ops::RangeInclusive<u32> = 5000..=9999;

pub fn validate_tag(tag: u32) -> Result<()> {
    if STANDARD_TAG_RANGE.contains(&tag) || CUSTOM_TAG_RANGE.contains(&tag) {
        Ok(())
    } else {
        Err(FixError::InvalidTag(tag))
    }
}

/// One instance of a repeating group: an ordered list of fields, in the
/// order they appeared on the wire (or were inserted).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupInstance {
    fields: Vec<Field>,
}

impl GroupInstance {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn get(&self, tag: u32) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag() == tag)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// A repeating group: the count tag, the delimiter tag that marks each
/// instance boundary, the permitted member tags, and the ordered
/// instances themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    count_tag: u32,
    delimiter_tag: u32,
    member_tags: Vec<u32>,
    instances: Vec<GroupInstance>,
}

impl Group {
    pub fn new(spec: &GroupSpec) -> Self {
        Self {
            count_tag: spec.count_tag,
            delimiter_tag: spec.delimiter_tag,
            member_tags: spec.member_tags.to_vec(),
            instances: Vec::new(),
        }
    }

    pub fn count_tag(&self) -> u32 {
        self.count_tag
    }

    pub fn delimiter_tag(&self) -> u32 {
        self.delimiter_tag
    }

    pub fn member_tags(&self) -> &[u32] {
        &self.member_tags
    }

    pub fn is_member(&self, tag: u32) -> bool {
        self.member_tags.contains(&tag)
    }

    pub fn push_instance(&mut self, instance: GroupInstance) {
        self.instances.push(instance);
    }

    pub fn instances(&self) -> &[GroupInstance] {
        &self.instances
    }

    /// The declared size — the number of instances, which must equal the
    /// count field's value at decode time (checked by the codec).
    pub fn size(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// One item of top-level iteration order: either a plain field or a group
/// keyed by its count tag.
#[derive(Debug, Clone)]
pub enum FieldMapItem<'a> {
    Field(&'a Field),
    Group(&'a Group),
}

/// O(1)-lookup form: used when every repeating group in the message has a
/// known template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictFieldMap {
    order: Vec<u32>,
    fields: HashMap<u32, Field>,
    groups: HashMap<u32, Group>,
}

impl DictFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_field(&mut self, field: Field) {
        let tag = field.tag();
        if !self.fields.contains_key(&tag) && !self.groups.contains_key(&tag) {
            self.order.push(tag);
        }
        self.fields.insert(tag, field);
    }

    pub fn set_group(&mut self, group: Group) {
        let tag = group.count_tag();
        if !self.fields.contains_key(&tag) && !self.groups.contains_key(&tag) {
            self.order.push(tag);
        }
        self.groups.insert(tag, group);
    }

    pub fn get(&self, tag: u32) -> Option<&Field> {
        self.fields.get(&tag)
    }

    pub fn group(&self, count_tag: u32) -> Option<&Group> {
        self.groups.get(&count_tag)
    }

    /// Removes a field, or an entire group atomically if `tag` is a count
    /// tag (spec.md §4.2: "Removing a count field removes the entire
    /// group atomically").
    pub fn remove(&mut self, tag: u32) {
        self.order.retain(|t| *t != tag);
        self.fields.remove(&tag);
        self.groups.remove(&tag);
    }

    pub fn iter_items(&self) -> impl Iterator<Item = FieldMapItem<'_>> {
        self.order.iter().map(move |tag| {
            if let Some(f) = self.fields.get(tag) {
                FieldMapItem::Field(f)
            } else {
                FieldMapItem::Group(self.groups.get(tag).expect("order tag is tracked"))
            }
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Flat O(n) form used when no group template is known for the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFieldMap {
    fields: Vec<Field>,
}

impl ListFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn get(&self, tag: u32) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag() == tag)
    }

    pub fn remove(&mut self, tag: u32) {
        self.fields.retain(|f| f.tag() != tag);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The uniform container type. Callers do not need to know which shape
/// backs a given message; both variants expose the same operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMap {
    Dict(DictFieldMap),
    List(ListFieldMap),
}

impl Default for FieldMap {
    fn default() -> Self {
        FieldMap::Dict(DictFieldMap::new())
    }
}

impl FieldMap {
    pub fn dict() -> Self {
        FieldMap::Dict(DictFieldMap::new())
    }

    pub fn list() -> Self {
        FieldMap::List(ListFieldMap::new())
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, FieldMap::Dict(_))
    }

    pub fn get(&self, tag: u32) -> Option<&Field> {
        match self {
            FieldMap::Dict(d) => d.get(tag),
            FieldMap::List(l) => l.get(tag),
        }
    }

    pub fn group(&self, count_tag: u32) -> Option<&Group> {
        match self {
            FieldMap::Dict(d) => d.group(count_tag),
            FieldMap::List(_) => None,
        }
    }

    /// Sets (inserts or replaces) a plain field by tag. Validates the tag
    /// range (spec.md §4.2: unknown tags outside 5000-9999 fail).
    pub fn set(&mut self, tag: u32, value: impl Into<Bytes>) -> Result<()> {
        validate_tag(tag)?;
        let field = Field::new(tag, value.into());
        match self {
            FieldMap::Dict(d) => d.set_field(field),
            FieldMap::List(l) => {
                l.remove(tag);
                l.push(field);
            }
        }
        Ok(())
    }

    pub fn set_group(&mut self, group: Group) {
        match self {
            FieldMap::Dict(d) => d.set_group(group),
            FieldMap::List(l) => {
                // Degrade to flat fields: a list-form map has no group
                // structure, so a group assigned onto one is flattened.
                for instance in group.instances() {
                    for f in instance.fields() {
                        l.push(f.clone());
                    }
                }
            }
        }
    }

    pub fn remove(&mut self, tag: u32) {
        match self {
            FieldMap::Dict(d) => d.remove(tag),
            FieldMap::List(l) => l.remove(tag),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldMap::Dict(d) => d.len(),
            FieldMap::List(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldMap::Dict(d) => d.is_empty(),
            FieldMap::List(l) => l.is_empty(),
        }
    }

    /// Flattened (tag, value-bytes) pairs in wire order, expanding any
    /// groups in place. Used by the codec for encoding and by round-trip
    /// equality checks.
    pub fn flatten(&self) -> Vec<(u32, Bytes)> {
        let mut out = Vec::with_capacity(self.len());
        match self {
            FieldMap::Dict(d) => {
                for item in d.iter_items() {
                    match item {
                        FieldMapItem::Field(f) => out.push((f.tag(), Bytes::copy_from_slice(f.as_bytes()))),
                        FieldMapItem::Group(g) => {
                            out.push((g.count_tag(), Bytes::from(g.size().to_string())));
                            for instance in g.instances() {
                                for f in instance.fields() {
                                    out.push((f.tag(), Bytes::copy_from_slice(f.as_bytes())));
                                }
                            }
                        }
                    }
                }
            }
            FieldMap::List(l) => {
                for f in l.fields() {
                    out.push((f.tag(), Bytes::copy_from_slice(f.as_bytes())));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{tags, MISC_FEES_GROUP};

    #[test]
    fn rejects_tag_outside_ranges() {
        let mut m = FieldMap::dict();
        assert!(matches!(m.set(2000, "x"), Err(FixError::InvalidTag(2000))));
        assert!(m.set(5500, "x").is_ok());
    }

    #[test]
    fn dict_form_preserves_insertion_order() {
        let mut m = FieldMap::dict();
        m.set(tags::MSG_TYPE, "A").unwrap();
        m.set(tags::SENDER_COMP_ID, "S").unwrap();
        let tags_in_order: Vec<u32> = m.flatten().into_iter().map(|(t, _)| t).collect();
        assert_eq!(tags_in_order, vec![tags::MSG_TYPE, tags::SENDER_COMP_ID]);
    }

    #[test]
    fn removing_count_tag_removes_whole_group() {
        let mut m = FieldMap::dict();
        let mut group = Group::new(&MISC_FEES_GROUP);
        let mut inst = GroupInstance::new();
        inst.push(Field::new(tags::MISC_FEE_AMT, Bytes::from_static(b"1.5")));
        group.push_instance(inst);
        m.set_group(group);
        assert!(m.group(tags::NO_MISC_FEES).is_some());
        m.remove(tags::NO_MISC_FEES);
        assert!(m.group(tags::NO_MISC_FEES).is_none());
    }

    #[test]
    fn list_form_lookup_is_linear_but_correct() {
        let mut m = FieldMap::list();
        m.set(tags::CL_ORD_ID, "ORD1").unwrap();
        m.set(tags::SYMBOL, "EUR/USD").unwrap();
        assert_eq!(m.get(tags::SYMBOL).unwrap(), "EUR/USD");
    }
}
