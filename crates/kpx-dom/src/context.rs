//! Per-operation state threaded through XML (de)serialization.
//!
//! Protected values consume the inner stream strictly in document order, so
//! both directions walk the tree in the same order they emit or read it.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use kpx_core::{Compression, FormatVersion, KpxError, KpxResult};
use kpx_crypto::{Keystream, RandomStream};

use crate::protected::{BinaryPool, ProtectedString};
use crate::values::parse_bool;
use crate::xml::XmlNode;

pub(crate) struct ReadContext<'a> {
    pub stream: &'a mut RandomStream,
    pub binaries: BinaryPool,
    /// V3 `<Binary ID>` → pool index; V4 refs index the pool directly
    pub binary_ids: Option<HashMap<u64, usize>>,
}

impl ReadContext<'_> {
    /// Parse a `<String>` (or custom data style) key/value element.
    pub fn read_string(&mut self, node: &XmlNode) -> KpxResult<ProtectedString> {
        let key = node
            .child("Key")
            .map(|k| k.text.clone())
            .ok_or_else(|| KpxError::document("<String> without <Key>"))?;
        let Some(value) = node.child("Value") else {
            return Ok(ProtectedString::plain(key, ""));
        };

        let protected = match value.attr("Protected") {
            Some(flag) => parse_bool(flag)?,
            None => false,
        };
        if !protected {
            return Ok(ProtectedString::plain(key, &value.text));
        }

        let raw = STANDARD
            .decode(value.text.trim())
            .map_err(|_| KpxError::document(format!("protected value of {key:?} is not base64")))?;
        let pad = self.stream.get_bytes(raw.len());
        Ok(ProtectedString::from_raw(key, raw, pad))
    }

    /// Resolve an entry's `<Value Ref>` to a pool index.
    pub fn resolve_binary(&self, reference: &str) -> KpxResult<usize> {
        let id: u64 = reference
            .trim()
            .parse()
            .map_err(|_| KpxError::document(format!("invalid binary reference {reference:?}")))?;
        let index = match &self.binary_ids {
            Some(ids) => ids.get(&id).copied(),
            None => usize::try_from(id).ok(),
        };
        index
            .filter(|i| *i < self.binaries.len())
            .ok_or_else(|| KpxError::document(format!("binary reference {id} has no binary")))
    }
}

pub(crate) struct WriteContext<'a> {
    pub version: FormatVersion,
    pub compression: Compression,
    pub stream: &'a mut RandomStream,
}

impl WriteContext<'_> {
    pub fn write_string(&mut self, field: &ProtectedString) -> XmlNode {
        let mut node = XmlNode::new("String");
        node.push(XmlNode::leaf("Key", field.key()));
        let value = if field.is_protected() {
            let raw = field.encode_with(self.stream);
            XmlNode::leaf("Value", STANDARD.encode(raw)).with_attr("Protected", "True")
        } else {
            XmlNode::leaf("Value", field.clear().as_str())
        };
        node.push(value);
        node
    }
}
