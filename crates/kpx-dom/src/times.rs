use chrono::{DateTime, Utc};

use kpx_core::KpxResult;

use crate::context::WriteContext;
use crate::values::{format_bool, format_date, never, now, parse_bool, parse_date, parse_int};
use crate::xml::XmlNode;

/// Timestamps carried by every group and entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Times {
    pub creation: DateTime<Utc>,
    pub last_modification: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub expires: bool,
    pub usage_count: u64,
    pub location_changed: DateTime<Utc>,
    pub unknown: Vec<XmlNode>,
}

impl Times {
    /// All timestamps set to now; never expires.
    pub fn new() -> Self {
        let t = now();
        Self {
            creation: t,
            last_modification: t,
            last_access: t,
            expiry: never(),
            expires: false,
            usage_count: 0,
            location_changed: t,
            unknown: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        let t = now();
        self.last_modification = t;
        self.last_access = t;
    }

    pub(crate) fn from_xml(node: &XmlNode) -> KpxResult<Self> {
        let mut times = Times::new();
        for child in &node.children {
            match child.name.as_str() {
                "CreationTime" => times.creation = parse_date(&child.text)?,
                "LastModificationTime" => times.last_modification = parse_date(&child.text)?,
                "LastAccessTime" => times.last_access = parse_date(&child.text)?,
                "ExpiryTime" => times.expiry = parse_date(&child.text)?,
                "Expires" => times.expires = parse_bool(&child.text)?,
                "UsageCount" => times.usage_count = parse_int("UsageCount", &child.text)?,
                "LocationChanged" => times.location_changed = parse_date(&child.text)?,
                _ => times.unknown.push(child.clone()),
            }
        }
        Ok(times)
    }

    pub(crate) fn to_xml(&self, ctx: &WriteContext<'_>) -> XmlNode {
        let v = ctx.version;
        let mut node = XmlNode::new("Times");
        node.push(XmlNode::leaf("CreationTime", format_date(&self.creation, v)));
        node.push(XmlNode::leaf(
            "LastModificationTime",
            format_date(&self.last_modification, v),
        ));
        node.push(XmlNode::leaf("LastAccessTime", format_date(&self.last_access, v)));
        node.push(XmlNode::leaf("ExpiryTime", format_date(&self.expiry, v)));
        node.push(XmlNode::leaf("Expires", format_bool(self.expires)));
        node.push(XmlNode::leaf("UsageCount", self.usage_count.to_string()));
        node.push(XmlNode::leaf(
            "LocationChanged",
            format_date(&self.location_changed, v),
        ));
        node.children.extend(self.unknown.iter().cloned());
        node
    }
}

impl Default for Times {
    fn default() -> Self {
        Self::new()
    }
}
