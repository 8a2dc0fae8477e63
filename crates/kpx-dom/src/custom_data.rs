use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use kpx_core::{FormatVersion, KpxError, KpxResult};

use crate::values::{format_date, parse_date};
use crate::xml::XmlNode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomItem {
    pub value: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Plugin key/value pairs, kept sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomData {
    items: BTreeMap<String, CustomItem>,
}

impl CustomData {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(|i| i.value.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.insert(
            key.into(),
            CustomItem {
                value: value.into(),
                last_modified: None,
            },
        );
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.items.remove(key).map(|i| i.value)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.value.as_str()))
    }

    pub(crate) fn from_xml(node: &XmlNode) -> KpxResult<Self> {
        let mut data = CustomData::default();
        for item in node.children.iter().filter(|c| c.name == "Item") {
            let key = item
                .child("Key")
                .ok_or_else(|| KpxError::document("custom data item without <Key>"))?;
            let value = item.child("Value").map(|v| v.text.clone()).unwrap_or_default();
            let last_modified = item
                .child("LastModificationTime")
                .map(|t| parse_date(&t.text))
                .transpose()?;
            data.items.insert(
                key.text.clone(),
                CustomItem {
                    value,
                    last_modified,
                },
            );
        }
        Ok(data)
    }

    pub(crate) fn to_xml(&self, version: FormatVersion) -> XmlNode {
        let mut node = XmlNode::new("CustomData");
        for (key, item) in &self.items {
            let mut xml = XmlNode::new("Item");
            xml.push(XmlNode::leaf("Key", key.as_str()));
            xml.push(XmlNode::leaf("Value", item.value.as_str()));
            if let Some(t) = &item.last_modified {
                xml.push(XmlNode::leaf("LastModificationTime", format_date(t, version)));
            }
            node.push(xml);
        }
        node
    }
}
