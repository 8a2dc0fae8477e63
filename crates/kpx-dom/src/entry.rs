use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use uuid::Uuid;
use zeroize::Zeroizing;

use kpx_core::{KpxError, KpxResult};
use kpx_crypto::{Keystream, RandomStream};

use crate::context::{ReadContext, WriteContext};
use crate::custom_data::CustomData;
use crate::meta::Metadata;
use crate::placeholder;
use crate::protected::{obfuscate, ProtectedBinary, ProtectedString};
use crate::times::Times;
use crate::values::{
    format_color, format_optional_uuid, format_uuid, parse_bool, parse_color, parse_int,
    parse_optional_uuid, parse_uuid, Color,
};
use crate::xml::XmlNode;

/// Field keys every entry carries, in write order.
pub const STANDARD_FIELDS: [&str; 5] = ["Title", "UserName", "Password", "URL", "Notes"];

pub fn is_standard_field(key: &str) -> bool {
    STANDARD_FIELDS.contains(&key)
}

/// Named attachment pointing into the document's binary pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRef {
    pub key: String,
    pub id: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub uuid: Uuid,
    pub icon_id: u32,
    pub custom_icon_uuid: Option<Uuid>,
    pub foreground_color: Option<Color>,
    pub background_color: Option<Color>,
    pub override_url: String,
    pub tags: String,
    pub times: Times,
    /// Standard fields first, in `STANDARD_FIELDS` order, then custom fields
    fields: Vec<ProtectedString>,
    pub binaries: Vec<BinaryRef>,
    /// Kept verbatim
    pub auto_type: Option<XmlNode>,
    /// Prior snapshots, oldest first. Snapshots carry no history of their own.
    pub history: Vec<Entry>,
    pub custom_data: CustomData,
    pub unknown: Vec<XmlNode>,
}

impl Entry {
    /// Fresh entry with a random UUID; standard fields protected per `meta`.
    pub fn new(rng: &mut RandomStream, meta: &Metadata) -> Self {
        let fields = STANDARD_FIELDS
            .iter()
            .map(|key| {
                ProtectedString::new(*key, "", meta.memory_protection.for_key(key), rng)
            })
            .collect();
        Self {
            uuid: Uuid::new_v4(),
            icon_id: 0,
            custom_icon_uuid: None,
            foreground_color: None,
            background_color: None,
            override_url: String::new(),
            tags: String::new(),
            times: Times::new(),
            fields,
            binaries: Vec::new(),
            auto_type: None,
            history: Vec::new(),
            custom_data: CustomData::default(),
            unknown: Vec::new(),
        }
    }

    fn blank() -> Self {
        Self {
            uuid: Uuid::nil(),
            icon_id: 0,
            custom_icon_uuid: None,
            foreground_color: None,
            background_color: None,
            override_url: String::new(),
            tags: String::new(),
            times: Times::new(),
            fields: STANDARD_FIELDS
                .iter()
                .map(|key| ProtectedString::plain(*key, ""))
                .collect(),
            binaries: Vec::new(),
            auto_type: None,
            history: Vec::new(),
            custom_data: CustomData::default(),
            unknown: Vec::new(),
        }
    }

    pub fn fields(&self) -> &[ProtectedString] {
        &self.fields
    }

    pub fn custom_fields(&self) -> impl Iterator<Item = &ProtectedString> {
        self.fields.iter().filter(|f| !is_standard_field(f.key()))
    }

    pub fn field(&self, key: &str) -> Option<&ProtectedString> {
        self.fields.iter().find(|f| f.key() == key)
    }

    /// Clear value of a field, empty when absent.
    pub fn get(&self, key: &str) -> Zeroizing<String> {
        self.field(key)
            .map(|f| f.clear())
            .unwrap_or_else(|| Zeroizing::new(String::new()))
    }

    pub fn title(&self) -> Zeroizing<String> {
        self.get("Title")
    }

    /// The URL to open: the override URL when set, else the URL field,
    /// with placeholders expanded. Group placeholders stay unresolved; see
    /// `Document::resolve_url`.
    pub fn resolve_url(&self) -> Zeroizing<String> {
        placeholder::resolve(&self.url_template(), self, None)
    }

    pub(crate) fn url_template(&self) -> Zeroizing<String> {
        if self.override_url.is_empty() {
            self.get("URL")
        } else {
            Zeroizing::new(self.override_url.clone())
        }
    }

    /// Set a field's value and protection, adding a custom field if absent.
    pub fn set_field(&mut self, key: &str, value: &str, protected: bool, rng: &mut RandomStream) {
        match self.fields.iter_mut().find(|f| f.key() == key) {
            Some(field) => {
                field.set_protected(protected, rng);
                field.set_clear(value, rng);
            }
            None => self
                .fields
                .push(ProtectedString::new(key, value, protected, rng)),
        }
    }

    /// Remove a custom field. Standard fields are only ever cleared.
    pub fn remove_field(&mut self, key: &str) -> Option<ProtectedString> {
        if is_standard_field(key) {
            return None;
        }
        let index = self.fields.iter().position(|f| f.key() == key)?;
        Some(self.fields.remove(index))
    }

    fn put_parsed(&mut self, field: ProtectedString) {
        match self.fields.iter_mut().find(|f| f.key() == field.key()) {
            Some(slot) => *slot = field,
            None => self.fields.push(field),
        }
    }

    pub(crate) fn from_xml(node: &XmlNode, ctx: &mut ReadContext<'_>) -> KpxResult<Self> {
        let mut entry = Entry::blank();
        let mut has_uuid = false;
        for child in &node.children {
            let text = child.text.as_str();
            match child.name.as_str() {
                "UUID" => {
                    entry.uuid = parse_uuid(text)?;
                    has_uuid = true;
                }
                "IconID" => entry.icon_id = parse_int(&child.name, text)?,
                "CustomIconUUID" => entry.custom_icon_uuid = parse_optional_uuid(text)?,
                "ForegroundColor" => entry.foreground_color = parse_color(text)?,
                "BackgroundColor" => entry.background_color = parse_color(text)?,
                "OverrideURL" => entry.override_url = text.to_string(),
                "Tags" => entry.tags = text.to_string(),
                "Times" => entry.times = Times::from_xml(child)?,
                "String" => {
                    let field = ctx.read_string(child)?;
                    entry.put_parsed(field);
                }
                "Binary" => entry.binaries.push(read_binary_ref(child, ctx)?),
                "AutoType" => entry.auto_type = Some(child.clone()),
                "History" => {
                    for old in child.children.iter().filter(|c| c.name == "Entry") {
                        let mut snapshot = Entry::from_xml(old, ctx)?;
                        snapshot.history.clear();
                        entry.history.push(snapshot);
                    }
                }
                "CustomData" => entry.custom_data = CustomData::from_xml(child)?,
                _ => entry.unknown.push(child.clone()),
            }
        }
        if !has_uuid {
            return Err(KpxError::document("<Entry> without <UUID>"));
        }
        Ok(entry)
    }

    pub(crate) fn to_xml(&self, ctx: &mut WriteContext<'_>, in_history: bool) -> XmlNode {
        let mut node = XmlNode::new("Entry");
        node.push(XmlNode::leaf("UUID", format_uuid(&self.uuid)));
        node.push(XmlNode::leaf("IconID", self.icon_id.to_string()));
        if let Some(icon) = &self.custom_icon_uuid {
            node.push(XmlNode::leaf(
                "CustomIconUUID",
                format_optional_uuid(Some(icon)),
            ));
        }
        node.push(XmlNode::leaf(
            "ForegroundColor",
            format_color(self.foreground_color.as_ref()),
        ));
        node.push(XmlNode::leaf(
            "BackgroundColor",
            format_color(self.background_color.as_ref()),
        ));
        node.push(XmlNode::leaf("OverrideURL", self.override_url.as_str()));
        node.push(XmlNode::leaf("Tags", self.tags.as_str()));
        node.push(self.times.to_xml(ctx));
        for field in &self.fields {
            let xml = ctx.write_string(field);
            node.push(xml);
        }
        for binary in &self.binaries {
            let mut xml = XmlNode::new("Binary");
            xml.push(XmlNode::leaf("Key", binary.key.as_str()));
            xml.push(XmlNode::new("Value").with_attr("Ref", binary.id.to_string()));
            node.push(xml);
        }
        if let Some(auto_type) = &self.auto_type {
            node.push(auto_type.clone());
        }
        if !in_history {
            let mut history = XmlNode::new("History");
            for old in &self.history {
                history.push(old.to_xml(ctx, true));
            }
            node.push(history);
        }
        if !self.custom_data.is_empty() {
            node.push(self.custom_data.to_xml(ctx.version));
        }
        node.children.extend(self.unknown.iter().cloned());
        node
    }
}

/// `<Binary><Key/><Value Ref="n"/></Binary>`, or inline content which is
/// moved into the pool.
fn read_binary_ref(node: &XmlNode, ctx: &mut ReadContext<'_>) -> KpxResult<BinaryRef> {
    let key = node
        .child("Key")
        .map(|k| k.text.clone())
        .ok_or_else(|| KpxError::document("<Binary> without <Key>"))?;
    let value = node
        .child("Value")
        .ok_or_else(|| KpxError::document(format!("binary {key:?} without <Value>")))?;

    if let Some(reference) = value.attr("Ref") {
        let id = ctx.resolve_binary(reference)?;
        return Ok(BinaryRef { key, id });
    }

    let protected = value.attr("Protected").map(parse_bool).transpose()?.unwrap_or(false);
    let mut data = STANDARD
        .decode(value.text.trim())
        .map_err(|_| KpxError::document(format!("inline binary {key:?} is not base64")))?;
    if protected {
        let pad = ctx.stream.get_bytes(data.len());
        data = obfuscate(&data, &pad);
    }
    let id = ctx.binaries.add(ProtectedBinary::new(data, protected));
    Ok(BinaryRef { key, id })
}
