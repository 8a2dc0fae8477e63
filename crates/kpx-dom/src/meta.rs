use std::collections::HashMap;
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use uuid::Uuid;

use kpx_core::{Compression, FormatVersion, KpxError, KpxResult};
use kpx_crypto::Keystream;

use crate::context::{ReadContext, WriteContext};
use crate::custom_data::CustomData;
use crate::protected::{obfuscate, BinaryPool, ProtectedBinary};
use crate::values::{
    format_bool, format_date, format_optional_uuid, parse_bool, parse_date, parse_int,
    parse_optional_uuid,
};
use crate::xml::XmlNode;

pub const DEFAULT_GENERATOR: &str = "kpx";
pub const DEFAULT_HISTORY_MAX_ITEMS: i32 = 10;
pub const DEFAULT_HISTORY_MAX_SIZE: i64 = 6 * 1024 * 1024;
pub const DEFAULT_MAINTENANCE_HISTORY_DAYS: u32 = 365;

/// Which standard entry fields are held protected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryProtection {
    pub protect_title: bool,
    pub protect_user_name: bool,
    pub protect_password: bool,
    pub protect_url: bool,
    pub protect_notes: bool,
}

impl Default for MemoryProtection {
    fn default() -> Self {
        Self {
            protect_title: false,
            protect_user_name: false,
            protect_password: true,
            protect_url: false,
            protect_notes: false,
        }
    }
}

impl MemoryProtection {
    /// Protection flag for a standard field key; custom fields default to off.
    pub fn for_key(&self, key: &str) -> bool {
        match key {
            "Title" => self.protect_title,
            "UserName" => self.protect_user_name,
            "Password" => self.protect_password,
            "URL" => self.protect_url,
            "Notes" => self.protect_notes,
            _ => false,
        }
    }

    fn from_xml(node: &XmlNode) -> KpxResult<Self> {
        let mut mp = MemoryProtection::default();
        for child in &node.children {
            let flag = parse_bool(&child.text)?;
            match child.name.as_str() {
                "ProtectTitle" => mp.protect_title = flag,
                "ProtectUserName" => mp.protect_user_name = flag,
                "ProtectPassword" => mp.protect_password = flag,
                "ProtectURL" => mp.protect_url = flag,
                "ProtectNotes" => mp.protect_notes = flag,
                _ => {}
            }
        }
        Ok(mp)
    }

    fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("MemoryProtection");
        for (name, flag) in [
            ("ProtectTitle", self.protect_title),
            ("ProtectUserName", self.protect_user_name),
            ("ProtectPassword", self.protect_password),
            ("ProtectURL", self.protect_url),
            ("ProtectNotes", self.protect_notes),
        ] {
            node.push(XmlNode::leaf(name, format_bool(flag)));
        }
        node
    }
}

/// Database-wide metadata (`<Meta>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub generator: String,
    pub database_name: String,
    pub database_name_changed: Option<DateTime<Utc>>,
    pub database_description: String,
    pub database_description_changed: Option<DateTime<Utc>>,
    pub default_user_name: String,
    pub default_user_name_changed: Option<DateTime<Utc>>,
    pub maintenance_history_days: u32,
    pub color: String,
    pub master_key_changed: Option<DateTime<Utc>>,
    pub master_key_change_rec: i64,
    pub master_key_change_force: i64,
    pub memory_protection: MemoryProtection,
    /// Kept verbatim
    pub custom_icons: Option<XmlNode>,
    pub recycle_bin_enabled: bool,
    pub recycle_bin_uuid: Option<Uuid>,
    pub recycle_bin_changed: Option<DateTime<Utc>>,
    pub entry_templates_group: Option<Uuid>,
    pub entry_templates_group_changed: Option<DateTime<Utc>>,
    /// Negative means unlimited
    pub history_max_items: i32,
    pub history_max_size: i64,
    pub last_selected_group: Option<Uuid>,
    pub last_top_visible_group: Option<Uuid>,
    pub custom_data: CustomData,
    pub unknown: Vec<XmlNode>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            generator: DEFAULT_GENERATOR.to_string(),
            database_name: String::new(),
            database_name_changed: None,
            database_description: String::new(),
            database_description_changed: None,
            default_user_name: String::new(),
            default_user_name_changed: None,
            maintenance_history_days: DEFAULT_MAINTENANCE_HISTORY_DAYS,
            color: String::new(),
            master_key_changed: None,
            master_key_change_rec: -1,
            master_key_change_force: -1,
            memory_protection: MemoryProtection::default(),
            custom_icons: None,
            recycle_bin_enabled: true,
            recycle_bin_uuid: None,
            recycle_bin_changed: None,
            entry_templates_group: None,
            entry_templates_group_changed: None,
            history_max_items: DEFAULT_HISTORY_MAX_ITEMS,
            history_max_size: DEFAULT_HISTORY_MAX_SIZE,
            last_selected_group: None,
            last_top_visible_group: None,
            custom_data: CustomData::default(),
            unknown: Vec::new(),
        }
    }
}

fn opt_date(text: &str) -> KpxResult<Option<DateTime<Utc>>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    parse_date(text).map(Some)
}

impl Metadata {
    /// Parse `<Meta>`, returning the stored header hash separately.
    pub(crate) fn from_xml(
        node: &XmlNode,
        ctx: &mut ReadContext<'_>,
    ) -> KpxResult<(Self, Option<Vec<u8>>)> {
        let mut meta = Metadata::default();
        let mut header_hash = None;
        for child in &node.children {
            let text = child.text.as_str();
            match child.name.as_str() {
                "Generator" => meta.generator = text.to_string(),
                "HeaderHash" => {
                    if !text.trim().is_empty() {
                        let hash = STANDARD
                            .decode(text.trim())
                            .map_err(|_| KpxError::document("HeaderHash is not base64"))?;
                        header_hash = Some(hash);
                    }
                }
                "DatabaseName" => meta.database_name = text.to_string(),
                "DatabaseNameChanged" => meta.database_name_changed = opt_date(text)?,
                "DatabaseDescription" => meta.database_description = text.to_string(),
                "DatabaseDescriptionChanged" => {
                    meta.database_description_changed = opt_date(text)?
                }
                "DefaultUserName" => meta.default_user_name = text.to_string(),
                "DefaultUserNameChanged" => meta.default_user_name_changed = opt_date(text)?,
                "MaintenanceHistoryDays" => {
                    meta.maintenance_history_days = parse_int(&child.name, text)?
                }
                "Color" => meta.color = text.to_string(),
                "MasterKeyChanged" => meta.master_key_changed = opt_date(text)?,
                "MasterKeyChangeRec" => meta.master_key_change_rec = parse_int(&child.name, text)?,
                "MasterKeyChangeForce" => {
                    meta.master_key_change_force = parse_int(&child.name, text)?
                }
                "MemoryProtection" => meta.memory_protection = MemoryProtection::from_xml(child)?,
                "CustomIcons" => meta.custom_icons = Some(child.clone()),
                "RecycleBinEnabled" => meta.recycle_bin_enabled = parse_bool(text)?,
                "RecycleBinUUID" => meta.recycle_bin_uuid = parse_optional_uuid(text)?,
                "RecycleBinChanged" => meta.recycle_bin_changed = opt_date(text)?,
                "EntryTemplatesGroup" => meta.entry_templates_group = parse_optional_uuid(text)?,
                "EntryTemplatesGroupChanged" => {
                    meta.entry_templates_group_changed = opt_date(text)?
                }
                "HistoryMaxItems" => meta.history_max_items = parse_int(&child.name, text)?,
                "HistoryMaxSize" => meta.history_max_size = parse_int(&child.name, text)?,
                "LastSelectedGroup" => meta.last_selected_group = parse_optional_uuid(text)?,
                "LastTopVisibleGroup" => meta.last_top_visible_group = parse_optional_uuid(text)?,
                "Binaries" => read_binaries(child, ctx)?,
                "CustomData" => meta.custom_data = CustomData::from_xml(child)?,
                _ => meta.unknown.push(child.clone()),
            }
        }
        Ok((meta, header_hash))
    }

    pub(crate) fn to_xml(
        &self,
        ctx: &mut WriteContext<'_>,
        binaries: &BinaryPool,
        header_hash: Option<&[u8]>,
    ) -> KpxResult<XmlNode> {
        let v = ctx.version;
        let mut node = XmlNode::new("Meta");
        node.push(XmlNode::leaf("Generator", self.generator.as_str()));
        if let Some(hash) = header_hash {
            node.push(XmlNode::leaf("HeaderHash", STANDARD.encode(hash)));
        }
        node.push(XmlNode::leaf("DatabaseName", self.database_name.as_str()));
        push_date(&mut node, "DatabaseNameChanged", &self.database_name_changed, v);
        node.push(XmlNode::leaf(
            "DatabaseDescription",
            self.database_description.as_str(),
        ));
        push_date(
            &mut node,
            "DatabaseDescriptionChanged",
            &self.database_description_changed,
            v,
        );
        node.push(XmlNode::leaf("DefaultUserName", self.default_user_name.as_str()));
        push_date(
            &mut node,
            "DefaultUserNameChanged",
            &self.default_user_name_changed,
            v,
        );
        node.push(XmlNode::leaf(
            "MaintenanceHistoryDays",
            self.maintenance_history_days.to_string(),
        ));
        node.push(XmlNode::leaf("Color", self.color.as_str()));
        push_date(&mut node, "MasterKeyChanged", &self.master_key_changed, v);
        node.push(XmlNode::leaf(
            "MasterKeyChangeRec",
            self.master_key_change_rec.to_string(),
        ));
        node.push(XmlNode::leaf(
            "MasterKeyChangeForce",
            self.master_key_change_force.to_string(),
        ));
        node.push(self.memory_protection.to_xml());
        if let Some(icons) = &self.custom_icons {
            node.push(icons.clone());
        }
        node.push(XmlNode::leaf(
            "RecycleBinEnabled",
            format_bool(self.recycle_bin_enabled),
        ));
        node.push(XmlNode::leaf(
            "RecycleBinUUID",
            format_optional_uuid(self.recycle_bin_uuid.as_ref()),
        ));
        push_date(&mut node, "RecycleBinChanged", &self.recycle_bin_changed, v);
        node.push(XmlNode::leaf(
            "EntryTemplatesGroup",
            format_optional_uuid(self.entry_templates_group.as_ref()),
        ));
        push_date(
            &mut node,
            "EntryTemplatesGroupChanged",
            &self.entry_templates_group_changed,
            v,
        );
        node.push(XmlNode::leaf(
            "HistoryMaxItems",
            self.history_max_items.to_string(),
        ));
        node.push(XmlNode::leaf("HistoryMaxSize", self.history_max_size.to_string()));
        node.push(XmlNode::leaf(
            "LastSelectedGroup",
            format_optional_uuid(self.last_selected_group.as_ref()),
        ));
        node.push(XmlNode::leaf(
            "LastTopVisibleGroup",
            format_optional_uuid(self.last_top_visible_group.as_ref()),
        ));
        if v == FormatVersion::V3 && !binaries.is_empty() {
            node.push(write_binaries(binaries, ctx)?);
        }
        node.push(self.custom_data.to_xml(v));
        node.children.extend(self.unknown.iter().cloned());
        Ok(node)
    }
}

fn push_date(node: &mut XmlNode, name: &str, value: &Option<DateTime<Utc>>, v: FormatVersion) {
    if let Some(dt) = value {
        node.push(XmlNode::leaf(name, format_date(dt, v)));
    }
}

/// `<Binaries>` of a V3 payload. IDs are remapped onto pool indices.
fn read_binaries(node: &XmlNode, ctx: &mut ReadContext<'_>) -> KpxResult<()> {
    let mut ids = HashMap::new();
    for binary in node.children.iter().filter(|c| c.name == "Binary") {
        let id: u64 = binary
            .attr("ID")
            .ok_or_else(|| KpxError::document("<Binary> missing required ID attribute"))?
            .trim()
            .parse()
            .map_err(|_| KpxError::document("<Binary> ID is not an integer"))?;
        let compressed = binary.attr("Compressed").map(parse_bool).transpose()?.unwrap_or(false);
        let protected = binary.attr("Protected").map(parse_bool).transpose()?.unwrap_or(false);

        let mut data = STANDARD
            .decode(binary.text.trim())
            .map_err(|_| KpxError::document(format!("binary {id} is not base64")))?;
        if protected {
            let pad = ctx.stream.get_bytes(data.len());
            data = obfuscate(&data, &pad);
        }
        if compressed {
            let mut out = Vec::new();
            GzDecoder::new(data.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| KpxError::document(format!("binary {id}: {e}")))?;
            data = out;
        }
        let index = ctx.binaries.push(ProtectedBinary::new(data, protected));
        ids.insert(id, index);
    }
    ctx.binary_ids = Some(ids);
    Ok(())
}

fn write_binaries(pool: &BinaryPool, ctx: &mut WriteContext<'_>) -> KpxResult<XmlNode> {
    let mut node = XmlNode::new("Binaries");
    for (id, binary) in pool.iter().enumerate() {
        let mut data = binary.data().to_vec();
        let mut xml = XmlNode::new("Binary").with_attr("ID", id.to_string());
        if ctx.compression == Compression::Gzip {
            let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(&data).map_err(anyhow::Error::from)?;
            data = enc.finish().map_err(anyhow::Error::from)?;
            xml = xml.with_attr("Compressed", "True");
        }
        if binary.is_protected() {
            let pad = ctx.stream.get_bytes(data.len());
            data = obfuscate(&data, &pad);
            xml = xml.with_attr("Protected", "True");
        }
        xml.text = STANDARD.encode(&data);
        node.push(xml);
    }
    Ok(node)
}
