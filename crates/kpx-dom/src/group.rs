use uuid::Uuid;

use kpx_core::{KpxError, KpxResult};

use crate::context::WriteContext;
use crate::custom_data::CustomData;
use crate::times::Times;
use crate::values::{
    format_bool, format_nullable_bool, format_optional_uuid, format_uuid, parse_bool, parse_int,
    parse_nullable_bool, parse_optional_uuid, parse_uuid,
};
use crate::xml::XmlNode;

pub const DEFAULT_GROUP_ICON: u32 = 48;

/// Group payload. Children live in the tree, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub uuid: Uuid,
    pub name: String,
    pub notes: String,
    pub icon_id: u32,
    pub custom_icon_uuid: Option<Uuid>,
    pub times: Times,
    pub is_expanded: bool,
    pub default_auto_type_sequence: String,
    /// `None` inherits from the parent
    pub enable_auto_type: Option<bool>,
    pub enable_searching: Option<bool>,
    pub last_top_visible_entry: Option<Uuid>,
    pub custom_data: CustomData,
    pub unknown: Vec<XmlNode>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            notes: String::new(),
            icon_id: DEFAULT_GROUP_ICON,
            custom_icon_uuid: None,
            times: Times::new(),
            is_expanded: true,
            default_auto_type_sequence: String::new(),
            enable_auto_type: None,
            enable_searching: None,
            last_top_visible_entry: None,
            custom_data: CustomData::default(),
            unknown: Vec::new(),
        }
    }

    /// Parse the group's own fields; `<Group>`/`<Entry>` children are left
    /// to the caller.
    pub(crate) fn from_xml(node: &XmlNode) -> KpxResult<Self> {
        let mut group = Group::new("");
        let mut has_uuid = false;
        for child in &node.children {
            let text = child.text.as_str();
            match child.name.as_str() {
                "UUID" => {
                    group.uuid = parse_uuid(text)?;
                    has_uuid = true;
                }
                "Name" => group.name = text.to_string(),
                "Notes" => group.notes = text.to_string(),
                "IconID" => group.icon_id = parse_int(&child.name, text)?,
                "CustomIconUUID" => group.custom_icon_uuid = parse_optional_uuid(text)?,
                "Times" => group.times = Times::from_xml(child)?,
                "IsExpanded" => group.is_expanded = parse_bool(text)?,
                "DefaultAutoTypeSequence" => group.default_auto_type_sequence = text.to_string(),
                "EnableAutoType" => group.enable_auto_type = parse_nullable_bool(text)?,
                "EnableSearching" => group.enable_searching = parse_nullable_bool(text)?,
                "LastTopVisibleEntry" => group.last_top_visible_entry = parse_optional_uuid(text)?,
                "CustomData" => group.custom_data = CustomData::from_xml(child)?,
                "Group" | "Entry" => {}
                _ => group.unknown.push(child.clone()),
            }
        }
        if !has_uuid {
            return Err(KpxError::document(format!(
                "<Group> {:?} without <UUID>",
                group.name
            )));
        }
        Ok(group)
    }

    /// The group element without its children.
    pub(crate) fn to_xml(&self, ctx: &WriteContext<'_>) -> XmlNode {
        let mut node = XmlNode::new("Group");
        node.push(XmlNode::leaf("UUID", format_uuid(&self.uuid)));
        node.push(XmlNode::leaf("Name", self.name.as_str()));
        node.push(XmlNode::leaf("Notes", self.notes.as_str()));
        node.push(XmlNode::leaf("IconID", self.icon_id.to_string()));
        if let Some(icon) = &self.custom_icon_uuid {
            node.push(XmlNode::leaf("CustomIconUUID", format_optional_uuid(Some(icon))));
        }
        node.push(self.times.to_xml(ctx));
        node.push(XmlNode::leaf("IsExpanded", format_bool(self.is_expanded)));
        node.push(XmlNode::leaf(
            "DefaultAutoTypeSequence",
            self.default_auto_type_sequence.as_str(),
        ));
        node.push(XmlNode::leaf(
            "EnableAutoType",
            format_nullable_bool(self.enable_auto_type),
        ));
        node.push(XmlNode::leaf(
            "EnableSearching",
            format_nullable_bool(self.enable_searching),
        ));
        node.push(XmlNode::leaf(
            "LastTopVisibleEntry",
            format_optional_uuid(self.last_top_visible_entry.as_ref()),
        ));
        if !self.custom_data.is_empty() {
            node.push(self.custom_data.to_xml(ctx.version));
        }
        node.children.extend(self.unknown.iter().cloned());
        node
    }
}
