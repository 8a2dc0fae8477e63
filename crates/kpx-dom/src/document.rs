//! The in-memory database: metadata, the group/entry tree and the binary pool.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

use kpx_core::config::DatabaseConfig;
use kpx_core::{Compression, FormatVersion, InnerStreamId, KpxError, KpxResult};
use kpx_crypto::RandomStream;

use crate::context::{ReadContext, WriteContext};
use crate::entry::Entry;
use crate::group::Group;
use crate::meta::Metadata;
use crate::placeholder;
use crate::protected::BinaryPool;
use crate::tree::{Node, NodeId, Tree};
use crate::values::{format_date, format_uuid, now, parse_date, parse_uuid};
use crate::xml::{self, XmlNode};

/// Tombstone for a deleted group or entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedObject {
    pub uuid: Uuid,
    pub deletion_time: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Document {
    pub tree: Tree,
    pub meta: Metadata,
    pub binaries: BinaryPool,
    pub deleted_objects: Vec<DeletedObject>,
    /// Unknown children of `KeePassFile` and `Root`
    pub unknown: Vec<XmlNode>,
    pub root_unknown: Vec<XmlNode>,
    /// `Meta/HeaderHash` as read, checked by the codec for V3 files
    pub header_hash: Option<Vec<u8>>,
    /// Pads for values protected in memory
    pub rng: RandomStream,
}

fn document_rng() -> RandomStream {
    RandomStream::generate(InnerStreamId::ChaCha20).0
}

impl Document {
    /// Empty database whose root group carries `name`.
    pub fn new(name: &str, config: &DatabaseConfig) -> Self {
        let t = now();
        let meta = Metadata {
            database_name: name.to_string(),
            database_name_changed: Some(t),
            database_description_changed: Some(t),
            default_user_name_changed: Some(t),
            master_key_changed: Some(t),
            recycle_bin_changed: Some(t),
            entry_templates_group_changed: Some(t),
            history_max_items: config.history_max_items,
            ..Metadata::default()
        };
        Self {
            tree: Tree::new(Group::new(name)),
            meta,
            binaries: BinaryPool::new(),
            deleted_objects: Vec::new(),
            unknown: Vec::new(),
            root_unknown: Vec::new(),
            header_hash: None,
            rng: document_rng(),
        }
    }

    /// Parse an XML payload. `stream` is the inner stream from the header,
    /// `binaries` the pool from the V4 inner header (empty for V3).
    pub fn from_xml(
        bytes: &[u8],
        version: FormatVersion,
        stream: &mut RandomStream,
        binaries: BinaryPool,
    ) -> KpxResult<Self> {
        let root = xml::parse(bytes)?;
        root.expect_name("KeePassFile")?;

        let mut ctx = ReadContext {
            stream,
            binaries,
            binary_ids: None,
        };
        let mut meta = None;
        let mut header_hash = None;
        let mut tree = None;
        let mut deleted_objects = Vec::new();
        let mut unknown = Vec::new();
        let mut root_unknown = Vec::new();

        for child in &root.children {
            match child.name.as_str() {
                "Meta" => {
                    let (m, hash) = Metadata::from_xml(child, &mut ctx)?;
                    meta = Some(m);
                    header_hash = hash;
                }
                "Root" => {
                    for part in &child.children {
                        match part.name.as_str() {
                            "Group" if tree.is_none() => tree = Some(read_tree(part, &mut ctx)?),
                            "DeletedObjects" => deleted_objects = read_deleted(part)?,
                            _ => root_unknown.push(part.clone()),
                        }
                    }
                }
                _ => unknown.push(child.clone()),
            }
        }

        let tree = tree.ok_or_else(|| KpxError::document("<Root> has no group"))?;
        debug!(
            ?version,
            nodes = tree.len(),
            binaries = ctx.binaries.len(),
            "payload parsed"
        );
        Ok(Self {
            tree,
            meta: meta.unwrap_or_default(),
            binaries: ctx.binaries,
            deleted_objects,
            unknown,
            root_unknown,
            header_hash,
            rng: document_rng(),
        })
    }

    /// Serialize to an XML payload, re-protecting values under `stream`.
    pub fn to_xml(
        &self,
        version: FormatVersion,
        compression: Compression,
        stream: &mut RandomStream,
        header_hash: Option<&[u8]>,
    ) -> KpxResult<Vec<u8>> {
        let mut ctx = WriteContext {
            version,
            compression,
            stream,
        };
        let mut root = XmlNode::new("KeePassFile");
        root.push(self.meta.to_xml(&mut ctx, &self.binaries, header_hash)?);

        let mut body = XmlNode::new("Root");
        body.push(self.write_group(self.tree.root(), &mut ctx));
        let mut deleted = XmlNode::new("DeletedObjects");
        for obj in &self.deleted_objects {
            let mut xml = XmlNode::new("DeletedObject");
            xml.push(XmlNode::leaf("UUID", format_uuid(&obj.uuid)));
            xml.push(XmlNode::leaf("DeletionTime", format_date(&obj.deletion_time, version)));
            deleted.push(xml);
        }
        body.push(deleted);
        body.children.extend(self.root_unknown.iter().cloned());
        root.push(body);
        root.children.extend(self.unknown.iter().cloned());

        xml::write(&root)
    }

    fn write_group(&self, id: NodeId, ctx: &mut WriteContext<'_>) -> XmlNode {
        let Some(group) = self.tree.group(id) else {
            return XmlNode::new("Group");
        };
        let mut node = group.to_xml(ctx);
        for child in self.tree.children(id) {
            match self.tree.get(*child) {
                Some(Node::Entry(entry)) => node.push(entry.to_xml(ctx, false)),
                Some(Node::Group(_)) => node.push(self.write_group(*child, ctx)),
                None => {}
            }
        }
        node
    }

    /// Fresh entry with standard fields protected per the memory protection settings.
    pub fn new_entry(&mut self) -> Entry {
        Entry::new(&mut self.rng, &self.meta)
    }

    /// Remove a node and record tombstones for it and everything below it.
    pub fn delete(&mut self, id: NodeId) -> KpxResult<()> {
        let deletion_time = now();
        for node in self.tree.remove(id)? {
            self.deleted_objects.push(DeletedObject {
                uuid: node.uuid(),
                deletion_time,
            });
        }
        Ok(())
    }

    /// `EnableSearching` of the nearest group that sets it; the root defaults to on.
    fn searching_enabled(&self, group: NodeId) -> bool {
        let mut cur = Some(group);
        while let Some(id) = cur {
            if let Some(flag) = self.tree.group(id).and_then(|g| g.enable_searching) {
                return flag;
            }
            cur = self.tree.parent(id);
        }
        true
    }

    /// Case-insensitive substring search, in tree order. Groups match on
    /// name; entries on title, tags and unprotected field values, and only
    /// when their group allows searching. The root itself is never returned.
    pub fn search(&self, query: &str) -> Vec<NodeId> {
        let needle = query.to_lowercase();
        let matches = |text: &str| text.to_lowercase().contains(&needle);
        let root = self.tree.root();

        self.tree
            .descendants(root)
            .into_iter()
            .filter(|id| *id != root)
            .filter(|id| match self.tree.get(*id) {
                Some(Node::Group(g)) => matches(g.name.as_str()),
                Some(Node::Entry(e)) => {
                    let allowed = self
                        .tree
                        .parent(*id)
                        .is_some_and(|p| self.searching_enabled(p));
                    allowed
                        && (matches(e.title().as_str())
                            || matches(e.tags.as_str())
                            || e.fields()
                                .iter()
                                .filter(|f| !f.is_protected())
                                .any(|f| matches(f.clear().as_str())))
                }
                None => false,
            })
            .collect()
    }

    /// `Entry::resolve_url` with the parent group available to
    /// `{GROUP}` placeholders. `None` when `id` is not an entry.
    pub fn resolve_url(&self, id: NodeId) -> Option<Zeroizing<String>> {
        let entry = self.tree.entry(id)?;
        let group = self.tree.parent(id).and_then(|p| self.tree.group(p));
        Some(placeholder::resolve(&entry.url_template(), entry, group))
    }

    /// Names from the root down to `id`, joined with `/`.
    pub fn path_string(&self, id: NodeId) -> String {
        self.tree
            .path(id)
            .into_iter()
            .filter_map(|n| match self.tree.get(n)? {
                Node::Group(g) => Some(g.name.clone()),
                Node::Entry(e) => Some(e.title().to_string()),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Overwrite entry `id` with `proposed`. With `touch`, the current state
    /// is archived to history first and the modification time bumped; a
    /// revert passes `touch = false`. UUID and history are kept.
    pub fn sync_entry(&mut self, id: NodeId, proposed: Entry, touch: bool) -> KpxResult<()> {
        let max_items = self.meta.history_max_items;
        let current = self
            .tree
            .entry_mut(id)
            .ok_or_else(|| KpxError::Other(anyhow::anyhow!("sync_entry: node is not an entry")))?;

        let mut history = std::mem::take(&mut current.history);
        if touch {
            let mut snapshot = current.clone();
            snapshot.history.clear();
            history.push(snapshot);
            trim_history(&mut history, max_items);
        }

        let uuid = current.uuid;
        *current = proposed;
        current.uuid = uuid;
        current.history = history;
        if touch {
            current.times.touch();
        }
        debug!(%uuid, touch, history = current.history.len(), "entry synced");
        Ok(())
    }

    /// Overwrite group `id`'s own fields with `proposed`, keeping its UUID.
    pub fn sync_group(&mut self, id: NodeId, proposed: Group, touch: bool) -> KpxResult<()> {
        let current = self
            .tree
            .group_mut(id)
            .ok_or_else(|| KpxError::Other(anyhow::anyhow!("sync_group: node is not a group")))?;
        let uuid = current.uuid;
        *current = proposed;
        current.uuid = uuid;
        if touch {
            current.times.touch();
        }
        Ok(())
    }

    /// Store a working copy: an entry already in the tree is synced with
    /// history, a new one is inserted under `parent` without any.
    pub fn commit_entry(&mut self, parent: NodeId, working: Entry) -> KpxResult<NodeId> {
        match self.tree.find_by_uuid(&working.uuid) {
            Some(id) if self.tree.entry(id).is_some() => {
                self.sync_entry(id, working, true)?;
                Ok(id)
            }
            Some(_) => Err(KpxError::Other(anyhow::anyhow!(
                "commit_entry: UUID belongs to a group"
            ))),
            None => self.tree.insert(parent, Node::Entry(working)),
        }
    }
}

/// Drop the oldest snapshots beyond `max_items`; negative means unlimited.
fn trim_history(history: &mut Vec<Entry>, max_items: i32) {
    let Ok(max) = usize::try_from(max_items) else {
        return;
    };
    if history.len() > max {
        let excess = history.len() - max;
        history.drain(..excess);
    }
}

/// Structural equality over the stored database; the document RNG and the
/// header hash read from the file are not part of it.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree
            && self.meta == other.meta
            && self.binaries == other.binaries
            && self.deleted_objects == other.deleted_objects
            && self.unknown == other.unknown
            && self.root_unknown == other.root_unknown
    }
}

impl Clone for Document {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            meta: self.meta.clone(),
            binaries: self.binaries.clone(),
            deleted_objects: self.deleted_objects.clone(),
            unknown: self.unknown.clone(),
            root_unknown: self.root_unknown.clone(),
            header_hash: self.header_hash.clone(),
            rng: self.rng.clone(),
        }
    }
}

fn read_tree(node: &XmlNode, ctx: &mut ReadContext<'_>) -> KpxResult<Tree> {
    let mut tree = Tree::new(Group::from_xml(node)?);
    let root = tree.root();
    read_children(node, root, &mut tree, ctx)?;
    Ok(tree)
}

fn read_children(
    node: &XmlNode,
    parent: NodeId,
    tree: &mut Tree,
    ctx: &mut ReadContext<'_>,
) -> KpxResult<()> {
    for child in &node.children {
        match child.name.as_str() {
            "Group" => {
                let id = tree.insert(parent, Node::Group(Group::from_xml(child)?))?;
                read_children(child, id, tree, ctx)?;
            }
            "Entry" => {
                tree.insert(parent, Node::Entry(Entry::from_xml(child, ctx)?))?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn read_deleted(node: &XmlNode) -> KpxResult<Vec<DeletedObject>> {
    node.children
        .iter()
        .filter(|c| c.name == "DeletedObject")
        .map(|obj| {
            let uuid = obj
                .child("UUID")
                .ok_or_else(|| KpxError::document("<DeletedObject> without <UUID>"))?;
            let deletion_time = match obj.child("DeletionTime") {
                Some(t) => parse_date(&t.text)?,
                None => now(),
            };
            Ok(DeletedObject {
                uuid: parse_uuid(&uuid.text)?,
                deletion_time,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protected::ProtectedBinary;
    use crate::entry::BinaryRef;

    fn sample() -> Document {
        let mut doc = Document::new("Vault", &DatabaseConfig::default());
        let root = doc.tree.root();
        let email = doc
            .tree
            .insert(root, Node::Group(Group::new("Email")))
            .unwrap();

        let mut entry = doc.new_entry();
        entry.set_field("Title", "Mailbox", false, &mut doc.rng);
        entry.set_field("Password", "hunter2", true, &mut doc.rng);
        entry.set_field("Recovery", "code-42", true, &mut doc.rng);
        let id = doc.binaries.add(ProtectedBinary::new(b"attachment".to_vec(), true));
        entry.binaries.push(BinaryRef {
            key: "notes.txt".into(),
            id,
        });
        doc.tree.insert(email, Node::Entry(entry)).unwrap();
        doc
    }

    fn roundtrip(doc: &Document, version: FormatVersion, compression: Compression) -> Document {
        let (mut out, key) = RandomStream::generate(InnerStreamId::Salsa20);
        let mut inp = RandomStream::new(InnerStreamId::Salsa20, &key).unwrap();
        let bytes = doc.to_xml(version, compression, &mut out, None).unwrap();
        let pool = match version {
            FormatVersion::V3 => BinaryPool::new(),
            FormatVersion::V4 => doc.binaries.clone(),
        };
        Document::from_xml(&bytes, version, &mut inp, pool).unwrap()
    }

    #[test]
    fn test_roundtrip_both_versions() {
        let doc = sample();
        for version in [FormatVersion::V3, FormatVersion::V4] {
            for compression in [Compression::None, Compression::Gzip] {
                assert_eq!(roundtrip(&doc, version, compression), doc, "{version:?} {compression:?}");
            }
        }
    }

    #[test]
    fn test_header_hash_written_and_read() {
        let doc = sample();
        let (mut out, key) = RandomStream::generate(InnerStreamId::Salsa20);
        let bytes = doc
            .to_xml(FormatVersion::V3, Compression::None, &mut out, Some(&[7u8; 32]))
            .unwrap();
        let mut inp = RandomStream::new(InnerStreamId::Salsa20, &key).unwrap();
        let parsed =
            Document::from_xml(&bytes, FormatVersion::V3, &mut inp, BinaryPool::new()).unwrap();
        assert_eq!(parsed.header_hash.as_deref(), Some(&[7u8; 32][..]));
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_protected_values_not_in_clear() {
        let doc = sample();
        let (mut out, _) = RandomStream::generate(InnerStreamId::ChaCha20);
        let bytes = doc
            .to_xml(FormatVersion::V4, Compression::None, &mut out, None)
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Mailbox"));
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("code-42"));
    }

    #[test]
    fn test_wrong_stream_garbles_protected_values() {
        let doc = sample();
        let (mut out, _) = RandomStream::generate(InnerStreamId::Salsa20);
        let bytes = doc
            .to_xml(FormatVersion::V4, Compression::None, &mut out, None)
            .unwrap();
        let (mut other, _) = RandomStream::generate(InnerStreamId::Salsa20);
        let parsed =
            Document::from_xml(&bytes, FormatVersion::V4, &mut other, doc.binaries.clone())
                .unwrap();
        assert_ne!(parsed, doc);
    }

    #[test]
    fn test_sync_archives_exactly_one_snapshot() {
        let mut doc = sample();
        let id = doc.search("Mailbox")[0];
        let mut working = doc.tree.entry(id).unwrap().clone();
        working.set_field("Password", "correct horse", true, &mut doc.rng);
        doc.commit_entry(doc.tree.root(), working).unwrap();

        let entry = doc.tree.entry(id).unwrap();
        assert_eq!(entry.get("Password").as_str(), "correct horse");
        assert_eq!(entry.history.len(), 1);
        assert_eq!(entry.history[0].get("Password").as_str(), "hunter2");
        assert!(entry.history[0].history.is_empty());
    }

    #[test]
    fn test_commit_new_entry_has_no_history() {
        let mut doc = sample();
        let mut fresh = doc.new_entry();
        fresh.set_field("Title", "Fresh", false, &mut doc.rng);
        let root = doc.tree.root();
        let id = doc.commit_entry(root, fresh).unwrap();
        assert!(doc.tree.entry(id).unwrap().history.is_empty());
        assert_eq!(doc.tree.parent(id), Some(root));
    }

    #[test]
    fn test_sync_without_touch_keeps_history() {
        let mut doc = sample();
        let id = doc.search("Mailbox")[0];
        let mut revert = doc.tree.entry(id).unwrap().clone();
        revert.tags = "reverted".into();
        doc.sync_entry(id, revert, false).unwrap();
        let entry = doc.tree.entry(id).unwrap();
        assert!(entry.history.is_empty());
        assert_eq!(entry.tags, "reverted");
    }

    #[test]
    fn test_history_trimmed_oldest_first() {
        let mut doc = sample();
        doc.meta.history_max_items = 2;
        let id = doc.search("Mailbox")[0];
        for n in 0..4 {
            let mut working = doc.tree.entry(id).unwrap().clone();
            working.tags = format!("v{n}");
            doc.sync_entry(id, working, true).unwrap();
        }
        let tags: Vec<_> = doc.tree.entry(id).unwrap().history.iter().map(|h| h.tags.clone()).collect();
        assert_eq!(tags, ["v1", "v2"]);
    }

    #[test]
    fn test_search_respects_enable_searching() {
        let mut doc = sample();
        let email = doc.search("email")[0];
        assert_eq!(doc.search("mailbox").len(), 1);
        assert_eq!(doc.search("code-42").len(), 0, "protected values are not searched");

        doc.tree.group_mut(email).unwrap().enable_searching = Some(false);
        assert!(doc.search("mailbox").is_empty());
        assert_eq!(doc.search("EMAIL"), vec![email], "groups stay visible");
        assert_eq!(doc.path_string(email), "Vault/Email");
    }

    #[test]
    fn test_delete_records_tombstones() {
        let mut doc = sample();
        let email = doc.search("email")[0];
        doc.delete(email).unwrap();
        assert_eq!(doc.deleted_objects.len(), 2);
        assert!(doc.search("mailbox").is_empty());
        assert_eq!(roundtrip(&doc, FormatVersion::V4, Compression::None), doc);
    }

    #[test]
    fn test_unknown_elements_preserved() {
        let doc = sample();
        let (mut out, key) = RandomStream::generate(InnerStreamId::Salsa20);
        let bytes = doc
            .to_xml(FormatVersion::V4, Compression::None, &mut out, None)
            .unwrap();
        let mut root = xml::parse(&bytes).unwrap();
        root.push(XmlNode::leaf("FutureThing", "x"));
        let bytes = xml::write(&root).unwrap();

        let mut inp = RandomStream::new(InnerStreamId::Salsa20, &key).unwrap();
        let parsed =
            Document::from_xml(&bytes, FormatVersion::V4, &mut inp, doc.binaries.clone())
                .unwrap();
        assert_eq!(parsed.unknown, vec![XmlNode::leaf("FutureThing", "x")]);
        let again = roundtrip(&parsed, FormatVersion::V4, Compression::None);
        assert_eq!(again, parsed);
    }

    #[test]
    fn test_v3_binary_without_id_rejected() {
        let xml = br#"<KeePassFile><Meta><Binaries><Binary>AAAA</Binary></Binaries></Meta>
<Root><Group><UUID>AAAAAAAAAAAAAAAAAAAAAA==</UUID></Group></Root></KeePassFile>"#;
        let mut stream = RandomStream::new(InnerStreamId::Salsa20, b"k").unwrap();
        let err = Document::from_xml(xml, FormatVersion::V3, &mut stream, BinaryPool::new())
            .unwrap_err();
        assert!(matches!(err, KpxError::DocumentMalformed(_)));
    }

    mod generated {
        use std::collections::BTreeMap;

        use proptest::prelude::*;

        use super::*;
        use crate::entry::{is_standard_field, STANDARD_FIELDS};

        #[derive(Debug, Clone)]
        struct EntryPlan {
            standard: Vec<(String, bool)>,
            custom: BTreeMap<String, (String, bool)>,
            attachments: Vec<(Vec<u8>, bool)>,
            history: Vec<String>,
        }

        #[derive(Debug, Clone)]
        enum NodePlan {
            Group(String),
            Entry(EntryPlan),
        }

        fn field_value() -> impl Strategy<Value = String> {
            prop_oneof![
                Just(String::new()),
                Just("   ".to_string()),
                Just("first line\r\nsecond line".to_string()),
                "[ \t\r\n]{1,4}",
                "[ -~]{0,24}",
                "[a-z]{1,6}(\r\n[a-z]{1,6}){0,3}",
            ]
        }

        fn entry_plan() -> impl Strategy<Value = EntryPlan> {
            let custom_key =
                "[A-Z][a-z]{2,8}".prop_filter("standard keys are fixed", |k| !is_standard_field(k));
            (
                proptest::collection::vec((field_value(), any::<bool>()), 5),
                proptest::collection::btree_map(custom_key, (field_value(), any::<bool>()), 0..3),
                proptest::collection::vec(
                    (proptest::collection::vec(any::<u8>(), 1..48), any::<bool>()),
                    0..3,
                ),
                proptest::collection::vec(field_value(), 0..3),
            )
                .prop_map(|(standard, custom, attachments, history)| EntryPlan {
                    standard,
                    custom,
                    attachments,
                    history,
                })
        }

        /// A node and a pick among the groups created so far for its parent.
        fn node_plan() -> impl Strategy<Value = (usize, NodePlan)> {
            (
                any::<usize>(),
                prop_oneof![
                    "[ -~]{0,12}".prop_map(NodePlan::Group),
                    entry_plan().prop_map(NodePlan::Entry),
                ],
            )
        }

        fn build(plans: Vec<(usize, NodePlan)>) -> Document {
            let mut doc = Document::new("Generated", &DatabaseConfig::default());
            let mut groups = vec![doc.tree.root()];
            for (pick, plan) in plans {
                let parent = groups[pick % groups.len()];
                match plan {
                    NodePlan::Group(name) => {
                        let id = doc.tree.insert(parent, Node::Group(Group::new(name))).unwrap();
                        groups.push(id);
                    }
                    NodePlan::Entry(plan) => {
                        let mut entry = doc.new_entry();
                        for (key, (value, protected)) in STANDARD_FIELDS.iter().zip(&plan.standard) {
                            entry.set_field(key, value, *protected, &mut doc.rng);
                        }
                        for (key, (value, protected)) in &plan.custom {
                            entry.set_field(key, value, *protected, &mut doc.rng);
                        }
                        for (n, (data, protected)) in plan.attachments.into_iter().enumerate() {
                            let id = doc.binaries.add(ProtectedBinary::new(data, protected));
                            entry.binaries.push(BinaryRef {
                                key: format!("file{n}.bin"),
                                id,
                            });
                        }
                        for old in plan.history {
                            let mut snapshot = entry.clone();
                            snapshot.history.clear();
                            snapshot.set_field("Password", &old, true, &mut doc.rng);
                            entry.history.push(snapshot);
                        }
                        doc.tree.insert(parent, Node::Entry(entry)).unwrap();
                    }
                }
            }
            doc
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]
            #[test]
            fn any_document_roundtrips(plans in proptest::collection::vec(node_plan(), 0..12)) {
                let doc = build(plans);
                for version in [FormatVersion::V3, FormatVersion::V4] {
                    for compression in [Compression::None, Compression::Gzip] {
                        let back = roundtrip(&doc, version, compression);
                        prop_assert_eq!(&back, &doc, "{:?} {:?}", version, compression);
                    }
                }
            }
        }
    }
}
