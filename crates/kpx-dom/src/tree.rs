//! Group/entry hierarchy stored in an arena.
//!
//! Nodes are addressed by [`NodeId`]; a parent holds the ordered ids of its
//! children and every child holds its parent's id. Removed slots are left
//! empty, so ids of live nodes never change.

use uuid::Uuid;

use kpx_core::{KpxError, KpxResult};

use crate::entry::Entry;
use crate::group::Group;
use crate::values::now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Group(Group),
    Entry(Entry),
}

impl Node {
    pub fn uuid(&self) -> Uuid {
        match self {
            Node::Group(g) => g.uuid,
            Node::Entry(e) => e.uuid,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(g) => Some(g),
            Node::Entry(_) => None,
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Node::Entry(e) => Some(e),
            Node::Group(_) => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Node::Group(_))
    }

    fn times_mut(&mut self) -> &mut crate::times::Times {
        match self {
            Node::Group(g) => &mut g.times,
            Node::Entry(e) => &mut e.times,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    node: Node,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Tree {
    slots: Vec<Option<Slot>>,
    /// Vacated slot indices, reused by `insert`
    free: Vec<usize>,
    root: NodeId,
}

fn tree_err(msg: impl std::fmt::Display) -> KpxError {
    KpxError::Other(anyhow::anyhow!("tree: {msg}"))
}

impl Tree {
    pub fn new(root: Group) -> Self {
        Self {
            slots: vec![Some(Slot {
                node: Node::Group(root),
                parent: None,
                children: Vec::new(),
            })],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    fn live(&self, id: NodeId) -> KpxResult<&Slot> {
        self.slot(id)
            .ok_or_else(|| tree_err(format!("no node {}", id.0)))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slot(id).map(|s| &s.node)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slot_mut(id).map(|s| &mut s.node)
    }

    pub fn group(&self, id: NodeId) -> Option<&Group> {
        self.get(id).and_then(Node::as_group)
    }

    pub fn group_mut(&mut self, id: NodeId) -> Option<&mut Group> {
        match self.get_mut(id) {
            Some(Node::Group(g)) => Some(g),
            _ => None,
        }
    }

    pub fn entry(&self, id: NodeId) -> Option<&Entry> {
        self.get(id).and_then(Node::as_entry)
    }

    pub fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        match self.get_mut(id) {
            Some(Node::Entry(e)) => Some(e),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `node` as the last child of group `parent`.
    pub fn insert(&mut self, parent: NodeId, node: Node) -> KpxResult<NodeId> {
        if !self.live(parent)?.node.is_group() {
            return Err(tree_err("only groups have children"));
        }
        let slot = Some(Slot {
            node,
            parent: Some(parent),
            children: Vec::new(),
        });
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = slot;
                NodeId(index)
            }
            None => {
                self.slots.push(slot);
                NodeId(self.slots.len() - 1)
            }
        };
        if let Some(slot) = self.slot_mut(parent) {
            slot.children.push(id);
        }
        Ok(id)
    }

    /// Detach and drop the subtree at `id`, returning its nodes in preorder.
    ///
    /// The vacated ids are handed out again by later inserts, so a removed
    /// `NodeId` must not be kept.
    pub fn remove(&mut self, id: NodeId) -> KpxResult<Vec<Node>> {
        if id == self.root {
            return Err(tree_err("the root group cannot be removed"));
        }
        let parent = self.live(id)?.parent;
        if let Some(slot) = parent.and_then(|p| self.slot_mut(p)) {
            slot.children.retain(|c| *c != id);
        }
        let mut removed = Vec::new();
        for node_id in self.descendants(id) {
            if let Some(slot) = self.slots.get_mut(node_id.0).and_then(Option::take) {
                removed.push(slot.node);
                self.free.push(node_id.0);
            }
        }
        Ok(removed)
    }

    /// Move `id` under group `new_parent`, rejecting moves into its own subtree.
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> KpxResult<()> {
        if id == self.root {
            return Err(tree_err("the root group cannot be moved"));
        }
        if !self.live(new_parent)?.node.is_group() {
            return Err(tree_err("only groups have children"));
        }
        if new_parent == id || self.has_ancestor(new_parent, id) {
            return Err(tree_err("cannot move a group into its own subtree"));
        }
        let old_parent = self.live(id)?.parent;
        if let Some(slot) = old_parent.and_then(|p| self.slot_mut(p)) {
            slot.children.retain(|c| *c != id);
        }
        if let Some(slot) = self.slot_mut(new_parent) {
            slot.children.push(id);
        }
        if let Some(slot) = self.slot_mut(id) {
            slot.parent = Some(new_parent);
            slot.node.times_mut().location_changed = now();
        }
        Ok(())
    }

    /// True when `ancestor` is a strict ancestor of `id`.
    pub fn has_ancestor(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<NodeId> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.as_ref().is_some_and(|s| s.node.uuid() == *uuid))
            .map(|(i, _)| NodeId(i))
    }

    /// Ids from the root down to `id`, both inclusive.
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut path = vec![id];
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            path.push(p);
            cur = self.parent(p);
        }
        path.reverse();
        path
    }

    /// `id` and everything below it, depth-first in child order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let Some(slot) = self.slot(cur) else { continue };
            out.push(cur);
            stack.extend(slot.children.iter().rev().copied());
        }
        out
    }

    fn subtree_eq(&self, a: NodeId, other: &Tree, b: NodeId) -> bool {
        match (self.slot(a), other.slot(b)) {
            (Some(x), Some(y)) => {
                x.node == y.node
                    && x.children.len() == y.children.len()
                    && x.children
                        .iter()
                        .zip(y.children.iter())
                        .all(|(ca, cb)| self.subtree_eq(*ca, other, *cb))
            }
            _ => false,
        }
    }
}

/// Structural: same nodes in the same shape, regardless of arena layout.
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.subtree_eq(self.root, other, other.root)
    }
}

impl Eq for Tree {}
