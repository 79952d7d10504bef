//! In-memory phylogenetic tree
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Each node has a name, an
//! optional branch length (`dist`), an optional support value and an open map of scalar
//! properties. A node can carry a [`StorageLink`], which is a plain index into the
//! persisted hierarchy of an archive. Links are attached when a tree is built into or loaded
//! from an archive and are never persisted themselves.
use crate::error::{Error, Result};
use libipld::{
    cbor::DagCborCodec,
    codec::{Decode, Encode},
    Ipld,
};
use smallvec::SmallVec;
use std::{
    collections::BTreeMap,
    convert::TryFrom,
    fmt,
    io::{Read, Seek, Write},
    ops::Index,
};

/// property key of the node name
pub const NAME: &str = "name";
/// property key of the branch length
pub const DIST: &str = "dist";
/// property key of the support value
pub const SUPPORT: &str = "support";

/// A scalar property value. Stores copy these verbatim without interpreting them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(x) => Some(x),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(x) => write!(f, "{}", x),
            Value::Int(x) => write!(f, "{}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(x) => f.write_str(x),
        }
    }
}

/// Values are persisted as plain cbor scalars, the cbor type tells them apart
impl Encode<DagCborCodec> for Value {
    fn encode<W: Write>(&self, c: DagCborCodec, w: &mut W) -> anyhow::Result<()> {
        match self {
            Value::Bool(x) => x.encode(c, w),
            Value::Int(x) => x.encode(c, w),
            Value::Float(x) => x.encode(c, w),
            Value::Text(x) => x.encode(c, w),
        }
    }
}

impl Decode<DagCborCodec> for Value {
    fn decode<R: Read + Seek>(c: DagCborCodec, r: &mut R) -> anyhow::Result<Self> {
        Ok(match Ipld::decode(c, r)? {
            Ipld::Bool(x) => Value::Bool(x),
            Ipld::Integer(x) => Value::Int(i64::try_from(x)?),
            Ipld::Float(x) => Value::Float(x),
            Ipld::String(x) => Value::Text(x),
            other => anyhow::bail!("not a scalar property value: {:?}", other),
        })
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Scalar properties of a node, sorted by key
pub type Properties = BTreeMap<String, Value>;

/// Index of a node in a [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Non-owning association between a tree node and a container of a persisted hierarchy.
///
/// This is just a lookup key. It stays meaningful only for the archive that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageLink(pub(crate) u32);

impl StorageLink {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StorageLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    name: String,
    dist: Option<f64>,
    support: Option<f64>,
    props: Properties,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 2]>,
    link: Option<StorageLink>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dist(&self) -> Option<f64> {
        self.dist
    }

    pub fn support(&self) -> Option<f64> {
        self.support
    }

    /// custom properties, without name, dist and support
    pub fn props(&self) -> &Properties {
        &self.props
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn storage_link(&self) -> Option<StorageLink> {
        self.link
    }
}

/// A rooted tree with an arbitrary number of children per node.
///
/// Detached subtrees stay in the arena but are no longer reachable from the root, so
/// they do not take part in any traversal.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl Tree {
    /// A tree consisting of an unnamed root
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Adds a new child below `parent` and returns its id.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            parent: Some(parent),
            ..Node::default()
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Detaches a subtree from its parent. The subtree can be attached somewhere else.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let parent = self.nodes[id.0]
            .parent
            .take()
            .ok_or(Error::InvalidTopology("node has no parent"))?;
        self.nodes[parent.0].children.retain(|x| *x != id);
        Ok(())
    }

    /// Attaches a detached subtree below `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if child == self.root {
            return Err(Error::InvalidTopology("the root can not be attached"));
        }
        if self.nodes[child.0].parent.is_some() {
            return Err(Error::InvalidTopology("node is already attached"));
        }
        if self.ancestors(parent).any(|x| x == child) || parent == child {
            return Err(Error::InvalidTopology("attaching would create a cycle"));
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Iterates over the strict ancestors of a node, closest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id.0].parent, move |x| self.nodes[x.0].parent)
    }

    /// All nodes reachable from the root, parents before children, children in order.
    pub fn preorder(&self) -> Preorder<'_> {
        self.preorder_from(self.root)
    }

    pub fn preorder_from(&self, id: NodeId) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![id],
        }
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.leaves_under(self.root)
    }

    pub fn leaves_under(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.preorder_from(id).filter(move |x| self[*x].is_leaf())
    }

    /// Leaf names in traversal order
    pub fn leaf_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.leaves().map(move |x| self[x].name())
    }

    pub fn leaf_names_under(&self, id: NodeId) -> Vec<&str> {
        self.leaves_under(id).map(|x| self[x].name()).collect()
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves().count()
    }

    pub fn find_leaf(&self, name: &str) -> Option<NodeId> {
        self.leaves().find(|x| self[*x].name() == name)
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        self.nodes[id.0].name = name.into();
    }

    pub fn set_dist(&mut self, id: NodeId, dist: Option<f64>) {
        self.nodes[id.0].dist = dist;
    }

    pub fn set_support(&mut self, id: NodeId, support: Option<f64>) {
        self.nodes[id.0].support = support;
    }

    /// Gets a property, including the reserved `name`, `dist` and `support` keys.
    pub fn get_prop(&self, id: NodeId, key: &str) -> Option<Value> {
        let node = &self.nodes[id.0];
        match key {
            NAME => Some(Value::Text(node.name.clone())),
            DIST => node.dist.map(Value::Float),
            SUPPORT => node.support.map(Value::Float),
            _ => node.props.get(key).cloned(),
        }
    }

    /// Sets a property. The reserved keys only accept values of their own type.
    pub fn set_prop(
        &mut self,
        id: NodeId,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let key = key.into();
        let value = value.into();
        let node = &mut self.nodes[id.0];
        if key == NAME {
            match value {
                Value::Text(name) => node.name = name,
                _ => return Err(invalid(NAME, "must be text")),
            }
        } else if key == DIST {
            node.dist = Some(value.as_f64().ok_or_else(|| invalid(DIST, "must be numeric"))?);
        } else if key == SUPPORT {
            node.support = Some(
                value
                    .as_f64()
                    .ok_or_else(|| invalid(SUPPORT, "must be numeric"))?,
            );
        } else {
            node.props.insert(key, value);
        }
        Ok(())
    }

    pub fn remove_prop(&mut self, id: NodeId, key: &str) -> Option<Value> {
        self.nodes[id.0].props.remove(key)
    }

    /// All scalar properties of a node. The name is always present, dist and support only
    /// if they are set.
    pub fn scalar_props(&self, id: NodeId) -> Properties {
        let node = &self.nodes[id.0];
        let mut res = node.props.clone();
        res.insert(NAME.into(), Value::Text(node.name.clone()));
        if let Some(dist) = node.dist {
            res.insert(DIST.into(), Value::Float(dist));
        }
        if let Some(support) = node.support {
            res.insert(SUPPORT.into(), Value::Float(support));
        }
        res
    }

    /// Inverse of [`Tree::scalar_props`]
    pub fn apply_props(&mut self, id: NodeId, props: Properties) -> Result<()> {
        for (key, value) in props {
            self.set_prop(id, key, value)?;
        }
        Ok(())
    }

    pub fn storage_link(&self, id: NodeId) -> Option<StorageLink> {
        self.nodes[id.0].link
    }

    pub(crate) fn set_storage_link(&mut self, id: NodeId, link: StorageLink) {
        self.nodes[id.0].link = Some(link);
    }

    /// Forgets all storage links, e.g. before attaching the tree to another archive.
    pub fn clear_storage_links(&mut self) {
        for node in &mut self.nodes {
            node.link = None;
        }
    }

    /// Whether both trees have the same topology, ignoring child order, and the same
    /// scalar properties on corresponding nodes.
    pub fn is_isomorphic(&self, other: &Tree) -> bool {
        self.canonical_form() == other.canonical_form()
    }

    /// A string that is equal for isomorphic trees
    fn canonical_form(&self) -> String {
        let order = self.preorder().collect::<Vec<_>>();
        let mut forms: BTreeMap<NodeId, String> = BTreeMap::new();
        for id in order.into_iter().rev() {
            let mut children = self[id]
                .children
                .iter()
                .filter_map(|child| forms.remove(child))
                .collect::<Vec<_>>();
            children.sort();
            let form = format!("({}){:?}", children.join(","), self.scalar_props(id));
            forms.insert(id, form);
        }
        forms.remove(&self.root).unwrap_or_default()
    }
}

fn invalid(key: &str, reason: &'static str) -> Error {
    Error::InvalidProperty {
        key: key.into(),
        reason,
    }
}

/// Depth first traversal, see [`Tree::preorder`]
pub struct Preorder<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree[id].children.iter().rev().cloned());
        Some(id)
    }
}
