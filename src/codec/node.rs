//! On-disk format for node records (spec.md §6.3): a 1-byte kind tag
//! followed by the delegate fields that apply to that kind, composed by
//! plain struct embedding rather than trait objects — the same choice
//! `rdms::llrb::node::Node` makes when it wraps an `Arc<db::Entry<K,
//! V>>` field instead of boxing a trait.

use crate::codec::{DOCUMENT_NODE_KEY, NULL_NODE_KEY};
use crate::util::varint;
use crate::{Error, Result};

/// One-byte tag identifying which delegates follow in the record body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    Deleted = 0,
    DocumentRoot = 1,
    Element = 2,
    Attribute = 3,
    Namespace = 4,
    Text = 5,
    Comment = 6,
    ProcessingInstruction = 7,
    PathNode = 8,
    AvlNode = 9,
    /// Not a document node: a fixed-key pointer record (stored at node
    /// key 0 of the name/path/CAS index families, which the document
    /// tree itself never uses for anything but its own root) holding
    /// the current root key of that family's AVL tree, since rotations
    /// can move the root to a different node key at any time (spec.md
    /// §4.6).
    IndexRoot = 10,
    /// A name-dictionary entry: content-hash key to interned string,
    /// stored in the `NameDict` family (spec.md §3.1, §3.2). Not a
    /// document node.
    NameEntry = 11,
}

impl NodeKind {
    fn from_tag(tag: u8) -> Result<NodeKind> {
        use NodeKind::*;
        Ok(match tag {
            0 => Deleted,
            1 => DocumentRoot,
            2 => Element,
            3 => Attribute,
            4 => Namespace,
            5 => Text,
            6 => Comment,
            7 => ProcessingInstruction,
            8 => PathNode,
            9 => AvlNode,
            10 => IndexRoot,
            11 => NameEntry,
            tag => err_at!(Corruption, msg: "unknown node kind tag {}", tag)?,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Whether this kind carries [StructNodeDelegate] sibling/child
    /// pointers (spec.md §3.2: struct nodes are everything except
    /// attribute/namespace, which attach directly to their owning
    /// element and never have children of their own).
    pub fn is_struct(self) -> bool {
        !matches!(
            self,
            NodeKind::Attribute
                | NodeKind::Namespace
                | NodeKind::Deleted
                | NodeKind::AvlNode
                | NodeKind::NameEntry
                | NodeKind::PathNode
        )
    }

    /// Whether this kind carries a [NameNodeDelegate] (element,
    /// attribute, namespace, path node).
    pub fn has_name(self) -> bool {
        matches!(
            self,
            NodeKind::Element | NodeKind::Attribute | NodeKind::Namespace | NodeKind::PathNode
        )
    }

    /// Whether this kind carries a [ValNodeDelegate] (text, comment,
    /// processing instruction and attribute values, plus interned name
    /// strings).
    pub fn has_value(self) -> bool {
        matches!(
            self,
            NodeKind::Attribute
                | NodeKind::Text
                | NodeKind::Comment
                | NodeKind::ProcessingInstruction
                | NodeKind::NameEntry
        )
    }

    /// Whether this kind carries an [AvlNodeDelegate] (secondary-index
    /// tree nodes only, spec.md §4.6).
    pub fn is_avl(self) -> bool {
        matches!(self, NodeKind::AvlNode)
    }

    /// Whether this kind carries an [ElementDelegate] (attribute/
    /// namespace key lists, spec.md §3.2).
    pub fn is_element(self) -> bool {
        matches!(self, NodeKind::Element)
    }

    /// Whether this kind is the fixed AVL-root pointer record.
    pub fn is_index_root(self) -> bool {
        matches!(self, NodeKind::IndexRoot)
    }

    /// Whether this kind carries a [PathNodeDelegate] (path-summary
    /// tree nodes only, spec.md §3.3 invariant 5).
    pub fn is_path_node(self) -> bool {
        matches!(self, NodeKind::PathNode)
    }
}

/// Fields common to every node (spec.md §3.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDelegate {
    pub node_key: i64,
    pub parent_key: i64,
    pub hash: u64,
    pub revision: u32,
    pub dewey_id: Option<Vec<u8>>,
}

impl NodeDelegate {
    pub fn new(node_key: i64, parent_key: i64, revision: u32) -> Self {
        NodeDelegate { node_key, parent_key, hash: 0, revision, dewey_id: None }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        varint::write_i64(buf, self.node_key);
        varint::write_i64(buf, self.parent_key);
        buf.extend_from_slice(&self.hash.to_be_bytes());
        buf.extend_from_slice(&self.revision.to_be_bytes());
        match &self.dewey_id {
            Some(id) => {
                buf.push(id.len() as u8);
                buf.extend_from_slice(id);
            }
            None => buf.push(0),
        }
    }

    fn decode(buf: &[u8]) -> Result<(NodeDelegate, usize)> {
        let mut off = 0;
        let (node_key, n) = varint::read_i64(&buf[off..])?;
        off += n;
        let (parent_key, n) = varint::read_i64(&buf[off..])?;
        off += n;
        if buf.len() < off + 8 + 4 + 1 {
            err_at!(Corruption, msg: "truncated node delegate")?;
        }
        let hash = u64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let revision = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let dewey_len = buf[off] as usize;
        off += 1;
        let dewey_id = if dewey_len == 0 {
            None
        } else {
            if buf.len() < off + dewey_len {
                err_at!(Corruption, msg: "truncated dewey id")?;
            }
            let id = buf[off..off + dewey_len].to_vec();
            off += dewey_len;
            Some(id)
        };
        Ok((NodeDelegate { node_key, parent_key, hash, revision, dewey_id }, off))
    }
}

/// Self-relative delta encoding for a node-key field: `flag=1` means the
/// field is [NULL_NODE_KEY]; `flag=0` is followed by a signed var-long
/// holding `self_key - value` (spec.md §6.3).
fn encode_relative(buf: &mut Vec<u8>, self_key: i64, value: i64) {
    if value == NULL_NODE_KEY {
        buf.push(1);
    } else {
        buf.push(0);
        varint::write_i64(buf, self_key - value);
    }
}

fn decode_relative(buf: &[u8], self_key: i64) -> Result<(i64, usize)> {
    if buf.is_empty() {
        err_at!(Corruption, msg: "truncated relative field")?;
    }
    if buf[0] == 1 {
        Ok((NULL_NODE_KEY, 1))
    } else {
        let (delta, n) = varint::read_i64(&buf[1..])?;
        Ok((self_key - delta, n + 1))
    }
}

/// Child/sibling pointers and subtree counters for struct nodes
/// (spec.md §3.2, §6.3). `child_count` and `descendant_count` use the
/// same self-relative encoding as the pointer fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructNodeDelegate {
    pub first_child: i64,
    pub left_sibling: i64,
    pub right_sibling: i64,
    pub child_count: i64,
    pub descendant_count: i64,
}

impl StructNodeDelegate {
    pub fn empty() -> Self {
        StructNodeDelegate {
            first_child: NULL_NODE_KEY,
            left_sibling: NULL_NODE_KEY,
            right_sibling: NULL_NODE_KEY,
            child_count: 0,
            descendant_count: 0,
        }
    }

    fn encode(&self, buf: &mut Vec<u8>, self_key: i64) {
        encode_relative(buf, self_key, self.first_child);
        encode_relative(buf, self_key, self.left_sibling);
        encode_relative(buf, self_key, self.right_sibling);
        encode_relative(buf, self_key, self.child_count);
        encode_relative(buf, self_key, self.descendant_count);
    }

    fn decode(buf: &[u8], self_key: i64) -> Result<(StructNodeDelegate, usize)> {
        let mut off = 0;
        let (first_child, n) = decode_relative(&buf[off..], self_key)?;
        off += n;
        let (left_sibling, n) = decode_relative(&buf[off..], self_key)?;
        off += n;
        let (right_sibling, n) = decode_relative(&buf[off..], self_key)?;
        off += n;
        let (child_count, n) = decode_relative(&buf[off..], self_key)?;
        off += n;
        let (descendant_count, n) = decode_relative(&buf[off..], self_key)?;
        off += n;
        Ok((
            StructNodeDelegate { first_child, left_sibling, right_sibling, child_count, descendant_count },
            off,
        ))
    }
}

/// Element-only bookkeeping (spec.md §3.2: "Element (struct + name +
/// attribute list + namespace list...)"): attribute and namespace nodes
/// attach directly to their owning element rather than chaining
/// through [StructNodeDelegate] siblings (spec.md §3.3 treats them as
/// non-struct nodes), so the element keeps their node keys here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementDelegate {
    pub attributes: Vec<i64>,
    pub namespaces: Vec<i64>,
}

impl ElementDelegate {
    pub fn empty() -> Self {
        ElementDelegate { attributes: Vec::new(), namespaces: Vec::new() }
    }

    fn encode(&self, buf: &mut Vec<u8>, self_key: i64) {
        varint::write_i64(buf, self.attributes.len() as i64);
        for key in &self.attributes {
            encode_relative(buf, self_key, *key);
        }
        varint::write_i64(buf, self.namespaces.len() as i64);
        for key in &self.namespaces {
            encode_relative(buf, self_key, *key);
        }
    }

    fn decode(buf: &[u8], self_key: i64) -> Result<(ElementDelegate, usize)> {
        let mut off = 0;
        let (n_attrs, n) = varint::read_i64(&buf[off..])?;
        off += n;
        let mut attributes = Vec::with_capacity(n_attrs.max(0) as usize);
        for _ in 0..n_attrs {
            let (key, n) = decode_relative(&buf[off..], self_key)?;
            off += n;
            attributes.push(key);
        }
        let (n_ns, n) = varint::read_i64(&buf[off..])?;
        off += n;
        let mut namespaces = Vec::with_capacity(n_ns.max(0) as usize);
        for _ in 0..n_ns {
            let (key, n) = decode_relative(&buf[off..], self_key)?;
            off += n;
            namespaces.push(key);
        }
        Ok((ElementDelegate { attributes, namespaces }, off))
    }
}

/// Name-bearing fields (spec.md §3.2): elements, attributes, namespaces
/// and path-summary nodes all carry a `(prefix, local, uri)` name-key
/// triple plus, for path nodes, the owning path-summary key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameNodeDelegate {
    pub prefix_key: i32,
    pub local_name_key: i32,
    pub uri_key: i32,
    pub path_node_key: i64,
}

impl NameNodeDelegate {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.prefix_key.to_be_bytes());
        buf.extend_from_slice(&self.local_name_key.to_be_bytes());
        buf.extend_from_slice(&self.uri_key.to_be_bytes());
        varint::write_i64(buf, self.path_node_key);
    }

    fn decode(buf: &[u8]) -> Result<(NameNodeDelegate, usize)> {
        if buf.len() < 12 {
            err_at!(Corruption, msg: "truncated name delegate")?;
        }
        let prefix_key = i32::from_be_bytes(buf[0..4].try_into().unwrap());
        let local_name_key = i32::from_be_bytes(buf[4..8].try_into().unwrap());
        let uri_key = i32::from_be_bytes(buf[8..12].try_into().unwrap());
        let (path_node_key, n) = varint::read_i64(&buf[12..])?;
        Ok((NameNodeDelegate { prefix_key, local_name_key, uri_key, path_node_key }, 12 + n))
    }
}

/// Value-bearing fields (spec.md §3.2): text, comment, processing
/// instruction and attribute-value bytes, optionally Deflate-compressed
/// (spec.md §4.8 edge case: large text values may be compressed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValNodeDelegate {
    pub compressed: bool,
    pub value: Vec<u8>,
}

impl ValNodeDelegate {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.compressed as u8);
        buf.extend_from_slice(&(self.value.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.value);
    }

    fn decode(buf: &[u8]) -> Result<(ValNodeDelegate, usize)> {
        if buf.len() < 5 {
            err_at!(Corruption, msg: "truncated value delegate")?;
        }
        let compressed = buf[0] != 0;
        let len = u32::from_be_bytes(buf[1..5].try_into().unwrap()) as usize;
        if buf.len() < 5 + len {
            err_at!(Corruption, msg: "truncated value bytes")?;
        }
        let value = buf[5..5 + len].to_vec();
        Ok((ValNodeDelegate { compressed, value }, 5 + len))
    }
}

/// A secondary-index tree node (spec.md §4.6): `key` is the opaque,
/// comparable index key (a CAS value, a path, or a name, pre-encoded by
/// the caller), `left`/`right` are the child AVL-node keys (self-
/// relative, same trick as [StructNodeDelegate]), `height` is the
/// subtree height used for the `|height(left) - height(right)| <= 1`
/// balance invariant, and `changed` marks nodes on a path that still
/// needs rebalance-checking (spec.md §4.6's rotation bookkeeping).
/// `references` is the sorted, deduplicated node-key set (spec.md
/// §4.7's `References` capability).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvlNodeDelegate {
    pub key: Vec<u8>,
    pub left: i64,
    pub right: i64,
    pub height: i32,
    pub changed: bool,
    pub references: Vec<i64>,
}

impl AvlNodeDelegate {
    pub fn leaf(key: Vec<u8>, reference: i64) -> Self {
        AvlNodeDelegate { key, left: NULL_NODE_KEY, right: NULL_NODE_KEY, height: 1, changed: true, references: vec![reference] }
    }

    fn encode(&self, buf: &mut Vec<u8>, self_key: i64) {
        buf.extend_from_slice(&(self.key.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.key);
        encode_relative(buf, self_key, self.left);
        encode_relative(buf, self_key, self.right);
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.push(self.changed as u8);
        varint::write_i64(buf, self.references.len() as i64);
        for r in &self.references {
            varint::write_i64(buf, *r);
        }
    }

    fn decode(buf: &[u8], self_key: i64) -> Result<(AvlNodeDelegate, usize)> {
        if buf.len() < 4 {
            err_at!(Corruption, msg: "truncated avl key length")?;
        }
        let key_len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        let mut off = 4;
        if buf.len() < off + key_len {
            err_at!(Corruption, msg: "truncated avl key bytes")?;
        }
        let key = buf[off..off + key_len].to_vec();
        off += key_len;

        let (left, n) = decode_relative(&buf[off..], self_key)?;
        off += n;
        let (right, n) = decode_relative(&buf[off..], self_key)?;
        off += n;
        if buf.len() < off + 4 + 1 {
            err_at!(Corruption, msg: "truncated avl height/changed")?;
        }
        let height = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let changed = buf[off] != 0;
        off += 1;

        let (count, n) = varint::read_i64(&buf[off..])?;
        off += n;
        let mut references = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (r, n) = varint::read_i64(&buf[off..])?;
            off += n;
            references.push(r);
        }
        Ok((AvlNodeDelegate { key, left, right, height, changed, references }, off))
    }
}

/// Path-summary bookkeeping (spec.md §3.2, §3.3 invariant 5): `level`
/// is the depth of this path step from the path-summary root,
/// `reference_count` counts how many live document nodes currently
/// share this path shape, and `summarized_kind` is the tag of the
/// document [NodeKind] this step summarizes (element, attribute or
/// namespace).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathNodeDelegate {
    pub level: i32,
    pub reference_count: i64,
    pub summarized_kind: u8,
}

impl PathNodeDelegate {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.level.to_be_bytes());
        varint::write_i64(buf, self.reference_count);
        buf.push(self.summarized_kind);
    }

    fn decode(buf: &[u8]) -> Result<(PathNodeDelegate, usize)> {
        if buf.len() < 4 {
            err_at!(Corruption, msg: "truncated path node level")?;
        }
        let level = i32::from_be_bytes(buf[0..4].try_into().unwrap());
        let mut off = 4;
        let (reference_count, n) = varint::read_i64(&buf[off..])?;
        off += n;
        if buf.len() < off + 1 {
            err_at!(Corruption, msg: "truncated path node kind")?;
        }
        let summarized_kind = buf[off];
        off += 1;
        Ok((PathNodeDelegate { level, reference_count, summarized_kind }, off))
    }
}

/// A fully decoded record: the common delegate plus whichever
/// kind-specific delegates apply. Kept as one flat struct with `Option`
/// fields rather than a kind-parametrized enum of structs, so callers
/// that only care about `node` (e.g. move/copy) don't need to match on
/// kind first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    pub kind: NodeKind,
    pub node: NodeDelegate,
    pub strct: Option<StructNodeDelegate>,
    pub name: Option<NameNodeDelegate>,
    pub val: Option<ValNodeDelegate>,
    pub avl: Option<AvlNodeDelegate>,
    pub elem: Option<ElementDelegate>,
    pub index_root: Option<i64>,
    pub path: Option<PathNodeDelegate>,
}

impl NodeRecord {
    pub fn document_root(revision: u32) -> Self {
        NodeRecord {
            kind: NodeKind::DocumentRoot,
            node: NodeDelegate::new(DOCUMENT_NODE_KEY, NULL_NODE_KEY, revision),
            strct: Some(StructNodeDelegate::empty()),
            name: None,
            val: None,
            avl: None,
            elem: None,
            index_root: None,
            path: None,
        }
    }

    pub fn tombstone(node_key: i64, revision: u32) -> Self {
        NodeRecord {
            kind: NodeKind::Deleted,
            node: NodeDelegate::new(node_key, NULL_NODE_KEY, revision),
            strct: None,
            name: None,
            val: None,
            avl: None,
            elem: None,
            index_root: None,
            path: None,
        }
    }

    pub fn avl_node(node_key: i64, revision: u32, avl: AvlNodeDelegate) -> Self {
        NodeRecord {
            kind: NodeKind::AvlNode,
            node: NodeDelegate::new(node_key, NULL_NODE_KEY, revision),
            strct: None,
            name: None,
            val: None,
            avl: Some(avl),
            elem: None,
            index_root: None,
            path: None,
        }
    }

    /// The fixed-key pointer record at node key 0 of an index family,
    /// holding the current AVL root (`None` when the index is empty).
    pub fn index_root_pointer(node_key: i64, revision: u32, root: Option<i64>) -> Self {
        NodeRecord {
            kind: NodeKind::IndexRoot,
            node: NodeDelegate::new(node_key, NULL_NODE_KEY, revision),
            strct: None,
            name: None,
            val: None,
            avl: None,
            elem: None,
            index_root: Some(root.unwrap_or(NULL_NODE_KEY)),
            path: None,
        }
    }

    /// A name-dictionary entry keyed by the content hash of its string
    /// (spec.md §3.1), stored in the `NameDict` family.
    pub fn name_entry(node_key: i64, revision: u32, value: &str) -> Self {
        NodeRecord {
            kind: NodeKind::NameEntry,
            node: NodeDelegate::new(node_key, NULL_NODE_KEY, revision),
            strct: None,
            name: None,
            val: Some(ValNodeDelegate { compressed: false, value: value.as_bytes().to_vec() }),
            avl: None,
            elem: None,
            index_root: None,
            path: None,
        }
    }

    /// Unpacks a [NodeKind::NameEntry] record back into its string.
    pub fn as_name_entry(&self) -> Result<String> {
        let bytes = self.val.as_ref().map(|v| v.value.clone()).unwrap_or_default();
        err_at!(Corruption, String::from_utf8(bytes))
    }

    /// A path-summary tree node (spec.md §3.3 invariant 5): `parent_key`
    /// is the path-summary node it extends, `local_name_key` the name
    /// step it adds, `summarized_kind` the document [NodeKind] this step
    /// describes.
    pub fn path_node(
        node_key: i64,
        parent_key: i64,
        revision: u32,
        level: i32,
        local_name_key: i32,
        summarized_kind: NodeKind,
    ) -> Self {
        NodeRecord {
            kind: NodeKind::PathNode,
            node: NodeDelegate::new(node_key, parent_key, revision),
            strct: None,
            name: Some(NameNodeDelegate {
                prefix_key: NULL_NODE_KEY as i32,
                local_name_key,
                uri_key: NULL_NODE_KEY as i32,
                path_node_key: NULL_NODE_KEY,
            }),
            val: None,
            avl: None,
            elem: None,
            index_root: None,
            path: Some(PathNodeDelegate { level, reference_count: 1, summarized_kind: summarized_kind.tag() }),
        }
    }

    /// Unpacks an [NodeKind::IndexRoot] record back into the AVL root
    /// key it points at (`None` when the index is empty).
    pub fn as_index_root(&self) -> Option<i64> {
        self.index_root.and_then(|r| if r == NULL_NODE_KEY { None } else { Some(r) })
    }

    pub fn is_tombstone(&self) -> bool {
        self.kind == NodeKind::Deleted
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.kind.tag()];
        self.node.encode(&mut buf);
        if let Some(strct) = &self.strct {
            strct.encode(&mut buf, self.node.node_key);
        }
        if let Some(name) = &self.name {
            name.encode(&mut buf);
        }
        if let Some(val) = &self.val {
            val.encode(&mut buf);
        }
        if let Some(avl) = &self.avl {
            avl.encode(&mut buf, self.node.node_key);
        }
        if let Some(elem) = &self.elem {
            elem.encode(&mut buf, self.node.node_key);
        }
        if let Some(root) = self.index_root {
            varint::write_i64(&mut buf, root);
        }
        if let Some(path) = &self.path {
            path.encode(&mut buf);
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<(NodeRecord, usize)> {
        if buf.is_empty() {
            err_at!(Corruption, msg: "empty node record")?;
        }
        let kind = NodeKind::from_tag(buf[0])?;
        let mut off = 1;
        let (node, n) = NodeDelegate::decode(&buf[off..])?;
        off += n;

        let strct = if kind.is_struct() {
            let (s, n) = StructNodeDelegate::decode(&buf[off..], node.node_key)?;
            off += n;
            Some(s)
        } else {
            None
        };
        let name = if kind.has_name() {
            let (s, n) = NameNodeDelegate::decode(&buf[off..])?;
            off += n;
            Some(s)
        } else {
            None
        };
        let val = if kind.has_value() {
            let (s, n) = ValNodeDelegate::decode(&buf[off..])?;
            off += n;
            Some(s)
        } else {
            None
        };
        let avl = if kind.is_avl() {
            let (s, n) = AvlNodeDelegate::decode(&buf[off..], node.node_key)?;
            off += n;
            Some(s)
        } else {
            None
        };
        let elem = if kind.is_element() {
            let (s, n) = ElementDelegate::decode(&buf[off..], node.node_key)?;
            off += n;
            Some(s)
        } else {
            None
        };
        let index_root = if kind.is_index_root() {
            let (r, n) = varint::read_i64(&buf[off..])?;
            off += n;
            Some(r)
        } else {
            None
        };
        let path = if kind.is_path_node() {
            let (p, n) = PathNodeDelegate::decode(&buf[off..])?;
            off += n;
            Some(p)
        } else {
            None
        };
        Ok((NodeRecord { kind, node, strct, name, val, avl, elem, index_root, path }, off))
    }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
