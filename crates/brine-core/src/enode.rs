// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! E-node records and the append-only chunked node registry.
use std::fmt::Write as _;
use std::sync::Arc;

use crate::ident::ENodeId;

/// An operator symbol applied to an ordered list of child ids.
///
/// Two e-nodes are structurally equal iff their operator strings are equal and
/// their child id sequences are equal. The runtime stores every node once in
/// the registry, canonicalized at the moment of storage; children may drift
/// out of canonical form after merges until the next rebuild.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ENode {
    /// Operator symbol.
    pub op: String,
    /// Ordered child class ids.
    pub args: Vec<ENodeId>,
}

impl ENode {
    /// Creates a node from an operator and its children.
    #[must_use]
    pub fn new(op: impl Into<String>, args: Vec<ENodeId>) -> Self {
        Self {
            op: op.into(),
            args,
        }
    }

    /// Creates a zero-arity node.
    #[must_use]
    pub fn leaf(op: impl Into<String>) -> Self {
        Self::new(op, Vec::new())
    }

    /// Returns `true` if the node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.args.is_empty()
    }

    /// Renders the deterministic key string for this node as stored.
    ///
    /// Leaves render as the bare operator; applications as
    /// `"op(c1,c2,…)"`. The result is only a *canonical* key when the node's
    /// children are canonical; the runtime canonicalizes before keying.
    #[must_use]
    pub fn key(&self) -> String {
        if self.is_leaf() {
            return self.op.clone();
        }
        let mut out = String::with_capacity(self.op.len() + 2 + self.args.len() * 4);
        out.push_str(&self.op);
        out.push('(');
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            // Infallible for String targets.
            let _ = write!(out, "{arg}");
        }
        out.push(')');
        out
    }
}

/// Fixed number of nodes per registry chunk.
pub const NODE_CHUNK_SIZE: usize = 1024;

/// Append-only chunked array of every e-node ever allocated.
///
/// Node id `k` lives at `chunks[k / C][k % C]` with `C = NODE_CHUNK_SIZE`.
/// Chunks are shared by reference between the runtime and every snapshot;
/// appending clones at most the tail chunk (copy-on-write), which is what
/// keeps snapshot emission proportional to the delta rather than the graph.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeChunks {
    chunks: Vec<Arc<Vec<ENode>>>,
    len: usize,
}

impl NodeChunks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes ever allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no node has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks currently backing the registry.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the backing chunk at `index`, for sharing checks.
    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<&Arc<Vec<ENode>>> {
        self.chunks.get(index)
    }

    /// Returns the node with the given id.
    #[must_use]
    pub fn get(&self, id: ENodeId) -> Option<&ENode> {
        if id.index() >= self.len {
            return None;
        }
        self.chunks
            .get(id.index() / NODE_CHUNK_SIZE)
            .and_then(|c| c.get(id.index() % NODE_CHUNK_SIZE))
    }

    /// Appends a node, cloning only the tail chunk if it is shared.
    pub fn push(&mut self, node: ENode) {
        if self.len.is_multiple_of(NODE_CHUNK_SIZE) {
            self.chunks
                .push(Arc::new(Vec::with_capacity(NODE_CHUNK_SIZE)));
        }
        let tail = self.chunks.len() - 1;
        Arc::make_mut(&mut self.chunks[tail]).push(node);
        self.len += 1;
    }

    /// Iterates `(id, node)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (ENodeId, &ENode)> {
        self.chunks
            .iter()
            .flat_map(|c| c.iter())
            .enumerate()
            .map(|(i, n)| {
                #[allow(clippy::cast_possible_truncation)]
                let id = ENodeId(i as u32);
                (id, n)
            })
    }
}
