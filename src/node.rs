//! Node pool and pending-output node list.
//!
//! During a build nothing is written to the output buffer; instead each
//! builder operation appends a [`Node`] — a pending write action — to an
//! index-based arena. Arena order is emission order, so the arena doubles
//! as the output node list. Count fields are patched in place when their
//! container closes, and the whole arena is bulk-recycled (capacity
//! retained) between builds.

use crate::types::GeometryKind;

/// One pending write action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    /// Four-byte total-size slot; overwritten with the true size once the
    /// emission walk has finished.
    Size,
    /// Container header byte. The pending SRID, if any, follows the first
    /// header emitted and nowhere else.
    Header { kind: GeometryKind },
    /// Child/point count field; `n` is patched at container close.
    Count { n: u32 },
    /// Header byte immediately followed by a count — the zero-child
    /// terminal left behind by the empty-geometry override.
    HeaderCount { kind: GeometryKind, n: u32 },
    /// Coordinate tuple; only the first `ndims` values are meaningful and
    /// they are stored in on-wire order (X, Y, then Z and/or M).
    Coord { vals: [f64; 4], ndims: u8 },
}

/// Index handle into the pool. Handles are only valid for the build that
/// acquired them; `reset`/`truncate` invalidate the released suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(u32);

/// Reusable arena of pending-output nodes.
///
/// `acquire` appends in O(1) amortized; `truncate`/`reset` release a suffix
/// or everything in O(1) without deallocating, so repeated builds on one
/// context reuse the same storage. No node is ever freed individually.
#[derive(Debug, Default)]
pub struct NodePool {
    nodes: Vec<Node>,
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a node out of the pool, appending it to the output list.
    pub fn acquire(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Current arena length, usable as a rollback mark.
    pub fn mark(&self) -> usize {
        self.nodes.len()
    }

    /// Release every node acquired at or after `mark`.
    pub fn truncate(&mut self, mark: usize) {
        self.nodes.truncate(mark);
    }

    /// Release every node acquired after `id`, keeping `id` itself.
    pub fn truncate_after(&mut self, id: NodeId) {
        self.nodes.truncate(id.0 as usize + 1);
    }

    /// Overwrite the node at `id`.
    pub fn set(&mut self, id: NodeId, node: Node) {
        self.nodes[id.0 as usize] = node;
    }

    /// Patch the deferred count of a `Count` or `HeaderCount` node.
    pub fn set_count(&mut self, id: NodeId, count: u32) {
        match &mut self.nodes[id.0 as usize] {
            Node::Count { n } | Node::HeaderCount { n, .. } => *n = count,
            other => debug_assert!(false, "set_count on non-count node {other:?}"),
        }
    }

    /// The output node list, in emission order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bulk-recycle every node while retaining the backing storage.
    pub fn reset(&mut self) {
        self.nodes.clear();
    }
}
