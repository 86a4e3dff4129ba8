//! DOM update format produced by the render-diff pipeline.
//!
//! A [`Patch`] is an ordered list of [`PatchOp`]s. Nodes are addressed by
//! a [`NodePath`]: child indices walked from the live root, so `[]` is the
//! root itself and `[1, 0]` is the first child of the root's second child.
//! Indices count every node (elements, text, comments) the same way the
//! browser's `childNodes` does.
//!
//! Operations are applied strictly in order. The diff never inserts in the
//! middle of a child list, so paths computed against the old tree stay
//! valid while a patch is applied, provided removals come last and run
//! from the highest index down.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Child-index path from the live root to a node.
pub type NodePath = Vec<usize>;

/// A single DOM operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "op", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum PatchOp {
    /// Replace the whole content of the live root.
    ReplaceAll {
        /// Complete markup for the root's content.
        html: String,
    },
    /// Replace the node at `path` with the given markup.
    Replace {
        /// Node to replace.
        path: NodePath,
        /// Replacement markup (exactly one node).
        html: String,
    },
    /// Replace the content of the text node at `path`.
    SetText {
        /// Text node to update.
        path: NodePath,
        /// New text, still markup-escaped.
        text: String,
    },
    /// Set (or overwrite) an attribute on the element at `path`.
    SetAttr {
        /// Element to update.
        path: NodePath,
        /// Attribute name.
        name: String,
        /// Attribute value, unescaped.
        value: String,
    },
    /// Remove an attribute from the element at `path`.
    RemoveAttr {
        /// Element to update.
        path: NodePath,
        /// Attribute name.
        name: String,
    },
    /// Append markup as the last children of the node at `path`.
    Append {
        /// Parent node (`[]` for the live root).
        path: NodePath,
        /// Markup to append.
        html: String,
    },
    /// Remove the node at `path`.
    Remove {
        /// Node to remove.
        path: NodePath,
    },
}

/// Ordered sequence of [`PatchOp`]s transforming one render into the next.
///
/// On the wire a patch travels as the `ops` array of
/// [`ServerMessage::Patch`](crate::wire::ServerMessage::Patch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    /// Operations in application order.
    pub ops: Vec<PatchOp>,
}

impl Patch {
    /// A patch that changes nothing.
    pub const fn empty() -> Self {
        Self { ops: Vec::new() }
    }

    /// A patch replacing the whole live root with `html`.
    pub fn replace_all(html: impl Into<String>) -> Self {
        Self {
            ops: vec![PatchOp::ReplaceAll { html: html.into() }],
        }
    }

    /// Whether this patch contains no operations.
    pub const fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations.
    pub const fn len(&self) -> usize {
        self.ops.len()
    }

    /// Append an operation.
    pub fn push(&mut self, op: PatchOp) {
        self.ops.push(op);
    }

    /// Iterate over the operations in application order.
    pub fn iter(&self) -> std::slice::Iter<'_, PatchOp> {
        self.ops.iter()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
