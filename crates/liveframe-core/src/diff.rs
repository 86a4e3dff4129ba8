//! Markup diffing and patch application.
//!
//! [`diff`] compares two renders and emits the smallest [`Patch`] this
//! tree model can express:
//!
//! - no previous render: a single `replace_all` carrying the full markup;
//! - identical renders: an empty patch;
//! - same-tag elements are morphed in place (attribute ops, then
//!   children), text nodes get `set_text`, anything else is `replace`d;
//! - surplus new children are appended in one op, surplus old children
//!   are removed from the highest index down.
//!
//! Elements with different `id` attributes are never morphed into each
//! other. `set_text` and `set_attr` carry decoded values, ready for
//! `nodeValue` and `setAttribute`; `replace`, `append` and `replace_all`
//! carry markup. [`apply`] replays a patch on the server side; the bridge
//! script performs the same steps against the DOM.

use liveframe_types::{NodePath, Patch, PatchOp};

use crate::markup::{Element, Fragment, MarkupError, Node};

/// Errors raised while applying a patch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// Base or patch markup failed to parse.
    #[error("markup error: {0}")]
    Markup(#[from] MarkupError),

    /// The path does not address a node.
    #[error("no node at path {0:?}")]
    InvalidPath(NodePath),

    /// `set_text` targeted a non-text node.
    #[error("node at {0:?} is not a text node")]
    NotText(NodePath),

    /// An attribute op targeted a non-element node.
    #[error("node at {0:?} is not an element")]
    NotElement(NodePath),
}

/// Diff two renders. `previous` is `None` for the first render after
/// connecting.
pub fn diff(previous: Option<&str>, next: &str) -> Patch {
    let Some(previous) = previous else {
        return Patch::replace_all(next);
    };
    if previous == next {
        return Patch::empty();
    }
    match (Fragment::parse(previous), Fragment::parse(next)) {
        (Ok(old), Ok(new)) => diff_fragments(&old, &new),
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(error = %e, "markup not diffable, replacing live root");
            Patch::replace_all(next)
        }
    }
}

/// Diff two parsed fragments.
pub fn diff_fragments(old: &Fragment, new: &Fragment) -> Patch {
    let mut patch = Patch::empty();
    let mut path = NodePath::new();
    diff_children(&old.nodes, &new.nodes, &mut path, &mut patch);
    patch
}

fn diff_children(old: &[Node], new: &[Node], path: &mut NodePath, patch: &mut Patch) {
    for (index, (o, n)) in old.iter().zip(new).enumerate() {
        path.push(index);
        diff_node(o, n, path, patch);
        path.pop();
    }

    if let Some(added) = new.get(old.len()..).filter(|added| !added.is_empty()) {
        let html: String = added.iter().map(Node::to_html).collect();
        patch.push(PatchOp::Append {
            path: path.clone(),
            html,
        });
    }

    for index in (new.len()..old.len()).rev() {
        path.push(index);
        patch.push(PatchOp::Remove { path: path.clone() });
        path.pop();
    }
}

fn diff_node(old: &Node, new: &Node, path: &mut NodePath, patch: &mut Patch) {
    if old == new {
        return;
    }
    match (old, new) {
        (Node::Text(_), Node::Text(text)) => patch.push(PatchOp::SetText {
            path: path.clone(),
            text: text.clone(),
        }),
        (Node::Element(a), Node::Element(b)) if morphable(a, b) => {
            diff_attrs(a, b, path, patch);
            diff_children(&a.children, &b.children, path, patch);
        }
        _ => patch.push(PatchOp::Replace {
            path: path.clone(),
            html: new.to_html(),
        }),
    }
}

fn morphable(a: &Element, b: &Element) -> bool {
    a.tag == b.tag && a.self_closing == b.self_closing && a.attr("id") == b.attr("id")
}

fn diff_attrs(old: &Element, new: &Element, path: &NodePath, patch: &mut Patch) {
    for attr in &new.attrs {
        let value = attr.value.as_deref().unwrap_or("");
        if old.attr(&attr.name) != Some(value) {
            patch.push(PatchOp::SetAttr {
                path: path.clone(),
                name: attr.name.clone(),
                value: value.to_owned(),
            });
        }
    }
    for attr in &old.attrs {
        if new.attr(&attr.name).is_none() {
            patch.push(PatchOp::RemoveAttr {
                path: path.clone(),
                name: attr.name.clone(),
            });
        }
    }
}

/// Live root content while a patch is being applied.
enum Document {
    /// Verbatim markup from a `replace_all`, parsed only if needed.
    Raw(String),
    Tree(Fragment),
}

impl Document {
    fn tree(&mut self) -> Result<&mut Fragment, PatchError> {
        if let Self::Raw(html) = self {
            *self = Self::Tree(Fragment::parse(html)?);
        }
        match self {
            Self::Tree(fragment) => Ok(fragment),
            Self::Raw(_) => Err(PatchError::InvalidPath(NodePath::new())),
        }
    }
}

/// Apply a patch to `base` (`None` = empty live root) and return the
/// resulting markup.
///
/// A patch consisting only of `replace_all` reproduces its markup
/// byte-for-byte; otherwise the result is the serialized tree.
pub fn apply(base: Option<&str>, patch: &Patch) -> Result<String, PatchError> {
    let mut doc = Document::Raw(base.unwrap_or("").to_owned());

    for op in patch {
        match op {
            PatchOp::ReplaceAll { html } => doc = Document::Raw(html.clone()),
            PatchOp::Replace { path, html } => {
                let replacement = Fragment::parse(html)?.nodes;
                let (parent, index) = split_path(path)?;
                let siblings = doc
                    .tree()?
                    .children_at_mut(&parent)
                    .ok_or_else(|| PatchError::InvalidPath(path.clone()))?;
                if index >= siblings.len() {
                    return Err(PatchError::InvalidPath(path.clone()));
                }
                siblings.splice(index..=index, replacement);
            }
            PatchOp::SetText { path, text } => match doc.tree()?.node_at_mut(path) {
                Some(Node::Text(current)) => current.clone_from(text),
                Some(_) => return Err(PatchError::NotText(path.clone())),
                None => return Err(PatchError::InvalidPath(path.clone())),
            },
            PatchOp::SetAttr { path, name, value } => {
                element_at(doc.tree()?, path)?.set_attr(name, value);
            }
            PatchOp::RemoveAttr { path, name } => {
                element_at(doc.tree()?, path)?.remove_attr(name);
            }
            PatchOp::Append { path, html } => {
                let added = Fragment::parse(html)?.nodes;
                doc.tree()?
                    .children_at_mut(path)
                    .ok_or_else(|| PatchError::InvalidPath(path.clone()))?
                    .extend(added);
            }
            PatchOp::Remove { path } => {
                let (parent, index) = split_path(path)?;
                let siblings = doc
                    .tree()?
                    .children_at_mut(&parent)
                    .ok_or_else(|| PatchError::InvalidPath(path.clone()))?;
                if index >= siblings.len() {
                    return Err(PatchError::InvalidPath(path.clone()));
                }
                siblings.remove(index);
            }
        }
    }

    Ok(match doc {
        Document::Raw(html) => html,
        Document::Tree(fragment) => fragment.to_html(),
    })
}

fn split_path(path: &NodePath) -> Result<(NodePath, usize), PatchError> {
    let (last, parent) = path
        .split_last()
        .ok_or_else(|| PatchError::InvalidPath(path.clone()))?;
    Ok((parent.to_vec(), *last))
}

fn element_at<'a>(fragment: &'a mut Fragment, path: &NodePath) -> Result<&'a mut Element, PatchError> {
    match fragment.node_at_mut(path) {
        Some(Node::Element(el)) => Ok(el),
        Some(_) => Err(PatchError::NotElement(path.clone())),
        None => Err(PatchError::InvalidPath(path.clone())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn round_trip(old: &str, new: &str) -> Patch {
        let patch = diff(Some(old), new);
        assert_eq!(apply(Some(old), &patch).unwrap(), new, "patch: {patch:?}");
        patch
    }

    #[test]
    fn identical_markup_yields_empty_patch() {
        let m = r#"<div id="clock"><span>12:00:00</span></div>"#;
        assert!(diff(Some(m), m).is_empty());
    }

    #[test]
    fn first_render_replaces_everything() {
        let m = "<p>hello</p> world";
        let patch = diff(None, m);
        assert_eq!(patch.ops, vec![PatchOp::ReplaceAll { html: m.to_owned() }]);
        assert_eq!(apply(None, &patch).unwrap(), m);
    }

    #[test]
    fn first_render_of_unparseable_markup_is_exact() {
        let m = "<div><p>unclosed";
        assert_eq!(apply(None, &diff(None, m)).unwrap(), m);
    }

    #[test]
    fn changed_text_is_a_single_set_text() {
        let patch = round_trip(
            r#"<div id="clock"><span>12:00:00</span></div>"#,
            r#"<div id="clock"><span>12:00:01</span></div>"#,
        );
        assert_eq!(
            patch.ops,
            vec![PatchOp::SetText {
                path: vec![0, 0, 0],
                text: String::from("12:00:01"),
            }]
        );
    }

    #[test]
    fn attribute_changes_are_targeted() {
        let patch = round_trip(
            r#"<button class="a" disabled>go</button>"#,
            r#"<button class="b" title="x">go</button>"#,
        );
        assert_eq!(
            patch.ops,
            vec![
                PatchOp::SetAttr {
                    path: vec![0],
                    name: String::from("class"),
                    value: String::from("b"),
                },
                PatchOp::SetAttr {
                    path: vec![0],
                    name: String::from("title"),
                    value: String::from("x"),
                },
                PatchOp::RemoveAttr {
                    path: vec![0],
                    name: String::from("disabled"),
                },
            ]
        );
    }

    #[test]
    fn growing_list_appends() {
        let patch = round_trip(
            "<ul><li>a</li></ul>",
            "<ul><li>a</li><li>b</li><li>c</li></ul>",
        );
        assert_eq!(
            patch.ops,
            vec![PatchOp::Append {
                path: vec![0],
                html: String::from("<li>b</li><li>c</li>"),
            }]
        );
    }

    #[test]
    fn shrinking_list_removes_from_the_end() {
        let patch = round_trip(
            "<ul><li>a</li><li>b</li><li>c</li></ul>",
            "<ul><li>a</li></ul>",
        );
        assert_eq!(
            patch.ops,
            vec![
                PatchOp::Remove { path: vec![0, 2] },
                PatchOp::Remove { path: vec![0, 1] },
            ]
        );
    }

    #[test]
    fn different_tags_are_replaced() {
        let patch = round_trip("<p>a</p><i>b</i>", "<p>a</p><b>b</b>");
        assert_eq!(
            patch.ops,
            vec![PatchOp::Replace {
                path: vec![1],
                html: String::from("<b>b</b>"),
            }]
        );
    }

    #[test]
    fn different_ids_are_not_morphed() {
        let patch = round_trip(r#"<div id="a">x</div>"#, r#"<div id="b">x</div>"#);
        assert!(matches!(patch.ops.as_slice(), [PatchOp::Replace { .. }]));
    }

    #[test]
    fn mixed_changes_round_trip() {
        round_trip(
            r#"<h1>Count</h1><p class="n">1</p><ul><li>x</li><li>y</li></ul><!--end-->"#,
            r#"<h1>Count</h1><p class="n odd">3</p><ul><li>z</li></ul>tail"#,
        );
    }

    /// Parse both sides so escaping differences that the DOM does not
    /// see are ignored.
    fn same_dom(a: &str, b: &str) {
        assert_eq!(Fragment::parse(a).unwrap(), Fragment::parse(b).unwrap());
    }

    #[test]
    fn set_text_carries_decoded_text() {
        let old = "<p>a</p>";
        let new = "<p>Tom &amp; Jerry&#x27;s &lt;b&gt;</p>";
        let patch = diff(Some(old), new);
        assert_eq!(
            patch.ops,
            vec![PatchOp::SetText {
                path: vec![0, 0],
                text: String::from("Tom & Jerry's <b>"),
            }]
        );
        same_dom(&apply(Some(old), &patch).unwrap(), new);
    }

    #[test]
    fn set_attr_carries_decoded_value() {
        let old = r#"<p title="a">x</p>"#;
        let new = r#"<p title="it&#x27;s &amp; &quot;x&quot;">x</p>"#;
        let patch = diff(Some(old), new);
        assert_eq!(
            patch.ops,
            vec![PatchOp::SetAttr {
                path: vec![0],
                name: String::from("title"),
                value: String::from("it's & \"x\""),
            }]
        );
        same_dom(&apply(Some(old), &patch).unwrap(), new);
    }

    #[test]
    fn replaced_and_appended_markup_stays_escaped() {
        let old = "<ul><li>a</li></ul><i>x</i>";
        let new = "<ul><li>a</li><li>&lt;script&gt;</li></ul><b>1 &amp; 2</b>";
        let patch = diff(Some(old), new);
        assert_eq!(
            patch.ops,
            vec![
                PatchOp::Append {
                    path: vec![0],
                    html: String::from("<li>&lt;script&gt;</li>"),
                },
                PatchOp::Replace {
                    path: vec![1],
                    html: String::from("<b>1 &amp; 2</b>"),
                },
            ]
        );
        same_dom(&apply(Some(old), &patch).unwrap(), new);
    }

    #[test]
    fn undecodable_reference_falls_back_to_replace_all() {
        let patch = diff(Some("<p>a</p>"), "<p>&bogus;</p>");
        assert_eq!(
            patch.ops,
            vec![PatchOp::ReplaceAll {
                html: String::from("<p>&bogus;</p>"),
            }]
        );
    }

    #[test]
    fn unparseable_previous_falls_back_to_replace_all() {
        let patch = diff(Some("<div>"), "<div></div>");
        assert_eq!(
            patch.ops,
            vec![PatchOp::ReplaceAll {
                html: String::from("<div></div>"),
            }]
        );
    }

    #[test]
    fn bad_paths_are_rejected() {
        let patch = Patch {
            ops: vec![PatchOp::Remove { path: vec![5] }],
        };
        assert_eq!(
            apply(Some("<p></p>"), &patch),
            Err(PatchError::InvalidPath(vec![5]))
        );

        let patch = Patch {
            ops: vec![PatchOp::SetText {
                path: vec![0],
                text: String::from("x"),
            }],
        };
        assert_eq!(apply(Some("<p></p>"), &patch), Err(PatchError::NotText(vec![0])));
    }
}
