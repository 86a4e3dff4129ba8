//! Lightweight markup tree used by the diff.
//!
//! The parser is deliberately strict: anything it cannot map one-to-one
//! onto the tree a browser would build (unclosed elements, mismatched
//! close tags, unterminated comments) is a [`MarkupError`], and the
//! caller falls back to replacing the whole live root. Text and
//! attribute values are stored decoded, the way the DOM holds them, so
//! they can go straight to `nodeValue` and `setAttribute` on the client.
//! Serialization escapes them again. Character references outside the
//! small table below are treated as unparseable for the same reason.
//!
//! Tag and attribute names are lowercased, matching the HTML DOM.

use liveframe_types::NodePath;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose content is raw text up to the matching close tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Raw text elements whose content still decodes character references.
const ESCAPABLE_RAW_TEXT_ELEMENTS: &[&str] = &["textarea", "title"];

/// Named character references the parser decodes.
const NAMED_REFERENCES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("copy", '\u{a9}'),
    ("reg", '\u{ae}'),
    ("middot", '\u{b7}'),
    ("laquo", '\u{ab}'),
    ("raquo", '\u{bb}'),
    ("times", '\u{d7}'),
    ("ndash", '\u{2013}'),
    ("mdash", '\u{2014}'),
    ("hellip", '\u{2026}'),
];

/// Errors raised while parsing markup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkupError {
    /// An element was still open at the end of input.
    #[error("unclosed element <{0}>")]
    Unclosed(String),

    /// A close tag did not match the innermost open element.
    #[error("close tag </{found}> does not match <{expected}>")]
    Mismatched {
        /// Innermost open element (empty at top level).
        expected: String,
        /// Close tag encountered.
        found: String,
    },

    /// A comment, tag, or quoted value ran off the end of input.
    #[error("unterminated {0}")]
    Unterminated(&'static str),

    /// An attribute or tag name was empty or malformed.
    #[error("malformed tag near byte {0}")]
    MalformedTag(usize),

    /// A character reference the parser cannot decode.
    #[error("unsupported character reference &{0}")]
    UnsupportedReference(String),
}

/// A single attribute. `value` is `None` for bare boolean attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lowercased attribute name.
    pub name: String,
    /// Decoded value.
    pub value: Option<String>,
}

/// An element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub tag: String,
    /// Attributes in source order.
    pub attrs: Vec<Attribute>,
    /// Child nodes.
    pub children: Vec<Node>,
    /// Written as `<tag/>` in the source.
    pub self_closing: bool,
}

impl Element {
    /// Look up an attribute value. Boolean attributes read as `""`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    /// Set an attribute, replacing any existing value.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let value = Some(value.to_owned());
        if let Some(existing) = self.attrs.iter_mut().find(|a| a.name == name) {
            existing.value = value;
        } else {
            self.attrs.push(Attribute {
                name: name.to_owned(),
                value,
            });
        }
    }

    /// Remove an attribute if present.
    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|a| a.name != name);
    }

    /// Whether the element is a void element.
    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.tag.as_str())
    }

    /// Whether text children are written without escaping.
    pub fn is_raw_text(&self) -> bool {
        RAW_TEXT_ELEMENTS.contains(&self.tag.as_str())
    }
}

/// A node in the markup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with attributes and children.
    Element(Element),
    /// Decoded text. Inside `script` and `style` it is kept verbatim.
    Text(String),
    /// Comment body (between `<!--` and `-->`).
    Comment(String),
    /// Declaration body such as `DOCTYPE html` (between `<!` and `>`).
    Declaration(String),
}

impl Node {
    /// Serialize this node to markup.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_node(self, false, &mut out);
        out
    }
}

/// An ordered list of top-level nodes: the content of the live root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Top-level nodes.
    pub nodes: Vec<Node>,
}

impl Fragment {
    /// Parse markup into a fragment.
    pub fn parse(src: &str) -> Result<Self, MarkupError> {
        Parser::new(src).parse().map(|nodes| Self { nodes })
    }

    /// Serialize back to markup.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            write_node(node, false, &mut out);
        }
        out
    }

    /// Node at `path`, or `None` if the path leaves the tree.
    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.nodes.get(*first)?;
        for index in rest {
            match node {
                Node::Element(el) => node = el.children.get(*index)?,
                _ => return None,
            }
        }
        Some(node)
    }

    /// Mutable node at `path`.
    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.nodes.get_mut(*first)?;
        for index in rest {
            match node {
                Node::Element(el) => node = el.children.get_mut(*index)?,
                _ => return None,
            }
        }
        Some(node)
    }

    /// Child list of the node at `path` (`[]` is the root's own list).
    pub fn children_at_mut(&mut self, path: &NodePath) -> Option<&mut Vec<Node>> {
        if path.is_empty() {
            return Some(&mut self.nodes);
        }
        match self.node_at_mut(path)? {
            Node::Element(el) => Some(&mut el.children),
            _ => None,
        }
    }
}

fn write_node(node: &Node, raw: bool, out: &mut String) {
    match node {
        Node::Text(text) if raw => out.push_str(text),
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Comment(body) => {
            out.push_str("<!--");
            out.push_str(body);
            out.push_str("-->");
        }
        Node::Declaration(body) => {
            out.push_str("<!");
            out.push_str(body);
            out.push('>');
        }
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for attr in &el.attrs {
                out.push(' ');
                out.push_str(&attr.name);
                if let Some(value) = &attr.value {
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
            }
            if el.self_closing {
                out.push_str("/>");
                return;
            }
            out.push('>');
            if el.is_void() {
                return;
            }
            let raw = el.is_raw_text();
            for child in &el.children {
                write_node(child, raw, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

/// Escape an attribute value for a double-quoted context.
pub fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Escape text content.
pub fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Decode character references in text or an attribute value.
///
/// A `&` that does not start a reference (`a & b`) is kept as written.
/// References missing their `;`, naming an entity outside the table, or
/// encoding an invalid code point are rejected rather than guessed at.
pub fn decode_references(raw: &str) -> Result<String, MarkupError> {
    if !raw.contains('&') {
        return Ok(raw.to_owned());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(at) = rest.find('&') {
        out.push_str(rest.get(..at).unwrap_or(""));
        let after = rest.get(at.saturating_add(1)..).unwrap_or("");
        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '#'))
            .unwrap_or(after.len());
        let name = after.get(..len).unwrap_or("");
        if name.is_empty() {
            out.push('&');
            rest = after;
            continue;
        }
        if !after.get(len..).is_some_and(|r| r.starts_with(';')) {
            return Err(MarkupError::UnsupportedReference(name.to_owned()));
        }
        let decoded = decode_reference(name)
            .ok_or_else(|| MarkupError::UnsupportedReference(format!("{name};")))?;
        out.push(decoded);
        rest = after.get(len.saturating_add(1)..).unwrap_or("");
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_reference(name: &str) -> Option<char> {
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return NAMED_REFERENCES
            .iter()
            .find(|(entity, _)| *entity == name)
            .map(|(_, c)| *c);
    };
    char::from_u32(code).filter(|c| *c != '\0')
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        self.src.get(self.pos..).unwrap_or("")
    }

    const fn advance(&mut self, bytes: usize) {
        self.pos = self.pos.saturating_add(bytes);
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.advance(rest.len().saturating_sub(trimmed.len()));
    }

    fn parse(mut self) -> Result<Vec<Node>, MarkupError> {
        let mut roots: Vec<Node> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();

        while !self.rest().is_empty() {
            let node = if self.rest().starts_with("<!--") {
                Some(self.comment()?)
            } else if self.rest().starts_with("</") && starts_tag(self.rest().get(2..)) {
                let name = self.close_tag()?;
                let open = stack.pop().ok_or_else(|| MarkupError::Mismatched {
                    expected: String::new(),
                    found: name.clone(),
                })?;
                if open.tag != name {
                    return Err(MarkupError::Mismatched {
                        expected: open.tag,
                        found: name,
                    });
                }
                Some(Node::Element(open))
            } else if self.rest().starts_with("<!") {
                Some(self.declaration()?)
            } else if self.rest().starts_with('<') && starts_tag(self.rest().get(1..)) {
                let el = self.open_tag()?;
                if el.self_closing || el.is_void() {
                    Some(Node::Element(el))
                } else if el.is_raw_text()
                    || ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&el.tag.as_str())
                {
                    Some(Node::Element(self.raw_text(el)?))
                } else {
                    stack.push(el);
                    None
                }
            } else {
                Some(Node::Text(decode_references(&self.text())?))
            };

            if let Some(node) = node {
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => roots.push(node),
                }
            }
        }

        match stack.pop() {
            Some(open) => Err(MarkupError::Unclosed(open.tag)),
            None => Ok(roots),
        }
    }

    fn comment(&mut self) -> Result<Node, MarkupError> {
        self.advance("<!--".len());
        let rest = self.rest();
        let end = rest.find("-->").ok_or(MarkupError::Unterminated("comment"))?;
        let body = rest.get(..end).unwrap_or("").to_owned();
        self.advance(end.saturating_add("-->".len()));
        Ok(Node::Comment(body))
    }

    fn declaration(&mut self) -> Result<Node, MarkupError> {
        self.advance("<!".len());
        let rest = self.rest();
        let end = rest.find('>').ok_or(MarkupError::Unterminated("declaration"))?;
        let body = rest.get(..end).unwrap_or("").to_owned();
        self.advance(end.saturating_add(1));
        Ok(Node::Declaration(body))
    }

    fn name(&mut self) -> String {
        let rest = self.rest();
        let len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
        let name = rest.get(..len).unwrap_or("").to_ascii_lowercase();
        self.advance(len);
        name
    }

    fn close_tag(&mut self) -> Result<String, MarkupError> {
        self.advance("</".len());
        let name = self.name();
        self.skip_whitespace();
        if !self.rest().starts_with('>') {
            return Err(MarkupError::MalformedTag(self.pos));
        }
        self.advance(1);
        Ok(name)
    }

    fn open_tag(&mut self) -> Result<Element, MarkupError> {
        self.advance(1);
        let tag = self.name();
        let mut attrs = Vec::new();

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(MarkupError::Unterminated("tag"));
            }
            if rest.starts_with("/>") {
                self.advance(2);
                return Ok(Element {
                    tag,
                    attrs,
                    children: Vec::new(),
                    self_closing: true,
                });
            }
            if rest.starts_with('>') {
                self.advance(1);
                return Ok(Element {
                    tag,
                    attrs,
                    children: Vec::new(),
                    self_closing: false,
                });
            }
            attrs.push(self.attribute()?);
        }
    }

    fn attribute(&mut self) -> Result<Attribute, MarkupError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/' | '"' | '\''))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(MarkupError::MalformedTag(self.pos));
        }
        let name = rest.get(..len).unwrap_or("").to_ascii_lowercase();
        self.advance(len);
        self.skip_whitespace();

        if !self.rest().starts_with('=') {
            return Ok(Attribute { name, value: None });
        }
        self.advance(1);
        self.skip_whitespace();

        let rest = self.rest();
        let value = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = rest.get(1..).unwrap_or("");
                let end = body.find(quote).ok_or(MarkupError::Unterminated("attribute value"))?;
                let raw = body.get(..end).unwrap_or("");
                self.advance(end.saturating_add(2));
                decode_references(raw)?
            }
            Some(_) => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                let raw = rest.get(..end).unwrap_or("");
                self.advance(end);
                decode_references(raw)?
            }
            None => return Err(MarkupError::Unterminated("attribute value")),
        };
        Ok(Attribute {
            name,
            value: Some(value),
        })
    }

    fn raw_text(&mut self, mut el: Element) -> Result<Element, MarkupError> {
        let rest = self.rest();
        let needle = format!("</{}", el.tag);
        // ASCII lowercasing keeps byte offsets intact.
        let end = rest
            .to_ascii_lowercase()
            .find(&needle)
            .ok_or_else(|| MarkupError::Unclosed(el.tag.clone()))?;
        let body = rest.get(..end).unwrap_or("");
        if !body.is_empty() {
            let text = if el.is_raw_text() {
                body.to_owned()
            } else {
                decode_references(body)?
            };
            el.children.push(Node::Text(text));
        }
        self.advance(end);
        let name = self.close_tag()?;
        if name != el.tag {
            return Err(MarkupError::Mismatched {
                expected: el.tag,
                found: name,
            });
        }
        Ok(el)
    }

    fn text(&mut self) -> String {
        let rest = self.rest();
        let mut end = 0_usize;
        loop {
            let Some(offset) = rest.get(end..).and_then(|r| r.find('<')) else {
                end = rest.len();
                break;
            };
            let at = end.saturating_add(offset);
            if at > 0 && starts_markup(rest.get(at..).unwrap_or("")) {
                end = at;
                break;
            }
            end = at.saturating_add(1);
        }
        let text = rest.get(..end).unwrap_or("").to_owned();
        self.advance(end);
        text
    }
}

fn starts_tag(rest: Option<&str>) -> bool {
    rest.and_then(|r| r.chars().next())
        .is_some_and(|c| c.is_ascii_alphabetic())
}

fn starts_markup(rest: &str) -> bool {
    rest.starts_with("<!")
        || (rest.starts_with("</") && starts_tag(rest.get(2..)))
        || (rest.starts_with('<') && starts_tag(rest.get(1..)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_markup_round_trips_exactly() {
        let src = r#"<!DOCTYPE html><div id="clock" class="big"><span>12:00:00</span><br><!-- tick --><img src="a.png"/></div>"#;
        let fragment = Fragment::parse(src).unwrap();
        assert_eq!(fragment.to_html(), src);
    }

    #[test]
    fn text_with_lone_angle_bracket_stays_text() {
        let src = "<p>1 < 2 and 3 > 2</p>";
        let fragment = Fragment::parse(src).unwrap();
        assert_eq!(fragment.nodes.len(), 1);
        assert_eq!(
            fragment.node_at(&[0, 0]),
            Some(&Node::Text(String::from("1 < 2 and 3 > 2")))
        );
    }

    #[test]
    fn names_are_lowercased_and_values_decoded() {
        let fragment = Fragment::parse(r#"<DIV Title='a &amp; "b"' hidden></DIV>"#).unwrap();
        let el = match fragment.nodes.first() {
            Some(Node::Element(el)) => el,
            other => panic!("Expected element, got {other:?}"),
        };
        assert_eq!(el.tag, "div");
        assert_eq!(el.attr("title"), Some("a & \"b\""));
        assert_eq!(el.attr("hidden"), Some(""));
        assert_eq!(
            fragment.to_html(),
            r#"<div title="a &amp; &quot;b&quot;" hidden></div>"#
        );
    }

    #[test]
    fn script_content_is_raw() {
        let src = "<script>if (a < b && c) { x('</p>'); }</script>";
        let fragment = Fragment::parse(src).unwrap();
        assert_eq!(fragment.to_html(), src);
        assert_eq!(fragment.node_at(&[0]).map(|n| matches!(n, Node::Element(_))), Some(true));
    }

    #[test]
    fn structural_errors_are_reported() {
        assert_eq!(
            Fragment::parse("<div><span></div>"),
            Err(MarkupError::Mismatched {
                expected: String::from("span"),
                found: String::from("div"),
            })
        );
        assert_eq!(
            Fragment::parse("<div>"),
            Err(MarkupError::Unclosed(String::from("div")))
        );
        assert_eq!(
            Fragment::parse("<!-- never ends"),
            Err(MarkupError::Unterminated("comment"))
        );
        assert!(Fragment::parse("</p>").is_err());
    }

    #[test]
    fn text_and_attributes_hold_dom_values() {
        let src = r#"<p title="it&#x27;s &quot;on&quot;">Tom &amp; Jerry&#x27;s &lt;b&gt; &#x2f; &#47;</p>"#;
        let fragment = Fragment::parse(src).unwrap();
        let Some(Node::Element(p)) = fragment.node_at(&[0]) else {
            panic!("Expected element");
        };
        assert_eq!(p.attr("title"), Some("it's \"on\""));
        assert_eq!(
            fragment.node_at(&[0, 0]),
            Some(&Node::Text(String::from("Tom & Jerry's <b> / /")))
        );
        assert_eq!(
            fragment.to_html(),
            r#"<p title="it's &quot;on&quot;">Tom &amp; Jerry's &lt;b&gt; / /</p>"#
        );
    }

    #[test]
    fn serialized_markup_reparses_to_the_same_tree() {
        let src = "<p>a &amp; b &nbsp;&mdash; 1 &lt; 2</p><textarea>x &amp; y</textarea>";
        let fragment = Fragment::parse(src).unwrap();
        assert_eq!(Fragment::parse(&fragment.to_html()).unwrap(), fragment);
        assert_eq!(
            fragment.node_at(&[1, 0]),
            Some(&Node::Text(String::from("x & y")))
        );
    }

    #[test]
    fn bare_ampersand_is_literal() {
        let fragment = Fragment::parse("<p>salt & pepper</p>").unwrap();
        assert_eq!(
            fragment.node_at(&[0, 0]),
            Some(&Node::Text(String::from("salt & pepper")))
        );
        assert_eq!(fragment.to_html(), "<p>salt &amp; pepper</p>");
    }

    #[test]
    fn script_text_is_not_decoded() {
        let src = "<script>let s = '&amp;';</script>";
        let fragment = Fragment::parse(src).unwrap();
        assert_eq!(
            fragment.node_at(&[0, 0]),
            Some(&Node::Text(String::from("let s = '&amp;';")))
        );
        assert_eq!(fragment.to_html(), src);
    }

    #[test]
    fn unknown_references_are_unparseable() {
        assert_eq!(
            Fragment::parse("<p>&bogus;</p>"),
            Err(MarkupError::UnsupportedReference(String::from("bogus;")))
        );
        assert!(Fragment::parse("<p>&amp</p>").is_err());
        assert!(Fragment::parse("<p>&#0;</p>").is_err());
        assert!(Fragment::parse("<p>&#xD800;</p>").is_err());
    }

    #[test]
    fn paths_walk_children() {
        let fragment = Fragment::parse("<ul><li>a</li><li>b</li></ul>text").unwrap();
        assert_eq!(fragment.node_at(&[0, 1, 0]), Some(&Node::Text(String::from("b"))));
        assert_eq!(fragment.node_at(&[1]), Some(&Node::Text(String::from("text"))));
        assert_eq!(fragment.node_at(&[1, 0]), None);
        assert_eq!(fragment.node_at(&[]), None);
    }
}
