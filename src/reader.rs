//! MusicXML reader — loads a document into the weakly-typed raw node tree.
//!
//! The reader owns the two load-time gates (file extension, XML syntax) and
//! the literal-inference rule that turns attribute and text values into
//! typed [`Literal`]s. It stops at the `<score-partwise>` boundary: the
//! structured interpretation of the tree is the parser's job.

use std::collections::BTreeMap;
use std::path::Path;

use roxmltree::{Document, Node};

use crate::error::ScoreError;

/// Extensions accepted for score documents. Matching is case-sensitive;
/// anything else is rejected before parsing is attempted.
const VALID_MUSICXML_EXTS: [&str; 2] = ["xml", "musicxml"];

/// A coerced attribute or text value.
///
/// Every raw string in the document goes through the same inference rule:
/// empty → omitted, `yes`/`true` → `Bool(true)`, `no`/`false` →
/// `Bool(false)`, a full float parse → `Number`, anything else → `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Literal {
    /// Apply the inference rule. Returns `None` for empty (or
    /// whitespace-only) strings, which are omitted from the tree.
    pub fn infer(raw: &str) -> Option<Literal> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        if s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true") {
            return Some(Literal::Bool(true));
        }
        if s.eq_ignore_ascii_case("no") || s.eq_ignore_ascii_case("false") {
            return Some(Literal::Bool(false));
        }
        if let Ok(n) = s.parse::<f64>() {
            return Some(Literal::Number(n));
        }
        Some(Literal::Text(s.to_string()))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A generic XML element: tag name, coerced attributes, ordered children.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub tag_name: String,
    pub attributes: BTreeMap<String, Literal>,
    pub children: Vec<RawChild>,
}

/// A child of a [`RawNode`]: either a nested element or a coerced value.
#[derive(Debug, Clone, PartialEq)]
pub enum RawChild {
    Node(RawNode),
    Value(Literal),
}

/// The children of the top-level `<score-partwise>` element.
pub type RawScore = Vec<RawChild>;

impl RawNode {
    pub fn attribute(&self, name: &str) -> Option<&Literal> {
        self.attributes.get(name)
    }

    /// Iterate the element children, skipping literal values.
    pub fn nodes(&self) -> impl Iterator<Item = &RawNode> {
        self.children.iter().filter_map(|c| match c {
            RawChild::Node(n) => Some(n),
            RawChild::Value(_) => None,
        })
    }

    /// First element child with the given tag name.
    pub fn find(&self, tag: &str) -> Option<&RawNode> {
        self.nodes().find(|n| n.tag_name == tag)
    }

    /// The element's single literal value, for simple nodes like
    /// `<duration>4</duration>`.
    pub fn value(&self) -> Option<&Literal> {
        self.children.iter().find_map(|c| match c {
            RawChild::Value(v) => Some(v),
            RawChild::Node(_) => None,
        })
    }

    /// True when the element has no children at all (presence flags like
    /// `<chord/>` and `<rest/>`).
    pub fn is_empty_element(&self) -> bool {
        self.children.is_empty()
    }
}

/// Read a score document from disk.
///
/// Fatal failures: unreadable file, an extension other than `.xml` or
/// `.musicxml`, unparseable XML, or a document with no `<score-partwise>`.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<RawScore, ScoreError> {
    let path = path.as_ref();

    let valid_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| VALID_MUSICXML_EXTS.contains(&e))
        .unwrap_or(false);
    if !valid_ext {
        return Err(ScoreError::InvalidExtension {
            path: path.display().to_string(),
        });
    }

    let xml = std::fs::read_to_string(path).map_err(|source| ScoreError::Io {
        path: path.display().to_string(),
        source,
    })?;

    read_str(&xml)
}

/// Parse a MusicXML string into the raw node tree and return the contents
/// of the top-level `<score-partwise>` element.
pub fn read_str(xml: &str) -> Result<RawScore, ScoreError> {
    // MusicXML files carry a DOCTYPE declaration, so DTDs must be allowed.
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)
        .map_err(|e| ScoreError::XmlSyntax(e.to_string()))?;

    let root = doc.root_element();
    if root.tag_name().name() != "score-partwise" {
        return Err(ScoreError::MalformedDocument);
    }

    Ok(convert_node(&root).children)
}

fn convert_node(node: &Node) -> RawNode {
    let mut attributes = BTreeMap::new();
    for attr in node.attributes() {
        if let Some(lit) = Literal::infer(attr.value()) {
            attributes.insert(attr.name().to_string(), lit);
        }
    }

    let mut children = Vec::new();
    for child in node.children() {
        if child.is_element() {
            children.push(RawChild::Node(convert_node(&child)));
        } else if child.is_text() {
            if let Some(lit) = child.text().and_then(Literal::infer) {
                children.push(RawChild::Value(lit));
            }
        }
    }

    RawNode {
        tag_name: node.tag_name().name().to_string(),
        attributes,
        children,
    }
}
