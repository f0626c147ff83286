use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

pub type Path = Vec<usize>;

pub const BOLD: &str = "bold";
pub const ITALIC: &str = "italic";
pub const UNDERLINE: &str = "underline";

/// The leaf field that carries the run's characters. It can never double as a mark name.
const TEXT_FIELD: &str = "text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockKind {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    HeadingThree,
    BlockQuote,
    BulletedList,
    NumberedList,
    ListItem,
}

impl BlockKind {
    pub const ALL: [BlockKind; 8] = [
        BlockKind::Paragraph,
        BlockKind::HeadingOne,
        BlockKind::HeadingTwo,
        BlockKind::HeadingThree,
        BlockKind::BlockQuote,
        BlockKind::BulletedList,
        BlockKind::NumberedList,
        BlockKind::ListItem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::HeadingOne => "heading-one",
            BlockKind::HeadingTwo => "heading-two",
            BlockKind::HeadingThree => "heading-three",
            BlockKind::BlockQuote => "block-quote",
            BlockKind::BulletedList => "bulleted-list",
            BlockKind::NumberedList => "numbered-list",
            BlockKind::ListItem => "list-item",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        BlockKind::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Containers whose children are all `ListItem`s.
    pub fn is_list(self) -> bool {
        matches!(self, BlockKind::BulletedList | BlockKind::NumberedList)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockKind::from_name(s).ok_or_else(|| Error::UnknownBlockKind(s.to_string()))
    }
}

impl Serialize for BlockKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Unknown element types render as paragraphs, so they load as paragraphs too.
        let name = String::deserialize(deserializer)?;
        Ok(BlockKind::from_name(&name).unwrap_or(BlockKind::Paragraph))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
    Justify,
}

impl Align {
    pub fn as_str(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
            Align::Justify => "justify",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Align::Left),
            "center" => Some(Align::Center),
            "right" => Some(Align::Right),
            "justify" => Some(Align::Justify),
            _ => None,
        }
    }
}

/// Character-level formatting of a text run.
///
/// Only marks that are switched on are stored, so a mark explicitly mapped to
/// `false` and an absent mark compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Marks {
    active: BTreeSet<String>,
}

impl Marks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mark: impl Into<String>) -> Self {
        self.set(mark, true);
        self
    }

    pub fn is_active(&self, mark: &str) -> bool {
        self.active.contains(mark)
    }

    pub fn set(&mut self, mark: impl Into<String>, on: bool) {
        let mark = mark.into();
        if mark == TEXT_FIELD {
            return;
        }
        if on {
            self.active.insert(mark);
        } else {
            self.active.remove(&mark);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    pub fn intersection(&self, other: &Marks) -> Marks {
        Marks {
            active: self.active.intersection(&other.active).cloned().collect(),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Marks {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut marks = Marks::new();
        for mark in iter {
            marks.set(mark, true);
        }
        marks
    }
}

impl Serialize for Marks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.active.len()))?;
        for mark in &self.active {
            map.serialize_entry(mark, &true)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Marks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MarksVisitor;

        impl<'de> Visitor<'de> for MarksVisitor {
            type Value = Marks;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of mark names")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Marks, A::Error> {
                let mut marks = Marks::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    // Leaves may carry arbitrary extra keys; only `true` flags are marks.
                    if value == Value::Bool(true) {
                        marks.set(key, true);
                    }
                }
                Ok(marks)
            }
        }

        deserializer.deserialize_map(MarksVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
    #[serde(flatten)]
    pub marks: Marks,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    pub fn with_marks(text: impl Into<String>, marks: Marks) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(kind: BlockKind, children: Vec<Node>) -> Self {
        Self {
            kind,
            align: None,
            children,
        }
    }

    /// A block holding a single unformatted run.
    pub fn leaf(kind: BlockKind, text: impl Into<String>) -> Self {
        Self::new(kind, vec![Node::Text(Text::new(text))])
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::leaf(BlockKind::Paragraph, text)
    }

    pub fn list(kind: BlockKind, items: Vec<Element>) -> Self {
        Self::new(kind, items.into_iter().map(Node::Element).collect())
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = Some(align);
        self
    }

    pub fn is_list(&self) -> bool {
        self.kind.is_list()
    }

    pub fn texts(&self) -> impl Iterator<Item = &Text> {
        self.children.iter().filter_map(|node| match node {
            Node::Text(text) => Some(text),
            Node::Element(_) => None,
        })
    }

    /// The block's own characters, excluding nested blocks.
    pub fn inline_text(&self) -> String {
        self.texts().map(|t| t.text.as_str()).collect()
    }

    pub fn inline_len(&self) -> usize {
        self.texts().map(Text::char_len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Element(Element),
    Text(Text),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(Text::new(text))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Element(&'a Element),
    Text(&'a Text),
}

/// A block that owns text runs directly: every element except list containers.
#[derive(Debug, Clone)]
pub struct TextBlock<'a> {
    pub path: Path,
    pub element: &'a Element,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub children: Vec<Element>,
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

impl Document {
    pub fn new(children: Vec<Element>) -> Self {
        Self { children }
    }

    /// One empty paragraph with one empty run.
    pub fn empty() -> Self {
        Self {
            children: vec![Element::paragraph("")],
        }
    }

    pub fn node_at(&self, path: &[usize]) -> Option<NodeRef<'_>> {
        let (first, rest) = path.split_first()?;
        let mut element = self.children.get(*first)?;
        for (depth, &ix) in rest.iter().enumerate() {
            match element.children.get(ix)? {
                Node::Element(child) => element = child,
                Node::Text(text) if depth + 1 == rest.len() => return Some(NodeRef::Text(text)),
                Node::Text(_) => return None,
            }
        }
        Some(NodeRef::Element(element))
    }

    pub fn element_at(&self, path: &[usize]) -> Option<&Element> {
        match self.node_at(path)? {
            NodeRef::Element(element) => Some(element),
            NodeRef::Text(_) => None,
        }
    }

    pub fn text_at(&self, path: &[usize]) -> Option<&Text> {
        match self.node_at(path)? {
            NodeRef::Text(text) => Some(text),
            NodeRef::Element(_) => None,
        }
    }

    pub fn element_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let (first, rest) = path.split_first()?;
        let mut element = self.children.get_mut(*first)?;
        for &ix in rest {
            element = match element.children.get_mut(ix)? {
                Node::Element(child) => child,
                Node::Text(_) => return None,
            };
        }
        Some(element)
    }

    /// Every text run with its path, in document order.
    pub fn leaves(&self) -> Vec<(Path, &Text)> {
        fn walk<'a>(children: &'a [Node], path: &mut Path, out: &mut Vec<(Path, &'a Text)>) {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);
                match node {
                    Node::Text(text) => out.push((path.clone(), text)),
                    Node::Element(el) => walk(&el.children, path, out),
                }
                path.pop();
            }
        }

        let mut out = Vec::new();
        let mut path = Vec::new();
        for (ix, block) in self.children.iter().enumerate() {
            path.push(ix);
            walk(&block.children, &mut path, &mut out);
            path.pop();
        }
        out
    }

    /// Every element with its path, parents before children.
    pub fn elements(&self) -> Vec<(Path, &Element)> {
        fn walk<'a>(element: &'a Element, path: &mut Path, out: &mut Vec<(Path, &'a Element)>) {
            out.push((path.clone(), element));
            for (ix, node) in element.children.iter().enumerate() {
                if let Node::Element(child) = node {
                    path.push(ix);
                    walk(child, path, out);
                    path.pop();
                }
            }
        }

        let mut out = Vec::new();
        let mut path = Vec::new();
        for (ix, block) in self.children.iter().enumerate() {
            path.push(ix);
            walk(block, &mut path, &mut out);
            path.pop();
        }
        out
    }

    pub fn text_blocks(&self) -> Vec<TextBlock<'_>> {
        self.elements()
            .into_iter()
            .filter(|(_, element)| !element.is_list())
            .map(|(path, element)| TextBlock { path, element })
            .collect()
    }

    /// Text blocks joined by newlines.
    pub fn plain_text(&self) -> String {
        self.text_blocks()
            .iter()
            .map(|block| block.element.inline_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Visits text blocks mutably in document order, numbering them like [`Document::text_blocks`].
pub(crate) fn for_each_text_block_mut(
    doc: &mut Document,
    mut visit: impl FnMut(usize, &mut Element),
) {
    fn walk(element: &mut Element, ordinal: &mut usize, visit: &mut dyn FnMut(usize, &mut Element)) {
        if !element.is_list() {
            visit(*ordinal, element);
            *ordinal += 1;
        }
        for node in &mut element.children {
            if let Node::Element(child) = node {
                walk(child, ordinal, visit);
            }
        }
    }

    let mut ordinal = 0usize;
    for block in &mut doc.children {
        walk(block, &mut ordinal, &mut visit);
    }
}

pub(crate) fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(ix, _)| ix)
        .unwrap_or(text.len())
}
