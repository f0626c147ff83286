use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::document::{Document, Node, NodeRef, Path};

/// A caret position: the path of a text run plus a character offset inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }

    fn block_path(&self) -> &[usize] {
        self.path.split_last().map(|(_, p)| p).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn caret(path: Path, offset: usize) -> Self {
        Self::collapsed(Point::new(path, offset))
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_backward(&self) -> bool {
        self.focus < self.anchor
    }

    /// `(start, end)` in document order.
    pub fn edges(&self) -> (Point, Point) {
        if self.is_backward() {
            (self.focus.clone(), self.anchor.clone())
        } else {
            (self.anchor.clone(), self.focus.clone())
        }
    }

    /// The ordered range with boundary endpoints pulled inward.
    ///
    /// An end resting at offset 0 of the first run of a later block is moved to
    /// the end of the run before it, and a start resting at the end of the last
    /// run of an earlier block is moved to the start of the run after it. Either
    /// way the block merely touched by the range does not count as selected.
    pub fn unhung(&self, doc: &Document) -> (Point, Point) {
        let (mut start, mut end) = self.edges();
        if start == end {
            return (start, end);
        }

        let leaves = doc.leaves();
        let position = |path: &Path| leaves.iter().position(|(p, _)| p == path);

        if end.offset == 0 && end.block_path() != start.block_path() {
            if let Some(ix) = position(&end.path).filter(|&ix| ix > 0) {
                let (prev_path, prev) = &leaves[ix - 1];
                if prev_path[..prev_path.len() - 1] != *end.block_path() {
                    end = Point::new(prev_path.clone(), prev.char_len());
                }
            }
        }

        if end.block_path() != start.block_path() {
            if let Some(ix) = position(&start.path) {
                let at_end = leaves[ix].1.char_len() <= start.offset;
                if let Some((next_path, _)) = leaves.get(ix + 1).filter(|_| at_end) {
                    if next_path[..next_path.len() - 1] != *start.block_path() {
                        start = Point::new(next_path.clone(), 0);
                    }
                }
            }
        }

        if end < start {
            end = start.clone();
        }
        (start, end)
    }

    /// Snaps both points onto existing text runs, or `None` if the document has none.
    pub fn clamped(&self, doc: &Document) -> Option<Selection> {
        let anchor = clamp_point(doc, &self.anchor);
        let focus = clamp_point(doc, &self.focus);
        match (anchor, focus) {
            (Some(anchor), Some(focus)) => Some(Selection { anchor, focus }),
            (Some(point), None) | (None, Some(point)) => Some(Selection::collapsed(point)),
            (None, None) => first_point(doc).map(Selection::collapsed),
        }
    }
}

/// Orders paths the way their subtrees appear in the document. A path and any
/// of its ancestors compare equal.
pub fn compare_paths(a: &[usize], b: &[usize]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Whether the subtree at `path` overlaps the range from `start` to `end`.
pub fn path_in_range(path: &[usize], start: &Point, end: &Point) -> bool {
    compare_paths(path, &start.path) != Ordering::Less
        && compare_paths(path, &end.path) != Ordering::Greater
}

pub fn first_point(doc: &Document) -> Option<Point> {
    doc.leaves()
        .into_iter()
        .next()
        .map(|(path, _)| Point::new(path, 0))
}

pub fn clamp_point(doc: &Document, point: &Point) -> Option<Point> {
    if doc.children.is_empty() {
        return None;
    }
    if let Some(text) = doc.text_at(&point.path) {
        return Some(Point::new(
            point.path.clone(),
            point.offset.min(text.char_len()),
        ));
    }

    // Walk as far down the wanted path as the tree allows, then take the first
    // run below that node.
    let mut resolved: Path = Vec::new();
    for &wanted in &point.path {
        let len = match doc.node_at(&resolved) {
            None if resolved.is_empty() => doc.children.len(),
            Some(NodeRef::Element(el)) => el.children.len(),
            _ => 0,
        };
        if len == 0 {
            break;
        }
        resolved.push(wanted.min(len - 1));
        if let Some(NodeRef::Text(text)) = doc.node_at(&resolved) {
            return Some(Point::new(resolved, point.offset.min(text.char_len())));
        }
    }

    doc.leaves()
        .into_iter()
        .find(|(path, _)| path.starts_with(&resolved))
        .map(|(path, _)| Point::new(path, 0))
        .or_else(|| first_point(doc))
}

/// A point addressed by text block ordinal and character offset within that
/// block's own runs. Survives any rewrite that keeps block order and text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextPosition {
    pub block: usize,
    pub offset: usize,
}

pub fn text_position(doc: &Document, point: &Point) -> Option<TextPosition> {
    let (&child_ix, block_path) = point.path.split_last()?;
    let blocks = doc.text_blocks();
    let block = blocks.iter().position(|b| b.path == block_path)?;
    let element = blocks[block].element;

    let mut offset = 0usize;
    for (ix, node) in element.children.iter().enumerate() {
        let Node::Text(text) = node else {
            continue;
        };
        if ix == child_ix {
            return Some(TextPosition {
                block,
                offset: offset + point.offset.min(text.char_len()),
            });
        }
        offset += text.char_len();
    }
    None
}

pub fn point_at(doc: &Document, position: TextPosition) -> Option<Point> {
    let blocks = doc.text_blocks();
    let block = blocks.get(position.block).or_else(|| blocks.last())?;

    let texts: Vec<(usize, usize)> = block
        .element
        .children
        .iter()
        .enumerate()
        .filter_map(|(ix, node)| match node {
            Node::Text(text) => Some((ix, text.char_len())),
            Node::Element(_) => None,
        })
        .collect();

    let mut remaining = position.offset;
    for (n, &(child_ix, len)) in texts.iter().enumerate() {
        let at_boundary = remaining == len && n + 1 < texts.len();
        if remaining < len || (remaining == len && !at_boundary) {
            let mut path = block.path.clone();
            path.push(child_ix);
            return Some(Point::new(path, remaining));
        }
        remaining -= len;
    }

    let &(child_ix, len) = texts.last()?;
    let mut path = block.path.clone();
    path.push(child_ix);
    Some(Point::new(path, len))
}

/// Maps a selection onto text positions so it can be rebuilt after a rewrite.
pub(crate) fn selection_positions(
    doc: &Document,
    selection: &Selection,
) -> Option<(TextPosition, TextPosition)> {
    Some((
        text_position(doc, &selection.anchor)?,
        text_position(doc, &selection.focus)?,
    ))
}

pub(crate) fn selection_from_positions(
    doc: &Document,
    (anchor, focus): (TextPosition, TextPosition),
) -> Option<Selection> {
    Some(Selection {
        anchor: point_at(doc, anchor)?,
        focus: point_at(doc, focus)?,
    })
}
