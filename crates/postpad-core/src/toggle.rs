use crate::core::DEFAULT_MAX_NORMALIZE_ITERATIONS;
use crate::document::{
    BlockKind, Document, Element, Marks, Node, Path, Text, byte_index, for_each_text_block_mut,
};
use crate::normalize::Normalizer;
use crate::query::{effective_marks, is_block_active};
use crate::selection::{
    Point, Selection, TextPosition, point_at, selection_from_positions, selection_positions,
    text_position,
};

/// The session state produced by a toggle or edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub doc: Document,
    pub selection: Option<Selection>,
    /// Marks for the next typed character, set by toggling at a caret.
    pub pending_marks: Option<Marks>,
}

pub fn toggle_mark(
    doc: &Document,
    selection: Option<&Selection>,
    pending: Option<&Marks>,
    mark: &str,
) -> Option<Change> {
    toggle_mark_with(
        &Normalizer::full(DEFAULT_MAX_NORMALIZE_ITERATIONS),
        doc,
        selection,
        pending,
        mark,
    )
}

pub fn toggle_block(
    doc: &Document,
    selection: Option<&Selection>,
    kind: BlockKind,
) -> Option<Change> {
    toggle_block_with(
        &Normalizer::full(DEFAULT_MAX_NORMALIZE_ITERATIONS),
        doc,
        selection,
        kind,
    )
}

/// Types `text` at a collapsed selection, formatted with the pending marks if
/// any and otherwise with the marks of the character before the caret.
pub fn insert_text(
    doc: &Document,
    selection: Option<&Selection>,
    pending: Option<&Marks>,
    text: &str,
) -> Option<Change> {
    insert_text_with(
        &Normalizer::full(DEFAULT_MAX_NORMALIZE_ITERATIONS),
        doc,
        selection,
        pending,
        text,
    )
}

pub(crate) fn toggle_mark_with(
    normalizer: &Normalizer,
    doc: &Document,
    selection: Option<&Selection>,
    pending: Option<&Marks>,
    mark: &str,
) -> Option<Change> {
    let selection = selection?.clamped(doc)?;
    let marks = effective_marks(doc, Some(&selection), pending);
    let active = marks.is_active(mark);

    if selection.is_collapsed() {
        let mut next_marks = marks;
        next_marks.set(mark, !active);
        tracing::debug!(mark, active = !active, "toggled pending mark at caret");
        return Some(Change {
            doc: doc.clone(),
            selection: Some(selection),
            pending_marks: Some(next_marks),
        });
    }

    let positions = selection_positions(doc, &selection)?;
    let (start, end) = if positions.0 <= positions.1 {
        positions
    } else {
        (positions.1, positions.0)
    };

    let mut next = doc.clone();
    for_each_text_block_mut(&mut next, |ordinal, el| {
        if ordinal < start.block || ordinal > end.block {
            return;
        }
        let from = if ordinal == start.block {
            start.offset
        } else {
            0
        };
        let to = if ordinal == end.block {
            end.offset
        } else {
            el.inline_len()
        };
        if from < to {
            el.children = split_and_mark(&el.children, from, to, mark, !active);
        }
    });
    normalizer.run(&mut next);

    tracing::debug!(mark, active = !active, ?start, ?end, "toggled mark over range");
    let selection = selection_from_positions(&next, positions);
    Some(Change {
        doc: next,
        selection,
        pending_marks: None,
    })
}

/// Rewrites the runs of one block so that characters `from..to` get `mark`
/// switched to `on`. Runs straddling either boundary are split; the pieces
/// outside the range keep their original marks.
fn split_and_mark(children: &[Node], from: usize, to: usize, mark: &str, on: bool) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(children.len() + 2);
    let mut cursor = 0usize;

    for node in children {
        let Node::Text(run) = node else {
            out.push(node.clone());
            continue;
        };
        let run_start = cursor;
        let run_end = cursor + run.char_len();
        cursor = run_end;

        if to <= run_start || from >= run_end {
            out.push(node.clone());
            continue;
        }

        let sel_start = byte_index(&run.text, from.saturating_sub(run_start));
        let sel_end = byte_index(&run.text, to - run_start);
        let mut marked = run.marks.clone();
        marked.set(mark, on);

        let before = &run.text[..sel_start];
        let middle = &run.text[sel_start..sel_end];
        let after = &run.text[sel_end..];

        if !before.is_empty() {
            out.push(Node::Text(Text::with_marks(before, run.marks.clone())));
        }
        out.push(Node::Text(Text::with_marks(middle, marked)));
        if !after.is_empty() {
            out.push(Node::Text(Text::with_marks(after, run.marks.clone())));
        }
    }

    out
}

/// One text block lifted out of whatever lists held it.
#[derive(Debug)]
struct Entry {
    /// The block with only its own runs; nested lists become separate entries.
    element: Element,
    /// Kinds of the enclosing lists, outermost first. Empty outside lists.
    lists: Vec<BlockKind>,
    covered: bool,
}

pub(crate) fn toggle_block_with(
    normalizer: &Normalizer,
    doc: &Document,
    selection: Option<&Selection>,
    kind: BlockKind,
) -> Option<Change> {
    let selection = selection?.clamped(doc)?;
    let is_active = is_block_active(doc, Some(&selection), kind);
    let is_list = kind.is_list();
    let positions = selection_positions(doc, &selection)?;

    let (start, end) = selection.unhung(doc);
    let first = *start.path.first()?;
    let last = *end.path.first()?;

    let mut entries: Vec<Entry> = Vec::new();
    for ix in first..=last {
        let block = doc.children.get(ix)?;
        flatten(block, &mut vec![ix], &mut Vec::new(), &start, &end, &mut entries);
    }

    // Everything between the first and last covered entry lies inside the
    // range, so uncovered entries can only sit at the two ends.
    let first_covered = entries.iter().position(|e| e.covered)?;
    let last_covered = entries.iter().rposition(|e| e.covered)?;
    let suffix = entries.split_off(last_covered + 1);
    let covered = entries.split_off(first_covered);
    let prefix = entries;

    let target = if is_active {
        BlockKind::Paragraph
    } else if is_list {
        BlockKind::ListItem
    } else {
        kind
    };
    let retyped: Vec<Element> = covered
        .into_iter()
        .map(|entry| Element {
            kind: target,
            ..entry.element
        })
        .collect();

    let mut replacement = rebuild_lists(prefix);
    if !is_active && is_list {
        replacement.push(Element::list(kind, retyped));
    } else {
        replacement.extend(retyped);
    }
    replacement.extend(rebuild_lists(suffix));

    let mut next = doc.clone();
    next.children.splice(first..=last, replacement);
    normalizer.run(&mut next);

    tracing::debug!(%kind, is_active, is_list, first, last, "toggled block");
    let selection = selection_from_positions(&next, positions);
    Some(Change {
        doc: next,
        selection,
        pending_marks: None,
    })
}

fn flatten(
    element: &Element,
    path: &mut Path,
    lists: &mut Vec<BlockKind>,
    start: &Point,
    end: &Point,
    out: &mut Vec<Entry>,
) {
    if element.is_list() {
        lists.push(element.kind);
        for (ix, node) in element.children.iter().enumerate() {
            if let Node::Element(child) = node {
                path.push(ix);
                flatten(child, path, lists, start, end, out);
                path.pop();
            }
        }
        lists.pop();
        return;
    }

    let mut inline: Vec<Node> = Vec::new();
    let mut covered = false;
    for (ix, node) in element.children.iter().enumerate() {
        if let Node::Text(_) = node {
            path.push(ix);
            covered |= *path >= start.path && *path <= end.path;
            path.pop();
            inline.push(node.clone());
        }
    }
    out.push(Entry {
        element: Element {
            kind: element.kind,
            align: element.align,
            children: inline,
        },
        lists: lists.clone(),
        covered,
    });

    for (ix, node) in element.children.iter().enumerate() {
        if let Node::Element(child) = node {
            path.push(ix);
            flatten(child, path, lists, start, end, out);
            path.pop();
        }
    }
}

/// Reassembles list entries into nested containers. Blocks outside lists pass
/// through; an entry may only nest one level deeper than the list before it.
/// Once a run is lifted, later entries are lifted by the same amount so
/// siblings stay siblings.
fn rebuild_lists(entries: Vec<Entry>) -> Vec<Element> {
    let mut out: Vec<Element> = Vec::new();
    let mut open: Vec<Element> = Vec::new();
    let mut shift = 0;

    for entry in entries {
        if entry.lists.is_empty() {
            close_lists(&mut open, 0, &mut out);
            shift = 0;
            out.push(entry.element);
            continue;
        }
        if open.is_empty() || entry.lists.len() <= shift {
            close_lists(&mut open, 0, &mut out);
            shift = 0;
        }

        let depth = (entry.lists.len() - shift).min(open.len() + 1);
        shift = entry.lists.len() - depth;
        let kinds: Vec<BlockKind> = entry.lists[shift..].to_vec();

        close_lists(&mut open, depth, &mut out);
        if open.len() == depth && open[depth - 1].kind != kinds[depth - 1] {
            close_lists(&mut open, depth - 1, &mut out);
        }
        while open.len() < depth {
            open.push(Element::new(kinds[open.len()], Vec::new()));
        }
        if let Some(list) = open.last_mut() {
            list.children.push(Node::Element(entry.element));
        }
    }

    close_lists(&mut open, 0, &mut out);
    out
}

fn close_lists(open: &mut Vec<Element>, keep: usize, out: &mut Vec<Element>) {
    while open.len() > keep {
        let Some(list) = open.pop() else {
            break;
        };
        match open.last_mut().and_then(|parent| parent.children.last_mut()) {
            Some(Node::Element(item)) => item.children.push(Node::Element(list)),
            _ => out.push(list),
        }
    }
}

pub(crate) fn insert_text_with(
    normalizer: &Normalizer,
    doc: &Document,
    selection: Option<&Selection>,
    pending: Option<&Marks>,
    text: &str,
) -> Option<Change> {
    let selection = selection?.clamped(doc)?;
    if !selection.is_collapsed() || text.is_empty() {
        return None;
    }
    let marks = effective_marks(doc, Some(&selection), pending);
    let caret = selection.focus;
    let position = text_position(doc, &caret)?;
    let (&child_ix, block_path) = caret.path.split_last()?;

    let mut next = doc.clone();
    let block = next.element_mut(block_path)?;
    let Some(Node::Text(run)) = block.children.get_mut(child_ix) else {
        return None;
    };
    let at = byte_index(&run.text, caret.offset);

    if marks == run.marks {
        run.text.insert_str(at, text);
    } else {
        let (before, after) = run.text.split_at(at);
        let mut pieces: Vec<Node> = Vec::with_capacity(3);
        if !before.is_empty() {
            pieces.push(Node::Text(Text::with_marks(before, run.marks.clone())));
        }
        pieces.push(Node::Text(Text::with_marks(text, marks)));
        if !after.is_empty() {
            pieces.push(Node::Text(Text::with_marks(after, run.marks.clone())));
        }
        block.children.splice(child_ix..=child_ix, pieces);
    }
    normalizer.run(&mut next);

    let caret = point_at(
        &next,
        TextPosition {
            block: position.block,
            offset: position.offset + text.chars().count(),
        },
    )?;
    Some(Change {
        doc: next,
        selection: Some(Selection::collapsed(caret)),
        pending_marks: None,
    })
}
