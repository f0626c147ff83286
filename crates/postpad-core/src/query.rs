use std::collections::BTreeSet;

use crate::document::{BlockKind, Document, Marks, Node};
use crate::selection::{Point, Selection, path_in_range};

/// True when any element overlapping the unhung selection, endpoint ancestors
/// included, has `kind`. A heading next to a paragraph still reports heading.
pub fn is_block_active(doc: &Document, selection: Option<&Selection>, kind: BlockKind) -> bool {
    active_block_kinds(doc, selection).contains(&kind)
}

pub fn active_block_kinds(doc: &Document, selection: Option<&Selection>) -> BTreeSet<BlockKind> {
    let Some(selection) = selection.and_then(|s| s.clamped(doc)) else {
        return BTreeSet::new();
    };
    let (start, end) = selection.unhung(doc);
    doc.elements()
        .into_iter()
        .filter(|(path, _)| path_in_range(path, &start, &end))
        .map(|(_, element)| element.kind)
        .collect()
}

pub fn is_mark_active(
    doc: &Document,
    selection: Option<&Selection>,
    pending: Option<&Marks>,
    mark: &str,
) -> bool {
    effective_marks(doc, selection, pending).is_active(mark)
}

/// The marks a toolbar should show as on.
///
/// At a caret this is the pending override if one is set, otherwise the marks
/// of the character before the caret. Over a range it is the set of marks
/// shared by every run that contributes characters to the range.
pub fn effective_marks(
    doc: &Document,
    selection: Option<&Selection>,
    pending: Option<&Marks>,
) -> Marks {
    let Some(selection) = selection.and_then(|s| s.clamped(doc)) else {
        return Marks::default();
    };

    if selection.is_collapsed() {
        if let Some(pending) = pending {
            return pending.clone();
        }
        return marks_before(doc, &selection.focus);
    }

    let (start, end) = selection.unhung(doc);
    let mut shared: Option<Marks> = None;
    for (path, text) in doc.leaves() {
        if path < start.path || path > end.path {
            continue;
        }
        let from = if path == start.path { start.offset } else { 0 };
        let to = if path == end.path {
            end.offset
        } else {
            text.char_len()
        };
        if from >= to {
            continue;
        }
        shared = Some(match shared {
            Some(acc) => acc.intersection(&text.marks),
            None => text.marks.clone(),
        });
    }

    shared.unwrap_or_else(|| {
        doc.text_at(&start.path)
            .map(|t| t.marks.clone())
            .unwrap_or_default()
    })
}

/// Marks of the character immediately before `point`. At the start of a run
/// that means the previous run in the same block, if there is one.
fn marks_before(doc: &Document, point: &Point) -> Marks {
    let Some(text) = doc.text_at(&point.path) else {
        return Marks::default();
    };
    if point.offset > 0 {
        return text.marks.clone();
    }

    let Some((&child_ix, block_path)) = point.path.split_last() else {
        return text.marks.clone();
    };
    let previous = child_ix.checked_sub(1).and_then(|ix| {
        doc.element_at(block_path)
            .and_then(|block| block.children.get(ix))
    });
    match previous {
        Some(Node::Text(prev)) => prev.marks.clone(),
        _ => text.marks.clone(),
    }
}
