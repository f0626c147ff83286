use postpad_core::{
    BOLD, BlockKind, Document, Element, ITALIC, Marks, Node, Selection, Text, TextPosition,
    UNDERLINE, is_mark_active, point_at, restore, save, toggle_block, toggle_mark,
};
use proptest::prelude::*;
use proptest::sample::Index;
use proptest::test_runner::TestCaseError;

const MARKS: [&str; 3] = [BOLD, ITALIC, UNDERLINE];

fn arb_marks() -> impl Strategy<Value = Marks> {
    prop::collection::vec(any::<bool>(), 3).prop_map(|flags| {
        MARKS
            .iter()
            .zip(flags)
            .filter(|(_, on)| *on)
            .map(|(mark, _)| *mark)
            .collect()
    })
}

fn arb_runs() -> impl Strategy<Value = Vec<Node>> {
    prop::collection::vec(("[a-zé ]{1,6}", arb_marks()), 1..4).prop_map(|runs| {
        runs.into_iter()
            .map(|(text, marks)| Node::Text(Text::with_marks(text, marks)))
            .collect()
    })
}

/// A list whose items sometimes carry a nested list, up to `depth` levels down.
fn arb_list(depth: u32) -> BoxedStrategy<Element> {
    let list_kind = prop::sample::select(vec![BlockKind::BulletedList, BlockKind::NumberedList]);
    let nested = if depth == 0 {
        Just(None).boxed()
    } else {
        prop::option::weighted(0.3, arb_list(depth - 1)).boxed()
    };

    (list_kind, prop::collection::vec((arb_runs(), nested), 1..4))
        .prop_map(|(kind, items)| {
            Element::list(
                kind,
                items
                    .into_iter()
                    .map(|(mut children, nested)| {
                        if let Some(list) = nested {
                            children.push(Node::Element(list));
                        }
                        Element::new(BlockKind::ListItem, children)
                    })
                    .collect(),
            )
        })
        .boxed()
}

fn arb_block() -> impl Strategy<Value = Element> {
    let text_kind = prop::sample::select(vec![
        BlockKind::Paragraph,
        BlockKind::HeadingOne,
        BlockKind::HeadingTwo,
        BlockKind::HeadingThree,
        BlockKind::BlockQuote,
    ]);

    prop_oneof![
        3 => (text_kind, arb_runs()).prop_map(|(kind, runs)| Element::new(kind, runs)),
        1 => arb_list(2),
    ]
}

fn arb_document() -> impl Strategy<Value = Document> {
    prop::collection::vec(arb_block(), 1..5).prop_map(Document::new)
}

fn position(doc: &Document, block: Index, offset: Index) -> TextPosition {
    let blocks = doc.text_blocks();
    let block = block.index(blocks.len());
    let len = blocks[block].element.inline_len();
    TextPosition {
        block,
        offset: offset.index(len + 1),
    }
}

fn selection_at(doc: &Document, anchor: TextPosition, focus: TextPosition) -> Selection {
    Selection::new(
        point_at(doc, anchor).expect("anchor"),
        point_at(doc, focus).expect("focus"),
    )
}

/// Per text block, whether each character carries `mark`.
fn char_marks(doc: &Document, mark: &str) -> Vec<Vec<bool>> {
    doc.text_blocks()
        .iter()
        .map(|block| {
            block
                .element
                .texts()
                .flat_map(|t| std::iter::repeat_n(t.marks.is_active(mark), t.char_len()))
                .collect()
        })
        .collect()
}

fn check_list(list: &Element) -> Result<(), TestCaseError> {
    prop_assert!(!list.children.is_empty());
    for child in &list.children {
        let Node::Element(item) = child else {
            return Err(TestCaseError::fail("text directly inside a list"));
        };
        prop_assert_eq!(item.kind, BlockKind::ListItem);
        prop_assert!(item.texts().count() >= 1);

        let mut seen_list = false;
        for node in &item.children {
            match node {
                Node::Text(_) => prop_assert!(!seen_list),
                Node::Element(nested) => {
                    prop_assert!(nested.is_list());
                    seen_list = true;
                    check_list(nested)?;
                }
            }
        }
    }
    Ok(())
}

/// Parent path of each text block, in document order.
fn parents(doc: &Document) -> Vec<Vec<usize>> {
    doc.text_blocks()
        .into_iter()
        .map(|block| block.path[..block.path.len() - 1].to_vec())
        .collect()
}

fn check_well_formed(doc: &Document) -> Result<(), TestCaseError> {
    prop_assert!(!doc.children.is_empty());
    for block in &doc.children {
        if block.is_list() {
            check_list(block)?;
        } else {
            prop_assert!(block.children.iter().all(|n| matches!(n, Node::Text(_))));
            prop_assert!(block.texts().count() >= 1);
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn save_restore_round_trips(doc in arb_document()) {
        let json = save(&doc).unwrap();
        prop_assert_eq!(restore(&json), doc);
    }

    #[test]
    fn toggle_mark_flips_exactly_the_selected_characters(
        doc in arb_document(),
        anchor in (any::<Index>(), any::<Index>()),
        focus in (any::<Index>(), any::<Index>()),
        mark in prop::sample::select(MARKS.to_vec()),
    ) {
        let anchor = position(&doc, anchor.0, anchor.1);
        let focus = position(&doc, focus.0, focus.1);
        let (start, end) = (anchor.min(focus), anchor.max(focus));
        let selected = |block: usize, c: usize| {
            TextPosition { block, offset: c } >= start && TextPosition { block, offset: c + 1 } <= end
        };

        let before = char_marks(&doc, mark);
        let selected_values: Vec<bool> = before
            .iter()
            .enumerate()
            .flat_map(|(b, chars)| chars.iter().enumerate().filter(move |(c, _)| selected(b, *c)).map(|(_, v)| *v))
            .collect();
        prop_assume!(!selected_values.is_empty());

        let selection = selection_at(&doc, anchor, focus);
        let active = is_mark_active(&doc, Some(&selection), None, mark);
        prop_assert_eq!(active, selected_values.iter().all(|v| *v));

        let once = toggle_mark(&doc, Some(&selection), None, mark).unwrap();
        prop_assert_eq!(once.doc.plain_text(), doc.plain_text());
        let after = char_marks(&once.doc, mark);
        for (b, chars) in before.iter().enumerate() {
            for (c, was) in chars.iter().enumerate() {
                let expected = if selected(b, c) { !active } else { *was };
                prop_assert_eq!(after[b][c], expected);
            }
        }

        let twice = toggle_mark(&once.doc, once.selection.as_ref(), None, mark).unwrap();
        prop_assert_eq!(is_mark_active(&twice.doc, twice.selection.as_ref(), None, mark), active);
        let uniform = selected_values.iter().all(|v| *v == selected_values[0]);
        if uniform {
            prop_assert_eq!(char_marks(&twice.doc, mark), before);
        }
    }

    #[test]
    fn block_toggles_keep_lists_well_formed(
        doc in arb_document(),
        steps in prop::collection::vec(
            (
                prop::sample::select(BlockKind::ALL.to_vec()),
                any::<Index>(),
                any::<Index>(),
                any::<Index>(),
                any::<Index>(),
            ),
            1..6,
        ),
    ) {
        let text = doc.plain_text();
        let mut doc = doc;
        for (kind, anchor_block, anchor_offset, focus_block, focus_offset) in steps {
            let anchor = position(&doc, anchor_block, anchor_offset);
            let focus = position(&doc, focus_block, focus_offset);
            let selection = selection_at(&doc, anchor, focus);
            if let Some(change) = toggle_block(&doc, Some(&selection), kind) {
                doc = change.doc;
            }
            check_well_formed(&doc)?;
            prop_assert_eq!(doc.plain_text(), text.clone());
        }
    }

    #[test]
    fn block_toggles_keep_untouched_siblings_together(
        doc in arb_document(),
        kind in prop::sample::select(BlockKind::ALL.to_vec()),
        anchor in (any::<Index>(), any::<Index>()),
        focus in (any::<Index>(), any::<Index>()),
    ) {
        let anchor = position(&doc, anchor.0, anchor.1);
        let focus = position(&doc, focus.0, focus.1);
        let (first, last) = (anchor.min(focus).block, anchor.max(focus).block);
        let selection = selection_at(&doc, anchor, focus);
        let Some(change) = toggle_block(&doc, Some(&selection), kind) else {
            return Ok(());
        };

        let before = parents(&doc);
        let after = parents(&change.doc);
        prop_assert_eq!(before.len(), after.len());
        let untouched = |ix: usize| ix < first || ix > last;
        for a in 0..before.len() {
            for b in a + 1..before.len() {
                let same_side = (a < first && b < first) || (a > last && b > last);
                if untouched(a) && untouched(b) && same_side && before[a] == before[b] {
                    prop_assert_eq!(
                        &after[a],
                        &after[b],
                        "blocks {} and {} were siblings before the toggle",
                        a,
                        b
                    );
                }
            }
        }
    }
}
