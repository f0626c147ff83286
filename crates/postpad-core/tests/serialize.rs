use postpad_core::{
    Align, BOLD, BlockKind, Document, Element, ITALIC, Marks, Node, Text, load_stored, restore,
    save,
};
use pretty_assertions::assert_eq;

fn sample() -> Document {
    Document::new(vec![
        Element::leaf(BlockKind::HeadingOne, "Release notes").with_align(Align::Center),
        Element::new(
            BlockKind::Paragraph,
            vec![
                Node::text("Now with "),
                Node::Text(Text::with_marks("bold", Marks::new().with(BOLD))),
                Node::text(" and "),
                Node::Text(Text::with_marks(
                    "custom",
                    Marks::new().with(ITALIC).with("highlight"),
                )),
                Node::text(" marks."),
            ],
        ),
        Element::list(
            BlockKind::NumberedList,
            vec![
                Element::new(
                    BlockKind::ListItem,
                    vec![
                        Node::text("first"),
                        Node::Element(Element::list(
                            BlockKind::BulletedList,
                            vec![Element::leaf(BlockKind::ListItem, "nested")],
                        )),
                    ],
                ),
                Element::leaf(BlockKind::ListItem, "second"),
            ],
        ),
        Element::leaf(BlockKind::BlockQuote, ""),
    ])
}

#[test]
fn save_then_restore_is_identity() {
    let doc = sample();
    let json = save(&doc).unwrap();
    assert_eq!(restore(&json), doc);
}

#[test]
fn restore_keeps_adjacent_runs_with_equal_marks() {
    let json = r#"[{"type":"paragraph","children":[{"text":"a"},{"text":"b"}]}]"#;
    let doc = restore(json);
    assert_eq!(doc.children[0].children.len(), 2);
    assert_eq!(save(&doc).unwrap(), json);
}

#[test]
fn invalid_json_becomes_a_paragraph() {
    assert_eq!(
        restore("not json"),
        Document::new(vec![Element::paragraph("not json")])
    );
}

#[test]
fn json_of_the_wrong_shape_is_kept_as_text() {
    assert_eq!(
        restore(r#"{"title":"x"}"#),
        Document::new(vec![Element::paragraph(r#"{"title":"x"}"#)])
    );
}

#[test]
fn empty_tree_restores_to_the_empty_document() {
    assert_eq!(restore("[]"), Document::empty());
    assert_eq!(
        save(&Document::empty()).unwrap(),
        r#"[{"type":"paragraph","children":[{"text":""}]}]"#
    );
}

#[test]
fn restore_repairs_broken_list_structure() {
    let doc = restore(r#"[{"type":"bulleted-list","children":[{"text":"loose"}]}]"#);
    assert_eq!(
        doc,
        Document::new(vec![Element::list(
            BlockKind::BulletedList,
            vec![Element::leaf(BlockKind::ListItem, "loose")],
        )])
    );
}

#[test]
fn stored_content_of_any_vintage_loads() {
    let json = save(&sample()).unwrap();
    assert_eq!(load_stored(&json), sample());

    let html = load_stored("<h2>Getting Started</h2><p>go</p>");
    assert_eq!(
        html,
        Document::new(vec![
            Element::leaf(BlockKind::HeadingTwo, "Getting Started"),
            Element::paragraph("go"),
        ])
    );

    assert_eq!(
        load_stored("just some words"),
        Document::new(vec![Element::paragraph("just some words")])
    );
}
