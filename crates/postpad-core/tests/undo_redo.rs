use postpad_core::{
    BOLD, BlockKind, Command, Document, Editor, Element, Point, Selection,
};
use pretty_assertions::assert_eq;

fn editor_with_text(text: &str) -> Editor {
    Editor::new(
        Document::new(vec![Element::paragraph(text)]),
        Some(Selection::caret(vec![0, 0], 0)),
    )
}

#[test]
fn undo_after_toggle_restores_document_and_selection() {
    let mut editor = editor_with_text("hello");
    let selection = Selection::new(Point::new(vec![0, 0], 1), Point::new(vec![0, 0], 4));
    editor.set_selection(Some(selection.clone()));
    let before = editor.doc().clone();

    assert!(editor.toggle_mark(BOLD));
    let after = editor.doc().clone();
    assert_ne!(after, before);

    assert!(editor.undo());
    assert_eq!(editor.doc(), &before);
    assert_eq!(editor.selection(), Some(&selection));

    assert!(editor.redo());
    assert_eq!(editor.doc(), &after);
    assert!(!editor.redo());
}

#[test]
fn commands_share_one_history() {
    let mut editor = editor_with_text("");

    assert!(editor.run(Command::InsertText("ab".into())));
    assert!(editor.run(Command::ToggleBlock(BlockKind::HeadingOne)));
    assert_eq!(
        editor.doc().children,
        vec![Element::leaf(BlockKind::HeadingOne, "ab")]
    );

    assert!(editor.run(Command::Undo));
    assert_eq!(editor.doc().children, vec![Element::paragraph("ab")]);
    assert!(editor.run(Command::Undo));
    assert_eq!(editor.doc().children, vec![Element::paragraph("")]);
    assert!(!editor.run(Command::Undo));

    assert!(editor.run(Command::Redo));
    assert_eq!(editor.doc().children, vec![Element::paragraph("ab")]);
    assert_eq!(editor.selection(), Some(&Selection::caret(vec![0, 0], 2)));
}

#[test]
fn new_edit_clears_redo() {
    let mut editor = editor_with_text("");
    editor.insert_text("a");
    editor.undo();
    assert!(editor.can_redo());

    editor.insert_text("b");
    assert!(!editor.can_redo());
    assert_eq!(editor.doc().plain_text(), "b");
}

#[test]
fn no_op_commands_are_not_recorded() {
    let mut editor = editor_with_text("x");
    editor.set_selection(Some(Selection::new(
        Point::new(vec![0, 0], 0),
        Point::new(vec![0, 0], 1),
    )));

    assert!(!editor.run(Command::InsertText("y".into())));
    assert!(!editor.run(Command::ToggleBlock(BlockKind::Paragraph)));
    assert!(!editor.can_undo());
}
