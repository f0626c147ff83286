use crate::core::DEFAULT_MAX_NORMALIZE_ITERATIONS;
use crate::document::{Document, Element};
use crate::error::Error;
use crate::normalize::Normalizer;

/// Compact JSON in the shape stored in a post's `content` column.
pub fn save(doc: &Document) -> Result<String, Error> {
    Ok(serde_json::to_string(doc)?)
}

pub fn save_pretty(doc: &Document) -> Result<String, Error> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Parses stored JSON. Content that is not a document tree becomes a single
/// paragraph holding the raw string.
pub fn restore(serialized: &str) -> Document {
    let mut doc = match serde_json::from_str::<Document>(serialized) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::debug!(%err, "stored content is not a document tree, keeping it as text");
            Document::new(vec![Element::paragraph(serialized)])
        }
    };
    Normalizer::structural(DEFAULT_MAX_NORMALIZE_ITERATIONS).run(&mut doc);
    doc
}

/// Opens stored content regardless of how it was written: a JSON tree, an HTML
/// fragment, or plain text.
pub fn load_stored(content: &str) -> Document {
    if let Ok(mut doc) = serde_json::from_str::<Document>(content) {
        Normalizer::structural(DEFAULT_MAX_NORMALIZE_ITERATIONS).run(&mut doc);
        return doc;
    }
    if looks_like_html(content) {
        tracing::debug!("stored content is html");
        return crate::html::load(content);
    }
    restore(content)
}

fn looks_like_html(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with('<') && trimmed.contains('>')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BlockKind, Marks, Node, Text};

    #[test]
    fn save_writes_slate_shaped_json() {
        let doc = Document::new(vec![Element::new(
            BlockKind::HeadingTwo,
            vec![Node::Text(Text::with_marks(
                "Hi",
                Marks::new().with("bold").with("italic"),
            ))],
        )]);
        assert_eq!(
            save(&doc).unwrap(),
            r#"[{"type":"heading-two","children":[{"text":"Hi","bold":true,"italic":true}]}]"#
        );
    }

    #[test]
    fn restore_drops_false_marks_and_unknown_types() {
        let doc = restore(
            r#"[{"type":"code-block","children":[{"text":"x","bold":false,"italic":true}]}]"#,
        );
        assert_eq!(
            doc,
            Document::new(vec![Element::new(
                BlockKind::Paragraph,
                vec![Node::Text(Text::with_marks("x", Marks::new().with("italic")))],
            )])
        );
    }

    #[test]
    fn html_sniffing_requires_a_tag() {
        assert!(looks_like_html("  <p>x</p>"));
        assert!(!looks_like_html("a < b"));
        assert!(!looks_like_html("<"));
    }
}
