use crate::document::{BlockKind, Document, Element, Node, Text};

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    /// Rewrites `doc` in place and reports whether anything changed.
    fn run(&self, doc: &mut Document) -> bool;
}

pub struct Normalizer {
    passes: Vec<Box<dyn NormalizePass>>,
    max_iterations: usize,
}

impl Normalizer {
    /// Passes that only repair invalid trees. They leave a valid document untouched,
    /// which is what keeps `restore(save(doc)) == doc`.
    pub fn structural(max_iterations: usize) -> Self {
        Self {
            passes: vec![
                Box::new(EnsureNonEmptyDocument),
                Box::new(NormalizeListStructure),
                Box::new(FlattenLeafBlocks),
                Box::new(EnsureTextBlocksHaveLeaf),
            ],
            max_iterations,
        }
    }

    /// Structural passes plus merging of runs with identical marks, used after edits.
    pub fn full(max_iterations: usize) -> Self {
        let mut normalizer = Self::structural(max_iterations);
        normalizer.passes.push(Box::new(MergeAdjacentTextLeaves));
        normalizer
    }

    pub fn passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.passes
    }

    /// Runs every pass until none reports a change. Returns `false` if the
    /// iteration budget ran out first.
    pub fn run(&self, doc: &mut Document) -> bool {
        for _ in 0..self.max_iterations.max(1) {
            let mut changed = false;
            for pass in &self.passes {
                if pass.run(doc) {
                    tracing::trace!(pass = pass.id(), "normalize pass rewrote document");
                    changed = true;
                }
            }
            if !changed {
                return true;
            }
        }
        tracing::warn!(
            max_iterations = self.max_iterations,
            "document normalization did not converge"
        );
        false
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &mut Document) -> bool {
        if doc.children.is_empty() {
            doc.children.push(Element::paragraph(""));
            return true;
        }
        false
    }
}

/// Lists hold only list items; list items hold runs first, then nested lists.
struct NormalizeListStructure;

impl NormalizePass for NormalizeListStructure {
    fn id(&self) -> &'static str {
        "list.normalize_structure"
    }

    fn run(&self, doc: &mut Document) -> bool {
        fn normalize_list(list: &mut Element) -> bool {
            let mut changed = false;
            let mut items: Vec<Node> = Vec::with_capacity(list.children.len());

            for node in std::mem::take(&mut list.children) {
                match node {
                    Node::Element(mut el) if el.kind == BlockKind::ListItem => {
                        changed |= normalize_element(&mut el);
                        items.push(Node::Element(el));
                    }
                    Node::Element(mut el) if el.is_list() => {
                        // A list directly inside a list nests under the item before it.
                        changed = true;
                        normalize_list(&mut el);
                        if el.children.is_empty() {
                            continue;
                        }
                        match items.last_mut() {
                            Some(Node::Element(prev)) => prev.children.push(Node::Element(el)),
                            _ => items.push(Node::Element(Element::new(
                                BlockKind::ListItem,
                                vec![Node::text(""), Node::Element(el)],
                            ))),
                        }
                    }
                    Node::Element(mut el) => {
                        changed = true;
                        el.kind = BlockKind::ListItem;
                        normalize_element(&mut el);
                        items.push(Node::Element(el));
                    }
                    Node::Text(text) => {
                        changed = true;
                        if !text.text.is_empty() {
                            items.push(Node::Element(Element::new(
                                BlockKind::ListItem,
                                vec![Node::Text(text)],
                            )));
                        }
                    }
                }
            }

            list.children = items;
            changed
        }

        fn normalize_item(item: &mut Element) -> bool {
            let mut changed = false;
            let mut texts: Vec<Node> = Vec::new();
            let mut lists: Vec<Node> = Vec::new();

            for node in std::mem::take(&mut item.children) {
                match node {
                    Node::Text(text) => {
                        if !lists.is_empty() {
                            changed = true;
                        }
                        texts.push(Node::Text(text));
                    }
                    Node::Element(mut el) if el.is_list() => {
                        changed |= normalize_list(&mut el);
                        if el.children.is_empty() {
                            changed = true;
                        } else {
                            lists.push(Node::Element(el));
                        }
                    }
                    Node::Element(el) => {
                        changed = true;
                        collect_texts(el, &mut texts);
                    }
                }
            }

            texts.extend(lists);
            item.children = texts;
            changed
        }

        fn normalize_element(el: &mut Element) -> bool {
            if el.is_list() {
                normalize_list(el)
            } else if el.kind == BlockKind::ListItem {
                normalize_item(el)
            } else {
                false
            }
        }

        let mut changed = false;
        let before = doc.children.len();
        for block in &mut doc.children {
            changed |= normalize_element(block);
        }
        doc.children.retain(|block| !(block.is_list() && block.children.is_empty()));
        changed || doc.children.len() != before
    }
}

/// Headings, paragraphs and quotes own runs only; nested elements are flattened into them.
struct FlattenLeafBlocks;

impl NormalizePass for FlattenLeafBlocks {
    fn id(&self) -> &'static str {
        "core.flatten_leaf_blocks"
    }

    fn run(&self, doc: &mut Document) -> bool {
        fn walk(el: &mut Element) -> bool {
            let is_leaf_block = !el.is_list() && el.kind != BlockKind::ListItem;
            if !is_leaf_block {
                let mut changed = false;
                for node in &mut el.children {
                    if let Node::Element(child) = node {
                        changed |= walk(child);
                    }
                }
                return changed;
            }

            if el.children.iter().all(|n| matches!(n, Node::Text(_))) {
                return false;
            }
            let mut texts = Vec::new();
            for node in std::mem::take(&mut el.children) {
                match node {
                    Node::Text(text) => texts.push(Node::Text(text)),
                    Node::Element(child) => collect_texts(child, &mut texts),
                }
            }
            el.children = texts;
            true
        }

        let mut changed = false;
        for block in &mut doc.children {
            changed |= walk(block);
        }
        changed
    }
}

/// Every text block owns at least one run, and only a sole run may be empty.
struct EnsureTextBlocksHaveLeaf;

impl NormalizePass for EnsureTextBlocksHaveLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_blocks_have_leaf"
    }

    fn run(&self, doc: &mut Document) -> bool {
        let mut changed = false;
        crate::document::for_each_text_block_mut(doc, |_, el| {
            let text_count = el.texts().count();
            if text_count == 0 {
                el.children.insert(0, Node::Text(Text::new("")));
                changed = true;
                return;
            }

            let non_empty = el.texts().filter(|t| !t.text.is_empty()).count();
            if non_empty == text_count {
                return;
            }
            if non_empty == 0 {
                if text_count > 1 {
                    // Keep the first empty run so a caret still has somewhere to live.
                    let mut kept = false;
                    el.children.retain(|node| match node {
                        Node::Text(_) if kept => false,
                        Node::Text(_) => {
                            kept = true;
                            true
                        }
                        Node::Element(_) => true,
                    });
                    changed = true;
                }
                return;
            }

            el.children
                .retain(|node| !matches!(node, Node::Text(t) if t.text.is_empty()));
            changed = true;
        });
        changed
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &mut Document) -> bool {
        let mut changed = false;
        crate::document::for_each_text_block_mut(doc, |_, el| {
            if el.children.len() < 2 {
                return;
            }
            let mut merged: Vec<Node> = Vec::with_capacity(el.children.len());
            for node in std::mem::take(&mut el.children) {
                if let (Some(Node::Text(left)), Node::Text(right)) = (merged.last_mut(), &node) {
                    if left.marks == right.marks {
                        left.text.push_str(&right.text);
                        changed = true;
                        continue;
                    }
                }
                merged.push(node);
            }
            el.children = merged;
        });
        changed
    }
}

fn collect_texts(el: Element, out: &mut Vec<Node>) {
    for node in el.children {
        match node {
            Node::Text(text) => out.push(Node::Text(text)),
            Node::Element(child) => collect_texts(child, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Marks;

    #[test]
    fn structural_passes_leave_valid_documents_alone() {
        let mut doc = Document::new(vec![
            Element::paragraph("a"),
            Element::list(
                BlockKind::BulletedList,
                vec![Element::new(
                    BlockKind::ListItem,
                    vec![
                        Node::text("b"),
                        Node::Element(Element::list(
                            BlockKind::NumberedList,
                            vec![Element::leaf(BlockKind::ListItem, "c")],
                        )),
                    ],
                )],
            ),
        ]);
        let before = doc.clone();
        assert!(Normalizer::structural(10).run(&mut doc));
        assert_eq!(doc, before);
    }

    #[test]
    fn list_children_become_items() {
        let mut doc = Document::new(vec![Element::new(
            BlockKind::BulletedList,
            vec![
                Node::Element(Element::paragraph("a")),
                Node::text("b"),
                Node::Element(Element::list(
                    BlockKind::NumberedList,
                    vec![Element::leaf(BlockKind::ListItem, "c")],
                )),
            ],
        )]);
        Normalizer::structural(10).run(&mut doc);

        let list = &doc.children[0];
        assert_eq!(list.children.len(), 2);
        let Node::Element(second) = &list.children[1] else {
            panic!("expected list item");
        };
        assert_eq!(second.kind, BlockKind::ListItem);
        assert_eq!(second.inline_text(), "b");
        assert!(matches!(&second.children[1], Node::Element(el) if el.kind == BlockKind::NumberedList));
    }

    #[test]
    fn empty_documents_gain_a_paragraph() {
        let mut doc = Document::new(Vec::new());
        Normalizer::structural(10).run(&mut doc);
        assert_eq!(doc, Document::empty());
    }

    #[test]
    fn leaf_blocks_flatten_nested_elements() {
        let mut doc = Document::new(vec![Element::new(
            BlockKind::BlockQuote,
            vec![
                Node::Element(Element::paragraph("x")),
                Node::Element(Element::paragraph("y")),
            ],
        )]);
        Normalizer::structural(10).run(&mut doc);
        assert_eq!(
            doc.children[0].children,
            vec![Node::text("x"), Node::text("y")]
        );
    }

    #[test]
    fn full_normalization_merges_equal_runs_and_drops_empty_ones() {
        let bold = Marks::new().with("bold");
        let mut doc = Document::new(vec![Element::new(
            BlockKind::Paragraph,
            vec![
                Node::Text(Text::with_marks("a", bold.clone())),
                Node::Text(Text::new("")),
                Node::Text(Text::with_marks("b", bold.clone())),
            ],
        )]);
        Normalizer::full(10).run(&mut doc);
        assert_eq!(
            doc.children[0].children,
            vec![Node::Text(Text::with_marks("ab", bold))]
        );
    }
}
