use std::fmt::Write as _;

use crate::core::DEFAULT_MAX_NORMALIZE_ITERATIONS;
use crate::document::{
    Align, BOLD, BlockKind, Document, Element, ITALIC, Marks, Node, Text, UNDERLINE,
};
use crate::error::HtmlError;
use crate::normalize::Normalizer;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "div",
    "dl",
    "fieldset",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "ul",
];

/// Marks in the order their tags nest on output, outermost first.
const MARK_TAGS: [(&str, &str); 3] = [(UNDERLINE, "u"), (ITALIC, "em"), (BOLD, "strong")];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
        offset: usize,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DomNode {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<DomNode>,
    },
    Text(String),
}

/// Parses an HTML fragment into a document, or reports why the markup is malformed.
pub fn try_load(html: &str) -> Result<Document, HtmlError> {
    let tokens = tokenize(html)?;
    let dom = build_tree(tokens)?;

    let mut blocks = Vec::new();
    collect_blocks(&dom, &mut blocks);
    let mut doc = Document::new(blocks);
    Normalizer::full(DEFAULT_MAX_NORMALIZE_ITERATIONS).run(&mut doc);
    Ok(doc)
}

/// Like [`try_load`], but malformed markup becomes one paragraph of its text
/// content with the tags stripped.
pub fn load(html: &str) -> Document {
    match try_load(html) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::debug!(%err, "falling back to plain text for malformed html");
            let mut doc = Document::new(vec![Element::paragraph(strip_tags(html))]);
            Normalizer::structural(DEFAULT_MAX_NORMALIZE_ITERATIONS).run(&mut doc);
            doc
        }
    }
}

pub fn to_html(doc: &Document) -> String {
    let mut out = String::new();
    for block in &doc.children {
        write_element(block, &mut out);
    }
    out
}

fn tag_for(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::Paragraph => "p",
        BlockKind::HeadingOne => "h1",
        BlockKind::HeadingTwo => "h2",
        BlockKind::HeadingThree => "h3",
        BlockKind::BlockQuote => "blockquote",
        BlockKind::BulletedList => "ul",
        BlockKind::NumberedList => "ol",
        BlockKind::ListItem => "li",
    }
}

fn kind_for(tag: &str) -> Option<BlockKind> {
    Some(match tag {
        "p" => BlockKind::Paragraph,
        "h1" => BlockKind::HeadingOne,
        "h2" => BlockKind::HeadingTwo,
        "h3" => BlockKind::HeadingThree,
        "blockquote" => BlockKind::BlockQuote,
        "ul" => BlockKind::BulletedList,
        "ol" => BlockKind::NumberedList,
        "li" => BlockKind::ListItem,
        _ => return None,
    })
}

fn mark_for(tag: &str) -> Option<&'static str> {
    match tag {
        "strong" | "b" => Some(BOLD),
        "em" | "i" => Some(ITALIC),
        "u" => Some(UNDERLINE),
        _ => None,
    }
}

fn write_element(el: &Element, out: &mut String) {
    let tag = tag_for(el.kind);
    out.push('<');
    out.push_str(tag);
    if let Some(align) = el.align {
        let _ = write!(out, " style=\"text-align:{}\"", align.as_str());
    }
    out.push('>');
    for child in &el.children {
        match child {
            Node::Element(child) => write_element(child, out),
            Node::Text(text) => write_text(text, out),
        }
    }
    let _ = write!(out, "</{tag}>");
}

fn write_text(text: &Text, out: &mut String) {
    let tags: Vec<&str> = MARK_TAGS
        .iter()
        .filter(|(mark, _)| text.marks.is_active(mark))
        .map(|(_, tag)| *tag)
        .collect();

    for tag in &tags {
        let _ = write!(out, "<{tag}>");
    }
    for (ix, line) in text.text.split('\n').enumerate() {
        if ix > 0 {
            out.push_str("<br>");
        }
        escape_into(line, out);
    }
    for tag in tags.iter().rev() {
        let _ = write!(out, "</{tag}>");
    }
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, HtmlError> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let bytes = input.as_bytes();
    let mut pos = 0usize;

    while pos < input.len() {
        let rest = &input[pos..];
        let next = bytes.get(pos + 1).copied();

        if rest.starts_with("<!--") {
            let close = rest[4..]
                .find("-->")
                .ok_or(HtmlError::UnterminatedComment { offset: pos })?;
            pos += 4 + close + 3;
            continue;
        }
        if bytes[pos] == b'<' && matches!(next, Some(b'!' | b'?')) {
            let close = rest
                .find('>')
                .ok_or(HtmlError::UnterminatedTag { offset: pos })?;
            pos += close + 1;
            continue;
        }
        let end_tag = next == Some(b'/');
        if bytes[pos] == b'<' && (end_tag || next.is_some_and(|b| b.is_ascii_alphabetic())) {
            // An unclosed `<x` is prose such as `a<b`; an unclosed `</x` is broken markup.
            let close = match find_tag_end(rest) {
                Some(close) => close,
                None if end_tag => return Err(HtmlError::UnterminatedTag { offset: pos }),
                None => {
                    text.push('<');
                    pos += 1;
                    continue;
                }
            };
            flush_text(&mut text, &mut tokens);
            let inner = &rest[1..close];
            if let Some(name) = inner.strip_prefix('/') {
                tokens.push(Token::End {
                    name: name.trim().to_ascii_lowercase(),
                    offset: pos,
                });
            } else {
                tokens.push(parse_start_tag(inner));
            }
            pos += close + 1;
            continue;
        }

        let end = rest
            .char_indices()
            .skip(1)
            .find(|&(_, ch)| ch == '<')
            .map(|(ix, _)| ix)
            .unwrap_or(rest.len());
        text.push_str(&rest[..end]);
        pos += end;
    }

    flush_text(&mut text, &mut tokens);
    Ok(tokens)
}

fn flush_text(text: &mut String, tokens: &mut Vec<Token>) {
    if !text.is_empty() {
        tokens.push(Token::Text(decode_entities(text)));
        text.clear();
    }
}

/// Byte offset of the `>` closing the tag at the start of `rest`, skipping quoted attribute values.
fn find_tag_end(rest: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (ix, ch) in rest.char_indices().skip(1) {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '>') => return Some(ix),
            (None, '<') => return None,
            _ => {}
        }
    }
    None
}

fn parse_start_tag(inner: &str) -> Token {
    let trimmed = inner.trim_end();
    let self_closing = trimmed.ends_with('/');
    let body = trimmed.trim_end_matches('/');

    let name_end = body
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(body.len());
    let name = body[..name_end].to_ascii_lowercase();
    let attrs = parse_attributes(&body[name_end..]);

    Token::Start {
        name,
        attrs,
        self_closing,
    }
}

fn parse_attributes(mut rest: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let name_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let mut value = String::new();
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body.find(q).unwrap_or(body.len());
                    value = decode_entities(&body[..end]);
                    rest = body.get(end + 1..).unwrap_or("");
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_ascii_whitespace())
                        .unwrap_or(after_eq.len());
                    value = decode_entities(&after_eq[..end]);
                    rest = &after_eq[end..];
                }
            }
        }

        if !name.is_empty() {
            attrs.push((name, value));
        }
    }
    attrs
}

pub(crate) fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|ch| (ch, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }
    }
}

struct OpenElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<DomNode>,
}

/// Closing these is implied by a later tag, so an end tag further up may close them silently.
fn is_implicitly_closed(name: &str) -> bool {
    matches!(name, "p" | "li")
}

fn build_tree(tokens: Vec<Token>) -> Result<Vec<DomNode>, HtmlError> {
    fn close_top(stack: &mut Vec<OpenElement>, root: &mut Vec<DomNode>) {
        let Some(open) = stack.pop() else {
            return;
        };
        let node = DomNode::Element {
            name: open.name,
            attrs: open.attrs,
            children: open.children,
        };
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => root.push(node),
        }
    }

    fn append(stack: &mut [OpenElement], root: &mut Vec<DomNode>, node: DomNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => root.push(node),
        }
    }

    let mut root: Vec<DomNode> = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();

    for token in tokens {
        match token {
            Token::Text(text) => append(&mut stack, &mut root, DomNode::Text(text)),
            Token::Start {
                name,
                attrs,
                self_closing,
            } => {
                let top = stack.last().map(|open| open.name.as_str());
                let implied_close = match top {
                    Some("p") => BLOCK_ELEMENTS.contains(&name.as_str()),
                    Some("li") => name == "li",
                    _ => false,
                };
                if implied_close {
                    close_top(&mut stack, &mut root);
                }

                if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
                    let node = DomNode::Element {
                        name,
                        attrs,
                        children: Vec::new(),
                    };
                    append(&mut stack, &mut root, node);
                } else {
                    stack.push(OpenElement {
                        name,
                        attrs,
                        children: Vec::new(),
                    });
                }
            }
            Token::End { name, offset } => {
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    continue;
                }
                if !stack.iter().any(|open| open.name == name) {
                    return Err(HtmlError::UnexpectedEndTag { name, offset });
                }
                while let Some(top) = stack.last() {
                    if top.name == name {
                        close_top(&mut stack, &mut root);
                        break;
                    }
                    if !is_implicitly_closed(&top.name) {
                        return Err(HtmlError::MisnestedTag {
                            expected: top.name.clone(),
                            found: name,
                            offset,
                        });
                    }
                    close_top(&mut stack, &mut root);
                }
            }
        }
    }

    while !stack.is_empty() {
        close_top(&mut stack, &mut root);
    }
    Ok(root)
}

fn is_block(node: &DomNode) -> bool {
    matches!(node, DomNode::Element { name, .. } if BLOCK_ELEMENTS.contains(&name.as_str()))
}

fn contains_block(children: &[DomNode]) -> bool {
    children.iter().any(|child| {
        is_block(child)
            || matches!(child, DomNode::Element { children, .. } if contains_block(children))
    })
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn align_from(attrs: &[(String, String)]) -> Option<Align> {
    let from_style = attr(attrs, "style").and_then(|style| {
        style.split(';').find_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            (prop.trim().eq_ignore_ascii_case("text-align"))
                .then(|| Align::from_name(value))
                .flatten()
        })
    });
    from_style.or_else(|| attr(attrs, "align").and_then(Align::from_name))
}

/// Lowers a run of sibling nodes to blocks. Inline content between blocks is
/// gathered into paragraphs; whitespace-only gaps are dropped.
fn collect_blocks(nodes: &[DomNode], out: &mut Vec<Element>) {
    let mut inline: Vec<&DomNode> = Vec::new();

    for node in nodes {
        if is_block(node) {
            flush_inline(&mut inline, out);
            if let DomNode::Element {
                name,
                attrs,
                children,
            } = node
            {
                lower_block(name, attrs, children, out);
            }
        } else {
            inline.push(node);
        }
    }
    flush_inline(&mut inline, out);
}

fn flush_inline(inline: &mut Vec<&DomNode>, out: &mut Vec<Element>) {
    let mut runs = Vec::new();
    for node in inline.drain(..) {
        inline_runs(node, &Marks::new(), &mut runs);
    }
    trim_runs(&mut runs);
    if runs.iter().any(|run| !run.text.is_empty()) {
        out.push(Element::new(
            BlockKind::Paragraph,
            runs.into_iter().map(Node::Text).collect(),
        ));
    }
}

fn lower_block(
    name: &str,
    attrs: &[(String, String)],
    children: &[DomNode],
    out: &mut Vec<Element>,
) {
    let align = align_from(attrs);
    match kind_for(name) {
        Some(kind) if kind.is_list() => {
            let mut list = Element::list(kind, list_items(children));
            list.align = align;
            out.push(list);
        }
        Some(BlockKind::ListItem) => {
            // A stray item outside any list gets a bulleted container.
            out.push(Element::list(
                BlockKind::BulletedList,
                vec![list_item(attrs, children)],
            ));
        }
        Some(kind) => out.push(text_block(kind, align, children)),
        None if contains_block(children) => collect_blocks(children, out),
        None => out.push(text_block(BlockKind::Paragraph, align, children)),
    }
}

fn text_block(kind: BlockKind, align: Option<Align>, children: &[DomNode]) -> Element {
    let mut runs = Vec::new();
    for child in children {
        inline_runs(child, &Marks::new(), &mut runs);
    }
    trim_runs(&mut runs);
    Element {
        kind,
        align,
        children: runs.into_iter().map(Node::Text).collect(),
    }
}

fn list_items(children: &[DomNode]) -> Vec<Element> {
    let mut items = Vec::new();
    for child in children {
        match child {
            DomNode::Element {
                name,
                attrs,
                children,
            } if name == "li" => items.push(list_item(attrs, children)),
            DomNode::Text(text) if text.trim().is_empty() => {}
            other => {
                let mut runs = Vec::new();
                inline_runs(other, &Marks::new(), &mut runs);
                trim_runs(&mut runs);
                if runs.iter().any(|run| !run.text.is_empty()) {
                    items.push(Element::new(
                        BlockKind::ListItem,
                        runs.into_iter().map(Node::Text).collect(),
                    ));
                }
            }
        }
    }
    items
}

fn list_item(attrs: &[(String, String)], children: &[DomNode]) -> Element {
    let mut runs = Vec::new();
    let mut nested = Vec::new();
    for child in children {
        match child {
            DomNode::Element {
                name,
                attrs,
                children,
            } if name == "ul" || name == "ol" => {
                let kind = kind_for(name).unwrap_or(BlockKind::BulletedList);
                let mut list = Element::list(kind, list_items(children));
                list.align = align_from(attrs);
                nested.push(Node::Element(list));
            }
            other => inline_runs(other, &Marks::new(), &mut runs),
        }
    }
    trim_runs(&mut runs);

    let mut item_children: Vec<Node> = runs.into_iter().map(Node::Text).collect();
    item_children.extend(nested);
    Element {
        kind: BlockKind::ListItem,
        align: align_from(attrs),
        children: item_children,
    }
}

fn inline_runs(node: &DomNode, marks: &Marks, out: &mut Vec<Text>) {
    match node {
        DomNode::Text(text) => {
            let collapsed = collapse_whitespace(text, ends_with_space(out));
            if !collapsed.is_empty() {
                out.push(Text::with_marks(collapsed, marks.clone()));
            }
        }
        DomNode::Element { name, children, .. } => {
            if name == "br" {
                trim_trailing_space(out);
                out.push(Text::with_marks("\n", marks.clone()));
                return;
            }
            if is_block(node) && out.iter().any(|run| !run.text.is_empty()) {
                trim_trailing_space(out);
                out.push(Text::with_marks("\n", marks.clone()));
            }
            let mut marks = marks.clone();
            if let Some(mark) = mark_for(name) {
                marks.set(mark, true);
            }
            for child in children {
                inline_runs(child, &marks, out);
            }
        }
    }
}

fn ends_with_space(runs: &[Text]) -> bool {
    runs.last()
        .is_none_or(|run| run.text.ends_with(' ') || run.text.ends_with('\n'))
}

/// Folds HTML whitespace into single spaces, skipping a leading one when the
/// preceding run already ends in whitespace.
fn collapse_whitespace(text: &str, after_space: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !(out.is_empty() && after_space) {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    if pending_space && !(out.is_empty() && after_space) {
        out.push(' ');
    }
    out
}

fn trim_trailing_space(runs: &mut Vec<Text>) {
    while let Some(last) = runs.last_mut() {
        let trimmed = last.text.trim_end_matches(' ').len();
        last.text.truncate(trimmed);
        if last.text.is_empty() {
            runs.pop();
        } else {
            break;
        }
    }
}

fn trim_runs(runs: &mut Vec<Text>) {
    trim_trailing_space(runs);
    while let Some(first) = runs.first_mut() {
        let trimmed = first.text.trim_start_matches(' ').to_string();
        first.text = trimmed;
        if first.text.is_empty() {
            runs.remove(0);
        } else {
            break;
        }
    }
}

/// Text content of possibly malformed markup: anything shaped like a tag is dropped.
pub(crate) fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        let opens_tag = ch == '<'
            && chars
                .peek()
                .is_some_and(|&(_, next)| next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?'));
        if !opens_tag {
            out.push(ch);
            continue;
        }
        for (_, inner) in chars.by_ref() {
            if inner == '>' {
                break;
            }
        }
    }
    decode_entities(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_skips_comments_and_doctype() {
        let tokens = tokenize("<!DOCTYPE html><!-- hi --><p class=\"a > b\">x</p>").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Start {
                    name: "p".into(),
                    attrs: vec![("class".into(), "a > b".into())],
                    self_closing: false,
                },
                Token::Text("x".into()),
                Token::End {
                    name: "p".into(),
                    offset: 44,
                },
            ]
        );
    }

    #[test]
    fn tokenizer_keeps_a_bare_less_than_as_text() {
        let tokens = tokenize("1 < 2").unwrap();
        assert_eq!(tokens, vec![Token::Text("1 < 2".into())]);
    }

    #[test]
    fn tokenizer_keeps_unclosed_start_tags_as_text() {
        let tokens = tokenize("<p>x<y and a<b</p>").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Start {
                    name: "p".into(),
                    attrs: vec![],
                    self_closing: false,
                },
                Token::Text("x<y and a<b".into()),
                Token::End {
                    name: "p".into(),
                    offset: 14,
                },
            ]
        );
    }

    #[test]
    fn tokenizer_rejects_unterminated_tags() {
        assert_eq!(
            tokenize("<p>ok</p></strong"),
            Err(HtmlError::UnterminatedTag { offset: 9 })
        );
        assert_eq!(
            tokenize("a<!-- never"),
            Err(HtmlError::UnterminatedComment { offset: 1 })
        );
    }

    #[test]
    fn entities_decode_named_and_numeric_references() {
        assert_eq!(
            decode_entities("&lt;b&gt; &amp; &#39;q&#x27; &copy;"),
            "<b> & 'q' &copy;"
        );
    }

    #[test]
    fn tree_builder_closes_implied_items() {
        let tokens = tokenize("<ul><li>a<li>b</ul>").unwrap();
        let dom = build_tree(tokens).unwrap();
        let [DomNode::Element { children, .. }] = dom.as_slice() else {
            panic!("expected one list");
        };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn tree_builder_reports_misnesting() {
        let tokens = tokenize("<strong><em>x</strong></em>").unwrap();
        assert!(matches!(
            build_tree(tokens),
            Err(HtmlError::MisnestedTag { .. })
        ));
    }

    #[test]
    fn whitespace_collapses_inside_blocks() {
        assert_eq!(collapse_whitespace("  a \n  b ", false), " a b ");
        assert_eq!(collapse_whitespace("  a", true), "a");
    }

    #[test]
    fn strip_tags_keeps_text_and_literal_angles() {
        assert_eq!(strip_tags("<p>a < b</div> &amp; c"), "a < b & c");
    }

    #[test]
    fn align_reads_style_before_attribute() {
        let attrs = vec![
            ("align".to_string(), "right".to_string()),
            ("style".to_string(), "color: red; text-align: Center".to_string()),
        ];
        assert_eq!(align_from(&attrs), Some(Align::Center));
    }
}
