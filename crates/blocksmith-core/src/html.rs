//! HTML fragment lexing and a minimal node tree.
//!
//! Pasted markup is lexed with [Logos] into tags and text runs, then folded
//! into a forgiving tree: unknown end tags are ignored, unclosed elements are
//! closed at the end of input, void elements never take children. Text keeps
//! its original encoding so fragments re-serialize byte-for-byte where
//! possible; [`HtmlNode::text_content`] decodes entities.
//!
//! [Logos]: https://docs.rs/logos

use logos::Logos;

/// Elements that start a new block when pasted.
pub const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "canvas", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hgroup", "hr", "li", "main", "nav", "noscript", "ol", "output", "p", "pre", "ruby",
    "section", "table", "tbody", "thead", "tr", "tfoot", "ul", "video",
];

/// Elements that never have children.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Phrasing elements that keep a run of markup inline.
pub const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "acronym", "b", "basefont", "bdi", "bdo", "big", "br", "button", "cite", "code",
    "data", "dfn", "em", "font", "i", "img", "input", "kbd", "label", "mark", "q", "s", "samp",
    "select", "small", "span", "strike", "strong", "sub", "sup", "textarea", "time", "tt", "u",
    "var", "wbr",
];

pub fn is_inline_element(tag: &str) -> bool {
    INLINE_ELEMENTS.contains(&tag)
}

pub fn is_block_element(tag: &str) -> bool {
    BLOCK_ELEMENTS.contains(&tag)
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Token kinds produced by the Logos lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlToken {
    /// `<!-- ... -->`, `<!DOCTYPE ...>` and friends. Dropped.
    #[regex(r"<![^>]*>")]
    Declaration,

    /// `</name>`
    #[regex(r"</[A-Za-z][A-Za-z0-9-]*[ \t\r\n]*>")]
    EndTag,

    /// `<name attr="v">` or `<name/>`
    #[regex(r#"<[A-Za-z][A-Za-z0-9-]*([^>"']|"[^"]*"|'[^']*')*>"#)]
    StartTag,

    /// Run of character data.
    #[regex(r"[^<]+")]
    Text,

    /// A `<` that opens nothing; treated as text.
    #[token("<")]
    Lt,
}

/// An element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercase tag name.
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<HtmlNode>,
}

/// A node of a parsed fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlNode {
    Element(Element),
    /// Raw (still entity-encoded) character data.
    Text(String),
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    pub fn inner_html(&self) -> String {
        render(&self.children)
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }

    pub fn text_content(&self) -> String {
        self.children.iter().map(HtmlNode::text_content).collect()
    }

    /// Direct element children.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            HtmlNode::Element(e) => Some(e),
            HtmlNode::Text(_) => None,
        })
    }
}

impl HtmlNode {
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_node(self, &mut out);
        out
    }

    pub fn text_content(&self) -> String {
        match self {
            HtmlNode::Text(raw) => html_escape::decode_html_entities(raw).into_owned(),
            HtmlNode::Element(e) => e.text_content(),
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            HtmlNode::Element(e) => Some(e),
            HtmlNode::Text(_) => None,
        }
    }

    /// A lone void element such as `<br>` or `<img>`.
    pub fn is_single_tag(&self) -> bool {
        matches!(self, HtmlNode::Element(e) if is_void_element(&e.tag))
    }

    /// No visible text and no void elements anywhere in the subtree.
    pub fn is_empty(&self) -> bool {
        match self {
            HtmlNode::Text(raw) => html_escape::decode_html_entities(raw)
                .trim_matches(|c: char| c.is_whitespace() || c == '\u{200b}')
                .is_empty(),
            HtmlNode::Element(e) => {
                !is_void_element(&e.tag) && e.children.iter().all(HtmlNode::is_empty)
            }
        }
    }
}

/// Parse a fragment into top-level nodes.
pub fn parse_fragment(html: &str) -> Vec<HtmlNode> {
    let mut stack: Vec<Element> = Vec::new();
    let mut top: Vec<HtmlNode> = Vec::new();

    fn push(stack: &mut [Element], top: &mut Vec<HtmlNode>, node: HtmlNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => top.push(node),
        }
    }

    fn push_text(stack: &mut [Element], top: &mut Vec<HtmlNode>, text: &str) {
        let siblings = match stack.last_mut() {
            Some(parent) => &mut parent.children,
            None => top,
        };
        if let Some(HtmlNode::Text(prev)) = siblings.last_mut() {
            prev.push_str(text);
        } else {
            siblings.push(HtmlNode::Text(text.to_string()));
        }
    }

    let mut lexer = HtmlToken::lexer(html);
    while let Some(token) = lexer.next() {
        let slice = lexer.slice();
        match token {
            Ok(HtmlToken::Declaration) => {}
            Ok(HtmlToken::Text) | Ok(HtmlToken::Lt) | Err(()) => {
                push_text(&mut stack, &mut top, slice);
            }
            Ok(HtmlToken::StartTag) => {
                let (element, self_closing) = parse_start_tag(slice);
                if self_closing || is_void_element(&element.tag) {
                    push(&mut stack, &mut top, HtmlNode::Element(element));
                } else {
                    stack.push(element);
                }
            }
            Ok(HtmlToken::EndTag) => {
                let name = slice[2..slice.len() - 1].trim().to_ascii_lowercase();
                if stack.iter().any(|e| e.tag == name) {
                    while let Some(open) = stack.pop() {
                        let done = open.tag == name;
                        push(&mut stack, &mut top, HtmlNode::Element(open));
                        if done {
                            break;
                        }
                    }
                }
            }
        }
    }

    while let Some(open) = stack.pop() {
        push(&mut stack, &mut top, HtmlNode::Element(open));
    }
    top
}

/// Serialize nodes back to markup.
pub fn render(nodes: &[HtmlNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

/// Whether the string contains at least one element.
pub fn is_html_string(html: &str) -> bool {
    parse_fragment(html)
        .iter()
        .any(|n| matches!(n, HtmlNode::Element(_)))
}

/// Whether every element in the fragment is inline.
pub fn contains_only_inline_elements(html: &str) -> bool {
    fn inline(node: &HtmlNode) -> bool {
        match node {
            HtmlNode::Text(_) => true,
            HtmlNode::Element(e) => !is_block_element(&e.tag) && e.children.iter().all(inline),
        }
    }
    parse_fragment(html).iter().all(inline)
}

fn write_node(node: &HtmlNode, out: &mut String) {
    match node {
        HtmlNode::Text(raw) => out.push_str(raw),
        HtmlNode::Element(e) => write_element(e, out),
    }
}

fn write_element(e: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&e.tag);
    for (name, value) in &e.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(value));
        out.push('"');
    }
    out.push('>');
    if is_void_element(&e.tag) {
        return;
    }
    for child in &e.children {
        write_node(child, out);
    }
    out.push_str("</");
    out.push_str(&e.tag);
    out.push('>');
}

/// Split `<name a="1" b='2' c d=e/>` into an element and a self-closing flag.
fn parse_start_tag(slice: &str) -> (Element, bool) {
    let inner = &slice[1..slice.len() - 1];
    let (inner, self_closing) = match inner.strip_suffix('/') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };

    let name_end = inner
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(inner.len());
    let mut element = Element::new(&inner[..name_end]);

    let mut rest = inner[name_end..].trim_start();
    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();

        let mut value = String::new();
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (raw, remaining) = match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    match body.find(q) {
                        Some(end) => (&body[..end], &body[end + 1..]),
                        None => (body, ""),
                    }
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_ascii_whitespace())
                        .unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };
            value = html_escape::decode_html_entities(raw).into_owned();
            rest = remaining.trim_start();
        }

        if !key.is_empty() {
            element.attrs.push((key, value));
        } else {
            // Stray `=` or quote; skip one char to make progress.
            rest = rest.get(1..).unwrap_or("");
        }
    }

    (element, self_closing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_siblings() {
        let nodes = parse_fragment("<p>Hello</p><h2>World</h2>");
        assert_eq!(nodes.len(), 2);
        let p = nodes[0].as_element().unwrap();
        assert_eq!(p.tag, "p");
        assert_eq!(p.inner_html(), "Hello");
        assert_eq!(nodes[1].text_content(), "World");
    }

    #[test]
    fn test_attributes_and_classes() {
        let nodes = parse_fragment(r#"<DIV class="note warn" data-x='1' hidden>x</DIV>"#);
        let div = nodes[0].as_element().unwrap();
        assert_eq!(div.tag, "div");
        assert!(div.has_class("warn"));
        assert!(!div.has_class("note-warn"));
        assert_eq!(div.attr("data-x"), Some("1"));
        assert_eq!(div.attr("hidden"), Some(""));
    }

    #[test]
    fn test_void_and_self_closing() {
        let nodes = parse_fragment("a<br>b<img src=\"x.png\"/>c");
        assert_eq!(nodes.len(), 5);
        assert!(nodes[1].is_single_tag());
        assert_eq!(render(&nodes), "a<br>b<img src=\"x.png\">c");
    }

    #[test]
    fn test_unclosed_and_stray_tags() {
        let nodes = parse_fragment("<p>one <b>two</p></i> 1 < 2");
        assert_eq!(render(&nodes), "<p>one <b>two</b></p> 1 < 2");
    }

    #[test]
    fn test_entities_decoded_in_text_content() {
        let nodes = parse_fragment("Fish &amp; chips");
        assert_eq!(nodes[0].text_content(), "Fish & chips");
        assert_eq!(render(&nodes), "Fish &amp; chips");
    }

    #[test]
    fn test_emptiness() {
        assert!(parse_fragment("<p>  </p>")[0].is_empty());
        assert!(!parse_fragment("<p><br></p>")[0].is_empty());
        assert!(!parse_fragment("<p>x</p>")[0].is_empty());
    }

    #[test]
    fn test_html_string_detection() {
        assert!(is_html_string("<b>bold</b>"));
        assert!(!is_html_string("just text"));
        assert!(contains_only_inline_elements("a <b>b</b> <i>c</i>"));
        assert!(!contains_only_inline_elements("<p>a</p>"));
    }

    #[test]
    fn test_comments_dropped() {
        let nodes = parse_fragment("<!-- StartFragment --><p>x</p><!-- EndFragment -->");
        assert_eq!(render(&nodes), "<p>x</p>");
    }
}
