//! Plain-text projection of the parse tree.

use crate::{
    title::WikiLink,
    tree::ParseNode,
};

/// An internal link located in the plain-text projection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FullWikiLink {
    /// The link target.
    pub link: WikiLink,
    /// The rendered anchor text.
    pub text: String,
    /// Rune offset of the first rune of the anchor text.
    pub start: usize,
    /// Rune offset one past the last rune of the anchor text.
    pub end: usize,
}

/// The results of a projection pass.
pub(crate) struct TextOutput {
    /// The full plain text.
    pub text: String,
    /// The text up to the first heading, or the full text when the document
    /// has no headings.
    pub abstract_text: String,
    /// Every internal link with its rune span, in visit order.
    pub text_links: Vec<FullWikiLink>,
}

/// Projects the parse tree to plain text, tracking rune offsets for links
/// and capturing the abstract at the first heading.
pub(crate) fn generate_text(root: &ParseNode) -> TextOutput {
    let mut projector = Projector {
        buf: String::new(),
        nchar: 0,
        abstract_text: None,
        text_links: Vec::new(),
    };
    projector.walk(root);
    let abstract_text = projector
        .abstract_text
        .unwrap_or_else(|| projector.buf.clone());
    TextOutput {
        text: projector.buf,
        abstract_text,
        text_links: projector.text_links,
    }
}

struct Projector {
    /// The text accumulated so far.
    buf: String,
    /// The rune count of `buf`.
    nchar: usize,
    /// The abstract, once a heading has been seen.
    abstract_text: Option<String>,
    text_links: Vec<FullWikiLink>,
}

impl Projector {
    fn append(&mut self, text: &str) {
        self.nchar += text.chars().count();
        self.buf += text;
    }

    fn walk(&mut self, parent: &ParseNode) {
        let mut last_was_space = false;
        for node in parent.children() {
            let mut link_span: Option<(usize, usize, &WikiLink)> = None;
            let mut tail = "";
            match node {
                ParseNode::Break => self.append("\n"),
                ParseNode::Space => {
                    if !last_was_space {
                        self.append(" ");
                    }
                }
                ParseNode::Text { contents, .. } => self.append(contents),
                ParseNode::Image { .. } => {
                    self.append("\n");
                    tail = "\n";
                }
                ParseNode::Link { link, .. } => {
                    link_span = Some((self.buf.len(), self.nchar, link));
                }
                ParseNode::Html { tag, .. } => match tag.as_str() {
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                        if self.abstract_text.is_none() {
                            self.abstract_text = Some(self.buf.clone());
                        }
                        self.append("\n");
                        tail = "\n";
                    }
                    "br" => self.append("\n"),
                    "ref" => self.append(" "),
                    _ => {}
                },
                _ => {}
            }
            if !node.children().is_empty() {
                self.walk(node);
            }
            if let Some((start_byte, start, link)) = link_span {
                self.text_links.push(FullWikiLink {
                    link: link.clone(),
                    text: self.buf[start_byte..].to_string(),
                    start,
                    end: self.nchar,
                });
            }
            last_was_space = matches!(node, ParseNode::Space);
            self.append(tail);
        }
    }
}
