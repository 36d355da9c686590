//! Recursive assembly of the token stream into a parse tree.

use crate::{
    error::ParseError,
    template::Template,
    title::WikiLink,
    token::Token,
};
use html_escape::decode_html_entities;
use std::fmt::Write as _;

/// The number of malformed inner HTML scopes tolerated before the parse
/// fails.
const MAX_INNER_PARSE_ERRORS: usize = 100;

/// The maximum depth rendered by [`ParseNode::dump`].
const MAX_DUMP_DEPTH: usize = 20;

/// The flavor of a text leaf.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextKind {
    /// Ordinary text, entity-decoded.
    Plain,
    /// Text that came out of a `<nowiki>` region.
    Nowiki,
    /// Text that came out of a `<pre>` region.
    Pre,
}

/// A node of the parse tree. Children are owned by their parent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseNode {
    /// The document root.
    Root {
        /// The top-level nodes.
        children: Vec<ParseNode>,
    },
    /// A text leaf.
    Text {
        /// The text flavor.
        kind: TextKind,
        /// The decoded text.
        contents: String,
    },
    /// A `<math>` region, kept raw.
    Math {
        /// The raw region contents.
        contents: String,
    },
    /// An HTML element scope. This also covers generated structure: headings
    /// (`h1`…`h6`), horizontal rules (`hr`), preformatted blocks (`pre`), and
    /// the emphasis markers from the quote machine (`i`, `b`).
    Html {
        /// The lowercased tag name.
        tag: String,
        /// The raw attribute text of the opening tag.
        attr: String,
        /// Whether the tag was self-closing.
        self_closing: bool,
        /// The parsed scope interior.
        children: Vec<ParseNode>,
    },
    /// An external link.
    ExtLink {
        /// The link URL.
        url: String,
        /// The parsed display text.
        children: Vec<ParseNode>,
    },
    /// An internal link.
    Link {
        /// The canonicalized target.
        link: WikiLink,
        /// The parsed display text.
        children: Vec<ParseNode>,
    },
    /// A file or media link.
    Image {
        /// The canonicalized target.
        link: WikiLink,
        /// The parsed caption.
        children: Vec<ParseNode>,
    },
    /// A redirect marker carrying its target.
    Redirect {
        /// The redirect target.
        link: WikiLink,
    },
    /// A behavior switch.
    Magic {
        /// The switch text.
        contents: String,
    },
    /// An inline whitespace run.
    Space,
    /// A paragraph break from an empty line.
    Break,
    /// The start of an expanded template span.
    TemplateStart {
        /// The template name.
        name: String,
    },
    /// The end of an expanded template span.
    TemplateEnd {
        /// The template name.
        name: String,
    },
}

impl ParseNode {
    /// The node's children, empty for leaves.
    pub fn children(&self) -> &[ParseNode] {
        match self {
            ParseNode::Root { children }
            | ParseNode::Html { children, .. }
            | ParseNode::ExtLink { children, .. }
            | ParseNode::Link { children, .. }
            | ParseNode::Image { children, .. } => children,
            _ => &[],
        }
    }

    /// Renders an indented description of the subtree, for debugging.
    /// Rendering stops below [`MAX_DUMP_DEPTH`].
    pub fn dump(&self) -> String {
        let mut out = String::new();
        dump_into(&mut out, self, 0);
        out
    }
}

fn dump_into(out: &mut String, node: &ParseNode, depth: usize) {
    if depth > MAX_DUMP_DEPTH {
        return;
    }
    for child in node.children() {
        let detail = match child {
            ParseNode::Text { kind, contents } => format!("text/{kind:?} {contents:?}"),
            ParseNode::Math { contents } => format!("math {contents:?}"),
            ParseNode::Html { tag, .. } => format!("html/{tag}"),
            ParseNode::ExtLink { url, .. } => format!("extlink {url}"),
            ParseNode::Link { link, .. } => format!("link {}", link.full_pagename_anchor()),
            ParseNode::Image { link, .. } => format!("image {}", link.full_pagename()),
            ParseNode::Redirect { link } => format!("redirect {}", link.full_pagename()),
            ParseNode::Magic { contents } => format!("magic {contents}"),
            ParseNode::Space => "space".to_string(),
            ParseNode::Break => "break".to_string(),
            ParseNode::TemplateStart { name } => format!("tb {name}"),
            ParseNode::TemplateEnd { name } => format!("te {name}"),
            ParseNode::Root { .. } => "root".to_string(),
        };
        let _ = writeln!(out, "{:.<1$}{detail}", "", depth.min(MAX_DUMP_DEPTH));
        dump_into(out, child, depth + 1);
    }
}

/// The parse tree plus the link lists collected while building it, in
/// first-visit order.
pub(crate) struct TreeOutput {
    pub root: ParseNode,
    pub links: Vec<WikiLink>,
    pub ext_links: Vec<String>,
    pub media: Vec<WikiLink>,
}

/// Builds the parse tree from the quote-normalized token stream.
pub(crate) fn build_tree(
    tokens: &mut [Token],
    templates: &[Template],
) -> Result<TreeOutput, ParseError> {
    let mut builder = TreeBuilder {
        templates,
        links: Vec::new(),
        ext_links: Vec::new(),
        media: Vec::new(),
        inner_errors: 0,
    };
    let children = builder.parse_nodes(tokens)?;
    Ok(TreeOutput {
        root: ParseNode::Root { children },
        links: builder.links,
        ext_links: builder.ext_links,
        media: builder.media,
    })
}

struct TreeBuilder<'a> {
    templates: &'a [Template],
    links: Vec<WikiLink>,
    ext_links: Vec<String>,
    media: Vec<WikiLink>,
    inner_errors: usize,
}

impl TreeBuilder<'_> {
    fn parse_nodes(&mut self, tokens: &mut [Token]) -> Result<Vec<ParseNode>, ParseError> {
        let mut nl = Vec::new();
        let mut ti = 0;
        let mut last_ti = usize::MAX;
        while ti < tokens.len() {
            if ti == last_ti {
                return Err(ParseError::Stalled);
            }
            last_ti = ti;
            match &tokens[ti] {
                Token::Nowiki { text, .. } => {
                    nl.push(ParseNode::Text {
                        kind: TextKind::Nowiki,
                        contents: decode_html_entities(text).into_owned(),
                    });
                    ti += 1;
                }
                Token::Text(text) => {
                    nl.push(ParseNode::Text {
                        kind: TextKind::Plain,
                        contents: decode_html_entities(text).into_owned(),
                    });
                    ti += 1;
                }
                Token::Math { text, .. } => {
                    nl.push(ParseNode::Math {
                        contents: text.clone(),
                    });
                    ti += 1;
                }
                Token::Pre { text, attr } => {
                    let inner = ParseNode::Text {
                        kind: TextKind::Pre,
                        contents: decode_html_entities(text).into_owned(),
                    };
                    nl.push(ParseNode::Html {
                        tag: "pre".to_string(),
                        attr: attr.clone(),
                        self_closing: false,
                        children: vec![inner],
                    });
                    ti += 1;
                }
                Token::Nop => ti += 1,
                Token::WikiPre => {
                    // Fold this and all following space-indented lines into
                    // one pre block; continuation line markers demote to
                    // no-ops.
                    let mut close_before = tokens.len();
                    let mut ni = ti + 1;
                    while ni + 1 < tokens.len() {
                        if matches!(tokens[ni], Token::Newline) {
                            if matches!(tokens[ni + 1], Token::WikiPre) {
                                tokens[ni + 1] = Token::Nop;
                            } else {
                                close_before = ni;
                                break;
                            }
                        }
                        ni += 1;
                    }
                    if close_before <= ti + 1 {
                        nl.push(ParseNode::Html {
                            tag: "pre".to_string(),
                            attr: String::new(),
                            self_closing: false,
                            children: Vec::new(),
                        });
                        ti += 1;
                    } else {
                        let children = self.parse_nodes(&mut tokens[ti + 1..close_before])?;
                        nl.push(ParseNode::Html {
                            tag: "pre".to_string(),
                            attr: String::new(),
                            self_closing: false,
                            children,
                        });
                        ti = close_before;
                    }
                }
                Token::ExtLink { url } => {
                    let url = url.clone();
                    let mut ni = ti + 1;
                    let mut nopen = 1;
                    while ni < tokens.len() {
                        match &tokens[ni] {
                            Token::ExtLink { .. } => nopen += 1,
                            Token::CloseExtLink => nopen -= 1,
                            _ => {}
                        }
                        if nopen == 0 {
                            break;
                        }
                        ni += 1;
                    }
                    if ni == tokens.len() {
                        return Err(ParseError::UnmatchedExtLink { url });
                    }
                    self.ext_links.push(url.clone());
                    let children = if ni > ti + 1 {
                        self.parse_nodes(&mut tokens[ti + 1..ni])?
                    } else {
                        Vec::new()
                    };
                    nl.push(ParseNode::ExtLink { url, children });
                    ti = ni + 1;
                }
                Token::CloseExtLink => return Err(ParseError::UnmatchedCloseExtLink),
                Token::Hrule => {
                    nl.push(ParseNode::Html {
                        tag: "hr".to_string(),
                        attr: String::new(),
                        self_closing: false,
                        children: Vec::new(),
                    });
                    ti += 1;
                }
                Token::Magic { name } => {
                    nl.push(ParseNode::Magic {
                        contents: name.clone(),
                    });
                    ti += 1;
                }
                Token::Colon => {
                    nl.push(ParseNode::Text {
                        kind: TextKind::Plain,
                        contents: ":".to_string(),
                    });
                    ti += 1;
                }
                Token::Space => {
                    nl.push(ParseNode::Space);
                    ti += 1;
                }
                Token::Blank => {
                    nl.push(ParseNode::Break);
                    ti += 1;
                }
                Token::Redirect => {
                    let mut ni = ti + 1;
                    while ni < tokens.len() {
                        if matches!(tokens[ni], Token::Newline | Token::Link { .. }) {
                            break;
                        }
                        ni += 1;
                    }
                    if ni == tokens.len() || matches!(tokens[ni], Token::Newline) {
                        nl.push(ParseNode::Text {
                            kind: TextKind::Plain,
                            contents: String::new(),
                        });
                    } else if let Token::Link { link } = &tokens[ni] {
                        nl.push(ParseNode::Redirect { link: link.clone() });
                    }
                    ti += 1;
                }
                Token::Link { link } => {
                    let link = link.clone();
                    let mut ni = ti + 1;
                    let mut nopen = 1;
                    while ni < tokens.len() {
                        match &tokens[ni] {
                            Token::Link { .. } => nopen += 1,
                            Token::CloseLink => nopen -= 1,
                            _ => {}
                        }
                        if nopen == 0 {
                            break;
                        }
                        ni += 1;
                    }
                    if ni == tokens.len() {
                        return Err(ParseError::UnmatchedLink {
                            page: link.page_name,
                            namespace: link.namespace,
                        });
                    }
                    self.links.push(link.clone());
                    let children = if ni > ti + 1 {
                        self.parse_nodes(&mut tokens[ti + 1..ni])?
                    } else {
                        Vec::new()
                    };
                    nl.push(ParseNode::Link { link, children });
                    ti = ni + 1;
                }
                Token::FileLink { link, .. } => {
                    let link = link.clone();
                    let mut ni = ti + 1;
                    let mut nopen = 1;
                    while ni < tokens.len() {
                        match &tokens[ni] {
                            Token::FileLink { .. } => nopen += 1,
                            Token::CloseFileLink => nopen -= 1,
                            _ => {}
                        }
                        if nopen == 0 {
                            break;
                        }
                        ni += 1;
                    }
                    if ni == tokens.len() {
                        return Err(ParseError::UnmatchedFileLink {
                            page: link.page_name,
                            namespace: link.namespace,
                        });
                    }
                    self.media.push(link.clone());
                    let children = if ni > ti + 1 {
                        self.parse_nodes(&mut tokens[ti + 1..ni])?
                    } else {
                        Vec::new()
                    };
                    nl.push(ParseNode::Image { link, children });
                    ti = ni + 1;
                }
                Token::CloseLink => return Err(ParseError::UnmatchedCloseLink),
                Token::CloseFileLink => return Err(ParseError::UnmatchedCloseFileLink),
                Token::Html {
                    tag,
                    attr,
                    self_closing,
                } => {
                    let tag = tag.to_lowercase();
                    if tag.starts_with('/') {
                        ti += 1;
                        continue;
                    }
                    let attr = attr.clone();
                    if *self_closing {
                        nl.push(ParseNode::Html {
                            tag,
                            attr,
                            self_closing: true,
                            children: Vec::new(),
                        });
                        ti += 1;
                        continue;
                    }
                    let mut ni = ti + 1;
                    let mut nopen = 1;
                    while ni < tokens.len() {
                        if let Token::Html { tag: ntag, .. } = &tokens[ni] {
                            let ntag = ntag.to_lowercase();
                            if ntag == tag {
                                nopen += 1;
                            } else if ntag.strip_prefix('/') == Some(tag.as_str()) {
                                nopen -= 1;
                            }
                            if nopen == 0 {
                                break;
                            }
                        }
                        ni += 1;
                    }
                    let mut children = Vec::new();
                    if ni > ti + 1 {
                        match self.parse_nodes(&mut tokens[ti + 1..ni]) {
                            Ok(nodes) => children = nodes,
                            Err(err) => {
                                self.inner_errors += 1;
                                if self.inner_errors >= MAX_INNER_PARSE_ERRORS {
                                    return Err(ParseError::HtmlErrorBudgetExhausted);
                                }
                                log::debug!("recovering from malformed <{tag}> scope: {err}");
                                ti += 1;
                                continue;
                            }
                        }
                    }
                    nl.push(ParseNode::Html {
                        tag,
                        attr,
                        self_closing: false,
                        children,
                    });
                    ti = (ni + 1).min(tokens.len());
                }
                Token::ListItem(_) => ti += 1,
                Token::Newline => {
                    nl.push(ParseNode::Text {
                        kind: TextKind::Plain,
                        contents: "\n".to_string(),
                    });
                    ti += 1;
                }
                Token::Heading(level) => {
                    let level = *level;
                    let mut ni = ti + 1;
                    while ni < tokens.len() {
                        if matches!(tokens[ni], Token::Newline) {
                            break;
                        }
                        ni += 1;
                    }
                    if ni == tokens.len() {
                        return Err(ParseError::UnterminatedHeading);
                    }
                    let children = if ni > ti + 1 {
                        self.parse_nodes(&mut tokens[ti + 1..ni])?
                    } else {
                        Vec::new()
                    };
                    nl.push(ParseNode::Html {
                        tag: format!("h{level}"),
                        attr: String::new(),
                        self_closing: false,
                        children,
                    });
                    ti = ni + 1;
                }
                Token::TemplateBegin(index) | Token::TemplateEnd(index) => {
                    let index = *index;
                    let Some(template) = self.templates.get(index) else {
                        return Err(ParseError::TemplateIndexOutOfRange(index));
                    };
                    let name = template.name.clone();
                    nl.push(match &tokens[ti] {
                        Token::TemplateBegin(_) => ParseNode::TemplateStart { name },
                        _ => ParseNode::TemplateEnd { name },
                    });
                    ti += 1;
                }
                token @ (Token::Quote | Token::Special(_)) => {
                    return Err(ParseError::UnrecognizedToken(token.kind_name()));
                }
            }
        }
        Ok(nl)
    }
}
