//! The typed token stream produced by the line tokenizer.

use crate::title::WikiLink;

/// A list item marker character.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListMarker {
    /// `*` (unordered list item).
    Bullet,
    /// `#` (ordered list item).
    Numbered,
    /// `;` (definition term).
    Term,
    /// `:` (definition description / indent).
    Definition,
}

impl ListMarker {
    /// The marker for the given prefix byte, if it is one.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'*' => Some(Self::Bullet),
            b'#' => Some(Self::Numbered),
            b';' => Some(Self::Term),
            b':' => Some(Self::Definition),
            _ => None,
        }
    }
}

/// A wikitext token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    /// A run of plain text.
    Text(String),
    /// The contents of a `<nowiki>` region, preserved verbatim.
    Nowiki {
        /// The raw inner content.
        text: String,
        /// The raw opener attribute text.
        attr: String,
    },
    /// The contents of a `<pre>` region, preserved verbatim.
    Pre {
        /// The raw inner content.
        text: String,
        /// The raw opener attribute text.
        attr: String,
    },
    /// The contents of a `<math>` region, preserved verbatim.
    Math {
        /// The raw inner content.
        text: String,
        /// The raw opener attribute text.
        attr: String,
    },
    /// A run of inline whitespace (space, tab, or carriage return).
    Space,
    /// A line boundary.
    Newline,
    /// An empty line.
    Blank,
    /// A literal `:` outside any other construct.
    Colon,
    /// A single apostrophe; runs are counted by the quote state machine.
    Quote,
    /// A horizontal rule (`----`).
    Hrule,
    /// A heading of the given depth (1 through 6).
    Heading(u8),
    /// A list item prefix character.
    ListItem(ListMarker),
    /// An internal link opener.
    Link {
        /// The canonicalized link target.
        link: WikiLink,
    },
    /// The close of an internal link scope.
    CloseLink,
    /// A file/image/media link opener.
    FileLink {
        /// The canonicalized link target.
        link: WikiLink,
        /// All pipe segments except the final caption segment.
        pipes: Vec<String>,
    },
    /// The close of a file link scope.
    CloseFileLink,
    /// An external link opener.
    ExtLink {
        /// The link URL.
        url: String,
    },
    /// The close of an external link scope.
    CloseExtLink,
    /// A `#REDIRECT` line marker.
    Redirect,
    /// A leading-space preformatted line marker.
    WikiPre,
    /// An HTML tag. Closing tags carry a leading `/` in the tag name.
    Html {
        /// The tag name, lowercased by the tree builder when matching.
        tag: String,
        /// The raw attribute text between the tag name and `>`.
        attr: String,
        /// Whether a `/` appeared after the tag name (self-closing form).
        self_closing: bool,
    },
    /// A behavior switch such as `__NOTOC__`.
    Magic {
        /// The full switch text including the `__` markers.
        name: String,
    },
    /// The start of an expanded template span; the payload indexes the
    /// article's template list.
    TemplateBegin(usize),
    /// The end of an expanded template span.
    TemplateEnd(usize),
    /// An unresolved placeholder sentinel. None survive tokenization: each
    /// is rewritten from the placeholder map, and a leftover is a parse
    /// error.
    Special(String),
    /// A demoted token with no effect.
    Nop,
}

impl Token {
    /// A short static name for the token kind, for error reporting.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Token::Text(_) => "text",
            Token::Nowiki { .. } => "nowiki",
            Token::Pre { .. } => "pre",
            Token::Math { .. } => "math",
            Token::Space => "space",
            Token::Newline => "newline",
            Token::Blank => "blank",
            Token::Colon => "colon",
            Token::Quote => "quote",
            Token::Hrule => "hrule",
            Token::Heading(_) => "heading",
            Token::ListItem(_) => "list-item",
            Token::Link { .. } => "link",
            Token::CloseLink => "closelink",
            Token::FileLink { .. } => "filelink",
            Token::CloseFileLink => "closefilelink",
            Token::ExtLink { .. } => "extlink",
            Token::CloseExtLink => "closeextlink",
            Token::Redirect => "redirect",
            Token::WikiPre => "wikipre",
            Token::Html { .. } => "html",
            Token::Magic { .. } => "magic",
            Token::TemplateBegin(_) => "tb",
            Token::TemplateEnd(_) => "te",
            Token::Special(_) => "special",
            Token::Nop => "nop",
        }
    }
}
