//! A parser for MediaWiki-flavored wiki markup.
//!
//! Raw markup runs through a staged pipeline: comments are stripped,
//! verbatim regions (`<nowiki>`, `<pre>`, `<math>`) are held aside,
//! templates are discovered and recursively transcluded through an injected
//! [`PageFetcher`], lines are tokenized, apostrophe runs are balanced into
//! emphasis markers, and the tokens are assembled into a tree. The parsed
//! [`Article`] exposes the token stream, the parse tree, internal/external/
//! media link lists, the templates used, and a plain-text projection with
//! rune-indexed link spans.
//!
//! ```
//! use wikitext::{Article, NullFetcher};
//!
//! let article = Article::parse("Example", "''Hello'' [[world]]", &NullFetcher)?;
//! assert_eq!(article.links()[0].page_name, "World");
//! assert_eq!(article.text(), "Hello world\n");
//! # Ok::<(), wikitext::ParseError>(())
//! ```

mod article;
mod error;
mod preprocess;
mod quotes;
mod template;
mod text;
mod title;
mod token;
mod tokenize;
mod tree;

pub use article::{Article, FetchError, NullFetcher, PageFetcher};
pub use error::ParseError;
pub use template::{Template, TemplateKind};
pub use text::FullWikiLink;
pub use title::{Namespaces, WikiLink, canonical_form, canonical_form_in_namespace};
pub use token::{ListMarker, Token};
pub use tree::{ParseNode, TextKind};
