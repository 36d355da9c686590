//! The article object: owns the raw markup and every product of the parse.

use crate::{
    error::ParseError,
    quotes,
    template::{Template, TemplateKind},
    text::{self, FullWikiLink},
    title::{WikiLink, canonical_form},
    token::Token,
    tokenize,
    tree::{self, ParseNode},
};

/// The error type produced by a [`PageFetcher`].
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// The capability used to resolve transcluded pages during template
/// expansion.
///
/// A fetch failure never aborts a parse: the failed template expands to an
/// empty string and the failure is logged.
pub trait PageFetcher {
    /// Fetches the raw markup of the given page.
    fn fetch(&self, link: &WikiLink) -> Result<String, FetchError>;
}

/// A fetcher that returns an empty body for every page. Parsing with it
/// yields empty-rendered templates but otherwise fully parsed markup.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullFetcher;

impl PageFetcher for NullFetcher {
    fn fetch(&self, _link: &WikiLink) -> Result<String, FetchError> {
        Ok(String::new())
    }
}

/// A fully parsed article.
///
/// All products are populated by [`Article::parse`]; the article is
/// read-only afterwards.
#[derive(Debug)]
pub struct Article {
    title: String,
    wikitext: String,
    tokens: Vec<Token>,
    root: ParseNode,
    links: Vec<WikiLink>,
    ext_links: Vec<String>,
    media: Vec<WikiLink>,
    templates: Vec<Template>,
    text: String,
    abstract_text: String,
    text_links: Vec<FullWikiLink>,
}

impl Article {
    /// Parses raw markup into an article, resolving transclusions through
    /// `fetcher`.
    pub fn parse(
        title: &str,
        wikitext: &str,
        fetcher: &dyn PageFetcher,
    ) -> Result<Article, ParseError> {
        let mut templates = Vec::new();
        let tokens = tokenize::tokenize(wikitext, fetcher, &mut templates)?;
        let mut tokens = quotes::resolve_quotes(tokens);
        let built = tree::build_tree(&mut tokens, &templates)?;
        let projected = text::generate_text(&built.root);
        Ok(Article {
            title: title.to_string(),
            wikitext: wikitext.to_string(),
            tokens,
            root: built.root,
            links: built.links,
            ext_links: built.ext_links,
            media: built.media,
            templates,
            text: projected.text,
            abstract_text: projected.abstract_text,
            text_links: projected.text_links,
        })
    }

    /// The article title as given to [`Article::parse`].
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The canonicalized form of the article title.
    pub fn canonical_title(&self) -> WikiLink {
        canonical_form(&self.title)
    }

    /// The raw markup.
    pub fn wikitext(&self) -> &str {
        &self.wikitext
    }

    /// The token stream after quote resolution.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The root of the parse tree.
    pub fn root(&self) -> &ParseNode {
        &self.root
    }

    /// Every internal link in the tree, in first-visit order.
    pub fn links(&self) -> &[WikiLink] {
        &self.links
    }

    /// Every external link URL, in first-visit order.
    pub fn external_links(&self) -> &[String] {
        &self.ext_links
    }

    /// Every file and media link, in first-visit order.
    pub fn media(&self) -> &[WikiLink] {
        &self.media
    }

    /// The templates used by the article, in source order.
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// The plain-text projection of the article.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The plain text up to the first heading, or all of it when the
    /// article has no headings.
    pub fn abstract_text(&self) -> &str {
        &self.abstract_text
    }

    /// Every internal link with its rune span in the plain text.
    pub fn text_links(&self) -> &[FullWikiLink] {
        &self.text_links
    }

    /// Renders an indented description of the parse tree, for debugging.
    pub fn dump_tree(&self) -> String {
        self.root.dump()
    }

    /// Returns the redirect target when the article starts with a
    /// `#REDIRECT [[…]]` line.
    pub fn check_redirect(&self) -> Option<&WikiLink> {
        let mut found_marker = false;
        for token in self.tokens.iter().take(11) {
            match token {
                Token::Redirect => found_marker = true,
                Token::Link { link } if found_marker => return Some(link),
                _ => {}
            }
        }
        None
    }

    /// Returns true when the article's templates mark it as a
    /// disambiguation page.
    pub fn is_disambiguation(&self) -> bool {
        self.templates.iter().any(|template| {
            if template.kind != TemplateKind::Normal {
                return false;
            }
            let name = template.name.to_lowercase();
            name.contains("disambig")
                || matches!(
                    name.as_str(),
                    "dab" | "geodis" | "hndis" | "hndis-cleanup" | "numberdis"
                )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TextKind;
    use std::collections::HashMap;

    struct MapFetcher(HashMap<&'static str, &'static str>);

    impl PageFetcher for MapFetcher {
        fn fetch(&self, link: &WikiLink) -> Result<String, FetchError> {
            Ok(self
                .0
                .get(link.full_pagename().as_str())
                .map(|body| (*body).to_string())
                .unwrap_or_default())
        }
    }

    fn parse(markup: &str) -> Article {
        let _ = env_logger::try_init();
        Article::parse("Test", markup, &NullFetcher).unwrap()
    }

    #[test]
    fn album_line_collects_link_and_balances_quotes() {
        let article = parse("* ''[[The Album (ABBA album)|''The Album'']]'' (1977)");
        assert_eq!(article.links().len(), 1);
        assert_eq!(article.links()[0].namespace, "");
        assert_eq!(article.links()[0].page_name, "The Album (ABBA album)");

        // The quote machine closes the outer italic at the link boundary and
        // opens a fresh one inside, so both scopes hold balanced pairs.
        let italic = |tokens: &[Token], tag: &str| {
            tokens
                .iter()
                .filter(|t| matches!(t, Token::Html { tag: n, .. } if n == tag))
                .count()
        };
        let link_pos = article
            .tokens()
            .iter()
            .position(|t| matches!(t, Token::Link { .. }))
            .unwrap();
        let close_pos = article
            .tokens()
            .iter()
            .position(|t| matches!(t, Token::CloseLink))
            .unwrap();
        let outside = &article.tokens()[..link_pos];
        assert_eq!(italic(outside, "i"), 1);
        assert_eq!(italic(outside, "/i"), 1);
        let inside = &article.tokens()[link_pos + 1..close_pos];
        assert_eq!(italic(inside, "i"), 1);
        assert_eq!(italic(inside, "/i"), 1);

        let inner = article.text_links();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].text, "The Album");
    }

    #[test]
    fn redirect_article() {
        let article = parse("#REDIRECT [[Foo]]");
        let target = article.check_redirect().expect("a redirect target");
        assert_eq!(target.page_name, "Foo");

        assert!(parse("just text").check_redirect().is_none());
    }

    #[test]
    fn heading_article_abstract_and_text() {
        let article = parse("==Heading==\nbody");
        assert_eq!(article.abstract_text(), "");
        assert!(article.text().contains("\nHeading\nbody"));
    }

    #[test]
    fn external_link_article() {
        let article = parse("[http://x.example hello]");
        assert_eq!(article.external_links(), ["http://x.example"]);
        let node = article
            .root()
            .children()
            .iter()
            .find_map(|node| match node {
                ParseNode::ExtLink { url, children } => Some((url, children)),
                _ => None,
            })
            .expect("an extlink node");
        assert_eq!(node.0, "http://x.example");
        assert_eq!(
            node.1[0],
            ParseNode::Text {
                kind: TextKind::Plain,
                contents: "hello".to_string()
            }
        );
    }

    #[test]
    fn file_link_article() {
        let article = parse("[[File:a.jpg|thumb|caption]]");
        assert_eq!(article.media().len(), 1);
        assert_eq!(article.media()[0].namespace, "File");
        assert_eq!(article.media()[0].page_name, "A.jpg");
        assert!(
            article
                .root()
                .children()
                .iter()
                .any(|node| matches!(node, ParseNode::Image { .. }))
        );
        let pipes = article
            .tokens()
            .iter()
            .find_map(|token| match token {
                Token::FileLink { pipes, .. } => Some(pipes),
                _ => None,
            })
            .expect("a file link token");
        assert_eq!(pipes, &["thumb".to_string()]);
    }

    #[test]
    fn template_expansion_reaches_plain_text() {
        let fetcher = MapFetcher(HashMap::from([("Template:Echo", "{{{1}}}")]));
        let article = Article::parse("Test", "{{echo|hi}}", &fetcher).unwrap();
        assert!(
            article.text().contains("hi"),
            "expanded template text missing from {:?}",
            article.text()
        );
        assert_eq!(article.templates().len(), 1);
        assert_eq!(article.templates()[0].name, "echo");
    }

    #[test]
    fn nowiki_content_is_preserved_verbatim() {
        let article = parse("<nowiki>''[[x]]''</nowiki>");
        let found = article
            .root()
            .children()
            .iter()
            .any(|node| {
                matches!(
                    node,
                    ParseNode::Text { kind: TextKind::Nowiki, contents } if contents == "''[[x]]''"
                )
            });
        assert!(found, "nowiki text must survive unchanged: {}", article.dump_tree());
        assert!(article.links().is_empty());
    }

    #[test]
    fn text_link_rune_offsets_with_multibyte_text() {
        let article = parse("héllo [[Wörld]]!");
        let fl = &article.text_links()[0];
        assert_eq!(fl.text, "Wörld");
        let by_runes: String = article
            .text()
            .chars()
            .skip(fl.start)
            .take(fl.end - fl.start)
            .collect();
        assert_eq!(by_runes, fl.text);
    }

    #[test]
    fn disambiguation_detection() {
        let article = parse("{{disambiguation}}");
        assert!(article.is_disambiguation());
        assert!(!parse("{{infobox}}").is_disambiguation());
    }

    #[test]
    fn canonical_title() {
        let article = parse("x");
        assert_eq!(article.canonical_title().page_name, "Test");
    }

    #[test]
    fn null_fetcher_renders_templates_empty() {
        let article = parse("a{{missing}}b");
        assert_eq!(article.templates().len(), 1);
        assert!(article.text().contains('a') && article.text().contains('b'));
    }
}
