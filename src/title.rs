//! Types and functions for canonicalizing wiki link targets.

use html_escape::decode_html_entities;
use regex::Regex;
use std::{collections::HashMap, sync::LazyLock};

/// A parsed internal link target.
///
/// ```text
/// Namespace:Page name#Anchor
/// ^^^^^^^^^ ^^^^^^^^^ ^^^^^^
/// ```
///
/// The namespace is either empty (the main namespace) or one of the canonical
/// capitalized names from the [`Namespaces`] table in effect when the link
/// was canonicalized.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct WikiLink {
    /// The canonical namespace name, or an empty string for the main
    /// namespace.
    pub namespace: String,
    /// The page name, first rune upper-cased, interior space runs collapsed.
    pub page_name: String,
    /// The anchor text following `#`, excluding the `#` itself.
    pub anchor: String,
}

impl WikiLink {
    /// The namespace-qualified page name.
    pub fn full_pagename(&self) -> String {
        if self.namespace.is_empty() {
            self.page_name.clone()
        } else {
            format!("{}:{}", self.namespace, self.page_name)
        }
    }

    /// The namespace-qualified page name including the anchor.
    pub fn full_pagename_anchor(&self) -> String {
        let mut out = String::new();
        if !self.namespace.is_empty() {
            out += &self.namespace;
            out.push(':');
        }
        out += &self.page_name;
        if !self.anchor.is_empty() {
            out.push('#');
            out += &self.anchor;
        }
        out
    }

    /// Returns true if the link names no page and refers to the current
    /// article (e.g. `[[#Section]]`).
    pub fn is_implicit_self_link(&self) -> bool {
        self.page_name.is_empty()
    }

    /// Returns true if the link carries an anchor.
    pub fn has_anchor(&self) -> bool {
        !self.anchor.is_empty()
    }
}

/// The standard MediaWiki namespace aliases, lowercased, mapped to their
/// canonical names.
static STANDARD_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "media" => "Media",
    "special" => "Special",
    "talk" => "Talk",
    "user" => "User",
    "user talk" => "User talk",
    "wikipedia" => "Wikipedia",
    "wikipedia talk" => "Wikipedia talk",
    "file" => "File",
    "file talk" => "File talk",
    "mediawiki" => "MediaWiki",
    "mediawiki talk" => "MediaWiki talk",
    "template" => "Template",
    "template talk" => "Template talk",
    "help" => "Help",
    "help talk" => "Help talk",
    "category" => "Category",
    "category talk" => "Category talk",
    "portal" => "Portal",
    "portal talk" => "Portal talk",
    "book" => "Book",
    "book talk" => "Book talk",
    "draft" => "Draft",
    "draft talk" => "Draft talk",
    "education program" => "Education Program",
    "education program talk" => "Education Program talk",
    "timedtext" => "TimedText",
    "timedtext talk" => "TimedText talk",
    "module" => "Module",
    "module talk" => "Module talk",
    "topic" => "Topic",
};

/// Collapses runs of spaces and underscores in titles.
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new("[ _]+").unwrap());

/// A namespace alias table: lowercased alias to canonical name.
#[derive(Clone, Debug)]
pub struct Namespaces {
    aliases: HashMap<String, String>,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            aliases: STANDARD_ALIASES
                .entries()
                .map(|(alias, canonical)| ((*alias).to_string(), (*canonical).to_string()))
                .collect(),
        }
    }
}

impl Namespaces {
    /// The standard MediaWiki namespace table.
    pub fn standard() -> &'static Namespaces {
        static STANDARD: LazyLock<Namespaces> = LazyLock::new(Namespaces::default);
        &STANDARD
    }

    /// Adds an alias to the table.
    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.aliases
            .insert(alias.to_lowercase(), canonical.to_string());
        self
    }

    /// Resolves a lowercased alias to its canonical name.
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// Canonicalizes a raw link target against this namespace table.
    ///
    /// The anchor is split off at the first `#`. A prefix before the first
    /// `:` is resolved through the alias table; an unknown prefix is folded
    /// back into the page name. Runs of spaces and underscores collapse to
    /// single spaces, surrounding whitespace is trimmed, HTML entities are
    /// decoded when `unescape` is set, and the first rune of the page name
    /// is upper-cased. Canonicalization is idempotent.
    pub fn canonical_form_in(
        &self,
        target: &str,
        default_namespace: &str,
        unescape: bool,
    ) -> WikiLink {
        let (target, raw_anchor) = match target.split_once('#') {
            Some((target, anchor)) => (target, anchor),
            None => (target, ""),
        };

        let mut namespace = default_namespace.to_string();
        let mut rest = target;
        if let Some((prefix, suffix)) = target.split_once(':') {
            let mut alias = SPACE_RUNS.replace_all(prefix, " ").trim().to_string();
            if unescape {
                alias = decode_html_entities(&alias).into_owned();
            }
            match self.resolve(&alias.to_lowercase()) {
                Some(canonical) if !alias.is_empty() => {
                    namespace = canonical.to_string();
                    rest = suffix;
                }
                Some(_) => {
                    namespace = String::new();
                    rest = suffix;
                }
                None => {}
            }
        }

        let mut page_name = SPACE_RUNS.replace_all(rest, " ").trim().to_string();
        let mut anchor = SPACE_RUNS.replace_all(raw_anchor, " ").into_owned();
        if unescape {
            page_name = decode_html_entities(&page_name).into_owned();
            anchor = decode_html_entities(&anchor).into_owned();
        }

        if let Some(first) = page_name.chars().next()
            && first.is_lowercase()
        {
            let rest = &page_name[first.len_utf8()..];
            page_name = format!("{}{rest}", first.to_uppercase());
        }

        WikiLink {
            namespace,
            page_name,
            anchor,
        }
    }
}

/// Canonicalizes a link target under the standard namespace table with the
/// main namespace as default.
pub fn canonical_form(target: &str) -> WikiLink {
    Namespaces::standard().canonical_form_in(target, "", true)
}

/// Canonicalizes a link target under the standard namespace table with the
/// given default namespace.
pub fn canonical_form_in_namespace(target: &str, default_namespace: &str) -> WikiLink {
    Namespaces::standard().canonical_form_in(target, default_namespace, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_case_folding() {
        let wl = canonical_form("WiKIpEdia:pagename#section");
        assert_eq!(wl.namespace, "Wikipedia");
        assert_eq!(wl.page_name, "Pagename");
        assert_eq!(wl.anchor, "section");
    }

    #[test]
    fn space_collapsing() {
        assert_eq!(canonical_form("A_b").page_name, "A b");
        assert_eq!(canonical_form("A__  __b").page_name, "A b");
        assert_eq!(canonical_form("  a b  ").page_name, "A b");
    }

    #[test]
    fn unknown_prefix_stays_in_page_name() {
        let wl = canonical_form("Notans:page");
        assert_eq!(wl.namespace, "");
        assert_eq!(wl.page_name, "Notans:page");
    }

    #[test]
    fn entity_unescaping() {
        assert_eq!(canonical_form("a&amp;b").page_name, "A&b");
    }

    #[test]
    fn implicit_self_link() {
        let wl = canonical_form("#References");
        assert!(wl.is_implicit_self_link());
        assert!(wl.has_anchor());
        assert_eq!(wl.anchor, "References");
    }

    #[test]
    fn idempotence() {
        for target in ["WiKIpEdia:pagename#section", "A _ b", "file:X.jpg#top", "#frag"] {
            let once = canonical_form(target);
            let twice = canonical_form(&once.full_pagename_anchor());
            assert_eq!(
                once, twice,
                "canonicalization must be idempotent for {target:?}"
            );
        }
    }

    #[test]
    fn custom_alias_table() {
        let ns = Namespaces::default().with_alias("bild", "File");
        let wl = ns.canonical_form_in("Bild:x.jpg", "", true);
        assert_eq!(wl.namespace, "File");
        assert_eq!(wl.page_name, "X.jpg");
    }

    #[test]
    fn full_pagename_forms() {
        let wl = canonical_form("Template:Infobox person#top");
        assert_eq!(wl.full_pagename(), "Template:Infobox person");
        assert_eq!(wl.full_pagename_anchor(), "Template:Infobox person#top");
    }
}
