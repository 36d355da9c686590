//! Early pipeline passes that run on the raw markup before tokenization:
//! comment stripping, verbatim region extraction, and multi-line link
//! normalization.

use crate::token::Token;
use regex::Regex;
use std::{borrow::Cow, collections::HashMap, sync::LazyLock};

/// The private marker byte used for placeholder sentinels in intermediate
/// buffers. Assumed absent from legitimate wiki input.
pub(crate) const SENTINEL: char = '\x07';

/// Every sentinel form (`\x07NNNNNNN`, `\x07tbNNNNN`, `\x07teNNNNN`) is
/// exactly this many bytes long.
pub(crate) const SENTINEL_LEN: usize = 8;

/// Tokens held aside during preprocessing, keyed by the sentinel spliced
/// into the intermediate text in their place.
pub(crate) type PlaceholderMap = HashMap<String, Token>;

static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<!--.*?(?:-->|\z)").unwrap());

static NOWIKI_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*(nowiki)\s*[^>/]*>").unwrap());
static NOWIKI_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/nowiki)\s*[^>/]*>").unwrap());
static PRE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*(pre)\s*[^>]*>").unwrap());
static PRE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/pre)\s*[^>]*>").unwrap());
static MATH_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*(math)\s*[^>]*>").unwrap());
static MATH_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/math)\s*[^>]*>").unwrap());

static MULTILINE_LINKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\[[^\n|]*\|.*?\]\]").unwrap());

/// Removes `<!-- … -->` spans. An unterminated comment consumes everything
/// to the end of the input.
pub(crate) fn strip_comments(text: &str) -> Cow<'_, str> {
    COMMENTS.replace_all(text, "")
}

/// A tag match participating in the verbatim sweep.
struct TagEvent {
    /// Byte offset of the full match start.
    start: usize,
    /// Byte offset past the full match end.
    end: usize,
    /// Byte offset past the captured tag name.
    name_end: usize,
    /// Match class: even values open a region, odd values close one, and a
    /// close only pairs with the open one class below it.
    class: u8,
    /// The lowercased tag name of an opener.
    name: &'static str,
}

/// Replaces `<nowiki>`, `<pre>`, and `<math>` regions with placeholder
/// sentinels, recording their contents in the returned map.
///
/// All six tag regexes are matched up front and merged into one event list
/// sorted by position. The sweep keeps at most one region open at a time: a
/// close pairs only with an open of the same type, events inside an open
/// region are ignored until it closes, and a region still open at the end
/// of input is closed there.
pub(crate) fn extract_verbatim(text: &str) -> (String, PlaceholderMap) {
    let mut events = Vec::new();
    let sets: [(&Regex, u8, &'static str); 6] = [
        (&NOWIKI_OPEN, 0, "nowiki"),
        (&NOWIKI_CLOSE, 1, "nowiki"),
        (&PRE_OPEN, 2, "pre"),
        (&PRE_CLOSE, 3, "pre"),
        (&MATH_OPEN, 4, "math"),
        (&MATH_CLOSE, 5, "math"),
    ];
    for (re, class, name) in sets {
        for captures in re.captures_iter(text) {
            let full = captures.get(0).unwrap();
            let tag = captures.get(1).unwrap();
            events.push(TagEvent {
                start: full.start(),
                end: full.end(),
                name_end: tag.end(),
                class,
                name,
            });
        }
    }
    events.sort_by_key(|event| event.start);

    let mut map = PlaceholderMap::with_capacity(events.len());
    if events.is_empty() {
        return (text.to_string(), map);
    }

    let mut out = String::with_capacity(text.len());
    let mut open: Option<&TagEvent> = None;
    let mut last_close = 0;
    let mut count = 0;
    for event in &events {
        match open {
            Some(opener) if event.class == opener.class + 1 && opener.end <= event.start => {
                let sentinel = format!("{SENTINEL}{count:07}");
                map.insert(
                    sentinel.clone(),
                    verbatim_token(
                        opener.name,
                        &text[opener.end..event.start],
                        &text[opener.name_end..opener.end - 1],
                    ),
                );
                out += &sentinel;
                open = None;
                last_close = event.end;
                count += 1;
            }
            None if event.class % 2 == 0 && last_close <= event.start => {
                out += &text[last_close..event.start];
                open = Some(event);
            }
            _ => {}
        }
    }
    if let Some(opener) = open {
        let sentinel = format!("{SENTINEL}{count:07}");
        map.insert(
            sentinel.clone(),
            verbatim_token(
                opener.name,
                &text[opener.end..],
                &text[opener.name_end..opener.end - 1],
            ),
        );
        out += &sentinel;
    } else {
        out += &text[last_close..];
    }
    (out, map)
}

/// Builds the held-aside token for one verbatim region.
fn verbatim_token(name: &str, text: &str, attr: &str) -> Token {
    let text = text.to_string();
    let attr = attr.to_string();
    match name {
        "nowiki" => Token::Nowiki { text, attr },
        "pre" => Token::Pre { text, attr },
        _ => Token::Math { text, attr },
    }
}

/// Rewrites newlines to spaces inside `[[…|…]]` links that span lines, so
/// the line tokenizer sees each link on a single line.
pub(crate) fn normalize_multiline_links(text: &str) -> Cow<'_, str> {
    let mut out = String::new();
    let mut flushed = 0;
    for found in MULTILINE_LINKS.find_iter(text) {
        if !found.as_str().contains('\n') {
            continue;
        }
        out += &text[flushed..found.start()];
        for c in found.as_str().chars() {
            out.push(if c == '\n' { ' ' } else { c });
        }
        flushed = found.end();
    }
    if flushed == 0 {
        Cow::Borrowed(text)
    } else {
        out += &text[flushed..];
        Cow::Owned(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_are_stripped() {
        assert_eq!(strip_comments("a<!-- x -->b"), "ab");
        assert_eq!(
            strip_comments("a<!-- one -->b<!-- two -->c"),
            "abc",
            "each comment should end at its own terminator"
        );
    }

    #[test]
    fn unterminated_comment_runs_to_eof() {
        assert_eq!(strip_comments("a<!-- x"), "a");
    }

    #[test]
    fn nowiki_region_becomes_sentinel() {
        let (out, map) = extract_verbatim("a<nowiki>''x''</nowiki>b");
        assert_eq!(out, "a\x070000000b");
        assert_eq!(
            map.get("\x070000000"),
            Some(&Token::Nowiki {
                text: "''x''".to_string(),
                attr: String::new(),
            })
        );
    }

    #[test]
    fn mismatched_close_is_ignored() {
        let (out, map) = extract_verbatim("a<nowiki>x</pre>y</nowiki>b");
        assert_eq!(out, "a\x070000000b");
        assert_eq!(
            map.get("\x070000000"),
            Some(&Token::Nowiki {
                text: "x</pre>y".to_string(),
                attr: String::new(),
            }),
            "a close of a different type must not end the region"
        );
    }

    #[test]
    fn unterminated_region_closes_at_eof() {
        let (out, map) = extract_verbatim("a<math>x+y");
        assert_eq!(out, "a\x070000000");
        assert_eq!(
            map.get("\x070000000"),
            Some(&Token::Math {
                text: "x+y".to_string(),
                attr: String::new(),
            })
        );
    }

    #[test]
    fn opener_attributes_are_kept() {
        let (_, map) = extract_verbatim("<pre class=\"x\">y</pre>");
        assert_eq!(
            map.get("\x070000000"),
            Some(&Token::Pre {
                text: "y".to_string(),
                attr: " class=\"x\"".to_string(),
            })
        );
    }

    #[test]
    fn multiline_link_newlines_become_spaces() {
        assert_eq!(
            normalize_multiline_links("[[a|b\nc]]\nd"),
            "[[a|b c]]\nd",
            "only newlines inside the link span should be rewritten"
        );
        assert_eq!(normalize_multiline_links("[[a|bc]]"), "[[a|bc]]");
    }

    #[test]
    fn multiline_link_preserves_multibyte_text() {
        assert_eq!(
            normalize_multiline_links("[[a|é\nü]]"),
            "[[a|é ü]]"
        );
    }
}
