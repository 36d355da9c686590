//! Line classification and inline tokenization.
//!
//! After the preprocessing passes the markup is split on newlines; each line
//! is classified and scanned rune-wise into typed tokens. The scanner works
//! on byte offsets that always fall on rune boundaries.

use crate::{
    article::PageFetcher,
    error::ParseError,
    preprocess::{self, SENTINEL, SENTINEL_LEN},
    template::{self, Template},
    title::{WikiLink, canonical_form},
    token::{ListMarker, Token},
};
use regex::Regex;
use std::sync::LazyLock;

static BEHAVIOR_SWITCH: LazyLock<Regex> = LazyLock::new(|| Regex::new("^__[A-Z]+__").unwrap());

/// The classification of one line of markup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LineKind {
    Blank,
    Redirect,
    Hr,
    Heading,
    List,
    Table,
    WikiPre,
    Normal,
}

/// Classifies a line by its prefix.
fn line_kind(l: &str) -> LineKind {
    let bytes = l.as_bytes();
    if bytes.is_empty() {
        LineKind::Blank
    } else if bytes.len() > 8 && bytes[..9].eq_ignore_ascii_case(b"#redirect") {
        LineKind::Redirect
    } else if bytes.len() > 3 && &bytes[..4] == b"----" {
        LineKind::Hr
    } else if is_heading(l) {
        LineKind::Heading
    } else if matches!(bytes[0], b';' | b':' | b'*' | b'#') {
        LineKind::List
    } else if is_table(l) {
        LineKind::Table
    } else if bytes[0] == b' ' {
        LineKind::WikiPre
    } else {
        LineKind::Normal
    }
}

/// A heading line starts with `=` and, ignoring trailing whitespace, ends
/// with a `=` beyond the second rune.
fn is_heading(l: &str) -> bool {
    if !l.starts_with('=') {
        return false;
    }
    let mut last_equal = false;
    for (index, rv) in l.chars().enumerate() {
        if index >= 2 {
            if rv.is_whitespace() {
                continue;
            }
            last_equal = rv == '=';
        }
    }
    last_equal
}

/// A table line starts with `{|`, `|}`, `|+`, `|-`, `|`, or `!`.
fn is_table(l: &str) -> bool {
    let bytes = l.as_bytes();
    (bytes.len() > 1 && matches!(&bytes[..2], b"{|" | b"|}" | b"|+" | b"|-"))
        || (!bytes.is_empty() && matches!(bytes[0], b'|' | b'!'))
}

/// Decodes an HTML tag starting at the `<` at the beginning of `l`.
///
/// The scan respects `'` and `"` quoting and a backslash escape, takes the
/// first non-space run as the tag name (closing tags keep their leading `/`
/// in the name), and flags the tag self-closing when a `/` appears after
/// the name. Returns the number of bytes consumed, the tag name, the raw
/// attribute text, and the self-closing flag.
fn decode_html_tag(l: &str) -> Option<(usize, String, String, bool)> {
    let bytes = l.as_bytes();
    let mut matching = 0;
    let mut in_quote = false;
    let mut last_backslash = false;
    let mut quote = '#';
    let mut close_found = false;
    let mut tag_end = 0;
    let mut tag_start = 0;
    for (idx, rv) in l.char_indices() {
        match rv {
            '>' if !in_quote => {
                matching = idx;
                break;
            }
            '\'' | '"' => {
                if in_quote && quote == rv && !last_backslash {
                    in_quote = false;
                } else if !in_quote {
                    in_quote = true;
                    quote = rv;
                }
            }
            '/' => close_found = true,
            _ => {}
        }
        last_backslash = rv == '\\';
        if !rv.is_whitespace() && tag_start == 0 {
            tag_start = idx;
        }
        if rv != '/' && !rv.is_whitespace() {
            close_found = false;
        }
        if rv.is_whitespace() && tag_start != 0 && tag_end == 0 {
            tag_end = idx;
        }
    }
    if matching == 0 || tag_start == 0 {
        return None;
    }
    debug_assert!(bytes[matching] == b'>');
    let (tag, attr) = if tag_end == 0 {
        (&l[tag_start..matching], "")
    } else {
        (&l[tag_start..tag_end], &l[tag_end..matching])
    };
    Some((matching + 1, tag.to_string(), attr.to_string(), close_found))
}

/// Case-insensitive ASCII prefix test.
fn matches_prefix(s: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| {
        s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    })
}

/// External link targets must use one of these prefixes.
fn is_ext_link(l: &str) -> bool {
    matches_prefix(l, &["http://", "ftp://", "//"])
}

/// File links start with one of the media namespace prefixes.
fn possible_file_link(l: &str) -> bool {
    matches_prefix(l, &["[[image:", "[[media:", "[[file:"])
}

/// Dispatches a `[` at the start of `l` to the internal, file, or external
/// link parser.
fn parse_link(l: &str) -> Option<(usize, Vec<Token>)> {
    if l.len() < 5 {
        return None;
    }
    if l.as_bytes()[1] == b'[' {
        if possible_file_link(l) {
            parse_file_link(l)
        } else {
            parse_internal_link(l)
        }
    } else {
        parse_external_link(l)
    }
}

/// Parses a `[[…]]` internal link, including any link trail: letters
/// immediately after the `]]` extend the anchor text.
fn parse_internal_link(l: &str) -> Option<(usize, Vec<Token>)> {
    let mut pipe_pos = 0;
    let mut closed = false;
    let mut matching = 0;
    let mut trail_end = 0;
    for (idx, rv) in l.char_indices() {
        if idx < 2 {
            continue;
        }
        if matching == 0 {
            match rv {
                // A sentinel in the link name portion means this is not a
                // link after all.
                SENTINEL => {
                    if pipe_pos == 0 {
                        return None;
                    }
                }
                '[' => {
                    if idx == 2 || l.as_bytes().get(idx + 1) == Some(&b'[') {
                        return None;
                    }
                }
                ']' => {
                    if l.as_bytes().get(idx + 1) == Some(&b']') {
                        matching = idx;
                    }
                }
                '|' => {
                    if pipe_pos == 0 {
                        pipe_pos = idx;
                    }
                }
                _ => {}
            }
            continue;
        }
        if !closed {
            closed = true;
            continue;
        }
        if rv.is_alphabetic() {
            trail_end = idx + rv.len_utf8();
            continue;
        }
        break;
    }
    if !closed {
        return None;
    }

    let mut tokens = Vec::with_capacity(4);
    if pipe_pos == 0 {
        let mut inner = l[2..matching].to_string();
        if trail_end != 0 {
            inner += &l[matching + 2..trail_end];
        }
        tokens.push(Token::Link {
            link: canonical_form(&l[2..matching]),
        });
        tokens.push(Token::Text(inner));
    } else {
        let mut inner = l[pipe_pos + 1..matching].to_string();
        if trail_end != 0 {
            inner += &l[matching + 2..trail_end];
        }
        tokens.push(Token::Link {
            link: canonical_form(&l[2..pipe_pos]),
        });
        if pipe_pos + 1 < matching {
            tokens.extend(parse_inline(&inner, 0, inner.len()));
        }
    }
    tokens.push(Token::CloseLink);
    Some((if trail_end != 0 { trail_end } else { matching + 2 }, tokens))
}

/// Parses a `[url text]` external link. A nested `[[…]]` is tolerated and a
/// `</ref>` tag terminates the span.
fn parse_external_link(l: &str) -> Option<(usize, Vec<Token>)> {
    let mut space_pos = 0;
    let mut matching = 0;
    let mut end_pos = 0;
    let mut int_link_open = false;
    let mut skip_next = false;
    for (idx, rv) in l.char_indices() {
        if idx < 1 {
            continue;
        }
        if skip_next {
            skip_next = false;
            continue;
        }
        match rv {
            SENTINEL => {
                if space_pos == 0 {
                    return None;
                }
            }
            '[' => {
                if l.as_bytes().get(idx + 1) == Some(&b'[') {
                    int_link_open = true;
                }
            }
            ' ' => {
                if space_pos == 0 {
                    space_pos = idx;
                }
            }
            '<' => {
                if space_pos > 0
                    && let Some((_, tag, _, _)) = decode_html_tag(&l[idx..])
                    && tag == "/ref"
                {
                    matching = idx;
                    end_pos = idx;
                    break;
                }
            }
            ']' => {
                if int_link_open && l.as_bytes().get(idx + 1) == Some(&b']') {
                    int_link_open = false;
                    skip_next = true;
                    continue;
                }
                matching = idx;
                end_pos = idx + 1;
                break;
            }
            _ => {}
        }
    }
    if matching == 0 {
        return None;
    }

    let url = &l[1..if space_pos == 0 { matching } else { space_pos }];
    if !is_ext_link(url) {
        return None;
    }
    let mut tokens = vec![Token::ExtLink {
        url: url.to_string(),
    }];
    if space_pos != 0 && space_pos + 1 < matching {
        tokens.extend(parse_inline(l, space_pos + 1, matching));
    }
    tokens.push(Token::CloseExtLink);
    Some((end_pos, tokens))
}

/// Parses a `[[File:…|…|…]]` link. All pipe segments except the last are
/// collected as-is; the last is inline-parsed as the caption. One level of
/// nested `[[…]]` is tolerated.
fn parse_file_link(l: &str) -> Option<(usize, Vec<Token>)> {
    let mut pipe_pos: Vec<usize> = Vec::new();
    let mut closed = false;
    let mut matching = 0;
    let mut int_link_open = false;
    let mut skip_next = false;
    for (idx, rv) in l.char_indices() {
        if idx < 2 {
            continue;
        }
        if skip_next {
            skip_next = false;
            continue;
        }
        match rv {
            SENTINEL => {
                if pipe_pos.is_empty() {
                    return None;
                }
            }
            '[' => {
                if l.as_bytes().get(idx + 1) == Some(&b'[') {
                    int_link_open = true;
                    skip_next = true;
                }
            }
            ']' => {
                if l.as_bytes().get(idx + 1) == Some(&b']') {
                    if int_link_open {
                        int_link_open = false;
                        skip_next = true;
                        continue;
                    }
                    matching = idx;
                    closed = true;
                    break;
                }
            }
            '|' => {
                if !int_link_open {
                    pipe_pos.push(idx);
                }
            }
            _ => {}
        }
    }
    if !closed {
        return None;
    }

    let mut tokens = Vec::with_capacity(4);
    if pipe_pos.is_empty() {
        tokens.push(Token::FileLink {
            link: canonical_form(&l[2..matching]),
            pipes: Vec::new(),
        });
        tokens.push(Token::Text(l[2..matching].to_string()));
    } else {
        let mut pipes = Vec::with_capacity(pipe_pos.len() - 1);
        for pair in pipe_pos.windows(2) {
            pipes.push(l[pair[0] + 1..pair[1]].to_string());
        }
        tokens.push(Token::FileLink {
            link: canonical_form(&l[2..pipe_pos[0]]),
            pipes,
        });
        let last = pipe_pos[pipe_pos.len() - 1];
        if last + 1 < matching {
            tokens.extend(parse_inline(l, last + 1, matching));
        }
    }
    tokens.push(Token::CloseFileLink);
    Some((matching + 2, tokens))
}

/// Matches a `__NAME__` behavior switch at the start of `l`, returning its
/// length.
fn decode_behavior_switch(l: &str) -> Option<usize> {
    BEHAVIOR_SWITCH.find(l).map(|found| found.len())
}

/// Scans the bytes `[start, end)` of `l` into inline tokens, accumulating
/// pending text and flushing it whenever a structural construct matches.
pub(crate) fn parse_inline(l: &str, start: usize, end: usize) -> Vec<Token> {
    let mut nt = Vec::new();
    let mut t_start = start;
    let mut t_end = start;
    let mut pos = start;

    let mut flush = |nt: &mut Vec<Token>, t_start: usize, t_end: usize| {
        if t_end > t_start {
            nt.push(Token::Text(l[t_start..t_end].to_string()));
        }
    };

    while pos < end {
        let rv = l[pos..end].chars().next().unwrap();
        let rune_len = rv.len_utf8();
        match rv {
            '<' => {
                if let Some((e, tag, attr, self_closing)) = decode_html_tag(&l[pos..end]) {
                    pos += e;
                    flush(&mut nt, t_start, t_end);
                    nt.push(Token::Html {
                        tag,
                        attr,
                        self_closing,
                    });
                    t_start = pos;
                    t_end = pos;
                    continue;
                }
            }
            '[' => {
                if let Some((e, link_tokens)) = parse_link(&l[pos..end]) {
                    flush(&mut nt, t_start, t_end);
                    nt.extend(link_tokens);
                    pos += e;
                    t_start = pos;
                    t_end = pos;
                    continue;
                }
            }
            '_' => {
                if let Some(e) = decode_behavior_switch(&l[pos..end]) {
                    flush(&mut nt, t_start, t_end);
                    nt.push(Token::Magic {
                        name: l[pos..pos + e].to_string(),
                    });
                    pos += e;
                    t_start = pos;
                    t_end = pos;
                    continue;
                }
            }
            ' ' | '\t' | '\r' => {
                flush(&mut nt, t_start, t_end);
                nt.push(Token::Space);
                t_start = pos + rune_len;
            }
            '\'' => {
                flush(&mut nt, t_start, t_end);
                nt.push(Token::Quote);
                t_start = pos + rune_len;
            }
            ':' => {
                flush(&mut nt, t_start, t_end);
                nt.push(Token::Colon);
                t_start = pos + rune_len;
            }
            SENTINEL => {
                flush(&mut nt, t_start, t_end);
                // A stray marker byte in hostile input will not land on an
                // 8-byte rune boundary; the lookup failure downstream turns
                // it into a parse error instead of a panic.
                let mut sent_end = (pos + SENTINEL_LEN).min(end);
                while sent_end < end && !l.is_char_boundary(sent_end) {
                    sent_end += 1;
                }
                nt.push(Token::Special(l[pos..sent_end].to_string()));
                pos = sent_end;
                t_start = pos;
                t_end = pos;
                continue;
            }
            _ => {}
        }
        pos += rune_len;
        t_end = pos;
    }
    flush(&mut nt, t_start, t_end);
    nt
}

/// Finds the redirect target of a raw `#REDIRECT [[…]]` page, if it is one.
pub(crate) fn redirect_target(text: &str) -> Option<WikiLink> {
    if text.len() < 9 || !text.as_bytes()[..9].eq_ignore_ascii_case(b"#redirect") {
        return None;
    }
    let end = text.find('\n').unwrap_or(text.len());
    parse_inline(text, 9, end)
        .into_iter()
        .find_map(|token| match token {
            Token::Link { link } => Some(link),
            _ => None,
        })
}

/// A `----` line yields a rule plus inline tokens for any trailing text.
fn parse_hruler(l: &str) -> Vec<Token> {
    let mut pos = 0;
    for (i, rv) in l.char_indices() {
        if rv != '-' {
            pos = i;
            break;
        }
    }
    let mut nt = vec![Token::Hrule];
    if pos != 0 {
        nt.extend(parse_inline(l, pos, l.len()));
    }
    nt
}

/// Balances leading against trailing `=` runs to find the heading depth,
/// capped at six with the extra markers folded back into the content.
fn parse_heading_line(l: &str) -> Vec<Token> {
    let bytes = l.as_bytes();
    let mut pf = 0;
    let mut pl = 0;
    for (i, rv) in l.char_indices() {
        if rv == '=' {
            pl = i;
        }
    }
    loop {
        pf += 1;
        if pf == pl || bytes[pf] != b'=' {
            pf -= 1;
            break;
        }
        pl -= 1;
        if pf == pl || bytes[pl] != b'=' {
            pl += 1;
            pf -= 1;
            break;
        }
    }
    pf += 1;
    if pf > 6 {
        let diff = pf - 6;
        pf -= diff;
        pl += diff;
    }
    let mut nt = vec![Token::Heading(pf as u8)];
    nt.extend(parse_inline(l, pf, pl));
    nt
}

/// Emits one list-item token per leading marker character, then the inline
/// content.
fn parse_list_line(l: &str) -> Vec<Token> {
    let bytes = l.as_bytes();
    let mut nt = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        match ListMarker::from_byte(bytes[pos]) {
            Some(marker) => {
                nt.push(Token::ListItem(marker));
                pos += 1;
            }
            None => break,
        }
    }
    if pos < l.len() {
        nt.extend(parse_inline(l, pos, l.len()));
    }
    nt
}

/// Runs the whole front half of the pipeline: comment stripping, verbatim
/// extraction, template expansion, link normalization, line tokenization,
/// and placeholder resolution.
pub(crate) fn tokenize(
    text: &str,
    fetcher: &dyn PageFetcher,
    templates: &mut Vec<Template>,
) -> Result<Vec<Token>, ParseError> {
    let no_comments = preprocess::strip_comments(text);
    let (stripped, mut placeholders) = preprocess::extract_verbatim(&no_comments);
    let expanded =
        template::process_templates(&stripped, &mut placeholders, fetcher, templates);
    let normalized = preprocess::normalize_multiline_links(&expanded);

    let mut tokens = Vec::with_capacity(64);
    for line in normalized.split('\n') {
        match line_kind(line) {
            LineKind::Normal => tokens.extend(parse_inline(line, 0, line.len())),
            LineKind::Redirect => {
                tokens.push(Token::Redirect);
                tokens.extend(parse_inline(line, 9, line.len()));
            }
            LineKind::Hr => tokens.extend(parse_hruler(line)),
            LineKind::Heading => tokens.extend(parse_heading_line(line)),
            LineKind::List => tokens.extend(parse_list_line(line)),
            // Table markup is recognized but not tokenized.
            LineKind::Table => {}
            LineKind::WikiPre => {
                tokens.push(Token::WikiPre);
                tokens.extend(parse_inline(line, 1, line.len()));
            }
            LineKind::Blank => tokens.push(Token::Blank),
        }
        tokens.push(Token::Newline);
    }

    let mut special_count = 0;
    for token in &mut tokens {
        if let Token::Special(sentinel) = token {
            special_count += 1;
            match placeholders.get(sentinel.as_str()) {
                Some(resolved) => *token = resolved.clone(),
                None => return Err(ParseError::MissingSentinel),
            }
        }
    }
    if special_count != placeholders.len() {
        log::warn!(
            "{special_count} placeholder sentinels resolved but {} recorded",
            placeholders.len()
        );
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::NullFetcher;

    fn tokenize_str(text: &str) -> Vec<Token> {
        let mut templates = Vec::new();
        tokenize(text, &NullFetcher, &mut templates).unwrap()
    }

    #[test]
    fn line_kinds() {
        assert_eq!(line_kind(""), LineKind::Blank);
        assert_eq!(line_kind("#REDIRECT [[X]]"), LineKind::Redirect);
        assert_eq!(line_kind("----"), LineKind::Hr);
        assert_eq!(line_kind("==X=="), LineKind::Heading);
        assert_eq!(line_kind("* item"), LineKind::List);
        assert_eq!(line_kind("{| class"), LineKind::Table);
        assert_eq!(line_kind("|-"), LineKind::Table);
        assert_eq!(line_kind(" code"), LineKind::WikiPre);
        assert_eq!(line_kind("plain"), LineKind::Normal);
    }

    #[test]
    fn heading_depth_balances() {
        assert_eq!(parse_heading_line("==Heading==")[0], Token::Heading(2));
        assert_eq!(parse_heading_line("=a=")[0], Token::Heading(1));
        assert_eq!(
            parse_heading_line("========x========")[0],
            Token::Heading(6),
            "depth caps at six"
        );
    }

    #[test]
    fn html_tag_decoding() {
        let (e, tag, attr, closed) = decode_html_tag("<ref name=\"a>b\">x").unwrap();
        assert_eq!(e, 16);
        assert_eq!(tag, "ref");
        assert_eq!(attr, " name=\"a>b\"");
        assert!(!closed, "a quoted > must not end the tag");

        let (_, tag, _, closed) = decode_html_tag("<br />x").unwrap();
        assert_eq!(tag, "br");
        assert!(closed);

        let (_, tag, _, _) = decode_html_tag("</ref>").unwrap();
        assert_eq!(tag, "/ref");
    }

    #[test]
    fn internal_link_tokens() {
        let tokens = parse_inline("[[Foo|bar]]", 0, 11);
        assert_eq!(
            tokens,
            vec![
                Token::Link {
                    link: canonical_form("Foo")
                },
                Token::Text("bar".to_string()),
                Token::CloseLink,
            ]
        );
    }

    #[test]
    fn link_trail_extends_anchor_text() {
        let tokens = parse_inline("[[bus]]es stop", 0, 14);
        assert_eq!(tokens[0], Token::Link { link: canonical_form("bus") });
        assert_eq!(tokens[1], Token::Text("buses".to_string()));
        assert_eq!(tokens[2], Token::CloseLink);
        assert_eq!(tokens[3], Token::Space);
    }

    #[test]
    fn file_link_pipes() {
        let tokens = parse_inline("[[File:a.jpg|thumb|caption]]", 0, 28);
        match &tokens[0] {
            Token::FileLink { link, pipes } => {
                assert_eq!(link.namespace, "File");
                assert_eq!(link.page_name, "A.jpg");
                assert_eq!(pipes, &["thumb".to_string()]);
            }
            other => panic!("expected file link, got {other:?}"),
        }
        assert_eq!(tokens[1], Token::Text("caption".to_string()));
        assert_eq!(tokens[2], Token::CloseFileLink);
    }

    #[test]
    fn external_link_tokens() {
        let tokens = parse_inline("[http://x.example hello]", 0, 24);
        assert_eq!(
            tokens,
            vec![
                Token::ExtLink {
                    url: "http://x.example".to_string()
                },
                Token::Text("hello".to_string()),
                Token::CloseExtLink,
            ]
        );
    }

    #[test]
    fn non_url_bracket_is_text() {
        let tokens = parse_inline("[not a link]", 0, 12);
        assert!(
            tokens.iter().all(|t| !matches!(t, Token::ExtLink { .. })),
            "bracketed text without a URL prefix must stay text"
        );
    }

    #[test]
    fn behavior_switch() {
        let tokens = parse_inline("__NOTOC__x", 0, 10);
        assert_eq!(
            tokens[0],
            Token::Magic {
                name: "__NOTOC__".to_string()
            }
        );
        assert_eq!(tokens[1], Token::Text("x".to_string()));
    }

    #[test]
    fn verbatim_round_trip_through_sentinels() {
        let tokens = tokenize_str("a<nowiki>[[x]]</nowiki>b");
        assert!(
            tokens.contains(&Token::Nowiki {
                text: "[[x]]".to_string(),
                attr: String::new()
            }),
            "nowiki content must come back as a nowiki token: {tokens:?}"
        );
        assert!(!tokens.iter().any(|t| matches!(t, Token::Link { .. })));
    }

    #[test]
    fn newline_token_after_every_line() {
        let tokens = tokenize_str("a\nb");
        assert_eq!(
            tokens
                .iter()
                .filter(|t| matches!(t, Token::Newline))
                .count(),
            2
        );
        assert_eq!(tokens.last(), Some(&Token::Newline));
    }

    #[test]
    fn redirect_line_tokens() {
        let tokens = tokenize_str("#REDIRECT [[Foo]]");
        assert_eq!(tokens[0], Token::Redirect);
        assert!(tokens.contains(&Token::Link {
            link: canonical_form("Foo")
        }));
    }

    #[test]
    fn redirect_target_of_raw_text() {
        let target = redirect_target("#redirect [[Template:Real]]\nrest").unwrap();
        assert_eq!(target.namespace, "Template");
        assert_eq!(target.page_name, "Real");
        assert!(redirect_target("plain text").is_none());
    }

    #[test]
    fn album_line_token_shape() {
        let tokens = tokenize_str("* ''[[The Album (ABBA album)|''The Album'']]'' (1977)");
        assert_eq!(tokens[0], Token::ListItem(ListMarker::Bullet));
        let link = tokens
            .iter()
            .find_map(|t| match t {
                Token::Link { link } => Some(link),
                _ => None,
            })
            .expect("a link token");
        assert_eq!(link.namespace, "");
        assert_eq!(link.page_name, "The Album (ABBA album)");
        assert_eq!(
            tokens
                .iter()
                .filter(|t| matches!(t, Token::Quote))
                .count(),
            8
        );
    }
}
