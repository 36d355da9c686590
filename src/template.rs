//! Template discovery and recursive transclusion.
//!
//! Templates are located by pairing streaks of braces, nested by span
//! containment, and rendered post-order: children splice into their parent's
//! body before the parent's name and parameters are read. Transcluded pages
//! are fetched through the injected [`PageFetcher`] capability; fetch
//! failures and depth-cap hits render as empty strings and never abort the
//! parse.

use crate::{
    article::PageFetcher,
    preprocess::{self, PlaceholderMap, SENTINEL},
    title::canonical_form_in_namespace,
    token::Token,
    tokenize,
};
use regex::Regex;
use std::{collections::HashMap, sync::LazyLock};

/// The maximum template transclusion depth. Deeper calls render empty.
pub(crate) const MAX_TEMPLATE_DEPTH: usize = 4;

/// The maximum number of redirects followed for a single template lookup.
pub(crate) const MAX_REDIRECT_HOPS: usize = 4;

/// The classification of a template name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TemplateKind {
    /// An ordinary template, resolved through the page fetcher.
    Normal,
    /// A parser function or variable from the built-in tables.
    Magic,
    /// A `#`-prefixed extension call.
    Ext,
    /// A `{{{…}}}` parameter reference.
    Param,
}

/// A record of one top-level template use in an article.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Template {
    /// The template classification.
    pub kind: TemplateKind,
    /// The template name. For [`TemplateKind::Magic`] and
    /// [`TemplateKind::Ext`] this is the part before the first `:`.
    pub name: String,
    /// The text after the first `:` in the name, for magic and extension
    /// templates.
    pub attr: String,
    /// The parameter map: positional parameters are keyed `"1"`, `"2"`, …;
    /// named parameters by their trimmed names.
    pub parameters: HashMap<String, String>,
}

/// Parser function names recognized by the classifier, lowercased.
static PARSER_FUNCTIONS: phf::Set<&'static str> = phf::phf_set! {
    "displaytitle", "formatdate", "int", "namespace", "pagesinnamespace",
    "speciale", "special", "tag",
    "anchorencode", "basepagenamee", "basepagename", "canonicalurle",
    "canonicalurl", "cascadingsources", "defaultsort", "filepath",
    "formatnum", "fullpagenamee", "fullpagename", "fullurle",
    "fullurl", "gender", "grammar", "language",
    "lcfirst", "lc", "localurle", "localurl",
    "namespacee", "namespacenumber", "nse", "ns",
    "numberingroup", "numberofactiveusers", "numberofadmins", "numberofarticles",
    "numberofedits", "numberoffiles", "numberofpages", "numberofusers",
    "numberofviews", "padleft", "padright", "pageid",
    "pagenamee", "pagename", "pagesincategory", "pagesize",
    "plural", "protectionlevel", "revisionday2", "revisionday",
    "revisionid", "revisionmonth1", "revisionmonth", "revisiontimestamp",
    "revisionuser", "revisionyear", "rootpagenamee", "rootpagename",
    "subjectpagenamee", "subjectpagename", "subjectspacee", "subjectspace",
    "subpagenamee", "subpagename", "talkpagenamee", "talkpagename",
    "talkspacee", "talkspace", "ucfirst", "uc",
    "urlencode",
};

/// Variable names recognized by the classifier, lowercased.
static VARIABLES: phf::Set<&'static str> = phf::phf_set! {
    "articlepath", "basepagenamee", "basepagename", "cascadingsources",
    "contentlanguage", "currentday2", "currentdayname", "currentday",
    "currentdow", "currenthour", "currentmonth1", "currentmonthabbrev",
    "currentmonthnamegen", "currentmonthname", "currentmonth",
    "currenttimestamp", "currenttime", "currentversion", "currentweek",
    "currentyear", "directionmark", "fullpagenamee", "fullpagename",
    "localday2", "localdayname", "localday", "localdow", "localhour",
    "localmonth1", "localmonthabbrev", "localmonthnamegen", "localmonthname",
    "localmonth", "localtimestamp", "localtime", "localweek", "localyear",
    "namespacee", "namespacenumber", "namespace", "numberofactiveusers",
    "numberofadmins", "numberofarticles", "numberofedits", "numberoffiles",
    "numberofpages", "numberofusers", "numberofviews", "pageid",
    "pagenamee", "pagename", "revisionday2", "revisionday", "revisionid",
    "revisionmonth1", "revisionmonth", "revisionsize", "revisiontimestamp",
    "revisionuser", "revisionyear", "rootpagenamee", "rootpagename",
    "scriptpath", "servername", "server", "sitename", "stylepath",
    "subjectpagenamee", "subjectpagename", "subjectspacee", "subjectspace",
    "subpagenamee", "subpagename", "talkpagenamee", "talkpagename",
    "talkspacee", "talkspace",
};

static NOINCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<noinclude>.*?(?:</noinclude>|\z)").unwrap());
static INCLUDEONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<includeonly>(.*?)(?:</includeonly>|\z)").unwrap());

/// Classifies a template name per the built-in tables: the lowercased,
/// trimmed part before the first `:` selects `magic`; otherwise a leading
/// `#` selects `ext`; everything else is a normal template.
pub(crate) fn classify(name: &str) -> TemplateKind {
    let trimmed = name.trim();
    let base = match name.find(':') {
        Some(index) if index > 0 => name[..index].trim(),
        _ => trimmed,
    };
    let base = base.to_lowercase();
    if PARSER_FUNCTIONS.contains(base.as_str()) || VARIABLES.contains(base.as_str()) {
        TemplateKind::Magic
    } else if trimmed.starts_with('#') {
        TemplateKind::Ext
    } else {
        TemplateKind::Normal
    }
}

/// A template span discovered by brace pairing, in byte offsets of the text
/// it was found in. Spans include their braces.
#[derive(Debug)]
struct TemplateSpan {
    /// Start of the span.
    b: usize,
    /// End of the span (exclusive).
    e: usize,
    /// True for a `{{{…}}}` parameter reference.
    is_param: bool,
    /// Direct children, as arena indices, ordered by start offset.
    children: Vec<usize>,
    /// The rendered replacement text, set post-order.
    rendered: Option<String>,
}

/// A run of consecutive `{` or `}` of length at least two.
struct Streak {
    opening: bool,
    length: usize,
    b: usize,
    e: usize,
}

/// Finds runs of two or more consecutive braces.
fn find_curly_streaks(text: &str) -> Vec<Streak> {
    let mut out = Vec::new();
    let mut found = '.';
    let mut beg = 0;
    for (i, c) in text.char_indices() {
        if c != found {
            if i - beg > 1 && (found == '{' || found == '}') {
                out.push(Streak {
                    opening: found == '{',
                    length: i - beg,
                    b: beg,
                    e: i,
                });
            }
            beg = i;
            found = c;
        }
    }
    if beg + 1 < text.len() && (found == '{' || found == '}') {
        out.push(Streak {
            opening: found == '{',
            length: text.len() - beg,
            b: beg,
            e: text.len(),
        });
    }
    out
}

/// Pairs brace streaks into template spans and nests them by containment.
///
/// Returns the span arena and the indices of the top-level spans in start
/// order.
fn find_templates(text: &str) -> (Vec<TemplateSpan>, Vec<usize>) {
    let mut streaks = find_curly_streaks(text);

    // Each closing streak pairs with the nearest unpaired opening streak to
    // its left. Both sides give up two braces, or three when both have
    // three or more, which makes a parameter reference. Remainders can pair
    // again.
    let mut spans = Vec::new();
    let mut i = 0;
    while i < streaks.len() {
        if !streaks[i].opening && streaks[i].length > 1 {
            let mut found = false;
            for j in (0..i).rev() {
                if streaks[j].opening && streaks[j].length > 1 {
                    found = true;
                    let (n, is_param) = if streaks[i].length > 2 && streaks[j].length > 2 {
                        (3, true)
                    } else {
                        (2, false)
                    };
                    spans.push(TemplateSpan {
                        b: streaks[j].e - n,
                        e: streaks[i].b + n,
                        is_param,
                        children: Vec::new(),
                        rendered: None,
                    });
                    streaks[i].length -= n;
                    streaks[i].b += n;
                    streaks[j].length -= n;
                    streaks[j].e -= n;
                    break;
                }
            }
            if found {
                continue;
            }
        }
        i += 1;
    }
    spans.sort_by_key(|span| span.b);

    // A span starting inside the last committed top-level span becomes a
    // child of its innermost enclosing span.
    let mut top = Vec::new();
    let mut cur_end = 0;
    for i in 0..spans.len() {
        if spans[i].b >= cur_end {
            cur_end = spans[i].e;
            top.push(i);
        } else {
            for j in (0..i).rev() {
                if spans[j].e > spans[i].e {
                    spans[j].children.push(i);
                    break;
                }
            }
        }
    }
    (spans, top)
}

/// The position of one `|` separator inside a template span, with the first
/// `=` that followed it, in byte offsets.
#[derive(Clone, Copy, Debug)]
struct ParamPos {
    pipe: usize,
    equals: Option<usize>,
}

/// Finds parameter separators inside a template span, skipping child spans
/// and pipes inside `[[…]]` links.
fn find_param_positions(text: &str, spans: &[TemplateSpan], idx: usize) -> Vec<ParamPos> {
    let t = &spans[idx];
    let mut out: Vec<ParamPos> = Vec::new();
    let mut in_link = false;
    let mut last_open = false;
    let mut last_close = false;
    for (i, c) in text[t.b..t.e].char_indices() {
        let pos = i + t.b;
        let in_child = t.children.iter().any(|&kid| {
            let child = &spans[kid];
            pos >= child.b && pos < child.e
        });
        let mut open = false;
        let mut close = false;
        if !in_child {
            match c {
                '[' => {
                    if last_open {
                        in_link = true;
                    }
                    open = true;
                }
                ']' => {
                    if last_close {
                        in_link = false;
                    }
                    close = true;
                }
                '|' if !in_link => out.push(ParamPos {
                    pipe: pos,
                    equals: None,
                }),
                '=' if !in_link => {
                    if let Some(last) = out.last_mut()
                        && last.equals.is_none()
                    {
                        last.equals = Some(pos);
                    }
                }
                _ => {}
            }
        }
        last_open = open;
        last_close = close;
    }
    out
}

/// What a rendered template turned out to be, for descriptor recording.
enum Rendered {
    /// A `{{{…}}}` parameter reference.
    Parameter {
        name: String,
    },
    Call {
        name: String,
        parameters: HashMap<String, String>,
    },
}

/// Renders the span at `idx` post-order: children first, then the span
/// itself, leaving the result in the arena.
fn render_inner(
    text: &str,
    spans: &mut Vec<TemplateSpan>,
    idx: usize,
    params: &HashMap<String, String>,
    fetcher: &dyn PageFetcher,
    depth: usize,
) -> Rendered {
    let kids = spans[idx].children.clone();
    for kid in kids {
        if spans[kid].rendered.is_none() {
            render_inner(text, spans, kid, params, fetcher, depth);
        }
    }

    let positions = find_param_positions(text, spans, idx);
    let n = if spans[idx].is_param { 3 } else { 2 };

    // Splice rendered children into the span body and carry the separator
    // positions over to body offsets.
    let (b, e) = (spans[idx].b, spans[idx].e);
    let mut body = String::with_capacity(e - b);
    let mut last = b;
    for &kid in &spans[idx].children {
        let child = &spans[kid];
        body += &text[last..child.b];
        body += child.rendered.as_deref().unwrap_or("");
        last = child.e;
    }
    body += &text[last..e];

    let map_pos = |p: usize| {
        let mut delta = 0isize;
        for &kid in &spans[idx].children {
            let child = &spans[kid];
            if child.e <= p {
                delta += child.rendered.as_deref().unwrap_or("").len() as isize
                    - (child.e - child.b) as isize;
            }
        }
        usize::try_from(p as isize - b as isize + delta).unwrap_or(0)
    };
    let pipes: Vec<ParamPos> = positions
        .iter()
        .map(|pos| ParamPos {
            pipe: map_pos(pos.pipe),
            equals: pos.equals.map(|p| map_pos(p)),
        })
        .collect();
    let terminator = body.len() - n;

    let name = if let Some(first) = pipes.first() {
        body[n..first.pipe].trim().to_string()
    } else {
        body[n..terminator].trim().to_string()
    };

    if spans[idx].is_param {
        let rendered = if let Some(value) = params.get(&name) {
            value.clone()
        } else if pipes.is_empty() {
            format!("{{{{{{{name}}}}}}}")
        } else {
            body[pipes[0].pipe + 1..terminator].to_string()
        };
        spans[idx].rendered = Some(rendered);
        return Rendered::Parameter { name };
    }

    let mut parameters = HashMap::with_capacity(pipes.len());
    for (i, pos) in pipes.iter().enumerate() {
        let next = pipes.get(i + 1).map_or(terminator, |pos| pos.pipe);
        match pos.equals {
            Some(eq) => {
                parameters.insert(
                    body[pos.pipe + 1..eq].trim().to_string(),
                    body[eq + 1..next].trim().to_string(),
                );
            }
            None => {
                parameters.insert(
                    (i + 1).to_string(),
                    body[pos.pipe + 1..next].trim().to_string(),
                );
            }
        }
    }

    let rendered = render_recursive(&name, &parameters, fetcher, depth + 1);
    spans[idx].rendered = Some(rendered);
    Rendered::Call { name, parameters }
}

/// Renders one template call by classification: magic and extension calls
/// render empty, normal templates resolve through the fetcher under the
/// `Template` namespace.
fn render_recursive(
    name: &str,
    params: &HashMap<String, String>,
    fetcher: &dyn PageFetcher,
    depth: usize,
) -> String {
    if depth > MAX_TEMPLATE_DEPTH {
        return String::new();
    }
    match classify(name) {
        TemplateKind::Magic | TemplateKind::Ext | TemplateKind::Param => String::new(),
        TemplateKind::Normal => {
            let link = canonical_form_in_namespace(name, "Template");
            match fetcher.fetch(&link) {
                Ok(body) => transclude(&body, params, fetcher, depth),
                Err(err) => {
                    log::warn!("error retrieving template {name}: {err}");
                    String::new()
                }
            }
        }
    }
}

/// Expands all templates in a fetched template body with the given caller
/// parameters.
///
/// Redirect pages are followed up to [`MAX_REDIRECT_HOPS`] times, then
/// `<noinclude>` segments are dropped (or only `<includeonly>` segments
/// kept) before recursing into the body's own templates.
fn transclude(
    source: &str,
    params: &HashMap<String, String>,
    fetcher: &dyn PageFetcher,
    depth: usize,
) -> String {
    let mut source = source.to_string();
    let mut followed = 0;
    let stripped = loop {
        if followed > MAX_REDIRECT_HOPS {
            return String::new();
        }
        let stripped = preprocess::strip_comments(&source).into_owned();
        match tokenize::redirect_target(&stripped) {
            None => break stripped,
            Some(target) => match fetcher.fetch(&target) {
                Ok(next) => {
                    source = next;
                    followed += 1;
                }
                Err(err) => {
                    log::warn!("error following template redirect: {err}");
                    return String::new();
                }
            },
        }
    };
    let body = strip_noinclude(&stripped);

    let (mut spans, top) = find_templates(&body);
    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    for idx in top {
        render_inner(&body, &mut spans, idx, params, fetcher, depth);
        out += &body[last..spans[idx].b];
        out += spans[idx].rendered.as_deref().unwrap_or("");
        last = spans[idx].e;
    }
    out += &body[last..];
    out
}

/// Drops `<noinclude>` segments; if any `<includeonly>` segments exist,
/// keeps only their concatenation.
fn strip_noinclude(text: &str) -> String {
    let without = NOINCLUDE.replace_all(text, "");
    let mut only = String::new();
    let mut any = false;
    for captures in INCLUDEONLY.captures_iter(&without) {
        any = true;
        only += captures.get(1).unwrap().as_str();
    }
    if any { only } else { without.into_owned() }
}

/// Builds the descriptor recorded in the article's template list.
fn descriptor(rendered: Rendered) -> Template {
    match rendered {
        Rendered::Parameter { name } => Template {
            kind: TemplateKind::Param,
            name,
            attr: String::new(),
            parameters: HashMap::new(),
        },
        Rendered::Call { name, parameters } => {
            let kind = classify(&name);
            let (name, attr) = match kind {
                TemplateKind::Normal => (name.clone(), String::new()),
                _ => match name.find(':') {
                    Some(index) if index > 0 => (
                        name[..index].trim().to_string(),
                        name[index + 1..].trim().to_string(),
                    ),
                    _ => (name.clone(), String::new()),
                },
            };
            Template {
                kind,
                name,
                attr,
                parameters,
            }
        }
    }
}

/// Expands every top-level template in the article text, replacing each with
/// a `\x07tbNNNNN` / `\x07teNNNNN` sentinel pair around its rendered body,
/// and records a [`Template`] descriptor per top-level template.
pub(crate) fn process_templates(
    text: &str,
    placeholders: &mut PlaceholderMap,
    fetcher: &dyn PageFetcher,
    templates: &mut Vec<Template>,
) -> String {
    let (mut spans, top) = find_templates(text);
    let no_params = HashMap::new();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (i, idx) in top.into_iter().enumerate() {
        let begin = format!("{SENTINEL}tb{i:05}");
        let end = format!("{SENTINEL}te{i:05}");
        let rendered = render_inner(text, &mut spans, idx, &no_params, fetcher, 0);
        templates.push(descriptor(rendered));
        out += &text[last..spans[idx].b];
        out += &begin;
        out += spans[idx].rendered.as_deref().unwrap_or("");
        out += &end;
        last = spans[idx].e;
        placeholders.insert(begin, Token::TemplateBegin(i));
        placeholders.insert(end, Token::TemplateEnd(i));
    }
    out += &text[last..];
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::NullFetcher;

    /// A fetcher backed by a map of full page names to bodies.
    struct MapFetcher(HashMap<&'static str, &'static str>);

    impl PageFetcher for MapFetcher {
        fn fetch(
            &self,
            link: &crate::title::WikiLink,
        ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self
                .0
                .get(link.full_pagename().as_str())
                .map(|body| (*body).to_string())
                .unwrap_or_default())
        }
    }

    fn expand(text: &str, fetcher: &dyn PageFetcher) -> (String, Vec<Template>) {
        let mut placeholders = PlaceholderMap::new();
        let mut templates = Vec::new();
        let out = process_templates(text, &mut placeholders, fetcher, &mut templates);
        (out, templates)
    }

    #[test]
    fn streaks_need_two_braces() {
        let streaks = find_curly_streaks("a{b{{c}}d}e");
        assert_eq!(streaks.len(), 2);
        assert_eq!((streaks[0].b, streaks[0].e), (3, 5));
        assert_eq!((streaks[1].b, streaks[1].e), (6, 8));
    }

    #[test]
    fn triple_braces_make_a_parameter_reference() {
        let (spans, top) = find_templates("{{{x}}}");
        assert_eq!(top.len(), 1);
        assert!(spans[top[0]].is_param);
        assert_eq!((spans[top[0]].b, spans[top[0]].e), (0, 7));
    }

    #[test]
    fn nested_templates_become_children() {
        let (spans, top) = find_templates("{{a|{{b}}}}");
        assert_eq!(top.len(), 1);
        assert_eq!(spans[top[0]].children.len(), 1);
        let kid = spans[top[0]].children[0];
        assert_eq!((spans[kid].b, spans[kid].e), (4, 9));
    }

    #[test]
    fn pipes_inside_links_are_skipped() {
        let (spans, _) = find_templates("{{a|[[x|y]]|z}}");
        let positions = find_param_positions("{{a|[[x|y]]|z}}", &spans, 0);
        assert_eq!(positions.len(), 2, "the pipe inside [[…]] must not count");
        assert_eq!(positions[0].pipe, 3);
        assert_eq!(positions[1].pipe, 11);
    }

    #[test]
    fn parameter_defaulting() {
        let fetcher = MapFetcher(HashMap::from([("Template:T", "{{{x|d}}}")]));
        let (out, _) = expand("{{t|x=v}}", &fetcher);
        assert_eq!(out, "\x07tb00000v\x07te00000");
        let (out, _) = expand("{{t}}", &fetcher);
        assert_eq!(out, "\x07tb00000d\x07te00000");

        let fetcher = MapFetcher(HashMap::from([("Template:T", "{{{x}}}")]));
        let (out, _) = expand("{{t}}", &fetcher);
        assert_eq!(
            out, "\x07tb00000{{{x}}}\x07te00000",
            "a missing parameter with no default stays literal"
        );
    }

    #[test]
    fn positional_parameters_number_from_one() {
        let fetcher = MapFetcher(HashMap::from([("Template:Echo", "{{{1}}}")]));
        let (out, templates) = expand("{{echo|hi}}", &fetcher);
        assert_eq!(out, "\x07tb00000hi\x07te00000");
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "echo");
        assert_eq!(templates[0].kind, TemplateKind::Normal);
        assert_eq!(templates[0].parameters.get("1").map(String::as_str), Some("hi"));
    }

    #[test]
    fn self_transclusion_terminates() {
        let fetcher = MapFetcher(HashMap::from([("Template:Loop", "x{{loop}}")]));
        let (out, _) = expand("{{loop}}", &fetcher);
        assert_eq!(out, "\x07tb00000xxxx\x07te00000");
    }

    #[test]
    fn template_redirects_are_followed() {
        let fetcher = MapFetcher(HashMap::from([
            ("Template:Alias", "#REDIRECT [[Template:Real]]"),
            ("Template:Real", "body"),
        ]));
        let (out, _) = expand("{{alias}}", &fetcher);
        assert_eq!(out, "\x07tb00000body\x07te00000");
    }

    #[test]
    fn noinclude_and_includeonly() {
        assert_eq!(strip_noinclude("a<noinclude>b</noinclude>c"), "ac");
        assert_eq!(
            strip_noinclude("x<includeonly>a</includeonly>y<includeonly>b</includeonly>z"),
            "ab"
        );
        assert_eq!(strip_noinclude("a<noinclude>b"), "a");
    }

    #[test]
    fn classification() {
        assert_eq!(classify("PAGENAME"), TemplateKind::Magic);
        assert_eq!(classify("ns:2"), TemplateKind::Magic);
        assert_eq!(classify("#invoke:Foo"), TemplateKind::Ext);
        assert_eq!(classify("Infobox person"), TemplateKind::Normal);
    }

    #[test]
    fn magic_templates_render_empty_but_are_recorded() {
        let (out, templates) = expand("{{PAGENAME}}", &NullFetcher);
        assert_eq!(out, "\x07tb00000\x07te00000");
        assert_eq!(templates[0].kind, TemplateKind::Magic);
        assert_eq!(templates[0].name, "PAGENAME");
    }

    #[test]
    fn magic_attr_splits_after_colon() {
        let (_, templates) = expand("{{ns: 2 }}", &NullFetcher);
        assert_eq!(templates[0].kind, TemplateKind::Magic);
        assert_eq!(templates[0].name, "ns");
        assert_eq!(templates[0].attr, "2");
    }

    #[test]
    fn top_level_parameter_reference_is_recorded() {
        let (out, templates) = expand("{{{x}}}", &NullFetcher);
        assert_eq!(out, "\x07tb00000{{{x}}}\x07te00000");
        assert_eq!(templates[0].kind, TemplateKind::Param);
        assert_eq!(templates[0].name, "x");
    }
}
