//! Resolution of `''` / `'''` / `'''''` apostrophe runs into balanced bold
//! and italic markers.
//!
//! The machine walks the token stream counting consecutive quote tokens and
//! flushes each run when a non-quote token (or the end of the stream)
//! arrives. Emphasis state is saved and reset at link openers and restored
//! at the matching close, and every newline closes out whatever is open, so
//! no emphasis leaks across lines or link boundaries.

use crate::token::Token;

/// The current emphasis state: nothing, italic, bold, bold-inside-italic,
/// or italic-inside-bold.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    None,
    I,
    B,
    Ib,
    Bi,
}

/// An emphasis marker token. Closing markers carry a leading `/` in the tag
/// name, matching what the tree builder expects of HTML tokens.
fn html(tag: &str) -> Token {
    Token::Html {
        tag: tag.to_string(),
        attr: String::new(),
        self_closing: false,
    }
}

/// A run of two apostrophes toggles italics.
fn toggle_italic(state: State, out: &mut Vec<Token>) -> State {
    match state {
        State::B => {
            out.push(html("i"));
            State::Bi
        }
        State::I => {
            out.push(html("/i"));
            State::None
        }
        State::Bi => {
            out.push(html("/i"));
            State::B
        }
        State::Ib => {
            out.push(html("/b"));
            out.push(html("/i"));
            out.push(html("b"));
            State::B
        }
        State::None => {
            out.push(html("i"));
            State::I
        }
    }
}

/// A run of three (or four, with a literal apostrophe emitted first)
/// toggles bold.
fn toggle_bold(state: State, out: &mut Vec<Token>) -> State {
    match state {
        State::B => {
            out.push(html("/b"));
            State::None
        }
        State::I => {
            out.push(html("b"));
            State::Ib
        }
        State::Ib => {
            out.push(html("/b"));
            State::I
        }
        State::Bi => {
            out.push(html("/i"));
            out.push(html("/b"));
            out.push(html("i"));
            State::I
        }
        State::None => {
            out.push(html("b"));
            State::B
        }
    }
}

/// A run of five or more toggles both, with surplus apostrophes emitted as
/// literal text.
fn toggle_both(state: State, out: &mut Vec<Token>) -> State {
    match state {
        State::B => {
            out.push(html("/b"));
            out.push(html("i"));
            State::I
        }
        State::I => {
            out.push(html("/i"));
            out.push(html("b"));
            State::B
        }
        State::Ib => {
            out.push(html("/b"));
            out.push(html("/i"));
            State::None
        }
        State::Bi => {
            out.push(html("/i"));
            out.push(html("/b"));
            State::None
        }
        State::None => {
            out.push(html("b"));
            out.push(html("i"));
            State::Bi
        }
    }
}

/// Emits the closing markers for whatever is open.
fn close_out(state: State, out: &mut Vec<Token>) {
    match state {
        State::B => out.push(html("/b")),
        State::I => out.push(html("/i")),
        State::Ib => {
            out.push(html("/b"));
            out.push(html("/i"));
        }
        State::Bi => {
            out.push(html("/i"));
            out.push(html("/b"));
        }
        State::None => {}
    }
}

/// Rewrites the token stream, consuming `quote` tokens and emitting balanced
/// emphasis markers. Newline tokens pass through after closing out state.
pub(crate) fn resolve_quotes(tokens: Vec<Token>) -> Vec<Token> {
    let mut state = State::None;
    let mut save = State::None;
    let mut run = 0usize;
    let mut out = Vec::with_capacity(tokens.len());
    let last = tokens.len().wrapping_sub(1);

    for (ni, token) in tokens.iter().enumerate() {
        let is_quote = matches!(token, Token::Quote);
        if is_quote {
            run += 1;
        }
        if !is_quote || ni == last {
            match run {
                0 => {}
                1 => out.push(Token::Text("'".to_string())),
                2 => state = toggle_italic(state, &mut out),
                3 | 4 => {
                    if run == 4 {
                        out.push(Token::Text("'".to_string()));
                    }
                    state = toggle_bold(state, &mut out);
                }
                _ => {
                    if run > 5 {
                        out.push(Token::Text("'".repeat(run - 5)));
                    }
                    state = toggle_both(state, &mut out);
                }
            }
            run = 0;
        }

        if matches!(
            token,
            Token::Link { .. } | Token::ExtLink { .. } | Token::FileLink { .. }
        ) {
            save = state;
            close_out(state, &mut out);
            state = State::None;
            run = 0;
        }
        if matches!(
            token,
            Token::CloseLink | Token::CloseExtLink | Token::CloseFileLink
        ) {
            close_out(state, &mut out);
            state = save;
            save = State::None;
            run = 0;
        }

        let is_newline = matches!(token, Token::Newline);
        if !is_quote && !is_newline {
            out.push(token.clone());
        }
        if is_newline || ni == last {
            close_out(state, &mut out);
            state = State::None;
            run = 0;
            save = State::None;
        }
        if is_newline {
            out.push(token.clone());
        }
    }
    out
}
