//! Parser error types.

use thiserror::Error;

/// A fatal parsing error.
///
/// The article that produced one of these is abandoned in a partially
/// populated state; recoverable conditions (failed template fetches, depth
/// caps, tolerable HTML mismatches) are logged instead and never surface
/// here.
#[derive(Debug, Error)]
pub enum ParseError {
    /// An opening internal-link token had no matching close at its nesting
    /// depth.
    #[error("unmatched link token for link: {page} namespace: {namespace}")]
    UnmatchedLink {
        /// The canonicalized page name of the offending link.
        page: String,
        /// The canonicalized namespace of the offending link.
        namespace: String,
    },

    /// An opening file-link token had no matching close at its nesting depth.
    #[error("unmatched file link token for link: {page} namespace: {namespace}")]
    UnmatchedFileLink {
        /// The canonicalized page name of the offending link.
        page: String,
        /// The canonicalized namespace of the offending link.
        namespace: String,
    },

    /// An opening external-link token had no matching close.
    #[error("unmatched external link token for url: {url}")]
    UnmatchedExtLink {
        /// The target URL of the offending link.
        url: String,
    },

    /// A close-link token appeared with no open link in scope.
    #[error("unmatched close link token")]
    UnmatchedCloseLink,

    /// A close-file-link token appeared with no open file link in scope.
    #[error("unmatched close file link token")]
    UnmatchedCloseFileLink,

    /// A close-external-link token appeared with no open external link in
    /// scope.
    #[error("unmatched close external link token")]
    UnmatchedCloseExtLink,

    /// A heading token ran to the end of the stream without a newline.
    #[error("no newline after heading")]
    UnterminatedHeading,

    /// A template marker token referenced an index outside the template list.
    #[error("template index {0} out of range")]
    TemplateIndexOutOfRange(usize),

    /// A sentinel survived tokenization but had no entry in the placeholder
    /// map.
    #[error("placeholder sentinel not in map")]
    MissingSentinel,

    /// More than the tolerated number of inner HTML scopes failed to parse.
    #[error("too many malformed HTML scopes")]
    HtmlErrorBudgetExhausted,

    /// The tree builder failed to advance its cursor.
    #[error("parsing issue: cursor stalled")]
    Stalled,

    /// A token kind reached the tree builder that it has no rule for.
    #[error("unrecognized token kind: {0}")]
    UnrecognizedToken(&'static str),
}
