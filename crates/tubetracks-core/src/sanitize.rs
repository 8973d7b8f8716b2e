//! Filename derivation from item titles.
//!
//! Titles come straight from the remote service and can contain characters
//! that are unsafe in a path or a shell. Each of those characters is spelled
//! out as an uppercase token so that distinct titles stay distinct on disk.

/// Unsafe characters and the token each one is replaced with, in the order the
/// replacements are applied.
pub const REPLACEMENTS: [(char, &str); 7] = [
    ('\\', "BACKSLASH"),
    ('/', "SLASH"),
    ('|', "BAR"),
    ('"', "DQUOTE"),
    ('*', "STAR"),
    ('&', "AND"),
    ('?', "QSTNMRK"),
];

/// Map an item title to a filesystem-safe filename fragment.
///
/// Every character listed in [`REPLACEMENTS`] is replaced by its token; all
/// other characters, including non-ASCII ones, are kept as-is. The result is
/// neither trimmed nor truncated.
///
/// ```rust
/// use tubetracks_core::sanitize::sanitize;
///
/// assert_eq!(sanitize("AC/DC - Thunderstruck"), "ACSLASHDC - Thunderstruck");
/// ```
#[must_use]
pub fn sanitize(title: &str) -> String {
    REPLACEMENTS
        .iter()
        .fold(title.to_owned(), |acc, (unsafe_char, token)| {
            acc.replace(*unsafe_char, token)
        })
}
