//! Shell quoting and identifier checks shared by command builders.

/// Quote a string so that bash sees it as a single literal word.
///
/// ```
/// use scir_parsers::shell_escape;
/// assert_eq!(shell_escape("Mike O'Connor"), r"'Mike O'\''Connor'");
/// ```
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Strip the DRMAA host-less path marker (a leading `:`) from a path.
pub fn strip_drmaa_prefix(path: &str) -> &str {
    path.strip_prefix(':').unwrap_or(path)
}

/// A user or host name: alphanumeric start, then alphanumerics, dashes and dots.
pub fn is_simple_hostname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// A non-empty run of word characters (`[A-Za-z0-9_]+`).
pub fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
