//! Command detection.
//!
//! Classifies raw message text as a command invocation so the AI-response
//! path can stand down instead of double-handling. Detection is advisory:
//! it never executes anything itself, and it never suppresses the ambient
//! interjection or the platform's own command routing.

/// Known command set with its marker character.
#[derive(Debug, Clone)]
pub struct CommandSet {
    marker: char,
    names: Vec<String>,
}

impl CommandSet {
    pub fn new(marker: char, names: Vec<String>) -> Self {
        Self { marker, names }
    }

    /// Whether the text reads as an invocation of any known command.
    ///
    /// Two forms match:
    /// - prefix: marker + name at the start, name terminated by end of text
    ///   or whitespace (`!forget`, `!assign now`);
    /// - suffix (typo-tolerant): after stripping one trailing marker and
    ///   surrounding whitespace, the text equals a name case-insensitively
    ///   (`forget !`, `ASSIGN!`).
    pub fn is_invocation(&self, text: &str) -> bool {
        self.parse(text).is_some() || self.matches_suffix_form(text)
    }

    /// Parse a prefix-form invocation, returning the command name. This is
    /// the form the platform router actually executes; the suffix form only
    /// suppresses the AI response.
    pub fn parse<'a>(&'a self, text: &str) -> Option<&'a str> {
        let trimmed = text.trim();
        let rest = trimmed.strip_prefix(self.marker)?;
        self.names
            .iter()
            .find(|name| {
                rest.strip_prefix(name.as_str())
                    .is_some_and(|tail| tail.is_empty() || tail.starts_with(char::is_whitespace))
            })
            .map(String::as_str)
    }

    fn matches_suffix_form(&self, text: &str) -> bool {
        let trimmed = text.trim();
        let stripped = trimmed
            .strip_suffix(self.marker)
            .unwrap_or(trimmed)
            .trim();
        self.names
            .iter()
            .any(|name| stripped.eq_ignore_ascii_case(name))
    }
}
