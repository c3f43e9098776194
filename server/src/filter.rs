//! Content filter applied to crime and evidence text.
//!
//! Two operations: a banned-term predicate and a markup-stripping
//! sanitizer. Both are deliberately simple; the filter is a collaborator
//! the room consumes as a black box, not a moderation system.

use regex::Regex;

/// Terms rejected outright, matched case-insensitively on word
/// boundaries.
const BANNED_TERMS: &[&str] = &["badword1", "badword2", "spam", "toxic"];

pub struct ContentFilter {
    banned: Vec<Regex>,
    markup: Regex,
}

impl ContentFilter {
    pub fn new() -> Self {
        let banned = BANNED_TERMS
            .iter()
            .map(|term| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term)))
                    .expect("static banned-term pattern")
            })
            .collect();
        // Strips anything that looks like an HTML/markup tag.
        let markup = Regex::new(r"<[^>]*?>").expect("static markup pattern");
        Self { banned, markup }
    }

    /// True if the text contains none of the banned terms. Empty text
    /// is clean.
    pub fn is_clean(&self, text: &str) -> bool {
        self.banned.iter().all(|re| !re.is_match(text))
    }

    /// Removes markup tags from the text.
    pub fn sanitize(&self, text: &str) -> String {
        self.markup.replace_all(text, "").into_owned()
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}
