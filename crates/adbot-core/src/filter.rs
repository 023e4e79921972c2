//! Content filter: banned words + link detection.
//!
//! Pure predicate: no state beyond the compiled pattern, no side effects,
//! safe to share across concurrent flows.

use regex::Regex;

/// Why a candidate text was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// Text contains a URL, t.me link, or @mention.
    Link,
    /// Text contains this banned word.
    BannedWord(String),
}

impl Violation {
    /// User-facing correction message.
    pub fn user_message(&self) -> String {
        match self {
            Violation::Link => "Links and mentions are not allowed in listings.".to_string(),
            Violation::BannedWord(w) => format!("The text contains a banned word: {w}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContentFilter {
    link_re: Regex,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFilter {
    pub fn new() -> Self {
        // URL schemes, www-prefixed and common bare domains, t.me links, and
        // @handle mentions (Telegram usernames are >= 5 chars).
        let link_re = Regex::new(
            r"(?ix)
              https?://
            | \bwww\.\S+
            | \bt\.me/
            | \b[a-z0-9-]+\.(?:com|net|org|io|me|ua|ru|info|biz)\b
            | @[a-z0-9_]{5,}
            ",
        )
        .expect("valid link regex");

        Self { link_re }
    }

    /// Check a candidate string against the link pattern and a banned-word
    /// list. Banned-word matching is case-insensitive substring match.
    pub fn check(&self, text: &str, banned_words: &[String]) -> Option<Violation> {
        if self.link_re.is_match(text) {
            return Some(Violation::Link);
        }

        let lowered = text.to_lowercase();
        for word in banned_words {
            if !word.is_empty() && lowered.contains(word.as_str()) {
                return Some(Violation::BannedWord(word.clone()));
            }
        }

        None
    }

    /// Link-only check, used by the group guard.
    pub fn has_link(&self, text: &str) -> bool {
        self.link_re.is_match(text)
    }
}
