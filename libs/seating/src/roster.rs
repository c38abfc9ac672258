//! Roster ordering and speaker detection from chat history.

use serde::{Deserialize, Serialize};

use crate::config::SeatingConfig;

/// One entry of the host's chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Display name of the author.
    pub author: String,

    /// Written by the human user.
    #[serde(default)]
    pub is_user: bool,

    /// System/narration entry.
    #[serde(default)]
    pub is_system: bool,
}

impl ChatEntry {
    /// A message written by a character.
    pub fn character(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            is_user: false,
            is_system: false,
        }
    }

    /// A message written by the user.
    pub fn user(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            is_user: true,
            is_system: false,
        }
    }

    /// A system entry.
    pub fn system(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            is_user: false,
            is_system: true,
        }
    }

    /// Returns true if the entry was spoken by a character.
    pub fn is_character(&self) -> bool {
        !self.is_user && !self.is_system
    }
}

/// Build the ordered roster for a group.
///
/// Members that have spoken come first, most recent speaker first. Members
/// without history follow in membership order. Excluded, blank and duplicate
/// names are dropped.
pub fn order_roster<S: AsRef<str>>(
    members: &[S],
    history: &[ChatEntry],
    config: &SeatingConfig,
) -> Vec<String> {
    let eligible: Vec<&str> = members
        .iter()
        .map(|m| m.as_ref().trim())
        .filter(|m| !m.is_empty() && !config.is_excluded(m))
        .collect();

    let mut roster: Vec<String> = Vec::with_capacity(eligible.len());
    for entry in history.iter().rev().filter(|e| e.is_character()) {
        if roster.len() >= eligible.len() {
            break;
        }
        let author = entry.author.trim();
        if eligible.contains(&author) && !roster.iter().any(|n| n == author) {
            roster.push(author.to_string());
        }
    }

    for member in eligible {
        if !roster.iter().any(|n| n == member) {
            roster.push(member.to_string());
        }
    }

    roster
}

/// The newest character entry whose author is on the roster.
pub fn last_speaker<'a, S: AsRef<str>>(history: &'a [ChatEntry], roster: &[S]) -> Option<&'a str> {
    history
        .iter()
        .rev()
        .filter(|e| e.is_character())
        .map(|e| e.author.trim())
        .find(|author| roster.iter().any(|n| n.as_ref() == *author))
}

/// Author to highlight as "spoke last".
///
/// Only set when the newest non-system entry is a character entry by a name
/// that `is_visible` accepts; a trailing user message clears the highlight.
pub fn last_rendered_author<'a>(
    history: &'a [ChatEntry],
    is_visible: impl Fn(&str) -> bool,
) -> Option<&'a str> {
    let last = history.iter().rev().find(|e| !e.is_system)?;
    if last.is_user {
        return None;
    }
    let author = last.author.trim();
    is_visible(author).then_some(author)
}

/// Parse a comma-separated exclusion list into lowercased names.
pub fn parse_exclude_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(entries: &[(&str, bool)]) -> Vec<ChatEntry> {
        entries
            .iter()
            .map(|(author, is_user)| {
                if *is_user {
                    ChatEntry::user(*author)
                } else {
                    ChatEntry::character(*author)
                }
            })
            .collect()
    }

    #[test]
    fn test_order_roster_most_recent_speaker_first() {
        let members = ["Alice", "Bob", "Carol", "Dave"];
        let chat = history(&[
            ("Bob", false),
            ("You", true),
            ("Alice", false),
            ("Bob", false),
        ]);

        let roster = order_roster(&members, &chat, &SeatingConfig::default());
        assert_eq!(roster, vec!["Bob", "Alice", "Carol", "Dave"]);
    }

    #[test]
    fn test_order_roster_skips_strangers_and_system() {
        let members = ["Alice", "Bob"];
        let chat = vec![
            ChatEntry::character("Alice"),
            ChatEntry::character("Mallory"),
            ChatEntry::system("Bob"),
        ];

        let roster = order_roster(&members, &chat, &SeatingConfig::default());
        assert_eq!(roster, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_order_roster_drops_excluded_blank_and_duplicates() {
        let members = ["Alice", "carol", "", "Alice", "Bob"];
        let config = SeatingConfig::default().with_exclude(["Carol"]);

        let roster = order_roster(&members, &[], &config);
        assert_eq!(roster, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_last_speaker_ignores_users_and_non_members() {
        let chat = history(&[("Alice", false), ("Mallory", false), ("You", true)]);
        assert_eq!(last_speaker(&chat, &["Alice", "Bob"]), Some("Alice"));
        assert_eq!(last_speaker(&chat, &["Bob"]), None);
        assert_eq!(last_speaker::<&str>(&[], &[]), None);
    }

    #[test]
    fn test_last_rendered_author() {
        let visible = |n: &str| n == "Alice" || n == "Bob";

        let chat = vec![ChatEntry::character("Alice"), ChatEntry::system("narrator")];
        assert_eq!(last_rendered_author(&chat, visible), Some("Alice"));

        let chat = vec![ChatEntry::character("Alice"), ChatEntry::user("You")];
        assert_eq!(last_rendered_author(&chat, visible), None);

        let chat = vec![ChatEntry::character("Zed")];
        assert_eq!(last_rendered_author(&chat, visible), None);
    }

    #[test]
    fn test_parse_exclude_list() {
        assert_eq!(
            parse_exclude_list("Alice,  BOB , ,carol"),
            vec!["alice", "bob", "carol"]
        );
        assert!(parse_exclude_list("").is_empty());
    }
}
