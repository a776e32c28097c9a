use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// `@` followed by 3-16 word characters, the same shape usernames
    /// are registered under.
    static ref MENTION_RE: Regex = Regex::new(r"@(\w{3,16})").unwrap();
}

/// Pull candidate usernames out of free text, deduplicated in
/// first-seen order. Resolution against real users happens in one
/// batch lookup at the call site; names that do not resolve are
/// silently dropped there.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = vec![];

    for cap in MENTION_RE.captures_iter(text) {
        let name = &cap[1];
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }

    names
}

/// Rewrite every mention token to a profile anchor. Intentionally
/// decoupled from extraction: the link is rendered whether or not the
/// username exists, while recording only happens for resolved users.
pub fn linkify(text: &str) -> String {
    MENTION_RE
        .replace_all(text, "<a href=\"/profile/$1\">@$1</a>")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_dedupes_in_order() {
        let names = extract_mentions("@alice ping @bob, and again @alice");
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn ignores_too_short_and_too_long_tokens() {
        assert!(extract_mentions("@ab hello").is_empty());

        // 17 word characters: the pattern captures only the first 16.
        let names = extract_mentions("@abcdefghijklmnopq");
        assert_eq!(names, vec!["abcdefghijklmnop".to_string()]);
    }

    #[test]
    fn linkifies_unresolved_names_too() {
        assert_eq!(
            linkify("cc @nobody_real"),
            "cc <a href=\"/profile/nobody_real\">@nobody_real</a>"
        );
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(linkify("email me at x@y"), "email me at x@y");
        assert!(extract_mentions("no mentions here").is_empty());
    }
}
