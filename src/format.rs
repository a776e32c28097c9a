use chrono::{TimeZone, Utc};
use regex::Regex;

use crate::mentions;
use crate::util;

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Body text as served to clients: escaped, mention tokens rewritten to
/// profile anchors, newlines turned into breaks. Mention linkification
/// is cosmetic and applies whether or not the name resolves.
pub fn render_body(body: &str) -> String {
    let escaped = html_escape(body);
    let linked = mentions::linkify(&escaped);
    linked
        .lines()
        .collect::<Vec<&str>>()
        .join("<br>")
}

/// Case-insensitive whole-token word filter, compiled once from the
/// configured list and applied before storage.
pub struct WordFilter {
    patterns: Vec<(Regex, String)>,
}

impl WordFilter {
    pub fn new(words: &[String]) -> WordFilter {
        let mut patterns = vec![];
        for word in words {
            if word.is_empty() {
                continue;
            }
            let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
            if let Ok(re) = Regex::new(&pattern) {
                patterns.push((re, "*".repeat(word.chars().count())));
            }
        }
        WordFilter { patterns }
    }

    pub fn censor(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (re, mask) in &self.patterns {
            out = re.replace_all(&out, mask.as_str()).into_owned();
        }
        out
    }
}

pub fn utc_timestamp(ts: u64) -> String {
    match Utc.timestamp_opt(ts.try_into().unwrap_or(0), 0) {
        chrono::LocalResult::Single(dt) => dt.to_string(),
        _ => String::from("unknown time"),
    }
}

const SECS_IN_YEAR: u64 = 365 * 24 * 60 * 60;
const SECS_IN_DAY: u64 = 24 * 60 * 60;
const SECS_IN_HOUR: u64 = 60 * 60;
const SECS_IN_MIN: u64 = 60;

pub fn humanise_time(ts: u64) -> String {
    let cur_ts = util::timestamp();
    let delta = cur_ts.saturating_sub(ts);

    let years = delta / SECS_IN_YEAR;
    if years == 1 {
        return String::from("1 year ago");
    } else if years > 1 {
        return format!("{} years ago", years);
    }

    let days = delta / SECS_IN_DAY;
    if days == 1 {
        return String::from("1 day ago");
    } else if days > 1 {
        return format!("{} days ago", days);
    }

    let hours = delta / SECS_IN_HOUR;
    if hours == 1 {
        return String::from("1 hour ago");
    } else if hours > 1 {
        return format!("{} hours ago", hours);
    }

    let mins = delta / SECS_IN_MIN;
    if mins == 1 {
        return String::from("1 minute ago");
    } else if mins > 1 {
        return format!("{} minutes ago", mins);
    }

    String::from("less than a minute ago")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        assert_eq!(
            html_escape("<b>&\"quote\"</b>"),
            "&lt;b&gt;&amp;&quot;quote&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn renders_body_with_breaks_and_links() {
        let html = render_body("hi @steve_77\nsecond <line>");
        assert_eq!(
            html,
            "hi <a href=\"/profile/steve_77\">@steve_77</a><br>second &lt;line&gt;"
        );
    }

    #[test]
    fn censors_whole_words_only() {
        let filter = WordFilter::new(&[String::from("grief")]);
        assert_eq!(filter.censor("no Grief here"), "no ***** here");
        assert_eq!(filter.censor("griefing stays"), "griefing stays");
    }

    #[test]
    fn humanise_handles_future_timestamps() {
        let future = util::timestamp() + 500;
        assert_eq!(humanise_time(future), "less than a minute ago");
    }
}
