// src/text/contacts.rs
use std::sync::LazyLock;

use regex::Regex;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("valid link pattern"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("valid email pattern"));

pub fn extract_links(text: &str) -> Vec<String> {
    unique_matches(&LINK_RE, text)
}

pub fn extract_emails(text: &str) -> Vec<String> {
    unique_matches(&EMAIL_RE, text)
}

fn unique_matches(re: &Regex, text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let value = m.as_str().to_string();
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
