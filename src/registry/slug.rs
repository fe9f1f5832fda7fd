//! Subdomain slugs.
//!
//! Generated slugs look like `brave-amber-otter-k3x9`: two adjectives, a noun
//! and a short random suffix. Every slug is a valid DNS label.

use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "ancient", "bold", "brave", "bright", "calm", "clever", "cosmic", "crisp", "curly",
    "dapper", "eager", "early", "fancy", "fast", "fluffy", "gentle", "giant", "glad", "golden",
    "happy", "hidden", "icy", "jolly", "kind", "late", "lively", "lucky", "mellow", "misty",
    "noble", "odd", "plain", "polite", "proud", "quick", "quiet", "rapid", "rusty", "shiny",
    "silent", "silver", "smooth", "sunny", "swift", "tidy", "vivid", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "beacon", "breeze", "canyon", "cedar", "comet", "coral", "crane", "delta", "ember",
    "falcon", "fern", "fjord", "garden", "glacier", "harbor", "heron", "island", "lagoon", "lantern",
    "maple", "meadow", "meteor", "moose", "nebula", "oasis", "orbit", "otter", "panda", "pebble",
    "pine", "planet", "prairie", "quartz", "raven", "reef", "river", "rocket", "sparrow", "summit",
    "thunder", "tiger", "tundra", "valley", "walrus", "willow", "yak", "zephyr",
];

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 4;

/// Maximum length of a DNS label.
pub const MAX_LABEL_LEN: usize = 63;

/// Generate a random subdomain slug.
pub fn generate_slug() -> String {
    let mut rng = rand::rng();

    let first = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let mut second = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    while second == first {
        second = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    }
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];

    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();

    format!("{}-{}-{}-{}", first, second, noun, suffix)
}

/// Check that `label` is a lowercase DNS label: `[a-z0-9]([a-z0-9-]*[a-z0-9])?`, at
/// most 63 bytes.
pub fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
        return false;
    }
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generated_slug_is_valid_label() {
        for _ in 0..200 {
            let slug = generate_slug();
            assert!(is_valid_label(&slug), "invalid slug: {}", slug);
            assert_eq!(slug.split('-').count(), 4);
        }
    }

    #[test]
    fn test_generated_slugs_rarely_repeat() {
        let slugs: HashSet<String> = (0..500).map(|_| generate_slug()).collect();
        assert!(slugs.len() >= 499);
    }

    #[test]
    fn test_is_valid_label() {
        assert!(is_valid_label("foo"));
        assert!(is_valid_label("a"));
        assert!(is_valid_label("my-app-2"));
        assert!(!is_valid_label(""));
        assert!(!is_valid_label("-foo"));
        assert!(!is_valid_label("foo-"));
        assert!(!is_valid_label("Foo"));
        assert!(!is_valid_label("foo.bar"));
        assert!(!is_valid_label("foo_bar"));
        assert!(!is_valid_label(&"a".repeat(64)));
        assert!(is_valid_label(&"a".repeat(63)));
    }
}
