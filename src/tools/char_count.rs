//! The `count_characters` tool.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Arguments of `count_characters`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CountCharactersArgs {
    /// The draft text to measure
    pub text: String,
}

/// How a text measures against the message limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterCount {
    pub length: usize,
    pub within_limit: bool,
    pub requires_compression: bool,
    pub estimated_chunks_if_split: usize,
}

/// Measure `text` in characters against `limit`
pub fn count_characters(text: &str, limit: usize) -> CharacterCount {
    let length = text.chars().count();
    let limit = limit.max(1);
    let within_limit = length <= limit;
    CharacterCount {
        length,
        within_limit,
        requires_compression: !within_limit,
        estimated_chunks_if_split: length.div_ceil(limit).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_fits() {
        let count = count_characters("hello", 2000);
        assert_eq!(
            count,
            CharacterCount {
                length: 5,
                within_limit: true,
                requires_compression: false,
                estimated_chunks_if_split: 1,
            }
        );
    }

    #[test]
    fn long_text_needs_chunks() {
        let count = count_characters(&"a".repeat(5000), 2000);
        assert!(!count.within_limit);
        assert!(count.requires_compression);
        assert_eq!(count.estimated_chunks_if_split, 3);
    }

    #[test]
    fn exact_limit_is_within() {
        let count = count_characters(&"a".repeat(2000), 2000);
        assert!(count.within_limit);
        assert_eq!(count.estimated_chunks_if_split, 1);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(count_characters("héllo 🦀", 10).length, 7);
        assert_eq!(count_characters("", 10).estimated_chunks_if_split, 1);
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(count_characters("abc", 2)).unwrap();
        assert_eq!(value["withinLimit"], false);
        assert_eq!(value["estimatedChunksIfSplit"], 2);
    }
}
