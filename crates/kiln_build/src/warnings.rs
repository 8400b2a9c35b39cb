//! Detection of compiler warnings in build output.

use regex::Regex;
use std::sync::OnceLock;

const WARNING_SUMMARY: &str = r"`.*` \((lib|bin)\) generated [0-9]+ warnings?";

/// Returns true if `output` contains cargo's "generated N warnings" summary.
pub fn output_has_warnings(output: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(WARNING_SUMMARY).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(output))
}
