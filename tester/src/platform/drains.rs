//! Text formats printed by the drain plugin and the listener app

use std::sync::LazyLock;

use regex::bytes::Regex;

/// Header line of `cf drains`.
pub const DRAIN_HEADER: &str = r"App\s+Drain\s+Type\s+URL\s+Use Agent";

/// A single-app drain row created by the drain scenarios.
pub const DRAIN_ROW: &str = r"LOG-EMITTER-1--[0-9a-f]{16}\s+some-drain-[0-9a-f]{19}\s+Logs\s+https://.+";

/// Line the listener app prints with its externally reachable address.
pub const ADDRESS_PATTERN: &str = r"ADDRESS: \|(.*)\|";

/// Message printed by `drain-space` for a name clash.
pub const DUPLICATE_DRAIN_MESSAGE: &str =
    "A drain with that name already exists. Use --drain-name to create a drain with a different name.";

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| Regex::new(ADDRESS_PATTERN).expect("address pattern"));

/// A named log-emitter drain row, wherever it sits in the listing.
pub fn drain_listing() -> Regex {
    Regex::new(DRAIN_ROW).expect("drain listing pattern")
}

/// Literal text as a pattern.
pub fn literal(text: &str) -> Regex {
    Regex::new(&regex::escape(text)).expect("escaped literal")
}

/// First `ADDRESS: |...|` value in `output`.
pub fn extract_address(output: &[u8]) -> Option<String> {
    ADDRESS
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainRow {
    pub app: String,
    pub drain: String,
    pub drain_type: String,
    pub url: String,
    pub use_agent: bool,
}

/// Rows of a `cf drains` listing, skipping everything up to the header.
pub fn parse_rows(output: &str) -> Vec<DrainRow> {
    let mut lines = output.lines();
    if !lines.by_ref().any(is_header) {
        return Vec::new();
    }

    lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [app, drain, drain_type, url, use_agent] => Some(DrainRow {
                    app: app.to_string(),
                    drain: drain.to_string(),
                    drain_type: drain_type.to_string(),
                    url: url.to_string(),
                    use_agent: *use_agent == "true",
                }),
                _ => None,
            }
        })
        .collect()
}

/// The listed row of drain `name`, if any.
pub fn find_row(output: &str, name: &str) -> Option<DrainRow> {
    parse_rows(output).into_iter().find(|row| row.drain == name)
}

/// Lines whose first column is exactly `app`. Space-drain apps appear there when drained.
pub fn rows_for_app<'a>(output: &'a str, app: &str) -> Vec<&'a str> {
    output
        .lines()
        .filter(|line| line.split_whitespace().next() == Some(app))
        .collect()
}

fn is_header(line: &str) -> bool {
    let fields: Vec<&str> = line.split_whitespace().collect();
    fields == ["App", "Drain", "Type", "URL", "Use", "Agent"]
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Getting drains in org o / space s as admin...\n\n\
App                                     Drain                          Type   URL                              Use Agent\n\
LOG-EMITTER-1--0123456789abcdef         some-drain-1545311520123456789 Logs   https://listener.example.com     false\n\
LOG-EMITTER-1--fedcba9876543210         agent-drain                    Logs   https-v3://listener.example.com  true\n";

    #[test]
    fn test_extract_address() {
        assert_eq!(
            extract_address(b"ADDRESS: |wss://foo.example.com|"),
            Some("wss://foo.example.com".to_string())
        );
        assert_eq!(
            extract_address(b"2024-01-01 [APP/PROC/WEB/0] OUT ADDRESS: |https://l.example.com|\n"),
            Some("https://l.example.com".to_string())
        );
        assert_eq!(extract_address(b"no address yet"), None);
    }

    #[test]
    fn test_drain_listing_matches_single_drain() {
        assert!(drain_listing().is_match(LISTING.as_bytes()));

        let agent_only = LISTING.replace("some-drain-1545311520123456789", "agent-drain-x");
        assert!(!drain_listing().is_match(agent_only.as_bytes()));
    }

    #[test]
    fn test_drain_listing_finds_row_below_other_drains() {
        let listing = "App                                     Drain                          Type   URL                              Use Agent\n\
LOG-EMITTER-1--aaaaaaaaaaaaaaaa         cf-drain-7d1c0a2e              Logs   https://listener.example.com     false\n\
LOG-EMITTER-1--bbbbbbbbbbbbbbbb         some-drain-1545311520000000001 Logs   https-v3://listener.example.com  true\n\
LOG-EMITTER-1--0123456789abcdef         some-drain-1545311520123456789 Logs   https://listener.example.com     false\n";

        assert!(drain_listing().is_match(listing.as_bytes()));
    }

    #[test]
    fn test_find_row() {
        let row = find_row(LISTING, "agent-drain").unwrap();
        assert_eq!(row.app, "LOG-EMITTER-1--fedcba9876543210");
        assert!(row.use_agent);
        assert!(find_row(LISTING, "some-drain").is_none());
        assert!(find_row("No drains found", "agent-drain").is_none());
    }

    #[test]
    fn test_parse_rows() {
        let rows = parse_rows(LISTING);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].drain, "some-drain-1545311520123456789");
        assert_eq!(rows[0].drain_type, "Logs");
        assert!(!rows[0].use_agent);
        assert_eq!(rows[1].url, "https-v3://listener.example.com");
        assert!(rows[1].use_agent);

        assert!(parse_rows("No drains found").is_empty());
    }

    #[test]
    fn test_rows_for_app_matches_first_column_only() {
        let output = "space-drain-1  other  Logs  https://x  false\nLOG-EMITTER  space-drain-1  Logs  https://x  false\n";
        assert_eq!(rows_for_app(output, "space-drain-1").len(), 1);
        assert!(rows_for_app(output, "space-drain").is_empty());
    }

    #[test]
    fn test_literal_escapes_regex_syntax() {
        let pattern = literal(DUPLICATE_DRAIN_MESSAGE);
        assert!(pattern.is_match(DUPLICATE_DRAIN_MESSAGE.as_bytes()));
        assert!(!literal("a.c").is_match(b"abc"));
    }
}
