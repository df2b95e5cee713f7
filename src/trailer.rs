//! Title / body / trailer split for task text.
//!
//! A trailer block is the last run of non-blank lines, provided a blank line
//! separates it from what comes before. Inside the block, `Key: Value` lines
//! (key made of ASCII letters, digits and `-`) are trailers; anything else is
//! a drop that callers can report.

use std::ops::Range;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trailer {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Message<'a> {
    lines: Vec<&'a str>,
    region: Option<Range<usize>>,
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'-')
}

/// Parse `Key: Value`. The key ends at the first colon; whitespace after the
/// colon is not part of the value.
pub fn parse_trailer(line: &str) -> Option<Trailer> {
    let (key, rest) = line.split_once(':')?;
    if !is_valid_key(key) {
        return None;
    }
    Some(Trailer {
        key: key.to_string(),
        value: rest.trim_start_matches([' ', '\t']).to_string(),
    })
}

fn trailer_region(lines: &[&str]) -> Option<Range<usize>> {
    let end = lines.iter().rposition(|l| !is_blank(l))? + 1;
    let blank = lines[..end].iter().rposition(|l| is_blank(l))?;
    Some(blank + 1..end)
}

impl<'a> Message<'a> {
    pub fn parse(text: &'a str) -> Self {
        let lines: Vec<&str> = text.split('\n').collect();
        let region = trailer_region(&lines);
        Self { lines, region }
    }

    pub fn title(&self) -> &'a str {
        self.lines.first().copied().map(str::trim).unwrap_or_default()
    }

    pub fn has_trailer_block(&self) -> bool {
        self.region.is_some()
    }

    pub fn details(&self) -> String {
        if self.lines.len() <= 1 {
            return String::new();
        }
        let end = self
            .region
            .as_ref()
            .map_or(self.lines.len(), |r| r.start);
        let body = &self.lines[1..end.max(1)];
        let Some(first) = body.iter().position(|l| !is_blank(l)) else {
            return String::new();
        };
        let last = body.iter().rposition(|l| !is_blank(l)).unwrap_or(first);
        body[first..=last].join("\n")
    }

    fn region_lines(&self) -> &[&'a str] {
        match &self.region {
            Some(r) => &self.lines[r.clone()],
            None => &[],
        }
    }

    pub fn trailers(&self) -> Vec<Trailer> {
        self.region_lines()
            .iter()
            .filter_map(|l| parse_trailer(l))
            .collect()
    }

    pub fn drops(&self) -> Vec<&'a str> {
        self.region_lines()
            .iter()
            .copied()
            .filter(|l| !is_blank(l) && parse_trailer(l).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED: &str = "Title\n\nBody line 1\nBody line 2\n\nCo-Authored-By: Jane <jane@example.com>\nReviewed-by: Bob <bob@example.com>\n";

    #[test]
    fn details_exclude_trailers() {
        let m = Message::parse(SIGNED);
        assert_eq!(m.title(), "Title");
        assert_eq!(m.details(), "Body line 1\nBody line 2");

        let trailers = m.trailers();
        assert_eq!(trailers.len(), 2);
        assert_eq!(trailers[0].key, "Co-Authored-By");
        assert_eq!(trailers[0].value, "Jane <jane@example.com>");
        assert_eq!(trailers[1].key, "Reviewed-by");
        assert_eq!(trailers[1].value, "Bob <bob@example.com>");
        assert!(m.drops().is_empty());
    }

    #[test]
    fn title_only() {
        let m = Message::parse("  Buy milk  ");
        assert_eq!(m.title(), "Buy milk");
        assert_eq!(m.details(), "");
        assert!(!m.has_trailer_block());
    }

    #[test]
    fn no_separating_blank_line_means_no_block() {
        let m = Message::parse("Title\nSigned-off-by: Me");
        assert!(!m.has_trailer_block());
        assert_eq!(m.details(), "Signed-off-by: Me");
        assert!(m.trailers().is_empty());
    }

    #[test]
    fn malformed_lines_are_dropped() {
        let m = Message::parse("Title\n\nBody\n\nFixes: #12\nnot a trailer\nBad Key: x\n\n\n");
        assert_eq!(m.details(), "Body");
        assert_eq!(
            m.trailers(),
            vec![Trailer {
                key: "Fixes".into(),
                value: "#12".into()
            }]
        );
        assert_eq!(m.drops(), vec!["not a trailer", "Bad Key: x"]);
    }

    #[test]
    fn last_paragraph_is_always_the_block() {
        let m = Message::parse("Title\n\nJust a second paragraph");
        assert!(m.has_trailer_block());
        assert_eq!(m.details(), "");
        assert_eq!(m.drops(), vec!["Just a second paragraph"]);
    }

    #[test]
    fn value_keeps_internal_colons() {
        let t = parse_trailer("Link:\thttps://example.com/a").unwrap();
        assert_eq!(t.key, "Link");
        assert_eq!(t.value, "https://example.com/a");
        assert!(parse_trailer(": empty key").is_none());
        assert!(parse_trailer("no colon here").is_none());
    }

    #[test]
    fn blank_lines_around_body_are_trimmed() {
        let m = Message::parse("Title\n\n\n  \nBody\n\n\nKey: v");
        assert_eq!(m.details(), "Body");
        assert_eq!(m.trailers().len(), 1);
    }
}
