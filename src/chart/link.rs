//! Shareable chhart.app link construction.
//!
//! A link has the shape `<origin>/#<kind>=<token>[&title=<title>]`, where the
//! token is produced by [`codec::encode`](super::codec::encode) and the
//! title is percent-encoded. Links are the only artefact the server
//! produces; nothing is stored.

use std::fmt;

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;

use super::codec;

/// Default origin for share links.
pub const DEFAULT_ORIGIN: &str = "https://chhart.app";

/// Characters left untouched when encoding a title.
///
/// Matches the unreserved set of JavaScript's `encodeURIComponent`, which the
/// web app uses to read the title back.
const TITLE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Diagram kinds understood by the web app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramKind {
    /// Indented outline flowchart.
    Flowchart,
    /// Weighted flow diagram.
    Sankey,
}

impl DiagramKind {
    /// Fragment key used in the share link.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flowchart => "flowchart",
            Self::Sankey => "sankey",
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single weighted edge of a Sankey diagram.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Flow {
    /// Source node name.
    pub source: String,
    /// Target node name.
    pub target: String,
    /// Flow magnitude.
    pub value: f64,
}

impl Flow {
    /// Creates a flow.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>, value: f64) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            value,
        }
    }
}

/// Builds share links against a fixed origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBuilder {
    origin: String,
}

impl LinkBuilder {
    /// Creates a builder for the given origin. Trailing slashes are dropped.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Self {
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the origin links are built against.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Builds a link for `content` of the given kind.
    #[must_use]
    pub fn build(&self, kind: DiagramKind, content: &str, title: Option<&str>) -> String {
        build_link(&self.origin, kind, content, title)
    }

    /// Builds a flowchart link.
    #[must_use]
    pub fn flowchart(&self, content: &str, title: Option<&str>) -> String {
        self.build(DiagramKind::Flowchart, content, title)
    }

    /// Builds a Sankey link from structured flows.
    #[must_use]
    pub fn sankey(&self, flows: &[Flow], title: Option<&str>) -> String {
        self.build(DiagramKind::Sankey, &sankey_source(flows), title)
    }
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN)
    }
}

/// Composes a share link.
///
/// The title is appended only when it is non-empty after trimming. Content
/// is not validated here; empty content yields an empty token.
#[must_use]
pub fn build_link(origin: &str, kind: DiagramKind, content: &str, title: Option<&str>) -> String {
    let token = codec::encode(content);
    let mut url = format!("{origin}/#{kind}={token}");

    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        url.push_str("&title=");
        url.extend(utf8_percent_encode(title, TITLE_ENCODE_SET));
    }

    url
}

/// Renders flows as Sankey outline source.
///
/// Flows are grouped under their source in first-seen order, each target on
/// its own `  [value=N] Target` line.
#[must_use]
pub fn sankey_source(flows: &[Flow]) -> String {
    let mut by_source: IndexMap<&str, Vec<&Flow>> = IndexMap::new();
    for flow in flows {
        by_source.entry(flow.source.as_str()).or_default().push(flow);
    }

    let mut lines = Vec::with_capacity(flows.len() + by_source.len());
    for (source, targets) in by_source {
        lines.push(source.to_string());
        for flow in targets {
            lines.push(format!("  [value={}] {}", js_number(flow.value), flow.target));
        }
    }

    lines.join("\n")
}

/// Formats a number the way the chhart.app editor prints it.
///
/// Plain decimals between `1e-6` and `1e21`, exponent form with an explicit
/// sign outside that range (`1e+21`, `1e-7`).
#[must_use]
pub fn js_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = value.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return value.to_string();
    }

    let exp = format!("{value:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flowchart_link_carries_kind_and_title() {
        let url = LinkBuilder::default().flowchart("Start\n  End", Some("Demo"));
        assert!(url.starts_with("https://chhart.app/#flowchart="));
        assert!(url.contains("flowchart="));
        assert!(url.ends_with("&title=Demo"));
    }

    #[test]
    fn token_decodes_to_content() {
        let url = build_link(DEFAULT_ORIGIN, DiagramKind::Flowchart, "A\n  B", None);
        let token = url.rsplit('=').next().unwrap();
        assert_eq!(codec::decode(token).unwrap(), "A\n  B");
    }

    #[test]
    fn blank_title_is_omitted() {
        let builder = LinkBuilder::default();
        assert!(!builder.flowchart("A", None).contains("title="));
        assert!(!builder.flowchart("A", Some("")).contains("title="));
        assert!(!builder.flowchart("A", Some("   ")).contains("title="));
    }

    #[test]
    fn title_is_percent_encoded() {
        let url = LinkBuilder::default().flowchart("A", Some("Q&A: 100% [draft]"));
        assert!(url.ends_with("&title=Q%26A%3A%20100%25%20%5Bdraft%5D"));
    }

    #[test]
    fn title_keeps_unreserved_marks() {
        let url = LinkBuilder::default().flowchart("A", Some("it's (v1.0)!"));
        assert!(url.ends_with("&title=it's%20(v1.0)!"));
    }

    #[test]
    fn empty_content_is_not_rejected() {
        let url = LinkBuilder::default().flowchart("", None);
        assert_eq!(url, "https://chhart.app/#flowchart=");
    }

    #[test]
    fn custom_origin_trailing_slash_is_dropped() {
        let builder = LinkBuilder::new("http://localhost:5173/");
        assert_eq!(builder.origin(), "http://localhost:5173");
        assert!(builder
            .flowchart("A", None)
            .starts_with("http://localhost:5173/#flowchart="));
    }

    #[test]
    fn sankey_groups_by_source_in_first_seen_order() {
        let flows = [
            Flow::new("Revenue", "Costs", 40.0),
            Flow::new("Costs", "Salaries", 25.0),
            Flow::new("Revenue", "Profit", 60.0),
        ];
        assert_eq!(
            sankey_source(&flows),
            "Revenue\n  [value=40] Costs\n  [value=60] Profit\nCosts\n  [value=25] Salaries"
        );
    }

    #[test]
    fn sankey_keeps_fractional_values() {
        let flows = [Flow::new("A", "B", 2.5)];
        assert_eq!(sankey_source(&flows), "A\n  [value=2.5] B");
    }

    #[test]
    fn budget_flow_link() {
        let flows = [
            Flow::new("Revenue", "Costs", 40.0),
            Flow::new("Revenue", "Profit", 60.0),
        ];
        let url = LinkBuilder::default().sankey(&flows, Some("Budget Flow"));

        assert!(url.contains("sankey="));
        assert!(url.contains("title=Budget%20Flow"));

        let token = url
            .split("sankey=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap();
        assert_eq!(
            codec::decode(token).unwrap(),
            "Revenue\n  [value=40] Costs\n  [value=60] Profit"
        );
    }

    #[test]
    fn kind_names() {
        assert_eq!(DiagramKind::Flowchart.to_string(), "flowchart");
        assert_eq!(DiagramKind::Sankey.as_str(), "sankey");
    }

    #[test]
    fn numbers_print_like_the_editor() {
        assert_eq!(js_number(1500.0), "1500");
        assert_eq!(js_number(250.5), "250.5");
        assert_eq!(js_number(0.000_001), "0.000001");
        assert_eq!(js_number(1e21), "1e+21");
        assert_eq!(js_number(1.5e22), "1.5e+22");
        assert_eq!(js_number(1e-7), "1e-7");
        assert_eq!(js_number(-0.0), "0");
    }

    #[test]
    fn sankey_values_use_exponent_form_when_huge() {
        let flows = [Flow {
            source: "A".to_string(),
            target: "B".to_string(),
            value: 1e21,
        }];
        assert_eq!(sankey_source(&flows), "A\n  [value=1e+21] B");
    }
}
