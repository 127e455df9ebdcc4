//! Extraction of `<antArtifact>` blocks from assistant message text.
//!
//! Assistant replies embed two kinds of tagged regions:
//!
//! ```text
//! <antThinking>why an artifact is warranted</antThinking>
//! <antArtifact identifier="calc" type="application/vnd.ant.code" language="python" title="Calculator">
//! ...
//! </antArtifact>
//! ```
//!
//! Both tag kinds are scanned independently, merged back into document order,
//! and walked once. Each artifact picks up the nearest unconsumed thinking block
//! before it and a version number from a run-wide [`VersionTracker`].

use std::collections::HashMap;
use std::iter::Peekable;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static THINKING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<antThinking>(.*?)</antThinking>").unwrap());
static ARTIFACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<antArtifact\s+(.*?)>(.*?)</antArtifact>").unwrap());
static ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());

// ---------------------------------------------------------------------------
// Tag scanning
// ---------------------------------------------------------------------------

/// An `<antThinking>` region. `start` is the byte offset of the opening tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingMatch<'a> {
    pub start: usize,
    pub text: &'a str,
}

/// An `<antArtifact>` region with its raw, unparsed attribute string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactMatch<'a> {
    pub start: usize,
    pub attrs: &'a str,
    pub body: &'a str,
}

/// Lazily yields every thinking block in `text`, in offset order.
pub fn thinking_blocks(text: &str) -> impl Iterator<Item = ThinkingMatch<'_>> {
    THINKING_RE.captures_iter(text).filter_map(|caps| {
        Some(ThinkingMatch {
            start: caps.get(0)?.start(),
            text: caps.get(1)?.as_str(),
        })
    })
}

/// Lazily yields every artifact block in `text`, in offset order.
///
/// Bodies are matched non-greedily across newlines, so two artifacts in one
/// message stay separate. Nested artifact tags are not supported.
pub fn artifact_blocks(text: &str) -> impl Iterator<Item = ArtifactMatch<'_>> {
    ARTIFACT_RE.captures_iter(text).filter_map(|caps| {
        Some(ArtifactMatch {
            start: caps.get(0)?.start(),
            attrs: caps.get(1)?.as_str(),
            body: caps.get(2)?.as_str(),
        })
    })
}

// ---------------------------------------------------------------------------
// Interleaving
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag<'a> {
    Thinking(ThinkingMatch<'a>),
    Artifact(ArtifactMatch<'a>),
}

impl Tag<'_> {
    pub fn start(&self) -> usize {
        match self {
            Tag::Thinking(m) => m.start,
            Tag::Artifact(m) => m.start,
        }
    }
}

/// Merges two offset-ordered tag streams into one.
///
/// On equal offsets the artifact comes first. The two opening tags differ in
/// their fifth byte, so real input never produces a tie.
pub struct Interleave<T: Iterator, A: Iterator> {
    thinking: Peekable<T>,
    artifacts: Peekable<A>,
}

impl<T: Iterator, A: Iterator> Interleave<T, A> {
    pub fn new(thinking: T, artifacts: A) -> Self {
        Self {
            thinking: thinking.peekable(),
            artifacts: artifacts.peekable(),
        }
    }
}

impl<'a, T, A> Iterator for Interleave<T, A>
where
    T: Iterator<Item = ThinkingMatch<'a>>,
    A: Iterator<Item = ArtifactMatch<'a>>,
{
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let take_thinking = match (self.thinking.peek(), self.artifacts.peek()) {
            (Some(t), Some(a)) => t.start < a.start,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };
        if take_thinking {
            self.thinking.next().map(Tag::Thinking)
        } else {
            self.artifacts.next().map(Tag::Artifact)
        }
    }
}

/// All tags of `text` in document order.
pub fn scan(text: &str) -> impl Iterator<Item = Tag<'_>> {
    Interleave::new(thinking_blocks(text), artifact_blocks(text))
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Highest version handed out so far per `{conversation_id}-{identifier}`.
///
/// Lives for one conversion run. Versions depend on call order, so callers
/// must feed messages in conversation order.
#[derive(Debug, Default)]
pub struct VersionTracker {
    versions: HashMap<String, u32>,
}

impl VersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps and returns the counter for `key`. The first call yields 1.
    pub fn next_version(&mut self, key: &str) -> u32 {
        let version = self.versions.entry(key.to_owned()).or_insert(0);
        *version += 1;
        *version
    }
}

// ---------------------------------------------------------------------------
// Artifact building
// ---------------------------------------------------------------------------

/// The recognised `key="value"` attributes of an artifact tag.
/// Missing attributes are empty strings; unknown ones are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactAttributes {
    pub identifier: String,
    pub kind: String,
    pub language: String,
    pub title: String,
}

impl ArtifactAttributes {
    pub fn parse(raw: &str) -> Self {
        let mut attrs = Self::default();
        for caps in ATTR_RE.captures_iter(raw) {
            let (_, [key, value]) = caps.extract();
            let slot = match key {
                "identifier" => &mut attrs.identifier,
                "type" => &mut attrs.kind,
                "language" => &mut attrs.language,
                "title" => &mut attrs.title,
                _ => continue,
            };
            *slot = value.to_owned();
        }
        attrs
    }
}

/// One row of the `artifacts` table. Field order is column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// `{artifact}-{version}`, the primary key.
    pub id: String,
    /// `{conversation_id}-{identifier}`, shared by all versions.
    pub artifact: String,
    pub identifier: String,
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub language: String,
    pub title: String,
    pub content: String,
    pub thinking: Option<String>,
    pub conversation_id: String,
    pub message_id: String,
}

/// Extracts every artifact from one message, in document order.
///
/// A thinking block binds to the first artifact after it and is then spent;
/// a later thinking block replaces an unspent earlier one. Never fails:
/// malformed attributes come out as empty strings.
pub fn extract_artifacts(
    text: &str,
    conversation_id: &str,
    message_id: &str,
    versions: &mut VersionTracker,
) -> Vec<Artifact> {
    let mut thinking: Option<String> = None;
    let mut artifacts = Vec::new();

    for tag in scan(text) {
        match tag {
            Tag::Thinking(m) => {
                thinking = Some(m.text.trim())
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned);
            }
            Tag::Artifact(m) => {
                let attrs = ArtifactAttributes::parse(m.attrs);
                let artifact = format!("{}-{}", conversation_id, attrs.identifier);
                let version = versions.next_version(&artifact);
                artifacts.push(Artifact {
                    id: format!("{}-{}", artifact, version),
                    artifact,
                    identifier: attrs.identifier,
                    version,
                    kind: attrs.kind,
                    language: attrs.language,
                    title: attrs.title,
                    content: m.body.trim().to_owned(),
                    thinking: thinking.take(),
                    conversation_id: conversation_id.to_owned(),
                    message_id: message_id.to_owned(),
                });
            }
        }
    }

    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CALCS: &str = r#"Here you go.
<antThinking>A calculator is reusable, so it gets an artifact.</antThinking>
<antArtifact identifier="calc" type="application/vnd.ant.code" language="python" title="Calculator">
def add(a, b):
    return a + b
</antArtifact>
And a second revision:
<antArtifact identifier="calc" type="application/vnd.ant.code" language="python" title="Calculator v2">
def add(a, b):
    return b + a
</antArtifact>
"#;

    #[test]
    fn scanner_finds_multiline_regions_without_merging() {
        let artifacts: Vec<_> = artifact_blocks(TWO_CALCS).collect();
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts[0].attrs.contains(r#"title="Calculator""#));
        assert!(artifacts[0].body.contains("return a + b"));
        assert!(!artifacts[0].body.contains("return b + a"));
        assert!(artifacts[0].start < artifacts[1].start);

        let thinking: Vec<_> = thinking_blocks(TWO_CALCS).collect();
        assert_eq!(thinking.len(), 1);
        assert_eq!(
            thinking[0].text,
            "A calculator is reusable, so it gets an artifact."
        );
    }

    #[test]
    fn scanner_on_plain_text_is_empty() {
        assert_eq!(scan("no tags at all").count(), 0);
        assert_eq!(scan("<antArtifact identifier=\"x\">never closed").count(), 0);
    }

    #[test]
    fn interleave_orders_by_offset() {
        let text = "<antArtifact identifier=\"a\">1</antArtifact>\
                    <antThinking>t</antThinking>\
                    <antArtifact identifier=\"b\">2</antArtifact>";
        let kinds: Vec<_> = scan(text)
            .map(|tag| match tag {
                Tag::Thinking(_) => 't',
                Tag::Artifact(_) => 'a',
            })
            .collect();
        assert_eq!(kinds, vec!['a', 't', 'a']);
    }

    #[test]
    fn interleave_puts_artifact_first_on_tie() {
        let thinking = [ThinkingMatch { start: 5, text: "t" }];
        let artifacts = [ArtifactMatch {
            start: 5,
            attrs: "",
            body: "",
        }];
        let merged: Vec<_> = Interleave::new(thinking.into_iter(), artifacts.into_iter()).collect();
        assert!(matches!(merged[0], Tag::Artifact(_)));
        assert!(matches!(merged[1], Tag::Thinking(_)));
    }

    #[test]
    fn attributes_default_to_empty() {
        let attrs = ArtifactAttributes::parse(r#"identifier="calc" unknown="x""#);
        assert_eq!(attrs.identifier, "calc");
        assert_eq!(attrs.kind, "");
        assert_eq!(attrs.language, "");
        assert_eq!(attrs.title, "");

        assert_eq!(
            ArtifactAttributes::parse("identifier=calc title='single'"),
            ArtifactAttributes::default()
        );
    }

    #[test]
    fn tracker_counts_per_key_from_one() {
        let mut versions = VersionTracker::new();
        assert_eq!(versions.next_version("c-x"), 1);
        assert_eq!(versions.next_version("c-x"), 2);
        assert_eq!(versions.next_version("c-y"), 1);
        assert_eq!(versions.next_version("c-x"), 3);
    }

    #[test]
    fn two_artifacts_same_identifier_get_versions_1_and_2() {
        let mut versions = VersionTracker::new();
        let artifacts = extract_artifacts(TWO_CALCS, "conv", "msg", &mut versions);

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].id, "conv-calc-1");
        assert_eq!(artifacts[1].id, "conv-calc-2");
        assert_eq!(artifacts[0].artifact, "conv-calc");
        assert_eq!(artifacts[0].version, 1);
        assert_eq!(artifacts[1].version, 2);
        assert_eq!(artifacts[0].kind, "application/vnd.ant.code");
        assert_eq!(artifacts[0].language, "python");
        assert_eq!(artifacts[1].title, "Calculator v2");
        assert_eq!(artifacts[0].content, "def add(a, b):\n    return a + b");
        assert_eq!(artifacts[0].message_id, "msg");
    }

    #[test]
    fn thinking_binds_only_to_the_next_artifact() {
        let mut versions = VersionTracker::new();
        let artifacts = extract_artifacts(TWO_CALCS, "conv", "msg", &mut versions);

        assert_eq!(
            artifacts[0].thinking.as_deref(),
            Some("A calculator is reusable, so it gets an artifact.")
        );
        assert_eq!(artifacts[1].thinking, None);
    }

    #[test]
    fn later_thinking_replaces_unspent_one() {
        let text = "<antThinking>first</antThinking>\
                    <antThinking>  second  </antThinking>\
                    <antArtifact identifier=\"a\">body</antArtifact>";
        let mut versions = VersionTracker::new();
        let artifacts = extract_artifacts(text, "c", "m", &mut versions);
        assert_eq!(artifacts[0].thinking.as_deref(), Some("second"));
    }

    #[test]
    fn blank_thinking_is_not_attached() {
        let text = "<antThinking>   </antThinking><antArtifact identifier=\"a\">x</antArtifact>";
        let mut versions = VersionTracker::new();
        let artifacts = extract_artifacts(text, "c", "m", &mut versions);
        assert_eq!(artifacts[0].thinking, None);
    }

    #[test]
    fn versions_continue_across_messages() {
        let mut versions = VersionTracker::new();
        let one = "<antArtifact identifier=\"doc\">v1</antArtifact>";
        let two = "<antArtifact identifier=\"doc\">v2</antArtifact>\
                   <antArtifact identifier=\"other\">o</antArtifact>";

        let first = extract_artifacts(one, "c", "m1", &mut versions);
        let second = extract_artifacts(two, "c", "m2", &mut versions);

        assert_eq!(first[0].version, 1);
        assert_eq!(second[0].version, 2);
        assert_eq!(second[0].id, "c-doc-2");
        assert_eq!(second[1].version, 1);

        // Same identifier in another conversation starts over.
        let elsewhere = extract_artifacts(one, "d", "m3", &mut versions);
        assert_eq!(elsewhere[0].id, "d-doc-1");
    }

    #[test]
    fn missing_identifier_still_versions() {
        let text = "<antArtifact title=\"t\">a</antArtifact><antArtifact title=\"u\">b</antArtifact>";
        let mut versions = VersionTracker::new();
        let artifacts = extract_artifacts(text, "c", "m", &mut versions);
        assert_eq!(artifacts[0].id, "c--1");
        assert_eq!(artifacts[1].id, "c--2");
        assert_eq!(artifacts[0].identifier, "");
    }

    #[test]
    fn serializes_type_column_name() {
        let mut versions = VersionTracker::new();
        let artifacts = extract_artifacts(TWO_CALCS, "conv", "msg", &mut versions);
        let value = serde_json::to_value(&artifacts[0]).unwrap();
        assert_eq!(value["type"], "application/vnd.ant.code");
        assert!(value.get("kind").is_none());
        let columns: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(columns.first().map(String::as_str), Some("id"));
        assert_eq!(columns.last().map(String::as_str), Some("message_id"));
    }
}
