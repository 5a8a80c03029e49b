//! Inline tag extraction: `<tool><param>value</param></tool>`.
//!
//! A block opens with `<name>` (a single word, no attributes) and closes at
//! the matching `</name>`, honoring nesting. Child elements one level deep
//! become parameters. A block whose closing tag belongs to some other name
//! is malformed and reported on its own; scanning continues after it.

use std::sync::OnceLock;

use regex::Regex;

use super::{ParsedCall, RawParams, TaggedParams};
use crate::error::MeshError;

fn wrapper_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"</?(?:out_text|thinking)>").expect("wrapper pattern is valid")
    })
}

/// Remove the visible-text and reasoning wrapper tags, keeping their content.
pub fn strip_wrappers(text: &str) -> String {
    wrapper_pattern().replace_all(text, "").into_owned()
}

/// Extract every top-level tool block from the model's full text.
///
/// Each entry is either a call or the parse error for that block alone.
pub fn extract_tagged_calls(text: &str) -> Vec<Result<ParsedCall, MeshError>> {
    let cleaned = strip_wrappers(text);
    let mut out = Vec::new();
    let mut pos = 0;

    while let Some(offset) = cleaned[pos..].find('<') {
        let at = pos + offset;
        let Some(tag) = read_tag(&cleaned, at).filter(|t| t.kind == TagKind::Open) else {
            pos = at + 1;
            continue;
        };
        match find_close(&cleaned, tag.end, tag.name) {
            Closing::Matched { start, end } => {
                let block = &cleaned[at..end];
                let inner = &cleaned[tag.end..start];
                out.push(parse_block(tag.name, inner, block));
                pos = end;
            }
            Closing::Mismatched { name, end } => {
                tracing::warn!(tag = tag.name, closed_by = name, "mismatched tool block");
                out.push(Err(MeshError::TagParse(format!(
                    "<{}> is closed by </{}>",
                    tag.name, name
                ))));
                pos = end;
            }
            Closing::Unclosed => pos = tag.end,
        }
    }
    out
}

fn parse_block(name: &str, inner: &str, block: &str) -> Result<ParsedCall, MeshError> {
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(MeshError::TagParse(format!("<{name}> is not a valid element name")));
    }

    let mut fields = Vec::new();
    let mut text = String::new();
    let mut pos = 0;
    while let Some(offset) = inner[pos..].find('<') {
        let at = pos + offset;
        text.push_str(&inner[pos..at]);
        let Some(tag) = read_tag(inner, at) else {
            text.push('<');
            pos = at + 1;
            continue;
        };
        match tag.kind {
            TagKind::SelfClosing => {
                fields.push((tag.name.to_string(), String::new()));
                pos = tag.end;
            }
            TagKind::Close => {
                return Err(MeshError::TagParse(format!(
                    "unexpected </{}> inside <{name}>",
                    tag.name
                )));
            }
            TagKind::Open => match find_close(inner, tag.end, tag.name) {
                Closing::Matched { start, end } => {
                    let value = decode_entities(&strip_tags(&inner[tag.end..start]));
                    fields.push((tag.name.to_string(), value.trim().to_string()));
                    pos = end;
                }
                Closing::Mismatched { name: other, .. } => {
                    return Err(MeshError::TagParse(format!(
                        "<{}> inside <{name}> is closed by </{other}>",
                        tag.name
                    )));
                }
                Closing::Unclosed => {
                    return Err(MeshError::TagParse(format!(
                        "<{}> inside <{name}> is never closed",
                        tag.name
                    )));
                }
            },
        }
    }
    text.push_str(&inner[pos..]);

    Ok(ParsedCall {
        id: None,
        name: name.to_string(),
        params: RawParams::Tagged(TaggedParams {
            fields,
            text: decode_entities(text.trim()),
            block: block.to_string(),
        }),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
}

#[derive(Debug)]
struct Tag<'a> {
    name: &'a str,
    kind: TagKind,
    /// Byte offset just past the closing `>`.
    end: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Read `<name>`, `</name>` or `<name/>` starting at `at` (which holds `<`).
fn read_tag(text: &str, at: usize) -> Option<Tag<'_>> {
    let rest = &text[at + 1..];
    let (closing, body) = match rest.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, rest),
    };
    let name_len = body
        .char_indices()
        .find(|(_, c)| !is_name_char(*c))
        .map_or(body.len(), |(i, _)| i);
    if name_len == 0 {
        return None;
    }
    let name = &body[..name_len];
    let after = &body[name_len..];
    let consumed = at + 1 + usize::from(closing) + name_len;
    if after.starts_with('>') {
        let kind = if closing { TagKind::Close } else { TagKind::Open };
        return Some(Tag { name, kind, end: consumed + 1 });
    }
    if !closing && after.starts_with("/>") {
        return Some(Tag { name, kind: TagKind::SelfClosing, end: consumed + 2 });
    }
    None
}

enum Closing<'a> {
    /// `start` is the offset of `</name>`, `end` just past it.
    Matched { start: usize, end: usize },
    /// A closing tag for a different element ended the block.
    Mismatched { name: &'a str, end: usize },
    Unclosed,
}

fn find_close<'a>(text: &'a str, from: usize, name: &str) -> Closing<'a> {
    let mut open: Vec<&str> = Vec::new();
    let mut pos = from;
    while let Some(offset) = text[pos..].find('<') {
        let at = pos + offset;
        let Some(tag) = read_tag(text, at) else {
            pos = at + 1;
            continue;
        };
        pos = tag.end;
        match tag.kind {
            TagKind::SelfClosing => {}
            TagKind::Open => open.push(tag.name),
            TagKind::Close => {
                if let Some(depth) = open.iter().rposition(|n| *n == tag.name) {
                    open.truncate(depth);
                } else if tag.name == name {
                    return Closing::Matched { start: at, end: tag.end };
                } else if open.is_empty() {
                    return Closing::Mismatched { name: tag.name, end: tag.end };
                }
            }
        }
    }
    Closing::Unclosed
}

/// Drop any markup inside a parameter value, keeping its text.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(offset) = text[pos..].find('<') {
        let at = pos + offset;
        out.push_str(&text[pos..at]);
        match read_tag(text, at) {
            Some(tag) => pos = tag.end,
            None => {
                out.push('<');
                pos = at + 1;
            }
        }
    }
    out.push_str(&text[pos..]);
    out
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn calls(text: &str) -> Vec<ParsedCall> {
        extract_tagged_calls(text).into_iter().filter_map(Result::ok).collect()
    }

    fn tagged(call: &ParsedCall) -> &TaggedParams {
        match &call.params {
            RawParams::Tagged(t) => t,
            RawParams::Arguments(_) => panic!("expected tagged params"),
        }
    }

    #[test]
    fn children_become_ordered_fields() {
        let found = calls("<foo><x>1</x><y>2</y></foo>");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "foo");
        assert_eq!(found[0].id, None);
        assert_eq!(
            tagged(&found[0]).fields,
            vec![("x".to_string(), "1".to_string()), ("y".to_string(), "2".to_string())]
        );
        assert_eq!(tagged(&found[0]).block, "<foo><x>1</x><y>2</y></foo>");
    }

    #[test]
    fn unmatched_closing_tag_yields_no_calls() {
        let results = extract_tagged_calls("<foo><x>1</x></bar>");
        assert!(results.iter().all(Result::is_err));
        assert_eq!(results.len(), 1);
        assert!(calls("<foo>1</bar>").is_empty());
    }

    #[test]
    fn empty_block_is_a_call_without_params() {
        let found = calls("Let me check. <get_time></get_time>");
        assert_eq!(found.len(), 1);
        assert!(tagged(&found[0]).fields.is_empty());
        assert_eq!(tagged(&found[0]).text, "");
    }

    #[test]
    fn bare_text_body_is_kept() {
        let found = calls("<get_weather>\n  Oslo\n</get_weather>");
        assert_eq!(tagged(&found[0]).text, "Oslo");
    }

    #[test]
    fn wrapper_tags_are_not_tools() {
        let text = "<thinking>I should ask.</thinking><out_text>One moment</out_text>\
                    <list_agents></list_agents>";
        let found = calls(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "list_agents");
    }

    #[test]
    fn content_inside_wrappers_still_counts() {
        let found = calls("<out_text><get_time></get_time></out_text>");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "get_time");
    }

    #[test]
    fn multiple_blocks_keep_document_order() {
        let found = calls("<a></a> then <b><k>v</k></b> and <c/>");
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn nested_tags_are_parameters_not_calls() {
        let found = calls("<ask_for_help><message>use <b>bold</b> &amp; go</message></ask_for_help>");
        assert_eq!(found.len(), 1);
        assert_eq!(tagged(&found[0]).field("message"), Some("use bold & go"));
    }

    #[test]
    fn same_name_nesting_is_balanced() {
        let found = calls("<a><a>inner</a></a>");
        assert_eq!(found.len(), 1);
        assert_eq!(tagged(&found[0]).field("a"), Some("inner"));
    }

    #[test]
    fn malformed_block_does_not_hide_later_blocks() {
        let results = extract_tagged_calls("<foo><x>1</foo> <get_time></get_time>");
        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0], Err(MeshError::TagParse(m)) if m.contains("<x>")));
        assert_eq!(results[1].as_ref().unwrap().name, "get_time");
    }

    #[test]
    fn unclosed_prose_tag_is_skipped() {
        let found = calls("compare a <b and x < y then <note> and <get_time></get_time>");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "get_time");
    }

    #[test]
    fn digit_led_names_are_rejected() {
        let results = extract_tagged_calls("<1st>x</1st>");
        assert!(matches!(&results[0], Err(MeshError::TagParse(_))));
    }

    #[test]
    fn self_closing_child_is_empty_field() {
        let found = calls("<attempt_completion><report_content/></attempt_completion>");
        assert_eq!(tagged(&found[0]).field("report_content"), Some(""));
    }
}
