//! Turning model output into tool calls.
//!
//! Two producers share one output shape, [`ParsedCall`]: the native
//! accumulator assembles streamed function-call fragments, and the tag
//! extractor scans plain text for inline `<tool>...</tool>` blocks.

pub mod native;
pub mod tagged;

use serde::{Deserialize, Serialize};

use crate::tools::{Builtin, COMPLETION_MARKER};

pub use native::NativeCallAccumulator;
pub use tagged::{extract_tagged_calls, strip_wrappers};

/// Parameters of a tag-style invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaggedParams {
    /// One-level child elements as `(name, text)`, in document order.
    pub fields: Vec<(String, String)>,
    /// Text directly inside the block, outside any child element, trimmed.
    pub text: String,
    /// The complete `<name>...</name>` block.
    pub block: String,
}

impl TaggedParams {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Unparsed parameters as produced by either parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawParams {
    /// Native path: JSON argument text, parsed at dispatch time.
    Arguments(String),
    /// Tag path.
    Tagged(TaggedParams),
}

/// One tool invocation found in a model turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCall {
    /// Provider call id; absent for tag calls.
    pub id: Option<String>,
    pub name: String,
    pub params: RawParams,
}

impl ParsedCall {
    pub fn is_native(&self) -> bool {
        matches!(self.params, RawParams::Arguments(_))
    }

    /// Short parameter rendering for events and logs.
    pub fn params_preview(&self) -> String {
        match &self.params {
            RawParams::Arguments(raw) => raw.clone(),
            RawParams::Tagged(tagged) if tagged.fields.is_empty() => tagged.text.clone(),
            RawParams::Tagged(tagged) => tagged
                .fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Detect the hard-stop signal for a turn and extract its report.
///
/// The signal is the completion tag anywhere in the raw text, or a native
/// `attempt_completion` call. Returns the report text (possibly empty).
pub fn completion_report(raw_text: &str, calls: &[ParsedCall]) -> Option<String> {
    let completion = calls
        .iter()
        .find(|call| Builtin::from_name(&call.name) == Some(Builtin::AttemptCompletion));
    if completion.is_none() && !raw_text.contains(COMPLETION_MARKER) {
        return None;
    }
    let report = completion
        .map(|call| match &call.params {
            RawParams::Tagged(tagged) => tagged
                .field("report_content")
                .unwrap_or(&tagged.text)
                .to_string(),
            RawParams::Arguments(raw) => serde_json::from_str::<serde_json::Value>(raw)
                .ok()
                .and_then(|v| v.get("report_content").and_then(|r| r.as_str()).map(str::to_string))
                .unwrap_or_default(),
        })
        .unwrap_or_default();
    Some(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_calls(text: &str) -> Vec<ParsedCall> {
        extract_tagged_calls(text).into_iter().filter_map(Result::ok).collect()
    }

    #[test]
    fn completion_report_from_tag_child() {
        let text = "done <attempt_completion><report_content>all set</report_content></attempt_completion>";
        assert_eq!(completion_report(text, &ok_calls(text)), Some("all set".to_string()));
    }

    #[test]
    fn completion_marker_without_well_formed_block() {
        let text = "<attempt_completion> unterminated";
        assert_eq!(completion_report(text, &ok_calls(text)), Some(String::new()));
    }

    #[test]
    fn completion_from_native_call() {
        let calls = vec![ParsedCall {
            id: Some("call_1".into()),
            name: "attempt_completion".into(),
            params: RawParams::Arguments(r#"{"report_content":"shipped"}"#.into()),
        }];
        assert_eq!(completion_report("", &calls), Some("shipped".to_string()));
    }

    #[test]
    fn no_completion_without_marker() {
        let text = "<get_time></get_time>";
        assert_eq!(completion_report(text, &ok_calls(text)), None);
    }

    #[test]
    fn preview_lists_fields() {
        let text = "<ask_for_help><agent_id>a</agent_id><message>m</message></ask_for_help>";
        assert_eq!(ok_calls(text)[0].params_preview(), "agent_id=a, message=m");
    }
}
