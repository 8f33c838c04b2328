//! Recovery of record collections from raw model output.
//!
//! Model text is untrusted and often noisy: reasoning blocks, code fences,
//! prose around the payload, trailing commas, or a stream cut off in the
//! middle of a record. [`recover`] strips the noise, locates the array
//! payload and, when it does not decode, applies two repairs before giving
//! up. Values are returned exactly as decoded.

use serde::{Deserialize, Serialize};

use crate::errors::RecoveryError;
use crate::model::Record;

const REASONING_OPEN: &str = "<think>";
const REASONING_CLOSE: &str = "</think>";
const FENCE: &str = "```";
const PREVIEW_CHARS: usize = 300;

/// A repair applied to the payload before it decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Repair {
    /// Separators directly before `]` or `}` were removed.
    TrailingCommas,
    /// An incomplete final record was cut off and the array re-closed.
    TruncatedTail { dropped_bytes: usize },
}

/// Records decoded from model output and the repairs it needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    pub records: Vec<Record>,
    pub repairs: Vec<Repair>,
}

/// Recover the record array from raw model output.
pub fn recover(raw: &str) -> Result<Recovery, RecoveryError> {
    let received = raw.trim();
    let cleaned = strip_fences(strip_reasoning(received));
    let (payload, remainder) = locate_payload(&cleaned).ok_or_else(|| RecoveryError::NoPayload {
        preview: preview(received),
    })?;

    let first_error = match decode(payload) {
        Ok(records) => {
            return Ok(Recovery {
                records,
                repairs: Vec::new(),
            });
        }
        Err(err) => err,
    };

    let without_commas = remove_trailing_commas(payload);
    if without_commas != payload {
        if let Ok(records) = decode(&without_commas) {
            return Ok(Recovery {
                records,
                repairs: vec![Repair::TrailingCommas],
            });
        }
    }

    // The last `]` may sit inside a complete record, so cut from the whole
    // remainder back to the last record that decodes.
    for cut in record_boundaries(remainder).into_iter().rev() {
        let truncated = format!("{}]", &remainder[..cut]);
        let tail = Repair::TruncatedTail {
            dropped_bytes: remainder.len() - cut,
        };
        if let Ok(records) = decode(&truncated) {
            return Ok(Recovery {
                records,
                repairs: vec![tail],
            });
        }
        let without_commas = remove_trailing_commas(&truncated);
        if without_commas != truncated {
            if let Ok(records) = decode(&without_commas) {
                return Ok(Recovery {
                    records,
                    repairs: vec![Repair::TrailingCommas, tail],
                });
            }
        }
    }

    Err(RecoveryError::Decode {
        message: first_error.to_string(),
        preview: preview(payload),
    })
}

/// [`recover`] without the repair details.
pub fn recover_records(raw: &str) -> Result<Vec<Record>, RecoveryError> {
    recover(raw).map(|recovery| recovery.records)
}

fn decode(payload: &str) -> Result<Vec<Record>, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Drop everything up to the last closing reasoning marker, then an
/// unclosed reasoning block with everything after it.
fn strip_reasoning(text: &str) -> &str {
    let text = match text.rfind(REASONING_CLOSE) {
        Some(idx) => &text[idx + REASONING_CLOSE.len()..],
        None => text,
    };
    match text.find(REASONING_OPEN) {
        Some(idx) => text[..idx].trim(),
        None => text.trim(),
    }
}

/// Remove ```` ```json ```` and bare ```` ``` ```` markers.
fn strip_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find(FENCE) {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + FENCE.len()..];
        if rest.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            rest = &rest[4..];
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// First `[` through the last `]`, and everything from the first `[` on.
/// Without a closing bracket after it, a stream that opened a record is
/// returned unterminated for the tail repair.
fn locate_payload(text: &str) -> Option<(&str, &str)> {
    let start = text.find('[')?;
    let remainder = &text[start..];
    match text.rfind(']') {
        Some(end) if end > start => Some((&text[start..=end], remainder)),
        _ if remainder.contains('{') => Some((remainder, remainder)),
        _ => None,
    }
}

fn remove_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }

        match ch {
            '"' => in_string = true,
            ',' => {
                let next = text[idx + 1..].trim_start().chars().next();
                if matches!(next, Some(']' | '}')) {
                    continue;
                }
            }
            _ => {}
        }
        out.push(ch);
    }

    out
}

/// Byte offsets just past each `}` that closes a top-level record.
fn record_boundaries(text: &str) -> Vec<usize> {
    let mut boundaries = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if ch == '}' && depth == 1 {
                    boundaries.push(idx + 1);
                }
            }
            _ => {}
        }
    }

    boundaries
}

/// First 300 characters of `text`, marked when cut.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn values(records: &[Record], key: &str) -> Vec<serde_json::Value> {
        records
            .iter()
            .map(|record| record.get(key).cloned().unwrap_or_default())
            .collect()
    }

    #[test]
    fn decodes_well_formed_payload_in_order() {
        let recovery = recover(r#"[{"a":1},{"a":2}]"#).expect("recover");
        assert_eq!(values(&recovery.records, "a"), vec![json!(1), json!(2)]);
        assert!(recovery.repairs.is_empty());
    }

    #[test]
    fn strips_complete_reasoning_block() {
        let records = recover_records(r#"<think>ignored [1]</think>[{"x":1}]"#).expect("recover");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("x"), Some(&json!(1)));
    }

    #[test]
    fn unterminated_reasoning_is_dropped_to_the_end() {
        let records =
            recover_records("[{\"x\":1}]\n<think>maybe [{\"x\":2}] is better").expect("recover");
        assert_eq!(values(&records, "x"), vec![json!(1)]);

        let err = recover("<think>still thinking about [{\"x\":1}]").expect_err("no payload");
        assert!(matches!(err, RecoveryError::NoPayload { .. }));
    }

    #[test]
    fn strips_code_fences_and_prose() {
        let raw = "Here are the rows:\n```JSON\n[{\"name\": \"Ada\"}]\n```\nLet me know!";
        let records = recover_records(raw).expect("recover");
        assert_eq!(records[0].get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn salvages_truncated_tail() {
        let recovery = recover(r#"[{"x":1},{"x":2},{"x":3"#).expect("recover");
        assert_eq!(values(&recovery.records, "x"), vec![json!(1), json!(2)]);
        assert_eq!(
            recovery.repairs,
            vec![Repair::TruncatedTail { dropped_bytes: 7 }]
        );
    }

    #[test]
    fn truncated_tail_keeps_records_before_a_nested_bracket() {
        let recovery =
            recover(r#"[{"x":1,"tags":["a"]},{"x":2,"tags":["b"]},{"x":3"#).expect("recover");
        assert_eq!(values(&recovery.records, "x"), vec![json!(1), json!(2)]);
        assert_eq!(
            recovery.repairs,
            vec![Repair::TruncatedTail { dropped_bytes: 7 }]
        );
    }

    #[test]
    fn reasoning_reopened_after_the_answer_is_dropped() {
        let recovery =
            recover("<think>a</think>[{\"x\":1}]\n<think>hmm [{\"x\":2}]").expect("recover");
        assert_eq!(values(&recovery.records, "x"), vec![json!(1)]);
        assert!(recovery.repairs.is_empty());
    }

    #[test]
    fn truncation_walks_back_over_malformed_records() {
        let raw = r#"[{"x":1},{"x": tru},{"x":"a]b"}, {"y""#;
        let records = recover_records(raw).expect("recover");
        assert_eq!(values(&records, "x"), vec![json!(1)]);
    }

    #[test]
    fn removes_trailing_commas() {
        let recovery = recover(r#"[{"x":1},]"#).expect("recover");
        assert_eq!(recovery.records.len(), 1);
        assert_eq!(recovery.repairs, vec![Repair::TrailingCommas]);

        let nested = recover_records(r#"[{"x":1, "note": "a,]",},]"#).expect("recover");
        assert_eq!(nested[0].get("note"), Some(&json!("a,]")));
    }

    #[test]
    fn both_repairs_can_apply() {
        let recovery = recover(r#"[{"x":1,},{"x":2},{"x""#).expect("recover");
        assert_eq!(recovery.records.len(), 2);
        assert_eq!(
            recovery.repairs,
            vec![
                Repair::TrailingCommas,
                Repair::TruncatedTail { dropped_bytes: 5 }
            ]
        );
    }

    #[test]
    fn payload_without_brackets_is_an_error() {
        let err = recover(r#"{"x": 1}"#).expect_err("no payload");
        assert!(matches!(err, RecoveryError::NoPayload { .. }));
        assert_eq!(err.preview(), r#"{"x": 1}"#);

        let err = recover("] nothing [").expect_err("reversed brackets");
        assert!(matches!(err, RecoveryError::NoPayload { .. }));
    }

    #[test]
    fn undecodable_payload_reports_a_bounded_preview() {
        let raw = format!("[{}]", "x".repeat(1000));
        let err = recover(&raw).expect_err("decode error");
        match err {
            RecoveryError::Decode { preview, .. } => {
                assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
                assert!(preview.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn arrays_of_scalars_are_not_records() {
        assert!(recover("[1, 2, 3]").is_err());
    }

    #[test]
    fn values_are_not_coerced() {
        let records = recover_records(r#"[{"id":"7","price":1.5,"ok":true,"gone":null}]"#)
            .expect("recover");
        let record = &records[0];
        assert_eq!(record.get("id"), Some(&json!("7")));
        assert_eq!(record.get("price"), Some(&json!(1.5)));
        assert_eq!(record.get("ok"), Some(&json!(true)));
        assert_eq!(record.get("gone"), Some(&json!(null)));
    }

    #[test]
    fn preview_is_char_boundary_safe() {
        let text = "é".repeat(400);
        let cut = preview(&text);
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 3);
    }
}
