use autofix_core::models::{Frame, ParsedError};
use serde::{Deserialize, Deserializer};

use crate::WebhookEnvelope;

/// Extract the canonical error record from a webhook envelope.
///
/// Returns `None` when the envelope carries no issue object; a record is
/// never partially populated. Stack frames are recovered only from the
/// event's "exception" entry.
pub fn normalize(envelope: &WebhookEnvelope) -> Option<ParsedError> {
    let issue = envelope.data.issue.as_ref()?;
    let mut frames = Vec::new();
    if let Some(event) = &envelope.data.event {
        for entry in &event.entries {
            if entry.entry_type != "exception" {
                continue;
            }
            let data: ExceptionData =
                serde_json::from_value(entry.data.clone()).unwrap_or_default();
            for value in data.values {
                let Some(stacktrace) = value.stacktrace else { continue };
                for raw in stacktrace.frames {
                    let raw: RawFrame = serde_json::from_value(raw).unwrap_or_default();
                    frames.push(Frame {
                        filename: raw.filename,
                        abs_path: raw.abs_path,
                        module: raw.module,
                        function: raw.function,
                        line_no: raw.line_no.unwrap_or_default() as u32,
                        col_no: raw.col_no.unwrap_or_default() as u32,
                        in_app: raw.in_app,
                        pre_context: raw.pre_context,
                        post_context: raw.post_context,
                    });
                }
            }
        }
    }
    Some(ParsedError {
        issue_id: issue.id.clone(),
        project_slug: issue.project.slug.clone(),
        title: issue.title.clone(),
        error_type: issue.metadata.error_type.clone(),
        error_message: issue.metadata.value.clone(),
        level: issue.level.clone(),
        platform: issue.platform.clone(),
        culprit: issue.culprit.clone(),
        permalink: issue.permalink.clone(),
        frames,
    })
}

/// Deserialize a field to its default when the value has an unexpected type,
/// rather than failing the surrounding structure.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(T::deserialize(deserializer).unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
struct ExceptionData {
    #[serde(default, deserialize_with = "lenient")]
    values: Vec<ExceptionValue>,
}

#[derive(Debug, Default, Deserialize)]
struct ExceptionValue {
    #[serde(default, deserialize_with = "lenient")]
    stacktrace: Option<Stacktrace>,
}

#[derive(Debug, Default, Deserialize)]
struct Stacktrace {
    // Kept raw so one malformed frame degrades alone
    #[serde(default, deserialize_with = "lenient")]
    frames: Vec<serde_json::Value>,
}

/// Frame as Sentry sends it: camelCase keys, floating-point line numbers.
#[derive(Debug, Default, Deserialize)]
struct RawFrame {
    #[serde(default, deserialize_with = "lenient")]
    filename: String,
    #[serde(default, rename = "absPath", deserialize_with = "lenient")]
    abs_path: String,
    #[serde(default, deserialize_with = "lenient")]
    module: String,
    #[serde(default, deserialize_with = "lenient")]
    function: String,
    #[serde(default, rename = "lineNo", deserialize_with = "lenient")]
    line_no: Option<f64>,
    #[serde(default, rename = "colNo", deserialize_with = "lenient")]
    col_no: Option<f64>,
    #[serde(default, rename = "inApp", deserialize_with = "lenient")]
    in_app: bool,
    #[serde(default, rename = "preContext", deserialize_with = "lenient")]
    pre_context: Vec<String>,
    #[serde(default, rename = "postContext", deserialize_with = "lenient")]
    post_context: Vec<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Entry, Event, Issue, Metadata, Project, WebhookData};

    fn envelope_with_issue() -> WebhookEnvelope {
        WebhookEnvelope {
            action: "created".to_string(),
            data: WebhookData {
                issue: Some(Issue {
                    id: "12345".to_string(),
                    short_id: "PROJ-1".to_string(),
                    title: "NullPointerException in Handler".to_string(),
                    culprit: "com.example.Handler.handle".to_string(),
                    level: "error".to_string(),
                    platform: "java".to_string(),
                    permalink: "https://sentry.io/issues/12345".to_string(),
                    project: Project { slug: "my-project".to_string(), ..Default::default() },
                    metadata: Metadata {
                        error_type: "NullPointerException".to_string(),
                        value: "null reference at line 42".to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                event: None,
            },
        }
    }

    #[test]
    fn test_normalize() {
        let parsed = normalize(&envelope_with_issue()).unwrap();
        assert_eq!(parsed.issue_id, "12345");
        assert_eq!(parsed.project_slug, "my-project");
        assert_eq!(parsed.error_type, "NullPointerException");
        assert_eq!(parsed.error_message, "null reference at line 42");
        assert_eq!(parsed.level, "error");
        assert_eq!(parsed.culprit, "com.example.Handler.handle");
        assert!(parsed.frames.is_empty());
    }

    #[test]
    fn test_normalize_no_issue() {
        let envelope = WebhookEnvelope {
            action: "created".to_string(),
            data: WebhookData::default(),
        };
        assert!(normalize(&envelope).is_none());
    }

    #[test]
    fn test_normalize_frames_order_preserved() {
        let mut envelope = envelope_with_issue();
        envelope.data.event = Some(Event {
            entries: vec![
                // Non-exception entries are ignored entirely
                Entry {
                    entry_type: "breadcrumbs".to_string(),
                    data: json!({"values": [{"message": "clicked"}]}),
                },
                Entry {
                    entry_type: "exception".to_string(),
                    data: json!({
                        "values": [{
                            "type": "TypeError",
                            "stacktrace": {
                                "frames": [
                                    {
                                        "filename": "app.js",
                                        "absPath": "/srv/app.js",
                                        "function": "main",
                                        "lineNo": 10.0,
                                        "colNo": 4.0,
                                        "inApp": true
                                    },
                                    {
                                        "filename": "lib.js",
                                        "function": "helper",
                                        "lineNo": 99,
                                        "inApp": false
                                    },
                                    {
                                        "filename": "deep.js"
                                    }
                                ]
                            }
                        }]
                    }),
                },
            ],
            ..Default::default()
        });
        let parsed = normalize(&envelope).unwrap();
        assert_eq!(parsed.frames.len(), 3);
        assert_eq!(parsed.frames[0].filename, "app.js");
        assert_eq!(parsed.frames[0].abs_path, "/srv/app.js");
        assert_eq!(parsed.frames[0].line_no, 10);
        assert_eq!(parsed.frames[0].col_no, 4);
        assert!(parsed.frames[0].in_app);
        assert_eq!(parsed.frames[1].filename, "lib.js");
        assert_eq!(parsed.frames[1].line_no, 99);
        assert!(!parsed.frames[1].in_app);
        // Missing fields stay at their zero value
        assert_eq!(parsed.frames[2].function, "");
        assert_eq!(parsed.frames[2].line_no, 0);
        assert!(!parsed.frames[2].in_app);
    }

    #[test]
    fn test_normalize_tolerates_schema_drift() {
        let mut envelope = envelope_with_issue();
        envelope.data.event = Some(Event {
            entries: vec![Entry {
                entry_type: "exception".to_string(),
                data: json!({
                    "values": [
                        {"stacktrace": {"frames": [{"filename": 42, "inApp": "yes", "lineNo": 7}]}},
                        {"stacktrace": null},
                        {}
                    ]
                }),
            }],
            ..Default::default()
        });
        let parsed = normalize(&envelope).unwrap();
        // Wrong-typed fields degrade to their zero value, the frame survives
        assert_eq!(parsed.frames.len(), 1);
        assert_eq!(parsed.frames[0].filename, "");
        assert!(!parsed.frames[0].in_app);
        assert_eq!(parsed.frames[0].line_no, 7);
    }

    #[test]
    fn test_should_process() {
        assert!(crate::should_process("created"));
        assert!(crate::should_process("triggered"));
        assert!(!crate::should_process("resolved"));
        assert!(!crate::should_process("assigned"));
        assert!(!crate::should_process(""));
    }
}
