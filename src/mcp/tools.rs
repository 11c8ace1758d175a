use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AxbridgeError, Result};

pub const NAVIGATE: &str = "browser_navigate";
pub const BACK: &str = "browser_back";
pub const SNAPSHOT: &str = "browser_snapshot";
pub const CLICK: &str = "browser_click";
pub const FILL: &str = "browser_fill";
pub const SELECT: &str = "browser_select";
pub const PRESS_KEY: &str = "browser_press_key";
pub const SCREENSHOT: &str = "browser_screenshot";
pub const CLOSE: &str = "browser_close";

#[derive(Debug, Deserialize)]
pub struct NavigateArgs {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotArgs {
    #[serde(default)]
    pub compact: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ClickArgs {
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct FillArgs {
    #[serde(rename = "ref")]
    pub reference: String,
    pub value: String,
    #[serde(default = "default_true", alias = "pressEnter")]
    pub press_enter: bool,
}

#[derive(Debug, Deserialize)]
pub struct SelectArgs {
    #[serde(rename = "ref")]
    pub reference: String,
    pub values: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PressKeyArgs {
    pub key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScreenshotArgs {
    #[serde(default, alias = "fullPage")]
    pub full_page: bool,
    #[serde(default)]
    pub path: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Deserialize tool arguments; a missing argument object counts as `{}`.
pub fn parse_args<T: DeserializeOwned>(arguments: Option<&JsonObject>) -> Result<T> {
    let value = Value::Object(arguments.cloned().unwrap_or_default());
    serde_json::from_value(value).map_err(|e| AxbridgeError::InvalidArguments(e.to_string()))
}

/// Text body of a failed tool call
pub fn error_text(error: &AxbridgeError) -> String {
    error.to_payload().to_string()
}

fn schema(value: Value) -> Arc<JsonObject> {
    match value {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(JsonObject::new()),
    }
}

fn ref_property() -> Value {
    json!({
        "type": "string",
        "description": "Ref from the latest browser_snapshot, e.g. \"0-5\" (\"@0-5\" and \"ref=0-5\" also work)"
    })
}

pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool::new(
            NAVIGATE,
            "Navigate the current tab to a URL and wait for the page to load",
            schema(json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL to open" }
                },
                "required": ["url"]
            })),
        ),
        Tool::new(
            BACK,
            "Go back to the previous page in history",
            schema(json!({ "type": "object", "properties": {} })),
        ),
        Tool::new(
            SNAPSHOT,
            "Capture the accessibility tree of the current page as text. Interactive elements \
             are prefixed with a ref like [0-5] to use with click, fill and select. Refs are \
             only valid until the next snapshot.",
            schema(json!({
                "type": "object",
                "properties": {
                    "compact": {
                        "type": "boolean",
                        "description": "Hide unnamed structural wrappers",
                        "default": true
                    }
                }
            })),
        ),
        Tool::new(
            CLICK,
            "Click the element behind a snapshot ref",
            schema(json!({
                "type": "object",
                "properties": { "ref": ref_property() },
                "required": ["ref"]
            })),
        ),
        Tool::new(
            FILL,
            "Replace the value of a text field and optionally press Enter",
            schema(json!({
                "type": "object",
                "properties": {
                    "ref": ref_property(),
                    "value": { "type": "string", "description": "Text to put in the field" },
                    "press_enter": {
                        "type": "boolean",
                        "description": "Press Enter after filling",
                        "default": true
                    }
                },
                "required": ["ref", "value"]
            })),
        ),
        Tool::new(
            SELECT,
            "Select one or more options of a <select> by value or label",
            schema(json!({
                "type": "object",
                "properties": {
                    "ref": ref_property(),
                    "values": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1
                    }
                },
                "required": ["ref", "values"]
            })),
        ),
        Tool::new(
            PRESS_KEY,
            "Press a key in the focused element (Enter, Tab, Escape, ArrowDown, a, ...)",
            schema(json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string" }
                },
                "required": ["key"]
            })),
        ),
        Tool::new(
            SCREENSHOT,
            "Take a PNG screenshot of the current page",
            schema(json!({
                "type": "object",
                "properties": {
                    "full_page": {
                        "type": "boolean",
                        "description": "Capture the whole scrollable page",
                        "default": false
                    },
                    "path": {
                        "type": "string",
                        "description": "Save to this file instead of returning the image"
                    }
                }
            })),
        ),
        Tool::new(
            CLOSE,
            "Close the browser and forget its session",
            schema(json!({ "type": "object", "properties": {} })),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("arguments must be an object"),
        }
    }

    #[test]
    fn every_tool_has_an_object_schema() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools.iter().map(|t| &*t.name).collect();

        assert_eq!(
            names,
            vec![NAVIGATE, BACK, SNAPSHOT, CLICK, FILL, SELECT, PRESS_KEY, SCREENSHOT, CLOSE]
        );
        for tool in &tools {
            assert_eq!(tool.input_schema.get("type"), Some(&json!("object")));
        }
    }

    #[test]
    fn fill_presses_enter_by_default() {
        let parsed: FillArgs = parse_args(Some(&args(json!({ "ref": "0-2", "value": "hi" })))).unwrap();
        assert!(parsed.press_enter);

        let parsed: FillArgs = parse_args(Some(&args(json!({
            "ref": "0-2", "value": "hi", "pressEnter": false
        }))))
        .unwrap();
        assert!(!parsed.press_enter);
    }

    #[test]
    fn optional_arguments_default_when_absent() {
        let snapshot: SnapshotArgs = parse_args(None).unwrap();
        assert_eq!(snapshot.compact, None);

        let screenshot: ScreenshotArgs = parse_args(None).unwrap();
        assert!(!screenshot.full_page);
        assert!(screenshot.path.is_none());
    }

    #[test]
    fn missing_ref_is_invalid_arguments() {
        let err = parse_args::<ClickArgs>(Some(&args(json!({})))).unwrap_err();
        assert!(matches!(err, AxbridgeError::InvalidArguments(ref msg) if msg.contains("ref")));

        let payload: Value = serde_json::from_str(&error_text(&err)).unwrap();
        assert_eq!(payload["error"], "invalid_arguments");
    }

    #[test]
    fn select_values_must_be_strings() {
        let err = parse_args::<SelectArgs>(Some(&args(json!({ "ref": "0-1", "values": [1, 2] }))))
            .unwrap_err();
        assert!(matches!(err, AxbridgeError::InvalidArguments(_)));
    }
}
