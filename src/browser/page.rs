use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tokio::time::sleep;

use super::cdp::CdpPage;
use crate::error::{AxbridgeError, Result};
use crate::refs::{walk_order, LivePage, Locator, RawAxNode, RoleQuery};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Centers the element in the viewport and returns its center point, or
/// null while it is not rendered.
const CENTER_JS: &str = r#"function() {
    const el = this.nodeType === 1 ? this : this.parentElement;
    if (!el || !el.isConnected) return null;
    const style = getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return null;
    el.scrollIntoView({ behavior: 'instant', block: 'center', inline: 'center' });
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) return null;
    return { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };
}"#;

const FILL_JS: &str = r#"function(value) {
    const el = this.nodeType === 1 ? this : this.parentElement;
    el.focus();
    if (el.isContentEditable) {
        el.textContent = value;
    } else {
        const proto = el instanceof HTMLTextAreaElement
            ? HTMLTextAreaElement.prototype
            : HTMLInputElement.prototype;
        const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
        setter.call(el, value);
    }
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

const SELECT_JS: &str = r#"function(values) {
    const el = this.nodeType === 1 ? this : this.parentElement;
    if (!(el instanceof HTMLSelectElement)) return null;
    const wanted = new Set(values.map(v => v.trim()));
    const selected = [];
    for (const option of el.options) {
        const hit = wanted.has(option.value) || wanted.has(option.label.trim()) || wanted.has(option.text.trim());
        option.selected = hit && (el.multiple || selected.length === 0);
        if (option.selected) selected.push(option.value);
    }
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return selected;
}"#;

/// Make a user-typed address navigable: `example.com` -> `https://example.com`
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(AxbridgeError::InvalidArguments("url must not be empty".to_string()));
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Ok(format!("https://{}", rest));
    }
    if trimmed.contains("://") || is_host_port(trimmed) {
        return Ok(if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        });
    }
    if has_scheme(trimmed) {
        // about:blank, data:, javascript: ...
        return Ok(trimmed.to_string());
    }

    Ok(format!("https://{}", trimmed))
}

fn is_host_port(input: &str) -> bool {
    let boundary = input.find(['/', '?', '#']).unwrap_or(input.len());

    match input[..boundary].rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !port.is_empty() && port.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn has_scheme(input: &str) -> bool {
    match input.split_once(':') {
        Some((scheme, _)) => {
            scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// CDP key description for a key name: `(key, code, text, windowsVirtualKeyCode)`
pub fn key_definition(key: &str) -> (String, String, String, i64) {
    let named = match key.to_lowercase().as_str() {
        "enter" | "return" => Some(("Enter", "Enter", "\r", 13)),
        "tab" => Some(("Tab", "Tab", "\t", 9)),
        "escape" | "esc" => Some(("Escape", "Escape", "", 27)),
        "backspace" => Some(("Backspace", "Backspace", "", 8)),
        "delete" => Some(("Delete", "Delete", "", 46)),
        "arrowup" | "up" => Some(("ArrowUp", "ArrowUp", "", 38)),
        "arrowdown" | "down" => Some(("ArrowDown", "ArrowDown", "", 40)),
        "arrowleft" | "left" => Some(("ArrowLeft", "ArrowLeft", "", 37)),
        "arrowright" | "right" => Some(("ArrowRight", "ArrowRight", "", 39)),
        "home" => Some(("Home", "Home", "", 36)),
        "end" => Some(("End", "End", "", 35)),
        "pageup" => Some(("PageUp", "PageUp", "", 33)),
        "pagedown" => Some(("PageDown", "PageDown", "", 34)),
        "space" => Some((" ", "Space", " ", 32)),
        "insert" => Some(("Insert", "Insert", "", 45)),
        _ => None,
    };
    if let Some((key, code, text, vk)) = named {
        return (key.to_string(), code.to_string(), text.to_string(), vk);
    }

    if let Some(n) = key
        .strip_prefix(['f', 'F'])
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| (1..=12).contains(n))
    {
        let name = format!("F{}", n);
        return (name.clone(), name, String::new(), 111 + n);
    }

    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        let vk = if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase() as i64
        } else {
            0
        };
        let code = if c.is_ascii_alphabetic() {
            format!("Key{}", c.to_ascii_uppercase())
        } else if c.is_ascii_digit() {
            format!("Digit{}", c)
        } else {
            String::new()
        };
        return (c.to_string(), code, c.to_string(), vk);
    }

    (key.to_string(), key.to_string(), String::new(), 0)
}

impl CdpPage {
    /// Navigate and wait for `document.readyState == "complete"`
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let result = self.send("Page.navigate", json!({ "url": url })).await?;

        if let Some(error_text) = result
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            return Err(AxbridgeError::Other(format!(
                "Navigation to {} failed: {}",
                url, error_text
            )));
        }

        self.wait_for_load(timeout).await
    }

    pub async fn wait_for_load(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();

        loop {
            // Evaluation can fail while the old document is torn down
            match self.evaluate("document.readyState").await {
                Ok(state) if state.as_str() == Some("complete") => return Ok(()),
                Ok(_) => {}
                Err(e) => tracing::debug!("readyState not available yet: {}", e),
            }

            if start.elapsed() > timeout {
                return Err(AxbridgeError::Timeout(format!(
                    "Page did not finish loading within {}ms",
                    timeout.as_millis()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Go back one history entry and wait for it to load
    pub async fn go_back(&self, timeout: Duration) -> Result<()> {
        let history = self.send("Page.getNavigationHistory", json!({})).await?;

        let current_index = history
            .get("currentIndex")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let entry_id = usize::try_from(current_index - 1)
            .ok()
            .and_then(|index| history.get("entries")?.as_array()?.get(index))
            .and_then(|entry| entry.get("id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| AxbridgeError::Other("No previous page in history".to_string()))?;

        self.send(
            "Page.navigateToHistoryEntry",
            json!({ "entryId": entry_id }),
        )
        .await?;
        self.wait_for_load(timeout).await
    }

    pub async fn press_key(&self, key: &str) -> Result<()> {
        let (key_value, code, text, vk) = key_definition(key);

        let mut key_down = json!({
            "type": if text.is_empty() { "rawKeyDown" } else { "keyDown" },
            "key": key_value,
            "code": code,
            "windowsVirtualKeyCode": vk,
        });
        if !text.is_empty() {
            key_down["text"] = json!(text);
        }

        self.send("Input.dispatchKeyEvent", key_down).await?;
        self.send(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": key_value,
                "code": code,
                "windowsVirtualKeyCode": vk,
            }),
        )
        .await?;
        Ok(())
    }

    /// PNG bytes of the viewport, or of the whole page
    pub async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let mut params = json!({ "format": "png" });

        if full_page {
            let metrics = self.send("Page.getLayoutMetrics", json!({})).await?;
            let size = metrics
                .get("cssContentSize")
                .or_else(|| metrics.get("contentSize"))
                .ok_or_else(|| AxbridgeError::Other("No content size".to_string()))?;
            let width = size.get("width").and_then(Value::as_f64).unwrap_or(1920.0);
            let height = size.get("height").and_then(Value::as_f64).unwrap_or(1080.0);

            params["clip"] = json!({ "x": 0, "y": 0, "width": width, "height": height, "scale": 1 });
            params["captureBeyondViewport"] = json!(true);
        }

        let result = self.send("Page.captureScreenshot", params).await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| AxbridgeError::Other("No screenshot data".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| AxbridgeError::Other(format!("Failed to decode screenshot: {}", e)))
    }

    pub async fn accessibility_tree(&self) -> Result<Vec<RawAxNode>> {
        let mut result = self.send("Accessibility.getFullAXTree", json!({})).await?;
        let nodes = result
            .get_mut("nodes")
            .map(Value::take)
            .unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(nodes)?)
    }

    pub async fn current_url(&self) -> Result<String> {
        Ok(self
            .evaluate("location.href")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn title(&self) -> Result<String> {
        Ok(self
            .evaluate("document.title")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Backend DOM node of the `nth` live element matching `query`
    async fn backend_node(&self, query: &RoleQuery, nth: usize) -> Result<Option<i64>> {
        let nodes = self.accessibility_tree().await?;
        Ok(walk_order(&nodes)
            .into_iter()
            .filter(|node| query.matches(&node.role_text(), &node.name_text()))
            .nth(nth)
            .and_then(|node| node.backend_dom_node_id))
    }

    async fn call_on_node(&self, object_id: &str, function: &str, args: Vec<Value>) -> Result<Value> {
        let arguments: Vec<Value> = args.into_iter().map(|value| json!({ "value": value })).collect();
        let mut result = self
            .send(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": function,
                    "arguments": arguments,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            return Err(AxbridgeError::JavaScriptError(details.to_string()));
        }
        Ok(result
            .get_mut("result")
            .and_then(|r| r.get_mut("value"))
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Poll until the located element exists and is rendered. Returns its
    /// remote object id and center point.
    async fn wait_for_target(&self, locator: &Locator, timeout: Duration) -> Result<(String, f64, f64)> {
        let start = Instant::now();

        loop {
            if let Some(backend_node_id) = self.backend_node(&locator.query, locator.nth).await? {
                let resolved = self
                    .send("DOM.resolveNode", json!({ "backendNodeId": backend_node_id }))
                    .await;

                if let Some(object_id) = resolved.ok().and_then(|r| {
                    r.get("object")?
                        .get("objectId")?
                        .as_str()
                        .map(str::to_string)
                }) {
                    let center = self.call_on_node(&object_id, CENTER_JS, Vec::new()).await?;
                    if let (Some(x), Some(y)) = (
                        center.get("x").and_then(Value::as_f64),
                        center.get("y").and_then(Value::as_f64),
                    ) {
                        return Ok((object_id, x, y));
                    }
                }
            }

            if start.elapsed() > timeout {
                return Err(AxbridgeError::Timeout(format!(
                    "Element for ref {} ({} \"{}\") not visible within {}ms",
                    locator.token,
                    locator.query.role,
                    locator.query.name,
                    timeout.as_millis()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        // Move first so the browser updates its hit-test target
        self.send(
            "Input.dispatchMouseEvent",
            json!({ "type": "mouseMoved", "x": x, "y": y }),
        )
        .await?;

        for event in ["mousePressed", "mouseReleased"] {
            self.send(
                "Input.dispatchMouseEvent",
                json!({ "type": event, "x": x, "y": y, "button": "left", "clickCount": 1 }),
            )
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LivePage for CdpPage {
    async fn count_matches(&self, query: &RoleQuery) -> Result<usize> {
        let nodes = self.accessibility_tree().await?;
        Ok(walk_order(&nodes)
            .into_iter()
            .filter(|node| query.matches(&node.role_text(), &node.name_text()))
            .count())
    }

    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        let (_, x, y) = self.wait_for_target(locator, timeout).await?;
        self.mouse_click(x, y).await
    }

    async fn fill(
        &self,
        locator: &Locator,
        value: &str,
        press_enter: bool,
        timeout: Duration,
    ) -> Result<()> {
        let (object_id, _, _) = self.wait_for_target(locator, timeout).await?;
        self.call_on_node(&object_id, FILL_JS, vec![json!(value)]).await?;

        if press_enter {
            self.press_key("Enter").await?;
        }
        Ok(())
    }

    async fn select(
        &self,
        locator: &Locator,
        values: &[String],
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let (object_id, _, _) = self.wait_for_target(locator, timeout).await?;
        let selected = self
            .call_on_node(&object_id, SELECT_JS, vec![json!(values)])
            .await?;

        let Some(selected) = selected.as_array() else {
            return Err(AxbridgeError::InvalidArguments(format!(
                "Ref {} ({}) is not a <select> element",
                locator.token, locator.query.role
            )));
        };
        if selected.is_empty() {
            return Err(AxbridgeError::Other(format!(
                "No option of ref {} matches {:?}",
                locator.token, values
            )));
        }

        Ok(selected
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_get_https() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com");
        assert_eq!(normalize_url("//cdn.example.com/x").unwrap(), "https://cdn.example.com/x");
        assert_eq!(normalize_url("localhost:3000/app").unwrap(), "https://localhost:3000/app");
    }

    #[test]
    fn explicit_schemes_are_kept() {
        assert_eq!(normalize_url(" http://a.test ").unwrap(), "http://a.test");
        assert_eq!(normalize_url("about:blank").unwrap(), "about:blank");
        assert_eq!(normalize_url("file:///tmp/x.html").unwrap(), "file:///tmp/x.html");
    }

    #[test]
    fn empty_url_is_invalid() {
        assert!(matches!(
            normalize_url("   "),
            Err(AxbridgeError::InvalidArguments(_))
        ));
    }

    #[test]
    fn named_keys_map_to_virtual_codes() {
        assert_eq!(
            key_definition("enter"),
            ("Enter".to_string(), "Enter".to_string(), "\r".to_string(), 13)
        );
        assert_eq!(key_definition("Escape").3, 27);
        assert_eq!(key_definition("F5").0, "F5");
        assert_eq!(key_definition("F5").3, 116);
    }

    #[test]
    fn single_characters_type_themselves() {
        assert_eq!(
            key_definition("a"),
            ("a".to_string(), "KeyA".to_string(), "a".to_string(), 65)
        );
        assert_eq!(key_definition("7").1, "Digit7");
    }
}
