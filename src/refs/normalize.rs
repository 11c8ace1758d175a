use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use super::node::{AccessibilityNode, Checked};

/// Roles that carry no meaning of their own when unnamed.
pub const NOISE_ROLES: &[&str] = &[
    "generic",
    "none",
    "presentation",
    "InlineTextBox",
    "LineBreak",
    "StaticText",
    "text",
];

/// A CDP `AXValue`. Accepts both the wire shape `{type, value}` and a bare
/// JSON value, which keeps hand-written fixtures short.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AxValue {
    Typed {
        #[serde(rename = "type")]
        value_type: String,
        #[serde(default)]
        value: Option<Value>,
    },
    Bare(Value),
}

impl AxValue {
    pub fn string(value: impl Into<String>) -> Self {
        AxValue::Bare(Value::String(value.into()))
    }

    fn raw(&self) -> Option<&Value> {
        match self {
            AxValue::Typed { value, .. } => value.as_ref(),
            AxValue::Bare(value) => Some(value),
        }
    }

    /// Text form of the value; `None` for null/absent.
    pub fn as_text(&self) -> Option<String> {
        match self.raw()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn is_true(&self) -> bool {
        match self.raw() {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AxProperty {
    pub name: String,
    pub value: AxValue,
}

/// One node of the flat tree reported by `Accessibility.getFullAXTree`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAxNode {
    #[serde(alias = "id")]
    pub node_id: String,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub role: Option<AxValue>,
    #[serde(default)]
    pub name: Option<AxValue>,
    #[serde(default)]
    pub value: Option<AxValue>,
    #[serde(default)]
    pub description: Option<AxValue>,
    #[serde(default)]
    pub properties: Vec<AxProperty>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    #[serde(default, rename = "backendDOMNodeId")]
    pub backend_dom_node_id: Option<i64>,
}

impl RawAxNode {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            node_id: id.into(),
            ignored: false,
            role: Some(AxValue::string(role)),
            name: None,
            value: None,
            description: None,
            properties: Vec::new(),
            child_ids: Vec::new(),
            backend_dom_node_id: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(AxValue::string(name));
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(AxValue::string(value));
        self
    }

    pub fn with_children<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.child_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.push(AxProperty {
            name: name.into(),
            value: AxValue::Bare(value),
        });
        self
    }

    pub fn with_backend_node(mut self, id: i64) -> Self {
        self.backend_dom_node_id = Some(id);
        self
    }

    /// Role as text, `generic` when the browser reported none.
    pub fn role_text(&self) -> String {
        Self::text_of(&self.role).unwrap_or_else(|| "generic".to_string())
    }

    pub fn name_text(&self) -> String {
        Self::text_of(&self.name).unwrap_or_default()
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    fn property(&self, name: &str) -> Option<&AxValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    fn text_of(value: &Option<AxValue>) -> Option<String> {
        value.as_ref().and_then(AxValue::as_text)
    }

    fn to_node(&self, children: Vec<AccessibilityNode>) -> AccessibilityNode {
        let checked = self.property("checked").map(|v| match v.raw() {
            Some(Value::String(s)) if s == "mixed" => Checked::Mixed,
            _ => Checked::from(v.is_true()),
        });

        AccessibilityNode {
            role: self.role_text(),
            name: self.name_text(),
            value: Self::text_of(&self.value),
            description: Self::text_of(&self.description).filter(|d| !d.is_empty()),
            checked,
            disabled: self.property("disabled").is_some_and(AxValue::is_true),
            focused: self.property("focused").is_some_and(AxValue::is_true),
            children,
        }
    }
}

fn is_noise(role: &str) -> bool {
    NOISE_ROLES.contains(&role)
}

/// Build the canonical tree from the flat node list. The first node is the
/// root; `None` when the list is empty or the root is ignored.
pub fn normalize_tree(nodes: &[RawAxNode], compact: bool) -> Option<AccessibilityNode> {
    let root = nodes.first()?;
    if root.ignored {
        return None;
    }

    let by_id: HashMap<&str, &RawAxNode> = nodes
        .iter()
        .map(|node| (node.node_id.as_str(), node))
        .collect();
    let mut expanded = HashSet::new();

    normalize_node(root, &by_id, compact, &mut expanded)
}

/// Nodes in the order a snapshot walk visits them: pre-order from the
/// root, skipping ignored subtrees and ids already expanded.
pub fn walk_order(nodes: &[RawAxNode]) -> Vec<&RawAxNode> {
    let Some(root) = nodes.first() else {
        return Vec::new();
    };
    let by_id: HashMap<&str, &RawAxNode> = nodes
        .iter()
        .map(|node| (node.node_id.as_str(), node))
        .collect();

    let mut order = Vec::new();
    let mut expanded = HashSet::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node.ignored || !expanded.insert(node.node_id.as_str()) {
            continue;
        }
        order.push(node);
        stack.extend(
            node.child_ids
                .iter()
                .rev()
                .filter_map(|id| by_id.get(id.as_str()).copied()),
        );
    }

    order
}

fn normalize_node<'a>(
    raw: &'a RawAxNode,
    by_id: &HashMap<&str, &'a RawAxNode>,
    compact: bool,
    expanded: &mut HashSet<&'a str>,
) -> Option<AccessibilityNode> {
    if raw.ignored {
        return None;
    }
    // Malformed input can reference a node twice; expand it once.
    if !expanded.insert(raw.node_id.as_str()) {
        return None;
    }

    let children: Vec<AccessibilityNode> = raw
        .child_ids
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).copied())
        .filter_map(|child| normalize_node(child, by_id, compact, expanded))
        .collect();

    let node = raw.to_node(children);

    if compact && node.name.is_empty() && is_noise(&node.role) {
        let mut children = node.children;
        return match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(AccessibilityNode::group(children)),
        };
    }

    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn example_nodes() -> Vec<RawAxNode> {
        vec![
            RawAxNode::new("1", "RootWebArea")
                .named("Example")
                .with_children(["2", "3"]),
            RawAxNode::new("2", "generic").with_children(["4"]),
            RawAxNode::new("4", "button").named("Go"),
            RawAxNode::new("3", "StaticText").named(""),
        ]
    }

    #[test]
    fn empty_input_yields_none() {
        assert!(normalize_tree(&[], true).is_none());
    }

    #[test]
    fn ignored_root_yields_none() {
        let nodes = vec![RawAxNode::new("1", "RootWebArea").ignored()];
        assert!(normalize_tree(&nodes, false).is_none());
    }

    #[test]
    fn compact_splices_single_child_and_drops_empty_noise() {
        let root = normalize_tree(&example_nodes(), true).unwrap();

        assert_eq!(root.role, "RootWebArea");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0], AccessibilityNode::new("button", "Go"));
    }

    #[test]
    fn full_mode_keeps_every_node() {
        let root = normalize_tree(&example_nodes(), false).unwrap();

        assert_eq!(root.subtree_size(), 4);
        assert_eq!(root.children[0].role, "generic");
        assert_eq!(root.children[1].role, "StaticText");
    }

    #[test]
    fn compact_relabels_wrapper_with_several_children_as_group() {
        let nodes = vec![
            RawAxNode::new("1", "RootWebArea").with_children(["2"]),
            RawAxNode::new("2", "generic").with_children(["3", "4"]),
            RawAxNode::new("3", "link").named("Home"),
            RawAxNode::new("4", "link").named("About"),
        ];

        let root = normalize_tree(&nodes, true).unwrap();
        let group = &root.children[0];

        assert_eq!(group.role, "group");
        assert!(group.name.is_empty());
        assert_eq!(group.children.len(), 2);
    }

    #[test]
    fn named_noise_nodes_survive_compaction() {
        let nodes = vec![
            RawAxNode::new("1", "RootWebArea").with_children(["2"]),
            RawAxNode::new("2", "StaticText").named("Welcome back"),
        ];

        let root = normalize_tree(&nodes, true).unwrap();
        assert_eq!(root.children[0], AccessibilityNode::new("StaticText", "Welcome back"));
    }

    #[test]
    fn ignored_nodes_drop_their_subtree() {
        let nodes = vec![
            RawAxNode::new("1", "RootWebArea").with_children(["2", "4"]),
            RawAxNode::new("2", "generic").ignored().with_children(["3"]),
            RawAxNode::new("3", "button").named("Hidden"),
            RawAxNode::new("4", "button").named("Shown"),
        ];

        let root = normalize_tree(&nodes, false).unwrap();
        assert_eq!(root.children, vec![AccessibilityNode::new("button", "Shown")]);
    }

    #[test]
    fn unknown_and_repeated_child_ids_are_tolerated() {
        let nodes = vec![
            RawAxNode::new("1", "RootWebArea").with_children(["2", "missing", "2"]),
            RawAxNode::new("2", "button").named("Once"),
        ];

        let root = normalize_tree(&nodes, false).unwrap();
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn extracts_state_properties() {
        let nodes = vec![
            RawAxNode::new("1", "RootWebArea").with_children(["2", "3", "4"]),
            RawAxNode::new("2", "checkbox")
                .named("Terms")
                .with_property("checked", json!("mixed")),
            RawAxNode::new("3", "checkbox")
                .named("News")
                .with_property("checked", json!("true"))
                .with_property("focused", json!(true)),
            RawAxNode::new("4", "button")
                .named("Pay")
                .with_property("checked", json!("false"))
                .with_property("disabled", json!(true)),
        ];

        let root = normalize_tree(&nodes, true).unwrap();
        assert_eq!(root.children[0].checked, Some(Checked::Mixed));
        assert_eq!(root.children[1].checked, Some(Checked::True));
        assert!(root.children[1].focused);
        assert_eq!(root.children[2].checked, Some(Checked::False));
        assert!(root.children[2].disabled);
        assert!(!root.children[2].focused);
    }

    #[test]
    fn walk_order_is_preorder_without_ignored_subtrees() {
        let nodes = vec![
            RawAxNode::new("1", "RootWebArea").with_children(["2", "5"]),
            RawAxNode::new("2", "generic").with_children(["3", "4"]),
            RawAxNode::new("3", "button").named("A"),
            RawAxNode::new("4", "button").named("B"),
            RawAxNode::new("5", "generic").ignored().with_children(["6"]),
            RawAxNode::new("6", "button").named("C"),
        ];

        let ids: Vec<&str> = walk_order(&nodes)
            .iter()
            .map(|n| n.node_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn deserializes_cdp_wire_shape() {
        let payload = json!([
            {
                "nodeId": "7",
                "ignored": false,
                "role": { "type": "role", "value": "textbox" },
                "name": { "type": "computedString", "value": "Email" },
                "value": { "type": "string", "value": "a@b.c" },
                "properties": [
                    { "name": "focused", "value": { "type": "booleanOrUndefined", "value": true } },
                    { "name": "checked", "value": { "type": "tristate", "value": "mixed" } }
                ],
                "childIds": [],
                "backendDOMNodeId": 42
            }
        ]);

        let nodes: Vec<RawAxNode> = serde_json::from_value(payload).unwrap();
        assert_eq!(nodes[0].backend_dom_node_id, Some(42));
        let root = normalize_tree(&nodes, true).unwrap();

        assert_eq!(root.role, "textbox");
        assert_eq!(root.name, "Email");
        assert_eq!(root.value.as_deref(), Some("a@b.c"));
        assert!(root.focused);
        assert_eq!(root.checked, Some(Checked::Mixed));
    }
}
