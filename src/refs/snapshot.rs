use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::node::AccessibilityNode;
use super::normalize::{normalize_tree, RawAxNode};
use super::token::RefToken;
use crate::error::{AxbridgeError, Result};

/// Roles that get a ref token in the snapshot text.
pub const INTERACTIVE_ROLES: &[&str] = &[
    "link",
    "button",
    "textbox",
    "checkbox",
    "radio",
    "combobox",
    "listbox",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "searchbox",
    "slider",
    "spinbutton",
    "switch",
    "tab",
    "treeitem",
];

pub fn is_interactive(role: &str) -> bool {
    INTERACTIVE_ROLES.contains(&role)
}

/// What a ref remembers about its node: enough to find it again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefEntry {
    pub role: String,
    pub name: String,
    /// Earlier nodes in the same walk with this exact `(role, name)`.
    pub disambiguation_index: usize,
}

/// Result of one snapshot: the rendered text plus the ref table it printed.
///
/// A session is never updated in place. Taking a new snapshot produces a
/// new session and the old one (with every ref it handed out) is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotSession {
    compact: bool,
    text: String,
    refs: BTreeMap<RefToken, RefEntry>,
}

impl SnapshotSession {
    /// Normalize a raw CDP tree and snapshot it in one go.
    pub fn capture(nodes: &[RawAxNode], compact: bool) -> Self {
        let root = normalize_tree(nodes, compact);
        build_snapshot(root.as_ref(), compact)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn compact(&self) -> bool {
        self.compact
    }

    pub fn refs(&self) -> &BTreeMap<RefToken, RefEntry> {
        &self.refs
    }

    pub fn ref_count(&self) -> usize {
        self.refs.len()
    }

    pub fn get(&self, token: &RefToken) -> Option<&RefEntry> {
        self.refs.get(token)
    }

    /// Parse a caller-supplied ref and look it up in this session.
    pub fn lookup(&self, raw: &str) -> Result<(RefToken, &RefEntry)> {
        let token: RefToken = raw.parse()?;
        self.refs
            .get(&token)
            .map(|entry| (token, entry))
            .ok_or_else(|| AxbridgeError::RefNotFound {
                reference: token.to_string(),
            })
    }
}

/// Walk `root` in pre-order, numbering every visited node, and render it.
/// An absent root yields an empty session.
pub fn build_snapshot(root: Option<&AccessibilityNode>, compact: bool) -> SnapshotSession {
    let mut walk = Walk::default();
    if let Some(root) = root {
        walk.visit(root, 0);
    }

    SnapshotSession {
        compact,
        text: walk.lines.join("\n"),
        refs: walk.refs,
    }
}

#[derive(Default)]
struct Walk<'a> {
    sequence: u32,
    seen: HashMap<(&'a str, &'a str), usize>,
    refs: BTreeMap<RefToken, RefEntry>,
    lines: Vec<String>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, node: &'a AccessibilityNode, depth: usize) {
        let token = RefToken::top_level(self.sequence);
        self.sequence += 1;

        let counter = self
            .seen
            .entry((node.role.as_str(), node.name.as_str()))
            .or_insert(0);
        let disambiguation_index = *counter;
        *counter += 1;

        let interactive = is_interactive(&node.role);
        if interactive {
            self.refs.insert(
                token,
                RefEntry {
                    role: node.role.clone(),
                    name: node.name.clone(),
                    disambiguation_index,
                },
            );
        }

        self.lines
            .push(render_line(node, depth, interactive.then_some(token)));

        for child in &node.children {
            self.visit(child, depth + 1);
        }
    }
}

fn render_line(node: &AccessibilityNode, depth: usize, token: Option<RefToken>) -> String {
    let mut parts = Vec::with_capacity(6);

    match token {
        Some(token) => parts.push(format!("[{}] {}", token, node.role)),
        None => parts.push(node.role.clone()),
    }
    if !node.name.is_empty() {
        parts.push(format!("\"{}\"", single_line(&node.name)));
    }
    if let Some(ref value) = node.value {
        parts.push(format!("value=\"{}\"", single_line(value)));
    }
    if let Some(checked) = node.checked {
        parts.push(format!("checked={}", checked.as_str()));
    }
    if node.disabled {
        parts.push("disabled".to_string());
    }
    if node.focused {
        parts.push("focused".to_string());
    }

    format!("{}{}", "  ".repeat(depth), parts.join(" "))
}

// Keeps one node per line and quoted fields unambiguous.
fn single_line(text: &str) -> String {
    text.split(['\n', '\r'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::Checked;

    fn raw_example() -> Vec<RawAxNode> {
        vec![
            RawAxNode::new("1", "RootWebArea")
                .named("Example")
                .with_children(["2", "3"]),
            RawAxNode::new("2", "generic").with_children(["4"]),
            RawAxNode::new("4", "button").named("Go"),
            RawAxNode::new("3", "StaticText").named(""),
        ]
    }

    fn save_form() -> AccessibilityNode {
        AccessibilityNode::new("RootWebArea", "Editor").with_children(vec![
            AccessibilityNode::new("button", "Save"),
            AccessibilityNode::new("button", "Save"),
            AccessibilityNode::new("button", "Save"),
        ])
    }

    fn entries(session: &SnapshotSession) -> Vec<RefEntry> {
        let mut entries: Vec<RefEntry> = session.refs().values().cloned().collect();
        entries.sort();
        entries
    }

    #[test]
    fn example_page_renders_two_lines_and_one_ref() {
        let session = SnapshotSession::capture(&raw_example(), true);

        assert_eq!(session.text(), "RootWebArea \"Example\"\n  [0-1] button \"Go\"");
        assert_eq!(session.ref_count(), 1);

        let (token, entry) = session.lookup("0-1").unwrap();
        assert_eq!(token, RefToken::top_level(1));
        assert_eq!(entry.role, "button");
        assert_eq!(entry.name, "Go");
        assert_eq!(entry.disambiguation_index, 0);
    }

    #[test]
    fn repeated_snapshots_are_identical() {
        let first = SnapshotSession::capture(&raw_example(), false);
        let second = SnapshotSession::capture(&raw_example(), false);

        assert_eq!(first, second);
        assert_eq!(first.text(), second.text());
    }

    #[test]
    fn identical_siblings_are_numbered_in_document_order() {
        let session = build_snapshot(Some(&save_form()), true);

        let indices: Vec<usize> = session
            .refs()
            .values()
            .map(|entry| entry.disambiguation_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(session.get(&RefToken::top_level(3)).unwrap().disambiguation_index, 2);
    }

    #[test]
    fn unnamed_wrapper_with_one_control_keeps_the_control() {
        let raw = vec![
            RawAxNode::new("1", "RootWebArea").with_children(["2", "4"]),
            RawAxNode::new("2", "generic").with_children(["3"]),
            RawAxNode::new("3", "link").named("Docs"),
            RawAxNode::new("4", "generic"),
        ];

        let session = SnapshotSession::capture(&raw, true);

        assert_eq!(session.text(), "RootWebArea\n  [0-1] link \"Docs\"");
        assert_eq!(session.ref_count(), 1);
    }

    #[test]
    fn compaction_keeps_the_same_interactive_entries() {
        let raw = vec![
            RawAxNode::new("1", "RootWebArea").with_children(["2", "6"]),
            RawAxNode::new("2", "generic").with_children(["3", "4"]),
            RawAxNode::new("3", "button").named("Save"),
            RawAxNode::new("4", "none").with_children(["5"]),
            RawAxNode::new("5", "button").named("Save"),
            RawAxNode::new("6", "StaticText").with_children(["7"]),
            RawAxNode::new("7", "textbox").named("Notes"),
        ];

        let compact = SnapshotSession::capture(&raw, true);
        let full = SnapshotSession::capture(&raw, false);

        assert_eq!(entries(&compact), entries(&full));
        assert_eq!(compact.ref_count(), 3);
    }

    #[test]
    fn renders_fields_in_fixed_order() {
        let root = AccessibilityNode::new("RootWebArea", "").with_children(vec![
            AccessibilityNode::new("checkbox", "Remember me")
                .with_value("on")
                .with_checked(Checked::Mixed)
                .disabled()
                .focused(),
            AccessibilityNode::new("heading", "Line one\nLine two"),
        ]);

        let session = build_snapshot(Some(&root), false);
        let lines: Vec<&str> = session.text().lines().collect();

        assert_eq!(
            lines[1],
            "  [0-1] checkbox \"Remember me\" value=\"on\" checked=mixed disabled focused"
        );
        assert_eq!(lines[2], "  heading \"Line one Line two\"");
    }

    #[test]
    fn quotes_in_page_text_stay_inside_their_field() {
        let root = AccessibilityNode::new("RootWebArea", "").with_children(vec![
            AccessibilityNode::new("button", "Say \"hi\" value=\"x\""),
            AccessibilityNode::new("textbox", "Path").with_value("C:\\temp\\"),
        ]);

        let session = build_snapshot(Some(&root), false);
        let lines: Vec<&str> = session.text().lines().collect();

        assert_eq!(lines[1], r#"  [0-1] button "Say \"hi\" value=\"x\"""#);
        assert_eq!(lines[2], r#"  [0-2] textbox "Path" value="C:\\temp\\""#);
        assert_eq!(session.lookup("0-1").unwrap().1.name, "Say \"hi\" value=\"x\"");
    }

    #[test]
    fn sequence_numbers_count_non_interactive_nodes() {
        let root = AccessibilityNode::new("RootWebArea", "").with_children(vec![
            AccessibilityNode::new("heading", "Title"),
            AccessibilityNode::new("paragraph", "")
                .with_children(vec![AccessibilityNode::new("link", "More")]),
        ]);

        let session = build_snapshot(Some(&root), false);
        assert!(session.lookup("0-3").is_ok());
        assert!(matches!(
            session.lookup("0-1"),
            Err(AxbridgeError::RefNotFound { .. })
        ));
    }

    #[test]
    fn refs_from_a_replaced_session_are_rejected() {
        let before = build_snapshot(Some(&save_form()), true);
        assert!(before.lookup("@0-3").is_ok());

        let after = SnapshotSession::capture(&raw_example(), true);
        let err = after.lookup("@0-3").unwrap_err();
        assert!(matches!(err, AxbridgeError::RefNotFound { reference } if reference == "0-3"));
    }

    #[test]
    fn missing_root_yields_empty_session() {
        let session = build_snapshot(None, true);

        assert!(session.text().is_empty());
        assert_eq!(session.ref_count(), 0);
        assert!(session.compact());
    }
}
