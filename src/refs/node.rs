use serde::Serialize;

/// Tri-state `checked` as reported for checkboxes, radios and switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Checked {
    True,
    False,
    Mixed,
}

impl Checked {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checked::True => "true",
            Checked::False => "false",
            Checked::Mixed => "mixed",
        }
    }
}

impl From<bool> for Checked {
    fn from(value: bool) -> Self {
        if value {
            Checked::True
        } else {
            Checked::False
        }
    }
}

/// A node of the canonical accessibility tree. Children are owned.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessibilityNode {
    pub role: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<Checked>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub focused: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AccessibilityNode>,
}

impl AccessibilityNode {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Neutral unnamed container standing in for an elided wrapper.
    pub fn group(children: Vec<AccessibilityNode>) -> Self {
        Self {
            role: "group".to_string(),
            children,
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<AccessibilityNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_checked(mut self, checked: Checked) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn focused(mut self) -> Self {
        self.focused = true;
        self
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(AccessibilityNode::subtree_size).sum::<usize>()
    }
}
