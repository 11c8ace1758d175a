//! Accessibility-tree snapshots and ref resolution.
//!
//! A snapshot walks the page's accessibility tree, prints it as indented text
//! and hands out short ref tokens (`0-5`) for interactive nodes. A later action
//! resolves the token back to a live element by role and accessible name,
//! since the tree is rebuilt from scratch on every snapshot.

mod node;
mod normalize;
mod resolve;
mod snapshot;
mod token;

pub use node::{AccessibilityNode, Checked};
pub use normalize::{normalize_tree, walk_order, AxProperty, AxValue, RawAxNode, NOISE_ROLES};
pub use resolve::{ActionRunner, FallbackPolicy, LivePage, Locator, RoleQuery};
pub use snapshot::{build_snapshot, is_interactive, RefEntry, SnapshotSession, INTERACTIVE_ROLES};
pub use token::RefToken;
