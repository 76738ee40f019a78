use crate::ui::catalog::{validate_props, Catalog, ComponentKind, PropViolation};
use crate::ui::patch::PatchOp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    #[serde(default)]
    pub props: serde_json::Map<String, Value>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(skip)]
    pub parent_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiTree {
    pub root: Option<String>,
    pub elements: BTreeMap<String, Element>,
}

impl UiTree {
    pub fn get(&self, key: &str) -> Option<&Element> {
        self.elements.get(key)
    }

    pub fn reachable_keys(&self) -> BTreeSet<String> {
        let mut reachable = BTreeSet::new();
        let Some(root) = &self.root else {
            return reachable;
        };
        let mut stack = vec![root.clone()];
        while let Some(key) = stack.pop() {
            if !self.elements.contains_key(&key) || !reachable.insert(key.clone()) {
                continue;
            }
            if let Some(element) = self.elements.get(&key) {
                for child in &element.children {
                    stack.push(child.clone());
                }
            }
        }
        reachable
    }

    pub fn dangling_keys(&self) -> BTreeSet<String> {
        let reachable = self.reachable_keys();
        self.elements
            .keys()
            .filter(|key| !reachable.contains(*key))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Streaming,
    Finalized,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeWarning {
    KeyMismatch {
        path_key: String,
        element_key: String,
    },
    UnknownComponent {
        key: String,
        kind: String,
    },
    PropDropped {
        key: String,
        violation: PropViolation,
    },
    ChildrenIgnored {
        key: String,
        kind: String,
    },
    CycleRejected {
        key: String,
    },
    RootRedefined {
        previous: String,
        replacement: String,
    },
    PatchAfterFinalize,
}

impl fmt::Display for TreeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyMismatch {
                path_key,
                element_key,
            } => write!(
                f,
                "patch dropped: path names `{path_key}` but element key is `{element_key}`"
            ),
            Self::UnknownComponent { key, kind } => {
                write!(f, "element `{key}` has unknown component type `{kind}`")
            }
            Self::PropDropped { key, violation } => {
                write!(f, "element `{key}`: {violation}")
            }
            Self::ChildrenIgnored { key, kind } => write!(
                f,
                "element `{key}`: `{kind}` does not accept children, ignoring them"
            ),
            Self::CycleRejected { key } => {
                write!(f, "patch dropped: element `{key}` would close a cycle")
            }
            Self::RootRedefined {
                previous,
                replacement,
            } => write!(f, "root redefined from `{previous}` to `{replacement}`"),
            Self::PatchAfterFinalize => write!(f, "patch arrived after the stream finalized"),
        }
    }
}

// One builder per generation request. Patches are applied in arrival order
// with last-write-wins set semantics; recoverable faults become warnings
// instead of aborting the stream.
pub struct TreeBuilder {
    catalog: Arc<Catalog>,
    tree: UiTree,
    phase: Phase,
    parents: BTreeMap<String, String>,
    warnings: Vec<TreeWarning>,
}

impl TreeBuilder {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            tree: UiTree::default(),
            phase: Phase::Empty,
            parents: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == Phase::Streaming
    }

    pub fn tree(&self) -> &UiTree {
        &self.tree
    }

    pub fn drain_warnings(&mut self) -> Vec<TreeWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn apply(&mut self, op: PatchOp) {
        if self.phase == Phase::Finalized {
            self.push_warning(TreeWarning::PatchAfterFinalize);
            return;
        }
        self.phase = Phase::Streaming;

        match op {
            PatchOp::SetRoot { key } => self.set_root(key),
            PatchOp::SetElement { key, element } => self.set_element(key, element),
        }
    }

    pub fn finish(&mut self) {
        self.phase = Phase::Finalized;
        let dangling = self.tree.dangling_keys();
        if !dangling.is_empty() {
            // Expected under streaming; excluded from render, kept in the map.
            tracing::debug!(count = dangling.len(), "stream finalized with dangling elements");
        }
    }

    fn set_root(&mut self, key: String) {
        if let Some(previous) = &self.tree.root {
            if previous != &key {
                self.push_warning(TreeWarning::RootRedefined {
                    previous: previous.clone(),
                    replacement: key.clone(),
                });
            }
        }
        self.tree.root = Some(key);
    }

    fn set_element(&mut self, path_key: String, mut element: Element) {
        if element.key != path_key {
            self.push_warning(TreeWarning::KeyMismatch {
                path_key,
                element_key: element.key,
            });
            return;
        }

        if self.would_close_cycle(&element.key, &element.children) {
            self.push_warning(TreeWarning::CycleRejected { key: element.key });
            return;
        }

        let catalog = Arc::clone(&self.catalog);
        match catalog.component(element.kind.as_str()) {
            None => {
                // Kept in the tree so later patches can still reference it;
                // the renderer substitutes a placeholder.
                self.push_warning(TreeWarning::UnknownComponent {
                    key: element.key.clone(),
                    kind: element.kind.as_str().to_string(),
                });
            }
            Some(spec) => {
                let (kept, violations) = validate_props(&spec.props, &element.props);
                for violation in violations {
                    self.push_warning(TreeWarning::PropDropped {
                        key: element.key.clone(),
                        violation,
                    });
                }
                element.props = kept.into_iter().collect();

                if !spec.has_children && !element.children.is_empty() {
                    self.push_warning(TreeWarning::ChildrenIgnored {
                        key: element.key.clone(),
                        kind: element.kind.as_str().to_string(),
                    });
                }
            }
        }

        self.relink_parents(&element);
        element.parent_key = self.parents.get(&element.key).cloned();
        self.tree.elements.insert(element.key.clone(), element);
    }

    // The protocol has no reparent op, so a cycle can only appear when a
    // patched element's child list leads back to the element itself.
    fn would_close_cycle(&self, key: &str, children: &[String]) -> bool {
        let mut stack: Vec<&str> = children.iter().map(String::as_str).collect();
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == key {
                return true;
            }
            if !visited.insert(current.to_string()) {
                continue;
            }
            if let Some(element) = self.tree.elements.get(current) {
                for child in &element.children {
                    stack.push(child);
                }
            }
        }
        false
    }

    fn relink_parents(&mut self, element: &Element) {
        // Children no longer listed lose their back-reference.
        let stale: Vec<String> = self
            .parents
            .iter()
            .filter(|(child, parent)| {
                *parent == &element.key && !element.children.contains(child)
            })
            .map(|(child, _)| child.clone())
            .collect();
        for child in stale {
            self.parents.remove(&child);
            if let Some(existing) = self.tree.elements.get_mut(&child) {
                existing.parent_key = None;
            }
        }

        for child in &element.children {
            self.parents.insert(child.clone(), element.key.clone());
            if let Some(existing) = self.tree.elements.get_mut(child) {
                existing.parent_key = Some(element.key.clone());
            }
        }
    }

    fn push_warning(&mut self, warning: TreeWarning) {
        warn!(%warning, "tree builder");
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::patch::{parse_line, PatchDecoder};
    use serde_json::json;

    fn builder() -> TreeBuilder {
        TreeBuilder::new(Arc::new(Catalog::builtin()))
    }

    fn apply_line(builder: &mut TreeBuilder, line: &str) {
        let op = parse_line(line).expect("test line should parse");
        builder.apply(op);
    }

    fn element_line(value: serde_json::Value) -> String {
        let key = value
            .get("key")
            .and_then(|key| key.as_str())
            .expect("fixture element has a key")
            .to_string();
        json!({ "op": "set", "path": format!("/elements/{key}"), "value": value }).to_string()
    }

    #[test]
    fn dangling_child_reference_is_tolerated() {
        // Scenario A: root Container lists a child that never arrives.
        let mut builder = builder();
        apply_line(&mut builder, r#"{"op":"set","path":"/root","value":"r"}"#);
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "r", "type": "Container", "props": {}, "children": ["c"] })),
        );
        builder.finish();

        let tree = builder.tree();
        assert_eq!(tree.root.as_deref(), Some("r"));
        assert!(tree.get("c").is_none());
        assert_eq!(tree.reachable_keys().len(), 1);
        assert!(builder.drain_warnings().is_empty());
    }

    #[test]
    fn key_path_mismatch_drops_the_patch() {
        // Scenario B: value.key says "x", path says "y".
        let mut builder = builder();
        let line = json!({
            "op": "set",
            "path": "/elements/y",
            "value": { "key": "x", "type": "Divider" }
        })
        .to_string();
        apply_line(&mut builder, &line);

        assert!(builder.tree().elements.is_empty());
        let warnings = builder.drain_warnings();
        assert!(matches!(
            warnings.as_slice(),
            [TreeWarning::KeyMismatch { path_key, element_key }]
                if path_key == "y" && element_key == "x"
        ));
    }

    #[test]
    fn later_patch_for_same_key_wins_wholesale() {
        // Scenario C: no partial-field merge.
        let mut builder = builder();
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "t", "type": "Text", "props": { "text": "first", "tone": "muted" } })),
        );
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "t", "type": "Text", "props": { "text": "second" } })),
        );

        let element = builder.tree().get("t").expect("element should exist");
        assert_eq!(element.props.get("text"), Some(&json!("second")));
        assert!(element.props.get("tone").is_none());
    }

    #[test]
    fn reapplying_the_final_stream_is_idempotent() {
        let ops: Vec<_> = [
            r#"{"op":"set","path":"/root","value":"r"}"#.to_string(),
            element_line(json!({ "key": "r", "type": "Container", "props": {}, "children": ["h", "m"] })),
            element_line(json!({ "key": "h", "type": "Heading", "props": { "text": "Overview" } })),
            element_line(json!({ "key": "m", "type": "Metric", "props": { "label": "Nodes", "value": 12 } })),
        ]
        .iter()
        .map(|line| parse_line(line).expect("fixture line should parse"))
        .collect();

        let mut once = builder();
        for op in &ops {
            once.apply(op.clone());
        }

        let mut twice = builder();
        for op in ops.iter().chain(ops.iter()) {
            twice.apply(op.clone());
        }

        assert_eq!(once.tree(), twice.tree());
    }

    #[test]
    fn cycle_closing_patch_is_rejected() {
        let mut builder = builder();
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "a", "type": "Container", "children": ["b"] })),
        );
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "b", "type": "Container", "children": ["a"] })),
        );

        // "b" would make "a" its own ancestor; the tree keeps only "a".
        assert!(builder.tree().get("a").is_some());
        assert!(builder.tree().get("b").is_none());
        assert!(builder
            .drain_warnings()
            .iter()
            .any(|warning| matches!(warning, TreeWarning::CycleRejected { key } if key == "b")));
    }

    #[test]
    fn self_referential_child_is_rejected() {
        let mut builder = builder();
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "loop", "type": "Container", "children": ["loop"] })),
        );
        assert!(builder.tree().elements.is_empty());
    }

    #[test]
    fn unknown_component_is_kept_but_flagged() {
        let mut builder = builder();
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "w", "type": "Widget3000", "props": { "anything": 1 } })),
        );

        let element = builder.tree().get("w").expect("element should be kept");
        assert_eq!(element.kind, ComponentKind::Unknown("Widget3000".to_string()));
        // Props stay untouched since there is no schema to check against.
        assert_eq!(element.props.get("anything"), Some(&json!(1)));
        assert!(builder
            .drain_warnings()
            .iter()
            .any(|warning| matches!(warning, TreeWarning::UnknownComponent { key, .. } if key == "w")));
    }

    #[test]
    fn invalid_prop_is_dropped_without_losing_the_element() {
        let mut builder = builder();
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "b", "type": "Badge", "props": { "text": "ok", "tone": "sparkly" } })),
        );

        let element = builder.tree().get("b").expect("element should exist");
        assert_eq!(element.props.get("text"), Some(&json!("ok")));
        assert!(element.props.get("tone").is_none());
        assert!(builder
            .drain_warnings()
            .iter()
            .any(|warning| matches!(warning, TreeWarning::PropDropped { key, .. } if key == "b")));
    }

    #[test]
    fn root_redefinition_wins_but_warns() {
        let mut builder = builder();
        apply_line(&mut builder, r#"{"op":"set","path":"/root","value":"first"}"#);
        apply_line(&mut builder, r#"{"op":"set","path":"/root","value":"second"}"#);

        assert_eq!(builder.tree().root.as_deref(), Some("second"));
        assert!(builder
            .drain_warnings()
            .iter()
            .any(|warning| matches!(warning, TreeWarning::RootRedefined { .. })));
    }

    #[test]
    fn phases_progress_and_finalized_is_terminal() {
        let mut builder = builder();
        assert_eq!(builder.phase(), Phase::Empty);
        assert!(!builder.is_streaming());

        apply_line(&mut builder, r#"{"op":"set","path":"/root","value":"r"}"#);
        assert_eq!(builder.phase(), Phase::Streaming);
        assert!(builder.is_streaming());

        builder.finish();
        assert_eq!(builder.phase(), Phase::Finalized);

        apply_line(&mut builder, r#"{"op":"set","path":"/root","value":"late"}"#);
        assert_eq!(builder.tree().root.as_deref(), Some("r"));
        assert!(builder
            .drain_warnings()
            .iter()
            .any(|warning| matches!(warning, TreeWarning::PatchAfterFinalize)));
    }

    #[test]
    fn parent_links_follow_the_latest_child_lists() {
        let mut builder = builder();
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "kid", "type": "Divider" })),
        );
        apply_line(
            &mut builder,
            &element_line(json!({ "key": "box", "type": "Container", "children": ["kid"] })),
        );
        assert_eq!(
            builder.tree().get("kid").and_then(|kid| kid.parent_key.as_deref()),
            Some("box")
        );

        apply_line(
            &mut builder,
            &element_line(json!({ "key": "box", "type": "Container", "children": [] })),
        );
        assert!(builder
            .tree()
            .get("kid")
            .and_then(|kid| kid.parent_key.as_deref())
            .is_none());
    }

    #[test]
    fn fixture_stream_builds_a_clean_tree() {
        let mut decoder = PatchDecoder::new();
        let mut builder = builder();
        for result in decoder.push_chunk(include_str!("fixture.ndjson")) {
            builder.apply(result.expect("fixture lines should parse"));
        }
        if let Some(result) = decoder.finish() {
            builder.apply(result.expect("fixture tail should parse"));
        }
        builder.finish();

        let tree = builder.tree();
        assert!(tree.root.is_some());
        assert!(tree.dangling_keys().is_empty());
        assert!(builder.drain_warnings().is_empty());
    }
}
