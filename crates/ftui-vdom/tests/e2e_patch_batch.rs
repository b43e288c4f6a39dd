//! E2E integration test: component updates flowing through reconciliation,
//! patch application, host objects and lifecycle effects.
//!
//! Validates:
//! 1. Reordering keyed children emits moves only and host moves follow.
//! 2. Prop changes reach the host as a single delta.
//! 3. A root rename replaces the root and tears down every old host.
//! 4. A failing host hook is reported without stopping later patches.
//! 5. Lifecycle effects run after the batch, unmounts first.
//! 6. Weakly bound hosts dropped by the backend stop resolving.

#![forbid(unsafe_code)]

use std::sync::Arc;

use ftui_vdom::error::HostOperation;
use ftui_vdom::prelude::*;
use ftui_vdom::scheduler::EffectResult;
use parking_lot::Mutex;

// ── Backend ─────────────────────────────────────────────────────────────

type Journal = Arc<Mutex<Vec<String>>>;

struct Widget {
    key: NodeKey,
    journal: Journal,
}

impl Widget {
    fn note(&self, event: String) {
        self.journal.lock().push(event);
    }
}

impl HostObject for Widget {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::DESTROY | HostCapabilities::UPDATE_PROPERTIES | HostCapabilities::SET_CHILD_INDEX
    }

    fn destroy(&self) -> HostResult {
        self.note(format!("destroy {}", self.key));
        Ok(())
    }

    fn update_properties(&self, delta: &PropDelta) -> HostResult {
        if delta.set.contains_key("explode") {
            return Err(HostError::new("widget refused update"));
        }
        let mut names: Vec<&str> = delta.set.keys().map(String::as_str).collect();
        names.extend(delta.removed.iter().map(String::as_str));
        self.note(format!("update {} [{}]", self.key, names.join(",")));
        Ok(())
    }

    fn set_child_index(&self, index: usize) -> HostResult {
        self.note(format!("index {} {index}", self.key));
        Ok(())
    }
}

/// Owns every widget it creates until `release` is called.
struct Backend {
    journal: Journal,
    widgets: Mutex<Vec<Arc<dyn HostObject>>>,
}

impl Backend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            journal: Arc::default(),
            widgets: Mutex::new(Vec::new()),
        })
    }

    fn take_journal(&self) -> Vec<String> {
        std::mem::take(&mut *self.journal.lock())
    }

    fn release(&self) {
        self.widgets.lock().clear();
    }
}

impl HostFactory for Backend {
    fn create(&self, node: &HostNodeInfo<'_>) -> Result<Option<Arc<dyn HostObject>>, HostError> {
        self.journal.lock().push(format!("create {}", node.key));
        let widget: Arc<dyn HostObject> = Arc::new(Widget {
            key: node.key.clone(),
            journal: Arc::clone(&self.journal),
        });
        self.widgets.lock().push(Arc::clone(&widget));
        Ok(Some(widget))
    }
}

#[derive(Default)]
struct Listener {
    events: Mutex<Vec<String>>,
}

impl LifecycleListener for Listener {
    fn on_mount(&self, key: &NodeKey, component: &str) -> EffectResult {
        self.events.lock().push(format!("mount {component}#{key}"));
        Ok(())
    }

    fn on_unmount(&self, key: &NodeKey, component: &str) -> EffectResult {
        self.events.lock().push(format!("unmount {component}#{key}"));
        Ok(())
    }
}

fn setup() -> (Arc<Backend>, Arc<Listener>, VTree) {
    let backend = Backend::new();
    let listener = Arc::new(Listener::default());
    let factory: Arc<dyn HostFactory> = backend.clone();
    let patcher = Patcher::new()
        .with_shared_factory(factory)
        .with_listener(listener.clone());
    (backend, listener, VTree::with_patcher(patcher))
}

fn todo_list(items: &[(&str, i64)]) -> Element {
    Element::new("TodoList").key("todos").children(
        items
            .iter()
            .map(|(key, value)| Element::new("Todo").key(*key).prop("value", *value)),
    )
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[test]
fn reorder_emits_moves_only() {
    let (backend, _, tree) = setup();
    tree.add(&todo_list(&[("a", 1), ("b", 1), ("c", 1)]), None)
        .expect("add");
    backend.take_journal();

    let patches = tree
        .update("todos", &todo_list(&[("b", 1), ("a", 1), ("c", 1)]))
        .expect("update");

    assert_eq!(patches, vec![Patch::move_node("b", 0)]);
    assert_eq!(backend.take_journal(), vec!["index b 0"]);
    assert_eq!(
        tree.child_keys("todos"),
        Some(vec![NodeKey::from("b"), "a".into(), "c".into()])
    );
}

#[test]
fn prop_change_reaches_host_once() {
    let (backend, _, tree) = setup();
    tree.add(&todo_list(&[("x", 1)]), None).expect("add");
    backend.take_journal();

    let patches = tree.update("x", &Element::new("Todo").key("x").prop("value", 2)).expect("update");

    assert_eq!(
        patches,
        vec![Patch::update_props("x", PropDelta::default().with("value", 2))]
    );
    assert_eq!(backend.take_journal(), vec!["update x [value]"]);
    assert_eq!(
        tree.props("x").and_then(|p| p.get("value").cloned()),
        Some(PropValue::Int(2))
    );
}

#[test]
fn root_rename_replaces_everything() {
    let (backend, listener, tree) = setup();
    tree.add(&todo_list(&[("a", 1)]), None).expect("add");
    backend.take_journal();
    listener.events.lock().clear();

    let patches = tree
        .update("todos", &Element::new("EmptyState").key("empty"))
        .expect("update");

    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].kind(), PatchKind::ReplaceRoot);
    assert_eq!(
        backend.take_journal(),
        vec!["destroy a", "destroy todos", "create empty"]
    );
    assert_eq!(tree.root_key().as_deref(), Some("empty"));
    assert_eq!(tree.bindings().bound_keys(), vec![NodeKey::from("empty")]);
    assert_eq!(
        *listener.events.lock(),
        vec!["unmount Todo#a", "unmount TodoList#todos", "mount EmptyState#empty"]
    );
}

#[test]
fn failing_update_hook_does_not_stop_the_batch() {
    let (backend, _, tree) = setup();
    tree.add(&todo_list(&[("a", 1), ("b", 1)]), None).expect("add");
    backend.take_journal();

    let report = tree.apply(&[
        Patch::update_props("a", PropDelta::default().with("explode", true)),
        Patch::add_node(Some("todos".into()), 2, VNode::new("Todo").with_key("c")),
        Patch::remove_node("b"),
    ]);

    assert_eq!(report.applied, 3);
    assert!(report.rejected.is_empty());
    assert_eq!(report.host_failures.len(), 1);
    match &report.host_failures[0] {
        VdomError::HostCallbackFailure { key, operation, source } => {
            assert_eq!(key.as_str(), "a");
            assert_eq!(*operation, HostOperation::UpdateProperties);
            assert_eq!(source, &HostError::new("widget refused update"));
        }
        other => panic!("unexpected failure {other:?}"),
    }
    assert_eq!(backend.take_journal(), vec!["create c", "destroy b"]);
    assert_eq!(
        tree.child_keys("todos"),
        Some(vec![NodeKey::from("a"), "c".into()])
    );
    assert_eq!(
        tree.props("a").and_then(|p| p.get("explode").cloned()),
        Some(PropValue::Bool(true)),
        "the tree keeps the update even when the host rejects it"
    );
}

#[test]
fn lifecycle_runs_after_commit_with_unmounts_first() {
    let (_, listener, tree) = setup();
    tree.add(&todo_list(&[("a", 1)]), None).expect("add");
    listener.events.lock().clear();

    tree.update("todos", &todo_list(&[("b", 1)])).expect("update");

    assert_eq!(*listener.events.lock(), vec!["unmount Todo#a", "mount Todo#b"]);
    assert!(!tree.scheduler().in_commit());
    assert_eq!(tree.scheduler().pending(), 0);
}

#[test]
fn dropped_hosts_stop_resolving() {
    let (backend, _, tree) = setup();
    tree.add(&todo_list(&[("a", 1), ("b", 2)]), None).expect("add");
    assert_eq!(tree.bindings().stats().live, 3);

    backend.release();
    assert!(tree.bindings().lookup("a").is_none());
    assert_eq!(tree.bindings().sweep(), 2);
    assert!(tree.bindings().is_empty());

    // Patches still apply to the tree without hosts.
    let report = tree.apply(&[Patch::move_node("b", 0)]);
    assert!(report.is_clean());
    assert_eq!(report.applied, 1);
}

#[test]
fn add_on_empty_tree_is_structural() {
    let (_, _, tree) = setup();
    let key = tree.add(&Element::new("App"), None).expect("add");
    let dirty = tree.consume_dirty_state().expect("dirty");
    assert!(dirty.structural.contains(&key));
    assert!(tree.consume_dirty_state().is_none());
}
