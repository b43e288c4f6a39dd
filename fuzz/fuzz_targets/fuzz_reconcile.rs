#![no_main]

use arbitrary::Arbitrary;
use ftui_vdom::{Reconciler, VNode, VTree};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzNode {
    name: u8,
    key: Option<u8>,
    value: Option<i8>,
    children: Vec<FuzzNode>,
}

/// Build a tree with unique keys, dropping duplicates and capping size.
fn build(shape: &FuzzNode, depth: usize, seen: &mut Vec<u8>, budget: &mut usize) -> VNode {
    let mut node = VNode::new(["a", "b", "c"][usize::from(shape.name % 3)]);
    if let Some(key) = shape.key.map(|k| k % 32)
        && !seen.contains(&key)
    {
        seen.push(key);
        node = node.with_key(format!("k{key}"));
    }
    if let Some(value) = shape.value {
        node = node.with_prop("v", i64::from(value % 4));
    }
    if depth < 4 {
        for child in &shape.children {
            if *budget == 0 {
                break;
            }
            *budget -= 1;
            node = node.with_child(build(child, depth + 1, seen, budget));
        }
    }
    node
}

fn root(shape: &FuzzNode) -> VNode {
    let mut budget = 64;
    let mut seen = Vec::new();
    // Fixed root so the diff exercises children instead of root replacement.
    VNode::new("root")
        .with_key("root")
        .with_child(build(shape, 1, &mut seen, &mut budget))
}

fuzz_target!(|input: (FuzzNode, FuzzNode)| {
    let (old, new) = (root(&input.0), root(&input.1));

    let tree = VTree::new();
    if tree.attach(old, None, 0).is_err() {
        return;
    }
    let Some(live_old) = tree.root_snapshot() else {
        return;
    };

    let reconciler = Reconciler::new();
    let Ok(patches) = reconciler.reconcile(Some(&live_old), Some(&new), None) else {
        return;
    };
    let again = reconciler
        .reconcile(Some(&live_old), Some(&new), None)
        .expect("second run of a successful diff");
    assert_eq!(patches, again, "reconciliation must be deterministic");

    let report = tree.apply(&patches);
    assert!(report.rejected.is_empty(), "rejected: {:?}", report.rejected);
    let live = tree.root_snapshot().expect("root survives");
    assert_eq!(live.subtree_hash(), new.subtree_hash());
});
