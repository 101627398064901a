//! Tree structure dump, for tests and ad-hoc inspection only (SPEC_FULL.md
//! §3 item 1, grounded in `examples/original_source/test/display/display_test.cpp`).
//! Never called on a hot path; reads optimistically without re-validating
//! version words against concurrent writers, so the result is a best-effort
//! snapshot rather than a linearizable one.

use std::fmt::Write as _;

use crate::link_or_value::LinkOrValue;
use crate::node::{Node, NodePtr};
use crate::tree::Tree;

pub fn display_tree(tree: &Tree) -> String {
    let mut out = String::new();
    let root = tree.root();
    if root.is_null() {
        out.push_str("(empty)\n");
        return out;
    }
    // SAFETY: display is documented as a debug-only, non-linearizable dump;
    // the caller is expected to only use it against a tree no writer is
    // concurrently mutating (tests bracket it accordingly).
    unsafe { display_node(root, 0, &mut out) };
    out
}

unsafe fn display_node(ptr: NodePtr, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let node = &*ptr;
    match node {
        Node::Interior(interior) => {
            let v = node.version().load();
            let _ = writeln!(
                out,
                "{indent}interior root={} vsplit={} keys={:?}",
                v.is_root(),
                v.vsplit(),
                interior.keys()
            );
            for idx in 0..=interior.count() {
                let child = interior.child_at(idx);
                if !child.is_null() {
                    display_node(child, depth + 1, out);
                }
            }
        }
        Node::Border(border) => {
            let v = node.version().load();
            let _ = writeln!(
                out,
                "{indent}border root={} vinsert={} vsplit={}",
                v.is_root(),
                v.vinsert(),
                v.vsplit()
            );
            for (tail, slot) in border.snapshot_entries() {
                match &slot.lv {
                    LinkOrValue::Value(val) => {
                        let _ = writeln!(out, "{indent}  {tail:?} -> {} byte value", val.len());
                    }
                    LinkOrValue::Next(cell) => {
                        let _ = writeln!(out, "{indent}  {tail:?} -> layer:");
                        let next_root = (**cell).load();
                        if !next_root.is_null() {
                            display_node(next_root, depth + 2, out);
                        }
                    }
                    LinkOrValue::Empty => {}
                }
            }
        }
    }
}
