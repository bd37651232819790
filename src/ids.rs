//! Deterministic ID schemes for trees, nodes, and embeddings.
//!
//! Leaf and tree IDs are pure functions of document/tree identity so a
//! retried build reuses the same IDs and insert-if-absent semantics make
//! the retry safe. Summary node IDs include a random suffix since there is
//! no natural deterministic key for a cluster beyond its (level, group)
//! position, which is itself not guaranteed stable across retries with a
//! nondeterministic clusterer.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::db::OwnerKind;

pub fn tree_id(document_id: &str) -> String {
    format!("{document_id}::tree")
}

pub fn leaf_node_id(tree_id: &str, index: usize) -> String {
    format!("{tree_id}::leaf::{index:06}")
}

pub fn summary_node_id(tree_id: &str, level: usize, group_index: usize) -> String {
    format!("{tree_id}::L{level}::{group_index}::{}", random_suffix(6))
}

pub fn embedding_id(owner_kind: OwnerKind, owner_id: &str) -> String {
    format!("{owner_kind}::{owner_id}")
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
