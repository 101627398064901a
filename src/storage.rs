//! Storage-name registry (ambient; spec.md §1 "Out of scope" / §6 API).
//!
//! A simple name→tree-root map, kept deliberately thin and guarded by a
//! single `RwLock`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::ops;
use crate::status::Status;
use crate::tree::Tree;

#[derive(Default)]
pub struct StorageRegistry {
    trees: RwLock<HashMap<String, Arc<Tree>>>,
}

impl StorageRegistry {
    pub fn new() -> StorageRegistry {
        StorageRegistry::default()
    }

    pub fn create_storage(&self, name: &str) -> Status {
        let mut trees = self.trees.write().unwrap();
        if trees.contains_key(name) {
            return Status::WarnExist;
        }
        trees.insert(name.to_string(), Arc::new(Tree::new()));
        Status::Ok
    }

    pub fn delete_storage(&self, name: &str) -> Status {
        let mut trees = self.trees.write().unwrap();
        match trees.remove(name) {
            // SAFETY: the tree has just been removed from the registry under
            // the write lock, so no new operation can start on it; callers
            // are documented (the same precondition `Context::destroy` and
            // `fin` rely on) as not calling `delete_storage` concurrently
            // with in-flight operations on the storage being deleted.
            Some(tree) => {
                unsafe { ops::free_subtree(tree.root()) };
                Status::Ok
            }
            None => Status::WarnStorageNotExist,
        }
    }

    pub fn find_storage(&self, name: &str) -> Option<Arc<Tree>> {
        self.trees.read().unwrap().get(name).cloned()
    }

    /// Drain every storage, handing each tree's live nodes back to the
    /// caller for teardown (`destroy`, spec.md §6 / SPEC_FULL.md §3 item 2).
    pub fn drain(&self) -> Vec<Arc<Tree>> {
        self.trees.write().unwrap().drain().map(|(_, t)| t).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.trees.read().unwrap().keys().cloned().collect()
    }
}
