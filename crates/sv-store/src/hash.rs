//! Content digest of a finalized store.

use sha2::{Digest, Sha256};
use std::fs;

use crate::store::{ATTRIBUTES_FILE, MANIFEST_FILE, run_dir, series_path};
use crate::{RunStore, StoreResult};

/// SHA-256 over the manifest and every run's attributes and series, in
/// creation order. Two stores with equal digests hold byte-identical files.
pub fn digest(store: &RunStore) -> StoreResult<String> {
    let root = store.path();
    let mut hasher = Sha256::new();

    hasher.update(MANIFEST_FILE.as_bytes());
    hasher.update(fs::read(root.join(MANIFEST_FILE))?);

    for run_id in store.run_ids() {
        hasher.update(run_id.as_bytes());
        hasher.update(fs::read(run_dir(root, run_id).join(ATTRIBUTES_FILE))?);
        for index in 0..store.variables().len() {
            hasher.update(index.to_le_bytes());
            hasher.update(fs::read(series_path(root, run_id, index))?);
        }
    }

    let result = hasher.finalize();
    Ok(format!("{:x}", result))
}
