//! Hash containers used by the engine's relation tables.
//!
//! The default build uses `hashbrown` with `ahash`; the `std-hash` feature
//! swaps in `std::collections` for environments that want a single hasher.

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub type HashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
    pub type HashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;
}

/// Empty map with the active hasher.
#[inline]
pub fn new_map<K, V>() -> map::HashMap<K, V> {
    map::HashMap::default()
}

/// Empty set with the active hasher.
#[inline]
pub fn new_set<K>() -> map::HashSet<K> {
    map::HashSet::default()
}
