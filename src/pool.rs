//! Infinite round-robin over a fixed set of items.
//!
//! Used for both verified proxies and request header sets. A pool built from
//! nothing is allowed to exist, but drawing from it is a [`PoolExhausted`]
//! error so the run aborts instead of fetching without a proxy or headers.

use crate::error::PoolExhausted;

/// Round-robin cursor over a fixed list, restartable between runs.
#[derive(Debug, Clone)]
pub struct RotatingPool<T> {
    name: &'static str,
    items: Vec<T>,
    cursor: usize,
}

impl<T: Clone> RotatingPool<T> {
    /// Build a pool positioned at its first item.
    ///
    /// # Arguments
    ///
    /// * `name` - Label used in logs and in [`PoolExhausted`] (`"proxy"`, `"header"`)
    /// * `items` - The rotation order; may be empty
    pub fn new(name: &'static str, items: Vec<T>) -> Self {
        Self {
            name,
            items,
            cursor: 0,
        }
    }

    /// Number of distinct items in the rotation.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The next item, wrapping to the first after the last.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<T, PoolExhausted> {
        let item = self
            .items
            .get(self.cursor)
            .cloned()
            .ok_or(PoolExhausted { pool: self.name })?;
        self.cursor = (self.cursor + 1) % self.items.len();
        Ok(item)
    }

    /// Start over from the first item.
    pub fn restart(&mut self) {
        self.cursor = 0;
    }
}
