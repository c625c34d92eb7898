//! Bounded object pool
//!
//! A LIFO free-list that recycles allocation-heavy values (messages and
//! their payload buffers). Acquiring from an empty pool invokes the
//! factory; releasing into a full pool drops the value, which is the
//! destroy hook in Rust.
//!
//! Ownership is single-threaded; there is no locking.

/// Default number of pooled slots.
pub const DEFAULT_POOL_CAPACITY: usize = 100;

/// Bounded LIFO free-list.
pub struct Pool<T> {
    slots: Vec<T>,
    capacity: usize,
    create: Box<dyn FnMut() -> T>,
}

impl<T> Pool<T> {
    /// Create a pool holding at most `capacity` idle values.
    pub fn new(capacity: usize, create: impl FnMut() -> T + 'static) -> Self {
        Pool {
            slots: Vec::with_capacity(capacity),
            capacity,
            create: Box::new(create),
        }
    }

    /// Create a pool with [`DEFAULT_POOL_CAPACITY`].
    pub fn with_default_capacity(create: impl FnMut() -> T + 'static) -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, create)
    }

    /// Pop the most recently released value, or build a fresh one.
    pub fn acquire(&mut self) -> T {
        self.slots.pop().unwrap_or_else(|| (self.create)())
    }

    /// Return a value to the pool; dropped when the pool is full.
    pub fn release(&mut self, value: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
        }
    }

    /// Number of idle values currently pooled.
    pub fn idle(&self) -> usize {
        self.slots.len()
    }

    /// Maximum number of idle values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
