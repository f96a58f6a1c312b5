use crate::error::{Error, Result};

/// Capacity doubles up to this many elements, then grows by this many at a time.
pub const LINEAR_GROWTH_THRESHOLD: usize = 64 * 1024;
/// Capacity never shrinks below this.
pub const MIN_CAPACITY: usize = 2 * 1024;

/// A contiguous buffer whose capacity is managed explicitly.
///
/// Capacity grows by doubling until [`LINEAR_GROWTH_THRESHOLD`], then linearly.
/// It only ever shrinks through [`trim_to_max`](Self::trim_to_max) or
/// [`set_capacity`](Self::set_capacity); trimming drops the *oldest* elements.
#[derive(Debug, Clone)]
pub struct GrowableCache<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T: Copy> Default for GrowableCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> GrowableCache<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(MIN_CAPACITY),
            capacity: MIN_CAPACITY,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn append(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.ensure_capacity(self.items.len() + 1);
        }
        self.items.push(item);
    }

    pub fn extend_from_slice(&mut self, items: &[T]) {
        self.ensure_capacity(self.items.len() + items.len());
        self.items.extend_from_slice(items);
    }

    pub fn ensure_capacity(&mut self, min: usize) {
        let mut capacity = self.capacity;
        while capacity < min {
            capacity = grow(capacity);
        }
        if capacity != self.capacity {
            self.reallocate(capacity);
        }
    }

    /// Keeps only the `max` most recently appended elements.
    pub fn trim_to_max(&mut self, max: usize) {
        let len = self.items.len();
        if max >= len {
            return;
        }
        self.items.drain(..len - max);

        let floor = max.max(MIN_CAPACITY);
        let mut capacity = self.capacity;
        while capacity > floor && shrink(capacity) >= floor {
            capacity = shrink(capacity);
        }
        if capacity != self.capacity {
            self.reallocate(capacity);
        }
    }

    /// Reallocates to exactly `capacity`, keeping the newest elements if it is
    /// smaller than the current length.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity < MIN_CAPACITY {
            return Err(Error::InvalidCapacity {
                requested: capacity,
                minimum: MIN_CAPACITY,
            });
        }
        let len = self.items.len();
        if capacity < len {
            self.items.drain(..len - capacity);
        }
        self.reallocate(capacity);
        Ok(())
    }

    /// Empties the cache without giving memory back.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Empties the cache and drops back to the minimum capacity.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn reallocate(&mut self, capacity: usize) {
        debug_assert!(capacity >= self.items.len());
        let mut items = Vec::with_capacity(capacity);
        items.extend_from_slice(&self.items);
        self.items = items;
        self.capacity = capacity;
    }
}

fn grow(capacity: usize) -> usize {
    if capacity <= LINEAR_GROWTH_THRESHOLD {
        capacity * 2
    } else {
        capacity + LINEAR_GROWTH_THRESHOLD
    }
}

// inverse of `grow`
fn shrink(capacity: usize) -> usize {
    if capacity > 2 * LINEAR_GROWTH_THRESHOLD {
        capacity - LINEAR_GROWTH_THRESHOLD
    } else {
        capacity / 2
    }
}
