//! [`RingBuffer`] – fixed-capacity FIFO with oldest-first eviction.
//!
//! Storage is allocated once at construction: a slot array plus a `head`
//! index (the oldest element) and a `len`.  Pushing into a full buffer
//! overwrites the oldest slot and hands the evicted value back to the caller.
//!
//! # Example
//!
//! ```rust
//! use radfuse_perception::ring_buffer::RingBuffer;
//!
//! let mut buf = RingBuffer::new(2);
//! assert_eq!(buf.push("a"), None);
//! assert_eq!(buf.push("b"), None);
//! assert_eq!(buf.push("c"), Some("a")); // oldest evicted
//!
//! let items: Vec<_> = buf.iter().copied().collect();
//! assert_eq!(items, ["b", "c"]);
//! ```

/// Fixed-capacity ring buffer.  `len() <= capacity()` at all times.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Index of the oldest element.
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` elements.
    ///
    /// A `capacity` of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append `value` as the newest element.
    ///
    /// When the buffer is full the oldest element is removed first and
    /// returned.
    pub fn push(&mut self, value: T) -> Option<T> {
        let capacity = self.capacity();
        if self.is_full() {
            let evicted = self.slots[self.head].replace(value);
            self.head = (self.head + 1) % capacity;
            evicted
        } else {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = Some(value);
            self.len += 1;
            None
        }
    }

    /// The oldest element, if any.
    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    /// The newest element, if any.
    pub fn newest(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Element at chronological position `index` (0 = oldest).
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.slots[self.physical(index)].as_ref()
    }

    /// Mutable access to the element `k` positions back from the newest end,
    /// where `k = 1` is the newest element itself.
    ///
    /// Returns `None` when `k` is 0 or exceeds `len()`.
    pub fn nth_newest_mut(&mut self, k: usize) -> Option<&mut T> {
        if k == 0 || k > self.len {
            return None;
        }
        let slot = self.physical(self.len - k);
        self.slots[slot].as_mut()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.slots[self.physical(i)].as_ref())
    }

    fn physical(&self, index: usize) -> usize {
        (self.head + index) % self.capacity()
    }
}
