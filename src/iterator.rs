use crate::{
    config::IteratorOptions,
    engine::Engine,
    index::IndexIterator,
};

/// Ordered cursor over the live keys of an [`Engine`].
///
/// The key set and record positions are captured when the iterator is
/// created; writes made afterwards (including overwrites of keys the
/// iterator will visit) are invisible to it.
pub struct Iter<'a> {
    engine: &'a Engine,
    inner: Box<dyn IndexIterator>,
    options: IteratorOptions,
    exhausted: bool,
}

impl Engine {
    /// Returns an iterator using the engine's default iterator options.
    #[must_use]
    pub fn iterator(&self) -> Iter<'_> {
        self.iterator_with(self.config.iterator.clone())
    }

    /// Returns an iterator with explicit options.
    #[must_use]
    pub fn iterator_with(&self, options: IteratorOptions) -> Iter<'_> {
        let inner = {
            let _state = self.state.read().expect("lock is poisoned");
            self.index.iter(options.reverse)
        };

        let mut iter = Iter {
            engine: self,
            inner,
            options,
            exhausted: false,
        };
        iter.skip_to_prefix();
        iter
    }
}

impl Iter<'_> {
    /// Repositions the cursor at the first matching key.
    pub fn rewind(&mut self) {
        self.exhausted = false;
        self.inner.rewind();
        self.skip_to_prefix();
    }

    /// Positions the cursor at the first matching key `>= key`
    /// (`<= key` when iterating in reverse).
    pub fn seek(&mut self, key: &[u8]) {
        self.exhausted = false;
        self.inner.seek(key);
        self.skip_to_prefix();
    }

    /// Advances the cursor to the next matching key.
    // NOTE: Cursor-style next, intentionally not std::iter::Iterator
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        self.inner.next();
        self.skip_to_prefix();
    }

    /// Whether the cursor points at an entry.
    #[must_use]
    pub fn valid(&self) -> bool {
        !self.exhausted && self.inner.valid()
    }

    /// Key of the current entry.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not valid.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    /// Value of the current entry, read from disk.
    ///
    /// Returns the value that was current when the iterator was created,
    /// even if the key has been overwritten since.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the engine is closed or the read fails.
    pub fn value(&self) -> crate::Result<Vec<u8>> {
        let pos = self.inner.value();

        let state = self.engine.state.read().expect("lock is poisoned");
        if state.closed {
            return Err(crate::Error::Closed);
        }

        self.engine.read_value(&state, pos)
    }

    /// Skips ahead until the current key matches the prefix filter.
    ///
    /// Once the ordered scan has moved past the prefix region no further
    /// key can match, so the cursor is marked exhausted instead of
    /// walking the rest of the snapshot.
    fn skip_to_prefix(&mut self) {
        let prefix = &self.options.prefix;
        if prefix.is_empty() {
            return;
        }

        while self.inner.valid() {
            let key = self.inner.key();

            if key.starts_with(prefix) {
                return;
            }

            let past_prefix_region = if self.options.reverse {
                key < prefix.as_slice()
            } else {
                key > prefix.as_slice()
            };

            if past_prefix_region {
                self.exhausted = true;
                return;
            }

            self.inner.next();
        }
    }
}
