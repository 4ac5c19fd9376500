//! A resource that is rebuilt on demand.

/// Holds a resource together with the key it is valid for.
///
/// The resource is rebuilt when it is requested for a different key, when none was built yet
/// or after [`CachedResource::invalidate`]. Otherwise the existing instance is handed out.
#[derive(Debug)]
pub struct CachedResource<K, R> {
    entry: Option<(K, R)>,
    stale: bool,
    builds: u64,
}

impl<K: PartialEq, R> CachedResource<K, R> {
    /// Creates an empty cache.
    pub const fn new() -> Self {
        Self { entry: None, stale: false, builds: 0 }
    }

    /// Returns the resource for `key`, building it with `build` if the cached one is missing,
    /// bound to another key or invalidated.
    ///
    /// If `build` fails the cache is left empty.
    pub fn get_or_rebuild<E>(
        &mut self,
        key: K,
        build: impl FnOnce(&K) -> Result<R, E>,
    ) -> Result<&mut R, E> {
        let entry = match self.entry.take() {
            Some((cached, resource)) if !self.stale && cached == key => (cached, resource),
            _ => {
                let resource = build(&key)?;
                self.stale = false;
                self.builds += 1;
                (key, resource)
            }
        };
        Ok(&mut self.entry.insert(entry).1)
    }

    /// Makes sure the resource is valid for `key`, building it if needed.
    ///
    /// Returns true if a new resource was built.
    pub fn refresh<E>(
        &mut self,
        key: K,
        build: impl FnOnce(&K) -> Result<R, E>,
    ) -> Result<bool, E> {
        let before = self.builds;
        self.get_or_rebuild(key, build)?;
        Ok(self.builds != before)
    }

    /// Returns the cached resource unless it was invalidated.
    pub fn get_mut(&mut self) -> Option<&mut R> {
        if self.stale {
            return None
        }
        self.entry.as_mut().map(|(_, resource)| resource)
    }

    /// Forces a rebuild on the next [`CachedResource::get_or_rebuild`].
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Returns true if the next request for `key` reuses the cached resource.
    pub fn is_valid_for(&self, key: &K) -> bool {
        !self.stale && self.entry.as_ref().is_some_and(|(cached, _)| cached == key)
    }

    /// Key of the cached resource, if any.
    pub fn key(&self) -> Option<&K> {
        self.entry.as_ref().map(|(key, _)| key)
    }

    /// Number of times a resource was built. Increases by one per rebuild.
    pub const fn builds(&self) -> u64 {
        self.builds
    }
}

impl<K: PartialEq, R> Default for CachedResource<K, R> {
    fn default() -> Self {
        Self::new()
    }
}
