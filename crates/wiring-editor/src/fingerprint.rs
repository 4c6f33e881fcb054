/// Content key of the last build of a derived value.
///
/// A build should only run when [`Fingerprint::advance`] reports the key
/// changed. The build counter increments on every accepted key.
#[derive(Debug, Clone)]
pub struct Fingerprint<K> {
    last_key: Option<K>,
    builds: u64,
}

impl<K> Default for Fingerprint<K> {
    fn default() -> Self {
        Self {
            last_key: None,
            builds: 0,
        }
    }
}

impl<K: PartialEq> Fingerprint<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_current(&self, key: &K) -> bool {
        self.last_key.as_ref() == Some(key)
    }

    /// Record `key`; true when it differs from the last one.
    pub fn advance(&mut self, key: K) -> bool {
        if self.is_current(&key) {
            return false;
        }
        self.last_key = Some(key);
        self.builds = self.builds.wrapping_add(1);
        true
    }

    /// Remember `key` without counting a build, for results that were
    /// produced and persisted in the same step.
    pub fn settle(&mut self, key: K) {
        self.last_key = Some(key);
    }

    /// Force the next [`Fingerprint::advance`] to report a change.
    pub fn invalidate(&mut self) {
        self.last_key = None;
    }

    pub fn builds(&self) -> u64 {
        self.builds
    }
}
