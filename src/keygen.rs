//! Short key generation
//!
//! Keys are drawn from a non-cryptographic RNG and are not guaranteed to be
//! unique. Stores detect collisions and re-roll once.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Default number of characters in a short key
pub const DEFAULT_KEY_LENGTH: usize = 8;

/// Source of candidate short keys
pub trait KeyGenerator: Send + Sync {
    /// Produce a candidate key. Always succeeds.
    fn generate(&self) -> String;
}

/// Fixed-length alphanumeric keys from the thread-local RNG
#[derive(Debug, Clone)]
pub struct RandomKeyGenerator {
    length: usize,
}

impl RandomKeyGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomKeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_LENGTH)
    }
}

impl KeyGenerator for RandomKeyGenerator {
    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }
}

/// Generate a key of the default length
pub fn generate() -> String {
    RandomKeyGenerator::default().generate()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::KeyGenerator;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out a scripted sequence of keys, then falls back to random ones
    pub struct ScriptedKeyGenerator {
        keys: Mutex<VecDeque<String>>,
    }

    impl ScriptedKeyGenerator {
        pub fn new<I, S>(keys: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                keys: Mutex::new(keys.into_iter().map(Into::into).collect()),
            }
        }
    }

    impl KeyGenerator for ScriptedKeyGenerator {
        fn generate(&self) -> String {
            self.keys
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(super::generate)
        }
    }
}
