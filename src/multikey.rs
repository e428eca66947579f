use smallvec::SmallVec;

/// Decides whether two keys are the same for the purposes of a [`MultiKeyCache`].
pub trait KeyEq<K> {
    fn key_eq(&self, a: &K, b: &K) -> bool;
}

/// Keys are the same when they are `==`.
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl<K: PartialEq> KeyEq<K> for Identity {
    fn key_eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

pub(crate) type Keys<K> = SmallVec<[K; 8]>;

/// An append-only map from sequences of keys to values.
///
/// Lookups compare the stored sequences one by one, element by element, using `E`. That's linear
/// in the number of entries, which is fine for the tens of layouts and sets a renderer creates,
/// and it lets `E` compare keys in ways a hash couldn't.
#[derive(Clone, Debug)]
pub struct MultiKeyCache<K, V, E = Identity> {
    entries: Vec<(Keys<K>, V)>,
    eq: E,
}

impl<K, V, E: Default> Default for MultiKeyCache<K, V, E> {
    fn default() -> Self {
        Self::with_eq(E::default())
    }
}

impl<K, V> MultiKeyCache<K, V, Identity> {
    pub fn new() -> Self {
        Self::with_eq(Identity)
    }
}

impl<K, V, E> MultiKeyCache<K, V, E> {
    pub fn with_eq(eq: E) -> Self {
        Self {
            entries: vec![],
            eq,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[K], &V)> {
        self.entries.iter().map(|(keys, value)| (&keys[..], value))
    }

    /// Remove every entry `predicate` returns true for, and hand them back.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&[K], &V) -> bool) -> Vec<V> {
        let mut removed = vec![];
        let mut i = 0;

        while i < self.entries.len() {
            let (keys, value) = &self.entries[i];
            if predicate(keys, value) {
                removed.push(self.entries.swap_remove(i).1);
            } else {
                i += 1;
            }
        }

        removed
    }

    /// Remove and return every value.
    pub fn drain(&mut self) -> impl Iterator<Item = V> + '_ {
        self.entries.drain(..).map(|(_, value)| value)
    }
}

impl<K: Clone, V, E: KeyEq<K>> MultiKeyCache<K, V, E> {
    /// Store `value` under `keys`. Callers look up first; a second insert under equal keys is
    /// shadowed by the first.
    pub fn insert(&mut self, keys: &[K], value: V) {
        self.entries.push((keys.iter().cloned().collect(), value));
    }

    pub fn get(&self, keys: &[K]) -> Option<&V> {
        self.entries
            .iter()
            .find(|(stored, _)| self.keys_eq(stored, keys))
            .map(|(_, value)| value)
    }

    fn keys_eq(&self, stored: &[K], keys: &[K]) -> bool {
        stored.len() == keys.len()
            && stored
                .iter()
                .zip(keys)
                .all(|(stored, key)| self.eq.key_eq(stored, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Treats keys as equal when they agree modulo 10.
    #[derive(Default)]
    struct LastDigit;

    impl KeyEq<u32> for LastDigit {
        fn key_eq(&self, a: &u32, b: &u32) -> bool {
            a % 10 == b % 10
        }
    }

    #[test]
    fn identity_lookup() {
        let mut cache = MultiKeyCache::new();
        cache.insert(&[Some(1), None, Some(3)], "a");
        cache.insert(&[Some(1), None], "b");

        assert_eq!(cache.get(&[Some(1), None, Some(3)]), Some(&"a"));
        assert_eq!(cache.get(&[Some(1), None]), Some(&"b"));
        assert_eq!(cache.get(&[Some(1)]), None);
        assert_eq!(cache.get(&[Some(1), Some(2), Some(3)]), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn empty_key_sequence_is_a_key() {
        let mut cache: MultiKeyCache<u32, u32> = MultiKeyCache::new();
        assert_eq!(cache.get(&[]), None);

        cache.insert(&[], 7);
        assert_eq!(cache.get(&[]), Some(&7));
    }

    #[test]
    fn injected_comparer() {
        let mut cache = MultiKeyCache::with_eq(LastDigit);
        cache.insert(&[1, 22], 'x');

        assert_eq!(cache.get(&[11, 2]), Some(&'x'));
        assert_eq!(cache.get(&[11, 3]), None);
    }

    #[test]
    fn first_insert_wins() {
        let mut cache = MultiKeyCache::new();
        cache.insert(&[1u8], 1);
        cache.insert(&[1u8], 2);

        assert_eq!(cache.get(&[1]), Some(&1));
    }

    #[test]
    fn remove_where_returns_removed() {
        let mut cache = MultiKeyCache::new();
        cache.insert(&[1, 2], 'a');
        cache.insert(&[3, 4], 'b');
        cache.insert(&[2, 5], 'c');

        let mut removed = cache.remove_where(|keys, _| keys.contains(&2));
        removed.sort();

        assert_eq!(removed, vec!['a', 'c']);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&[1, 2]), None);
        assert_eq!(cache.get(&[3, 4]), Some(&'b'));
    }

    #[test]
    fn drain_empties() {
        let mut cache = MultiKeyCache::new();
        cache.insert(&[1], 1);
        cache.insert(&[2], 2);

        assert_eq!(cache.drain().sum::<i32>(), 3);
        assert!(cache.is_empty());
    }
}
