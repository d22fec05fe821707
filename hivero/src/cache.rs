//! Bounded cache for resolved column type descriptors.
use std::{num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use tokio::sync::{Mutex, OnceCell};

use crate::{
    metadata::{TypeDecodeError, TypeDescriptor},
    thrift::backend::TypeDescWire,
};

/// Default capacity, enough for every column of a busy warehouse schema.
const CAPACITY: usize = 500;

type Slot = Arc<OnceCell<Arc<TypeDescriptor>>>;

/// LRU cache from wire type descriptors to their resolved form.
///
/// Concurrent lookups of the same key share one resolution: the first
/// caller runs the loader inside the slot's [`OnceCell`] while the rest
/// await its result. A failed load leaves the cell empty, so the next
/// lookup retries.
pub(crate) struct DescriptorCache {
    slots: Mutex<LruCache<TypeDescWire, Slot>>,
}

impl DescriptorCache {
    pub(crate) fn new() -> DescriptorCache {
        Self::with_capacity(CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> DescriptorCache {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        DescriptorCache { slots: Mutex::new(LruCache::new(capacity)) }
    }

    /// Look up `key`, resolving through `load` on a miss.
    pub(crate) async fn get_with<F, Fut>(
        &self,
        key: TypeDescWire,
        load: F,
    ) -> Result<Arc<TypeDescriptor>, TypeDecodeError>
    where
        F: FnOnce(TypeDescWire) -> Fut,
        Fut: Future<Output = Result<TypeDescriptor, TypeDecodeError>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            match slots.get(&key) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot = Slot::default();
                    slots.put(key.clone(), Arc::clone(&slot));
                    slot
                }
            }
        };

        // the lru lock is released before the load runs, so a slow
        // resolution never blocks lookups of other keys
        slot.get_or_try_init(|| async { load(key).await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Drop every cached descriptor.
    pub(crate) async fn clear(&self) {
        self.slots.lock().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        metadata::HiveType,
        thrift::backend::TypeEntry,
    };

    fn key(type_id: i32) -> TypeDescWire {
        TypeDescWire { entries: vec![TypeEntry::Primitive { type_id, qualifiers: vec![] }] }
    }

    #[tokio::test]
    async fn resolves_once_per_key() {
        let cache = DescriptorCache::new();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let desc = cache
                .get_with(key(3), |_| async {
                    loads.fetch_add(1, Ordering::Relaxed);
                    Ok(TypeDescriptor::plain(HiveType::Int))
                })
                .await
                .unwrap();
            assert_eq!(desc.kind, HiveType::Int);
        }

        assert_eq!(loads.load(Ordering::Relaxed), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_load() {
        let cache = Arc::new(DescriptorCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_with(key(7), |_| {
                        let loads = Arc::clone(&loads);
                        async move {
                            loads.fetch_add(1, Ordering::Relaxed);
                            tokio::task::yield_now().await;
                            Ok(TypeDescriptor::plain(HiveType::String))
                        }
                    })
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().kind, HiveType::String);
        }

        assert_eq!(loads.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn failed_load_is_retried() {
        let cache = DescriptorCache::new();

        let err = cache
            .get_with(key(4), |_| async { Err(TypeDecodeError) })
            .await;
        assert!(err.is_err());

        let desc = cache
            .get_with(key(4), |_| async { Ok(TypeDescriptor::plain(HiveType::BigInt)) })
            .await
            .unwrap();
        assert_eq!(desc.kind, HiveType::BigInt);
    }

    #[tokio::test]
    async fn evicts_past_capacity() {
        let cache = DescriptorCache::with_capacity(2);
        for id in 0..4 {
            cache
                .get_with(key(id), |_| async { Ok(TypeDescriptor::plain(HiveType::Int)) })
                .await
                .unwrap();
        }
        assert_eq!(cache.len().await, 2);
    }
}
