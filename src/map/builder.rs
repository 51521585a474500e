//! Streaming construction of persistent maps.
//!
//! The caller writes key/value pairs in strictly increasing key order. In
//! threaded mode the pairs cross a bounded channel to a worker thread that
//! assembles and stores tree nodes while the caller keeps producing; the
//! caller blocks when the channel is full and the worker blocks when it is
//! empty. Inline mode drives the same assembler on the caller's thread and
//! produces identical hashes.

use std::any::Any;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::map::error::{MapBuildError, MapBuildResult};
use crate::map::node::{MapKey, MapValue, NodeAssembler, NODE_FANOUT};
use crate::map::persistent::PersistentMap;
use crate::storage::{Hash, SharedStore, StorageResult};

/// How a [`MapBuilder`] assembles nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// producer/consumer over a bounded channel of the given capacity
    Threaded { capacity: usize },
    /// assemble on the calling thread
    Inline,
}

impl BuildMode {
    pub const DEFAULT_CAPACITY: usize = 256;
}

impl Default for BuildMode {
    fn default() -> Self {
        BuildMode::Threaded {
            capacity: Self::DEFAULT_CAPACITY,
        }
    }
}

enum Message<K, V> {
    Entry(K, V),
    /// end of stream; anything else ending the channel is an abandoned build
    Finish,
}

type WorkerResult = StorageResult<Option<(Hash, u64)>>;

enum Sink<K, V> {
    Threaded {
        sender: Option<Sender<Message<K, V>>>,
        worker: Option<JoinHandle<WorkerResult>>,
    },
    Inline(Option<NodeAssembler<K, V>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Aborted,
    Closed,
}

/// Builds a [`PersistentMap`] from a sorted stream of entries.
///
/// `close` must be called on every path, successful or not; it is the only
/// way to obtain the map and it releases the worker thread. Dropping an
/// unclosed builder abandons the build.
pub struct MapBuilder<K: MapKey, V: MapValue> {
    store: SharedStore,
    sink: Sink<K, V>,
    last_key: Option<K>,
    state: State,
    map: Option<PersistentMap<K, V>>,
}

impl<K: MapKey, V: MapValue> MapBuilder<K, V> {
    pub fn new(store: SharedStore, mode: BuildMode) -> MapBuildResult<Self> {
        Self::with_fanout(store, mode, NODE_FANOUT)
    }

    pub(crate) fn with_fanout(store: SharedStore, mode: BuildMode, fanout: usize) -> MapBuildResult<Self> {
        let assembler = NodeAssembler::with_fanout(store.clone(), fanout);

        let sink = match mode {
            BuildMode::Inline => Sink::Inline(Some(assembler)),
            BuildMode::Threaded { capacity } => {
                let (sender, receiver) = bounded(capacity.max(1));
                let worker = thread::Builder::new()
                    .name("map-assembler".to_string())
                    .spawn(move || assemble(receiver, assembler))
                    .map_err(MapBuildError::Spawn)?;
                Sink::Threaded {
                    sender: Some(sender),
                    worker: Some(worker),
                }
            }
        };

        Ok(Self {
            store,
            sink,
            last_key: None,
            state: State::Open,
            map: None,
        })
    }

    /// Append the next entry.
    pub fn write(&mut self, key: K, value: V) -> MapBuildResult<()> {
        match self.state {
            State::Closed => return Err(MapBuildError::AlreadyClosed),
            State::Aborted => return Err(MapBuildError::Aborted),
            State::Open => {}
        }

        if let Some(previous) = &self.last_key {
            if *previous >= key {
                let err = MapBuildError::Ordering {
                    previous: format!("{:?}", previous),
                    key: format!("{:?}", key),
                };
                self.abort();
                return Err(err);
            }
        }
        self.last_key = Some(key.clone());

        let result = match &mut self.sink {
            Sink::Inline(assembler) => match assembler.as_mut() {
                Some(assembler) => assembler.push(key, value).map_err(MapBuildError::from),
                None => Err(MapBuildError::Aborted),
            },
            Sink::Threaded { sender, .. } => match sender.as_ref() {
                // a send only fails once the worker has exited early
                Some(sender) => sender
                    .send(Message::Entry(key, value))
                    .map_err(|_| MapBuildError::Aborted),
                None => Err(MapBuildError::Aborted),
            },
        };

        if let Err(err) = result {
            self.abort();
            return Err(self.worker_failure().unwrap_or(err));
        }
        Ok(())
    }

    /// Finish the build. The map is available from [`map`](Self::map) on
    /// success.
    pub fn close(&mut self) -> MapBuildResult<()> {
        let previous = self.state;
        if previous == State::Closed {
            return Err(MapBuildError::AlreadyClosed);
        }
        self.state = State::Closed;

        let finished = match &mut self.sink {
            Sink::Inline(assembler) => match (previous, assembler.take()) {
                (State::Open, Some(assembler)) => assembler.finish().map(Some).map_err(MapBuildError::from),
                _ => Ok(None),
            },
            Sink::Threaded { sender, worker } => {
                if previous == State::Open {
                    if let Some(sender) = sender.as_ref() {
                        // the worker may already have failed; join reports why
                        let _ = sender.send(Message::Finish);
                    }
                }
                sender.take();
                match worker.take() {
                    Some(handle) => join_worker(handle),
                    None => Ok(None),
                }
            }
        };

        match finished? {
            Some((root, len)) if previous == State::Open => {
                debug!(root = %root.short(), len, "map build finished");
                self.map = Some(PersistentMap::new(self.store.clone(), root, len));
                Ok(())
            }
            _ => Err(MapBuildError::Aborted),
        }
    }

    /// the finished map; `None` until a successful close
    pub fn map(&self) -> Option<&PersistentMap<K, V>> {
        self.map.as_ref()
    }

    pub fn into_map(mut self) -> Option<PersistentMap<K, V>> {
        self.map.take()
    }

    fn abort(&mut self) {
        if self.state != State::Open {
            return;
        }
        debug!("map build aborted");
        self.state = State::Aborted;
        match &mut self.sink {
            Sink::Inline(assembler) => {
                assembler.take();
            }
            Sink::Threaded { sender, .. } => {
                sender.take();
            }
        }
    }

    /// collect the worker's own error after it stopped accepting entries
    fn worker_failure(&mut self) -> Option<MapBuildError> {
        let Sink::Threaded { worker, .. } = &mut self.sink else {
            return None;
        };
        let handle = worker.take()?;
        join_worker(handle).err()
    }
}

impl<K: MapKey, V: MapValue> Drop for MapBuilder<K, V> {
    fn drop(&mut self) {
        // disconnecting the channel without Finish makes the worker discard
        // its partial tree and exit
        if let Sink::Threaded { sender, .. } = &mut self.sink {
            sender.take();
        }
    }
}

fn assemble<K: MapKey, V: MapValue>(
    receiver: Receiver<Message<K, V>>,
    mut assembler: NodeAssembler<K, V>,
) -> WorkerResult {
    loop {
        match receiver.recv() {
            Ok(Message::Entry(key, value)) => assembler.push(key, value)?,
            Ok(Message::Finish) => return assembler.finish().map(Some),
            Err(_) => return Ok(None),
        }
    }
}

fn join_worker(handle: JoinHandle<WorkerResult>) -> MapBuildResult<Option<(Hash, u64)>> {
    match handle.join() {
        Ok(result) => result.map_err(MapBuildError::from),
        Err(payload) => Err(MapBuildError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StorageError, ValueStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn build(mode: BuildMode, n: u32) -> PersistentMap<String, u32> {
        let store = MemoryStore::shared();
        let mut builder = MapBuilder::with_fanout(store, mode, 4).unwrap();
        for i in 0..n {
            builder.write(format!("key{:05}", i), i).unwrap();
        }
        builder.close().unwrap();
        builder.into_map().unwrap()
    }

    #[test]
    fn test_sorted_input_round_trips() {
        let map = build(BuildMode::Threaded { capacity: 2 }, 300);

        assert_eq!(map.len(), 300);
        for i in [0u32, 1, 150, 299] {
            assert_eq!(map.get(&format!("key{:05}", i)).unwrap(), Some(i));
        }
        assert!(map.get(&"key00300".to_string()).unwrap().is_none());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = build(BuildMode::default(), 500);
        let b = build(BuildMode::default(), 500);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_inline_matches_threaded() {
        let threaded = build(BuildMode::Threaded { capacity: 1 }, 200);
        let inline = build(BuildMode::Inline, 200);
        assert_eq!(threaded.hash(), inline.hash());
        assert_eq!(threaded.entries().unwrap(), inline.entries().unwrap());
    }

    #[test]
    fn test_out_of_order_write_aborts() {
        for mode in [BuildMode::default(), BuildMode::Inline] {
            let mut builder = MapBuilder::new(MemoryStore::shared(), mode).unwrap();
            builder.write("b".to_string(), 1u32).unwrap();

            let err = builder.write("a".to_string(), 2).unwrap_err();
            assert!(matches!(err, MapBuildError::Ordering { .. }));

            // later writes fail once the build is aborted
            assert!(matches!(
                builder.write("c".to_string(), 3),
                Err(MapBuildError::Aborted)
            ));

            assert!(matches!(builder.close(), Err(MapBuildError::Aborted)));
            assert!(builder.map().is_none());
        }
    }

    #[test]
    fn test_duplicate_key_is_ordering_error() {
        let mut builder = MapBuilder::new(MemoryStore::shared(), BuildMode::Inline).unwrap();
        builder.write(7u32, "x".to_string()).unwrap();
        assert!(matches!(
            builder.write(7, "y".to_string()),
            Err(MapBuildError::Ordering { .. })
        ));
    }

    #[test]
    fn test_close_twice() {
        let mut builder = MapBuilder::<u32, u32>::new(MemoryStore::shared(), BuildMode::default()).unwrap();
        assert!(builder.map().is_none());

        builder.close().unwrap();
        assert!(builder.map().unwrap().is_empty());
        assert!(matches!(builder.close(), Err(MapBuildError::AlreadyClosed)));
    }

    #[test]
    fn test_write_after_close() {
        let mut builder = MapBuilder::<u32, u32>::new(MemoryStore::shared(), BuildMode::Inline).unwrap();
        builder.close().unwrap();
        assert!(matches!(builder.write(1, 1), Err(MapBuildError::AlreadyClosed)));
    }

    #[test]
    fn test_dropping_unclosed_builder_does_not_hang() {
        let mut builder = MapBuilder::new(MemoryStore::shared(), BuildMode::Threaded { capacity: 1 }).unwrap();
        builder.write(1u32, 1u32).unwrap();
        drop(builder);
    }

    /// a store that starts failing after a number of writes
    struct FailingStore {
        remaining: AtomicUsize,
        inner: MemoryStore,
    }

    impl ValueStore for FailingStore {
        fn get(&self, hash: &Hash) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(hash)
        }

        fn put(&self, bytes: &[u8]) -> StorageResult<Hash> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 0 {
                self.remaining.store(0, Ordering::SeqCst);
                return Err(StorageError::Internal("disk full".to_string()));
            }
            self.inner.put(bytes)
        }
    }

    #[test]
    fn test_store_failure_surfaces() {
        for mode in [BuildMode::Threaded { capacity: 1 }, BuildMode::Inline] {
            let store = Arc::new(FailingStore {
                remaining: AtomicUsize::new(1),
                inner: MemoryStore::new(),
            });
            let mut builder = MapBuilder::with_fanout(store, mode, 2).unwrap();

            let mut failure = None;
            for i in 0..100u32 {
                if let Err(e) = builder.write(i, i) {
                    failure = Some(e);
                    break;
                }
            }
            let closed = builder.close();

            let reported = failure.is_some() || closed.is_err();
            assert!(reported, "store failure must surface on write or close");
            assert!(builder.map().is_none());
        }
    }
}
