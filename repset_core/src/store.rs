//! Object store for plans, sessions, sets and check-ins.
//!
//! All engine operations are expressed through the [`DataStore`] trait:
//! fetch by predicate with optional sort and limit, and insert/update/delete
//! inside a [`Transaction`]. A transaction starts from the latest committed data
//! (re-read under the backend's write lock) and works on a copy; the copy only
//! replaces the live data after the backend has persisted it, so a failed
//! commit leaves both the store and the caller's state untouched.
//!
//! Two backends are provided:
//! - [`MemoryBackend`] keeps everything in memory
//! - [`JsonFileBackend`] writes a single JSON document with file locking and
//!   atomic replacement

use crate::{CheckIn, Error, Exercise, ExerciseSet, Result, WorkoutPlan, WorkoutSession};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Every persisted collection
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreData {
    #[serde(default)]
    pub plans: Vec<WorkoutPlan>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub sessions: Vec<WorkoutSession>,
    #[serde(default)]
    pub sets: Vec<ExerciseSet>,
    #[serde(default)]
    pub check_ins: Vec<CheckIn>,
}

// ============================================================================
// Entities
// ============================================================================

/// A record type that lives in one [`StoreData`] collection
pub trait Entity: Clone + fmt::Debug {
    const KIND: &'static str;

    fn id(&self) -> Uuid;
    fn collection(data: &StoreData) -> &Vec<Self>;
    fn collection_mut(data: &mut StoreData) -> &mut Vec<Self>;

    /// Referential checks run on insert and update
    fn check_references(&self, _data: &StoreData) -> Result<()> {
        Ok(())
    }

    /// Delete rules applied after the record with `id` was removed
    fn on_delete(_data: &mut StoreData, _id: Uuid) {}
}

impl Entity for WorkoutPlan {
    const KIND: &'static str = "plan";

    fn id(&self) -> Uuid {
        self.id
    }

    fn collection(data: &StoreData) -> &Vec<Self> {
        &data.plans
    }

    fn collection_mut(data: &mut StoreData) -> &mut Vec<Self> {
        &mut data.plans
    }

    fn check_references(&self, _data: &StoreData) -> Result<()> {
        self.validate()
    }

    fn on_delete(data: &mut StoreData, id: Uuid) {
        data.exercises.retain(|e| e.plan_id != id);
        let owned: Vec<Uuid> = data
            .sessions
            .iter()
            .filter(|s| s.plan_id == id)
            .map(|s| s.id)
            .collect();
        data.sessions.retain(|s| s.plan_id != id);
        for session_id in owned {
            WorkoutSession::on_delete(data, session_id);
        }
    }
}

impl Entity for Exercise {
    const KIND: &'static str = "exercise";

    fn id(&self) -> Uuid {
        self.id
    }

    fn collection(data: &StoreData) -> &Vec<Self> {
        &data.exercises
    }

    fn collection_mut(data: &mut StoreData) -> &mut Vec<Self> {
        &mut data.exercises
    }

    fn check_references(&self, data: &StoreData) -> Result<()> {
        self.validate()?;
        if !data.plans.iter().any(|p| p.id == self.plan_id) {
            return Err(Error::NotFound(format!("plan {}", self.plan_id)));
        }
        let clash = data
            .exercises
            .iter()
            .any(|e| e.plan_id == self.plan_id && e.order == self.order && e.id != self.id);
        if clash {
            return Err(Error::InvalidInput(format!(
                "Exercise order {} is already used in this plan",
                self.order
            )));
        }
        Ok(())
    }

    fn on_delete(data: &mut StoreData, id: Uuid) {
        for set in data.sets.iter_mut().filter(|s| s.exercise_id == Some(id)) {
            set.exercise_id = None;
        }
    }
}

impl Entity for WorkoutSession {
    const KIND: &'static str = "session";

    fn id(&self) -> Uuid {
        self.id
    }

    fn collection(data: &StoreData) -> &Vec<Self> {
        &data.sessions
    }

    fn collection_mut(data: &mut StoreData) -> &mut Vec<Self> {
        &mut data.sessions
    }

    fn check_references(&self, data: &StoreData) -> Result<()> {
        self.validate()?;
        if !data.plans.iter().any(|p| p.id == self.plan_id) {
            return Err(Error::NotFound(format!("plan {}", self.plan_id)));
        }
        Ok(())
    }

    fn on_delete(data: &mut StoreData, id: Uuid) {
        data.sets.retain(|s| s.session_id != id);
        for check_in in data.check_ins.iter_mut().filter(|c| c.session_id == Some(id)) {
            check_in.session_id = None;
        }
    }
}

impl Entity for ExerciseSet {
    const KIND: &'static str = "set";

    fn id(&self) -> Uuid {
        self.id
    }

    fn collection(data: &StoreData) -> &Vec<Self> {
        &data.sets
    }

    fn collection_mut(data: &mut StoreData) -> &mut Vec<Self> {
        &mut data.sets
    }

    fn check_references(&self, data: &StoreData) -> Result<()> {
        self.validate()?;
        if !data.sessions.iter().any(|s| s.id == self.session_id) {
            return Err(Error::NotFound(format!("session {}", self.session_id)));
        }
        Ok(())
    }
}

impl Entity for CheckIn {
    const KIND: &'static str = "check-in";

    fn id(&self) -> Uuid {
        self.id
    }

    fn collection(data: &StoreData) -> &Vec<Self> {
        &data.check_ins
    }

    fn collection_mut(data: &mut StoreData) -> &mut Vec<Self> {
        &mut data.check_ins
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Sort direction for [`Query::sort_by_key`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

type Predicate<'a, T> = Box<dyn Fn(&T) -> bool + 'a>;
type Comparator<'a, T> = Box<dyn Fn(&T, &T) -> Ordering + 'a>;

/// Predicate, optional sort and optional limit over one entity type
pub struct Query<'a, T> {
    predicate: Option<Predicate<'a, T>>,
    sort: Option<Comparator<'a, T>>,
    limit: Option<usize>,
}

impl<'a, T: Entity> Query<'a, T> {
    /// Every record of the type, in insertion order
    pub fn all() -> Self {
        Self {
            predicate: None,
            sort: None,
            limit: None,
        }
    }

    pub fn filter(predicate: impl Fn(&T) -> bool + 'a) -> Self {
        Self {
            predicate: Some(Box::new(predicate)),
            sort: None,
            limit: None,
        }
    }

    pub fn sort_by_key<K: Ord>(mut self, key: impl Fn(&T) -> K + 'a, order: SortOrder) -> Self {
        self.sort = Some(Box::new(move |a, b| {
            let ord = key(a).cmp(&key(b));
            match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        }));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn run(&self, items: &[T]) -> Vec<T> {
        let mut matched: Vec<T> = items
            .iter()
            .filter(|item| self.predicate.as_ref().map_or(true, |p| p(*item)))
            .cloned()
            .collect();
        if let Some(ref cmp) = self.sort {
            // Stable, so ties keep insertion order
            matched.sort_by(|a, b| cmp(a, b));
        }
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

// ============================================================================
// Data Store
// ============================================================================

/// The persistence seam used by every engine component
pub trait DataStore {
    fn fetch<T: Entity>(&self, query: &Query<'_, T>) -> Result<Vec<T>>;

    /// Run `f` against a working copy and commit it atomically.
    ///
    /// If `f` fails or the commit fails, nothing is written.
    fn transaction<R, F>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>;

    fn get<T: Entity>(&self, id: Uuid) -> Result<Option<T>> {
        Ok(self
            .fetch(&Query::filter(move |e: &T| e.id() == id).limit(1))?
            .into_iter()
            .next())
    }

    /// Like [`DataStore::get`] but a missing record is an error
    fn require<T: Entity>(&self, id: Uuid) -> Result<T> {
        self.get(id)?
            .ok_or_else(|| Error::NotFound(format!("{} {}", T::KIND, id)))
    }
}

/// Mutable view over the working copy of a transaction
pub struct Transaction<'a> {
    data: &'a mut StoreData,
    writes: usize,
}

impl<'a> Transaction<'a> {
    pub fn fetch<T: Entity>(&self, query: &Query<'_, T>) -> Vec<T> {
        query.run(T::collection(self.data))
    }

    pub fn get<T: Entity>(&self, id: Uuid) -> Option<T> {
        T::collection(self.data).iter().find(|e| e.id() == id).cloned()
    }

    pub fn insert<T: Entity>(&mut self, entity: T) -> Result<()> {
        if T::collection(self.data).iter().any(|e| e.id() == entity.id()) {
            return Err(Error::InvalidInput(format!(
                "{} {} already exists",
                T::KIND,
                entity.id()
            )));
        }
        entity.check_references(self.data)?;
        T::collection_mut(self.data).push(entity);
        self.writes += 1;
        Ok(())
    }

    pub fn update<T: Entity>(&mut self, entity: T) -> Result<()> {
        entity.check_references(self.data)?;
        let id = entity.id();
        let slot = T::collection_mut(self.data)
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or_else(|| Error::NotFound(format!("{} {}", T::KIND, id)))?;
        *slot = entity;
        self.writes += 1;
        Ok(())
    }

    /// Remove a record and apply its delete rules. Returns false if absent.
    pub fn delete<T: Entity>(&mut self, id: Uuid) -> bool {
        let collection = T::collection_mut(self.data);
        let before = collection.len();
        collection.retain(|e| e.id() != id);
        if collection.len() == before {
            return false;
        }
        T::on_delete(self.data, id);
        self.writes += 1;
        true
    }
}

/// Where committed data is kept
pub trait StoreBackend {
    fn load(&self) -> Result<StoreData>;
    fn persist(&mut self, data: &StoreData) -> Result<()>;

    /// Take the write lock and return the latest committed data.
    ///
    /// Every successful `begin` is paired with one [`StoreBackend::finish`].
    fn begin(&mut self) -> Result<StoreData> {
        self.load()
    }

    /// Release whatever `begin` acquired
    fn finish(&mut self) {}
}

/// Backend that only keeps the last committed snapshot in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    snapshot: StoreData,
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> Result<StoreData> {
        Ok(self.snapshot.clone())
    }

    fn persist(&mut self, data: &StoreData) -> Result<()> {
        self.snapshot = data.clone();
        Ok(())
    }
}

/// Live data plus the backend it commits to
pub struct Store<B: StoreBackend> {
    data: StoreData,
    backend: B,
    commits: u64,
}

impl Store<MemoryBackend> {
    pub fn in_memory() -> Self {
        Self {
            data: StoreData::default(),
            backend: MemoryBackend::default(),
            commits: 0,
        }
    }
}

impl Store<JsonFileBackend> {
    /// Open (or lazily create) the JSON store at `path`
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(JsonFileBackend::new(path))
    }
}

impl<B: StoreBackend> Store<B> {
    pub fn open(backend: B) -> Result<Self> {
        let data = backend.load()?;
        tracing::debug!(
            "Opened store: {} plans, {} sessions, {} sets, {} check-ins",
            data.plans.len(),
            data.sessions.len(),
            data.sets.len(),
            data.check_ins.len()
        );
        Ok(Self {
            data,
            backend,
            commits: 0,
        })
    }

    /// Number of successful commits since the store was opened
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    pub fn data(&self) -> &StoreData {
        &self.data
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: StoreBackend> DataStore for Store<B> {
    fn fetch<T: Entity>(&self, query: &Query<'_, T>) -> Result<Vec<T>> {
        Ok(query.run(T::collection(&self.data)))
    }

    fn transaction<R, F>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>,
    {
        let latest = self.backend.begin()?;
        let result = self.commit_on(latest, f);
        self.backend.finish();
        result
    }
}

impl<B: StoreBackend> Store<B> {
    /// Run `f` on top of `latest` and persist; the backend lock is held
    fn commit_on<R, F>(&mut self, latest: StoreData, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>,
    {
        let mut working = latest.clone();
        self.data = latest;
        let (result, writes) = {
            let mut tx = Transaction {
                data: &mut working,
                writes: 0,
            };
            let result = f(&mut tx)?;
            (result, tx.writes)
        };

        if writes == 0 {
            return Ok(result);
        }

        self.backend.persist(&working).map_err(|e| match e {
            Error::Persistence(_) => e,
            other => Error::Persistence(other.to_string()),
        })?;

        self.data = working;
        self.commits += 1;
        tracing::debug!("Committed transaction with {} writes", writes);
        Ok(result)
    }
}

// ============================================================================
// JSON file backend
// ============================================================================

/// Single-document JSON backend with file locking.
///
/// Readers take a shared lock on the data file. Writers take an exclusive lock
/// on a sidecar `.lock` file, write a temp file in the same directory, fsync it
/// and rename it over the data file.
pub struct JsonFileBackend {
    path: PathBuf,
    /// Held from `begin` until `finish`
    write_lock: Option<File>,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    fn parent_dir(&self) -> Result<&Path> {
        self.path
            .parent()
            .ok_or_else(|| Error::Persistence(format!("store path {:?} has no parent", self.path)))
    }

    fn lock_exclusive(&self) -> Result<File> {
        std::fs::create_dir_all(self.parent_dir()?)?;
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    fn write_atomic(&self, data: &StoreData) -> Result<()> {
        let temp = NamedTempFile::new_in(self.parent_dir()?)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, data)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!("Persisted store to {:?}", self.path);
        Ok(())
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> Result<StoreData> {
        if !self.path.exists() {
            tracing::info!("No store file at {:?}, starting empty", self.path);
            return Ok(StoreData::default());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        if contents.trim().is_empty() {
            return Ok(StoreData::default());
        }

        // A damaged store is reported rather than replaced, so the next
        // commit cannot silently discard the user's history.
        let data = serde_json::from_str::<StoreData>(&contents).map_err(|e| {
            tracing::warn!("Failed to parse store file {:?}: {}", self.path, e);
            e
        })?;
        tracing::debug!("Loaded store from {:?}", self.path);
        Ok(data)
    }

    fn persist(&mut self, data: &StoreData) -> Result<()> {
        if self.write_lock.is_some() {
            return self.write_atomic(data);
        }
        let lock = self.lock_exclusive()?;
        let written = self.write_atomic(data);
        lock.unlock()?;
        written
    }

    fn begin(&mut self) -> Result<StoreData> {
        let lock = self.lock_exclusive()?;
        match self.load() {
            Ok(data) => {
                self.write_lock = Some(lock);
                Ok(data)
            }
            Err(e) => {
                let _ = lock.unlock();
                Err(e)
            }
        }
    }

    fn finish(&mut self) {
        if let Some(lock) = self.write_lock.take() {
            if let Err(e) = lock.unlock() {
                tracing::warn!("Failed to release store lock {:?}: {}", self.lock_path(), e);
            }
        }
    }
}
