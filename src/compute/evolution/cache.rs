//! Two-tier fitness memoization.
//!
//! - [`GeneCache`]: unbounded table from the exact chromosome bytes to its
//!   fitness. A hit skips extraction and analysis altogether.
//! - [`PhenotypeCache`]: bounded least-recently-used table from the bytes of
//!   the reachable region to the full evaluation. Chromosomes that differ
//!   only in disconnected material share an entry.
//!
//! Both tables are owned by a [`FitnessCache`] tagged with the [`ScopeKey`]
//! of the structural parameters they were computed under.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::{Chromosome, OccupancyGrid};

use super::individual::StructuralResult;

/// Identifies the parameters cached values depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey(pub String);

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache was built for scope '{found}' but the run uses '{expected}'")]
    ScopeMismatch { expected: ScopeKey, found: ScopeKey },
}

/// Immutable evaluation stored in the phenotype table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEvaluation {
    pub fitness: f64,
    pub structure: Arc<StructuralResult>,
}

/// Unbounded chromosome → fitness table.
#[derive(Debug, Clone, Default)]
pub struct GeneCache {
    table: HashMap<Vec<u8>, f64>,
}

impl GeneCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chromosome: &Chromosome) -> Option<f64> {
        self.table.get(&chromosome.to_key()).copied()
    }

    pub fn insert(&mut self, chromosome: &Chromosome, fitness: f64) {
        self.table.insert(chromosome.to_key(), fitness);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Bounded LRU region → evaluation table.
#[derive(Debug, Clone)]
pub struct PhenotypeCache {
    capacity: usize,
    entries: HashMap<Vec<u8>, (CachedEvaluation, u64)>,
    /// Recency tick → key, oldest first.
    recency: BTreeMap<u64, Vec<u8>>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl PhenotypeCache {
    /// Create an empty table. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up a region, refreshing its recency on a hit.
    pub fn get(&mut self, region: &OccupancyGrid) -> Option<CachedEvaluation> {
        let key = region.to_key();
        let tick = self.next_tick();
        match self.entries.get_mut(&key) {
            Some((value, last)) => {
                self.recency.remove(last);
                *last = tick;
                let value = value.clone();
                self.recency.insert(tick, key);
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Whether a region is present, without touching recency.
    pub fn contains(&self, region: &OccupancyGrid) -> bool {
        self.entries.contains_key(&region.to_key())
    }

    /// Insert or refresh an entry, evicting the least recently used one when
    /// the table overflows.
    pub fn insert(&mut self, region: &OccupancyGrid, value: CachedEvaluation) {
        self.insert_key(region.to_key(), value);
    }

    fn insert_key(&mut self, key: Vec<u8>, value: CachedEvaluation) {
        let tick = self.next_tick();
        if let Some((_, last)) = self.entries.get(&key) {
            self.recency.remove(last);
        }
        self.recency.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));

        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    /// Entries from least to most recently used.
    pub fn entries_by_recency(&self) -> Vec<(Vec<u8>, CachedEvaluation)> {
        self.recency
            .values()
            .filter_map(|key| {
                self.entries
                    .get(key)
                    .map(|(value, _)| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Move every entry of `other` into `self`, oldest first.
    pub fn absorb(&mut self, other: PhenotypeCache) {
        for (key, value) in other.entries_by_recency() {
            self.insert_key(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Serializable form of a [`FitnessCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub scope: ScopeKey,
    /// Gene table entries, sorted by key.
    pub genes: Vec<(Vec<u8>, f64)>,
    pub phenotype_capacity: usize,
    /// Phenotype table entries, least recently used first.
    pub phenotypes: Vec<(Vec<u8>, CachedEvaluation)>,
    #[serde(default)]
    pub gene_hits: u64,
    #[serde(default)]
    pub phenotype_hits: u64,
}

/// Both cache tiers, scoped to one set of structural parameters.
#[derive(Debug, Clone)]
pub struct FitnessCache {
    scope: ScopeKey,
    pub genes: GeneCache,
    pub phenotypes: PhenotypeCache,
    gene_hits: u64,
    gene_misses: u64,
}

impl FitnessCache {
    pub fn new(scope: ScopeKey, phenotype_capacity: usize) -> Self {
        Self {
            scope,
            genes: GeneCache::new(),
            phenotypes: PhenotypeCache::new(phenotype_capacity),
            gene_hits: 0,
            gene_misses: 0,
        }
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    /// Gene-table lookup that updates the hit counters.
    pub fn lookup_gene(&mut self, chromosome: &Chromosome) -> Option<f64> {
        let found = self.genes.get(chromosome);
        if found.is_some() {
            self.gene_hits += 1;
        } else {
            self.gene_misses += 1;
        }
        found
    }

    pub fn gene_hits(&self) -> u64 {
        self.gene_hits
    }

    pub fn gene_misses(&self) -> u64 {
        self.gene_misses
    }

    pub fn phenotype_hits(&self) -> u64 {
        self.phenotypes.hits()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let mut genes: Vec<(Vec<u8>, f64)> = self
            .genes
            .table
            .iter()
            .map(|(k, &v)| (k.clone(), v))
            .collect();
        genes.sort_by(|a, b| a.0.cmp(&b.0));

        CacheSnapshot {
            scope: self.scope.clone(),
            genes,
            phenotype_capacity: self.phenotypes.capacity(),
            phenotypes: self.phenotypes.entries_by_recency(),
            gene_hits: self.gene_hits,
            phenotype_hits: self.phenotypes.hits(),
        }
    }

    /// Rebuild a cache, refusing one computed under different parameters.
    pub fn restore(snapshot: CacheSnapshot, expected: &ScopeKey) -> Result<Self, CacheError> {
        if &snapshot.scope != expected {
            return Err(CacheError::ScopeMismatch {
                expected: expected.clone(),
                found: snapshot.scope,
            });
        }

        let mut cache = Self::new(snapshot.scope, snapshot.phenotype_capacity);
        cache.genes.table = snapshot.genes.into_iter().collect();
        for (key, value) in snapshot.phenotypes {
            cache.phenotypes.insert_key(key, value);
        }
        cache.gene_hits = snapshot.gene_hits;
        cache.phenotypes.hits = snapshot.phenotype_hits;
        Ok(cache)
    }
}
