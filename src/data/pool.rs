/// Pool partition bookkeeping
///
/// Four disjoint index sets over one dataset: labeled, unlabeled, validation
/// and test. Training indices move from unlabeled to labeled as the loop buys
/// labels; validation and test never change after the split.
use rand::seq::{index, SliceRandom};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use super::Dataset;
use crate::{ALError, Result};

/// Ordered set of dataset indices
///
/// Removal leaves a tombstone so a batch of k removals costs O(k); the slot
/// vector is compacted once tombstones outnumber live members.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    slots: Vec<Option<usize>>,
    positions: HashMap<usize, usize>,
}

impl Pool {
    /// Create empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// O(1) membership test
    pub fn contains(&self, idx: usize) -> bool {
        self.positions.contains_key(&idx)
    }

    /// Members in insertion order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().flatten().copied()
    }

    /// Snapshot of the members in insertion order
    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }

    /// Append `idx`; returns false if it was already a member
    pub fn push(&mut self, idx: usize) -> bool {
        if self.positions.contains_key(&idx) {
            return false;
        }
        self.positions.insert(idx, self.slots.len());
        self.slots.push(Some(idx));
        true
    }

    /// Remove the given members, keeping the order of the rest
    ///
    /// Returns the number of indices actually removed.
    pub fn remove_all(&mut self, indices: &[usize]) -> usize {
        let mut removed = 0;
        for idx in indices {
            if let Some(pos) = self.positions.remove(idx) {
                self.slots[pos] = None;
                removed += 1;
            }
        }

        if self.slots.len() > 2 * self.positions.len() + 16 {
            self.compact();
        }

        removed
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        for (pos, slot) in self.slots.iter().enumerate() {
            if let Some(idx) = slot {
                self.positions.insert(*idx, pos);
            }
        }
    }
}

impl FromIterator<usize> for Pool {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut pool = Pool::new();
        for idx in iter {
            pool.push(idx);
        }
        pool
    }
}

/// Pool names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Labeled,
    Unlabeled,
    Validation,
    Test,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolKind::Labeled => "labeled",
            PoolKind::Unlabeled => "unlabeled",
            PoolKind::Validation => "validation",
            PoolKind::Test => "test",
        };
        f.write_str(name)
    }
}

/// Requested (or current) size of each pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct PoolSizes {
    pub labeled: usize,
    pub unlabeled: usize,
    pub validation: usize,
    pub test: usize,
}

impl PoolSizes {
    /// Sum of all pools
    pub fn total(&self) -> usize {
        self.labeled + self.unlabeled + self.validation + self.test
    }

    /// Sizes for a fresh run: nothing labeled yet
    ///
    /// `test_split` of the dataset is held out for testing, `train_split` of
    /// the rest becomes the unlabeled pool and the remainder is validation.
    pub fn from_fractions(len: usize, test_split: f32, train_split: f32) -> Self {
        let test = ((len as f64 * test_split as f64).round() as usize).min(len);
        let rest = len - test;
        let train = ((rest as f64 * train_split as f64).floor() as usize).min(rest);
        Self {
            labeled: 0,
            unlabeled: train,
            validation: rest - train,
            test,
        }
    }
}

/// Per-class multipliers used to subsample a pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassBalanceSpec {
    multipliers: BTreeMap<u32, f32>,
}

impl ClassBalanceSpec {
    /// Build from an explicit class -> multiplier mapping
    pub fn new(multipliers: BTreeMap<u32, f32>) -> Result<Self> {
        if let Some((class, m)) = multipliers.iter().find(|(_, m)| !m.is_finite() || **m < 0.0) {
            return Err(ALError::Config(format!(
                "class {} has invalid balance multiplier {}",
                class, m
            )));
        }
        Ok(Self { multipliers })
    }

    /// `multiplier` for the lower half of the classes, 1.0 for the rest
    pub fn half_classes(num_classes: usize, multiplier: f32) -> Result<Self> {
        let multipliers = (0..num_classes as u32)
            .map(|c| {
                let m = if (c as usize) < num_classes / 2 { multiplier } else { 1.0 };
                (c, m)
            })
            .collect();
        Self::new(multipliers)
    }

    /// Multiplier of `class` (1.0 when unmapped)
    pub fn multiplier(&self, class: u32) -> f32 {
        self.multipliers.get(&class).copied().unwrap_or(1.0)
    }

    /// Classes with an explicit multiplier
    pub fn classes(&self) -> impl Iterator<Item = u32> + '_ {
        self.multipliers.keys().copied()
    }
}

/// Outcome of a balance pass
#[derive(Debug)]
pub struct BalanceReport {
    /// min over classes of available / multiplier (None if no class qualified)
    pub reference: Option<f64>,
    /// Members kept per class
    pub kept: BTreeMap<u32, usize>,
    /// Members dropped from the pool
    pub removed: usize,
    /// Non-fatal `EmptyBalance` warnings
    pub warnings: Vec<ALError>,
}

/// The four pools of a run
#[derive(Debug, Clone, Default)]
pub struct PoolPartition {
    labeled: Pool,
    unlabeled: Pool,
    validation: Pool,
    test: Pool,
}

impl PoolPartition {
    /// Shuffle `0..dataset_len` and cut it into pools of the given sizes
    pub fn split<R: Rng + ?Sized>(dataset_len: usize, sizes: PoolSizes, rng: &mut R) -> Result<Self> {
        let requested = sizes.total();
        if requested != dataset_len {
            return Err(ALError::InvalidSplit {
                requested,
                available: dataset_len,
            });
        }

        let mut indices: Vec<usize> = (0..dataset_len).collect();
        indices.shuffle(rng);

        let mut rest = indices.into_iter();
        let labeled = rest.by_ref().take(sizes.labeled).collect();
        let unlabeled = rest.by_ref().take(sizes.unlabeled).collect();
        let validation = rest.by_ref().take(sizes.validation).collect();
        let test = rest.collect();

        Ok(Self {
            labeled,
            unlabeled,
            validation,
            test,
        })
    }

    /// Assemble a partition from explicit index lists
    ///
    /// Every index must be below `dataset_len` and appear in at most one pool.
    pub fn from_indices(
        dataset_len: usize,
        labeled: Vec<usize>,
        unlabeled: Vec<usize>,
        validation: Vec<usize>,
        test: Vec<usize>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for &idx in labeled.iter().chain(&unlabeled).chain(&validation).chain(&test) {
            if idx >= dataset_len {
                return Err(ALError::Config(format!(
                    "index {} out of range for {} examples",
                    idx, dataset_len
                )));
            }
            if !seen.insert(idx) {
                return Err(ALError::Config(format!("index {} appears in more than one pool", idx)));
            }
        }

        Ok(Self {
            labeled: labeled.into_iter().collect(),
            unlabeled: unlabeled.into_iter().collect(),
            validation: validation.into_iter().collect(),
            test: test.into_iter().collect(),
        })
    }

    pub fn labeled(&self) -> &Pool {
        &self.labeled
    }

    pub fn unlabeled(&self) -> &Pool {
        &self.unlabeled
    }

    pub fn validation(&self) -> &Pool {
        &self.validation
    }

    pub fn test(&self) -> &Pool {
        &self.test
    }

    /// Pool by name
    pub fn pool(&self, kind: PoolKind) -> &Pool {
        match kind {
            PoolKind::Labeled => &self.labeled,
            PoolKind::Unlabeled => &self.unlabeled,
            PoolKind::Validation => &self.validation,
            PoolKind::Test => &self.test,
        }
    }

    /// Current pool sizes
    pub fn sizes(&self) -> PoolSizes {
        PoolSizes {
            labeled: self.labeled.len(),
            unlabeled: self.unlabeled.len(),
            validation: self.validation.len(),
            test: self.test.len(),
        }
    }

    /// Members of `kind` per class
    pub fn class_counts(&self, kind: PoolKind, dataset: &dyn Dataset) -> Vec<usize> {
        let mut counts = vec![0; dataset.num_classes()];
        for idx in self.pool(kind).iter() {
            let label = dataset.label(idx) as usize;
            if label >= counts.len() {
                counts.resize(label + 1, 0);
            }
            counts[label] += 1;
        }
        counts
    }

    /// Subsample a training pool so per-class counts follow `spec`
    ///
    /// With `ref = min_c(avail_c / m_c)` over classes that have members and a
    /// positive multiplier, class c keeps `floor(ref * m_c)` random members.
    pub fn balance<R: Rng + ?Sized>(
        &mut self,
        kind: PoolKind,
        spec: &ClassBalanceSpec,
        dataset: &dyn Dataset,
        rng: &mut R,
    ) -> Result<BalanceReport> {
        let pool = match kind {
            PoolKind::Labeled => &mut self.labeled,
            PoolKind::Unlabeled => &mut self.unlabeled,
            PoolKind::Validation | PoolKind::Test => {
                return Err(ALError::Config(format!(
                    "the {} pool is fixed after the split and cannot be balanced",
                    kind
                )));
            }
        };

        let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for idx in pool.iter() {
            by_class.entry(dataset.label(idx)).or_default().push(idx);
        }

        let classes: BTreeSet<u32> = by_class.keys().copied().chain(spec.classes()).collect();

        let mut reference: Option<f64> = None;
        let mut missing = Vec::new();
        for &class in &classes {
            let m = spec.multiplier(class) as f64;
            if m <= 0.0 {
                continue;
            }
            let avail = by_class.get(&class).map_or(0, Vec::len);
            if avail == 0 {
                missing.push(class);
                continue;
            }
            let ratio = avail as f64 / m;
            reference = Some(reference.map_or(ratio, |r: f64| r.min(ratio)));
        }

        let mut warnings = Vec::new();
        if !missing.is_empty() {
            let warning = ALError::EmptyBalance {
                pool: kind.to_string(),
                classes: missing,
            };
            log::warn!("{}", warning);
            warnings.push(warning);
        }

        let mut kept = BTreeMap::new();
        let mut removed_indices = Vec::new();
        for &class in &classes {
            let members = by_class.get(&class).map(Vec::as_slice).unwrap_or(&[]);
            let m = spec.multiplier(class) as f64;
            let keep = match reference {
                // epsilon guards against avail / m * m landing just below avail
                Some(r) if m > 0.0 => ((r * m + 1e-9).floor() as usize).min(members.len()),
                _ => 0,
            };

            let chosen: HashSet<usize> = index::sample(rng, members.len(), keep).into_iter().collect();
            removed_indices.extend(
                members
                    .iter()
                    .enumerate()
                    .filter(|(pos, _)| !chosen.contains(pos))
                    .map(|(_, &idx)| idx),
            );
            kept.insert(class, keep);
        }

        let removed = pool.remove_all(&removed_indices);

        if pool.is_empty() && removed > 0 {
            let warning = ALError::EmptyBalance {
                pool: kind.to_string(),
                classes: classes.iter().copied().collect(),
            };
            log::warn!("{}", warning);
            warnings.push(warning);
        }

        log::info!(
            "Balanced {} pool: kept {} of {} (ref={:?})",
            kind,
            pool.len(),
            pool.len() + removed,
            reference
        );

        Ok(BalanceReport {
            reference,
            kept,
            removed,
            warnings,
        })
    }

    /// Move `indices` from unlabeled to labeled
    ///
    /// Nothing moves unless every index is a distinct unlabeled member.
    pub fn label(&mut self, indices: &[usize]) -> Result<()> {
        let mut seen = HashSet::with_capacity(indices.len());
        for &idx in indices {
            if !self.unlabeled.contains(idx) || !seen.insert(idx) {
                return Err(ALError::InvalidIndex { index: idx });
            }
        }

        self.unlabeled.remove_all(indices);
        for &idx in indices {
            self.labeled.push(idx);
        }

        log::debug!(
            "Labeled {} examples (labeled={}, unlabeled={})",
            indices.len(),
            self.labeled.len(),
            self.unlabeled.len()
        );

        Ok(())
    }

    /// Label `count` uniformly sampled unlabeled examples
    pub fn label_randomly<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) -> Result<Vec<usize>> {
        let candidates = self.unlabeled.to_vec();
        if count > candidates.len() {
            return Err(ALError::InsufficientPool {
                requested: count,
                available: candidates.len(),
            });
        }

        let picks: Vec<usize> = index::sample(rng, candidates.len(), count)
            .into_iter()
            .map(|pos| candidates[pos])
            .collect();
        self.label(&picks)?;
        Ok(picks)
    }
}
