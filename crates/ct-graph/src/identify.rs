//! Estimand identification: back-door, front-door and instrumental variables.
//!
//! Candidates come back most-preferred first. Within a strategy, sets are
//! ordered by cardinality and then lexicographically by sorted names.

use std::collections::BTreeSet;

use ct_core::{Error, Estimand, NoEstimandReason, Result, Strategy};
use serde::{Deserialize, Serialize};

use crate::dag::{CausalDag, Direction};

/// Limits on the candidate-set enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Largest adjustment / mediator set considered.
    pub max_set_size: usize,
    /// Cap on candidates returned per strategy.
    pub max_candidates: usize,
    /// Keep searching later strategies after one succeeds.
    pub exhaustive: bool,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self { max_set_size: 4, max_candidates: 16, exhaustive: false }
    }
}

impl IdentifierConfig {
    /// Parse from JSON, filling omitted fields with defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that can never yield a candidate.
    pub fn validate(&self) -> Result<()> {
        if self.max_candidates == 0 {
            return Err(Error::InvalidInput("max_candidates must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Finds estimands for a treatment/outcome query on a borrowed graph.
#[derive(Debug, Clone, Copy)]
pub struct EstimandIdentifier<'a> {
    dag: &'a CausalDag,
    config: IdentifierConfig,
}

struct Query {
    xs: BTreeSet<usize>,
    ys: BTreeSet<usize>,
}

impl<'a> EstimandIdentifier<'a> {
    /// Identifier with default limits.
    pub fn new(dag: &'a CausalDag) -> Self {
        Self { dag, config: IdentifierConfig::default() }
    }

    /// Identifier with explicit limits.
    pub fn with_config(dag: &'a CausalDag, config: IdentifierConfig) -> Self {
        Self { dag, config }
    }

    /// Active limits.
    pub fn config(&self) -> &IdentifierConfig {
        &self.config
    }

    /// Ordered candidate estimands; back-door first, then front-door, then
    /// instrumental.
    ///
    /// Fails with `NoValidEstimand` when a treatment cannot affect any outcome
    /// or when no strategy applies.
    pub fn identify<I, J, S, T>(&self, treatments: I, outcomes: J) -> Result<Vec<Estimand>>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let q = self.query(treatments, outcomes)?;
        let names = |set: &BTreeSet<usize>| -> Vec<String> {
            set.iter().map(|&i| self.dag.name_of(i).to_string()).collect()
        };
        let (t_names, o_names) = (names(&q.xs), names(&q.ys));

        for &x in &q.xs {
            let reached = self.dag.reach(&BTreeSet::from([x]), Direction::Down);
            if reached.is_disjoint(&q.ys) {
                tracing::info!(treatment = self.dag.name_of(x), "no directed path to any outcome");
                return Err(Error::NoValidEstimand {
                    treatments: t_names,
                    outcomes: o_names,
                    reason: NoEstimandReason::NoCausalPath,
                });
            }
        }

        let mut out = Vec::new();
        let make = |strategy: Strategy, set: BTreeSet<usize>| {
            Estimand::new(strategy, t_names.clone(), o_names.clone(), names(&set).into_iter().collect())
        };

        let backdoor = self.backdoor_ids(&q);
        tracing::debug!(n = backdoor.len(), "back-door candidates");
        out.extend(backdoor.into_iter().map(|s| make(Strategy::Backdoor, s)));

        if out.is_empty() || self.config.exhaustive {
            let front = self.front_door_ids(&q);
            tracing::debug!(n = front.len(), "front-door candidates");
            out.extend(front.into_iter().map(|s| make(Strategy::FrontDoor, s)));
        }
        if out.is_empty() || self.config.exhaustive {
            let iv = self.instrument_ids(&q);
            tracing::debug!(n = iv.len(), "instrument candidates");
            out.extend(iv.into_iter().map(|z| make(Strategy::Instrumental, BTreeSet::from([z]))));
        }

        if out.is_empty() {
            return Err(Error::NoValidEstimand {
                treatments: t_names,
                outcomes: o_names,
                reason: NoEstimandReason::NoStrategyApplies,
            });
        }
        tracing::info!(
            n_candidates = out.len(),
            strategy = %out[0].strategy(),
            "identified estimands"
        );
        Ok(out)
    }

    /// Minimal valid adjustment sets (generalised adjustment criterion).
    pub fn backdoor_sets<I, J, S, T>(&self, treatments: I, outcomes: J) -> Result<Vec<BTreeSet<String>>>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let q = self.query(treatments, outcomes)?;
        Ok(self.backdoor_ids(&q).iter().map(|s| self.names(s)).collect())
    }

    /// Mediator sets satisfying the front-door criterion.
    ///
    /// Empty unless there is exactly one treatment and one outcome.
    pub fn front_door_sets<I, J, S, T>(&self, treatments: I, outcomes: J) -> Result<Vec<BTreeSet<String>>>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let q = self.query(treatments, outcomes)?;
        Ok(self.front_door_ids(&q).iter().map(|s| self.names(s)).collect())
    }

    /// Observed single-variable instruments, sorted by name.
    pub fn instruments<I, J, S, T>(&self, treatments: I, outcomes: J) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let q = self.query(treatments, outcomes)?;
        Ok(self.instrument_ids(&q).into_iter().map(|i| self.dag.name_of(i).to_string()).collect())
    }

    /// Whether `set` is a valid adjustment set for the query.
    pub fn is_valid_adjustment_set<I, J, K, S, T, U>(
        &self,
        treatments: I,
        outcomes: J,
        set: K,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        K: IntoIterator<Item = U>,
        S: AsRef<str>,
        T: AsRef<str>,
        U: AsRef<str>,
    {
        let q = self.query(treatments, outcomes)?;
        let zs = self.dag.ids(set)?;
        if !zs.is_disjoint(&q.xs) || !zs.is_disjoint(&q.ys) {
            return Ok(false);
        }
        if zs.iter().any(|&z| !self.dag.variable_at(z).role().is_observed()) {
            return Ok(false);
        }
        let forbidden = self.forbidden(&q);
        if !zs.is_disjoint(&forbidden) {
            return Ok(false);
        }
        let pbg = self.proper_backdoor(&q);
        Ok(pbg.d_separated_ids(&q.xs, &q.ys, &zs))
    }

    // -----------------------------------------------------------------------
    // Index-level search
    // -----------------------------------------------------------------------

    fn query<I, J, S, T>(&self, treatments: I, outcomes: J) -> Result<Query>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let xs = self.dag.ids(treatments)?;
        let ys = self.dag.ids(outcomes)?;
        if xs.is_empty() || ys.is_empty() {
            return Err(Error::InvalidInput("treatments and outcomes must be non-empty".to_string()));
        }
        if !xs.is_disjoint(&ys) {
            return Err(Error::InvalidInput("treatments and outcomes overlap".to_string()));
        }
        if let Some(&u) = xs.iter().chain(&ys).find(|&&i| !self.dag.variable_at(i).role().is_observed()) {
            return Err(Error::InvalidInput(format!(
                "'{}' is unobserved and cannot be a treatment or outcome",
                self.dag.name_of(u)
            )));
        }
        Ok(Query { xs, ys })
    }

    fn names(&self, set: &BTreeSet<usize>) -> BTreeSet<String> {
        set.iter().map(|&i| self.dag.name_of(i).to_string()).collect()
    }

    fn observed(&self, i: usize) -> bool {
        self.dag.variable_at(i).role().is_observed()
    }

    /// Descendants of proper-causal-path nodes, the nodes themselves included.
    fn forbidden(&self, q: &Query) -> BTreeSet<usize> {
        let pcp = self.dag.pcp_ids(&q.xs, &q.ys);
        let no_into_x = self.dag.without_edges(|_, b| q.xs.contains(&b));
        let mut out = no_into_x.reach(&pcp, Direction::Down);
        out.extend(pcp);
        out
    }

    fn proper_backdoor(&self, q: &Query) -> CausalDag {
        let pcp = self.dag.pcp_ids(&q.xs, &q.ys);
        self.dag.without_edges(|a, b| q.xs.contains(&a) && pcp.contains(&b))
    }

    fn backdoor_ids(&self, q: &Query) -> Vec<BTreeSet<usize>> {
        let both: BTreeSet<usize> = q.xs.union(&q.ys).copied().collect();
        let forbidden = self.forbidden(q);
        let pool: Vec<usize> = self
            .sorted_by_name(self.dag.reach(&both, Direction::Up))
            .into_iter()
            .filter(|i| !both.contains(i) && !forbidden.contains(i) && self.observed(*i))
            .collect();
        let pbg = self.proper_backdoor(q);
        let valid = |zs: &BTreeSet<usize>| pbg.d_separated_ids(&q.xs, &q.ys, zs);
        let found = self.minimal_sets(&pool, 0, &valid);
        if !found.is_empty() || pool.len() <= self.config.max_set_size {
            return found;
        }

        // The enumeration stopped short of the pool. The whole pool is a valid
        // set whenever any valid set exists, so prune it down instead.
        let mut canonical: BTreeSet<usize> = pool.iter().copied().collect();
        if !valid(&canonical) {
            return Vec::new();
        }
        for &z in &pool {
            canonical.remove(&z);
            if !valid(&canonical) {
                canonical.insert(z);
            }
        }
        tracing::debug!(size = canonical.len(), "adjustment set found by pruning");
        vec![canonical]
    }

    fn front_door_ids(&self, q: &Query) -> Vec<BTreeSet<usize>> {
        let (Some(&x), Some(&y), 1, 1) = (q.xs.first(), q.ys.first(), q.xs.len(), q.ys.len()) else {
            return Vec::new();
        };
        let de_x = self.dag.reach(&q.xs, Direction::Down);
        let an_y = self.dag.reach(&q.ys, Direction::Up);
        let pool: Vec<usize> = self
            .sorted_by_name(de_x.intersection(&an_y).copied().collect())
            .into_iter()
            .filter(|&i| i != x && i != y && self.observed(i))
            .collect();
        let no_out_x = self.dag.without_edges(|a, _| a == x);

        self.minimal_sets(&pool, 1, |ms| {
            let cut = self.dag.without_edges(|a, _| ms.contains(&a));
            let intercepted = !cut.reach(&q.xs, Direction::Down).contains(&y);
            let no_open_backdoor = no_out_x.d_separated_ids(&q.xs, ms, &BTreeSet::new());
            let screened = cut.d_separated_ids(ms, &q.ys, &q.xs);
            intercepted && no_open_backdoor && screened
        })
    }

    fn instrument_ids(&self, q: &Query) -> Vec<usize> {
        let (Some(&x), Some(&y), 1, 1) = (q.xs.first(), q.ys.first(), q.xs.len(), q.ys.len()) else {
            return Vec::new();
        };
        let de_x = self.dag.reach(&q.xs, Direction::Down);
        let no_out_x = self.dag.without_edges(|a, _| a == x);
        let empty = BTreeSet::new();
        let mut out: Vec<usize> = self
            .sorted_by_name((0..self.dag.len()).collect())
            .into_iter()
            .filter(|&z| z != x && z != y && self.observed(z) && !de_x.contains(&z))
            .filter(|&z| {
                let zs = BTreeSet::from([z]);
                let relevant = !self.dag.d_separated_ids(&zs, &q.xs, &empty);
                let excluded = no_out_x.d_separated_ids(&zs, &q.ys, &empty);
                relevant && excluded
            })
            .collect();
        out.truncate(self.config.max_candidates);
        out
    }

    fn sorted_by_name(&self, ids: BTreeSet<usize>) -> Vec<usize> {
        let mut v: Vec<usize> = ids.into_iter().collect();
        v.sort_by(|&a, &b| self.dag.name_of(a).cmp(self.dag.name_of(b)));
        v
    }

    /// Subsets of `pool` (sorted by name) passing `valid`, by increasing size,
    /// skipping supersets of earlier hits.
    fn minimal_sets(
        &self,
        pool: &[usize],
        min_size: usize,
        valid: impl Fn(&BTreeSet<usize>) -> bool,
    ) -> Vec<BTreeSet<usize>> {
        let mut found: Vec<BTreeSet<usize>> = Vec::new();
        let max_size = self.config.max_set_size.min(pool.len());
        for k in min_size..=max_size {
            let mut idx: Vec<usize> = (0..k).collect();
            loop {
                let set: BTreeSet<usize> = idx.iter().map(|&i| pool[i]).collect();
                if !found.iter().any(|f| f.is_subset(&set)) && valid(&set) {
                    found.push(set);
                    if found.len() >= self.config.max_candidates {
                        return found;
                    }
                }
                if !next_combination(&mut idx, pool.len()) {
                    break;
                }
            }
        }
        found
    }
}

/// Advance `idx` to the next k-combination of `0..n` in lexicographic order.
fn next_combination(idx: &mut [usize], n: usize) -> bool {
    let k = idx.len();
    let Some(i) = (0..k).rev().find(|&i| idx[i] < n - k + i) else {
        return false;
    };
    idx[i] += 1;
    for j in i + 1..k {
        idx[j] = idx[j - 1] + 1;
    }
    true
}
