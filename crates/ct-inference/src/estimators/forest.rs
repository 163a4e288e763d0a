//! Causal forest: bagged honest trees over the effect modifiers, grown on
//! outcome and treatment residuals.
//!
//! Outcome and treatment are first residualised on the controls (adjustment
//! set plus effect modifiers) by OLS. Each tree then shuffles the rows and
//! splits them in half: the first half picks splits that maximise effect
//! heterogeneity, the second half estimates the leaf effect
//! `sum(t~ y~) / sum(t~^2)`. The ATE is the mean of the per-row orthogonal
//! scores, which also give its standard error.

use std::collections::{BTreeMap, BTreeSet};

use ct_core::{
    CausalEstimator, Contrast, Dataset, Error, Estimand, EstimatorConfig, FittedEffect,
    ForestConfig, Result, Strategy, Value,
};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::{model_rows, numeric_vector, project, require_strategy, single, unit_delta};
use crate::bootstrap_ci::{percentile_interval, quantile_linear_sorted, run_resamples};
use crate::design::Design;
use crate::regression::{ols, t_interval};

/// Candidate thresholds tried per feature and node.
const N_THRESHOLDS: usize = 8;
const VAR_EPS: f64 = 1e-12;

/// Non-parametric back-door estimator with heterogeneous effects.
///
/// Splits run over `effect_modifiers`, or over the adjustment set when none
/// are declared. Hyper-parameters come from `EstimatorConfig::forest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CausalForestEstimator {
    /// Variables the effect may vary with.
    pub effect_modifiers: Vec<String>,
}

impl CausalForestEstimator {
    /// Split on the adjustment set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Split on `names` instead of the adjustment set.
    pub fn with_effect_modifiers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.effect_modifiers = names.into_iter().map(Into::into).collect();
        self
    }

    /// Fit and return the concrete forest.
    pub fn fit_forest(
        &self,
        data: &Dataset,
        estimand: &Estimand,
        config: &EstimatorConfig,
    ) -> Result<CausalForestFit> {
        require_strategy(self.name(), estimand, Strategy::Backdoor)?;
        let treatment = single(estimand.treatments(), "treatment")?;
        let outcome = single(estimand.outcomes(), "outcome")?;
        if let Some(m) = self.effect_modifiers.iter().find(|m| *m == treatment || *m == outcome) {
            return Err(Error::InvalidInput(format!(
                "'{m}' cannot be both an effect modifier and a treatment or outcome"
            )));
        }

        // Rows must be complete over the modifiers as well.
        let controls: BTreeSet<String> = estimand
            .adjustment_set()
            .iter()
            .chain(&self.effect_modifiers)
            .cloned()
            .collect();
        let widened = Estimand::new(
            Strategy::Backdoor,
            estimand.treatments().to_vec(),
            estimand.outcomes().to_vec(),
            controls.clone(),
        );
        let rows = model_rows(data, &widened)?;
        let data = project(data, &widened, &rows)?;
        let rows: Vec<usize> = (0..data.n_rows()).collect();
        let n = rows.len();
        let params = &config.forest;
        if n < 2 * params.min_leaf_size.max(2) {
            return Err(Error::insufficient_data(format!(
                "{n} rows is too few for leaves of {} rows",
                params.min_leaf_size
            )));
        }

        let controls: Vec<String> = controls.into_iter().collect();
        let nuisance = Design::new(&data, &rows, &controls, &[], &[], true)?;
        let c = nuisance.matrix(&data, &rows)?;
        let t = residualise(&c, &numeric_vector(&data, &rows, treatment)?)?;
        let y = residualise(&c, &numeric_vector(&data, &rows, outcome)?)?;
        let all: Vec<usize> = (0..n).collect();
        if partial_slope(&t, &y, &all).is_none() {
            return Err(Error::insufficient_data(format!(
                "treatment '{treatment}' does not vary given the controls"
            )));
        }

        let features: Vec<String> = if self.effect_modifiers.is_empty() {
            estimand.adjustment_set().iter().cloned().collect()
        } else {
            self.effect_modifiers.clone()
        };
        let design = Design::new(&data, &rows, &features, &[], &[], false)?;
        let w = design.matrix(&data, &rows)?;

        let grower = Grower { w: &w, t: &t, y: &y, params };
        let resampled = run_resamples(params.n_trees, config.seed, config.max_duration(), |rng| {
            Ok(grower.grow_tree(rng))
        })?;
        let trees = resampled.values;
        if trees.is_empty() {
            return Err(Error::insufficient_data("forest grew no trees"));
        }

        let rows_w: Vec<Vec<f64>> = (0..n).map(|i| w.row(i).iter().copied().collect()).collect();
        let tree_ates: Vec<f64> = trees
            .iter()
            .map(|tree| rows_w.iter().map(|wi| tree.predict(wi)).sum::<f64>() / n as f64)
            .collect();

        // Orthogonal scores tau(w) + t~ (y~ - tau(w) t~) / mean(t~^2).
        let mean_tt = t.iter().map(|v| v * v).sum::<f64>() / n as f64;
        let scores: Vec<f64> = rows_w
            .iter()
            .enumerate()
            .map(|(i, wi)| {
                let tau = mean_prediction(&trees, wi);
                tau + t[i] * (y[i] - tau * t[i]) / mean_tt
            })
            .collect();
        let ate = scores.iter().sum::<f64>() / n as f64;
        let var = scores.iter().map(|s| (s - ate).powi(2)).sum::<f64>() / (n - 1) as f64;
        let ate_se = (var / n as f64).sqrt();
        tracing::info!(
            n_obs = n,
            n_trees = trees.len(),
            n_features = features.len(),
            ate,
            ate_se,
            elapsed_secs = resampled.elapsed_secs,
            "fitted causal forest"
        );

        Ok(CausalForestFit {
            treatment: treatment.to_string(),
            design,
            trees,
            rows_w,
            tree_ates,
            ate,
            ate_se,
        })
    }
}

impl CausalEstimator for CausalForestEstimator {
    fn name(&self) -> &str {
        "causal_forest"
    }

    fn supports(&self, strategy: Strategy) -> bool {
        strategy == Strategy::Backdoor
    }

    fn modelling_assumptions(&self) -> Vec<String> {
        let mut out = vec![
            "outcome and treatment depend linearly on the controls".to_string(),
            "the effect is locally constant within each leaf".to_string(),
        ];
        if self.effect_modifiers.is_empty() {
            out.push("the effect varies only with the adjustment set".to_string());
        } else {
            out.push(format!("the effect varies only with {}", self.effect_modifiers.join(", ")));
        }
        out
    }

    fn fit(
        &self,
        data: &Dataset,
        estimand: &Estimand,
        config: &EstimatorConfig,
    ) -> Result<Box<dyn FittedEffect>> {
        Ok(Box::new(self.fit_forest(data, estimand, config)?))
    }
}

/// `v - C beta` for the least-squares `beta` of `v` on `c`.
fn residualise(c: &DMatrix<f64>, v: &DVector<f64>) -> Result<Vec<f64>> {
    let fit = ols(c, v)?;
    Ok((v - c * &fit.coefficients).iter().copied().collect())
}

fn mean_prediction(trees: &[Tree], wi: &[f64]) -> f64 {
    trees.iter().map(|t| t.predict(wi)).sum::<f64>() / trees.len() as f64
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Leaf { tau: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, w: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Leaf { tau } => return tau,
                Node::Split { feature, threshold, left, right } => {
                    i = if w[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Slope through the origin of residual `y` on residual `t` over `rows`;
/// `None` when `t` carries no variation there.
fn partial_slope(t: &[f64], y: &[f64], rows: &[usize]) -> Option<f64> {
    if rows.len() < 2 {
        return None;
    }
    let (mut sty, mut stt) = (0.0, 0.0);
    for &i in rows {
        sty += t[i] * y[i];
        stt += t[i] * t[i];
    }
    (stt / rows.len() as f64 > VAR_EPS).then(|| sty / stt)
}

struct Grower<'a> {
    w: &'a DMatrix<f64>,
    t: &'a [f64],
    y: &'a [f64],
    params: &'a ForestConfig,
}

impl Grower<'_> {
    fn grow_tree(&self, rng: &mut StdRng) -> Tree {
        let mut idx: Vec<usize> = (0..self.t.len()).collect();
        idx.shuffle(rng);
        let half = idx.len() / 2;
        let (grow, est) = idx.split_at(half);
        let root_tau = partial_slope(self.t, self.y, est)
            .or_else(|| partial_slope(self.t, self.y, grow))
            .unwrap_or(0.0);
        let mut nodes = Vec::new();
        self.grow_node(&mut nodes, grow.to_vec(), est.to_vec(), 0, root_tau);
        Tree { nodes }
    }

    /// Append the subtree for `(grow, est)` and return its root index.
    fn grow_node(
        &self,
        nodes: &mut Vec<Node>,
        grow: Vec<usize>,
        est: Vec<usize>,
        depth: usize,
        parent_tau: f64,
    ) -> usize {
        let tau = partial_slope(self.t, self.y, &est).unwrap_or(parent_tau);
        let id = nodes.len();
        nodes.push(Node::Leaf { tau });

        let min_leaf = self.params.min_leaf_size;
        if depth >= self.params.max_depth || grow.len() < 2 * min_leaf {
            return id;
        }
        let Some((feature, threshold)) = self.best_split(&grow) else {
            return id;
        };

        let goes_left = |&i: &usize| self.w[(i, feature)] <= threshold;
        let (grow_l, grow_r): (Vec<usize>, Vec<usize>) = grow.into_iter().partition(goes_left);
        let (est_l, est_r): (Vec<usize>, Vec<usize>) = est.into_iter().partition(goes_left);
        let left = self.grow_node(nodes, grow_l, est_l, depth + 1, tau);
        let right = self.grow_node(nodes, grow_r, est_r, depth + 1, tau);
        nodes[id] = Node::Split { feature, threshold, left, right };
        id
    }

    /// Split maximising `n_l * n_r * (tau_l - tau_r)^2` on the growing half.
    fn best_split(&self, grow: &[usize]) -> Option<(usize, f64)> {
        let min_leaf = self.params.min_leaf_size;
        let mut best: Option<(f64, usize, f64)> = None;
        for feature in 0..self.w.ncols() {
            let mut vals: Vec<f64> = grow.iter().map(|&i| self.w[(i, feature)]).collect();
            vals.sort_by(f64::total_cmp);
            let mut cuts: Vec<f64> = (1..N_THRESHOLDS)
                .map(|k| quantile_linear_sorted(&vals, k as f64 / N_THRESHOLDS as f64))
                .collect();
            cuts.dedup();
            for threshold in cuts {
                let (l, r): (Vec<usize>, Vec<usize>) =
                    grow.iter().partition(|&&i| self.w[(i, feature)] <= threshold);
                if l.len() < min_leaf || r.len() < min_leaf {
                    continue;
                }
                let (Some(tl), Some(tr)) =
                    (partial_slope(self.t, self.y, &l), partial_slope(self.t, self.y, &r))
                else {
                    continue;
                };
                let score = l.len() as f64 * r.len() as f64 * (tl - tr).powi(2);
                if best.is_none_or(|(s, _, _)| score > s) {
                    best = Some((score, feature, threshold));
                }
            }
        }
        best.filter(|(s, _, _)| *s > 0.0).map(|(_, f, th)| (f, th))
    }
}

// ---------------------------------------------------------------------------
// Fitted forest
// ---------------------------------------------------------------------------

/// Conditional effect of a unit increase with its spread over trees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CateEstimate {
    /// Mean over trees.
    pub cate: f64,
    /// Lower percentile over trees.
    pub lower: f64,
    /// Upper percentile over trees.
    pub upper: f64,
}

/// Fitted causal forest.
#[derive(Debug, Clone)]
pub struct CausalForestFit {
    treatment: String,
    design: Design,
    trees: Vec<Tree>,
    rows_w: Vec<Vec<f64>>,
    tree_ates: Vec<f64>,
    ate: f64,
    ate_se: f64,
}

impl CausalForestFit {
    /// Average effect of a unit increase in the treatment.
    pub fn ate_per_unit(&self) -> f64 {
        self.ate
    }

    /// Standard error of [`Self::ate_per_unit`].
    pub fn ate_standard_error(&self) -> f64 {
        self.ate_se
    }

    /// Number of trees grown.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Per-tree ATEs.
    pub fn tree_ates(&self) -> &[f64] {
        &self.tree_ates
    }

    /// Variables the trees split on.
    pub fn feature_names(&self) -> Vec<String> {
        self.design.term_names()
    }

    /// Conditional effect of a unit increase for every fitted row, with a
    /// `1 - confidence_level` percentile band over trees.
    pub fn estimate_cates(&self, confidence_level: f64) -> Result<Vec<CateEstimate>> {
        self.rows_w.iter().map(|wi| self.cate_from(wi, confidence_level)).collect()
    }

    /// Conditional effect of a unit increase at the given modifier values.
    pub fn cate_at(
        &self,
        modifiers: &BTreeMap<String, Value>,
        confidence_level: f64,
    ) -> Result<CateEstimate> {
        let wi = self.design.row(|name| modifiers.get(name))?;
        self.cate_from(&wi, confidence_level)
    }

    fn cate_from(&self, wi: &[f64], confidence_level: f64) -> Result<CateEstimate> {
        let per_tree: Vec<f64> = self.trees.iter().map(|t| t.predict(wi)).collect();
        let (lower, upper) = percentile_interval(&per_tree, confidence_level)?;
        Ok(CateEstimate { cate: mean_prediction(&self.trees, wi), lower, upper })
    }
}

impl FittedEffect for CausalForestFit {
    fn n_obs(&self) -> usize {
        self.rows_w.len()
    }

    fn effect(&self, contrast: &Contrast) -> Result<f64> {
        Ok(self.ate * unit_delta(contrast, &self.treatment)?)
    }

    fn interval(&self, contrast: &Contrast, confidence_level: f64) -> Result<Option<(f64, f64)>> {
        let delta = unit_delta(contrast, &self.treatment)?;
        let dof = self.rows_w.len().saturating_sub(1);
        t_interval(self.ate * delta, self.ate_se * delta.abs(), dof, confidence_level).map(Some)
    }
}
