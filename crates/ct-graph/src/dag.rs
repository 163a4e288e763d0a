//! Typed causal DAG over registered variables.
//!
//! Edges are stored as parent/child index sets so every traversal is
//! deterministic (ascending registration order).

use std::collections::{BTreeSet, HashMap};

use ct_core::{Error, Result, Variable};
use serde::{Deserialize, Serialize};

/// Directed acyclic graph of cause -> effect relationships.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "DagRepr", into = "DagRepr")]
pub struct CausalDag {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
    parents: Vec<BTreeSet<usize>>,
    children: Vec<BTreeSet<usize>>,
}

#[derive(Serialize, Deserialize)]
struct DagRepr {
    variables: Vec<Variable>,
    #[serde(default)]
    edges: Vec<(String, String)>,
}

impl TryFrom<DagRepr> for CausalDag {
    type Error = Error;

    fn try_from(repr: DagRepr) -> Result<Self> {
        Self::from_parts(repr.variables, repr.edges)
    }
}

impl From<CausalDag> for DagRepr {
    fn from(dag: CausalDag) -> Self {
        let edges = dag.edges().map(|(a, b)| (a.to_string(), b.to_string())).collect();
        Self { variables: dag.variables, edges }
    }
}

impl PartialEq for CausalDag {
    fn eq(&self, other: &Self) -> bool {
        self.variables == other.variables && self.children == other.children
    }
}

/// Traversal direction for [`Reachable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// Follow edges towards causes.
    Up,
    /// Follow edges towards effects.
    Down,
}

/// Lazily computed set of variables reachable from a start node.
///
/// The traversal advances only as the iterator is consumed. Cloning the
/// iterator (or calling [`CausalDag::ancestors`] again) restarts it.
#[derive(Debug, Clone)]
pub struct Reachable<'a> {
    dag: &'a CausalDag,
    direction: Direction,
    stack: Vec<usize>,
    seen: Vec<bool>,
}

impl<'a> Reachable<'a> {
    fn new(dag: &'a CausalDag, start: usize, direction: Direction) -> Self {
        let mut it = Self { dag, direction, stack: Vec::new(), seen: vec![false; dag.len()] };
        it.seen[start] = true;
        it.push_neighbours(start);
        it
    }

    fn push_neighbours(&mut self, node: usize) {
        let next = match self.direction {
            Direction::Up => &self.dag.parents[node],
            Direction::Down => &self.dag.children[node],
        };
        // Reverse so the smallest index is popped first.
        for &n in next.iter().rev() {
            if !self.seen[n] {
                self.seen[n] = true;
                self.stack.push(n);
            }
        }
    }
}

impl<'a> Iterator for Reachable<'a> {
    type Item = &'a Variable;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_neighbours(node);
        Some(&self.dag.variables[node])
    }
}

impl CausalDag {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from variables and `(cause, effect)` name pairs.
    pub fn from_parts<I, S>(variables: Vec<Variable>, edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut dag = Self::new();
        for v in variables {
            dag.add_variable(v)?;
        }
        for (from, to) in edges {
            dag.add_edge(from.as_ref(), to.as_ref())?;
        }
        Ok(dag)
    }

    /// Register a variable.
    ///
    /// Fails with `DuplicateVariable` on a name collision and with
    /// `InvalidInput` on a malformed domain.
    pub fn add_variable(&mut self, variable: Variable) -> Result<()> {
        variable.validate()?;
        if self.index.contains_key(variable.name()) {
            return Err(Error::DuplicateVariable(variable.name().to_string()));
        }
        let id = self.variables.len();
        self.index.insert(variable.name().to_string(), id);
        self.variables.push(variable);
        self.parents.push(BTreeSet::new());
        self.children.push(BTreeSet::new());
        Ok(())
    }

    /// Insert `from -> to`.
    ///
    /// The graph is left untouched when either endpoint is unknown or the
    /// edge would close a cycle. Re-adding an existing edge is a no-op.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        let a = self.id(from)?;
        let b = self.id(to)?;
        if a == b || self.path_exists(b, a) {
            return Err(Error::CycleDetected { from: from.to_string(), to: to.to_string() });
        }
        self.children[a].insert(b);
        self.parents[b].insert(a);
        Ok(())
    }

    /// Number of registered variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// `true` if no variable is registered.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Number of edges.
    pub fn n_edges(&self) -> usize {
        self.children.iter().map(BTreeSet::len).sum()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|&i| &self.variables[i])
    }

    /// Variables in registration order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// Edges as `(cause, effect)` names, ordered by cause then effect registration.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.children.iter().enumerate().flat_map(move |(a, cs)| {
            cs.iter().map(move |&b| (self.variables[a].name(), self.variables[b].name()))
        })
    }

    /// Direct causes of `name`.
    pub fn parents(&self, name: &str) -> Result<Vec<&Variable>> {
        let id = self.id(name)?;
        Ok(self.parents[id].iter().map(|&p| &self.variables[p]).collect())
    }

    /// Direct effects of `name`.
    pub fn children(&self, name: &str) -> Result<Vec<&Variable>> {
        let id = self.id(name)?;
        Ok(self.children[id].iter().map(|&c| &self.variables[c]).collect())
    }

    /// Variables with a directed path into `name` (excluding `name`).
    pub fn ancestors(&self, name: &str) -> Result<Reachable<'_>> {
        Ok(Reachable::new(self, self.id(name)?, Direction::Up))
    }

    /// Variables reachable from `name` along directed edges (excluding `name`).
    pub fn descendants(&self, name: &str) -> Result<Reachable<'_>> {
        Ok(Reachable::new(self, self.id(name)?, Direction::Down))
    }

    /// Whether a directed path `from -> ... -> to` exists (length >= 1).
    pub fn has_directed_path(&self, from: &str, to: &str) -> Result<bool> {
        let a = self.id(from)?;
        let b = self.id(to)?;
        Ok(self.path_exists(a, b))
    }

    /// Copy of the graph with every edge leaving `names` removed.
    ///
    /// For a treatment set this is the back-door graph.
    pub fn without_outgoing_edges<I, S>(&self, names: I) -> Result<CausalDag>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = self.ids(names)?;
        Ok(self.without_edges(|a, _| ids.contains(&a)))
    }

    /// Copy of the graph with every edge entering `names` removed.
    pub fn without_incoming_edges<I, S>(&self, names: I) -> Result<CausalDag>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = self.ids(names)?;
        Ok(self.without_edges(|_, b| ids.contains(&b)))
    }

    /// Variables on proper causal paths from `treatments` to `outcomes`.
    ///
    /// `PCP(X, Y) = (De(X) \ X) ∩ (An(Y) ∪ Y)`, with descendants taken after
    /// removing edges into `X` and ancestors after removing edges out of `X`
    /// (Zander, Liśkiewicz & Textor 2019).
    pub fn proper_causal_path_nodes<I, J, S, T>(
        &self,
        treatments: I,
        outcomes: J,
    ) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let xs = self.ids(treatments)?;
        let ys = self.ids(outcomes)?;
        Ok(self.pcp_ids(&xs, &ys).into_iter().map(|i| self.variables[i].name().to_string()).collect())
    }

    /// Remove the first edge of every proper causal path from `treatments` to `outcomes`.
    pub fn proper_backdoor_graph<I, J, S, T>(&self, treatments: I, outcomes: J) -> Result<CausalDag>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let xs = self.ids(treatments)?;
        let ys = self.ids(outcomes)?;
        let pcp = self.pcp_ids(&xs, &ys);
        Ok(self.without_edges(|a, b| xs.contains(&a) && pcp.contains(&b)))
    }

    // -----------------------------------------------------------------------
    // Index-level helpers shared with d-separation and identification.
    // -----------------------------------------------------------------------

    pub(crate) fn id(&self, name: &str) -> Result<usize> {
        self.index.get(name).copied().ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    pub(crate) fn ids<I, S>(&self, names: I) -> Result<BTreeSet<usize>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().map(|n| self.id(n.as_ref())).collect()
    }

    pub(crate) fn name_of(&self, id: usize) -> &str {
        self.variables[id].name()
    }

    pub(crate) fn variable_at(&self, id: usize) -> &Variable {
        &self.variables[id]
    }

    pub(crate) fn parent_ids(&self, id: usize) -> &BTreeSet<usize> {
        &self.parents[id]
    }

    pub(crate) fn child_ids(&self, id: usize) -> &BTreeSet<usize> {
        &self.children[id]
    }

    /// Nodes reachable from `starts` (starts excluded unless reachable from another start).
    pub(crate) fn reach(&self, starts: &BTreeSet<usize>, direction: Direction) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        let mut stack: Vec<usize> = starts.iter().copied().collect();
        while let Some(n) = stack.pop() {
            let next = match direction {
                Direction::Up => &self.parents[n],
                Direction::Down => &self.children[n],
            };
            for &m in next {
                if out.insert(m) {
                    stack.push(m);
                }
            }
        }
        out
    }

    fn path_exists(&self, from: usize, to: usize) -> bool {
        let mut seen = vec![false; self.len()];
        let mut stack = vec![from];
        while let Some(n) = stack.pop() {
            for &c in &self.children[n] {
                if c == to {
                    return true;
                }
                if !seen[c] {
                    seen[c] = true;
                    stack.push(c);
                }
            }
        }
        false
    }

    pub(crate) fn without_edges(&self, drop: impl Fn(usize, usize) -> bool) -> CausalDag {
        let mut out = self.clone();
        for a in 0..self.len() {
            for &b in &self.children[a] {
                if drop(a, b) {
                    out.children[a].remove(&b);
                    out.parents[b].remove(&a);
                }
            }
        }
        out
    }

    pub(crate) fn pcp_ids(&self, xs: &BTreeSet<usize>, ys: &BTreeSet<usize>) -> BTreeSet<usize> {
        let no_into_x = self.without_edges(|_, b| xs.contains(&b));
        let no_out_of_x = self.without_edges(|a, _| xs.contains(&a));
        let de_x = no_into_x.reach(xs, Direction::Down);
        let mut an_y = no_out_of_x.reach(ys, Direction::Up);
        an_y.extend(ys.iter().copied());
        de_x.intersection(&an_y).filter(|n| !xs.contains(n)).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_core::{Domain, Variable};

    fn cont(name: &str) -> Variable {
        Variable::covariate(name, Domain::continuous())
    }

    fn chain() -> CausalDag {
        CausalDag::from_parts(
            vec![cont("a"), cont("b"), cont("c"), cont("d")],
            [("a", "b"), ("b", "c"), ("a", "d")],
        )
        .unwrap()
    }

    #[test]
    fn duplicate_and_unknown_variables() {
        let mut g = chain();
        assert!(matches!(g.add_variable(cont("a")), Err(Error::DuplicateVariable(n)) if n == "a"));
        assert!(matches!(g.add_edge("a", "zz"), Err(Error::UnknownVariable(n)) if n == "zz"));
    }

    #[test]
    fn cycle_is_rejected_atomically() {
        let mut g = chain();
        let before = g.clone();
        let err = g.add_edge("c", "a").unwrap_err();
        assert!(matches!(err, Error::CycleDetected { ref from, ref to } if from == "c" && to == "a"));
        assert_eq!(g, before);
        assert!(g.add_edge("b", "b").is_err());
        assert_eq!(g.n_edges(), 3);
    }

    #[test]
    fn re_adding_an_edge_is_a_noop() {
        let mut g = chain();
        g.add_edge("a", "b").unwrap();
        assert_eq!(g.n_edges(), 3);
    }

    #[test]
    fn reachable_is_lazy_and_restartable() {
        let g = chain();
        let it = g.descendants("a").unwrap();
        let first: Vec<&str> = it.clone().map(Variable::name).collect();
        let again: Vec<&str> = it.map(Variable::name).collect();
        assert_eq!(first, vec!["b", "c", "d"]);
        assert_eq!(first, again);

        let mut up = g.ancestors("c").unwrap();
        assert_eq!(up.next().map(Variable::name), Some("b"));
        let anc: Vec<&str> = g.ancestors("c").unwrap().map(Variable::name).collect();
        assert_eq!(anc, vec!["b", "a"]);
    }

    #[test]
    fn proper_causal_paths_and_backdoor_graph() {
        // z -> x -> m -> y, z -> y, x -> w (w off-path)
        let g = CausalDag::from_parts(
            vec![cont("z"), cont("x"), cont("m"), cont("y"), cont("w")],
            [("z", "x"), ("x", "m"), ("m", "y"), ("z", "y"), ("x", "w")],
        )
        .unwrap();
        let pcp = g.proper_causal_path_nodes(["x"], ["y"]).unwrap();
        assert_eq!(pcp, BTreeSet::from(["m".to_string(), "y".to_string()]));

        let pbg = g.proper_backdoor_graph(["x"], ["y"]).unwrap();
        assert!(!pbg.has_directed_path("x", "y").unwrap());
        assert!(pbg.has_directed_path("x", "w").unwrap());
        assert!(pbg.has_directed_path("z", "y").unwrap());

        let bdg = g.without_outgoing_edges(["x"]).unwrap();
        assert_eq!(bdg.n_edges(), 3);
    }

    #[test]
    fn json_roundtrip_rechecks_acyclicity() {
        let g = chain();
        let json = serde_json::to_string(&g).unwrap();
        let back: CausalDag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, g);

        let cyclic = r#"{"variables":[
            {"name":"a","role":"covariate","domain":{"kind":"binary"}},
            {"name":"b","role":"covariate","domain":{"kind":"binary"}}],
            "edges":[["a","b"],["b","a"]]}"#;
        assert!(serde_json::from_str::<CausalDag>(cyclic).is_err());
    }
}
