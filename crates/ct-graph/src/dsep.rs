//! d-separation via the "reachable" (Bayes-ball) traversal.
//!
//! A trail is active when every collider on it is in `Z` or has a
//! descendant in `Z`, and no other node on it is in `Z`. The traversal walks
//! `(node, direction)` states once each, so multiple disjoint paths and
//! latent common causes cost nothing extra.
//!
//! Reference: Koller & Friedman, *Probabilistic Graphical Models*, Alg. 3.1.

use std::collections::BTreeSet;

use ct_core::{Error, Result};

use crate::dag::{CausalDag, Direction};

impl CausalDag {
    /// `true` if every trail between `x` and `y` is blocked given `given`.
    ///
    /// Unknown names fail with `UnknownVariable`. `x` and `given` must be
    /// disjoint. Overlapping `x` and `y` are never separated; empty `x` or
    /// `y` are trivially separated.
    pub fn is_d_separated<I, J, K, S, T, U>(&self, x: I, y: J, given: K) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        K: IntoIterator<Item = U>,
        S: AsRef<str>,
        T: AsRef<str>,
        U: AsRef<str>,
    {
        let xs = self.ids(x)?;
        let ys = self.ids(y)?;
        let zs = self.ids(given)?;
        if !xs.is_disjoint(&zs) {
            return Err(Error::InvalidInput(
                "d-separation: source set overlaps the conditioning set".to_string(),
            ));
        }
        Ok(self.d_separated_ids(&xs, &ys, &zs))
    }

    /// Index-level d-separation; callers guarantee `xs ∩ zs = ∅`.
    pub(crate) fn d_separated_ids(
        &self,
        xs: &BTreeSet<usize>,
        ys: &BTreeSet<usize>,
        zs: &BTreeSet<usize>,
    ) -> bool {
        if !xs.is_disjoint(ys) {
            return false;
        }
        let reachable = self.active_reachable(xs, zs);
        reachable.is_disjoint(ys)
    }

    /// Nodes connected to `xs` by an active trail given `zs`.
    fn active_reachable(&self, xs: &BTreeSet<usize>, zs: &BTreeSet<usize>) -> BTreeSet<usize> {
        // Colliders open up when they are in Z or have a descendant in Z.
        let mut an_z = self.reach(zs, Direction::Up);
        an_z.extend(zs.iter().copied());

        let n = self.len();
        let mut visited_up = vec![false; n];
        let mut visited_down = vec![false; n];
        let mut reachable = BTreeSet::new();
        // Up: arrived from a child. Down: arrived from a parent.
        let mut stack: Vec<(usize, Direction)> = xs.iter().map(|&x| (x, Direction::Up)).collect();

        while let Some((node, dir)) = stack.pop() {
            let visited = match dir {
                Direction::Up => &mut visited_up[node],
                Direction::Down => &mut visited_down[node],
            };
            if *visited {
                continue;
            }
            *visited = true;

            let observed = zs.contains(&node);
            if !observed {
                reachable.insert(node);
            }

            match dir {
                Direction::Up if !observed => {
                    stack.extend(self.parent_ids(node).iter().map(|&p| (p, Direction::Up)));
                    stack.extend(self.child_ids(node).iter().map(|&c| (c, Direction::Down)));
                }
                Direction::Up => {}
                Direction::Down => {
                    if !observed {
                        stack.extend(self.child_ids(node).iter().map(|&c| (c, Direction::Down)));
                    }
                    if an_z.contains(&node) {
                        stack.extend(self.parent_ids(node).iter().map(|&p| (p, Direction::Up)));
                    }
                }
            }
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use ct_core::{Domain, Variable};

    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> CausalDag {
        let mut g = CausalDag::new();
        for n in nodes {
            g.add_variable(Variable::covariate(*n, Domain::continuous())).unwrap();
        }
        for (a, b) in edges {
            g.add_edge(a, b).unwrap();
        }
        g
    }

    const NONE: [&str; 0] = [];

    #[test]
    fn chain_fork_and_collider() {
        let chain = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        assert!(!chain.is_d_separated(["a"], ["c"], NONE).unwrap());
        assert!(chain.is_d_separated(["a"], ["c"], ["b"]).unwrap());

        let fork = graph(&["a", "b", "c"], &[("b", "a"), ("b", "c")]);
        assert!(!fork.is_d_separated(["a"], ["c"], NONE).unwrap());
        assert!(fork.is_d_separated(["a"], ["c"], ["b"]).unwrap());

        let collider = graph(&["a", "b", "c", "d"], &[("a", "b"), ("c", "b"), ("b", "d")]);
        assert!(collider.is_d_separated(["a"], ["c"], NONE).unwrap());
        assert!(!collider.is_d_separated(["a"], ["c"], ["b"]).unwrap());
        // Conditioning on a descendant of the collider opens it too.
        assert!(!collider.is_d_separated(["a"], ["c"], ["d"]).unwrap());
    }

    #[test]
    fn every_disjoint_path_must_be_blocked() {
        // x <- a -> y and x <- b -> y
        let g = graph(&["x", "y", "a", "b"], &[("a", "x"), ("a", "y"), ("b", "x"), ("b", "y")]);
        assert!(!g.is_d_separated(["x"], ["y"], ["a"]).unwrap());
        assert!(!g.is_d_separated(["x"], ["y"], ["b"]).unwrap());
        assert!(g.is_d_separated(["x"], ["y"], ["a", "b"]).unwrap());
    }

    #[test]
    fn latent_confounder_keeps_trail_open() {
        let mut g = CausalDag::new();
        g.add_variable(Variable::unobserved("u")).unwrap();
        g.add_variable(Variable::input("x", Domain::continuous())).unwrap();
        g.add_variable(Variable::output("y", Domain::continuous())).unwrap();
        g.add_edge("u", "x").unwrap();
        g.add_edge("u", "y").unwrap();
        assert!(!g.is_d_separated(["x"], ["y"], NONE).unwrap());
        assert!(g.is_d_separated(["x"], ["y"], ["u"]).unwrap());
    }

    #[test]
    fn m_bias_collider_is_closed_by_default() {
        // x <- a -> m <- b -> y
        let g = graph(
            &["x", "y", "a", "b", "m"],
            &[("a", "x"), ("a", "m"), ("b", "m"), ("b", "y")],
        );
        assert!(g.is_d_separated(["x"], ["y"], NONE).unwrap());
        assert!(!g.is_d_separated(["x"], ["y"], ["m"]).unwrap());
        assert!(g.is_d_separated(["x"], ["y"], ["m", "a"]).unwrap());
    }

    #[test]
    fn degenerate_arguments() {
        let g = graph(&["a", "b"], &[("a", "b")]);
        assert!(!g.is_d_separated(["a"], ["a"], NONE).unwrap());
        assert!(g.is_d_separated(NONE, ["b"], NONE).unwrap());
        assert!(matches!(g.is_d_separated(["a"], ["b"], ["a"]), Err(Error::InvalidInput(_))));
        assert!(matches!(g.is_d_separated(["q"], ["b"], NONE), Err(Error::UnknownVariable(_))));
    }
}
