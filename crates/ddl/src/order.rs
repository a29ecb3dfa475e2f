//! The dependency graph of DDL objects: an arena keyed by `oid` plus an
//! adjacency-list index, per §9 "Dependency graph of DDL objects -> arena +
//! index." Separate from the text-formatting code in `object`, so the
//! topological sort can be tested without constructing any SQL.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("dependency cycle detected among oids: {0:?}")]
    Cycle(Vec<u32>),
}

/// A minimal dependency graph: every node is identified by its catalog
/// oid and lists the oids it must be emitted after.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    nodes: Vec<u32>,
    edges: HashMap<u32, Vec<u32>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `oid` in emission-candidate order, with `depends_upon` as
    /// the oids it must follow. Calling this more than once for the same
    /// oid appends further dependencies rather than replacing them.
    pub fn add(&mut self, oid: u32, depends_upon: &[u32]) {
        if !self.edges.contains_key(&oid) {
            self.nodes.push(oid);
        }
        self.edges.entry(oid).or_default().extend(depends_upon);
    }

    /// Returns a topological ordering of every registered oid: a node
    /// always follows everything in its `depends_upon` list. Ties are
    /// broken by first-registration order, so the sort is deterministic
    /// for a fixed insertion sequence (§4.A's "probe results are
    /// deterministically ordered" extends through emission).
    pub fn topological_order(&self) -> Result<Vec<u32>, OrderError> {
        let mut visited: HashSet<u32> = HashSet::new();
        let mut on_stack: HashSet<u32> = HashSet::new();
        let mut order: Vec<u32> = Vec::with_capacity(self.nodes.len());

        for &start in &self.nodes {
            if !visited.contains(&start) {
                self.visit(start, &mut visited, &mut on_stack, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        oid: u32,
        visited: &mut HashSet<u32>,
        on_stack: &mut HashSet<u32>,
        order: &mut Vec<u32>,
    ) -> Result<(), OrderError> {
        on_stack.insert(oid);
        if let Some(deps) = self.edges.get(&oid) {
            for &dep in deps {
                if on_stack.contains(&dep) {
                    return Err(OrderError::Cycle(vec![dep, oid]));
                }
                if !visited.contains(&dep) {
                    self.visit(dep, visited, on_stack, order)?;
                }
            }
        }
        on_stack.remove(&oid);
        visited.insert(oid);
        order.push(oid);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_topological_order_respects_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.add(1, &[]);
        graph.add(2, &[1]);
        graph.add(3, &[1, 2]);

        let order = graph.topological_order().unwrap();
        let pos = |oid: u32| order.iter().position(|&o| o == oid).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(2) < pos(3));
    }

    #[test]
    fn test_topological_order_is_deterministic_for_independent_nodes() {
        let mut graph = DependencyGraph::new();
        graph.add(5, &[]);
        graph.add(3, &[]);
        graph.add(4, &[]);

        assert_eq!(graph.topological_order().unwrap(), vec![5, 3, 4]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add(1, &[2]);
        graph.add(2, &[1]);

        assert!(graph.topological_order().is_err());
    }
}
