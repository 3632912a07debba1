//! Ordered plans and merged plan graphs.

use crate::action::{Action, Context, NullAction, Statistics};
use crate::caching::CacheConfig;
use crate::errors::{RegridError, RegridResult};
use crate::field::Field;
use log::debug;
use petgraph::dot::{Config, Dot};
use petgraph::graph::NodeIndex;
use petgraph::{Direction, Graph};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An ordered sequence of actions, append-only during construction and
/// executed once per field set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    actions: Vec<Arc<dyn Action>>,
}

impl ActionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: Arc<dyn Action>) -> &mut Self {
        self.actions.push(action);
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Action>> {
        self.actions.iter()
    }

    /// Run every action in order. The first failure aborts the plan; the
    /// context is left at the failing step and no partial output is
    /// published.
    pub fn execute(&self, context: &mut Context) -> RegridResult<()> {
        for action in &self.actions {
            debug!("executing {}", action.name());
            action.execute(context)?;
            context.statistics_mut().actions_executed += 1;
        }
        Ok(())
    }

    /// Two plans are equivalent when every action pairwise agrees.
    pub fn same_as(&self, other: &ActionPlan) -> bool {
        self.actions.len() == other.actions.len()
            && self
                .actions
                .iter()
                .zip(other.actions.iter())
                .all(|(a, b)| a.same_as(b.as_ref()))
    }
}

/// Several plans merged by shared prefix.
///
/// Requests that ask for different products of the same input field often
/// share their leading actions; the graph represents each distinct action
/// once, so a shared step executes once and its intermediate field set is
/// reused for every branch below it.
pub struct PlanGraph {
    graph: Graph<Arc<dyn Action>, ()>,
    root: NodeIndex,
    plans: Vec<NodeIndex>,
}

impl PlanGraph {
    pub fn new() -> Self {
        let mut graph: Graph<Arc<dyn Action>, ()> = Graph::new();
        let root = graph.add_node(Arc::new(NullAction {}));
        Self {
            graph,
            root,
            plans: Vec::new(),
        }
    }

    /// Children of a node in insertion order.
    fn children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        children.reverse();
        children
    }

    /// Merge a plan into the graph, sharing its longest prefix of
    /// equivalent actions with previously merged plans. Returns the
    /// plan's index for result lookup after execution.
    pub fn merge(&mut self, plan: &ActionPlan) -> usize {
        let mut node = self.root;
        for action in plan.iter() {
            let existing = self
                .children(node)
                .into_iter()
                .find(|&child| self.graph[child].same_as(action.as_ref()));
            node = match existing {
                Some(child) => child,
                None => {
                    let child = self.graph.add_node(action.clone());
                    self.graph.add_edge(node, child, ());
                    child
                }
            };
        }
        self.plans.push(node);
        self.plans.len() - 1
    }

    /// Number of merged plans.
    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    /// Number of distinct actions in the graph.
    pub fn action_count(&self) -> usize {
        self.graph.node_count() - 1
    }

    /// Execute every merged plan against one shared input field set.
    ///
    /// Shared prefix actions run once; field sets are cloned only at
    /// branch points. Results come back indexed like the values returned
    /// by [`PlanGraph::merge`], together with the accumulated statistics.
    pub fn execute_all(
        &self,
        cache: &CacheConfig,
        fields: Vec<Field>,
    ) -> RegridResult<(Vec<Vec<Field>>, Statistics)> {
        let mut results: Vec<Option<Vec<Field>>> = vec![None; self.plans.len()];
        let mut statistics = Statistics::default();
        self.walk(self.root, fields, cache, &mut results, &mut statistics)?;
        let results = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                result.ok_or_else(|| {
                    RegridError::Error(format!("plan {} was never reached", index))
                })
            })
            .collect::<RegridResult<Vec<_>>>()?;
        Ok((results, statistics))
    }

    fn walk(
        &self,
        node: NodeIndex,
        fields: Vec<Field>,
        cache: &CacheConfig,
        results: &mut Vec<Option<Vec<Field>>>,
        statistics: &mut Statistics,
    ) -> RegridResult<()> {
        let fields = if node == self.root {
            fields
        } else {
            let mut context = Context::new(fields, cache);
            self.graph[node].execute(&mut context)?;
            let (fields, local) = context.finish();
            statistics.merge(&local);
            statistics.actions_executed += 1;
            fields
        };

        for (index, &end) in self.plans.iter().enumerate() {
            if end == node {
                results[index] = Some(fields.clone());
            }
        }

        let children = self.children(node);
        if let Some((&last, rest)) = children.split_last() {
            for &child in rest {
                self.walk(child, fields.clone(), cache, results, statistics)?;
            }
            self.walk(last, fields, cache, results, statistics)?;
        }
        Ok(())
    }

    /// A diagram of the merged plans. Useful for debugging.
    pub fn as_dot(&self) -> Dot<'_, &Graph<Arc<dyn Action>, ()>> {
        Dot::with_attr_getters(
            &self.graph,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, _| String::new(),
            &|_, (_, action)| format!("label = \"{}\"", action.name()),
        )
    }
}

impl Default for PlanGraph {
    fn default() -> Self {
        Self::new()
    }
}
