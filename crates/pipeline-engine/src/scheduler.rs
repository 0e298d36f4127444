//! Wave scheduling with Kahn's algorithm
//!
//! The ready set (in-degree 0) forms a wave. Once every member of a wave has
//! completed, dependents whose in-degree drops to zero form the next wave.
//! The scheduler only orders node ids; running them is the executor's job.

use std::collections::HashMap;

use crate::dependency::DependencyGraph;
use crate::error::{EngineError, Result};
use crate::types::NodeId;

/// Incremental wave scheduler over a [`DependencyGraph`]
pub struct WaveScheduler<'a> {
    deps: &'a DependencyGraph,
    remaining: HashMap<&'a str, usize>,
    position: HashMap<&'a str, usize>,
    ready: Vec<&'a str>,
    scheduled: usize,
}

impl<'a> WaveScheduler<'a> {
    pub fn new(deps: &'a DependencyGraph) -> Self {
        let mut remaining = HashMap::with_capacity(deps.nodes().len());
        let mut position = HashMap::with_capacity(deps.nodes().len());
        let mut ready = Vec::new();

        for (index, id) in deps.nodes().iter().enumerate() {
            let degree = deps.in_degree(id);
            if degree == 0 {
                ready.push(id.as_str());
            }
            remaining.insert(id.as_str(), degree);
            position.insert(id.as_str(), index);
        }

        Self {
            deps,
            remaining,
            position,
            ready,
            scheduled: 0,
        }
    }

    /// Take the next wave, in definition order. `None` once nothing is ready.
    ///
    /// Nodes become ready only through [`complete`](Self::complete), so each
    /// wave must be completed before asking for the next one.
    pub fn next_wave(&mut self) -> Option<Vec<NodeId>> {
        if self.ready.is_empty() {
            return None;
        }
        let mut wave = std::mem::take(&mut self.ready);
        wave.sort_by_key(|id| self.position.get(id).copied().unwrap_or(usize::MAX));
        self.scheduled += wave.len();
        Some(wave.into_iter().map(str::to_string).collect())
    }

    /// Mark nodes complete (finished or skipped), releasing their dependents
    pub fn complete(&mut self, node_ids: &[NodeId]) {
        let deps = self.deps;
        for id in node_ids {
            for dependent in deps.dependents_of(id) {
                if let Some(degree) = self.remaining.get_mut(dependent.as_str()) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        self.ready.push(dependent.as_str());
                    }
                }
            }
        }
    }

    /// Whether every node has been handed out
    pub fn is_finished(&self) -> bool {
        self.scheduled == self.deps.nodes().len()
    }

    /// Nodes still waiting on a dependency, in definition order
    pub fn unscheduled(&self) -> Vec<NodeId> {
        self.deps
            .nodes()
            .iter()
            .filter(|id| self.remaining.get(id.as_str()).copied().unwrap_or(0) > 0)
            .cloned()
            .collect()
    }

    /// Dry run: every wave in order, or `CycleDetected` naming every node
    /// that could never be scheduled
    pub fn plan(deps: &DependencyGraph) -> Result<Vec<Vec<NodeId>>> {
        let mut scheduler = WaveScheduler::new(deps);
        let mut waves = Vec::new();
        while let Some(wave) = scheduler.next_wave() {
            scheduler.complete(&wave);
            waves.push(wave);
        }

        if scheduler.is_finished() {
            Ok(waves)
        } else {
            Err(EngineError::CycleDetected {
                node_ids: scheduler.unscheduled(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::config::MapScope;

    fn plan(builder: GraphBuilder) -> Result<Vec<Vec<NodeId>>> {
        let graph = builder.build();
        WaveScheduler::plan(&DependencyGraph::build(&graph, MapScope::default()))
    }

    #[test]
    fn test_diamond_waves() {
        let waves = plan(
            GraphBuilder::new("g")
                .llm("d", "{{outputs.b.output}} {{outputs.c.output}}")
                .llm("c", "{{outputs.a.output}}")
                .llm("b", "{{outputs.a.output}}")
                .input("a"),
        )
        .unwrap();

        assert_eq!(waves, vec![vec!["a"], vec!["c", "b"], vec!["d"]]);
    }

    #[test]
    fn test_waves_respect_every_dependency() {
        let graph = GraphBuilder::new("g")
            .input("a")
            .input("b")
            .llm("c", "{{outputs.a.output}}")
            .llm("d", "{{outputs.c.output}} {{outputs.b.output}}")
            .llm("e", "{{outputs.a.output}} {{outputs.d.output}}")
            .build();
        let deps = DependencyGraph::build(&graph, MapScope::default());
        let waves = WaveScheduler::plan(&deps).unwrap();

        let wave_of = |id: &str| waves.iter().position(|w| w.iter().any(|n| n == id)).unwrap();
        for node in deps.nodes() {
            for dependency in deps.dependencies_of(node) {
                assert!(wave_of(dependency) < wave_of(node), "{} before {}", dependency, node);
            }
        }
        assert_eq!(waves.iter().map(Vec::len).sum::<usize>(), 5);
    }

    #[test]
    fn test_cycle_lists_stuck_nodes() {
        let err = plan(
            GraphBuilder::new("g")
                .input("a")
                .llm("x", "{{outputs.y.output}} {{outputs.a.output}}")
                .llm("y", "{{outputs.x.output}}")
                .llm("z", "{{outputs.y.output}}"),
        )
        .unwrap_err();

        match err {
            EngineError::CycleDetected { node_ids } => assert_eq!(node_ids, vec!["x", "y", "z"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = plan(GraphBuilder::new("g").llm("loop", "{{outputs.loop.output}}")).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { .. }));
    }

    #[test]
    fn test_empty_graph_has_no_waves() {
        assert!(plan(GraphBuilder::new("empty")).unwrap().is_empty());
    }

    #[test]
    fn test_incremental_waves() {
        let graph = GraphBuilder::new("g")
            .input("a")
            .llm("b", "{{outputs.a.output}}")
            .build();
        let deps = DependencyGraph::build(&graph, MapScope::default());
        let mut scheduler = WaveScheduler::new(&deps);

        assert_eq!(scheduler.next_wave(), Some(vec!["a".to_string()]));
        // Nothing more until the first wave completes
        assert_eq!(scheduler.next_wave(), None);
        scheduler.complete(&["a".to_string()]);
        assert_eq!(scheduler.next_wave(), Some(vec!["b".to_string()]));
        assert!(scheduler.is_finished());
    }
}
