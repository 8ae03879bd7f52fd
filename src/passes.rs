//! Explicit per-tick pass list with barrier placement.
//!
//! Every pass declares the resources it reads and writes. A barrier goes in front of
//! a pass that touches anything written since the previous barrier.

use anyhow::Result;
use log::trace;
use std::sync::atomic::{fence, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Agents,
    Grid,
    Trail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    GridReset,
    GridBuild,
    AgentUpdate,
    TrailDiffuse,
}

#[derive(Debug, Clone)]
pub struct PassDesc {
    pub id: PassId,
    pub reads: &'static [Resource],
    pub writes: &'static [Resource],
}

impl PassDesc {
    pub fn describe(id: PassId) -> Self {
        use Resource::*;
        let (reads, writes): (&'static [Resource], &'static [Resource]) = match id {
            PassId::GridReset => (&[], &[Grid]),
            PassId::GridBuild => (&[Agents], &[Grid]),
            // Reads the previous agent buffer, writes the next one plus deposits.
            PassId::AgentUpdate => (&[Agents, Grid, Trail], &[Agents, Trail]),
            PassId::TrailDiffuse => (&[Trail], &[Trail]),
        };
        PassDesc { id, reads, writes }
    }

    fn touches(&self, resource: Resource) -> bool {
        self.reads.contains(&resource) || self.writes.contains(&resource)
    }
}

#[derive(Debug, Clone)]
pub struct PassGraph {
    passes: Vec<PassDesc>,
    /// `barriers[i]` is true when a barrier precedes `passes[i]`.
    barriers: Vec<bool>,
}

impl PassGraph {
    pub fn new(ids: &[PassId]) -> Self {
        let passes: Vec<PassDesc> = ids.iter().copied().map(PassDesc::describe).collect();
        let mut barriers = Vec::with_capacity(passes.len());
        let mut dirty: Vec<Resource> = Vec::new();
        for pass in &passes {
            let hazard = dirty.iter().any(|&r| pass.touches(r));
            if hazard {
                dirty.clear();
            }
            barriers.push(hazard);
            for &w in pass.writes {
                if !dirty.contains(&w) {
                    dirty.push(w);
                }
            }
        }
        PassGraph { passes, barriers }
    }

    /// The standard tick; grid passes are left out when no behavior needs neighbors.
    pub fn for_tick(needs_grid: bool) -> Self {
        if needs_grid {
            Self::new(&[PassId::GridReset, PassId::GridBuild, PassId::AgentUpdate, PassId::TrailDiffuse])
        } else {
            Self::new(&[PassId::AgentUpdate, PassId::TrailDiffuse])
        }
    }

    pub fn passes(&self) -> impl Iterator<Item = PassId> + '_ {
        self.passes.iter().map(|p| p.id)
    }

    pub fn barrier_before(&self, index: usize) -> bool {
        self.barriers.get(index).copied().unwrap_or(false)
    }

    pub fn barrier_count(&self) -> usize {
        self.barriers.iter().filter(|&&b| b).count()
    }

    /// Runs every pass in order. Each pass is expected to block until all of its
    /// work has finished; the fence orders its writes before the next pass's reads.
    pub fn execute<F>(&self, mut run: F) -> Result<()>
    where
        F: FnMut(PassId) -> Result<()>,
    {
        for (pass, &barrier) in self.passes.iter().zip(&self.barriers) {
            if barrier {
                trace!("Barrier before {:?}", pass.id);
                fence(Ordering::SeqCst);
            }
            trace!("Running pass {:?}", pass.id);
            run(pass.id)?;
        }
        fence(Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_tick_has_a_barrier_between_every_dependent_pass() {
        let graph = PassGraph::for_tick(true);
        let order: Vec<PassId> = graph.passes().collect();
        assert_eq!(
            order,
            vec![PassId::GridReset, PassId::GridBuild, PassId::AgentUpdate, PassId::TrailDiffuse]
        );
        assert!(!graph.barrier_before(0));
        assert!(graph.barrier_before(1));
        assert!(graph.barrier_before(2));
        assert!(graph.barrier_before(3));
        assert_eq!(graph.barrier_count(), 3);
    }

    #[test]
    fn grid_passes_are_skipped_when_unused() {
        let graph = PassGraph::for_tick(false);
        assert_eq!(graph.passes().collect::<Vec<_>>(), vec![PassId::AgentUpdate, PassId::TrailDiffuse]);
        assert_eq!(graph.barrier_count(), 1);
    }

    #[test]
    fn independent_passes_share_a_phase() {
        // Two writers of disjoint resources need no barrier between them.
        let graph = PassGraph::new(&[PassId::GridReset, PassId::TrailDiffuse]);
        assert_eq!(graph.barrier_count(), 0);
    }

    #[test]
    fn execute_runs_in_order_and_stops_on_error() {
        let graph = PassGraph::for_tick(true);
        let mut seen = Vec::new();
        graph
            .execute(|id| {
                seen.push(id);
                Ok(())
            })
            .expect("execute");
        assert_eq!(seen.len(), 4);

        let mut count = 0;
        let result = graph.execute(|id| {
            count += 1;
            if id == PassId::GridBuild {
                anyhow::bail!("boom");
            }
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(count, 2);
    }
}
