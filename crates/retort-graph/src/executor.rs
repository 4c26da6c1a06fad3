use thiserror::Error;
use tracing::{debug, info, warn};

use retort_core::error::RetortError;

use crate::graph::{CompiledEdge, Graph};
use crate::node::{NodeOutput, Route};
use crate::state::{State, StateUpdate};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A terminal routing directive was reached.
    Completed,
    /// The step budget ran out before a terminal node, so the run "did not converge".
    BudgetExhausted,
}

/// The final state of a run, with the termination verdict and the number of
/// node executions it took.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: State,
    pub verdict: Verdict,
    pub steps: usize,
}

impl RunOutcome {
    pub fn converged(&self) -> bool {
        self.verdict == Verdict::Completed
    }

    /// Content of the last message; the answer, for a converged run.
    pub fn final_text(&self) -> &str {
        self.state
            .last_message()
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// A run-level failure: an unhandled node error aborted the run. The partial
/// state is preserved for diagnostics, never silently discarded.
#[derive(Debug, Error)]
#[error("run aborted at node '{node}': {error}")]
pub struct RunFailure {
    pub node: String,
    #[source]
    pub error: RetortError,
    pub state: State,
}

impl Graph {
    /// Execute the graph over `initial` until a terminal directive or until
    /// `step_budget` node executions have been spent.
    ///
    /// The budget is the core's only general cycle-termination guarantee
    /// (backward edges from validation gates are otherwise unbounded), so it
    /// is a required argument rather than an option.
    pub async fn run(
        &self,
        initial: State,
        step_budget: usize,
    ) -> Result<RunOutcome, RunFailure> {
        let mut state = initial;
        let mut steps = 0usize;
        let mut current = self.entry.clone();

        loop {
            if steps >= step_budget {
                warn!(step_budget, node = %current, "step budget exhausted, run did not converge");
                return Ok(RunOutcome {
                    state,
                    verdict: Verdict::BudgetExhausted,
                    steps,
                });
            }

            let output = self.run_node(&current, &state, &mut steps).await;
            let output = match output {
                Ok(o) => o,
                Err(error) => {
                    return Err(RunFailure {
                        node: current,
                        error,
                        state,
                    })
                }
            };
            state.merge(output.update, &self.schema);

            match output.route {
                Route::End => {
                    info!(node = %current, steps, "run completed");
                    return Ok(RunOutcome {
                        state,
                        verdict: Verdict::Completed,
                        steps,
                    });
                }
                Route::To(target) => {
                    if !self.contains(&target) {
                        return Err(RunFailure {
                            node: current,
                            error: RetortError::UnknownRoute(target),
                            state,
                        });
                    }
                    debug!(from = %current, to = %target, "delegation handover");
                    current = target;
                }
                Route::Follow => match self.edges.get(&current) {
                    Some(CompiledEdge::Terminal) => {
                        info!(node = %current, steps, "run completed");
                        return Ok(RunOutcome {
                            state,
                            verdict: Verdict::Completed,
                            steps,
                        });
                    }
                    Some(CompiledEdge::Fixed(next)) => {
                        current = next.clone();
                    }
                    Some(CompiledEdge::Conditional { arms, otherwise }) => {
                        let target = arms
                            .iter()
                            .find(|arm| (arm.predicate)(&state))
                            .map(|arm| arm.target.as_str())
                            .unwrap_or(otherwise.as_str());
                        debug!(from = %current, to = %target, "conditional edge resolved");
                        current = target.to_string();
                    }
                    Some(CompiledEdge::FanOut { branches, join }) => {
                        // The branches execute as a unit, so the whole
                        // fan-out must fit in the remaining budget.
                        let branch_steps: usize = branches.iter().map(Vec::len).sum();
                        if steps + branch_steps > step_budget {
                            warn!(
                                step_budget,
                                node = %current,
                                branch_steps,
                                "step budget cannot cover the fan-out, run did not converge"
                            );
                            return Ok(RunOutcome {
                                state,
                                verdict: Verdict::BudgetExhausted,
                                steps,
                            });
                        }
                        let updates =
                            match self.run_fan_out(&current, branches, &state, &mut steps).await {
                                Ok(u) => u,
                                Err((node, error)) => {
                                    return Err(RunFailure { node, error, state })
                                }
                            };
                        // Branch updates merge in declaration order, not
                        // completion order, so downstream nodes never observe
                        // a race in the log.
                        for update in updates {
                            state.merge(update, &self.schema);
                        }
                        current = join.clone();
                    }
                    None => {
                        return Err(RunFailure {
                            error: RetortError::NodeFailed {
                                node: current.clone(),
                                message: "no routing strategy declared and node did not delegate"
                                    .into(),
                            },
                            node: current,
                            state,
                        });
                    }
                },
            }
        }
    }

    async fn run_node(
        &self,
        name: &str,
        state: &State,
        steps: &mut usize,
    ) -> Result<NodeOutput, RetortError> {
        let node = self
            .nodes
            .get(name)
            .ok_or_else(|| RetortError::UnknownRoute(name.to_string()))?;
        *steps += 1;
        info!(node = %name, step = *steps, "executing node");
        node.run(state).await
    }

    /// Run every branch chain concurrently against a snapshot of the
    /// pre-fan-out state. Within one branch, later nodes see the snapshot
    /// plus that branch's own updates only.
    async fn run_fan_out(
        &self,
        from: &str,
        branches: &[Vec<String>],
        snapshot: &State,
        steps: &mut usize,
    ) -> Result<Vec<StateUpdate>, (String, RetortError)> {
        info!(from = %from, branches = branches.len(), "fan-out");
        let futures: Vec<_> = branches
            .iter()
            .map(|chain| self.run_branch(chain, snapshot))
            .collect();
        let results = futures::future::join_all(futures).await;

        let mut merged = Vec::new();
        for result in results {
            let (updates, executed) = result?;
            *steps += executed;
            merged.extend(updates);
        }
        Ok(merged)
    }

    async fn run_branch(
        &self,
        chain: &[String],
        snapshot: &State,
    ) -> Result<(Vec<StateUpdate>, usize), (String, RetortError)> {
        let mut local = snapshot.clone();
        let mut updates = Vec::with_capacity(chain.len());
        for name in chain {
            let node = self
                .nodes
                .get(name)
                .ok_or_else(|| (name.clone(), RetortError::UnknownRoute(name.clone())))?;
            debug!(node = %name, "executing branch node");
            let output = node.run(&local).await.map_err(|e| (name.clone(), e))?;
            if output.route != Route::Follow {
                // Branch chains are precompiled; delegation would race the join.
                return Err((
                    name.clone(),
                    RetortError::NodeFailed {
                        node: name.clone(),
                        message: "delegation is not allowed inside a parallel branch".into(),
                    },
                ));
            }
            local.merge(output.update.clone(), &self.schema);
            updates.push(output.update);
        }
        Ok((updates, chain.len()))
    }
}
