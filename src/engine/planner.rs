//! Execution planning for workflow steps.
//!
//! `plan` computes the ordered sequence of execution groups: steps sharing
//! a `parallel_group` label run concurrently in one group, every other
//! step gets a group of its own, and a group is scheduled only after every
//! dependency of every member has been scheduled in an earlier group.
//!
//! `validate` checks the step graph up front so a broken template fails
//! the run before any step executes, instead of leaning on the planner's
//! bounded-scan safety valve.

use std::collections::{HashMap, HashSet};

use crate::errors::TemplateError;
use crate::models::WorkflowStep;

/// Group steps into an ordered list of parallel groups.
///
/// The scan is bounded to `group_count + 1` passes. Groups still
/// unsatisfied after the bound (a cycle, or a dependency on a step id that
/// exists nowhere) are appended in remaining encounter order anyway: the
/// planner guarantees forward progress, never ordering, for an
/// unsatisfiable tail. Callers are expected to reject such graphs via
/// `validate` before running them.
pub fn plan(steps: &[WorkflowStep]) -> Vec<Vec<WorkflowStep>> {
    let mut group_order: Vec<String> = Vec::new();
    let mut group_members: HashMap<String, Vec<WorkflowStep>> = HashMap::new();
    let mut synthetic_idx = 0usize;

    for step in steps {
        let key = match &step.parallel_group {
            Some(group) => group.clone(),
            None => {
                let key = format!("__solo_{synthetic_idx}");
                synthetic_idx += 1;
                key
            }
        };
        if !group_members.contains_key(&key) {
            group_order.push(key.clone());
        }
        group_members.entry(key).or_default().push(step.clone());
    }

    let mut groups: Vec<Vec<WorkflowStep>> = Vec::new();
    let mut executed: HashSet<String> = HashSet::new();
    let mut remaining: Vec<String> = group_order;
    let max_passes = remaining.len() + 1;

    for _ in 0..max_passes {
        if remaining.is_empty() {
            break;
        }
        let mut still_remaining = Vec::new();
        for key in remaining {
            let members = &group_members[&key];
            let ready = members
                .iter()
                .all(|step| step.depends_on.iter().all(|dep| executed.contains(dep)));
            if ready {
                for member in members {
                    executed.insert(member.id.clone());
                }
                groups.push(members.clone());
            } else {
                still_remaining.push(key);
            }
        }
        remaining = still_remaining;
    }

    // Unsatisfiable tail: emit in remaining encounter order rather than
    // livelock.
    for key in remaining {
        groups.push(group_members[&key].clone());
    }

    groups
}

/// Validate a template's step graph: unique ids, dependencies that exist,
/// and no cycles. Cycle membership is reported in declaration order so the
/// error is stable for a given template.
pub fn validate(steps: &[WorkflowStep]) -> Result<(), TemplateError> {
    let mut ids: HashSet<&str> = HashSet::new();
    for step in steps {
        if !ids.insert(step.id.as_str()) {
            return Err(TemplateError::DuplicateStepId {
                id: step.id.clone(),
            });
        }
    }

    for step in steps {
        for dep in &step.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(TemplateError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Kahn's algorithm; whatever never reaches in-degree zero is cyclic.
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    let mut in_degree: Vec<usize> = steps.iter().map(|s| s.depends_on.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            dependents[index[dep.as_str()]].push(i);
        }
    }

    let mut queue: Vec<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(i, _)| i)
        .collect();
    let mut processed = 0;

    while let Some(node) = queue.pop() {
        processed += 1;
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push(dependent);
            }
        }
    }

    if processed != steps.len() {
        let cycle_steps: Vec<String> = steps
            .iter()
            .enumerate()
            .filter(|&(i, _)| in_degree[i] > 0)
            .map(|(_, s)| s.id.clone())
            .collect();
        return Err(TemplateError::DependencyCycle { steps: cycle_steps });
    }

    Ok(())
}
