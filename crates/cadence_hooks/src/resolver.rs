//! Dependency resolution.
//!
//! Turns the registered hooks into a deterministic execution order:
//!
//! 1. **Expand** required hooks breadth-first into an arena of nodes, visiting
//!    each shared handle once. Registered hooks get the first sequence numbers
//!    in registration order; discovered dependencies follow in discovery order.
//! 2. **Collapse** functionally equal hooks of the same kind into the earliest
//!    node, rewiring and deduplicating edges.
//! 3. **Validate timing**: every required hook must be no coarser than its
//!    dependent, and only commands may require commands.
//! 4. **Detect cycles** with an iterative three-colour depth-first search.
//! 5. **Order** with Kahn's algorithm, breaking ties by ascending priority and
//!    then sequence number.

use core::cmp::Reverse;
use core::fmt;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::error::ResolutionError;
use crate::hook::{HookRef, same_kind};

/// Identifier of a hook in a resolved graph; equal to its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(pub(crate) usize);

impl HookId {
    /// Creates a hook ID.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook_{}", self.0)
    }
}

/// Identity of a shared hook handle.
pub(crate) fn hook_key(hook: &HookRef) -> usize {
    Arc::as_ptr(hook).cast::<()>().addr()
}

// ─────────────────────────────────────────────────────────────────────────────
// HookGraph
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct GraphNode {
    hook: HookRef,
    registration: Option<usize>,
    requires: Vec<HookId>,
    merged: Vec<String>,
    canonical: HookId,
}

/// Arena of hook nodes with adjacency lists pointing at required hooks.
///
/// Each resolution step is exposed separately; [`resolve`] runs them in order.
#[derive(Debug, Default)]
pub struct HookGraph {
    nodes: Vec<GraphNode>,
    collapsed: usize,
}

impl HookGraph {
    /// Expands `hooks` and everything they transitively require.
    #[must_use]
    pub fn expand(hooks: &[HookRef]) -> Self {
        let mut graph = Self::default();
        let mut visited: HashMap<usize, HookId> = HashMap::new();
        let mut queue = VecDeque::new();

        for (index, hook) in hooks.iter().enumerate() {
            let (id, fresh) = graph.intern(hook, &mut visited);
            if fresh {
                graph.nodes[id.0].registration = Some(index);
                queue.push_back(id);
            }
        }

        while let Some(id) = queue.pop_front() {
            let required = graph.nodes[id.0].hook.required_hooks().to_vec();
            for dependency in &required {
                let (dependency_id, fresh) = graph.intern(dependency, &mut visited);
                if fresh {
                    queue.push_back(dependency_id);
                }
                graph.nodes[id.0].requires.push(dependency_id);
            }
        }

        graph
    }

    fn intern(&mut self, hook: &HookRef, visited: &mut HashMap<usize, HookId>) -> (HookId, bool) {
        let key = hook_key(hook);
        if let Some(&id) = visited.get(&key) {
            return (id, false);
        }

        let id = HookId(self.nodes.len());
        self.nodes.push(GraphNode {
            hook: Arc::clone(hook),
            registration: None,
            requires: Vec::new(),
            merged: Vec::new(),
            canonical: id,
        });
        visited.insert(key, id);
        (id, true)
    }

    /// Number of nodes, including collapsed ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no hooks were expanded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes merged into an equivalent earlier node.
    #[must_use]
    pub fn collapsed(&self) -> usize {
        self.collapsed
    }

    fn is_canonical(&self, index: usize) -> bool {
        self.nodes[index].canonical.0 == index
    }

    /// Merges every node into the earliest node it is functionally equal to.
    pub fn collapse_equivalent(&mut self) {
        for later in 0..self.nodes.len() {
            let target = (0..later).find(|&earlier| {
                let (a, b) = (&*self.nodes[earlier].hook, &*self.nodes[later].hook);
                self.is_canonical(earlier) && same_kind(a, b) && a.functionally_equals(b)
            });
            let Some(earlier) = target else {
                continue;
            };

            tracing::debug!(
                kept = self.nodes[earlier].hook.name(),
                merged = self.nodes[later].hook.name(),
                "collapsing equivalent hooks"
            );
            let name = self.nodes[later].hook.name().to_string();
            let requires = core::mem::take(&mut self.nodes[later].requires);
            self.nodes[later].canonical = HookId(earlier);
            self.nodes[earlier].merged.push(name);
            self.nodes[earlier].requires.extend(requires);
            self.collapsed += 1;
        }

        let canonical: Vec<HookId> = self.nodes.iter().map(|node| node.canonical).collect();
        for node in &mut self.nodes {
            let mut seen = HashSet::new();
            node.requires = node
                .requires
                .iter()
                .map(|required| canonical[required.0])
                .filter(|required| seen.insert(*required))
                .collect();
        }
    }

    /// Checks every edge against the timing rules.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::InlineRequiresBackground`] or
    /// [`ResolutionError::InvalidDependencyTiming`] for the first offending edge.
    pub fn validate_timing(&self) -> Result<(), ResolutionError> {
        for (index, node) in self.nodes.iter().enumerate() {
            if !self.is_canonical(index) {
                continue;
            }
            let dependent = &node.hook;
            for required in &node.requires {
                let required = &self.nodes[required.0].hook;
                if !dependent.invoke_in_background() && required.invoke_in_background() {
                    return Err(ResolutionError::InlineRequiresBackground {
                        dependent: dependent.name().to_string(),
                        required: required.name().to_string(),
                    });
                }
                let valid = match (dependent.as_command().is_some(), required.as_command().is_some()) {
                    (true, _) => true,
                    (false, true) => false,
                    (false, false) => required.time_step().is_no_coarser_than(&dependent.time_step()),
                };
                if !valid {
                    return Err(ResolutionError::InvalidDependencyTiming {
                        dependent: dependent.name().to_string(),
                        required: required.name().to_string(),
                        dependent_step: dependent.time_step(),
                        required_step: required.time_step(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Rejects cyclic dependencies, including self-edges left by collapsing.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::DependencyCycle`] naming the hooks on the
    /// first cycle found.
    pub fn detect_cycles(&self) -> Result<(), ResolutionError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        let mut marks = vec![Mark::White; self.nodes.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..self.nodes.len() {
            if !self.is_canonical(root) || marks[root] != Mark::White {
                continue;
            }
            marks[root] = Mark::Grey;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let Some(&child) = self.nodes[node].requires.get(frame.1) else {
                    marks[node] = Mark::Black;
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                match marks[child.0] {
                    Mark::White => {
                        marks[child.0] = Mark::Grey;
                        stack.push((child.0, 0));
                    }
                    Mark::Grey => return Err(self.cycle_error(&stack, child.0)),
                    Mark::Black => {}
                }
            }
        }
        Ok(())
    }

    fn cycle_error(&self, stack: &[(usize, usize)], start: usize) -> ResolutionError {
        let from = stack.iter().position(|&(node, _)| node == start).unwrap_or(0);
        let mut cycle: Vec<String> = stack[from..]
            .iter()
            .map(|&(node, _)| self.nodes[node].hook.name().to_string())
            .collect();
        cycle.push(self.nodes[start].hook.name().to_string());
        ResolutionError::DependencyCycle { cycle }
    }

    /// Orders the canonical nodes so every dependency precedes its dependents.
    ///
    /// Call only after [`detect_cycles`](Self::detect_cycles) succeeded; nodes
    /// on a cycle are left out of the order.
    #[must_use]
    pub fn into_schedule(self) -> ResolvedSchedule {
        let count = self.nodes.len();
        let mut remaining = vec![0_usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut ready = BinaryHeap::new();

        for (index, node) in self.nodes.iter().enumerate() {
            if !self.is_canonical(index) {
                continue;
            }
            remaining[index] = node.requires.len();
            for required in &node.requires {
                dependents[required.0].push(index);
            }
            if node.requires.is_empty() {
                ready.push(Reverse((node.hook.invoke_priority(), index)));
            }
        }

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse((_, index))) = ready.pop() {
            order.push(index);
            for &dependent in &dependents[index] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    let priority = self.nodes[dependent].hook.invoke_priority();
                    ready.push(Reverse((priority, dependent)));
                }
            }
        }

        let collapsed = self.collapsed;
        let mut slots: Vec<Option<GraphNode>> = self.nodes.into_iter().map(Some).collect();
        let nodes = order
            .into_iter()
            .filter_map(|index| {
                slots[index].take().map(|node| ResolvedNode {
                    id: HookId(index),
                    hook: node.hook,
                    registration: node.registration,
                    merged: node.merged,
                    requires: node.requires,
                })
            })
            .collect();

        ResolvedSchedule { nodes, collapsed }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ResolvedSchedule
// ─────────────────────────────────────────────────────────────────────────────

/// One hook in a [`ResolvedSchedule`].
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    id: HookId,
    hook: HookRef,
    registration: Option<usize>,
    merged: Vec<String>,
    requires: Vec<HookId>,
}

impl ResolvedNode {
    /// The node's id, equal to its sequence number.
    #[must_use]
    pub fn id(&self) -> HookId {
        self.id
    }

    /// Registration sequence number (discovery order for implicit dependencies).
    #[must_use]
    pub fn sequence(&self) -> usize {
        self.id.0
    }

    /// The hook executed for this node.
    #[must_use]
    pub fn hook(&self) -> &HookRef {
        &self.hook
    }

    /// Shorthand for `hook().name()`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.hook.name()
    }

    /// Index into the registered hook list, or `None` for a hook reached only
    /// as a dependency.
    #[must_use]
    pub fn registration(&self) -> Option<usize> {
        self.registration
    }

    /// Names of the equivalent hooks merged into this one.
    #[must_use]
    pub fn merged(&self) -> &[String] {
        &self.merged
    }

    /// Direct dependencies.
    #[must_use]
    pub fn requires(&self) -> &[HookId] {
        &self.requires
    }
}

/// The execution order produced by [`resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolvedSchedule {
    nodes: Vec<ResolvedNode>,
    collapsed: usize,
}

impl ResolvedSchedule {
    /// Nodes in execution order.
    #[must_use]
    pub fn nodes(&self) -> &[ResolvedNode] {
        &self.nodes
    }

    /// Iterates nodes in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedNode> {
        self.nodes.iter()
    }

    /// Number of hooks executed per fully due tick.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if there is nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of hooks merged away by equivalence.
    #[must_use]
    pub fn collapsed(&self) -> usize {
        self.collapsed
    }

    /// Hook names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(ResolvedNode::name).collect()
    }

    /// Position of the first hook called `name` in the execution order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.name() == name)
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn get(&self, id: HookId) -> Option<&ResolvedNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Resolves `hooks` (in registration order) into an execution order.
///
/// # Errors
///
/// Returns [`ResolutionError::InvalidDependencyTiming`],
/// [`ResolutionError::InlineRequiresBackground`] or
/// [`ResolutionError::DependencyCycle`]; all are configuration errors.
///
/// # Example
///
/// ```
/// use cadence_hooks::prelude::*;
/// use cadence_hooks::resolver::resolve;
///
/// let load = FnHook::builder("load", |_| Ok(())).into_ref();
/// let train = FnHook::builder("train", |_| Ok(())).requires(load.clone()).into_ref();
///
/// let schedule = resolve(&[train]).unwrap();
/// assert_eq!(schedule.names(), vec!["load", "train"]);
/// ```
pub fn resolve(hooks: &[HookRef]) -> Result<ResolvedSchedule, ResolutionError> {
    let mut graph = HookGraph::expand(hooks);
    graph.collapse_equivalent();
    graph.validate_timing()?;
    graph.detect_cycles()?;

    let schedule = graph.into_schedule();
    tracing::debug!(
        hooks = schedule.len(),
        collapsed = schedule.collapsed(),
        "resolved hook graph"
    );
    Ok(schedule)
}
