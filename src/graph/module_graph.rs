//! The aggregate graph for one software unit or a set of co-distributed units.
//!
//! A [`ModuleGraph`] owns its [`GraphData`] node storage, the entry/exit boundary
//! registries keyed by cross-module hash, and per-unit accounting. It follows a
//! one-way `unanalyzed -> analyzed` state machine: the graph is populated node by
//! node and edge by edge during its single load phase, [`ModuleGraph::analyze_graph`]
//! runs exactly once, and only then may [`ModuleGraph::summarize`] build the summary
//! message. [`ModuleGraph::reset_analysis`] rewinds the state machine explicitly,
//! e.g. before merging more trace data in.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use strum::IntoEnumIterator;
use tracing::{debug, warn};

use crate::{
    graph::{
        Edge, EdgeType, EdgeTypeTally, GraphData, GraphSummary, GraphUib, MetaNodeType,
        ModuleSummary, Node, NodeId, UibSummary, UnreachableNodeSummary,
    },
    registry::{ModuleId, ModuleRegistry},
    Result,
};

/// Content hashes of the system-call anchor singletons that seed reachability
/// analysis alongside the registered entry points, when each is present as
/// exactly one node.
pub const SYSCALL_ANCHOR_HASHES: [u64; 2] = [1, 3];

/// Default cap on the number of candidate missed entry points reported per
/// analysis.
pub const DEFAULT_MAX_REPORTED_MISSED_ENTRIES: usize = 20;

/// Node accounting for one member unit of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleAccounting {
    /// The accounted unit.
    pub module: ModuleId,
    /// All nodes attributed to the unit.
    pub node_count: usize,
    /// Executable basic blocks attributed to the unit.
    pub executable_block_count: usize,
}

/// Results of one analysis pass.
#[derive(Debug, Clone)]
struct GraphAnalysis {
    /// Whether reachability was analyzed (vs. the cheaper edge study).
    reachability: bool,
    /// Per-edge-type tallies, `[kind][0]` intra and `[kind][1]` inter.
    tallies: [[usize; 2]; 8],
    /// Nodes reached from the seeds; equals all nodes for an edge study.
    reachable_count: usize,
    /// Nodes not reached from any seed.
    unreachable: Vec<NodeId>,
}

/// Aggregate control-flow graph for one software unit or unit set.
///
/// # Examples
///
/// ```rust
/// use tracegraph::graph::{
///     BoundarySide, Edge, EdgeType, MetaNodeType, ModuleGraph, Node, NodeKey,
/// };
/// use tracegraph::registry::{ModuleId, ModuleRegistry};
///
/// let mut registry = ModuleRegistry::new();
/// registry.register_unit("app.exe");
///
/// let mut graph = ModuleGraph::new("app.exe");
/// let entry = graph.add_node(Node::new(
///     NodeKey::Boundary { hash: 0xAA, side: BoundarySide::Entry },
///     0xAA,
///     MetaNodeType::ModuleEntry,
/// ))?;
/// let block = graph.add_node(Node::new(
///     NodeKey::BasicBlock { module: ModuleId(0), relative_tag: 0x100, instance_id: 0 },
///     0xBB,
///     MetaNodeType::Normal,
/// ))?;
/// graph.add_edge(Edge::new(entry, block, EdgeType::Direct, 0))?;
///
/// graph.analyze_graph(true)?;
/// let summary = graph.summarize(&registry, false)?;
/// assert_eq!(summary.unreachable_count, 0);
/// # Ok::<(), tracegraph::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    name: String,
    data: GraphData,
    entry_points: HashMap<u64, NodeId>,
    exit_points: HashMap<u64, NodeId>,
    accounting: BTreeMap<ModuleId, ModuleAccounting>,
    uibs: Vec<GraphUib>,
    analysis: Option<GraphAnalysis>,
    max_reported_missed_entries: usize,
}

impl ModuleGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(name: &str) -> Self {
        ModuleGraph {
            name: name.to_string(),
            data: GraphData::new(),
            entry_points: HashMap::new(),
            exit_points: HashMap::new(),
            accounting: BTreeMap::new(),
            uibs: Vec::new(),
            analysis: None,
            max_reported_missed_entries: DEFAULT_MAX_REPORTED_MISSED_ENTRIES,
        }
    }

    /// Returns the graph's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the node storage.
    #[must_use]
    pub fn data(&self) -> &GraphData {
        &self.data
    }

    /// Returns mutable node storage. Reserved for the partitioner's edge rewrites.
    pub(crate) fn data_mut(&mut self) -> &mut GraphData {
        &mut self.data
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.data.len()
    }

    /// Returns the total number of edges (each counted once, at its source).
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.data
            .nodes()
            .map(|node| node.edges().outgoing_edges().len())
            .sum()
    }

    /// Returns the node for `id`, if it exists.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.data.node(id)
    }

    /// Adds a node, registering boundary nodes in the entry/exit registries and
    /// updating per-unit accounting.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidGraph`] on a duplicate node key.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        let hash = node.hash();
        let meta_type = node.meta_type();
        let module = node.module();

        let id = self.data.add(node)?;

        match meta_type {
            MetaNodeType::ModuleEntry => {
                self.entry_points.insert(hash, id);
            }
            MetaNodeType::ModuleExit => {
                self.exit_points.insert(hash, id);
            }
            _ => {}
        }

        if let Some(module) = module {
            let entry = self.accounting.entry(module).or_insert(ModuleAccounting {
                module,
                node_count: 0,
                executable_block_count: 0,
            });
            entry.node_count += 1;
            if meta_type.is_executable() {
                entry.executable_block_count += 1;
            }
        }

        Ok(id)
    }

    /// Inserts an edge, updating both endpoints' adjacency.
    ///
    /// Semantics are those of [`GraphData::add_edge`]: duplicates coalesce,
    /// conflicts are fatal.
    ///
    /// # Errors
    ///
    /// See [`GraphData::add_edge`].
    pub fn add_edge(&mut self, edge: Edge) -> Result<bool> {
        self.data.add_edge(edge)
    }

    /// Returns the entry boundary node registered under `hash`, if any.
    #[must_use]
    pub fn entry_point(&self, hash: u64) -> Option<NodeId> {
        self.entry_points.get(&hash).copied()
    }

    /// Returns the exit boundary node registered under `hash`, if any.
    #[must_use]
    pub fn exit_point(&self, hash: u64) -> Option<NodeId> {
        self.exit_points.get(&hash).copied()
    }

    /// Iterates all registered entry points as (hash, node) pairs.
    pub fn entry_points(&self) -> impl Iterator<Item = (u64, NodeId)> + '_ {
        self.entry_points.iter().map(|(hash, id)| (*hash, *id))
    }

    /// Iterates all registered exit points as (hash, node) pairs.
    pub fn exit_points(&self) -> impl Iterator<Item = (u64, NodeId)> + '_ {
        self.exit_points.iter().map(|(hash, id)| (*hash, *id))
    }

    /// Iterates the per-unit accounting entries.
    pub fn accounting(&self) -> impl Iterator<Item = &ModuleAccounting> {
        self.accounting.values()
    }

    /// Attaches a resolved UIB observation to this graph.
    pub fn attach_uib(&mut self, uib: GraphUib) {
        self.uibs.push(uib);
    }

    /// Returns the attached UIB observations.
    #[must_use]
    pub fn uibs(&self) -> &[GraphUib] {
        &self.uibs
    }

    /// Returns `true` if the edge connects nodes of two different member units.
    ///
    /// Boundary nodes belong to no unit, so edges touching them classify as
    /// intra-module.
    #[must_use]
    pub fn is_cross_module_edge(&self, edge: &Edge) -> bool {
        let from = self.data.node(edge.from()).and_then(Node::module);
        let to = self.data.node(edge.to()).and_then(Node::module);
        matches!((from, to), (Some(a), Some(b)) if a != b)
    }

    /// Returns `true` once [`ModuleGraph::analyze_graph`] has completed on the
    /// current graph contents.
    #[must_use]
    pub fn is_analyzed(&self) -> bool {
        self.analysis.is_some()
    }

    /// Rewinds the analysis state machine, e.g. before merging more data in.
    pub fn reset_analysis(&mut self) {
        self.analysis = None;
    }

    /// Analyzes the graph.
    ///
    /// With `analyze_reachability` false, a single pass tallies outgoing-edge type
    /// counts per node (the "edge study") - the cheaper option when full
    /// connectivity is not needed. With true, a breadth-first traversal seeded from
    /// every registered entry point plus the system-call anchor singletons (hashes
    /// 1 and 3, when each is present as exactly one node) visits every reachable
    /// node, classifies each traversed edge as inter- or intra-module, and
    /// accumulates the complement as the unreachable set. A second diagnostic pass
    /// then flags unreachable nodes with no incoming edge from another unreachable
    /// node - candidate missed entry points - capped at
    /// [`ModuleGraph::set_max_reported_missed_entries`].
    ///
    /// Edges out of entry boundary nodes model arrival from outside the graph and
    /// are not tallied.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidGraph`] if the graph is already analyzed;
    /// call [`ModuleGraph::reset_analysis`] first.
    pub fn analyze_graph(&mut self, analyze_reachability: bool) -> Result<()> {
        if self.analysis.is_some() {
            return Err(invalid_graph!(
                "Graph {} is already analyzed - call reset_analysis before re-analyzing",
                self.name
            ));
        }

        let analysis = if analyze_reachability {
            self.analyze_reachability()
        } else {
            self.edge_study()
        };

        debug!(
            graph = %self.name,
            reachable = analysis.reachable_count,
            unreachable = analysis.unreachable.len(),
            "analysis complete"
        );
        self.analysis = Some(analysis);
        Ok(())
    }

    /// Sets the cap on reported candidate missed entry points.
    pub fn set_max_reported_missed_entries(&mut self, max: usize) {
        self.max_reported_missed_entries = max;
    }

    fn tally_edge(&self, tallies: &mut [[usize; 2]; 8], edge: &Edge) {
        let scope = usize::from(self.is_cross_module_edge(edge));
        tallies[edge.kind() as usize][scope] += 1;
    }

    fn edge_study(&self) -> GraphAnalysis {
        let mut tallies = [[0usize; 2]; 8];
        for node in self.data.nodes() {
            if node.is_module_entry() {
                continue;
            }
            for edge in &node.edges().outgoing_edges() {
                self.tally_edge(&mut tallies, edge);
            }
        }

        GraphAnalysis {
            reachability: false,
            tallies,
            reachable_count: self.data.len(),
            unreachable: Vec::new(),
        }
    }

    fn analyze_reachability(&self) -> GraphAnalysis {
        let mut tallies = [[0usize; 2]; 8];
        let mut visited = vec![false; self.data.len()];
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        for id in self.entry_points.values().copied() {
            if !visited[id.index()] {
                visited[id.index()] = true;
                queue.push_back(id);
            }
        }
        for hash in SYSCALL_ANCHOR_HASHES {
            if let Some(id) = self.data.single_node_by_hash(hash) {
                if !visited[id.index()] {
                    visited[id.index()] = true;
                    queue.push_back(id);
                }
            }
        }

        while let Some(id) = queue.pop_front() {
            let node = match self.data.node(id) {
                Some(node) => node,
                None => continue,
            };
            let tallied = !node.is_module_entry();
            for edge in &node.edges().outgoing_edges() {
                if tallied {
                    self.tally_edge(&mut tallies, edge);
                }
                let target = edge.to();
                if !visited[target.index()] {
                    visited[target.index()] = true;
                    queue.push_back(target);
                }
            }
        }

        let unreachable: Vec<NodeId> = self
            .data
            .node_ids()
            .filter(|id| !visited[id.index()])
            .collect();
        let reachable_count = self.data.len() - unreachable.len();

        if !unreachable.is_empty() {
            self.report_missed_entries(&unreachable);
        }

        GraphAnalysis {
            reachability: true,
            tallies,
            reachable_count,
            unreachable,
        }
    }

    /// Flags unreachable nodes that no other unreachable node links to; these are
    /// the candidates for entry points the trace failed to register.
    fn report_missed_entries(&self, unreachable: &[NodeId]) {
        if self.max_reported_missed_entries == 0 {
            return;
        }

        let unreachable_set: HashSet<NodeId> = unreachable.iter().copied().collect();
        let mut reported = 0usize;
        for id in unreachable {
            let node = match self.data.node(*id) {
                Some(node) => node,
                None => continue,
            };
            let fed_from_unreachable = node
                .edges()
                .incoming_edges()
                .iter()
                .any(|edge| unreachable_set.contains(&edge.from()));
            if !fed_from_unreachable {
                warn!(
                    graph = %self.name,
                    node = ?node.key(),
                    hash = format_args!("{:#x}", node.hash()),
                    "candidate missed entry point"
                );
                reported += 1;
                if reported >= self.max_reported_missed_entries {
                    warn!(
                        graph = %self.name,
                        cap = self.max_reported_missed_entries,
                        "missed entry point report capped"
                    );
                    break;
                }
            }
        }
    }

    /// Builds the summary message for this graph.
    ///
    /// Member modules are sorted by executable-block count descending. With
    /// `report_unreachable` true, the summary carries detail for every unreachable
    /// node including its first surviving incoming edge from outside the
    /// unreachable set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnanalyzedGraph`] if [`ModuleGraph::analyze_graph`]
    /// has not completed on the current contents.
    pub fn summarize(
        &self,
        registry: &ModuleRegistry,
        report_unreachable: bool,
    ) -> Result<GraphSummary> {
        let analysis = self.analysis.as_ref().ok_or(crate::Error::UnanalyzedGraph)?;

        let edge_tallies: Vec<EdgeTypeTally> = EdgeType::iter()
            .map(|kind| EdgeTypeTally {
                kind,
                intra: analysis.tallies[kind as usize][0],
                inter: analysis.tallies[kind as usize][1],
            })
            .collect();

        let mut modules: Vec<ModuleSummary> = self
            .accounting
            .values()
            .map(|accounting| ModuleSummary {
                name: registry.unit_name(accounting.module).to_string(),
                node_count: accounting.node_count,
                executable_block_count: accounting.executable_block_count,
            })
            .collect();
        modules.sort_by(|a, b| b.executable_block_count.cmp(&a.executable_block_count));

        let unreachable = if report_unreachable && analysis.reachability {
            let unreachable_set: HashSet<NodeId> = analysis.unreachable.iter().copied().collect();
            analysis
                .unreachable
                .iter()
                .filter_map(|id| self.data.node(*id))
                .map(|node| UnreachableNodeSummary {
                    key: *node.key(),
                    hash: node.hash(),
                    surviving_incoming: node
                        .edges()
                        .incoming_edges()
                        .iter()
                        .find(|edge| !unreachable_set.contains(&edge.from()))
                        .and_then(|edge| {
                            self.data
                                .node(edge.from())
                                .map(|source| (*source.key(), edge.kind()))
                        }),
                })
                .collect()
        } else {
            Vec::new()
        };

        let mut uib = UibSummary::default();
        for record in &self.uibs {
            uib.record(record.admitted, record.cross_module);
        }

        Ok(GraphSummary {
            name: self.name.clone(),
            node_count: self.data.len(),
            reachable_count: analysis.reachable_count,
            unreachable_count: analysis.unreachable.len(),
            edge_tallies,
            modules,
            unreachable,
            uib,
        })
    }

    /// Breadth-first traversal from `seeds`, returning visited nodes in visit order.
    ///
    /// Shared by the partitioner's diagnostics and external traversal needs.
    #[must_use]
    pub fn bfs_from(&self, seeds: &[NodeId]) -> Vec<NodeId> {
        let mut visited = vec![false; self.data.len()];
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let mut order = Vec::new();

        for id in seeds {
            if id.index() < visited.len() && !visited[id.index()] {
                visited[id.index()] = true;
                queue.push_back(*id);
            }
        }

        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(node) = self.data.node(id) {
                for edge in &node.edges().outgoing_edges() {
                    let target = edge.to();
                    if !visited[target.index()] {
                        visited[target.index()] = true;
                        queue.push_back(target);
                    }
                }
            }
        }

        order
    }
}
