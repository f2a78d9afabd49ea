//! DOT format utilities for graph visualization.
//!
//! This module provides utilities for generating DOT format output,
//! which can be rendered using Graphviz tools.

use std::fmt::Write;

use crate::{
    graph::{MetaNodeType, ModuleGraph, NodeId},
    registry::ModuleRegistry,
};

/// Escapes a string for safe use in DOT format labels and identifiers.
///
/// This function handles all characters that have special meaning in DOT format,
/// including quotes, backslashes, newlines, and angle brackets.
#[must_use]
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
        .replace('<', "\\<")
        .replace('>', "\\>")
}

/// Renders a module graph in DOT format.
///
/// Entry boundary nodes are highlighted in green, exit boundary nodes in red.
/// Edge labels carry the transfer kind and ordinal slot.
///
/// # Examples
///
/// ```rust,ignore
/// use tracegraph::utils::graph_to_dot;
///
/// let dot = graph_to_dot(&graph, &registry);
/// std::fs::write("graph.dot", dot)?;
/// ```
#[must_use]
pub fn graph_to_dot(graph: &ModuleGraph, registry: &ModuleRegistry) -> String {
    let mut dot = String::new();

    dot.push_str("digraph ModuleGraph {\n");
    let _ = writeln!(dot, "    label=\"{}\";", escape_dot(graph.name()));
    dot.push_str("    labelloc=t;\n");
    dot.push_str("    node [shape=box, fontname=\"Courier\", fontsize=10];\n");
    dot.push_str("    edge [fontname=\"Courier\", fontsize=9];\n\n");

    for id in graph.data().node_ids() {
        let Some(node) = graph.node(id) else { continue };

        let name = node_name(id);
        let label = match node.meta_type() {
            MetaNodeType::ModuleEntry => format!("entry {:#x}", node.hash()),
            MetaNodeType::ModuleExit => format!("exit {:#x}", node.hash()),
            meta => {
                let module = node
                    .module()
                    .map_or("?", |module| registry.unit_name(module));
                format!(
                    "{}!{:#x} {} {:#x}",
                    escape_dot(module),
                    node.relative_tag().unwrap_or(0),
                    meta,
                    node.hash()
                )
            }
        };

        let style = match node.meta_type() {
            MetaNodeType::ModuleEntry => ", style=filled, fillcolor=lightgreen",
            MetaNodeType::ModuleExit => ", style=filled, fillcolor=lightcoral",
            _ => "",
        };

        let _ = writeln!(dot, "    {name} [label=\"{label}\"{style}];");
    }

    dot.push('\n');

    for id in graph.data().node_ids() {
        let Some(node) = graph.node(id) else { continue };
        let source = node_name(id);
        for edge in &node.edges().outgoing_edges() {
            let target = node_name(edge.to());
            let _ = writeln!(
                dot,
                "    {source} -> {target} [label=\"{}:{}\"];",
                edge.kind(),
                edge.ordinal()
            );
        }
    }

    dot.push_str("}\n");
    dot
}

fn node_name(id: NodeId) -> String {
    format!("N{}", id.index())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{BoundarySide, Edge, EdgeType, Node, NodeKey},
        registry::ModuleId,
    };

    #[test]
    fn test_escape_dot_basic() {
        assert_eq!(escape_dot("hello"), "hello");
    }

    #[test]
    fn test_escape_dot_quotes() {
        assert_eq!(escape_dot("say \"hello\""), "say \\\"hello\\\"");
    }

    #[test]
    fn test_escape_dot_backslash() {
        assert_eq!(escape_dot("path\\to\\file"), "path\\\\to\\\\file");
    }

    #[test]
    fn test_escape_dot_angle_brackets() {
        assert_eq!(escape_dot("List<T>"), "List\\<T\\>");
    }

    #[test]
    fn test_graph_to_dot_structure() {
        let mut registry = ModuleRegistry::new();
        registry.register_unit("app.exe");

        let mut graph = ModuleGraph::new("app.exe");
        let entry = graph
            .add_node(Node::new(
                NodeKey::Boundary {
                    hash: 0xAA,
                    side: BoundarySide::Entry,
                },
                0xAA,
                MetaNodeType::ModuleEntry,
            ))
            .unwrap();
        let block = graph
            .add_node(Node::new(
                NodeKey::BasicBlock {
                    module: ModuleId(0),
                    relative_tag: 0x100,
                    instance_id: 0,
                },
                0xBB,
                MetaNodeType::Normal,
            ))
            .unwrap();
        graph
            .add_edge(Edge::new(entry, block, EdgeType::Direct, 0))
            .unwrap();

        let dot = graph_to_dot(&graph, &registry);
        assert!(dot.starts_with("digraph ModuleGraph {"));
        assert!(dot.contains("lightgreen"));
        assert!(dot.contains("N0 -> N1"));
        assert!(dot.contains("Direct:0"));
        assert!(dot.ends_with("}\n"));
    }
}
