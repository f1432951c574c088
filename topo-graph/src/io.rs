use crate::common_io::{open_buf_reader, open_buf_writer};
use crate::graph::TopoGraph;

use log::info;
use serde::{Deserialize, Serialize};

/// One node record in the serialized graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNodeRecord {
    pub name: Box<str>,
    /// member sample positions into the `samples` roster
    pub samples: Vec<usize>,
}

/// On-disk graph format (`.json` or `.json.gz`).
///
/// The file captures exactly what the scoring pipeline consumes: the
/// sample roster, the node roster with sample membership, and the
/// weighted edge list. Embedding coordinates stay with whatever tool
/// produced the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFile {
    pub samples: Vec<Box<str>>,
    pub nodes: Vec<GraphNodeRecord>,
    /// `(i, j, distance)` triplets over node positions
    pub edges: Vec<(usize, usize, f32)>,
}

impl From<&TopoGraph> for GraphFile {
    fn from(graph: &TopoGraph) -> Self {
        GraphFile {
            samples: graph.sample_names.clone(),
            nodes: graph
                .node_names
                .iter()
                .zip(graph.node_members.iter())
                .map(|(name, members)| GraphNodeRecord {
                    name: name.clone(),
                    samples: members.clone(),
                })
                .collect(),
            edges: graph
                .edges
                .iter()
                .zip(graph.distances.iter())
                .map(|(&(i, j), &d)| (i, j, d))
                .collect(),
        }
    }
}

/// Load a serialized graph, validating all index references
pub fn read_graph(graph_file: &str) -> anyhow::Result<TopoGraph> {
    let buf = open_buf_reader(graph_file)?;
    let parsed: GraphFile = serde_json::from_reader(buf)?;

    info!(
        "read graph file {}: {} nodes over {} samples",
        graph_file,
        parsed.nodes.len(),
        parsed.samples.len()
    );

    let (node_names, node_members): (Vec<_>, Vec<_>) = parsed
        .nodes
        .into_iter()
        .map(|rec| (rec.name, rec.samples))
        .unzip();

    TopoGraph::from_edges(node_names, node_members, parsed.samples, parsed.edges)
}

/// Write a graph back out in the same JSON format
pub fn write_graph(graph: &TopoGraph, graph_file: &str) -> anyhow::Result<()> {
    let file = GraphFile::from(graph);
    let mut buf = open_buf_writer(graph_file)?;
    serde_json::to_writer(&mut buf, &file)?;
    use std::io::Write;
    buf.flush()?;
    Ok(())
}
