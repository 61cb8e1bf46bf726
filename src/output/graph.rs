//! The module responsible for writing energy system graphs to file.
use crate::graph::SystemGraph;
use anyhow::Result;
use petgraph::dot::Dot;
use std::fs::File;
use std::io::Write as IoWrite;
use std::path::Path;

/// The file name for the graph of the whole energy system
const SYSTEM_GRAPH_FILE_NAME: &str = "energy_system.dot";

/// Save the energy system graph as a DOT file in the specified output folder
pub fn save_system_graph(graph: &SystemGraph, output_path: &Path) -> Result<()> {
    let dot = Dot::new(graph);
    let mut file = File::create(output_path.join(SYSTEM_GRAPH_FILE_NAME))?;
    write!(file, "{dot}")?;

    Ok(())
}
