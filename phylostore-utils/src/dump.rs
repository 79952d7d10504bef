use phylostore::{Archive, ReadOnlyStore};
use std::{collections::BTreeMap, io::Write};

type Node<'a> = &'a NodeDescriptor;
type Edge<'a> = (u32, u32);

struct ArchiveGraph {
    nodes: BTreeMap<u32, NodeDescriptor>,
    edges: Vec<(u32, u32)>,
}

enum NodeDescriptor {
    Internal { id: u32, name: String, leaves: u64 },
    Leaf { id: u32, name: String, row: Option<u64> },
}

impl NodeDescriptor {
    fn id(&self) -> u32 {
        match self {
            NodeDescriptor::Internal { id, .. } | NodeDescriptor::Leaf { id, .. } => *id,
        }
    }
}

impl<'a> dot::Labeller<'a, Node<'a>, Edge<'a>> for ArchiveGraph {
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot::Id::new("archive").unwrap()
    }

    fn node_id(&'a self, n: &Node<'a>) -> dot::Id<'a> {
        dot::Id::new(format!("N{}", n.id())).unwrap()
    }

    fn node_label(&'a self, n: &Node<'a>) -> dot::LabelText<'a> {
        let text = match n {
            // digests are long, the first few characters tell containers apart
            NodeDescriptor::Internal { name, leaves, .. } => {
                format!("{} ({})", &name[..name.len().min(8)], leaves)
            }
            NodeDescriptor::Leaf {
                name,
                row: Some(row),
                ..
            } => format!("{} #{}", name, row),
            NodeDescriptor::Leaf { name, row: None, .. } => name.clone(),
        };
        dot::LabelText::label(text)
    }

    fn node_shape(&'a self, n: &Node<'a>) -> Option<dot::LabelText<'a>> {
        let shape = match n {
            NodeDescriptor::Internal { .. } => "box",
            NodeDescriptor::Leaf { .. } => "ellipse",
        };
        Some(dot::LabelText::label(shape))
    }

    fn node_color(&'a self, n: &Node<'a>) -> Option<dot::LabelText<'a>> {
        match n {
            NodeDescriptor::Leaf { row: None, .. } => Some(dot::LabelText::label("grey")),
            _ => None,
        }
    }

    fn node_style(&'a self, n: &Node<'a>) -> dot::Style {
        match n {
            NodeDescriptor::Leaf { row: None, .. } => dot::Style::Filled,
            _ => dot::Style::None,
        }
    }
}

impl<'a> dot::GraphWalk<'a, Node<'a>, Edge<'a>> for ArchiveGraph {
    fn nodes(&'a self) -> dot::Nodes<'a, Node<'a>> {
        self.nodes.values().collect()
    }

    fn edges(&'a self) -> dot::Edges<'a, Edge<'a>> {
        self.edges.iter().cloned().collect()
    }

    fn source(&'a self, edge: &Edge<'a>) -> Node<'a> {
        &self.nodes[&edge.0]
    }

    fn target(&'a self, edge: &Edge<'a>) -> Node<'a> {
        &self.nodes[&edge.1]
    }
}

/// Writes the stored container hierarchy as graphviz dot. Internal containers are boxes
/// labelled with the start of their digest and the number of leaves below them.
pub fn graph<S: ReadOnlyStore>(archive: &Archive<S>, mut out: impl Write) -> anyhow::Result<()> {
    let mut nodes = BTreeMap::new();
    let mut edges = Vec::new();
    // postorder, so leaf counts of the children are known
    let mut order = Vec::new();
    let mut stack = vec![archive.root()];
    while let Some(link) = stack.pop() {
        order.push(link);
        stack.extend(archive.node(link)?.children());
    }
    let mut counts = BTreeMap::new();
    for link in order.into_iter().rev() {
        let node = archive.node(link)?;
        let id = link.index();
        let descriptor = if node.is_leaf() {
            counts.insert(id, 1u64);
            NodeDescriptor::Leaf {
                id,
                name: node.name().to_owned(),
                row: node.row(),
            }
        } else {
            let mut leaves = 0;
            for child in node.children() {
                leaves += counts.remove(&child.index()).unwrap_or_default();
                edges.push((id, child.index()));
            }
            counts.insert(id, leaves);
            NodeDescriptor::Internal {
                id,
                name: node.name().to_owned(),
                leaves,
            }
        };
        nodes.insert(id, descriptor);
    }
    let graph = ArchiveGraph { nodes, edges };
    dot::render(&graph, &mut out)?;
    Ok(())
}

/// Prints a short description of an archive
pub fn summary<S: ReadOnlyStore>(archive: &Archive<S>, mut out: impl Write) -> anyhow::Result<()> {
    writeln!(out, "leaves: {}", archive.num_leaves())?;
    writeln!(out, "containers: {}", archive.num_nodes())?;
    match archive.alignment() {
        Some(meta) => {
            let (grid_rows, grid_cols) = meta.chunk_grid();
            writeln!(out, "alphabet: {}", meta.alphabet)?;
            writeln!(out, "matrix: {} x {}", meta.rows, meta.cols)?;
            writeln!(
                out,
                "chunks: {} x {} of {} x {}",
                grid_rows, grid_cols, meta.chunk.rows, meta.chunk.cols
            )?;
        }
        None => writeln!(out, "matrix: none")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylostore::{build, newick, BuildOptions, MemStore, Record};

    #[test]
    fn dot_output() -> anyhow::Result<()> {
        let mut tree = newick::parse("((A,B),C);")?;
        let records = vec![
            Record::new("A", "AC"),
            Record::new("B", "AG"),
            Record::new("C", "TT"),
        ];
        let archive = build(
            MemStore::new(1 << 20),
            &mut tree,
            Some(&records),
            &BuildOptions::default(),
        )?;
        let mut out = Vec::new();
        graph(&archive, &mut out)?;
        let text = String::from_utf8(out)?;
        assert!(text.starts_with("digraph archive {"));
        assert!(text.contains("label=\"A #0\""));
        assert!(text.contains("label=\"tree (3)\""));
        assert!(text.contains("N0 -> N1"));

        let mut out = Vec::new();
        summary(&archive, &mut out)?;
        let text = String::from_utf8(out)?;
        assert!(text.contains("leaves: 3"));
        assert!(text.contains("matrix: 3 x 2"));
        Ok(())
    }
}
