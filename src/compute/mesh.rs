//! Finite-element mesh of square membrane elements.
//!
//! Nodes are identified by their grid-corner label `(row, col)`: the corner
//! at the upper-left of cell `(row, col)` has label `(row, col)`, so a grid of
//! `rows × cols` cells has corner labels in `0..=rows × 0..=cols`. Each node
//! carries two degrees of freedom, `2k` (x) and `2k + 1` (y).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Grid-corner label of a node.
pub type NodeLabel = (usize, usize);

/// Mesh node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub x: f64,
    pub y: f64,
    pub label: NodeLabel,
}

/// Square membrane element, corners ordered upper-left, upper-right,
/// lower-right, lower-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Grid cell the element covers.
    pub cell: (usize, usize),
    /// Global node indices of the corners.
    pub nodes: [usize; 4],
}

impl Element {
    /// Local-to-global degree-of-freedom mapping of the 8 planar DOFs.
    #[inline]
    pub fn dofs(&self) -> [usize; 8] {
        let [a, b, c, d] = self.nodes;
        [
            2 * a,
            2 * a + 1,
            2 * b,
            2 * b + 1,
            2 * c,
            2 * c + 1,
            2 * d,
            2 * d + 1,
        ]
    }
}

#[derive(Deserialize)]
struct MeshRecord {
    rows: usize,
    element_size: f64,
    nodes: Vec<Node>,
    elements: Vec<Element>,
}

/// Mesh built one element at a time, deduplicating shared corners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "MeshRecord")]
pub struct Mesh {
    rows: usize,
    element_size: f64,
    nodes: Vec<Node>,
    elements: Vec<Element>,
    #[serde(skip_serializing)]
    dof_map: Vec<[usize; 8]>,
    #[serde(skip_serializing)]
    node_index: HashMap<NodeLabel, usize>,
}

impl From<MeshRecord> for Mesh {
    fn from(record: MeshRecord) -> Self {
        let node_index = record
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.label, i))
            .collect();
        let dof_map = record.elements.iter().map(Element::dofs).collect();
        Self {
            rows: record.rows,
            element_size: record.element_size,
            nodes: record.nodes,
            elements: record.elements,
            dof_map,
            node_index,
        }
    }
}

impl Mesh {
    /// Create an empty mesh for a grid with `rows` rows of square cells of
    /// side `element_size`.
    pub fn new(rows: usize, element_size: f64) -> Self {
        Self {
            rows,
            element_size,
            nodes: Vec::new(),
            elements: Vec::new(),
            dof_map: Vec::new(),
            node_index: HashMap::new(),
        }
    }

    /// Append the element covering cell `(row, col)` and return its index.
    pub fn push_element(&mut self, row: usize, col: usize) -> usize {
        let corners = [
            (row, col),
            (row, col + 1),
            (row + 1, col + 1),
            (row + 1, col),
        ];
        let nodes = corners.map(|label| self.node_or_insert(label));

        let element = Element {
            cell: (row, col),
            nodes,
        };
        self.dof_map.push(element.dofs());
        self.elements.push(element);
        self.elements.len() - 1
    }

    fn node_or_insert(&mut self, label: NodeLabel) -> usize {
        if let Some(&idx) = self.node_index.get(&label) {
            return idx;
        }
        let l = self.element_size;
        let (row, col) = label;
        let idx = self.nodes.len();
        self.nodes.push(Node {
            x: col as f64 * l,
            y: (self.rows as f64 - row as f64) * l,
            label,
        });
        self.node_index.insert(label, idx);
        idx
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// One 8-entry DOF row per element.
    #[inline]
    pub fn dof_map(&self) -> &[[usize; 8]] {
        &self.dof_map
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Total degrees of freedom (two per node).
    #[inline]
    pub fn dof_count(&self) -> usize {
        2 * self.nodes.len()
    }

    #[inline]
    pub fn element_size(&self) -> f64 {
        self.element_size
    }

    /// Global index of the node with the given corner label.
    #[inline]
    pub fn node_index(&self, label: NodeLabel) -> Option<usize> {
        self.node_index.get(&label).copied()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
