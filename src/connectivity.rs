//! Compressed adjacency storage for mesh connectivity and dof maps.
use fenris_nested_vec::{ArrayAppender, NestedVec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;

/// Variable-length lists of links from source nodes (cells, facets, ...) to target nodes.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacencyList {
    links: NestedVec<usize>,
}

impl Debug for AdjacencyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.links, f)
    }
}

impl AdjacencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an adjacency list where every node has exactly `degree` links.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` is not divisible by `degree`.
    pub fn from_fixed(degree: usize, data: Vec<usize>) -> Self {
        assert!(degree > 0, "Degree must be positive.");
        assert_eq!(data.len() % degree, 0, "Data length must be a multiple of the degree.");
        let mut list = Self::new();
        for links in data.chunks_exact(degree) {
            list.push(links);
        }
        list
    }

    pub fn push(&mut self, links: &[usize]) {
        self.links.push(links);
    }

    /// Returns an appender for building the links of a new node one at a time.
    ///
    /// The node is finalized when the appender is dropped.
    pub fn begin_node(&mut self) -> ArrayAppender<'_, usize> {
        self.links.begin_array()
    }

    pub fn num_nodes(&self) -> usize {
        self.links.len()
    }

    pub fn num_links_total(&self) -> usize {
        self.links.total_num_elements()
    }

    /// The links of the given node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is out of bounds.
    pub fn links(&self, node: usize) -> &[usize] {
        match self.links.get(node) {
            Some(links) => links,
            None => panic!("Node {} out of bounds for {} nodes.", node, self.num_nodes()),
        }
    }

    pub fn get(&self, node: usize) -> Option<&[usize]> {
        self.links.get(node)
    }

    pub fn num_links(&self, node: usize) -> usize {
        self.links(node).len()
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = &[usize]> {
        self.links.iter()
    }

    /// The inverse adjacency: for every target node, the sources that link to it, in
    /// increasing order.
    ///
    /// `num_targets` must be larger than every link in the list.
    pub fn transpose(&self, num_targets: usize) -> Self {
        let mut sources = vec![Vec::new(); num_targets];
        for (source, links) in self.iter().enumerate() {
            for &target in links {
                sources[target].push(source);
            }
        }
        Self::from(sources)
    }
}

impl<'a> From<&'a Vec<Vec<usize>>> for AdjacencyList {
    fn from(nested: &'a Vec<Vec<usize>>) -> Self {
        Self {
            links: NestedVec::from(nested),
        }
    }
}

impl From<Vec<Vec<usize>>> for AdjacencyList {
    fn from(nested: Vec<Vec<usize>>) -> Self {
        Self::from(&nested)
    }
}

impl From<&AdjacencyList> for Vec<Vec<usize>> {
    fn from(list: &AdjacencyList) -> Self {
        Self::from(&list.links)
    }
}
