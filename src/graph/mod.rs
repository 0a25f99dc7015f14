//! 知识图谱模块

pub mod expander;
pub mod neo4j;
pub mod store;

pub use expander::{Expansion, GraphExpander};
pub use neo4j::Neo4jGraphStore;
pub use store::{GraphStore, GraphStoreError, InMemoryGraphStore, NeighborRecord, create_graph_store};
