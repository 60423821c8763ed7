mod buffer_pool;
mod graph;
mod types;


pub use buffer_pool::AudioBufferPool;
pub use graph::AudioGraph;
pub use types::{Connection, ConnectionKey, NodeId};
