/// AudioGraph manages interconnected signal nodes and their buffer routing.
///
/// Core concepts:
/// - Nodes: processing units (noise source, filters, delays, panners) with
///   typed input/output ports
/// - Connections: edges that carry audio or control signals between ports,
///   scaled by an amount (fan-in sums, fan-out duplicates)
/// - Buffer pool: pre-allocated block buffers, one per output port
/// - Processing order: a topologically sorted node sequence so upstream
///   signals are rendered before their consumers
///
/// Feedback never appears as a graph edge; nodes that need it (delay lines)
/// own their feedback path internally, so the edge set stays acyclic.
use rustc_hash::FxHashMap;

use super::{
    buffer_pool::AudioBufferPool,
    types::{Connection, ConnectionKey, NodeId},
};
use crate::params::AudioParam;
use crate::{AudioNode, ParamKey, PortId};

pub struct AudioGraph {
    pub(crate) nodes: Vec<Box<dyn AudioNode>>,
    pub(crate) connections: FxHashMap<ConnectionKey, Connection>,
    pub(crate) processing_order: Vec<usize>,
    pub(crate) buffer_size: usize,
    pub(crate) buffer_pool: AudioBufferPool,
    pub(crate) node_buffers: FxHashMap<(NodeId, PortId), usize>,
    pub(crate) input_connections: FxHashMap<NodeId, Vec<(PortId, usize, f32)>>,
    input_scratch: Vec<Vec<f32>>,
    output_node: Option<NodeId>,
}

impl AudioGraph {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            nodes: Vec::new(),
            connections: FxHashMap::default(),
            processing_order: Vec::new(),
            buffer_size,
            buffer_pool: AudioBufferPool::new(buffer_size, 32),
            node_buffers: FxHashMap::default(),
            input_connections: FxHashMap::default(),
            input_scratch: Vec::new(),
            output_node: None,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn clear(&mut self) {
        self.connections.clear();
        self.input_connections.clear();
        self.nodes.clear();
        self.processing_order.clear();
        self.node_buffers.clear();
        self.output_node = None;
        self.buffer_pool.release_all();
    }

    /// Marks the node whose output feeds the output stage.
    pub fn set_output_node(&mut self, node: NodeId) {
        self.output_node = Some(node);
    }

    pub fn output_node(&self) -> Option<NodeId> {
        self.output_node
    }

    pub fn add_node(&mut self, node: Box<dyn AudioNode>) -> NodeId {
        let id = NodeId(self.nodes.len());

        // Output ports get dedicated buffers; inputs are mixed into shared
        // scratch at render time.
        for (port, is_output) in node.get_ports() {
            if is_output {
                let buffer_idx = self.buffer_pool.acquire(self.buffer_size);
                self.node_buffers.insert((id, port), buffer_idx);
            }
        }

        self.nodes.push(node);
        self.update_processing_order();
        id
    }

    /// Adds or updates a connection. Re-connecting an existing edge updates
    /// its amount instead of duplicating it, which is what makes graph
    /// building idempotent.
    pub fn connect(&mut self, connection: Connection) -> ConnectionKey {
        let key = ConnectionKey::new(
            connection.from_node,
            connection.from_port,
            connection.to_node,
            connection.to_port,
        );

        let source_buffer_idx = self.node_buffers[&(connection.from_node, connection.from_port)];
        let inputs = self
            .input_connections
            .entry(connection.to_node)
            .or_default();

        let existing = inputs
            .iter()
            .position(|&(port, src, _)| port == connection.to_port && src == source_buffer_idx);
        match existing {
            Some(idx) => inputs[idx].2 = connection.amount,
            None => inputs.push((connection.to_port, source_buffer_idx, connection.amount)),
        }

        self.connections.insert(key, connection);
        self.update_processing_order();
        key
    }

    /// Removes every edge from `from_node` into (`to_node`, `to_port`).
    pub fn disconnect(&mut self, from_node: NodeId, to_node: NodeId, to_port: PortId) {
        self.connections.retain(|_, conn| {
            !(conn.from_node == from_node && conn.to_node == to_node && conn.to_port == to_port)
        });
        self.rebuild_input_connections(to_node);
        self.update_processing_order();
    }

    fn rebuild_input_connections(&mut self, node: NodeId) {
        let mut inputs = Vec::new();
        for conn in self.connections.values() {
            if conn.to_node == node {
                let src = self.node_buffers[&(conn.from_node, conn.from_port)];
                inputs.push((conn.to_port, src, conn.amount));
            }
        }
        if inputs.is_empty() {
            self.input_connections.remove(&node);
        } else {
            self.input_connections.insert(node, inputs);
        }
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&dyn AudioNode> {
        self.nodes.get(node_id.0).map(|n| n.as_ref())
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Box<dyn AudioNode>> {
        self.nodes.get_mut(node_id.0)
    }

    /// Automatable parameter lookup, used by the binding layer. Returns
    /// `None` when the node does not expose the key, which callers treat as
    /// a bind-time error.
    pub fn node_param_mut(&mut self, node_id: NodeId, key: ParamKey) -> Option<&mut AudioParam> {
        self.nodes.get_mut(node_id.0)?.param_mut(key)
    }

    fn update_processing_order(&mut self) {
        self.processing_order.clear();
        let mut visited = vec![false; self.nodes.len()];
        for i in 0..self.nodes.len() {
            self.visit_node(i, &mut visited);
        }
    }

    fn visit_node(&mut self, index: usize, visited: &mut [bool]) {
        if visited[index] {
            return;
        }
        visited[index] = true;

        let node_id = NodeId(index);
        let upstream: Vec<usize> = self
            .connections
            .values()
            .filter(|conn| conn.to_node == node_id)
            .map(|conn| conn.from_node.0)
            .collect();

        for next in upstream {
            self.visit_node(next, visited);
        }

        self.processing_order.push(index);
    }

    /// Renders one block into the stereo output slices. `start_frame` is the
    /// engine clock at the first sample of the block; nodes use it to anchor
    /// parameter ramps.
    pub fn process_block(
        &mut self,
        output_left: &mut [f32],
        output_right: &mut [f32],
        start_frame: u64,
    ) {
        let buffer_size = self.buffer_size;
        let AudioGraph {
            nodes,
            processing_order,
            buffer_pool,
            node_buffers,
            input_connections,
            input_scratch,
            ..
        } = self;

        for &buffer_idx in node_buffers.values() {
            buffer_pool.clear(buffer_idx);
        }

        for &node_idx in processing_order.iter() {
            let node_id = NodeId(node_idx);
            if !nodes[node_idx].should_process() {
                continue;
            }

            // Mix every source feeding each of this node's input ports into
            // a reusable scratch buffer (fan-in sums, amounts scale).
            let mut input_ports: Vec<PortId> = Vec::new();
            if let Some(conns) = input_connections.get(&node_id) {
                for &(port, src_idx, amount) in conns {
                    let slot = match input_ports.iter().position(|&p| p == port) {
                        Some(slot) => slot,
                        None => {
                            input_ports.push(port);
                            let slot = input_ports.len() - 1;
                            if input_scratch.len() <= slot {
                                input_scratch.push(vec![0.0; buffer_size]);
                            }
                            input_scratch[slot][..buffer_size].fill(0.0);
                            slot
                        }
                    };
                    let src = buffer_pool.copy_out(src_idx);
                    let dst = &mut input_scratch[slot];
                    for i in 0..buffer_size {
                        dst[i] += src[i] * amount;
                    }
                }
            }

            let mut inputs: FxHashMap<PortId, &[f32]> = FxHashMap::default();
            for (slot, &port) in input_ports.iter().enumerate() {
                inputs.insert(port, &input_scratch[slot][..buffer_size]);
            }

            let output_ports: Vec<(PortId, usize)> = nodes[node_idx]
                .get_ports()
                .into_iter()
                .filter(|&(_, is_output)| is_output)
                .filter_map(|(port, _)| {
                    node_buffers.get(&(node_id, port)).map(|&idx| (port, idx))
                })
                .collect();
            let indices: Vec<usize> = output_ports.iter().map(|&(_, idx)| idx).collect();

            let buffers = buffer_pool.get_multiple_buffers_mut(&indices);
            let mut outputs: FxHashMap<PortId, &mut [f32]> = FxHashMap::default();
            for ((port, _), (_, buffer)) in output_ports.iter().zip(buffers) {
                outputs.insert(*port, buffer);
            }

            nodes[node_idx].process(&inputs, &mut outputs, buffer_size, start_frame);
        }

        // Copy the output node's signal to the caller; a mono output node
        // feeds both channels.
        output_left.fill(0.0);
        output_right.fill(0.0);
        if let Some(output_node) = self.output_node {
            if let Some(&left_idx) = self.node_buffers.get(&(output_node, PortId::AudioOutput0)) {
                output_left.copy_from_slice(self.buffer_pool.copy_out(left_idx));
                if let Some(&right_idx) =
                    self.node_buffers.get(&(output_node, PortId::AudioOutput1))
                {
                    output_right.copy_from_slice(self.buffer_pool.copy_out(right_idx));
                } else {
                    output_right.copy_from_slice(self.buffer_pool.copy_out(left_idx));
                }
            }
        }
    }
}

impl std::fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraph")
            .field("buffer_size", &self.buffer_size)
            .field("num_nodes", &self.nodes.len())
            .field("num_connections", &self.connections.len())
            .finish()
    }
}
