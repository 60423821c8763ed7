use std::collections::HashSet;

/// Pre-allocated audio buffers handed out by index. All block buffers are
/// acquired while the graph is being built, so the render path never
/// allocates.
pub struct AudioBufferPool {
    pub buffers: Vec<Vec<f32>>,
    available: Vec<usize>,
    in_use: HashSet<usize>,
}

impl AudioBufferPool {
    pub fn new(buffer_size: usize, initial_capacity: usize) -> Self {
        let mut buffers = Vec::with_capacity(initial_capacity);
        let mut available = Vec::with_capacity(initial_capacity);
        for i in 0..initial_capacity {
            buffers.push(vec![0.0; buffer_size]);
            available.push(i);
        }

        Self {
            buffers,
            available,
            in_use: HashSet::with_capacity(initial_capacity),
        }
    }

    pub fn acquire(&mut self, buffer_size: usize) -> usize {
        let index = if let Some(index) = self.available.pop() {
            index
        } else {
            let index = self.buffers.len();
            self.buffers.push(vec![0.0; buffer_size]);
            index
        };
        self.in_use.insert(index);
        index
    }

    /// Mutable access to several distinct buffers at once, for a node's
    /// output ports. Indices must be unique; the graph guarantees this
    /// because every port owns its own buffer.
    pub fn get_multiple_buffers_mut(&mut self, indices: &[usize]) -> Vec<(usize, &mut [f32])> {
        let mut seen = HashSet::new();
        for &idx in indices {
            assert!(idx < self.buffers.len(), "buffer index out of bounds");
            assert!(seen.insert(idx), "duplicate buffer index requested");
        }

        let mut result = Vec::with_capacity(indices.len());
        for &idx in indices {
            // Safety: indices are unique and bounds-checked above, so the
            // mutable borrows are disjoint.
            unsafe {
                let buffer = &mut *self.buffers.as_mut_ptr().add(idx);
                result.push((idx, buffer.as_mut_slice()));
            }
        }
        result
    }

    pub fn release(&mut self, index: usize) {
        if self.in_use.remove(&index) {
            self.available.push(index);
        }
    }

    pub fn fill(&mut self, index: usize, value: f32) {
        self.buffers[index].fill(value);
    }

    pub fn copy_in(&mut self, index: usize, data: &[f32]) {
        let buffer = &mut self.buffers[index];
        buffer[..data.len()].copy_from_slice(data);
    }

    pub fn copy_out(&self, index: usize) -> &[f32] {
        &self.buffers[index]
    }

    pub fn clear(&mut self, index: usize) {
        self.buffers[index].fill(0.0);
    }

    pub fn release_all(&mut self) {
        self.in_use.clear();
        self.available.clear();
        for i in 0..self.buffers.len() {
            self.available.push(i);
        }
    }
}
