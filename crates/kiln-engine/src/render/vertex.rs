//! CPU-side vertex scratch buffer.

/// Interleaved vertex data for the batch being built.
///
/// Storage is a flat `f32` sequence; integer attributes (packed colours) are
/// stored bit-for-bit via `f32::from_bits`. `max_vertex` is the batching
/// capacity: the compositor flushes before a primitive would exceed it.
/// Writes past the capacity still succeed by growing it, which only raw
/// primitive lists rely on.
#[derive(Debug, Clone)]
pub struct VertexBuffer {
    data: Vec<f32>,
    vertex_float_size: usize,
    vertex_count: usize,
    max_vertex: usize,
}

impl VertexBuffer {
    pub fn new(vertex_float_size: u32, max_vertex: usize) -> Self {
        let vertex_float_size = vertex_float_size as usize;
        let max_vertex = max_vertex.max(1);
        Self {
            data: Vec::with_capacity(vertex_float_size * max_vertex),
            vertex_float_size,
            vertex_count: 0,
            max_vertex,
        }
    }

    /// Changes the per-vertex stride. Buffered vertices are discarded.
    pub fn set_vertex_float_size(&mut self, vertex_float_size: u32) {
        self.clear();
        self.vertex_float_size = vertex_float_size as usize;
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.vertex_count = 0;
    }

    pub fn len(&self) -> usize {
        self.vertex_count
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    pub fn max_vertex(&self) -> usize {
        self.max_vertex
    }

    pub fn vertex_float_size(&self) -> usize {
        self.vertex_float_size
    }

    /// Bytes written so far; always `len() * vertex_float_size() * 4`.
    pub fn byte_cursor(&self) -> usize {
        self.data.len() * 4
    }

    /// Whether appending `vertices` more would exceed the capacity.
    pub fn is_full(&self, vertices: usize) -> bool {
        self.vertex_count + vertices > self.max_vertex
    }

    /// Doubles the capacity until `vertex_count` vertices fit.
    pub fn resize(&mut self, vertex_count: usize) {
        while vertex_count > self.max_vertex {
            self.max_vertex *= 2;
        }
        self.data
            .reserve((self.max_vertex * self.vertex_float_size).saturating_sub(self.data.len()));
    }

    /// Appends one zeroed vertex record and returns it for filling.
    pub fn push_vertex(&mut self) -> &mut [f32] {
        if self.vertex_count >= self.max_vertex {
            self.resize(self.vertex_count + 1);
        }
        let start = self.data.len();
        self.data.resize(start + self.vertex_float_size, 0.0);
        self.vertex_count += 1;
        &mut self.data[start..]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Written vertices as raw bytes, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

/// Stores a packed 32-bit word (e.g. an ARGB tint) in a float slot.
#[inline]
pub fn pack_word(word: u32) -> f32 {
    f32::from_bits(word)
}
