//! Node index to texel mapping
//!
//! Node state textures pack one node per texel in row-major order inside the
//! smallest square that fits every node. Renderers sample the position
//! texture with the UV returned here.

/// Size of a square node-state texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelLayout {
    pub width: u32,
    pub height: u32,
}

impl TexelLayout {
    /// Layout for `node_count` nodes; an empty graph still gets one texel
    pub fn for_nodes(node_count: usize) -> Self {
        let mut width = (node_count as f64).sqrt().ceil() as u32;
        width = width.max(1);
        Self {
            width,
            height: width,
        }
    }

    pub fn texel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Integer texel coordinate of node `index`
    pub fn coords(&self, index: usize) -> (u32, u32) {
        let i = index as u32;
        (i % self.width, i / self.width)
    }

    /// Normalized texel-center coordinate of node `index`
    pub fn uv(&self, index: usize) -> [f32; 2] {
        let (x, y) = self.coords(index);
        [
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        ]
    }
}
