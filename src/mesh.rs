use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

// Process-unique key the renderer caches GPU buffers under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(u64);

#[derive(Debug, Clone)]
pub struct MeshData {
    id: MeshId,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub base_color: [f32; 4],
}

impl MeshData {
    /// Missing indices fall back to a non-indexed triangle list, missing or
    /// mismatched normals are rebuilt from the faces.
    pub fn new(
        positions: Vec<[f32; 3]>,
        normals: Option<Vec<[f32; 3]>>,
        indices: Option<Vec<u32>>,
        base_color: [f32; 4],
    ) -> Self {
        let vertex_count = positions.len();
        let indices = indices
            .filter(|idx| idx.iter().all(|&i| (i as usize) < vertex_count))
            .unwrap_or_else(|| (0..vertex_count as u32).collect());

        let normals = match normals {
            Some(n) if n.len() == vertex_count => n,
            _ => face_normals(&positions, &indices),
        };

        Self {
            id: MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed)),
            positions,
            normals,
            indices,
            base_color,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

fn face_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accum = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (pa, pb, pc) = (
            Vec3::from(positions[a]),
            Vec3::from(positions[b]),
            Vec3::from(positions[c]),
        );
        let n = (pb - pa).cross(pc - pa);
        accum[a] += n;
        accum[b] += n;
        accum[c] += n;
    }

    accum
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}
