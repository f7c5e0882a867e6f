// src/core/mesh.rs
// Procedural meshes with per-face normals for demos and tests

use glam::Vec3;

use super::backend::MeshData;

impl MeshData {
    /// Axis-aligned cube centred at the origin with the given half extent
    pub fn cube(half: f32) -> Self {
        let faces = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X),
            (Vec3::Z, Vec3::Y, Vec3::NEG_X),
            (Vec3::NEG_Z, Vec3::Y, Vec3::X),
        ];
        let mut mesh = MeshData {
            label: "cube".to_string(),
            positions: Vec::with_capacity(24),
            normals: Vec::with_capacity(24),
            indices: Vec::with_capacity(36),
        };
        for (normal, up, right) in faces {
            let base = mesh.positions.len() as u32;
            let centre = normal * half;
            for (su, sr) in [(-1.0, -1.0), (-1.0, 1.0), (1.0, 1.0), (1.0, -1.0)] {
                mesh.positions.push(centre + up * (su * half) + right * (sr * half));
                mesh.normals.push(normal);
            }
            mesh.push_quad(base, normal);
        }
        mesh
    }

    /// Square in the XZ plane facing +Y
    pub fn plane(half: f32) -> Self {
        let mut mesh = MeshData {
            label: "plane".to_string(),
            positions: vec![
                Vec3::new(-half, 0.0, -half),
                Vec3::new(-half, 0.0, half),
                Vec3::new(half, 0.0, half),
                Vec3::new(half, 0.0, -half),
            ],
            normals: vec![Vec3::Y; 4],
            indices: Vec::with_capacity(6),
        };
        mesh.push_quad(0, Vec3::Y);
        mesh
    }

    /// Two triangles over vertices `base..base + 4`, wound counter-clockwise
    /// as seen from the side `normal` points to.
    fn push_quad(&mut self, base: u32, normal: Vec3) {
        let p = |i: u32| self.positions[(base + i) as usize];
        let facing = (p(1) - p(0)).cross(p(2) - p(0)).dot(normal);
        let order: [u32; 6] = if facing >= 0.0 {
            [0, 1, 2, 0, 2, 3]
        } else {
            [0, 2, 1, 0, 3, 2]
        };
        self.indices.extend(order.iter().map(|i| base + i));
    }

    /// Radius of the origin-centred sphere enclosing every vertex
    pub fn bounding_radius(&self) -> f32 {
        self.positions
            .iter()
            .map(|p| p.length())
            .fold(0.0, f32::max)
    }

    /// Interleaved `[position, normal]` vertices as uploaded to the GPU
    pub fn interleaved(&self) -> Vec<[f32; 6]> {
        self.positions
            .iter()
            .zip(&self.normals)
            .map(|(p, n)| [p.x, p.y, p.z, n.x, n.y, n.z])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_triangles_face_outward() {
        let cube = MeshData::cube(1.0);
        assert_eq!(cube.positions.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for tri in cube.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| cube.positions[i as usize]);
            let n = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(n.dot(centroid) > 0.0);
        }
        assert!((cube.bounding_radius() - 3.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn plane_faces_up() {
        let plane = MeshData::plane(5.0);
        let tri: Vec<Vec3> = plane.indices[..3]
            .iter()
            .map(|i| plane.positions[*i as usize])
            .collect();
        assert!((tri[1] - tri[0]).cross(tri[2] - tri[0]).y > 0.0);
        assert_eq!(plane.interleaved()[0][4], 1.0);
    }
}
