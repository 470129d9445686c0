use super::CubeVertex;

pub const CUBE_HALF_EXTENT: f32 = 3.0;
pub const CUBE_VERTEX_COUNT: usize = 24;
pub const CUBE_INDEX_COUNT: usize = 36;

/// Face normals in vertex order: +Z, -Z, +Y, -Y, +X, -X.
const FACE_NORMALS: [[f32; 3]; 6] = [
    [0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
];

/// Corner signs for each face, four corners per face.
const FACE_CORNERS: [[[f32; 3]; 4]; 6] = [
    [[-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [-1.0, 1.0, 1.0], [1.0, 1.0, 1.0]],
    [[-1.0, -1.0, -1.0], [-1.0, 1.0, -1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0]],
    [[-1.0, 1.0, -1.0], [-1.0, 1.0, 1.0], [1.0, 1.0, -1.0], [1.0, 1.0, 1.0]],
    [[-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [-1.0, -1.0, 1.0], [1.0, -1.0, 1.0]],
    [[1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0]],
    [[-1.0, -1.0, -1.0], [-1.0, -1.0, 1.0], [-1.0, 1.0, -1.0], [-1.0, 1.0, 1.0]],
];

/// Builds an axis-aligned cube centred on the origin with flat per-face normals.
///
/// Each face is a quad of four vertices split into the triangles `(0, 1, 2)`
/// and `(2, 1, 3)`, so the index buffer fits in 16 bits.
pub fn cube_geometry(half_extent: f32) -> (Vec<CubeVertex>, Vec<u16>) {
    let mut vertices = Vec::with_capacity(CUBE_VERTEX_COUNT);
    let mut indices = Vec::with_capacity(CUBE_INDEX_COUNT);

    for (face, (corners, normal)) in FACE_CORNERS.iter().zip(FACE_NORMALS).enumerate() {
        for corner in corners {
            vertices.push(CubeVertex::new(
                [
                    corner[0] * half_extent,
                    corner[1] * half_extent,
                    corner[2] * half_extent,
                ],
                normal,
            ));
        }

        let base = (face * 4) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
    }

    (vertices, indices)
}
