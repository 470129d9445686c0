mod cube;
mod mesh;
mod vertex;

pub use cube::{cube_geometry, CUBE_HALF_EXTENT, CUBE_INDEX_COUNT, CUBE_VERTEX_COUNT};
pub use mesh::Mesh;
pub use vertex::CubeVertex;
