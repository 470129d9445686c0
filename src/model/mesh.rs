use wgpu::util::DeviceExt;

use super::{cube_geometry, CubeVertex};

pub struct Mesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
}

impl Mesh {
    pub fn new(device: &wgpu::Device, name: &str, vertices: &[CubeVertex], indices: &[u16]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", name)),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // wgpu requires buffer writes to be 4-byte aligned; pad odd u16 counts.
        let mut index_data = indices.to_vec();
        if index_data.len() % 2 != 0 {
            index_data.push(0);
        }
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", name)),
            contents: bytemuck::cast_slice(&index_data),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            num_elements: indices.len() as u32,
        }
    }

    pub fn cube(device: &wgpu::Device, half_extent: f32) -> Self {
        let (vertices, indices) = cube_geometry(half_extent);
        log::info!(
            "Creating cube mesh: {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );
        Self::new(device, "Cube", &vertices, &indices)
    }

    pub fn render(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.draw_indexed(0..self.num_elements, 0, 0..1);
    }
}
