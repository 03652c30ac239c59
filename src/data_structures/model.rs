//! GPU models: meshes, PBR materials and the model transform.
//!
//! A [`Model`] is created from a loaded [`GltfAsset`]. Every mesh keeps its own
//! material so material properties can be overridden per mesh after loading,
//! and an instance buffer holding its world matrix.

use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::{
    context::{BufferWriter, Context, InitContext},
    data_structures::{
        instance::{Instance, InstanceRaw},
        texture::Texture,
    },
    resources::model::{GltfAsset, MaterialData, MeshData},
};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Interleave the separate attribute streams of a loaded mesh.
pub fn interleave(mesh: &MeshData) -> Vec<ModelVertex> {
    mesh.positions
        .iter()
        .enumerate()
        .map(|(i, position)| ModelVertex {
            position: *position,
            normal: mesh.normals.get(i).copied().unwrap_or([0.0, 0.0, 1.0]),
            tex_coords: mesh.tex_coords.get(i).copied().unwrap_or_default(),
        })
        .collect()
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    // Uniform structs are sized in multiples of 16 bytes
    pub _padding: [f32; 2],
}

/// Metallic-roughness material.
///
/// `metallic`, `roughness` and `base_color` may be changed freely; they reach the
/// GPU on the next [`BufferWriter::write_to_buffer`].
#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub base_color_texture: Texture,
    pub uniform_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, data: &MaterialData) -> anyhow::Result<Self> {
        let base_color_texture = match &data.base_color_texture {
            Some(img) => Texture::from_image(device, queue, img, Some(&data.name))?,
            None => Texture::create_solid([255; 4], device, queue, "white"),
        };
        let uniform = MaterialUniform {
            base_color: data.base_color,
            metallic: data.metallic,
            roughness: data.roughness,
            _padding: [0.0; 2],
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} material buffer", data.name)),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let layout = material_layout(device);
        let sampler = base_color_texture.sampler_or_default(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&base_color_texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
            label: Some(&data.name),
        });

        Ok(Self {
            name: data.name.clone(),
            base_color: data.base_color,
            metallic: data.metallic,
            roughness: data.roughness,
            base_color_texture,
            uniform_buffer,
            bind_group,
        })
    }

    pub fn uniform(&self) -> MaterialUniform {
        MaterialUniform {
            base_color: self.base_color,
            metallic: self.metallic,
            roughness: self.roughness,
            _padding: [0.0; 2],
        }
    }
}

pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
        label: Some("Material bind_group_layout"),
    })
}

#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    /// Node transform from the glTF scene, applied before the model transform.
    pub local_transform: cgmath::Matrix4<f32>,
    pub instance_buffer: wgpu::Buffer,
    pub material: Material,
}

/// A renderable model: meshes with their materials and one shared transform.
#[derive(Debug)]
pub struct Model {
    pub meshes: Vec<Mesh>,
    pub transform: Instance,
}

impl Model {
    pub fn from_gltf(ctx: &InitContext, asset: &GltfAsset) -> anyhow::Result<Self> {
        let device = &ctx.device;
        let transform = Instance::new();
        let mut meshes = Vec::with_capacity(asset.meshes.len());
        for data in &asset.meshes {
            if data.indices.is_empty() {
                log::warn!("Mesh {} has no triangles and is skipped", data.name);
                continue;
            }
            let vertices = interleave(data);
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{:?} Vertex Buffer", data.name)),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{:?} Index Buffer", data.name)),
                contents: bytemuck::cast_slice(&data.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            let instance = InstanceRaw::from_matrix(transform.to_matrix() * data.transform);
            let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{:?} Instance Buffer", data.name)),
                contents: bytemuck::cast_slice(&[instance]),
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
            let material = Material::new(device, &ctx.queue, &asset.material_of(data))?;

            meshes.push(Mesh {
                name: data.name.clone(),
                vertex_buffer,
                index_buffer,
                num_elements: data.indices.len() as u32,
                local_transform: data.transform,
                instance_buffer,
                material,
            });
        }
        anyhow::ensure!(!meshes.is_empty(), "model has no renderable meshes");
        Ok(Self { meshes, transform })
    }

    /// Upload transforms and material parameters.
    pub fn write_buffers(&self, queue: &wgpu::Queue) {
        let model_matrix = self.transform.to_matrix();
        for mesh in &self.meshes {
            let instance = InstanceRaw::from_matrix(model_matrix * mesh.local_transform);
            queue.write_buffer(&mesh.instance_buffer, 0, bytemuck::cast_slice(&[instance]));
            queue.write_buffer(
                &mesh.material.uniform_buffer,
                0,
                bytemuck::cast_slice(&[mesh.material.uniform()]),
            );
        }
    }
}

impl BufferWriter for Model {
    fn write_to_buffer(&mut self, ctx: &Context) {
        self.write_buffers(&ctx.queue);
    }
}

pub trait DrawModel<'a> {
    fn draw_mesh(
        &mut self,
        mesh: &'a Mesh,
        camera_bind_group: &'a wgpu::BindGroup,
        lighting_bind_group: &'a wgpu::BindGroup,
    );
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'a Mesh,
        instances: Range<u32>,
        camera_bind_group: &'a wgpu::BindGroup,
        lighting_bind_group: &'a wgpu::BindGroup,
    );

    fn draw_model(
        &mut self,
        model: &'a Model,
        camera_bind_group: &'a wgpu::BindGroup,
        lighting_bind_group: &'a wgpu::BindGroup,
    );
}

impl<'a, 'b> DrawModel<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_mesh(
        &mut self,
        mesh: &'b Mesh,
        camera_bind_group: &'b wgpu::BindGroup,
        lighting_bind_group: &'b wgpu::BindGroup,
    ) {
        self.draw_mesh_instanced(mesh, 0..1, camera_bind_group, lighting_bind_group);
    }

    fn draw_mesh_instanced(
        &mut self,
        mesh: &'b Mesh,
        instances: Range<u32>,
        camera_bind_group: &'b wgpu::BindGroup,
        lighting_bind_group: &'b wgpu::BindGroup,
    ) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_vertex_buffer(1, mesh.instance_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &mesh.material.bind_group, &[]);
        self.set_bind_group(1, camera_bind_group, &[]);
        self.set_bind_group(2, lighting_bind_group, &[]);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }

    fn draw_model(
        &mut self,
        model: &'b Model,
        camera_bind_group: &'b wgpu::BindGroup,
        lighting_bind_group: &'b wgpu::BindGroup,
    ) {
        for mesh in &model.meshes {
            self.draw_mesh(mesh, camera_bind_group, lighting_bind_group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaves_attributes_with_fallbacks() {
        let mesh = MeshData {
            name: "m".into(),
            positions: vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            normals: vec![[0.0, 1.0, 0.0]],
            tex_coords: vec![[0.5, 0.25], [1.0, 1.0]],
            indices: vec![0, 1, 0],
            transform: cgmath::SquareMatrix::identity(),
            material: None,
        };
        let vertices = interleave(&mesh);
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[0].normal, [0.0, 1.0, 0.0]);
        assert_eq!(vertices[0].tex_coords, [0.5, 0.25]);
        assert_eq!(vertices[1].position, [4.0, 5.0, 6.0]);
        assert_eq!(vertices[1].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn material_uniform_is_uniform_aligned() {
        assert_eq!(std::mem::size_of::<MaterialUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<ModelVertex>(), 32);
    }
}
