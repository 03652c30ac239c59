use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{self, Vertex},
        texture::Texture,
    },
    lighting,
};

/// Pipeline that renders models into sprite textures.
///
/// Bind groups: 0 material, 1 camera, 2 lighting.
pub fn mk_mesh_pipeline(
    device: &wgpu::Device,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Mesh Pipeline Layout"),
        bind_group_layouts: &[
            &model::material_layout(device),
            camera_bind_group_layout,
            &lighting::mk_bind_group_layout(device),
        ],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Mesh Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("mesh.wgsl").into()),
    };

    super::mk_render_pipeline(
        device,
        "Mesh Pipeline",
        &render_pipeline_layout,
        Texture::RENDER_TARGET_FORMAT,
        Some(wgpu::BlendState::REPLACE),
        Some(wgpu::Face::Back),
        Some(super::depth_state(true)),
        &[model::ModelVertex::desc(), InstanceRaw::desc()],
        shader,
    )
}
