//! Image-based lighting.
//!
//! [`ImageBasedLighting`] pairs a diffuse irradiance cubemap with a specular
//! cubemap whose mip levels hold increasingly rough reflections.
//! [`LightingEnvironment`] turns them into the bind group the mesh pipeline
//! reads. The active environment is a field of [`crate::context::Context`].

use wgpu::util::DeviceExt;

use crate::{
    context::InitContext,
    data_structures::texture::Texture,
    resources::CubemapAsset,
};

#[derive(Debug)]
pub struct ImageBasedLighting {
    pub diffuse: Texture,
    pub specular: Texture,
    pub specular_mip_levels: u32,
}

impl ImageBasedLighting {
    pub fn new(
        ctx: &InitContext,
        diffuse: &CubemapAsset,
        specular: &CubemapAsset,
    ) -> anyhow::Result<Self> {
        let diffuse_texture = Texture::from_cubemap(&ctx.device, &ctx.queue, diffuse, "diffuse cubemap")?;
        let specular_texture =
            Texture::from_cubemap(&ctx.device, &ctx.queue, specular, "specular cubemap")?;
        Ok(Self {
            diffuse: diffuse_texture,
            specular: specular_texture,
            specular_mip_levels: specular.mip_level_count(),
        })
    }

    /// Uniform grey lighting, used when nothing was installed.
    pub fn neutral(ctx: &InitContext) -> anyhow::Result<Self> {
        let grey = image::RgbaImage::from_pixel(1, 1, image::Rgba([160, 160, 160, 255]));
        let cubemap = CubemapAsset {
            levels: vec![std::array::from_fn(|_| grey.clone())],
        };
        Self::new(ctx, &cubemap, &cubemap)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingUniform {
    pub specular_mip_levels: f32,
    pub intensity: f32,
    pub _padding: [f32; 2],
}

/// Lighting shared by everything the mesh pipeline draws.
#[derive(Debug)]
pub struct LightingEnvironment {
    pub image_based_lighting: ImageBasedLighting,
    pub uniform: LightingUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl LightingEnvironment {
    pub fn new(ctx: &InitContext, image_based_lighting: ImageBasedLighting) -> Self {
        Self::with_intensity(ctx, image_based_lighting, 1.0)
    }

    pub fn with_intensity(
        ctx: &InitContext,
        image_based_lighting: ImageBasedLighting,
        intensity: f32,
    ) -> Self {
        let device = &ctx.device;
        let uniform = LightingUniform {
            specular_mip_levels: image_based_lighting.specular_mip_levels as f32,
            intensity,
            _padding: [0.0; 2],
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lighting Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let layout = mk_bind_group_layout(device);
        let sampler = image_based_lighting.specular.sampler_or_default(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&image_based_lighting.diffuse.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&image_based_lighting.specular.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffer.as_entire_binding(),
                },
            ],
            label: Some("lighting_bind_group"),
        });
        Self {
            image_based_lighting,
            uniform,
            buffer,
            bind_group,
        }
    }
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let cube = wgpu::BindingType::Texture {
        multisampled: false,
        view_dimension: wgpu::TextureViewDimension::Cube,
        sample_type: wgpu::TextureSampleType::Float { filterable: true },
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: cube,
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: cube,
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
        label: Some("lighting_bind_group_layout"),
    })
}
