//! GPU textures and texture creation utilities.
//!
//! [`Texture`] bundles a wgpu texture with its view and, for sampled textures,
//! a sampler. Constructors cover depth buffers, sprite render targets, images
//! and cubemaps.

use anyhow::*;

use crate::resources::cubemap::{CubemapAsset, FACES};

/// A GPU texture with a view and optional sampler.
#[derive(Clone, Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Format of everything a model is rendered into.
    pub const RENDER_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// # Arguments
    ///
    /// * `size` is [width, height] of the texture in pixels, clamped to at least 1
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let texture = create_2d(
            device,
            label,
            extent(size[0].max(1), size[1].max(1), 1),
            1,
            Self::DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            sampler: None,
        }
    }

    /// Create a colour texture that a model can be rendered into and a sprite can sample.
    ///
    /// `COPY_SRC` is set so the rendered pixels can be read back.
    pub fn create_render_target(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let texture = create_2d(
            device,
            label,
            extent(size[0].max(1), size[1].max(1), 1),
            1,
            Self::RENDER_TARGET_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            sampler: Some(create_sampler(
                device,
                wgpu::AddressMode::ClampToEdge,
                wgpu::FilterMode::Nearest,
            )),
        }
    }

    /// Create a 1x1 texture of a single colour.
    ///
    /// Stands in as the base colour map of materials without one.
    pub fn create_solid(rgba: [u8; 4], device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> Self {
        let texture = create_2d(
            device,
            label,
            extent(1, 1, 1),
            1,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        upload(queue, &texture, &rgba, [1, 1], 0, 0);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            sampler: Some(create_default_sampler(device)),
        }
    }

    /// Upload a decoded image as an sRGB colour texture.
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &image::RgbaImage,
        label: Option<&str>,
    ) -> Result<Self> {
        let (width, height) = img.dimensions();
        ensure!(width > 0 && height > 0, "cannot upload an empty image");

        let texture = create_2d(
            device,
            label.unwrap_or("image"),
            extent(width, height, 1),
            1,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        upload(queue, &texture, img.as_raw(), [width, height], 0, 0);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            texture,
            view,
            sampler: Some(create_default_sampler(device)),
        })
    }

    /// Upload all mip levels and faces of a cubemap.
    ///
    /// The view has `Cube` dimension and the sampler filters linearly between
    /// mip levels so roughness can select a blurrier level.
    pub fn from_cubemap(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        cubemap: &CubemapAsset,
        label: &str,
    ) -> Result<Self> {
        let size = cubemap.size();
        let mip_level_count = cubemap.mip_level_count();
        ensure!(mip_level_count > 0, "cubemap {label} has no mip levels");

        let texture = create_2d(
            device,
            label,
            extent(size, size, FACES.len() as u32),
            mip_level_count,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        for (level, faces) in cubemap.levels.iter().enumerate() {
            for (layer, face) in faces.iter().enumerate() {
                let (width, height) = face.dimensions();
                upload(queue, &texture, face.as_raw(), [width, height], level as u32, layer as u32);
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Ok(Self {
            texture,
            view,
            sampler: Some(create_sampler(
                device,
                wgpu::AddressMode::ClampToEdge,
                wgpu::FilterMode::Linear,
            )),
        })
    }

    /// Sampler of this texture, or a default one for textures created without.
    pub fn sampler_or_default(&self, device: &wgpu::Device) -> wgpu::Sampler {
        match &self.sampler {
            Some(sampler) => sampler.clone(),
            None => create_default_sampler(device),
        }
    }
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    create_sampler(device, wgpu::AddressMode::Repeat, wgpu::FilterMode::Linear)
}

fn create_sampler(
    device: &wgpu::Device,
    address_mode: wgpu::AddressMode,
    mipmap_filter: wgpu::FilterMode,
) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter,
        ..Default::default()
    })
}

fn extent(width: u32, height: u32, layers: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: layers,
    }
}

fn create_2d(
    device: &wgpu::Device,
    label: &str,
    size: wgpu::Extent3d,
    mip_level_count: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

/// Write tightly packed RGBA8 texels into one mip level of one array layer.
fn upload(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    rgba: &[u8],
    [width, height]: [u32; 2],
    mip_level: u32,
    layer: u32,
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture,
            mip_level,
            origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        extent(width, height, 1),
    );
}

/// Bytes per buffer row when copying an RGBA8 texture `width` texels wide.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    (4 * width).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// A mappable buffer large enough for a copy of `texture`.
pub(crate) fn create_readback_buffer(device: &wgpu::Device, texture: &wgpu::Texture, label: &str) -> wgpu::Buffer {
    let size = texture.size();
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (padded_bytes_per_row(size.width) * size.height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}

/// Record a copy of mip level 0 of `texture` into `buffer` with padded rows.
pub(crate) fn copy_to_readback(encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture, buffer: &wgpu::Buffer) {
    let size = texture.size();
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        wgpu::TexelCopyBufferInfo {
            buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row(size.width)),
                rows_per_image: Some(size.height),
            },
        },
        size,
    );
}

/// Map `buffer` once the copy into it was submitted and strip the row padding.
pub(crate) async fn read_back(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    [width, height]: [u32; 2],
) -> Result<image::RgbaImage> {
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    let slice = buffer.slice(..);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: Some(instant::Duration::from_secs(3)),
    })?;
    rx.receive()
        .await
        .ok_or_else(|| anyhow!("readback was cancelled"))??;

    let pixels = unpad_rows(&slice.get_mapped_range(), width, height);
    buffer.unmap();
    pixels.ok_or_else(|| anyhow!("readback buffer is smaller than {width}x{height}"))
}

fn unpad_rows(data: &[u8], width: u32, height: u32) -> Option<image::RgbaImage> {
    let row = 4 * width as usize;
    let pixels = data
        .chunks(padded_bytes_per_row(width) as usize)
        .take(height as usize)
        .flat_map(|padded| padded.get(..row).unwrap_or(padded))
        .copied()
        .collect();
    image::RgbaImage::from_raw(width, height, pixels)
}
