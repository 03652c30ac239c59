//! Offscreen frame target for window-backed tests.
//!
//! With `integration-tests` enabled the frame is drawn into a [`FrameCapture`]
//! instead of the surface and read back so flows can inspect it.

use crate::{context::Context, data_structures::texture::{self, Texture}};

/// A read back frame, exactly as large as the window.
pub type CapturedFrame = image::RgbaImage;

pub(crate) struct FrameCapture {
    colour: wgpu::Texture,
    depth: wgpu::Texture,
    buffer: wgpu::Buffer,
}

impl FrameCapture {
    pub(crate) fn new(ctx: &Context) -> Self {
        let size = wgpu::Extent3d {
            width: ctx.config.width.max(1),
            height: ctx.config.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = |label: &str, format: wgpu::TextureFormat, usage: wgpu::TextureUsages| {
            ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };
        let colour = texture(
            "captured frame",
            ctx.config.format,
            wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        let depth = texture(
            "captured frame depth",
            Texture::DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        let buffer = texture::create_readback_buffer(&ctx.device, &colour, "captured frame buffer");
        Self {
            colour,
            depth,
            buffer,
        }
    }

    pub(crate) fn colour_view(&self) -> wgpu::TextureView {
        self.colour.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub(crate) fn depth_view(&self) -> wgpu::TextureView {
        self.depth.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Record the copy of the drawn frame into the readback buffer.
    pub(crate) fn copy(&self, encoder: &mut wgpu::CommandEncoder) {
        texture::copy_to_readback(encoder, &self.colour, &self.buffer);
    }

    /// Map the buffer after the copy was submitted.
    pub(crate) async fn read(&self, device: &wgpu::Device) -> anyhow::Result<CapturedFrame> {
        let size = self.colour.size();
        texture::read_back(device, &self.buffer, [size.width, size.height]).await
    }
}
