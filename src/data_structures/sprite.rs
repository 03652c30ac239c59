//! Mesh sprites: 2D quads showing a model rendered into a texture.
//!
//! A sprite is split in two halves. [`MeshSprite`] is where and how the quad
//! is drawn (position, size, tint, whether it re-renders every frame) and
//! can be animated without a GPU. [`SpriteTexture`] owns the render target the
//! model is drawn into and the buffers the sprite pipeline reads.
//!
//! Positions are in pixels with the origin at the top left of the window.

use anyhow::Context as _;
use cgmath::Vector2;
use wgpu::util::DeviceExt;

use crate::{
    context::{Context, InitContext},
    data_structures::{
        model::{DrawModel, Model},
        texture::{self, Texture},
    },
    pipelines::sprite::{SpriteVertex, mk_bind_group_layout},
    render::SpriteDraw,
};

/// Colour multiplied with the sprite texture, as `0xRRGGBB`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tint(pub u32);

impl Tint {
    pub const WHITE: Tint = Tint(0xffffff);

    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }

    /// Channels as written, in `[0, 1]`, opaque.
    pub fn srgb(self) -> [f32; 4] {
        [
            self.red() as f32 / 255.0,
            self.green() as f32 / 255.0,
            self.blue() as f32 / 255.0,
            1.0,
        ]
    }

    /// Channels converted to linear light for the shader.
    ///
    /// Sprite textures are sampled as linear and the frame is sRGB, so a
    /// linear tint darkens the sprite the same way an sRGB multiply would.
    pub fn linear(self) -> [f32; 4] {
        let [r, g, b, a] = self.srgb();
        [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b), a]
    }
}

impl Default for Tint {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<u32> for Tint {
    fn from(hex: u32) -> Self {
        Tint(hex & 0xffffff)
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshSpriteOptions {
    pub width: u32,
    pub height: u32,
    /// Re-render the model into the sprite every frame.
    pub auto_render_object: bool,
}

impl Default for MeshSpriteOptions {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            auto_render_object: true,
        }
    }
}

/// Placement and appearance of a sprite.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshSprite {
    pub position: Vector2<f32>,
    pub width: f32,
    pub height: f32,
    pub tint: Tint,
    pub auto_render_object: bool,
}

impl MeshSprite {
    pub fn new(options: &MeshSpriteOptions) -> Self {
        Self {
            position: Vector2::new(0.0, 0.0),
            width: options.width as f32,
            height: options.height as f32,
            tint: Tint::WHITE,
            auto_render_object: options.auto_render_object,
        }
    }

    pub fn size(&self) -> Vector2<f32> {
        Vector2::new(self.width, self.height)
    }

    /// Two triangles covering the sprite, in normalized device coordinates.
    pub fn quad(&self, viewport: Vector2<f32>) -> [SpriteVertex; 6] {
        let w = viewport.x.max(1.0);
        let h = viewport.y.max(1.0);
        let left = self.position.x / w * 2.0 - 1.0;
        let right = (self.position.x + self.width) / w * 2.0 - 1.0;
        let top = 1.0 - self.position.y / h * 2.0;
        let bottom = 1.0 - (self.position.y + self.height) / h * 2.0;

        let top_left = SpriteVertex {
            position: [left, top],
            tex_coords: [0.0, 0.0],
        };
        let bottom_left = SpriteVertex {
            position: [left, bottom],
            tex_coords: [0.0, 1.0],
        };
        let bottom_right = SpriteVertex {
            position: [right, bottom],
            tex_coords: [1.0, 1.0],
        };
        let top_right = SpriteVertex {
            position: [right, top],
            tex_coords: [1.0, 0.0],
        };
        [top_left, bottom_left, bottom_right, top_left, bottom_right, top_right]
    }
}

/// Render target and draw resources of one sprite.
#[derive(Debug)]
pub struct SpriteTexture {
    pub label: String,
    pub target: Texture,
    pub depth: Texture,
    vertex_buffer: wgpu::Buffer,
    tint_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl SpriteTexture {
    pub fn new(ctx: &InitContext, sprite: &MeshSprite, label: &str) -> Self {
        let device = &ctx.device;
        if sprite.width < 1.0 || sprite.height < 1.0 {
            log::warn!(
                "Sprite {label} is {}x{}; its texture is clamped to at least one pixel",
                sprite.width,
                sprite.height
            );
        }
        let size = [sprite.width.max(1.0) as u32, sprite.height.max(1.0) as u32];
        let target = Texture::create_render_target(device, size, &format!("{label} target"));
        let depth = Texture::create_depth_texture(device, size, &format!("{label} depth"));

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(&sprite.quad(Vector2::new(1.0, 1.0))),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let tint_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Tint Buffer")),
            contents: bytemuck::cast_slice(&sprite.tint.linear()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let sampler = target.sampler_or_default(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &mk_bind_group_layout(device),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: tint_buffer.as_entire_binding(),
                },
            ],
            label: Some(label),
        });

        Self {
            label: label.to_string(),
            target,
            depth,
            vertex_buffer,
            tint_buffer,
            bind_group,
        }
    }

    pub fn size(&self) -> [u32; 2] {
        let size = self.target.texture.size();
        [size.width, size.height]
    }

    pub fn aspect(&self) -> f32 {
        let [width, height] = self.size();
        width as f32 / height as f32
    }

    /// Upload the sprite's quad and tint for the given viewport.
    pub fn write_sprite(&self, queue: &wgpu::Queue, sprite: &MeshSprite, viewport: Vector2<f32>) {
        queue.write_buffer(
            &self.vertex_buffer,
            0,
            bytemuck::cast_slice(&sprite.quad(viewport)),
        );
        queue.write_buffer(&self.tint_buffer, 0, bytemuck::cast_slice(&sprite.tint.linear()));
    }

    /// Render `model` into this texture now, with the context's camera and lighting.
    ///
    /// The texture is cleared to transparent first, so anything the model does
    /// not cover shows what is behind the sprite.
    pub fn render_object(&self, ctx: &Context, model: &Model) {
        ctx.camera_resources
            .write(&ctx.queue, &ctx.camera, self.aspect());
        model.write_buffers(&ctx.queue);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sprite Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sprite Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&ctx.pipelines.mesh);
            render_pass.draw_model(
                model,
                &ctx.camera_resources.bind_group,
                &ctx.lighting().bind_group,
            );
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    pub fn draw(&self) -> SpriteDraw<'_> {
        SpriteDraw {
            vertex: &self.vertex_buffer,
            group: &self.bind_group,
        }
    }

    /// Copy the rendered pixels back to the CPU.
    pub async fn read_pixels(&self, ctx: &Context) -> anyhow::Result<image::RgbaImage> {
        let buffer = texture::create_readback_buffer(
            &ctx.device,
            &self.target.texture,
            &format!("{} readback", self.label),
        );
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sprite Readback Encoder"),
            });
        texture::copy_to_readback(&mut encoder, &self.target.texture, &buffer);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        texture::read_back(&ctx.device, &buffer, self.size())
            .await
            .with_context(|| format!("reading back {}", self.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tint_splits_hex_channels() {
        let green = Tint(0x00ff22);
        assert_eq!((green.red(), green.green(), green.blue()), (0x00, 0xff, 0x22));
        assert_eq!(Tint(0xff00ff).srgb(), [1.0, 0.0, 1.0, 1.0]);
        assert_eq!(Tint::from(0xff123456), Tint(0x123456));
    }

    #[test]
    fn linear_tint_keeps_extremes_and_darkens_midtones() {
        let [r, g, b, a] = Tint(0x00ff22).linear();
        assert_eq!(r, 0.0);
        assert!((g - 1.0).abs() < 1e-6);
        assert!(b > 0.0 && b < 0x22 as f32 / 255.0, "{b}");
        assert_eq!(a, 1.0);
    }

    #[test]
    fn default_options_are_auto_rendered_256_squares() {
        let sprite = MeshSprite::new(&MeshSpriteOptions::default());
        assert_eq!(sprite.size(), Vector2::new(256.0, 256.0));
        assert!(sprite.auto_render_object);
        assert_eq!(sprite.tint, Tint::WHITE);
    }

    #[test]
    fn quad_maps_pixels_to_device_coordinates() {
        let mut sprite = MeshSprite::new(&MeshSpriteOptions {
            width: 100,
            height: 50,
            auto_render_object: false,
        });
        sprite.position = Vector2::new(100.0, 50.0);
        let quad = sprite.quad(Vector2::new(400.0, 200.0));

        let top_left = quad[0];
        let bottom_right = quad[2];
        assert_eq!(top_left.position, [-0.5, 0.5]);
        assert_eq!(top_left.tex_coords, [0.0, 0.0]);
        assert_eq!(bottom_right.position, [0.0, 0.0]);
        assert_eq!(bottom_right.tex_coords, [1.0, 1.0]);
        assert_eq!(quad[3], top_left);
        assert_eq!(quad[4], bottom_right);
    }

    #[test]
    fn quad_covering_viewport_spans_device_space() {
        let sprite = MeshSprite::new(&MeshSpriteOptions::default());
        let quad = sprite.quad(Vector2::new(256.0, 256.0));
        assert_eq!(quad[0].position, [-1.0, 1.0]);
        assert_eq!(quad[2].position, [1.0, -1.0]);
        assert_eq!(quad[5].position, [1.0, 1.0]);
    }
}
