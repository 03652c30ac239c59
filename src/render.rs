//! Render composition for the frame.
//!
//! Flows describe what they want on screen with the [`Render`] enum. The event
//! loop flattens the renders of all flows into one batch per pipeline, in flow
//! order, so later flows and later sprites are drawn on top.

use wgpu::RenderPass;

use crate::context::Context;

/// A sprite quad ready to draw: its vertex buffer and texture/tint bind group.
#[derive(Clone, Copy, Debug)]
pub struct SpriteDraw<'a> {
    pub vertex: &'a wgpu::Buffer,
    pub group: &'a wgpu::BindGroup,
}

/// Specifies how a flow is drawn onto the frame.
///
/// - `None` renders nothing
/// - `Sprite` renders a single sprite
/// - `Sprites` renders sprites in the given order
/// - `Composed` renders its parts in order
pub enum Render<'a> {
    None,
    Sprite(SpriteDraw<'a>),
    Sprites(Vec<SpriteDraw<'a>>),
    Composed(Vec<Render<'a>>),
}

impl<'a> Render<'a> {
    /// Append the sprites of this render to `sprites` in draw order.
    pub fn collect(self, sprites: &mut Vec<SpriteDraw<'a>>) {
        match self {
            Render::Sprite(sprite) => sprites.push(sprite),
            Render::Sprites(mut vec) => sprites.append(&mut vec),
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.collect(sprites)),
            Render::None => (),
        }
    }
}

impl<'a> From<SpriteDraw<'a>> for Render<'a> {
    fn from(sprite: SpriteDraw<'a>) -> Self {
        Render::Sprite(sprite)
    }
}

/// Draw the collected sprites with the sprite pipeline.
pub(crate) fn draw_sprites<'a>(
    ctx: &Context,
    render_pass: &mut RenderPass<'_>,
    sprites: &[SpriteDraw<'a>],
) {
    if sprites.is_empty() {
        return;
    }
    render_pass.set_pipeline(&ctx.pipelines.sprite);
    for sprite in sprites {
        render_pass.set_bind_group(0, sprite.group, &[]);
        render_pass.set_vertex_buffer(0, sprite.vertex.slice(..));
        render_pass.draw(0..6, 0..1);
    }
}
