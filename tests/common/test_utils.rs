#![allow(dead_code)]

#[cfg(feature = "integration-tests")]
use mesh_sprite::{
    context::Context,
    data_structures::{
        model::Model,
        sprite::{MeshSprite, SpriteTexture},
    },
    flow::{GraphicsFlow, ImageTestResult, Out},
    render::Render,
};

/// Counts lifecycle hook invocations.
pub(crate) struct State {
    frame_counter: u32,
    init_invocations: u32,
    pointer_down_invocations: u32,
    update_invocations: u32,
    pub dummy_state: String,
}

impl State {
    pub fn new() -> Self {
        Self {
            frame_counter: 0,
            init_invocations: 0,
            pointer_down_invocations: 0,
            update_invocations: 0,
            dummy_state: String::new(),
        }
    }

    pub fn frame(&mut self) {
        self.frame_counter += 1;
    }

    pub fn init(&mut self) {
        self.init_invocations += 1;
    }

    pub fn pointer_down(&mut self) {
        self.pointer_down_invocations += 1;
    }

    pub fn update(&mut self) {
        self.update_invocations += 1;
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    pub fn init_invocations(&self) -> u32 {
        self.init_invocations
    }

    pub fn update_invocations(&self) -> u32 {
        self.update_invocations
    }

    pub fn pointer_down_invocations(&self) -> u32 {
        self.pointer_down_invocations
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub(crate) struct FrameCounter(pub(crate) u32);

impl FrameCounter {
    pub(crate) fn frame(&self) -> u32 {
        self.0
    }

    pub(crate) fn progress(&mut self) {
        self.0 += 1;
    }
}

#[cfg(feature = "integration-tests")]
pub(crate) use mesh_sprite::capture::CapturedFrame as Frame;

#[cfg(feature = "integration-tests")]
pub(crate) type Validate = Box<
    dyn Fn(&Context, &mut FrameCounter, &TestRender, &mut Frame) -> anyhow::Result<ImageTestResult>,
>;

/// A flow that renders `model` once into every sprite during init, draws the
/// sprites each frame and hands the frame to `validate`.
#[cfg(feature = "integration-tests")]
pub(crate) struct TestRender {
    pub(crate) model: Option<Model>,
    pub(crate) sprites: Vec<(MeshSprite, SpriteTexture)>,
    setup: Box<dyn Fn(&mut Context)>,
    validate: Validate,
}

#[cfg(feature = "integration-tests")]
impl TestRender {
    pub(crate) fn new(
        model: Option<Model>,
        sprites: Vec<(MeshSprite, SpriteTexture)>,
        setup: impl Fn(&mut Context) + 'static,
        validate: impl Fn(&Context, &mut FrameCounter, &TestRender, &mut Frame) -> anyhow::Result<ImageTestResult>
            + 'static,
    ) -> Self {
        Self {
            model,
            sprites,
            setup: Box::new(setup),
            validate: Box::new(validate),
        }
    }
}

#[cfg(feature = "integration-tests")]
impl GraphicsFlow<FrameCounter, ()> for TestRender {
    fn on_init(&mut self, ctx: &mut Context, _: &mut FrameCounter) -> Out<FrameCounter, ()> {
        (self.setup)(ctx);
        let viewport = ctx.viewport();
        for (sprite, texture) in &self.sprites {
            texture.write_sprite(&ctx.queue, sprite, viewport);
            if let (Some(model), true) = (&self.model, sprite.auto_render_object) {
                texture.render_object(ctx, model);
            }
        }
        Out::Empty
    }

    fn on_pointer_down(&mut self, _: &Context, _: &mut FrameCounter) -> Out<FrameCounter, ()> {
        Out::Empty
    }

    fn on_update(
        &mut self,
        _: &Context,
        state: &mut FrameCounter,
        _: std::time::Duration,
    ) -> Out<FrameCounter, ()> {
        state.progress();
        Out::Empty
    }

    fn on_device_events(
        &mut self,
        _: &Context,
        _: &mut FrameCounter,
        _: &mesh_sprite::DeviceEvent,
    ) -> Out<FrameCounter, ()> {
        Out::Empty
    }

    fn on_window_events(
        &mut self,
        _: &Context,
        _: &mut FrameCounter,
        _: &mesh_sprite::WindowEvent,
    ) -> Out<FrameCounter, ()> {
        Out::Empty
    }

    fn on_custom_events(&mut self, _: &Context, _: &mut FrameCounter, event: ()) -> Option<()> {
        Some(event)
    }

    fn on_render(&self) -> Render<'_> {
        Render::Composed(
            self.sprites
                .iter()
                .map(|(_, texture)| texture.draw().into())
                .collect(),
        )
    }

    fn render_to_texture(
        &self,
        ctx: &Context,
        state: &mut FrameCounter,
        texture: &mut Frame,
    ) -> anyhow::Result<ImageTestResult> {
        (self.validate)(ctx, state, self, texture)
    }
}

pub(crate) fn to_rgba8(colour: wgpu::Color) -> image::Rgba<u8> {
    let f_to_u8 = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    image::Rgba([
        f_to_u8(colour.r),
        f_to_u8(colour.g),
        f_to_u8(colour.b),
        f_to_u8(colour.a),
    ])
}

#[macro_export]
macro_rules! golden_image_test {
    ($graphics_elem:expr) => {{
        use crate::common::test_utils::FrameCounter;
        use mesh_sprite::flow::{FlowConstructor, GraphicsFlow};
        use std::{future::Future, pin::Pin};

        let constructor: FlowConstructor<FrameCounter, ()> = Box::new(
            |ctx| -> Pin<Box<dyn Future<Output = Box<dyn GraphicsFlow<FrameCounter, ()>>>>> {
                Box::pin(async move {
                    let g_flow: Box<dyn GraphicsFlow<FrameCounter, ()>> =
                        Box::new(($graphics_elem)(ctx).await);
                    g_flow
                })
            },
        );

        mesh_sprite::flow::run(vec![constructor])
            .expect("Failed to run flow for integration test.");
    }};
}
