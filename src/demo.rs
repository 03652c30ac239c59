//! Two sprites showing the same model.
//!
//! The first sprite re-renders the model every frame and bounces around the
//! window. The second one, at the top left, only re-renders when the window
//! is clicked or touched. The model turns one degree around Y per frame, so a
//! click freezes its current pose into the second sprite.

use std::pin::Pin;

use cgmath::Vector2;

use crate::{
    bounce::Bounce,
    context::{BufferWriter, Context, InitContext},
    data_structures::{
        instance::Instance,
        model::Model,
        sprite::{MeshSprite, MeshSpriteOptions, SpriteTexture, Tint},
    },
    flow::{FlowConstructor, GraphicsFlow, Out},
    lighting::{ImageBasedLighting, LightingEnvironment},
    render::Render,
    resources::Loader,
};

type FlowFuture = Pin<Box<dyn Future<Output = Box<dyn GraphicsFlow<(), ()>>>>>;

pub const INSTRUCTIONS: &str = "Click to render object and update texture for sprite at top left";

pub const DIFFUSE_CUBEMAP: (&str, &str) = ("diffuse.cubemap", "environments/autumn/diffuse.cubemap");
pub const SPECULAR_CUBEMAP: (&str, &str) =
    ("specular.cubemap", "environments/autumn/specular.cubemap");
pub const MODEL: (&str, &str) = ("orb.gltf", "models/orb/orb.gltf");

pub const MODEL_SCALE: f32 = 1.8;
pub const METALLIC: f32 = 0.0;
pub const ROUGHNESS: f32 = 0.5;
pub const BACKGROUND: Tint = Tint(0xdddddd);

/// Renders the model into a sprite's texture.
pub trait ObjectRenderer {
    /// Render the model, placed by `transform`, into sprite number `sprite`.
    fn render_object(&mut self, sprite: usize, transform: &Instance);
}

/// Everything the demo animates, without GPU resources.
#[derive(Clone, Debug, PartialEq)]
pub struct SpriteScene {
    pub sprites: Vec<MeshSprite>,
    pub transform: Instance,
    pub bounce: Bounce,
    /// Y rotation of the model in degrees, applied on the next frame.
    pub rotation: f32,
}

impl SpriteScene {
    /// Re-rendered and moved every frame.
    pub const BOUNCING: usize = 0;
    /// Re-rendered on pointer-down only.
    pub const ON_DEMAND: usize = 1;

    pub fn new() -> Self {
        let mut bouncing = MeshSprite::new(&MeshSpriteOptions::default());
        bouncing.tint = Tint(0x00ff22);
        let mut on_demand = MeshSprite::new(&MeshSpriteOptions {
            auto_render_object: false,
            ..Default::default()
        });
        on_demand.tint = Tint(0xff00ff);

        let mut transform = Instance::new();
        transform.set_uniform_scale(MODEL_SCALE);

        Self {
            sprites: vec![bouncing, on_demand],
            transform,
            bounce: Bounce::default(),
            rotation: 0.0,
        }
    }

    /// Render the on-demand sprite once.
    pub fn pointer_down(&mut self, renderer: &mut impl ObjectRenderer) {
        renderer.render_object(Self::ON_DEMAND, &self.transform);
    }

    /// Advance one frame: turn the model, move the bouncing sprite inside
    /// `viewport` and re-render every auto-rendered sprite.
    pub fn frame(&mut self, viewport: Vector2<f32>, renderer: &mut impl ObjectRenderer) {
        self.transform.set_euler_angles(0.0, self.rotation, 0.0);
        self.rotation = (self.rotation + 1.0) % 360.0;

        if let Some(sprite) = self.sprites.get_mut(Self::BOUNCING) {
            let size = sprite.size();
            self.bounce.step(&mut sprite.position, size, viewport);
        }

        for (index, sprite) in self.sprites.iter().enumerate() {
            if sprite.auto_render_object {
                renderer.render_object(index, &self.transform);
            }
        }
    }
}

impl Default for SpriteScene {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders into the sprite textures on the GPU.
struct SpriteRenderer<'a> {
    ctx: &'a Context,
    model: &'a mut Model,
    textures: &'a [SpriteTexture],
}

impl ObjectRenderer for SpriteRenderer<'_> {
    fn render_object(&mut self, sprite: usize, transform: &Instance) {
        let Some(texture) = self.textures.get(sprite) else {
            log::warn!("No texture for sprite {}", sprite);
            return;
        };
        self.model.transform = transform.clone();
        texture.render_object(self.ctx, &*self.model);
    }
}

pub struct MeshSpriteDemo {
    scene: SpriteScene,
    model: Model,
    textures: Vec<SpriteTexture>,
    // Moved into the context by `on_init`.
    lighting: Option<LightingEnvironment>,
}

impl MeshSpriteDemo {
    pub async fn new(ctx: InitContext) -> anyhow::Result<Self> {
        use anyhow::Context as _;

        let resources = Loader::new()
            .add(DIFFUSE_CUBEMAP.0, DIFFUSE_CUBEMAP.1)
            .add(SPECULAR_CUBEMAP.0, SPECULAR_CUBEMAP.1)
            .add(MODEL.0, MODEL.1)
            .load()
            .await?;

        let scene = SpriteScene::new();

        let mut model = Model::from_gltf(&ctx, resources.gltf(MODEL.0)?)
            .with_context(|| format!("creating model from {}", MODEL.0))?;
        model.transform = scene.transform.clone();
        for mesh in model.meshes.iter_mut() {
            mesh.material.metallic = METALLIC;
            mesh.material.roughness = ROUGHNESS;
        }

        let image_based_lighting = ImageBasedLighting::new(
            &ctx,
            resources.cubemap(DIFFUSE_CUBEMAP.0)?,
            resources.cubemap(SPECULAR_CUBEMAP.0)?,
        )
        .context("creating image based lighting")?;
        let lighting = LightingEnvironment::new(&ctx, image_based_lighting);

        let textures = scene
            .sprites
            .iter()
            .enumerate()
            .map(|(i, sprite)| SpriteTexture::new(&ctx, sprite, &format!("sprite {}", i + 1)))
            .collect();

        log::info!("Mesh sprite demo set up with {} meshes", model.meshes.len());
        Ok(Self {
            scene,
            model,
            textures,
            lighting: Some(lighting),
        })
    }

    pub fn constructor() -> FlowConstructor<(), ()> {
        Box::new(|ctx: InitContext| -> FlowFuture {
            Box::pin(async move {
                match MeshSpriteDemo::new(ctx).await {
                    Ok(demo) => Box::new(demo) as Box<dyn GraphicsFlow<(), ()>>,
                    Err(e) => {
                        log::error!("{:#}", e);
                        panic!("Cannot set up the mesh sprite demo: {:#}", e)
                    }
                }
            })
        })
    }

    fn write_sprites(&self, ctx: &Context) {
        let viewport = ctx.viewport();
        for (sprite, texture) in self.scene.sprites.iter().zip(&self.textures) {
            texture.write_sprite(&ctx.queue, sprite, viewport);
        }
    }
}

impl GraphicsFlow<(), ()> for MeshSpriteDemo {
    fn on_init(&mut self, ctx: &mut Context, _: &mut ()) -> Out<(), ()> {
        let [r, g, b, a] = BACKGROUND.linear();
        ctx.clear_colour = wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        };
        // The sprites are square
        ctx.camera.aspect = Some(1.0);
        if let Some(lighting) = self.lighting.take() {
            ctx.lighting = Some(lighting);
        }
        ctx.window().set_title(INSTRUCTIONS);
        log::info!("{}", INSTRUCTIONS);

        self.model.write_to_buffer(ctx);
        self.write_sprites(ctx);
        Out::Empty
    }

    fn on_pointer_down(&mut self, ctx: &Context, _: &mut ()) -> Out<(), ()> {
        log::debug!("Pointer down at {:?}", ctx.mouse.coords);
        let mut renderer = SpriteRenderer {
            ctx,
            model: &mut self.model,
            textures: &self.textures,
        };
        self.scene.pointer_down(&mut renderer);
        Out::Empty
    }

    fn on_update(&mut self, ctx: &Context, _: &mut (), _: instant::Duration) -> Out<(), ()> {
        let mut renderer = SpriteRenderer {
            ctx,
            model: &mut self.model,
            textures: &self.textures,
        };
        self.scene.frame(ctx.viewport(), &mut renderer);
        self.write_sprites(ctx);
        Out::Empty
    }

    fn on_device_events(&mut self, _: &Context, _: &mut (), _: &winit::event::DeviceEvent) -> Out<(), ()> {
        Out::Empty
    }

    fn on_window_events(&mut self, _: &Context, _: &mut (), _: &winit::event::WindowEvent) -> Out<(), ()> {
        Out::Empty
    }

    fn on_custom_events(&mut self, _: &Context, _: &mut (), event: ()) -> Option<()> {
        Some(event)
    }

    fn on_render(&self) -> Render<'_> {
        Render::Sprites(self.textures.iter().map(SpriteTexture::draw).collect())
    }

    #[cfg(feature = "integration-tests")]
    fn render_to_texture(
        &self,
        _: &Context,
        _: &mut (),
        _: &mut crate::capture::CapturedFrame,
    ) -> anyhow::Result<crate::flow::ImageTestResult> {
        Ok(crate::flow::ImageTestResult::Passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Quaternion;

    /// Records every render request.
    #[derive(Default)]
    struct Recorder {
        renders: Vec<(usize, Quaternion<f32>)>,
    }

    impl Recorder {
        fn count(&self, sprite: usize) -> usize {
            self.renders.iter().filter(|(s, _)| *s == sprite).count()
        }
    }

    impl ObjectRenderer for Recorder {
        fn render_object(&mut self, sprite: usize, transform: &Instance) {
            self.renders.push((sprite, transform.rotation));
        }
    }

    fn viewport() -> Vector2<f32> {
        Vector2::new(800.0, 600.0)
    }

    #[test]
    fn scene_matches_demo_setup() {
        let scene = SpriteScene::new();
        let [bouncing, on_demand] = &scene.sprites[..] else {
            panic!("expected two sprites");
        };
        assert!(bouncing.auto_render_object);
        assert!(!on_demand.auto_render_object);
        assert_eq!(bouncing.tint, Tint(0x00ff22));
        assert_eq!(on_demand.tint, Tint(0xff00ff));
        assert_eq!(bouncing.size(), on_demand.size());
        assert_eq!(scene.transform.scale, cgmath::Vector3::new(1.8, 1.8, 1.8));
    }

    #[test]
    fn each_frame_renders_only_the_bouncing_sprite() {
        let mut scene = SpriteScene::new();
        let mut recorder = Recorder::default();
        for _ in 0..10 {
            scene.frame(viewport(), &mut recorder);
        }
        assert_eq!(recorder.count(SpriteScene::BOUNCING), 10);
        assert_eq!(recorder.count(SpriteScene::ON_DEMAND), 0);
    }

    #[test]
    fn every_pointer_down_renders_the_on_demand_sprite_once() {
        let mut scene = SpriteScene::new();
        let mut recorder = Recorder::default();
        scene.frame(viewport(), &mut recorder);
        scene.pointer_down(&mut recorder);
        scene.pointer_down(&mut recorder);
        scene.frame(viewport(), &mut recorder);
        scene.pointer_down(&mut recorder);

        assert_eq!(recorder.count(SpriteScene::ON_DEMAND), 3);
        assert_eq!(recorder.count(SpriteScene::BOUNCING), 2);
    }

    #[test]
    fn pointer_down_captures_the_current_pose() {
        let mut scene = SpriteScene::new();
        let mut recorder = Recorder::default();
        for _ in 0..5 {
            scene.frame(viewport(), &mut recorder);
        }
        scene.pointer_down(&mut recorder);

        let (_, last_frame) = recorder.renders[4];
        let (sprite, clicked) = recorder.renders[5];
        assert_eq!(sprite, SpriteScene::ON_DEMAND);
        assert_eq!(clicked, last_frame);
    }

    #[test]
    fn rotation_starts_at_zero_and_advances_one_degree() {
        let mut scene = SpriteScene::new();
        let mut recorder = Recorder::default();
        scene.frame(viewport(), &mut recorder);
        assert_eq!(scene.transform.rotation, Instance::new().rotation);
        assert_eq!(scene.rotation, 1.0);

        scene.frame(viewport(), &mut recorder);
        let mut expected = Instance::new();
        expected.set_euler_angles(0.0, 1.0, 0.0);
        assert_eq!(scene.transform.rotation, expected.rotation);
    }

    #[test]
    fn rotation_wraps_after_a_full_turn() {
        let mut scene = SpriteScene::new();
        let mut recorder = Recorder::default();
        for _ in 0..360 {
            scene.frame(viewport(), &mut recorder);
        }
        assert_eq!(scene.rotation, 0.0);
    }

    #[test]
    fn only_the_bouncing_sprite_moves() {
        let mut scene = SpriteScene::new();
        let mut recorder = Recorder::default();
        scene.frame(viewport(), &mut recorder);
        scene.frame(viewport(), &mut recorder);
        assert_eq!(scene.sprites[SpriteScene::BOUNCING].position, Vector2::new(2.0, 4.0));
        assert_eq!(scene.sprites[SpriteScene::ON_DEMAND].position, Vector2::new(0.0, 0.0));
    }

    #[test]
    fn bouncing_sprite_stays_inside_a_small_window() {
        let mut scene = SpriteScene::new();
        let mut recorder = Recorder::default();
        let viewport = Vector2::new(300.0, 270.0);
        for _ in 0..500 {
            scene.frame(viewport, &mut recorder);
            let sprite = &scene.sprites[SpriteScene::BOUNCING];
            assert!(sprite.position.x >= 0.0 && sprite.position.x + sprite.width <= viewport.x);
            assert!(sprite.position.y >= 0.0 && sprite.position.y + sprite.height <= viewport.y);
        }
    }
}
