#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
async fn demo_model(ctx: &mesh_sprite::context::InitContext) -> mesh_sprite::data_structures::model::Model {
    use mesh_sprite::{data_structures::model::Model, demo::MODEL, resources::Loader};

    let resources = Loader::new()
        .add(MODEL.0, MODEL.1)
        .load()
        .await
        .expect("demo model should load");
    let mut model = Model::from_gltf(ctx, resources.gltf(MODEL.0).unwrap()).unwrap();
    model.transform.set_uniform_scale(1.8);
    model
}

#[test]
#[cfg(feature = "integration-tests")]
fn should_draw_model_inside_transparent_sprite() {
    use crate::common::test_utils::{TestRender, to_rgba8};
    use mesh_sprite::{
        context::InitContext,
        data_structures::sprite::{MeshSprite, MeshSpriteOptions, SpriteTexture},
        flow::ImageTestResult,
    };
    use wgpu::Color;

    golden_image_test!(async move |ctx: InitContext| {
        let model = demo_model(&ctx).await;
        let sprite = MeshSprite::new(&MeshSpriteOptions::default());
        let texture = SpriteTexture::new(&ctx, &sprite, "under test");
        TestRender::new(
            Some(model),
            vec![(sprite, texture)],
            |ctx| {
                ctx.clear_colour = Color::WHITE;
                ctx.camera.aspect = Some(1.0);
            },
            |ctx, state, flow, frame| {
                if state.frame() == 0 {
                    return Ok(ImageTestResult::Waiting);
                }
                let (_, texture) = &flow.sprites[0];
                let pixels = futures::executor::block_on(texture.read_pixels(ctx))?;
                assert_eq!(pixels.dimensions(), (256, 256));
                // The model covers the centre and leaves the corners empty.
                assert_eq!(pixels.get_pixel(128, 128)[3], 255);
                assert_eq!(pixels.get_pixel(0, 0)[3], 0);
                assert_eq!(pixels.get_pixel(255, 255)[3], 0);

                let background = to_rgba8(Color::WHITE);
                assert_ne!(*frame.get_pixel(128, 128), background);
                assert_eq!(*frame.get_pixel(1, 1), background);
                let (width, height) = (ctx.config.width, ctx.config.height);
                if width > 300 && height > 300 {
                    assert_eq!(*frame.get_pixel(width - 2, height - 2), background);
                }
                Ok(ImageTestResult::Passed)
            },
        )
    });
}

#[test]
#[cfg(feature = "integration-tests")]
fn sprite_that_was_never_rendered_stays_transparent() {
    use crate::common::test_utils::{TestRender, to_rgba8};
    use mesh_sprite::{
        context::InitContext,
        data_structures::sprite::{MeshSprite, MeshSpriteOptions, SpriteTexture, Tint},
        flow::ImageTestResult,
    };
    use wgpu::Color;

    golden_image_test!(async move |ctx: InitContext| {
        let model = demo_model(&ctx).await;
        let mut sprite = MeshSprite::new(&MeshSpriteOptions {
            auto_render_object: false,
            ..Default::default()
        });
        sprite.tint = Tint(0xff00ff);
        let texture = SpriteTexture::new(&ctx, &sprite, "on demand");
        TestRender::new(
            Some(model),
            vec![(sprite, texture)],
            |ctx| ctx.clear_colour = Color::WHITE,
            |ctx, state, flow, frame| {
                if state.frame() == 0 {
                    return Ok(ImageTestResult::Waiting);
                }
                let (_, texture) = &flow.sprites[0];
                let pixels = futures::executor::block_on(texture.read_pixels(ctx))?;
                assert!(pixels.pixels().all(|p| p[3] == 0));
                assert_eq!(*frame.get_pixel(128, 128), to_rgba8(Color::WHITE));
                Ok(ImageTestResult::Passed)
            },
        )
    });
}
