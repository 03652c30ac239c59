use std::{cell::Cell, sync::Arc};

use winit::{dpi::PhysicalPosition, window::Window};

use crate::{
    camera::{Camera, CameraResources},
    data_structures::texture,
    lighting::{ImageBasedLighting, LightingEnvironment},
    pipelines::Pipelines,
};

/// Everything needed to render: GPU handles, the surface, and the camera and
/// lighting models are rendered with.
#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: texture::Texture,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub pipelines: Pipelines,
    pub camera: Camera,
    pub camera_resources: CameraResources,
    /// Lighting used when a model is rendered; `None` renders with neutral grey light.
    pub lighting: Option<LightingEnvironment>,
    neutral_lighting: LightingEnvironment,
    warned_unlit: Cell<bool>,
    pub clear_colour: wgpu::Color,
    pub mouse: MouseState,
}

impl Context {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // The instance is a handle to our GPU
        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
            })
            .await?;

        log::info!("Surface");
        let surface_caps = surface.get_capabilities(&adapter);
        // Sprite colours assume an sRGB frame; other formats come out darker.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("surface supports no texture format"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let camera_resources = CameraResources::new(&device);
        let pipelines = Pipelines::new(&device, surface_format, &camera_resources.bind_group_layout);

        let depth_texture = texture::Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            "depth_texture",
        );

        let init = InitContext {
            device: device.clone(),
            queue: queue.clone(),
            surface_format,
        };
        let neutral_lighting = LightingEnvironment::new(&init, ImageBasedLighting::neutral(&init)?);

        Ok(Self {
            window,
            depth_texture,
            surface,
            device,
            queue,
            config,
            pipelines,
            camera: Camera::default(),
            camera_resources,
            lighting: None,
            neutral_lighting,
            warned_unlit: Cell::new(false),
            clear_colour: wgpu::Color::BLACK,
            mouse: MouseState::default(),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Surface size in pixels.
    pub fn viewport(&self) -> cgmath::Vector2<f32> {
        cgmath::Vector2::new(self.config.width as f32, self.config.height as f32)
    }

    /// The installed lighting, or neutral light if none was installed.
    pub fn lighting(&self) -> &LightingEnvironment {
        match &self.lighting {
            Some(lighting) => lighting,
            None => {
                if !self.warned_unlit.replace(true) {
                    log::warn!("No lighting environment installed; rendering with neutral light");
                }
                &self.neutral_lighting
            }
        }
    }
}

/// Write CPU-side changes of `self` to its GPU buffers.
pub trait BufferWriter {
    fn write_to_buffer(&mut self, ctx: &Context);
}

/// Last known pointer position in physical pixels.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MouseState {
    pub coords: PhysicalPosition<f64>,
}

/// What async flow constructors get to create GPU resources before the flow exists.
///
/// Device and queue are reference counted, so this is cheap to clone.
#[derive(Debug, Clone)]
pub struct InitContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface_format: wgpu::TextureFormat,
}

impl From<&Context> for InitContext {
    fn from(ctx: &Context) -> Self {
        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            surface_format: ctx.config.format,
        }
    }
}
