//! Flow control and application event loop.
//!
//! A "flow" is a self-contained piece of application behaviour: it reacts to
//! input, updates its state every frame and tells the engine what to draw.
//! The engine owns the window and GPU context, forwards events to all flows
//! in order and composes their renders.
//!
//! # User-facing types
//!
//! - [`GraphicsFlow<S, E>`] is the trait flows implement
//! - [`Out<S, E>`] is what a hook returns to ask for async work, context changes or exit
//! - [`FlowConstructor<S, E>`] builds a flow asynchronously, e.g. after loading assets
//!
//! # Lifecycle
//!
//! Each frame:
//! 1. Window and device events are passed to `on_<window/device/custom>_event(s)`;
//!    a left click or touch also triggers `on_pointer_down`
//! 2. `on_update` runs on all flows
//! 3. `on_render` of all flows is collected and drawn in flow order
//! 4. The frame is presented

use std::{fmt::Debug, iter, pin::Pin, sync::Arc};

use instant::{Duration, Instant};

#[cfg(feature = "integration-tests")]
use tokio::runtime::Runtime;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalPosition,
    event::{DeviceEvent, DeviceId, ElementState, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::Window,
};

#[cfg(feature = "integration-tests")]
use crate::capture::{CapturedFrame, FrameCapture};
use crate::{
    context::{Context, InitContext},
    data_structures::texture::Texture,
    render::{SpriteDraw, draw_sprites},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// What a hook hands back to the engine.
///
/// - `FutEvent` futures resolve to events that are queued and later passed to
///   `on_custom_events` of every flow until one consumes them
/// - `FutFn` futures resolve to mutations applied to the shared state
/// - `Configure` changes the context, e.g. camera, lighting or clear colour
/// - `Exit` closes the application after the current event
/// - `Empty` asks for nothing
///
/// Natively the futures are awaited on the engine's tokio runtime before the
/// hook call returns; on the web they are spawned and delivered later.
pub enum Out<S, E> {
    FutEvent(Vec<Box<dyn Future<Output = E>>>),
    FutFn(Vec<Box<dyn Future<Output = Box<dyn FnOnce(&mut S)>>>>),
    Configure(Box<dyn FnOnce(&mut Context)>),
    Exit,
    Empty,
}

impl<S, E> Default for Out<S, E> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<S, E> Debug for Out<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Out::FutEvent(futures) => write!(f, "FutEvent({} futures)", futures.len()),
            Out::FutFn(futures) => write!(f, "FutFn({} futures)", futures.len()),
            Out::Configure(_) => f.write_str("Configure(|&mut Context| {...})"),
            Out::Exit => f.write_str("Exit"),
            Out::Empty => f.write_str("Empty"),
        }
    }
}

#[cfg(feature = "integration-tests")]
pub enum ImageTestResult {
    Passed,
    Waiting,
    Failed,
}

/// One piece of application behaviour driven by the engine.
///
/// `on_init` runs once after the window and GPU exist. Input reaches
/// `on_window_events`, `on_device_events` and, for presses, `on_pointer_down`.
/// Every frame `on_update` runs first and `on_render` is collected after.
pub trait GraphicsFlow<S, E> {
    /// Runs once before the first frame; the only hook with a mutable context.
    fn on_init(&mut self, ctx: &mut Context, state: &mut S) -> Out<S, E>;

    /// React to a press of any mouse button or the start of a touch.
    ///
    /// Called once per press, before the next frame. The pointer position is
    /// in `ctx.mouse.coords`.
    fn on_pointer_down(&mut self, ctx: &Context, state: &mut S) -> Out<S, E>;

    /// Advance by one frame; `dt` is the time since the previous one.
    fn on_update(&mut self, ctx: &Context, state: &mut S, dt: Duration) -> Out<S, E>;

    fn on_device_events(&mut self, ctx: &Context, state: &mut S, event: &DeviceEvent) -> Out<S, E>;

    fn on_window_events(&mut self, ctx: &Context, state: &mut S, event: &WindowEvent) -> Out<S, E>;

    /// Consume an event produced by `Out::FutEvent`, or return it for the
    /// next flow.
    fn on_custom_events(&mut self, ctx: &Context, state: &mut S, event: E) -> Option<E>;

    /// What to draw this frame. Later flows draw on top of earlier ones.
    fn on_render(&self) -> crate::render::Render<'_>;

    /// Inspect the captured frame. The run ends once every flow returns `Passed`.
    #[cfg(feature = "integration-tests")]
    fn render_to_texture(
        &self,
        ctx: &Context,
        state: &mut S,
        frame: &mut CapturedFrame,
    ) -> anyhow::Result<ImageTestResult>;
}

// FlowEvent::Initialized carries flows and needs Debug for the event loop proxy
impl<State, Event> Debug for dyn GraphicsFlow<State, Event> + 'static {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GraphicsFlow")
    }
}

/// Builds a flow once the GPU exists, e.g. after loading its assets.
pub type FlowConstructor<S, E> =
    Box<dyn FnOnce(InitContext) -> Pin<Box<dyn Future<Output = Box<dyn GraphicsFlow<S, E>>>>>>;

/// Application state bundle: GPU context, app state, and surface status.
#[derive(Debug)]
pub struct AppState<State: 'static> {
    pub(crate) ctx: Context,
    state: State,
    is_surface_configured: bool,
}

impl<State: Default> AppState<State> {
    async fn new(window: Arc<Window>) -> Self {
        let ctx = match Context::new(window).await {
            Ok(ctx) => ctx,
            Err(e) => panic!(
                "App initialization failed. Cannot create the main context: {:#}",
                e
            ),
        };
        Self {
            ctx,
            state: State::default(),
            is_surface_configured: false,
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.ctx.config.width = width;
        self.ctx.config.height = height;
        self.ctx.surface.configure(&self.ctx.device, &self.ctx.config);
        self.ctx.depth_texture =
            Texture::create_depth_texture(&self.ctx.device, [width, height], "depth_texture");
        self.is_surface_configured = true;
    }

    /// Clear the frame and draw the renders of all flows in flow order.
    fn draw_flows<Event>(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        graphics_flows: &[Box<dyn GraphicsFlow<State, Event>>],
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Frame Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.ctx.clear_colour),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        let mut sprites: Vec<SpriteDraw> = Vec::new();
        for flow in graphics_flows {
            flow.on_render().collect(&mut sprites);
        }
        draw_sprites(&self.ctx, &mut render_pass, &sprites);
    }

    fn render<Event>(
        &mut self,
        graphics_flows: &mut [Box<dyn GraphicsFlow<State, Event>>],
        #[cfg(feature = "integration-tests")] async_runtime: &Runtime,
        #[cfg(feature = "integration-tests")] proxy: &winit::event_loop::EventLoopProxy<
            FlowEvent<State, Event>,
        >,
    ) -> Result<(), wgpu::SurfaceError> {
        // keeps the redraw loop going
        self.ctx.window.request_redraw();

        if !self.is_surface_configured {
            return Ok(());
        }

        let output = self.ctx.surface.get_current_texture()?;
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        #[cfg(not(feature = "integration-tests"))]
        {
            let view = output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            self.draw_flows(&mut encoder, &view, &self.ctx.depth_texture.view, graphics_flows);
            self.ctx.queue.submit(iter::once(encoder.finish()));
        }

        #[cfg(feature = "integration-tests")]
        {
            let capture = FrameCapture::new(&self.ctx);
            self.draw_flows(
                &mut encoder,
                &capture.colour_view(),
                &capture.depth_view(),
                graphics_flows,
            );
            capture.copy(&mut encoder);
            self.ctx.queue.submit(iter::once(encoder.finish()));

            let mut frame = match async_runtime.block_on(capture.read(&self.ctx.device)) {
                Ok(frame) => frame,
                Err(e) => panic!("Cannot read back the frame: {:#}", e),
            };
            let mut all_passed = true;
            for flow in graphics_flows.iter_mut() {
                match flow.render_to_texture(&self.ctx, &mut self.state, &mut frame) {
                    Ok(ImageTestResult::Passed) => {}
                    Ok(ImageTestResult::Waiting) => all_passed = false,
                    Ok(ImageTestResult::Failed) => panic!("Image assertion failed"),
                    Err(e) => panic!("{:#}", e),
                }
            }
            if all_passed && proxy.send_event(FlowEvent::Exit).is_err() {
                log::error!("All image assertions passed but the event loop is already closed");
            }
        }

        output.present();
        Ok(())
    }
}

pub struct App<State: 'static, Event: 'static> {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: winit::event_loop::EventLoopProxy<FlowEvent<State, Event>>,
    state: Option<AppState<State>>,
    // This will hold the fully initialized flows once they are ready.
    graphics_flows: Vec<Box<dyn GraphicsFlow<State, Event>>>,
    // Taken once the window exists.
    constructors: Option<Vec<FlowConstructor<State, Event>>>,
    last_time: Instant,
}

impl<State, Event> App<State, Event>
where
    State: 'static,
    Event: 'static,
{
    fn new(
        event_loop: &EventLoop<FlowEvent<State, Event>>,
        constructors: Vec<FlowConstructor<State, Event>>,
    ) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            state: None,
            graphics_flows: Vec::new(),
            constructors: Some(constructors),
            last_time: Instant::now(),
        })
    }

    /// Pass the output of a hook of every flow to [`handle_flow_output`].
    fn for_each_flow(
        &mut self,
        mut hook: impl FnMut(&mut Box<dyn GraphicsFlow<State, Event>>, &Context, &mut State) -> Out<State, Event>,
    ) {
        let Some(app_state) = &mut self.state else {
            return;
        };
        for flow in self.graphics_flows.iter_mut() {
            let out = hook(flow, &app_state.ctx, &mut app_state.state);
            handle_flow_output(
                #[cfg(not(target_arch = "wasm32"))]
                &self.async_runtime,
                &mut app_state.state,
                &mut app_state.ctx,
                self.proxy.clone(),
                out,
            );
        }
    }

    fn init_flows(&mut self) {
        let Some(app_state) = &mut self.state else {
            return;
        };
        for flow in self.graphics_flows.iter_mut() {
            let out = flow.on_init(&mut app_state.ctx, &mut app_state.state);
            handle_flow_output(
                #[cfg(not(target_arch = "wasm32"))]
                &self.async_runtime,
                &mut app_state.state,
                &mut app_state.ctx,
                self.proxy.clone(),
                out,
            );
        }
    }
}

pub(crate) enum FlowEvent<State: 'static, Event: 'static> {
    #[allow(dead_code)]
    Initialized {
        state: AppState<State>,
        flows: Vec<Box<dyn GraphicsFlow<State, Event>>>,
    },
    Mut(Box<dyn FnOnce(&mut State)>),
    Custom(Event),
    Exit,
}

impl<State, Event> Debug for FlowEvent<State, Event> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized { state: _, flows } => {
                f.debug_struct("Initialized").field("flows", flows).finish()
            }
            Self::Mut(_) => f.write_str("Mut(|&mut State| -> {...})"),
            Self::Custom(_) => f.write_str("Custom(E)"),
            Self::Exit => f.write_str("Exit"),
        }
    }
}

impl<State: 'static + Default, Event: 'static> ApplicationHandler<FlowEvent<State, Event>>
    for App<State, Event>
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(constructors) = self.constructors.take() else {
            // Resumed again after a suspend; everything already exists.
            return;
        };

        let window = match event_loop.create_window(window_attributes()) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Cannot create a window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let init_future = async move {
            let app_state = AppState::new(window).await;

            let flow_futures: Vec<_> = constructors
                .into_iter()
                .map(|constructor| constructor((&app_state.ctx).into()))
                .collect();
            (app_state, futures::future::join_all(flow_futures).await)
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            let (app_state, flows) = self.async_runtime.block_on(init_future);
            self.graphics_flows = flows;
            self.state = Some(app_state);
            self.init_flows();
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let (state, flows) = init_future.await;
                if proxy.send_event(FlowEvent::Initialized { state, flows }).is_err() {
                    log::error!("Event loop closed before the flows were initialized");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: FlowEvent<State, Event>) {
        match event {
            FlowEvent::Initialized { state, flows } => {
                // sent by the web build once the async setup finished
                let size = state.ctx.window.inner_size();
                self.state = Some(state);
                self.graphics_flows = flows;

                // Important: Trigger a resize and redraw now that we are initialized
                if let Some(app_state) = &mut self.state {
                    app_state.resize(size.width, size.height);
                }
                self.init_flows();
                if let Some(app_state) = &self.state {
                    app_state.ctx.window.request_redraw();
                }
            }
            FlowEvent::Custom(custom_event) => {
                if let Some(state) = &mut self.state {
                    let result = self
                        .graphics_flows
                        .iter_mut()
                        .fold(Some(custom_event), |event, flow| {
                            flow.on_custom_events(&state.ctx, &mut state.state, event?)
                        });
                    if result.is_some() {
                        log::warn!("Warning! Custom event was not consumed this cycle");
                    }
                }
            }
            FlowEvent::Mut(fn_once) => {
                if let Some(state) = &mut self.state {
                    fn_once(&mut state.state);
                }
            }
            FlowEvent::Exit => {
                event_loop.exit();
            }
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        self.for_each_flow(|flow, ctx, state| flow.on_device_events(ctx, state, &event));
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };

        if let WindowEvent::CursorMoved { position, .. } = event {
            state.ctx.mouse.coords = position;
        };

        self.for_each_flow(|flow, ctx, state| flow.on_window_events(ctx, state, &event));

        let Some(state) = &mut self.state else {
            return;
        };
        if let Some(position) = pointer_down(&event, state.ctx.mouse.coords) {
            state.ctx.mouse.coords = position;
            self.for_each_flow(|flow, ctx, state| flow.on_pointer_down(ctx, state));
        }

        let Some(state) = &mut self.state else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { event: key, .. }
                if key.state == ElementState::Pressed
                    && key.logical_key == Key::Named(NamedKey::Escape) =>
            {
                event_loop.exit()
            }
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();

                self.for_each_flow(|flow, ctx, state| flow.on_update(ctx, state, dt));

                let Some(state) = &mut self.state else {
                    return;
                };
                match state.render(
                    &mut self.graphics_flows,
                    #[cfg(feature = "integration-tests")]
                    &self.async_runtime,
                    #[cfg(feature = "integration-tests")]
                    &self.proxy,
                ) {
                    Ok(_) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.ctx.window.inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Where a pointer went down, if `event` is a press of any mouse button or
/// the start of a touch. Mouse presses happen at `cursor`.
fn pointer_down(
    event: &WindowEvent,
    cursor: PhysicalPosition<f64>,
) -> Option<PhysicalPosition<f64>> {
    match event {
        WindowEvent::MouseInput {
            state: ElementState::Pressed,
            ..
        } => Some(cursor),
        WindowEvent::Touch(touch) if touch.phase == TouchPhase::Started => Some(touch.location),
        _ => None,
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn window_attributes() -> winit::window::WindowAttributes {
    Window::default_attributes().with_title("mesh-sprite")
}

/// Attach to the page's `<canvas id="canvas">`.
#[cfg(target_arch = "wasm32")]
fn window_attributes() -> winit::window::WindowAttributes {
    use wasm_bindgen::JsCast;
    use winit::platform::web::WindowAttributesExtWebSys;

    let canvas = wgpu::web_sys::window()
        .and_then(|window| window.document())
        .and_then(|document| document.get_element_by_id("canvas"))
        .map(|element| element.unchecked_into());
    if canvas.is_none() {
        log::warn!("No element with id \"canvas\"; winit creates its own");
    }
    Window::default_attributes().with_canvas(canvas)
}

fn send<State, Event>(
    proxy: &winit::event_loop::EventLoopProxy<FlowEvent<State, Event>>,
    event: FlowEvent<State, Event>,
) {
    if let Err(err) = proxy.send_event(event) {
        log::error!("Event loop is closed, dropping {:?}", err.0);
    }
}

fn handle_flow_output<State, Event>(
    #[cfg(not(target_arch = "wasm32"))] async_runtime: &tokio::runtime::Runtime,
    state: &mut State,
    ctx: &mut Context,
    proxy: winit::event_loop::EventLoopProxy<FlowEvent<State, Event>>,
    out: Out<State, Event>,
) {
    match out {
        Out::FutEvent(futures) => {
            let events = futures::future::join_all(futures.into_iter().map(Pin::from));
            #[cfg(not(target_arch = "wasm32"))]
            for event in async_runtime.block_on(events) {
                send(&proxy, FlowEvent::Custom(event));
            }
            #[cfg(target_arch = "wasm32")]
            wasm_bindgen_futures::spawn_local(async move {
                for event in events.await {
                    send(&proxy, FlowEvent::Custom(event));
                }
            });
        }
        Out::FutFn(futures) => {
            let mutations = futures::future::join_all(futures.into_iter().map(Pin::from));
            // Natively the state is at hand; the web build applies them as events.
            #[cfg(not(target_arch = "wasm32"))]
            for mutation in async_runtime.block_on(mutations) {
                mutation(state);
            }
            #[cfg(target_arch = "wasm32")]
            {
                let _ = state;
                wasm_bindgen_futures::spawn_local(async move {
                    for mutation in mutations.await {
                        send(&proxy, FlowEvent::Mut(mutation));
                    }
                });
            }
        }
        Out::Configure(configure) => configure(ctx),
        Out::Exit => send(&proxy, FlowEvent::Exit),
        Out::Empty => (),
    }
}

pub fn run<State: 'static + Default, Event: 'static>(
    constructors: Vec<FlowConstructor<State, Event>>,
) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    #[cfg(all(feature = "integration-tests", target_os = "linux"))]
    let event_loop: EventLoop<FlowEvent<State, Event>> = {
        use winit::platform::wayland::EventLoopBuilderExtWayland;

        winit::event_loop::EventLoop::with_user_event()
            .with_any_thread(true)
            .build()?
    };

    #[cfg(all(feature = "integration-tests", target_os = "windows"))]
    let event_loop: EventLoop<FlowEvent<State, Event>> = {
        use winit::platform::windows::EventLoopBuilderExtWindows;

        winit::event_loop::EventLoop::with_user_event()
            .with_any_thread(true)
            .build()?
    };

    #[cfg(not(all(
        feature = "integration-tests",
        any(target_os = "linux", target_os = "windows")
    )))]
    let event_loop: EventLoop<FlowEvent<State, Event>> = EventLoop::with_user_event().build()?;

    let mut app: App<State, Event> = App::new(&event_loop, constructors)?;
    event_loop.run_app(&mut app)?;
    Ok(())
}
