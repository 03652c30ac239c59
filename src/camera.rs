//! Perspective camera used to render models into sprite textures.
//!
//! The camera is an explicit field of [`crate::context::Context`]; there is
//! no global "main" camera. Its aspect ratio can either follow the viewport
//! or be pinned, which matters when the render target (a sprite) has a
//! different shape than the window.

use cgmath::{EuclideanSpace, Matrix4, Point3, Vector3};
use wgpu::util::DeviceExt;

/// Converts cgmath's OpenGL clip space (z in [-1, 1]) to wgpu's (z in [0, 1]).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view in degrees.
    pub fovy: f32,
    pub znear: f32,
    pub zfar: f32,
    /// `None` follows the aspect ratio of whatever is rendered to.
    pub aspect: Option<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 5.0),
            target: Point3::origin(),
            up: Vector3::unit_y(),
            fovy: 60.0,
            znear: 0.1,
            zfar: 1000.0,
            aspect: None,
        }
    }
}

impl Camera {
    pub fn effective_aspect(&self, viewport_aspect: f32) -> f32 {
        match self.aspect {
            Some(aspect) => aspect,
            None => viewport_aspect,
        }
    }

    pub fn view(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection(&self, viewport_aspect: f32) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX
            * cgmath::perspective(
                cgmath::Deg(self.fovy),
                self.effective_aspect(viewport_aspect),
                self.znear,
                self.zfar,
            )
    }

    pub fn view_proj(&self, viewport_aspect: f32) -> Matrix4<f32> {
        self.projection(viewport_aspect) * self.view()
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    // vec4 for uniform alignment, w is unused
    pub position: [f32; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_proj: Matrix4::identity().into(),
            position: [0.0; 4],
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, viewport_aspect: f32) {
        self.view_proj = camera.view_proj(viewport_aspect).into();
        self.position = camera.position.to_homogeneous().into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// GPU side of the camera: the uniform buffer and its bind group.
#[derive(Debug)]
pub struct CameraResources {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform = CameraUniform::new();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });
        Self {
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    /// Upload the camera as seen by a render target of the given aspect ratio.
    pub fn write(&self, queue: &wgpu::Queue, camera: &Camera, target_aspect: f32) {
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj(camera, target_aspect);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[uniform]));
    }
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("camera_bind_group_layout"),
    })
}
