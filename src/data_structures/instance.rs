//! Transformation data for GPU rendering.
//!
//! A model's transform is stored as position, rotation and scale and is packed
//! into a per-mesh instance buffer that the vertex shader reads as a matrix.

use cgmath::{Euler, Matrix, Matrix3, Matrix4, One, SquareMatrix};

use crate::data_structures::model;

/// Transformation: position, rotation (as quaternion), and scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    /// Create a new instance with identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.scale = cgmath::Vector3::new(scale, scale, scale);
    }

    /// Set the rotation from Euler angles in degrees.
    pub fn set_euler_angles(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = Euler::new(cgmath::Deg(x), cgmath::Deg(y), cgmath::Deg(z)).into();
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/// What the instance buffer holds for one model.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
}

impl InstanceRaw {
    /// Pack a world matrix together with the matrix that transforms its normals.
    ///
    /// The normal matrix is the inverse transpose of the upper 3x3, so non-uniform
    /// scale keeps normals perpendicular to their surface.
    pub fn from_matrix(world: Matrix4<f32>) -> Self {
        let linear = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
        let normal = linear
            .invert()
            .map(|inverse| inverse.transpose())
            .unwrap_or(linear);
        Self {
            model: world.into(),
            normal: normal.into(),
        }
    }
}

// World matrix as four vec4s followed by the normal matrix as three vec3s.
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
    5 => Float32x4,
    6 => Float32x4,
    7 => Float32x4,
    8 => Float32x4,
    9 => Float32x3,
    10 => Float32x3,
    11 => Float32x3,
];

impl model::Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // The shader only advances to the next entry when it starts a new instance
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE_ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector3, Vector4};

    fn close(a: Vector3<f32>, b: Vector3<f32>) -> bool {
        (a - b).magnitude() < 1e-5
    }

    #[test]
    fn y_rotation_turns_x_towards_minus_z() {
        let mut instance = Instance::new();
        instance.set_euler_angles(0.0, 90.0, 0.0);
        let x = (instance.to_matrix() * Vector4::new(1.0, 0.0, 0.0, 1.0)).truncate();
        assert!(close(x, Vector3::new(0.0, 0.0, -1.0)), "{x:?}");
    }

    #[test]
    fn zero_angles_are_identity_rotation() {
        let mut instance = Instance::new();
        instance.set_euler_angles(0.0, 0.0, 0.0);
        assert_eq!(instance, Instance::new());
    }

    #[test]
    fn uniform_scale_applies_to_all_axes() {
        let mut instance = Instance::new();
        instance.set_uniform_scale(1.8);
        let p = (instance.to_matrix() * Vector4::new(1.0, 1.0, 1.0, 1.0)).truncate();
        assert!(close(p, Vector3::new(1.8, 1.8, 1.8)));
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let world = Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0);
        let raw = InstanceRaw::from_matrix(world);
        assert_eq!(raw.normal[0][0], 0.5);
        assert_eq!(raw.normal[1][1], 1.0);
        assert_eq!(raw.model[0][0], 2.0);
    }
}
