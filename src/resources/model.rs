//! glTF model loading into CPU-side mesh and material data.
//!
//! Supports `.gltf` with `data:` or relative buffer/image URIs and `.glb` with
//! an embedded blob. Only what a static PBR model needs is read: triangle
//! primitives of the default scene with node transforms, and metallic-roughness
//! materials with an optional base colour texture.

use std::collections::HashMap;

use anyhow::Context as _;
use base64::Engine as _;
use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3};
use image::RgbaImage;

use crate::resources::{AssetError, load_binary, sibling_path};

/// One triangle primitive, already placed by its node's world transform.
#[derive(Clone, Debug)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub transform: Matrix4<f32>,
    /// Index into [`GltfAsset::materials`]; `None` uses [`MaterialData::default`].
    pub material: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct MaterialData {
    pub name: String,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub base_color_texture: Option<RgbaImage>,
}

impl Default for MaterialData {
    // glTF's default material
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: [1.0; 4],
            metallic: 1.0,
            roughness: 1.0,
            base_color_texture: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GltfAsset {
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
}

/// Load a glTF file and every external buffer and image it references.
pub async fn load_gltf(path: &str) -> anyhow::Result<GltfAsset> {
    let bytes = load_binary(path).await?;
    let gltf = gltf::Gltf::from_slice(&bytes).map_err(|e| AssetError::InvalidGltf {
        name: path.to_string(),
        reason: e.to_string(),
    })?;

    let uris = external_uris(&gltf);
    let files = futures::future::try_join_all(
        uris.iter().map(|uri| load_binary_owned(sibling_path(path, uri))),
    )
    .await?;
    let external: HashMap<String, Vec<u8>> = uris.into_iter().zip(files).collect();

    let asset = GltfAsset::from_gltf(path, &gltf, &external)?;
    log::info!(
        "Loaded glTF {} ({} meshes, {} materials)",
        path,
        asset.meshes.len(),
        asset.materials.len()
    );
    Ok(asset)
}

async fn load_binary_owned(path: String) -> anyhow::Result<Vec<u8>> {
    load_binary(&path).await
}

/// URIs of buffers and images that live in separate files.
pub fn external_uris(gltf: &gltf::Gltf) -> Vec<String> {
    let buffers = gltf.buffers().filter_map(|buffer| match buffer.source() {
        gltf::buffer::Source::Uri(uri) if !is_data_uri(uri) => Some(uri.to_string()),
        _ => None,
    });
    let images = gltf.images().filter_map(|image| match image.source() {
        gltf::image::Source::Uri { uri, .. } if !is_data_uri(uri) => Some(uri.to_string()),
        _ => None,
    });
    let mut uris: Vec<String> = buffers.chain(images).collect();
    uris.sort();
    uris.dedup();
    uris
}

fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Decode a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> anyhow::Result<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| anyhow::anyhow!("not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow::anyhow!("data URI without payload"))?;
    anyhow::ensure!(
        header.ends_with(";base64"),
        "only base64 data URIs are supported"
    );
    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

impl GltfAsset {
    /// Build the asset from a parsed document; `external` holds the bytes of
    /// every URI returned by [`external_uris`].
    pub fn from_gltf(
        name: &str,
        gltf: &gltf::Gltf,
        external: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<Self> {
        let invalid = |reason: String| AssetError::InvalidGltf {
            name: name.to_string(),
            reason,
        };
        let resolve = |uri: &str| -> anyhow::Result<Vec<u8>> {
            if is_data_uri(uri) {
                decode_data_uri(uri)
            } else {
                external
                    .get(uri)
                    .cloned()
                    .ok_or_else(|| invalid(format!("external file {uri} was not loaded")).into())
            }
        };

        let mut buffers = Vec::new();
        for buffer in gltf.buffers() {
            let data = match buffer.source() {
                gltf::buffer::Source::Bin => gltf
                    .blob
                    .clone()
                    .ok_or_else(|| invalid("binary chunk missing".into()))?,
                gltf::buffer::Source::Uri(uri) => resolve(uri)?,
            };
            if data.len() < buffer.length() {
                return Err(invalid(format!(
                    "buffer {} has {} bytes, expected {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                ))
                .into());
            }
            buffers.push(data);
        }

        let mut materials = Vec::new();
        for material in gltf.materials() {
            let pbr = material.pbr_metallic_roughness();
            let base_color_texture = match pbr.base_color_texture() {
                Some(info) => {
                    let bytes = match info.texture().source().source() {
                        gltf::image::Source::View { view, .. } => {
                            let buffer = &buffers[view.buffer().index()];
                            buffer
                                .get(view.offset()..view.offset() + view.length())
                                .ok_or_else(|| invalid("image view out of bounds".into()))?
                                .to_vec()
                        }
                        gltf::image::Source::Uri { uri, .. } => resolve(uri)?,
                    };
                    let img = image::load_from_memory(&bytes)
                        .with_context(|| format!("decoding base colour texture of {name}"))?;
                    Some(img.to_rgba8())
                }
                None => None,
            };
            let index = materials.len();
            materials.push(MaterialData {
                name: material
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("material {index}")),
                base_color: pbr.base_color_factor(),
                metallic: pbr.metallic_factor(),
                roughness: pbr.roughness_factor(),
                base_color_texture,
            });
        }

        let mut meshes = Vec::new();
        match gltf.default_scene().or_else(|| gltf.scenes().next()) {
            Some(scene) => {
                for node in scene.nodes() {
                    collect_node(&node, Matrix4::identity(), &buffers, &mut meshes);
                }
            }
            None => {
                log::warn!("{name} has no scene, using every mesh untransformed");
                for mesh in gltf.meshes() {
                    read_mesh(&mesh, Matrix4::identity(), &buffers, &mut meshes);
                }
            }
        }
        if meshes.is_empty() {
            return Err(invalid("no triangle meshes".into()).into());
        }

        Ok(Self { meshes, materials })
    }

    /// Material of a mesh, falling back to the glTF default material.
    pub fn material_of(&self, mesh: &MeshData) -> MaterialData {
        mesh.material
            .and_then(|idx| self.materials.get(idx))
            .cloned()
            .unwrap_or_default()
    }
}

fn collect_node(
    node: &gltf::Node,
    parent: Matrix4<f32>,
    buffers: &[Vec<u8>],
    meshes: &mut Vec<MeshData>,
) {
    let world = parent * Matrix4::from(node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        read_mesh(&mesh, world, buffers, meshes);
    }
    for child in node.children() {
        collect_node(&child, world, buffers, meshes);
    }
}

fn read_mesh(
    mesh: &gltf::Mesh,
    transform: Matrix4<f32>,
    buffers: &[Vec<u8>],
    meshes: &mut Vec<MeshData>,
) {
    let mesh_name = mesh.name().unwrap_or("unknown_mesh");
    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!(
                "Skipping primitive {} of {}: mode {:?} is not supported",
                primitive.index(),
                mesh_name,
                primitive.mode()
            );
            continue;
        }
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
        let positions: Vec<[f32; 3]> = match reader.read_positions() {
            Some(positions) => positions.collect(),
            None => {
                log::warn!("Skipping primitive {} of {}: no positions", primitive.index(), mesh_name);
                continue;
            }
        };
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        let normals = match reader.read_normals() {
            Some(normals) => normals.collect(),
            None => compute_normals(&positions, &indices),
        };
        let tex_coords = match reader.read_tex_coords(0) {
            Some(tex_coords) => tex_coords.into_f32().collect(),
            None => vec![[0.0; 2]; positions.len()],
        };

        meshes.push(MeshData {
            name: mesh_name.to_string(),
            positions,
            normals,
            tex_coords,
            indices,
            transform,
            material: primitive.material().index(),
        });
    }
}

/// Area-weighted vertex normals of an indexed triangle list.
pub fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); positions.len()];
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let p0 = Vector3::from(positions[a]);
        let p1 = Vector3::from(positions[b]);
        let p2 = Vector3::from(positions[c]);
        // not normalized: the length is twice the area
        let face = (p1 - p0).cross(p2 - p0);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| {
            if n.magnitude2() > 0.0 {
                n.normalize().into()
            } else {
                [0.0, 0.0, 1.0]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A single triangle in the XY plane, no normals, moved by its node.
    fn triangle_gltf(with_material: bool) -> gltf::Gltf {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let indices: [u16; 4] = [0, 1, 2, 0];
        let mut bin = bytemuck::cast_slice::<_, u8>(&positions).to_vec();
        bin.extend_from_slice(bytemuck::cast_slice(&indices));
        let data = base64::engine::general_purpose::STANDARD.encode(&bin);
        let material = if with_material {
            r#","material": 0"#
        } else {
            ""
        };
        let json = format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [0]}}],
  "nodes": [{{"mesh": 0, "translation": [0.0, 2.0, 0.0]}}],
  "meshes": [{{"name": "tri", "primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1{material}}}]}}],
  "materials": [{{"name": "paint", "pbrMetallicRoughness": {{"baseColorFactor": [1.0, 0.5, 0.25, 1.0], "metallicFactor": 0.3, "roughnessFactor": 0.7}}}}],
  "buffers": [{{"byteLength": 44, "uri": "data:application/octet-stream;base64,{data}"}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 6}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}},
    {{"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}}
  ]
}}"#
        );
        gltf::Gltf::from_slice(json.as_bytes()).unwrap()
    }

    #[test]
    fn reads_embedded_triangle() {
        let gltf = triangle_gltf(true);
        assert!(external_uris(&gltf).is_empty());

        let asset = GltfAsset::from_gltf("tri.gltf", &gltf, &HashMap::new()).unwrap();
        assert_eq!(asset.meshes.len(), 1);
        let mesh = &asset.meshes[0];
        assert_eq!(mesh.name, "tri");
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.tex_coords, vec![[0.0, 0.0]; 3]);
        assert_eq!(mesh.transform.w.y, 2.0);
        // counter-clockwise in XY faces +Z
        for normal in &mesh.normals {
            assert_eq!(*normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn reads_material_factors() {
        let gltf = triangle_gltf(true);
        let asset = GltfAsset::from_gltf("tri.gltf", &gltf, &HashMap::new()).unwrap();
        let material = asset.material_of(&asset.meshes[0]);
        assert_eq!(material.name, "paint");
        assert_eq!(material.base_color, [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(material.metallic, 0.3);
        assert_eq!(material.roughness, 0.7);
        assert!(material.base_color_texture.is_none());
    }

    #[test]
    fn primitive_without_material_uses_gltf_default() {
        let gltf = triangle_gltf(false);
        let asset = GltfAsset::from_gltf("tri.gltf", &gltf, &HashMap::new()).unwrap();
        let material = asset.material_of(&asset.meshes[0]);
        assert_eq!(material.metallic, 1.0);
        assert_eq!(material.roughness, 1.0);
        assert_eq!(material.base_color, [1.0; 4]);
    }

    #[test]
    fn computes_shared_vertex_normals() {
        // two triangles folded along the X axis, one facing +Z and one facing +Y
        let positions = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, -1.0],
        ];
        let indices = [0, 1, 2, 0, 1, 3];
        let normals = compute_normals(&positions, &indices);
        assert_eq!(normals[2], [0.0, 0.0, 1.0]);
        assert_eq!(normals[3], [0.0, 1.0, 0.0]);
        let shared = Vector3::from(normals[0]);
        assert!((shared.magnitude() - 1.0).abs() < 1e-6);
        assert!(shared.y > 0.0 && shared.z > 0.0);
    }

    #[test]
    fn unreferenced_vertex_gets_fallback_normal() {
        let normals = compute_normals(&[[0.0; 3]; 4], &[0, 1, 2]);
        assert_eq!(normals[3], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn decodes_base64_data_uri() {
        let bytes = decode_data_uri("data:application/octet-stream;base64,AQID").unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(decode_data_uri("data:text/plain,hello").is_err());
        assert!(decode_data_uri("file.bin").is_err());
    }
}
