//! `.cubemap` environment files.
//!
//! A `.cubemap` file is a JSON array with one file-name template per mip
//! level, largest level first. Every template contains `{{face}}`, which is
//! substituted by the six face names to find the images, relative to the
//! directory of the `.cubemap` file:
//!
//! ```json
//! ["specular_{{face}}_0.png", "specular_{{face}}_1.png"]
//! ```

use image::RgbaImage;
use serde::Deserialize;

use crate::resources::{AssetError, load_binary, sibling_path};

/// Face names in cube-array layer order.
pub const FACES: [&str; 6] = ["posx", "negx", "posy", "negy", "posz", "negz"];

const FACE_PLACEHOLDER: &str = "{{face}}";

/// Contents of a `.cubemap` file.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct Manifest {
    mip_templates: Vec<String>,
}

/// Decoded cubemap: `levels[mip][face]`.
#[derive(Clone, Debug)]
pub struct CubemapAsset {
    pub levels: Vec<[RgbaImage; 6]>,
}

impl CubemapAsset {
    /// Edge length of the largest mip level.
    pub fn size(&self) -> u32 {
        self.levels.first().map_or(0, |faces| faces[0].width())
    }

    pub fn mip_level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Check that faces are square, equally sized per level, that every
    /// level halves the previous one and that the chain ends at 1 pixel.
    pub fn validate(&self, name: &str) -> Result<(), AssetError> {
        let invalid = |reason: String| AssetError::InvalidCubemap {
            name: name.to_string(),
            reason,
        };
        if self.levels.is_empty() {
            return Err(invalid("no mip levels".into()));
        }
        let mut expected = self.size();
        // A full chain of a 2^n face has n + 1 levels.
        let max_levels = u32::BITS - expected.leading_zeros();
        if self.mip_level_count() > max_levels {
            return Err(invalid(format!(
                "{} mip levels, a {expected} pixel face has at most {max_levels}",
                self.mip_level_count()
            )));
        }
        for (level, faces) in self.levels.iter().enumerate() {
            for (face, img) in FACES.iter().zip(faces.iter()) {
                if img.width() != img.height() {
                    return Err(invalid(format!(
                        "face {face} of level {level} is {}x{}, faces must be square",
                        img.width(),
                        img.height()
                    )));
                }
                if img.width() != expected {
                    return Err(invalid(format!(
                        "face {face} of level {level} is {} pixels wide, expected {expected}",
                        img.width()
                    )));
                }
            }
            expected = (expected / 2).max(1);
        }
        Ok(())
    }
}

/// Parse the JSON list of mip templates and expand it into face paths,
/// relative to `cubemap_path`.
pub fn parse_manifest(cubemap_path: &str, json: &str) -> Result<Vec<[String; 6]>, AssetError> {
    let invalid = |reason: String| AssetError::InvalidCubemap {
        name: cubemap_path.to_string(),
        reason,
    };
    let Manifest { mip_templates: templates } =
        serde_json::from_str(json).map_err(|e| invalid(format!("not a JSON string array: {e}")))?;
    if templates.is_empty() {
        return Err(invalid("no mip levels".into()));
    }
    templates
        .iter()
        .map(|template| {
            if !template.contains(FACE_PLACEHOLDER) {
                return Err(invalid(format!(
                    "template {template:?} has no {FACE_PLACEHOLDER} placeholder"
                )));
            }
            Ok(FACES.map(|face| sibling_path(cubemap_path, &template.replace(FACE_PLACEHOLDER, face))))
        })
        .collect()
}

fn decode(path: &str, bytes: &[u8]) -> anyhow::Result<RgbaImage> {
    use anyhow::Context;
    let img = image::load_from_memory(bytes).with_context(|| format!("decoding {path}"))?;
    Ok(img.to_rgba8())
}

/// Load a `.cubemap` file and all the face images it references.
pub async fn load_cubemap(path: &str) -> anyhow::Result<CubemapAsset> {
    let manifest = load_binary(path).await?;
    let manifest = String::from_utf8(manifest).map_err(|e| AssetError::InvalidCubemap {
        name: path.to_string(),
        reason: e.to_string(),
    })?;
    let level_paths = parse_manifest(path, &manifest)?;

    let mut levels = Vec::with_capacity(level_paths.len());
    for paths in level_paths {
        let files = futures::future::try_join_all(paths.iter().map(|p| load_binary(p))).await?;
        let mut faces = Vec::with_capacity(FACES.len());
        for (face_path, bytes) in paths.iter().zip(files.iter()) {
            faces.push(decode(face_path, bytes)?);
        }
        let faces: [RgbaImage; 6] = faces
            .try_into()
            .map_err(|_| anyhow::anyhow!("cubemap {path} must have exactly six faces"))?;
        levels.push(faces);
    }

    let cubemap = CubemapAsset { levels };
    cubemap.validate(path)?;
    log::info!(
        "Loaded cubemap {} ({}px, {} mip levels)",
        path,
        cubemap.size(),
        cubemap.mip_level_count()
    );
    Ok(cubemap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faces(size: u32) -> [RgbaImage; 6] {
        std::array::from_fn(|_| RgbaImage::new(size, size))
    }

    #[test]
    fn expands_face_templates_relative_to_manifest() {
        let levels = parse_manifest(
            "environments/autumn/specular.cubemap",
            r#"["specular_{{face}}_0.png", "mips/specular_{{face}}_1.png"]"#,
        )
        .unwrap();

        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0][0], "environments/autumn/specular_posx_0.png");
        assert_eq!(levels[0][5], "environments/autumn/specular_negz_0.png");
        assert_eq!(levels[1][2], "environments/autumn/mips/specular_posy_1.png");
    }

    #[test]
    fn manifest_in_asset_root_has_no_directory_prefix() {
        let levels = parse_manifest("diffuse.cubemap", r#"["diffuse_{{face}}.png"]"#).unwrap();
        assert_eq!(levels[0][1], "diffuse_negx.png");
    }

    #[test]
    fn rejects_empty_manifest() {
        let err = parse_manifest("a.cubemap", "[]").unwrap_err();
        assert!(matches!(err, AssetError::InvalidCubemap { .. }));
    }

    #[test]
    fn rejects_template_without_placeholder() {
        let err = parse_manifest("a.cubemap", r#"["diffuse.png"]"#).unwrap_err();
        assert!(err.to_string().contains("placeholder"), "{err}");
    }

    #[test]
    fn rejects_non_array_manifest() {
        assert!(parse_manifest("a.cubemap", r#"{"faces": 6}"#).is_err());
    }

    #[test]
    fn accepts_halving_mip_chain() {
        let cubemap = CubemapAsset {
            levels: vec![faces(8), faces(4), faces(2), faces(1)],
        };
        assert!(cubemap.validate("ok").is_ok());
        assert_eq!(cubemap.size(), 8);
        assert_eq!(cubemap.mip_level_count(), 4);
    }

    #[test]
    fn rejects_overlong_mip_chain() {
        let cubemap = CubemapAsset {
            levels: vec![faces(2), faces(1), faces(1), faces(1)],
        };
        let err = cubemap.validate("long").unwrap_err();
        assert!(matches!(err, AssetError::InvalidCubemap { .. }));
        assert!(err.to_string().contains("at most 2"), "{err}");
    }

    #[test]
    fn accepts_chain_ending_early() {
        let cubemap = CubemapAsset {
            levels: vec![faces(64), faces(32), faces(16)],
        };
        assert!(cubemap.validate("short").is_ok());
    }

    #[test]
    fn rejects_mip_level_of_wrong_size() {
        let cubemap = CubemapAsset {
            levels: vec![faces(8), faces(8)],
        };
        assert!(cubemap.validate("bad").is_err());
    }

    #[test]
    fn rejects_non_square_face() {
        let mut level = faces(4);
        level[3] = RgbaImage::new(4, 2);
        let cubemap = CubemapAsset {
            levels: vec![level],
        };
        let err = cubemap.validate("bad").unwrap_err();
        assert!(err.to_string().contains("negy"), "{err}");
    }
}
