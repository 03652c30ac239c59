//! Loading of external assets.
//!
//! Assets are addressed by a path relative to the asset root. On native targets
//! the root is `$MESH_SPRITE_ASSETS` or `./assets`; on the web it is
//! `<origin>/assets/`.
//!
//! [`Loader`] queues named assets and resolves them all at once into
//! [`Resources`], a name to asset map:
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use mesh_sprite::resources::Loader;
//!
//! let resources = Loader::new()
//!     .add("diffuse.cubemap", "environments/autumn/diffuse.cubemap")
//!     .add("model.gltf", "models/orb/orb.gltf")
//!     .load()
//!     .await?;
//! let model = resources.gltf("model.gltf")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use anyhow::Context as _;

pub mod cubemap;
pub mod model;

pub use self::cubemap::CubemapAsset;
pub use self::model::GltfAsset;

/// Environment variable overriding the native asset root.
pub const ASSET_ROOT_ENV: &str = "MESH_SPRITE_ASSETS";

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("no resource named {0:?} was loaded")]
    Missing(String),
    #[error("resource {name:?} is a {actual}, not a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("cannot tell the asset kind of {0:?}; expected .gltf, .glb or .cubemap")]
    UnsupportedExtension(String),
    #[error("invalid cubemap {name:?}: {reason}")]
    InvalidCubemap { name: String, reason: String },
    #[error("invalid glTF {name:?}: {reason}")]
    InvalidGltf { name: String, reason: String },
}

/// The kinds of asset the loader understands, decided by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Gltf,
    Cubemap,
}

impl AssetKind {
    pub fn from_path(path: &str) -> Result<Self, AssetError> {
        let extension = std::path::Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("gltf") | Some("glb") => Ok(AssetKind::Gltf),
            Some("cubemap") => Ok(AssetKind::Cubemap),
            _ => Err(AssetError::UnsupportedExtension(path.to_string())),
        }
    }
}

/// A loaded asset.
#[derive(Debug)]
pub enum Resource {
    Gltf(GltfAsset),
    Cubemap(CubemapAsset),
}

impl Resource {
    fn kind_name(&self) -> &'static str {
        match self {
            Resource::Gltf(_) => "glTF model",
            Resource::Cubemap(_) => "cubemap",
        }
    }
}

/// Everything a [`Loader`] resolved, by the name it was queued under.
#[derive(Debug, Default)]
pub struct Resources {
    resources: HashMap<String, Resource>,
}

impl Resources {
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn gltf(&self, name: &str) -> Result<&GltfAsset, AssetError> {
        match self.get(name) {
            Some(Resource::Gltf(gltf)) => Ok(gltf),
            Some(other) => Err(AssetError::WrongKind {
                name: name.to_string(),
                expected: "glTF model",
                actual: other.kind_name(),
            }),
            None => Err(AssetError::Missing(name.to_string())),
        }
    }

    pub fn cubemap(&self, name: &str) -> Result<&CubemapAsset, AssetError> {
        match self.get(name) {
            Some(Resource::Cubemap(cubemap)) => Ok(cubemap),
            Some(other) => Err(AssetError::WrongKind {
                name: name.to_string(),
                expected: "cubemap",
                actual: other.kind_name(),
            }),
            None => Err(AssetError::Missing(name.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, resource: Resource) {
        self.resources.insert(name.into(), resource);
    }
}

/// Queue of named assets to fetch together.
#[derive(Debug, Default, Clone)]
pub struct Loader {
    queue: Vec<(String, String)>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `path` under `name`. A later `add` with the same name replaces the path.
    pub fn add(&mut self, name: impl Into<String>, path: impl Into<String>) -> &mut Self {
        let name = name.into();
        let path = path.into();
        match self.queue.iter_mut().find(|(queued, _)| *queued == name) {
            Some(entry) => entry.1 = path,
            None => self.queue.push((name, path)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Fetch and decode every queued asset concurrently.
    ///
    /// Resolves once all of them are done. The first failure fails the whole
    /// load; the error names the resource that failed.
    pub async fn load(&self) -> anyhow::Result<Resources> {
        // Fail on unknown extensions before touching the file system.
        let kinds = self
            .queue
            .iter()
            .map(|(_, path)| AssetKind::from_path(path))
            .collect::<Result<Vec<_>, _>>()?;

        let loads = self
            .queue
            .iter()
            .zip(kinds)
            .map(|((name, path), kind)| async move {
                let resource = match kind {
                    AssetKind::Gltf => model::load_gltf(path).await.map(Resource::Gltf),
                    AssetKind::Cubemap => cubemap::load_cubemap(path).await.map(Resource::Cubemap),
                }
                .with_context(|| format!("loading resource {name:?} from {path}"))?;
                anyhow::Ok((name.clone(), resource))
            });
        let loaded = futures::future::try_join_all(loads).await?;

        let mut resources = Resources::default();
        for (name, resource) in loaded {
            resources.insert(name, resource);
        }
        log::info!("Loaded {} resources", resources.len());
        Ok(resources)
    }
}

/// Resolve `relative` against the directory containing `path`.
pub fn sibling_path(path: &str, relative: &str) -> String {
    match path.rfind('/') {
        Some(idx) => format!("{}/{}", &path[..idx], relative),
        None => relative.to_string(),
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn asset_root() -> std::path::PathBuf {
    std::env::var_os(ASSET_ROOT_ENV)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("./assets"))
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("window has no origin"))?;
    let base = reqwest::Url::parse(&format!("{}/assets/", origin))?;
    Ok(base.join(file_name)?)
}

/// Read an asset file completely.
pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        reqwest::get(url)
            .await?
            .error_for_status()?
            .bytes()
            .await?
            .to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = asset_root().join(file_name);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?
    };

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_decided_by_extension() {
        assert_eq!(AssetKind::from_path("a/b/suzanne.gltf").unwrap(), AssetKind::Gltf);
        assert_eq!(AssetKind::from_path("model.GLB").unwrap(), AssetKind::Gltf);
        assert_eq!(AssetKind::from_path("env/diffuse.cubemap").unwrap(), AssetKind::Cubemap);
        assert!(matches!(
            AssetKind::from_path("texture.png"),
            Err(AssetError::UnsupportedExtension(_))
        ));
        assert!(AssetKind::from_path("no_extension").is_err());
    }

    #[test]
    fn sibling_paths_stay_in_directory() {
        assert_eq!(sibling_path("models/orb/orb.gltf", "orb.bin"), "models/orb/orb.bin");
        assert_eq!(sibling_path("orb.gltf", "orb.bin"), "orb.bin");
    }

    #[test]
    fn re_adding_a_name_replaces_its_path() {
        let mut loader = Loader::new();
        loader.add("model", "a.gltf").add("model", "b.gltf").add("env", "e.cubemap");
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.queue[0], ("model".to_string(), "b.gltf".to_string()));
    }

    #[test]
    fn typed_accessors_report_missing_and_wrong_kind() {
        let mut resources = Resources::default();
        resources.insert(
            "env",
            Resource::Cubemap(CubemapAsset { levels: Vec::new() }),
        );

        assert!(matches!(resources.gltf("nope"), Err(AssetError::Missing(_))));
        assert!(matches!(
            resources.gltf("env"),
            Err(AssetError::WrongKind { expected: "glTF model", .. })
        ));
        assert!(resources.cubemap("env").is_ok());
    }

    #[tokio::test]
    async fn load_rejects_unknown_extension_without_io() {
        let err = Loader::new()
            .add("tex", "missing/texture.png")
            .load()
            .await
            .unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<AssetError>(),
                Some(AssetError::UnsupportedExtension(_))
            ),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn empty_loader_resolves_to_empty_resources() {
        let resources = Loader::new().load().await.unwrap();
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn missing_file_names_the_resource() {
        let err = Loader::new()
            .add("ghost.gltf", "does/not/exist.gltf")
            .load()
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("ghost.gltf"), "{err:#}");
    }
}
