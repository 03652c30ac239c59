use mesh_sprite::{
    demo::{DIFFUSE_CUBEMAP, MODEL, SPECULAR_CUBEMAP},
    resources::{AssetError, Loader},
};

#[tokio::test]
async fn demo_assets_load_under_their_names() {
    let resources = Loader::new()
        .add(DIFFUSE_CUBEMAP.0, DIFFUSE_CUBEMAP.1)
        .add(SPECULAR_CUBEMAP.0, SPECULAR_CUBEMAP.1)
        .add(MODEL.0, MODEL.1)
        .load()
        .await
        .expect("demo assets should load");
    assert_eq!(resources.len(), 3);

    let diffuse = resources.cubemap(DIFFUSE_CUBEMAP.0).unwrap();
    assert_eq!(diffuse.mip_level_count(), 1);
    assert!(diffuse.validate(DIFFUSE_CUBEMAP.0).is_ok());

    let specular = resources.cubemap(SPECULAR_CUBEMAP.0).unwrap();
    assert_eq!(specular.size(), 64);
    assert_eq!(specular.mip_level_count(), 7);

    let model = resources.gltf(MODEL.0).unwrap();
    assert_eq!(model.meshes.len(), 1);
    let mesh = &model.meshes[0];
    assert_eq!(mesh.indices.len() % 3, 0);
    assert_eq!(mesh.normals.len(), mesh.positions.len());
    assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.positions.len()));
    assert_eq!(model.material_of(mesh).name, "orb");
}

#[tokio::test]
async fn looking_up_a_cubemap_as_a_model_fails() {
    let resources = Loader::new()
        .add(DIFFUSE_CUBEMAP.0, DIFFUSE_CUBEMAP.1)
        .load()
        .await
        .unwrap();
    assert!(matches!(
        resources.gltf(DIFFUSE_CUBEMAP.0),
        Err(AssetError::WrongKind { .. })
    ));
}

#[tokio::test]
async fn one_missing_asset_fails_the_whole_load() {
    let err = Loader::new()
        .add(DIFFUSE_CUBEMAP.0, DIFFUSE_CUBEMAP.1)
        .add("broken.cubemap", "environments/autumn/missing.cubemap")
        .load()
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("broken.cubemap"), "{err:#}");
}
