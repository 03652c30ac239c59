use mesh_sprite::{demo::MeshSpriteDemo, flow};

fn main() -> anyhow::Result<()> {
    flow::run(vec![MeshSpriteDemo::constructor()])
}
