//! Decode a scene file and print its node tree.
//!
//!     cargo run --example dump_scene -- path/to/model.flt

use relic_core::format::load_scene_file;
use relic_core::scene::NodeId;
use relic_core::{ParseOptions, SceneGraph};
use std::path::Path;

fn print_tree(scene: &SceneGraph, node: NodeId, indent: usize) {
    let n = scene.node(node);
    let mut line = format!("{:indent$}{}", "", n.name, indent = indent);
    if !n.primitives.is_empty() {
        let vertices: usize = n.primitives.iter().map(|p| p.vertex_count()).sum();
        line.push_str(&format!(
            "  [{} primitives, {} vertices]",
            n.primitives.len(),
            vertices
        ));
    }
    if n.local_transform.is_some() {
        line.push_str("  (transform)");
    }
    println!("{line}");
    for (key, value) in &n.metadata {
        println!("{:indent$}  @{key} = {value:?}", "", indent = indent);
    }
    for &child in &n.children {
        if indent / 2 > 64 {
            println!("{:indent$}  ...", "", indent = indent);
            return;
        }
        print_tree(scene, child, indent + 2);
    }
}

fn main() {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: dump_scene <file.flt | file.3ds>");
        std::process::exit(2);
    };

    match load_scene_file(Path::new(&path), &ParseOptions::default()) {
        Ok(scene) => {
            print_tree(&scene, scene.root(), 0);
            let stats = scene.stats();
            println!(
                "\n{} nodes, {} primitives, {} vertices, ~{} triangles",
                stats.nodes, stats.primitives, stats.vertices, stats.triangles
            );
            if let (Some(min), Some(max)) = (stats.bounds_min, stats.bounds_max) {
                println!("bounds {min:?} .. {max:?}");
            }
        }
        Err(e) => {
            eprintln!("{path}: {e}");
            std::process::exit(1);
        }
    }
}
