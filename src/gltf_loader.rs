// glTF 2.0 into a detached subtree plus clips. Triangle primitives and
// TRS channels only; morph weights are skipped.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Quat, Vec3};
use gltf::animation::util::ReadOutputs;

use crate::animation::{AnimationClip, Interpolation, Track, TrackValues};
use crate::config::DEFAULT_ASSET_ROOT;
use crate::error::LoadError;
use crate::loader::{AssetLoader, CompletionSender, LoadRequest, LoadedAsset};
use crate::mesh::MeshData;
use crate::scene::{NodeKind, Subtree, Transform};

#[derive(Debug, Clone)]
pub struct GltfLoader {
    root: String,
}

impl GltfLoader {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    /// Asset root from the environment, `static` when unset. Web builds
    /// resolve against the page instead.
    pub fn from_env() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                Self::new(DEFAULT_ASSET_ROOT)
            } else {
                Self::new(
                    std::env::var(crate::config::ASSET_ROOT_ENV)
                        .unwrap_or_else(|_| DEFAULT_ASSET_ROOT.to_string()),
                )
            }
        }
    }
}

impl Default for GltfLoader {
    fn default() -> Self {
        Self::from_env()
    }
}

// ======================================
// === NATIVE ===
// ======================================

#[cfg(not(target_arch = "wasm32"))]
impl AssetLoader for GltfLoader {
    fn load(&self, request: LoadRequest, completions: CompletionSender) {
        let path = std::path::Path::new(&self.root).join(request.resource.trim_start_matches('/'));
        log::info!("Loading {}", path.display());

        let spawned = std::thread::Builder::new()
            .name(format!("load {}", request.resource))
            .spawn({
                let request = request.clone();
                let completions = completions.clone();
                move || {
                    let result = import_file(&path, &request.resource);
                    completions.complete(request, result);
                }
            });

        if let Err(err) = spawned {
            completions.complete(request, Err(LoadError::Io(err)));
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn import_file(path: &std::path::Path, name: &str) -> Result<LoadedAsset, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound(path.display().to_string()));
    }

    let gltf::Gltf { document, blob } = gltf::Gltf::open(path)?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob)?;
    build_asset(name, &document, &buffers)
}

// ======================================
// === WEB ===
// ======================================

#[cfg(target_arch = "wasm32")]
impl AssetLoader for GltfLoader {
    fn load(&self, request: LoadRequest, completions: CompletionSender) {
        log::info!("Fetching {}", request.resource);
        wasm_bindgen_futures::spawn_local(async move {
            let result = web::fetch_asset(&request.resource).await;
            completions.complete(request, result);
        });
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    use js_sys::Uint8Array;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{Response, Url};

    use super::build_asset;
    use crate::error::LoadError;
    use crate::loader::LoadedAsset;

    fn fetch_error(url: &str, reason: impl Into<String>) -> LoadError {
        LoadError::Fetch {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    fn resolve(url: &str, base: &str) -> Result<String, LoadError> {
        Url::new_with_base(url, base)
            .map(|u| u.href())
            .map_err(|e| fetch_error(url, format!("{e:?}")))
    }

    async fn fetch_bytes(url: &str) -> Result<Vec<u8>, LoadError> {
        let window = web_sys::window().ok_or_else(|| fetch_error(url, "no window"))?;
        let response = JsFuture::from(window.fetch_with_str(url))
            .await
            .map_err(|e| fetch_error(url, format!("{e:?}")))?
            .dyn_into::<Response>()
            .map_err(|_| fetch_error(url, "not a Response"))?;

        if response.status() == 404 {
            return Err(LoadError::NotFound(url.to_string()));
        }
        if !response.ok() {
            return Err(fetch_error(url, format!("HTTP {}", response.status())));
        }

        let body = response
            .array_buffer()
            .map_err(|e| fetch_error(url, format!("{e:?}")))?;
        let buffer = JsFuture::from(body)
            .await
            .map_err(|e| fetch_error(url, format!("{e:?}")))?;
        Ok(Uint8Array::new(&buffer).to_vec())
    }

    pub async fn fetch_asset(resource: &str) -> Result<LoadedAsset, LoadError> {
        let page = web_sys::window()
            .ok_or_else(|| fetch_error(resource, "no window"))?
            .location()
            .href()
            .map_err(|e| fetch_error(resource, format!("{e:?}")))?;
        let document_url = resolve(resource, &page)?;

        let bytes = fetch_bytes(&document_url).await?;
        let gltf::Gltf { document, mut blob } = gltf::Gltf::from_slice(&bytes)?;

        let mut buffers = Vec::new();
        for buffer in document.buffers() {
            let mut data = match buffer.source() {
                gltf::buffer::Source::Bin => blob
                    .take()
                    .ok_or(LoadError::MissingBuffer(buffer.index()))?,
                gltf::buffer::Source::Uri(uri) => fetch_bytes(&resolve(uri, &document_url)?).await?,
            };
            while data.len() % 4 != 0 {
                data.push(0);
            }
            buffers.push(gltf::buffer::Data(data));
        }

        build_asset(resource, &document, &buffers)
    }
}

// ======================================
// === DOCUMENT DECODING ===
// ======================================

/// Builds the subtree and clips from a parsed document and its buffers.
pub fn build_asset(
    name: &str,
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> Result<LoadedAsset, LoadError> {
    for buffer in document.buffers() {
        match buffers.get(buffer.index()) {
            Some(data) if data.0.len() >= buffer.length() => {}
            _ => return Err(LoadError::MissingBuffer(buffer.index())),
        }
    }

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(LoadError::EmptyDocument)?;

    let mut subtree = Subtree::new(name);
    let mut locals = HashMap::new();
    for node in scene.nodes() {
        visit_node(&node, Subtree::ROOT, buffers, &mut subtree, &mut locals)?;
    }

    let clips = document
        .animations()
        .map(|animation| read_clip(&animation, buffers, &locals))
        .collect::<Vec<_>>();

    log::info!(
        "Decoded {}: {} nodes, {} clip(s)",
        name,
        subtree.len(),
        clips.len()
    );

    Ok(LoadedAsset::new(subtree).with_clips(clips))
}

fn visit_node(
    node: &gltf::Node,
    parent: usize,
    buffers: &[gltf::buffer::Data],
    subtree: &mut Subtree,
    locals: &mut HashMap<usize, usize>,
) -> Result<(), LoadError> {
    if locals.contains_key(&node.index()) {
        log::warn!("Node {} is reachable twice, second visit skipped", node.index());
        return Ok(());
    }

    let (translation, rotation, scale) = node.transform().decomposed();
    let transform = Transform {
        position: Vec3::from(translation),
        rotation: Quat::from_array(rotation).normalize(),
        scale: Vec3::from(scale),
    };

    let kind = match node.mesh() {
        Some(mesh) => {
            let meshes = mesh
                .primitives()
                .filter_map(|primitive| read_primitive(&primitive, buffers))
                .map(Arc::new)
                .collect();
            NodeKind::Mesh(meshes)
        }
        None => NodeKind::Group,
    };

    let name = node
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node{}", node.index()));
    let local = subtree.add_node(parent, name, transform, kind)?;
    locals.insert(node.index(), local);

    for child in node.children() {
        visit_node(&child, local, buffers, subtree, locals)?;
    }
    Ok(())
}

fn read_primitive(primitive: &gltf::Primitive, buffers: &[gltf::buffer::Data]) -> Option<MeshData> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        log::debug!("Skipping {:?} primitive", primitive.mode());
        return None;
    }

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    let normals = reader.read_normals().map(|n| n.collect());
    let indices = reader.read_indices().map(|i| i.into_u32().collect());
    let base_color = primitive
        .material()
        .pbr_metallic_roughness()
        .base_color_factor();

    Some(MeshData::new(positions, normals, indices, base_color))
}

fn read_clip(
    animation: &gltf::Animation,
    buffers: &[gltf::buffer::Data],
    locals: &HashMap<usize, usize>,
) -> Arc<AnimationClip> {
    let tracks = animation
        .channels()
        .filter_map(|channel| {
            let target = *locals.get(&channel.target().node().index())?;
            let sampler = channel.sampler();
            let cubic = sampler.interpolation() == gltf::animation::Interpolation::CubicSpline;
            let interpolation = match sampler.interpolation() {
                gltf::animation::Interpolation::Step => Interpolation::Step,
                _ => Interpolation::Linear,
            };

            let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
            let times: Vec<f32> = reader.read_inputs()?.collect();
            let values = match reader.read_outputs()? {
                ReadOutputs::Translations(v) => {
                    TrackValues::Translation(keys(v.map(Vec3::from), cubic))
                }
                ReadOutputs::Rotations(q) => TrackValues::Rotation(keys(
                    q.into_f32().map(|r| Quat::from_array(r).normalize()),
                    cubic,
                )),
                ReadOutputs::Scales(v) => TrackValues::Scale(keys(v.map(Vec3::from), cubic)),
                ReadOutputs::MorphTargetWeights(_) => return None,
            };

            Track::new(target, times, values, interpolation)
        })
        .collect::<Vec<_>>();

    let name = animation
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("clip{}", animation.index()));
    Arc::new(AnimationClip::new(name, tracks))
}

// Cubic-spline outputs come as (in-tangent, value, out-tangent) triples.
fn keys<T>(values: impl Iterator<Item = T>, cubic: bool) -> Vec<T> {
    if cubic {
        values.skip(1).step_by(3).collect()
    } else {
        values.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;
    use approx::assert_relative_eq;

    const DOCUMENT: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "body", "mesh": 0, "children": [1] },
            { "name": "tail", "translation": [0.0, 0.0, 1.0] }
        ],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "animations": [{
            "name": "wag",
            "channels": [{ "sampler": 0, "target": { "node": 1, "path": "translation" } }],
            "samplers": [{ "input": 1, "output": 2 }]
        }],
        "buffers": [{ "byteLength": 68 }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 44, "byteLength": 24 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5126, "count": 2, "type": "SCALAR",
              "min": [0.0], "max": [2.0] },
            { "bufferView": 2, "componentType": 5126, "count": 2, "type": "VEC3" }
        ]
    }"#;

    fn binary() -> Vec<u8> {
        let floats: [f32; 17] = [
            // triangle
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, //
            // key times
            0.0, 2.0, //
            // tail translations
            0.0, 0.0, 1.0, 0.0, 1.0, 1.0,
        ];
        floats.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn chunk(kind: &[u8; 4], mut data: Vec<u8>, pad: u8) -> Vec<u8> {
        while data.len() % 4 != 0 {
            data.push(pad);
        }
        let mut out = (data.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend(data);
        out
    }

    fn glb() -> Vec<u8> {
        let json = chunk(b"JSON", DOCUMENT.as_bytes().to_vec(), b' ');
        let bin = chunk(b"BIN\0", binary(), 0);
        let total = 12 + json.len() + bin.len();

        let mut out = b"glTF".to_vec();
        out.extend(2u32.to_le_bytes());
        out.extend((total as u32).to_le_bytes());
        out.extend(json);
        out.extend(bin);
        out
    }

    fn decode() -> LoadedAsset {
        let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(&glb()).unwrap();
        let buffers = vec![gltf::buffer::Data(blob.unwrap())];
        build_asset("creature", &document, &buffers).unwrap()
    }

    #[test]
    fn decodes_hierarchy_and_geometry() {
        let asset = decode();
        let subtree = &asset.subtree;
        assert_eq!(subtree.len(), 3);
        assert_eq!(subtree.node(Subtree::ROOT).unwrap().name, "creature");

        let body = subtree.node(1).unwrap();
        assert_eq!(body.name, "body");
        match &body.kind {
            NodeKind::Mesh(meshes) => {
                assert_eq!(meshes.len(), 1);
                assert_eq!(meshes[0].vertex_count(), 3);
                assert_eq!(meshes[0].indices, vec![0, 1, 2]);
            }
            other => panic!("expected mesh, got {other:?}"),
        }

        let tail = subtree.node(2).unwrap();
        assert_eq!(tail.transform.position, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn decodes_clip_targeting_local_nodes() {
        let asset = decode();
        assert!(asset.has_clips());
        let clip = &asset.clips[0];
        assert_eq!(clip.name(), "wag");
        assert_relative_eq!(clip.duration(), 2.0);
        assert_eq!(clip.tracks()[0].target(), 2);
    }

    #[test]
    fn decoded_clip_animates_inserted_subtree() {
        use crate::animation::AnimationRegistry;
        use crate::scene::Placement;

        let asset = decode();
        let mut graph = SceneGraph::new();
        let handle = graph.insert_subtree(asset.subtree, &Placement::new(Vec3::ZERO, 1.0));
        let mut registry = AnimationRegistry::new();
        registry.register(&handle, &asset.clips, 0).unwrap();

        registry.advance_all(&mut graph, 1.0);
        let tail = graph.node(handle.resolve(2).unwrap()).unwrap();
        assert_relative_eq!(tail.transform.position.y, 0.5);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let gltf::Gltf { document, .. } = gltf::Gltf::from_slice(&glb()).unwrap();
        let buffers = vec![gltf::buffer::Data(vec![0; 8])];
        assert!(matches!(
            build_asset("creature", &document, &buffers),
            Err(LoadError::MissingBuffer(0))
        ));
    }

    #[test]
    fn cubic_keys_keep_the_middle_value() {
        assert_eq!(keys([0, 1, 2, 3, 4, 5].into_iter(), true), vec![1, 4]);
        assert_eq!(keys([0, 1].into_iter(), false), vec![0, 1]);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn missing_file_reports_not_found() {
        use crate::loader::{LoadQueue, RequestId};
        use crate::scene::Placement;

        let queue = LoadQueue::new();
        let loader = GltfLoader::new("does-not-exist");
        loader.load(
            LoadRequest {
                id: RequestId(0),
                resource: "/animate/moon/scene.gltf".into(),
                placement: Placement::new(Vec3::ZERO, 1.0),
                clip_index: None,
            },
            queue.sender(),
        );

        let completion = next_completion(&queue);
        assert!(matches!(completion.result, Err(LoadError::NotFound(_))));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn loads_gltf_with_external_buffer_from_disk() {
        use crate::loader::{LoadQueue, RequestId};
        use crate::scene::Placement;

        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("animate").join("wolf");
        std::fs::create_dir_all(&model_dir).unwrap();
        let document = DOCUMENT.replace(
            r#""buffers": [{ "byteLength": 68 }]"#,
            r#""buffers": [{ "byteLength": 68, "uri": "scene.bin" }]"#,
        );
        assert_ne!(document, DOCUMENT);
        std::fs::write(model_dir.join("scene.gltf"), document).unwrap();
        std::fs::write(model_dir.join("scene.bin"), binary()).unwrap();

        let queue = LoadQueue::new();
        let loader = GltfLoader::new(dir.path().display().to_string());
        loader.load(
            LoadRequest {
                id: RequestId(4),
                resource: "/animate/wolf/scene.gltf".into(),
                placement: Placement::new(Vec3::ZERO, 1.0),
                clip_index: Some(0),
            },
            queue.sender(),
        );

        let completion = next_completion(&queue);
        assert_eq!(completion.request.id, RequestId(4));
        let asset = completion.result.unwrap();
        assert_eq!(asset.subtree.len(), 3);
        assert_eq!(asset.subtree.node(Subtree::ROOT).unwrap().name, "/animate/wolf/scene.gltf");
        assert_eq!(asset.clips.len(), 1);
        assert_relative_eq!(asset.clips[0].duration(), 2.0);
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn next_completion(queue: &crate::loader::LoadQueue) -> crate::loader::LoadCompletion {
        loop {
            if let Some(c) = queue.drain().pop() {
                break c;
            }
            std::thread::yield_now();
        }
    }
}
