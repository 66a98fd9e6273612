use std::collections::BTreeSet;

use crate::animation::{AnimationRegistry, PlayerId};
use crate::camera::{CameraRig, PerspectiveCamera};
use crate::color::Color;
use crate::config::CLEAR_COLOR;
use crate::error::SceneError;
use crate::lights::{Fog, LightRig};
use crate::loader::{AssetLoader, CompletionSender, LoadCompletion, LoadQueue, RequestId};
use crate::manifest::ManifestEntry;
use crate::renderer::{Renderer, ShadowFilter};
use crate::scene::{NodeId, SceneGraph};
use crate::viewport::{ViewportState, on_resize};

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedEntry {
    pub request: RequestId,
    pub resource: String,
    pub root: NodeId,
    pub player: Option<PlayerId>,
}

/// Everything the frame loop and the host handlers mutate, owned in one
/// place and passed around by `&mut`.
pub struct SceneContext {
    pub graph: SceneGraph,
    pub lights: LightRig,
    pub camera: CameraRig,
    pub viewport: ViewportState,
    pub clear_color: Color,
    loads: LoadQueue,
    next_request: usize,
    pending: BTreeSet<RequestId>,
    loaded: Vec<LoadedEntry>,
    failed: Vec<RequestId>,
}

impl SceneContext {
    /// Builds the lit, fogged, empty scene. Models arrive later through
    /// [`SceneContext::issue_loads`].
    pub fn new(viewport: ViewportState) -> Result<Self, SceneError> {
        let mut graph = SceneGraph::new();
        let lights = LightRig::install(&mut graph)?;
        graph.set_fog(Some(Fog::atmosphere()?));

        let mut camera = PerspectiveCamera::scene_default();
        camera.set_aspect(viewport.aspect());

        Ok(Self {
            graph,
            lights,
            camera: CameraRig::orbit(camera),
            viewport,
            clear_color: Color::from_hex(CLEAR_COLOR)?,
            loads: LoadQueue::new(),
            next_request: 0,
            pending: BTreeSet::new(),
            loaded: Vec::new(),
            failed: Vec::new(),
        })
    }

    // Pushes the startup state into a freshly created renderer.
    pub fn configure_renderer(&self, renderer: &mut dyn Renderer) {
        renderer.set_clear_color(self.clear_color);
        renderer.configure_shadows(true, ShadowFilter::PcfSoft);
        if !self.viewport.is_zero_sized() {
            renderer.resize(
                self.viewport.width(),
                self.viewport.height(),
                self.viewport.pixel_ratio(),
            );
        }
    }

    pub fn resize(
        &mut self,
        renderer: Option<&mut dyn Renderer>,
        width: u32,
        height: u32,
        device_pixel_ratio: f64,
    ) {
        on_resize(
            &mut self.viewport,
            &mut self.camera.camera,
            renderer,
            width,
            height,
            device_pixel_ratio,
        );
    }

    pub fn completion_sender(&self) -> CompletionSender {
        self.loads.sender()
    }

    /// Starts one load per entry. Returns at once.
    pub fn issue_loads(&mut self, manifest: &[ManifestEntry], loader: &dyn AssetLoader) -> Vec<RequestId> {
        manifest
            .iter()
            .map(|entry| {
                let id = RequestId(self.next_request);
                self.next_request += 1;
                self.pending.insert(id);
                loader.load(entry.request(id), self.loads.sender());
                id
            })
            .collect()
    }

    /// Applies every completion that has arrived. Returns how many there were.
    pub fn drain_loads(&mut self, players: &mut AnimationRegistry) -> usize {
        let completions = self.loads.drain();
        let count = completions.len();
        for completion in completions {
            self.apply_completion(completion, players);
        }
        count
    }

    /// Inserts a finished load into the graph, or records the failure.
    /// Either way no other load is affected. Completions for requests that
    /// are not pending are dropped.
    pub fn apply_completion(&mut self, completion: LoadCompletion, players: &mut AnimationRegistry) {
        let LoadCompletion { request, result } = completion;
        if !self.pending.remove(&request.id) {
            log::warn!(
                "Dropped completion for {} ({:?}): not pending",
                request.resource,
                request.id
            );
            return;
        }

        let asset = match result {
            Ok(asset) => asset,
            Err(err) => {
                log::warn!("Load of {} failed: {}", request.resource, err);
                self.failed.push(request.id);
                return;
            }
        };

        let handle = self.graph.insert_subtree(asset.subtree, &request.placement);

        let player = request.clip_index.and_then(|index| {
            let player = players.register(&handle, &asset.clips, index);
            if player.is_none() {
                log::warn!(
                    "{} has {} clip(s), clip {} not played",
                    request.resource,
                    asset.clips.len(),
                    index
                );
            }
            player
        });

        log::info!(
            "Placed {} ({} nodes{})",
            request.resource,
            handle.len(),
            if player.is_some() { ", animated" } else { "" }
        );

        self.loaded.push(LoadedEntry {
            request: request.id,
            resource: request.resource,
            root: handle.root(),
            player,
        });
    }

    pub fn loaded(&self) -> &[LoadedEntry] {
        &self.loaded
    }

    pub fn failed(&self) -> &[RequestId] {
        &self.failed
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
