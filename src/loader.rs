use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::animation::AnimationClip;
use crate::error::LoadError;
use crate::scene::{Placement, Subtree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub usize);

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub id: RequestId,
    pub resource: String,
    pub placement: Placement,
    pub clip_index: Option<usize>,
}

/// What a successful load yields: the scene fragment and every clip the
/// document carries, in document order.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub subtree: Subtree,
    pub clips: Vec<Arc<AnimationClip>>,
}

impl LoadedAsset {
    pub fn new(subtree: Subtree) -> Self {
        Self {
            subtree,
            clips: Vec::new(),
        }
    }

    pub fn with_clips(mut self, clips: Vec<Arc<AnimationClip>>) -> Self {
        self.clips = clips;
        self
    }

    pub fn has_clips(&self) -> bool {
        !self.clips.is_empty()
    }
}

#[derive(Debug)]
pub struct LoadCompletion {
    pub request: LoadRequest,
    pub result: Result<LoadedAsset, LoadError>,
}

/// Producer half handed to loaders. Cloneable and sendable across threads.
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: Sender<LoadCompletion>,
}

impl CompletionSender {
    pub fn complete(&self, request: LoadRequest, result: Result<LoadedAsset, LoadError>) {
        let resource = request.resource.clone();
        if self.tx.send(LoadCompletion { request, result }).is_err() {
            log::debug!("Completion for {} dropped, scene is gone", resource);
        }
    }
}

/// Completions wait here until the frame loop drains them, so the scene is
/// only ever mutated from the loop.
#[derive(Debug)]
pub struct LoadQueue {
    tx: Sender<LoadCompletion>,
    rx: Receiver<LoadCompletion>,
}

impl LoadQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> CompletionSender {
        CompletionSender { tx: self.tx.clone() }
    }

    /// Everything that has arrived so far, in arrival order. Never blocks.
    pub fn drain(&self) -> Vec<LoadCompletion> {
        self.rx.try_iter().collect()
    }
}

impl Default for LoadQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Produces subtrees asynchronously. `load` returns at once; the completion
/// is sent exactly once, at any later time, from any thread or task.
pub trait AssetLoader {
    fn load(&self, request: LoadRequest, completions: CompletionSender);
}
