use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::scene::{NodeId, SceneGraph, SubtreeHandle, Transform};

// ======================================
// === CLIPS ===
// ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
}

#[derive(Debug, Clone)]
pub enum TrackValues {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

impl TrackValues {
    fn len(&self) -> usize {
        match self {
            TrackValues::Translation(v) | TrackValues::Scale(v) => v.len(),
            TrackValues::Rotation(q) => q.len(),
        }
    }
}

/// Keyframes for one property of one node. `target` is a local index into
/// the subtree the clip was loaded with.
#[derive(Debug, Clone)]
pub struct Track {
    target: usize,
    times: Vec<f32>,
    values: TrackValues,
    interpolation: Interpolation,
}

impl Track {
    /// Returns `None` for empty tracks, mismatched key counts or
    /// non-ascending key times.
    pub fn new(
        target: usize,
        times: Vec<f32>,
        values: TrackValues,
        interpolation: Interpolation,
    ) -> Option<Self> {
        if times.is_empty() || times.len() != values.len() {
            return None;
        }
        if times.windows(2).any(|w| !(w[0] <= w[1])) {
            return None;
        }

        Some(Self {
            target,
            times,
            values,
            interpolation,
        })
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    // Returns (lower key, upper key, blend factor).
    fn span(&self, t: f32) -> (usize, usize, f32) {
        let last = self.times.len() - 1;
        if t <= self.times[0] {
            return (0, 0, 0.0);
        }
        if t >= self.times[last] {
            return (last, last, 0.0);
        }

        let upper = self.times.partition_point(|&k| k <= t);
        let lower = upper - 1;
        let width = self.times[upper] - self.times[lower];
        let factor = if width > 0.0 {
            (t - self.times[lower]) / width
        } else {
            0.0
        };

        match self.interpolation {
            Interpolation::Step => (lower, lower, 0.0),
            Interpolation::Linear => (lower, upper, factor),
        }
    }

    fn apply(&self, t: f32, transform: &mut Transform) {
        let (a, b, f) = self.span(t);
        match &self.values {
            TrackValues::Translation(v) => transform.position = v[a].lerp(v[b], f),
            TrackValues::Rotation(q) => transform.rotation = q[a].slerp(q[b], f).normalize(),
            TrackValues::Scale(v) => transform.scale = v[a].lerp(v[b], f),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    name: String,
    tracks: Vec<Track>,
    duration: f32,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        let duration = tracks.iter().map(Track::end_time).fold(0.0, f32::max);
        Self {
            name: name.into(),
            tracks,
            duration,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

// ======================================
// === PLAYERS ===
// ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(usize);

/// Plays one clip on one subtree, looping. Each player keeps its own clock.
#[derive(Debug, Clone)]
pub struct AnimationPlayer {
    id: PlayerId,
    root: NodeId,
    clip: Arc<AnimationClip>,
    clip_index: usize,
    bindings: Vec<Option<NodeId>>,
    time: f64,
    playing: bool,
}

impl AnimationPlayer {
    fn new(id: PlayerId, handle: &SubtreeHandle, clip: Arc<AnimationClip>, clip_index: usize) -> Self {
        let bindings = clip
            .tracks()
            .iter()
            .map(|track| handle.resolve(track.target()))
            .collect::<Vec<_>>();

        let unbound = bindings.iter().filter(|b| b.is_none()).count();
        if unbound > 0 {
            log::warn!(
                "Clip '{}' has {} track(s) targeting nodes outside its subtree",
                clip.name(),
                unbound
            );
        }

        Self {
            id,
            root: handle.root(),
            clip,
            clip_index,
            bindings,
            time: 0.0,
            playing: true,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    pub fn clip_index(&self) -> usize {
        self.clip_index
    }

    /// Total playback time accumulated, not wrapped to the clip length.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn resume(&mut self) {
        self.playing = true;
    }

    // Position inside the clip after looping.
    pub fn sample_time(&self) -> f32 {
        let duration = f64::from(self.clip.duration());
        if duration <= 0.0 {
            return 0.0;
        }
        (self.time % duration) as f32
    }

    /// Advances playback and writes the pose. Zero, negative and non-finite
    /// deltas leave both time and pose untouched.
    pub fn advance(&mut self, graph: &mut SceneGraph, delta: f32) -> bool {
        if !self.playing || !delta.is_finite() || delta <= 0.0 {
            return false;
        }

        self.time += f64::from(delta);
        self.apply_pose(graph);
        true
    }

    fn apply_pose(&self, graph: &mut SceneGraph) {
        let t = self.sample_time();
        for (track, binding) in self.clip.tracks().iter().zip(&self.bindings) {
            if let Some(node) = binding.and_then(|id| graph.node_mut(id)) {
                track.apply(t, &mut node.transform);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct AnimationRegistry {
    players: Vec<AnimationPlayer>,
}

impl AnimationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the clip at `clip_index` to the inserted subtree. Only that clip
    /// is played; an index past the end registers nothing.
    pub fn register(
        &mut self,
        handle: &SubtreeHandle,
        clips: &[Arc<AnimationClip>],
        clip_index: usize,
    ) -> Option<PlayerId> {
        let clip = clips.get(clip_index)?;
        let id = PlayerId(self.players.len());
        self.players
            .push(AnimationPlayer::new(id, handle, Arc::clone(clip), clip_index));
        Some(id)
    }

    pub fn advance_all(&mut self, graph: &mut SceneGraph, delta: f32) -> usize {
        self.players
            .iter_mut()
            .map(|player| player.advance(graph, delta))
            .filter(|&advanced| advanced)
            .count()
    }

    pub fn get(&self, id: PlayerId) -> Option<&AnimationPlayer> {
        self.players.get(id.0)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut AnimationPlayer> {
        self.players.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnimationPlayer> {
        self.players.iter()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NodeKind, Placement, Subtree};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    // Root with one "bone" child that slides along x from 0 to 2 over 2s.
    fn slider() -> (Subtree, Arc<AnimationClip>) {
        let mut subtree = Subtree::new("slider");
        let bone = subtree
            .add_node(Subtree::ROOT, "bone", Transform::IDENTITY, NodeKind::Group)
            .unwrap();
        let track = Track::new(
            bone,
            vec![0.0, 2.0],
            TrackValues::Translation(vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)]),
            Interpolation::Linear,
        )
        .unwrap();
        (subtree, Arc::new(AnimationClip::new("slide", vec![track])))
    }

    fn setup() -> (SceneGraph, SubtreeHandle, AnimationRegistry, PlayerId) {
        let (subtree, clip) = slider();
        let mut graph = SceneGraph::new();
        let handle = graph.insert_subtree(subtree, &Placement::new(Vec3::ZERO, 1.0));
        let mut registry = AnimationRegistry::new();
        let id = registry.register(&handle, &[clip], 0).unwrap();
        (graph, handle, registry, id)
    }

    fn bone_x(graph: &SceneGraph, handle: &SubtreeHandle) -> f32 {
        graph.node(handle.resolve(1).unwrap()).unwrap().transform.position.x
    }

    #[test]
    fn advance_interpolates_the_pose() {
        let (mut graph, handle, mut registry, _) = setup();
        assert_eq!(registry.advance_all(&mut graph, 0.5), 1);
        assert_relative_eq!(bone_x(&graph, &handle), 0.5);
        registry.advance_all(&mut graph, 0.75);
        assert_relative_eq!(bone_x(&graph, &handle), 1.25);
    }

    #[test]
    fn playback_loops_past_the_clip_end() {
        let (mut graph, handle, mut registry, id) = setup();
        registry.advance_all(&mut graph, 2.5);
        assert_relative_eq!(bone_x(&graph, &handle), 0.5, epsilon = 1e-5);
        assert_relative_eq!(registry.get(id).unwrap().time(), 2.5);
    }

    #[test]
    fn full_duration_then_zero_reads_back_the_duration() {
        let (mut graph, _, mut registry, id) = setup();
        let duration = registry.get(id).unwrap().clip().duration();

        registry.advance_all(&mut graph, duration);
        registry.advance_all(&mut graph, 0.0);
        assert_eq!(registry.get(id).unwrap().time(), f64::from(duration));
    }

    #[test]
    fn out_of_range_clip_index_registers_nothing() {
        let (subtree, clip) = slider();
        let mut graph = SceneGraph::new();
        let handle = graph.insert_subtree(subtree, &Placement::new(Vec3::ZERO, 1.0));
        let mut registry = AnimationRegistry::new();
        assert_eq!(registry.register(&handle, &[clip], 3), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn paused_players_hold_their_pose() {
        let (mut graph, handle, mut registry, id) = setup();
        registry.advance_all(&mut graph, 0.5);
        registry.get_mut(id).unwrap().pause();
        assert_eq!(registry.advance_all(&mut graph, 0.5), 0);
        assert_relative_eq!(bone_x(&graph, &handle), 0.5);

        registry.get_mut(id).unwrap().resume();
        registry.advance_all(&mut graph, 0.5);
        assert_relative_eq!(bone_x(&graph, &handle), 1.0);
    }

    #[test]
    fn step_tracks_hold_the_previous_key() {
        let track = Track::new(
            0,
            vec![0.0, 1.0, 2.0],
            TrackValues::Scale(vec![Vec3::ONE, Vec3::splat(2.0), Vec3::splat(3.0)]),
            Interpolation::Step,
        )
        .unwrap();
        let mut t = Transform::IDENTITY;
        track.apply(1.5, &mut t);
        assert_eq!(t.scale, Vec3::splat(2.0));
        track.apply(5.0, &mut t);
        assert_eq!(t.scale, Vec3::splat(3.0));
    }

    #[test]
    fn rejects_malformed_tracks() {
        let values = || TrackValues::Translation(vec![Vec3::ZERO, Vec3::ONE]);
        assert!(Track::new(0, vec![0.0], values(), Interpolation::Linear).is_none());
        assert!(Track::new(0, vec![1.0, 0.0], values(), Interpolation::Linear).is_none());
        assert!(Track::new(0, vec![0.0, f32::NAN], values(), Interpolation::Linear).is_none());
    }

    #[test]
    fn players_keep_independent_clocks() {
        let (subtree_a, clip) = slider();
        let (subtree_b, _) = slider();
        let mut graph = SceneGraph::new();
        let a = graph.insert_subtree(subtree_a, &Placement::new(Vec3::ZERO, 1.0));
        let mut registry = AnimationRegistry::new();
        registry.register(&a, &[Arc::clone(&clip)], 0).unwrap();
        registry.advance_all(&mut graph, 1.0);

        // A player registered later starts from zero, not from the shared elapsed time.
        let b = graph.insert_subtree(subtree_b, &Placement::new(Vec3::ZERO, 1.0));
        let late = registry.register(&b, &[clip], 0).unwrap();
        registry.advance_all(&mut graph, 0.25);

        assert_relative_eq!(bone_x(&graph, &a), 1.25);
        assert_relative_eq!(bone_x(&graph, &b), 0.25);
        assert_relative_eq!(registry.get(late).unwrap().time(), 0.25);
    }

    proptest! {
        #[test]
        fn non_positive_or_nan_deltas_are_no_ops(
            warmup in 0.01f32..1.9,
            delta in prop_oneof![Just(f32::NAN), Just(f32::NEG_INFINITY), Just(0.0f32), -10.0f32..0.0],
        ) {
            let (mut graph, handle, mut registry, id) = setup();
            registry.advance_all(&mut graph, warmup);
            let pose = graph.node(handle.resolve(1).unwrap()).unwrap().transform;
            let time = registry.get(id).unwrap().time();

            prop_assert_eq!(registry.advance_all(&mut graph, delta), 0);
            prop_assert_eq!(graph.node(handle.resolve(1).unwrap()).unwrap().transform, pose);
            prop_assert_eq!(registry.get(id).unwrap().time(), time);
        }
    }
}
