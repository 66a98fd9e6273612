use glam::{UVec2, Vec3};

use crate::color::Color;
use crate::config::{FOG_COLOR, FOG_FAR, FOG_NEAR};
use crate::error::SceneError;
use crate::scene::{NodeId, NodeKind, SceneGraph, Transform};

// Ambient fill
const AMBIENT_COLOR: &str = "#b9d5ff";
const AMBIENT_INTENSITY: f32 = 1.0;

// Moonlight. Authored as "#0xfffff", which never parsed; white is what rendered.
const SUN_COLOR: &str = "#ffffff";
const SUN_INTENSITY: f32 = 1.0;
const SUN_POSITION: Vec3 = Vec3::new(0.0, 1.0, 0.0);
const SUN_SHADOW_MAP: u32 = 512;
const SUN_SHADOW_FAR: f32 = 500.0;

// Door light on the house
const BEACON_COLOR: &str = "#ff7d46";
const BEACON_INTENSITY: f32 = 3.0;
const BEACON_DISTANCE: f32 = 7.0;
const BEACON_DECAY: f32 = 2.0;
const BEACON_POSITION: Vec3 = Vec3::new(0.0, 2.2, 2.7);
const BEACON_SHADOW_MAP: u32 = 256;
const BEACON_SHADOW_FAR: f32 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Ambient,
    /// Shines from the node position toward `target`.
    Directional { target: Vec3 },
    /// `distance` of zero means no cutoff.
    Point { distance: f32, decay: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    pub map_size: UVec2,
    pub camera_far: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Color,
    pub intensity: f32,
    pub shadow: Option<ShadowSettings>,
}

impl Light {
    pub fn radiance(&self) -> Color {
        self.color.scaled(self.intensity)
    }

    pub fn casts_shadow(&self) -> bool {
        self.shadow.is_some()
    }
}

// A light resolved to world space for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedLight {
    pub light: Light,
    pub position: Vec3,
}

impl PlacedLight {
    /// Unit vector from the lit surface toward a directional light.
    pub fn direction_to_light(&self) -> Option<Vec3> {
        match self.light.kind {
            LightKind::Directional { target } => (self.position - target).try_normalize(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub color: Color,
    pub near: f32,
    pub far: f32,
}

impl Fog {
    pub fn atmosphere() -> Result<Self, SceneError> {
        Ok(Self {
            color: Color::from_hex(FOG_COLOR)?,
            near: FOG_NEAR,
            far: FOG_FAR,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LightRig {
    pub ambient: NodeId,
    pub sun: NodeId,
    pub house: NodeId,
    pub beacon: NodeId,
}

impl LightRig {
    pub fn install(graph: &mut SceneGraph) -> Result<Self, SceneError> {
        let root = graph.root();

        let ambient = graph.add_node(
            root,
            "ambient",
            Transform::IDENTITY,
            NodeKind::Light(Light {
                kind: LightKind::Ambient,
                color: Color::from_hex(AMBIENT_COLOR)?,
                intensity: AMBIENT_INTENSITY,
                shadow: None,
            }),
        )?;

        let sun = graph.add_node(
            root,
            "sun",
            Transform::from_translation(SUN_POSITION),
            NodeKind::Light(Light {
                kind: LightKind::Directional { target: Vec3::ZERO },
                color: Color::from_hex(SUN_COLOR)?,
                intensity: SUN_INTENSITY,
                shadow: Some(ShadowSettings {
                    map_size: UVec2::splat(SUN_SHADOW_MAP),
                    camera_far: SUN_SHADOW_FAR,
                }),
            }),
        )?;

        let house = graph.add_node(root, "house", Transform::IDENTITY, NodeKind::Group)?;

        let beacon = graph.add_node(
            house,
            "beacon",
            Transform::from_translation(BEACON_POSITION),
            NodeKind::Light(Light {
                kind: LightKind::Point {
                    distance: BEACON_DISTANCE,
                    decay: BEACON_DECAY,
                },
                color: Color::from_hex(BEACON_COLOR)?,
                intensity: BEACON_INTENSITY,
                shadow: Some(ShadowSettings {
                    map_size: UVec2::splat(BEACON_SHADOW_MAP),
                    camera_far: BEACON_SHADOW_FAR,
                }),
            }),
        )?;

        log::debug!("Light rig installed: ambient, sun, beacon");

        Ok(Self {
            ambient,
            sun,
            house,
            beacon,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn installs_three_lights_and_the_house_group() {
        let mut graph = SceneGraph::new();
        let rig = LightRig::install(&mut graph).unwrap();

        assert_eq!(
            graph.children(graph.root()),
            &[rig.ambient, rig.sun, rig.house]
        );
        assert_eq!(graph.children(rig.house), &[rig.beacon]);

        let lights = graph.lights();
        assert_eq!(lights.len(), 3);
        assert_eq!(lights.iter().filter(|l| l.light.casts_shadow()).count(), 2);
    }

    #[test]
    fn beacon_keeps_its_falloff_and_shadow_map() {
        let mut graph = SceneGraph::new();
        LightRig::install(&mut graph).unwrap();

        let beacon = graph
            .lights()
            .into_iter()
            .find(|l| matches!(l.light.kind, LightKind::Point { .. }))
            .unwrap();

        assert_eq!(beacon.position, BEACON_POSITION);
        assert_eq!(
            beacon.light.kind,
            LightKind::Point { distance: 7.0, decay: 2.0 }
        );
        let shadow = beacon.light.shadow.unwrap();
        assert_eq!(shadow.map_size, UVec2::new(256, 256));
        assert_relative_eq!(shadow.camera_far, 7.0);
    }

    #[test]
    fn sun_is_white_and_points_down() {
        let mut graph = SceneGraph::new();
        LightRig::install(&mut graph).unwrap();

        let sun = graph
            .lights()
            .into_iter()
            .find(|l| matches!(l.light.kind, LightKind::Directional { .. }))
            .unwrap();

        assert_relative_eq!(sun.light.color.r, 1.0);
        assert_relative_eq!(sun.light.color.g, 1.0);
        assert_relative_eq!(sun.light.color.b, 1.0);
        assert_eq!(sun.direction_to_light(), Some(Vec3::Y));
    }
}
