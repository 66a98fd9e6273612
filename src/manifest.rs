use glam::{Quat, Vec3};

use crate::loader::{LoadRequest, RequestId};
use crate::scene::Placement;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifestEntry {
    pub resource: &'static str,
    pub position: Vec3,
    pub scale: f32,
    /// Extra rotation about +Y, in radians.
    pub yaw: Option<f32>,
    pub clip_index: Option<usize>,
}

impl ManifestEntry {
    pub fn placement(&self) -> Placement {
        let placement = Placement::new(self.position, self.scale);
        match self.yaw {
            Some(yaw) => placement.with_rotation(Quat::from_rotation_y(yaw)),
            None => placement,
        }
    }

    pub fn request(&self, id: RequestId) -> LoadRequest {
        LoadRequest {
            id,
            resource: self.resource.to_string(),
            placement: self.placement(),
            clip_index: self.clip_index,
        }
    }
}

pub const SCENE_MANIFEST: [ManifestEntry; 5] = [
    ManifestEntry {
        resource: "/models/hauntedHouse4/scene.gltf",
        position: Vec3::new(0.0, 0.0, 4.0),
        scale: 0.8,
        yaw: None,
        clip_index: None,
    },
    ManifestEntry {
        resource: "/animate/ghost1/scene.gltf",
        position: Vec3::new(-2.0, 4.2, -2.0),
        scale: 0.005,
        yaw: None,
        clip_index: None,
    },
    ManifestEntry {
        resource: "/animate/moon/scene.gltf",
        position: Vec3::new(3.0, 5.0, -6.0),
        scale: 1.5,
        yaw: None,
        clip_index: None,
    },
    ManifestEntry {
        resource: "/animate/zombie/scene.gltf",
        position: Vec3::new(-7.0, -0.6, 0.5),
        scale: 0.9,
        yaw: Some(1.2),
        clip_index: Some(0),
    },
    ManifestEntry {
        resource: "/animate/wolf_with_animations/scene.gltf",
        position: Vec3::new(2.0, 0.4, 3.0),
        scale: 1.5,
        yaw: Some(1.2),
        clip_index: Some(3),
    },
];
