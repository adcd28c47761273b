use rapier3d::prelude::*;
use serde::Serialize;
use tracing::warn;

use crate::physics::PhysicsWorld;
use crate::vehicle::{VehicleModel, WheelTelemetry};

/// Where a proxy takes its transform from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxySource {
    Body(RigidBodyHandle),
    /// Index into the raycast vehicle's wheels.
    RaycastWheel(usize),
}

/// A renderable stand-in for one simulated part. Holds nothing but the pose
/// copied from the simulation after each step.
#[derive(Debug, Clone)]
pub struct VisualProxy {
    pub name: String,
    pub source: ProxySource,
    pub transform: Isometry<Real>,
}

#[derive(Debug, Default)]
pub struct ProxySet {
    proxies: Vec<VisualProxy>,
}

impl ProxySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, source: ProxySource) {
        self.proxies.push(VisualProxy {
            name: name.into(),
            source,
            transform: Isometry::identity(),
        });
    }

    /// Drops every proxy bound to `body`. Returns how many were removed.
    pub fn remove_body(&mut self, body: RigidBodyHandle) -> usize {
        let before = self.proxies.len();
        self.proxies.retain(|p| p.source != ProxySource::Body(body));
        before - self.proxies.len()
    }

    pub fn get(&self, name: &str) -> Option<&VisualProxy> {
        self.proxies.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisualProxy> {
        self.proxies.iter()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Copies every body pose, and recomputes every raycast wheel transform,
    /// into the proxies. A proxy whose source vanished keeps its last pose.
    pub fn sync(&mut self, world: &PhysicsWorld, vehicle: &mut VehicleModel) {
        for proxy in &mut self.proxies {
            match proxy.source {
                ProxySource::Body(handle) => match world.bodies.get(handle) {
                    Some(body) => proxy.transform = *body.position(),
                    None => warn!(proxy = %proxy.name, "proxy body missing"),
                },
                ProxySource::RaycastWheel(index) => {
                    let VehicleModel::Raycast(raycast) = &mut *vehicle else {
                        warn!(proxy = %proxy.name, "wheel proxy bound to a non-raycast vehicle");
                        continue;
                    };
                    match raycast.update_wheel_transform(world, index) {
                        Ok(iso) => proxy.transform = iso,
                        Err(err) => warn!(proxy = %proxy.name, %err, "wheel transform unavailable"),
                    }
                }
            }
        }
    }
}

// ============================================
// Render-side snapshot
// ============================================

#[derive(Debug, Clone, Serialize)]
pub struct ProxySnapshot {
    pub name: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4], // x, y, z, w
}

impl From<&VisualProxy> for ProxySnapshot {
    fn from(proxy: &VisualProxy) -> Self {
        let t = proxy.transform.translation.vector;
        let q = proxy.transform.rotation;
        Self {
            name: proxy.name.clone(),
            position: [t.x, t.y, t.z],
            rotation: [q.i, q.j, q.k, q.w],
        }
    }
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub elapsed: f32,
    pub substeps: usize,
    pub alpha: f32,
    pub speed_kmh: f32,
    pub proxies: Vec<ProxySnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub wheels: Vec<WheelTelemetry>,
}
