// ==============================================================================
// assets.rs — SCENE DESCRIPTIONS + THE READINESS BARRIER
// ------------------------------------------------------------------------------
// A scene is a named bounding box with named child parts (the car model and
// its tires). Loads run concurrently; the barrier resolves once every
// requested scene is in, fails fast on the first loader error, and gives up
// after a timeout listing what was still outstanding.
// ==============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AssetConfig;
use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePart {
    pub name: String,
    pub position: [f32; 3], // relative to the scene origin
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAsset {
    pub name: String,
    pub size: [f32; 3], // bounding box, full extents
    #[serde(default)]
    pub parts: Vec<ScenePart>,
}

impl SceneAsset {
    pub fn part(&self, name: &str) -> SimResult<&ScenePart> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| SimError::MissingPart {
                asset: self.name.clone(),
                part: name.to_string(),
            })
    }

    /// `size` is the full box, so this halves it. Scenes authored for a
    /// layer that read `size` as half extents come out half as large.
    pub fn half_extents(&self) -> [f32; 3] {
        [self.size[0] * 0.5, self.size[1] * 0.5, self.size[2] * 0.5]
    }
}

/// Something that can produce scenes by identifier.
pub trait AssetSource: Send + Sync {
    fn load<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SimResult<SceneAsset>>;
}

/// Scenes held in memory, optionally delivered after a fixed latency.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetSource {
    scenes: HashMap<String, SceneAsset>,
    latency: Duration,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn insert(&mut self, scene: SceneAsset) {
        self.scenes.insert(scene.name.clone(), scene);
    }

    /// The stock car: body "prova" with four tires, plus the separately
    /// modelled front-left wheel "flwheel".
    pub fn default_car() -> Self {
        let tire = |name: &str, x: f32, z: f32| ScenePart {
            name: name.to_string(),
            position: [x, -0.35, z],
        };
        let mut source = Self::new();
        source.insert(SceneAsset {
            name: "prova".to_string(),
            size: [1.8, 1.0, 4.4],
            parts: vec![
                tire("tire_01", 0.83, -1.42),
                tire("tire_02", -0.83, -1.42),
                tire("tire_03", 0.83, 1.19),
                tire("tire_04", -0.83, 1.19),
            ],
        });
        source.insert(SceneAsset {
            name: "flwheel".to_string(),
            size: [0.25, 0.67, 0.67],
            parts: Vec::new(),
        });
        source
    }
}

impl AssetSource for MemoryAssetSource {
    fn load<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SimResult<SceneAsset>> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.scenes
                .get(id)
                .cloned()
                .ok_or_else(|| SimError::UnknownAsset(id.to_string()))
        })
    }
}

/// Scenes stored as `<root>/<id>.json`.
#[derive(Debug, Clone)]
pub struct DirAssetSource {
    pub root: PathBuf,
}

impl AssetSource for DirAssetSource {
    fn load<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SimResult<SceneAsset>> {
        Box::pin(async move {
            let path = self.root.join(format!("{id}.json"));
            let text = tokio::fs::read_to_string(&path).await.map_err(|e| SimError::AssetLoad {
                asset: id.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
            serde_json::from_str(&text).map_err(|e| SimError::AssetLoad {
                asset: id.to_string(),
                reason: e.to_string(),
            })
        })
    }
}

/// Every scene the configured car needs, chassis first.
pub fn required_assets(config: &AssetConfig) -> Vec<String> {
    let mut ids = vec![config.chassis_asset.clone()];
    if let Some(fl) = &config.front_left_asset {
        if fl != &config.chassis_asset {
            ids.push(fl.clone());
        }
    }
    ids
}

#[derive(Debug, Clone, Default)]
pub struct LoadedAssets {
    scenes: HashMap<String, SceneAsset>,
}

impl LoadedAssets {
    pub fn get(&self, id: &str) -> SimResult<&SceneAsset> {
        self.scenes
            .get(id)
            .ok_or_else(|| SimError::UnknownAsset(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

/// Starts every load at once and waits for all of them.
pub async fn load_all(
    source: &dyn AssetSource,
    ids: &[String],
    timeout: Duration,
) -> SimResult<LoadedAssets> {
    let mut pending: FuturesUnordered<_> = ids
        .iter()
        .map(|id| async move { (id.as_str(), source.load(id).await) })
        .collect();

    let mut scenes = HashMap::with_capacity(ids.len());
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    while !pending.is_empty() {
        tokio::select! {
            Some((id, result)) = pending.next() => {
                let scene = result?;
                debug!(asset = id, parts = scene.parts.len(), "asset loaded");
                scenes.insert(id.to_string(), scene);
            }
            _ = &mut deadline => {
                let outstanding = ids
                    .iter()
                    .filter(|id| !scenes.contains_key(id.as_str()))
                    .cloned()
                    .collect();
                return Err(SimError::AssetTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                    pending: outstanding,
                });
            }
        }
    }

    info!(count = scenes.len(), "all assets ready");
    Ok(LoadedAssets { scenes })
}
