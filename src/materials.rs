// ==============================================================================
// materials.rs — NAMED SURFACE MATERIALS + PAIRWISE CONTACT COEFFICIENTS
// ------------------------------------------------------------------------------
// rapier combines per-collider friction/restitution with a combine rule. The
// vehicle needs coefficients keyed on the *pair* of surfaces instead
// ("ground" vs "wheel" behaves differently from "ground" vs "default"), so:
// - every collider carries its MaterialId in `user_data`
// - colliders opt into ActiveHooks::MODIFY_SOLVER_CONTACTS
// - MaterialHooks::modify_solver_contacts rewrites the solver contacts with the
//   pair's friction/restitution (or the table defaults when no pair matches)
// ==============================================================================

use std::collections::HashMap;

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::MaterialsConfig;
use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

impl MaterialId {
    pub fn to_user_data(self) -> u128 {
        self.0 as u128
    }

    pub fn from_user_data(data: u128) -> Self {
        MaterialId(data as u32)
    }
}

/// A named surface. Per-material coefficients are only used when no contact
/// pair is registered for the two surfaces touching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
}

impl Material {
    pub fn new(name: &str, friction: Option<f32>, restitution: Option<f32>) -> Self {
        Self {
            name: name.to_string(),
            friction,
            restitution,
        }
    }
}

/// Contact coefficients between two named materials. Immutable once added to
/// a [`ContactMaterialTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMaterialPair {
    pub a: String,
    pub b: String,
    pub friction: f32,      // >= 0
    pub restitution: f32,   // 0..1
    pub stiffness: f32,     // contact equation stiffness, >= 0
}

impl ContactMaterialPair {
    pub fn validate(&self) -> SimResult<()> {
        let name = format!("{}/{}", self.a, self.b);
        if !(self.friction >= 0.0 && self.friction.is_finite()) {
            return Err(SimError::InvalidMaterial {
                name,
                reason: format!("friction must be >= 0 (got {})", self.friction),
            });
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(SimError::InvalidMaterial {
                name,
                reason: format!("restitution must be in [0, 1] (got {})", self.restitution),
            });
        }
        if !(self.stiffness >= 0.0) {
            return Err(SimError::InvalidMaterial {
                name,
                reason: format!("stiffness must be >= 0 (got {})", self.stiffness),
            });
        }
        Ok(())
    }
}

/// Resolved coefficients for one contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactParams {
    pub friction: f32,
    pub restitution: f32,
    pub stiffness: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ContactMaterialTable {
    materials: Vec<Material>,
    by_name: HashMap<String, MaterialId>,
    pairs: HashMap<(MaterialId, MaterialId), ContactParams>,
    default_friction: f32,
    default_restitution: f32,
}

#[inline]
fn pair_key(a: MaterialId, b: MaterialId) -> (MaterialId, MaterialId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl ContactMaterialTable {
    pub fn new(default_friction: f32, default_restitution: f32) -> Self {
        Self {
            materials: Vec::new(),
            by_name: HashMap::new(),
            pairs: HashMap::new(),
            default_friction,
            default_restitution,
        }
    }

    pub fn from_config(
        config: &MaterialsConfig,
        default_friction: f32,
        default_restitution: f32,
    ) -> SimResult<Self> {
        let mut table = Self::new(default_friction, default_restitution);
        for material in &config.materials {
            table.add_material(material.clone());
        }
        for pair in &config.contacts {
            table.add_contact_pair(pair)?;
        }
        Ok(table)
    }

    /// Registers a material, returning the existing id if the name is taken.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        if let Some(&id) = self.by_name.get(&material.name) {
            return id;
        }
        let id = MaterialId(self.materials.len() as u32);
        self.by_name.insert(material.name.clone(), id);
        self.materials.push(material);
        id
    }

    pub fn id(&self, name: &str) -> SimResult<MaterialId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SimError::InvalidMaterial {
                name: name.to_string(),
                reason: "material is not registered".into(),
            })
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    pub fn add_contact_pair(&mut self, pair: &ContactMaterialPair) -> SimResult<()> {
        pair.validate()?;
        let a = self.id(&pair.a)?;
        let b = self.id(&pair.b)?;
        self.pairs.insert(
            pair_key(a, b),
            ContactParams {
                friction: pair.friction,
                restitution: pair.restitution,
                stiffness: Some(pair.stiffness),
            },
        );
        Ok(())
    }

    /// Coefficients for a touching pair: the registered pair wins, then the
    /// materials' own coefficients (averaged / max), then the table defaults.
    pub fn resolve(&self, a: MaterialId, b: MaterialId) -> ContactParams {
        if let Some(params) = self.pairs.get(&pair_key(a, b)) {
            return *params;
        }

        let ma = self.material(a);
        let mb = self.material(b);
        let friction = match (ma.and_then(|m| m.friction), mb.and_then(|m| m.friction)) {
            (Some(fa), Some(fb)) => (fa * fb).sqrt(),
            (Some(f), None) | (None, Some(f)) => f,
            (None, None) => self.default_friction,
        };
        let restitution = match (ma.and_then(|m| m.restitution), mb.and_then(|m| m.restitution)) {
            (Some(ra), Some(rb)) => ra.max(rb),
            (Some(r), None) | (None, Some(r)) => r,
            (None, None) => self.default_restitution,
        };

        ContactParams {
            friction,
            restitution,
            stiffness: None,
        }
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }
}

/// rapier hook that applies the table to every solver contact.
pub struct MaterialHooks {
    pub table: ContactMaterialTable,
}

impl PhysicsHooks for MaterialHooks {
    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        let a = MaterialId::from_user_data(context.colliders[context.collider1].user_data);
        let b = MaterialId::from_user_data(context.colliders[context.collider2].user_data);
        let params = self.table.resolve(a, b);

        for contact in context.solver_contacts.iter_mut() {
            contact.friction = params.friction;
            contact.restitution = params.restitution;
        }
    }
}
