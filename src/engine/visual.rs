use nalgebra::{UnitQuaternion, Vector3};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VisualId(pub u32);

/// Load state of a requested model. The simulation never waits on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetState {
    Pending,
    Ready(u32),
    Failed,
}

#[derive(Clone, Debug)]
pub struct VisualSlot {
    pub model: String,
    pub state: AssetState,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: f32,
    pub visible: bool,
    dirty: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct AssetRequest {
    pub visual: VisualId,
    pub model: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VisualFrame {
    pub visual: VisualId,
    pub handle: u32,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: f32,
    pub visible: bool,
}

/// Registry of every render-side object the simulation drives.
///
/// The core writes transforms whether or not a model has arrived; the
/// presentation layer only ever sees slots whose handle is ready.
#[derive(Default)]
pub struct Visuals {
    slots: HashMap<VisualId, VisualSlot>,
    next_id: u32,
    requests: Vec<AssetRequest>,
    released: Vec<VisualId>,
}

impl Visuals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, model: &str) -> VisualId {
        self.next_id += 1;
        let id = VisualId(self.next_id);
        self.slots.insert(
            id,
            VisualSlot {
                model: model.to_string(),
                state: AssetState::Pending,
                position: Vector3::zeros(),
                rotation: UnitQuaternion::identity(),
                scale: 1.0,
                visible: true,
                dirty: true,
            },
        );
        self.requests.push(AssetRequest { visual: id, model: model.to_string() });
        id
    }

    /// Returns false when the slot was released before the model arrived,
    /// in which case the caller should dispose of the handle itself.
    pub fn resolve(&mut self, id: VisualId, handle: u32) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.state = AssetState::Ready(handle);
                slot.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn fail(&mut self, id: VisualId) {
        if let Some(slot) = self.slots.get_mut(&id) {
            log::warn!("model `{}` failed to load, {:?} stays headless", slot.model, id);
            slot.state = AssetState::Failed;
        }
    }

    pub fn release(&mut self, id: VisualId) {
        if self.slots.remove(&id).is_some() {
            self.released.push(id);
        }
    }

    /// Releases every slot but keeps the id counter, so ids are never reused.
    pub fn release_all(&mut self) {
        let mut ids: Vec<VisualId> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        self.slots.clear();
        self.requests.clear();
        self.released.extend(ids);
    }

    pub fn set_transform(&mut self, id: VisualId, position: Vector3<f32>, rotation: UnitQuaternion<f32>) {
        if let Some(slot) = self.slots.get_mut(&id) {
            if slot.position != position || slot.rotation != rotation {
                slot.position = position;
                slot.rotation = rotation;
                slot.dirty = true;
            }
        }
    }

    pub fn set_scale(&mut self, id: VisualId, scale: f32) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.scale = scale;
            slot.dirty = true;
        }
    }

    pub fn set_visible(&mut self, id: VisualId, visible: bool) {
        if let Some(slot) = self.slots.get_mut(&id) {
            if slot.visible != visible {
                slot.visible = visible;
                slot.dirty = true;
            }
        }
    }

    pub fn get(&self, id: VisualId) -> Option<&VisualSlot> {
        self.slots.get(&id)
    }

    pub fn state(&self, id: VisualId) -> Option<AssetState> {
        self.slots.get(&id).map(|s| s.state)
    }

    pub fn is_live(&self, id: VisualId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    pub fn take_requests(&mut self) -> Vec<AssetRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn take_released(&mut self) -> Vec<VisualId> {
        std::mem::take(&mut self.released)
    }

    /// Transforms of ready slots that changed since the last call.
    pub fn take_frame(&mut self) -> Vec<VisualFrame> {
        let mut frame: Vec<VisualFrame> = self
            .slots
            .iter_mut()
            .filter_map(|(id, slot)| {
                let AssetState::Ready(handle) = slot.state else { return None };
                if !slot.dirty {
                    return None;
                }
                slot.dirty = false;
                let q = slot.rotation.quaternion();
                Some(VisualFrame {
                    visual: *id,
                    handle,
                    position: [slot.position.x, slot.position.y, slot.position.z],
                    rotation: [q.i, q.j, q.k, q.w],
                    scale: slot.scale,
                    visible: slot.visible,
                })
            })
            .collect();
        frame.sort_by_key(|f| f.visual);
        frame
    }
}
