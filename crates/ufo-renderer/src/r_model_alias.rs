// r_model_alias.rs — animation tables, per-entity animation state, frame and tag interpolation

use std::collections::VecDeque;

use ufo_common::q_shared::{com_parse, vector_normalize, Mat4, Vec3};

use crate::error::{ModelError, RenderError};
use crate::r_model::ModelRegistry;
use crate::r_model_types::{AliasAnim, AliasArrays, AliasMesh, AliasModel, AliasTagData, ModelId};

pub const MAX_ANIMS: usize = 128;
/// Queued sequences per entity, the running one included.
pub const MAX_ANIMLIST: usize = 8;
const MIN_FPS: f32 = 0.01;

// ============================================================
// .anm files
// ============================================================

fn parse_frame(name: &str, anim: &str, token: &str, num_frames: usize) -> Result<usize, ModelError> {
    let frame: i64 = token
        .parse()
        .map_err(|_| ModelError::bad_animation(name, format!("{}: bad frame '{}'", anim, token)))?;
    if frame < 0 {
        return Err(ModelError::bad_animation(name, format!("{}: negative frame {}", anim, frame)));
    }
    if frame as usize >= num_frames {
        return Err(ModelError::bad_animation(
            name,
            format!("{}: frame {} is past the model's frame count ({})", anim, frame, num_frames),
        ));
    }
    Ok(frame as usize)
}

/// Parses `name from to fps` groups. A trailing incomplete group is ignored.
pub fn parse_anims(name: &str, text: &str, num_frames: usize) -> Result<Vec<AliasAnim>, ModelError> {
    let mut tokens = Vec::new();
    let mut rest = text;
    while let Some((token, next)) = com_parse(rest) {
        tokens.push(token);
        rest = next;
    }

    let mut anims = Vec::new();
    for group in tokens.chunks_exact(4).take(MAX_ANIMS) {
        let anim = group[0];
        let from = parse_frame(name, anim, group[1], num_frames)?;
        let to = parse_frame(name, anim, group[2], num_frames)?;
        if from > to {
            return Err(ModelError::bad_animation(
                name,
                format!("{}: first frame {} is after last frame {}", anim, from, to),
            ));
        }
        let fps: f32 = group[3]
            .parse()
            .map_err(|_| ModelError::bad_animation(name, format!("{}: bad fps '{}'", anim, group[3])))?;

        anims.push(AliasAnim {
            name: anim.to_string(),
            from,
            to,
            time: 1000.0 / fps.max(MIN_FPS),
        });
    }
    Ok(anims)
}

// ============================================================
// Animation state
// ============================================================

/// Keyframe selection for one entity. `backlerp` is the weight of `oldframe`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimState {
    pub frame: usize,
    pub oldframe: usize,
    pub backlerp: f32,
    /// Milliseconds per frame of the running sequence.
    pub time: f32,
    /// Milliseconds accumulated into the current frame.
    pub dt: f32,
    current: Option<usize>,
    queue: VecDeque<usize>,
}

impl AnimState {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(model_name: &str, model: &AliasModel, anim: &str) -> Result<usize, RenderError> {
        if model.anims.is_empty() {
            return Err(RenderError::NoAnimations(model_name.to_string()));
        }
        model
            .anims
            .iter()
            .position(|a| a.name == anim)
            .ok_or_else(|| RenderError::UnknownAnimation {
                model: model_name.to_string(),
                name: anim.to_string(),
            })
    }

    fn start(&mut self, model: &AliasModel, index: usize) {
        let anim = &model.anims[index];
        if self.current.is_none() {
            self.oldframe = anim.from;
            self.backlerp = 0.0;
        } else {
            self.oldframe = self.frame;
            self.backlerp = 1.0;
        }
        self.frame = anim.from;
        self.time = anim.time;
        self.dt = 0.0;
        self.current = Some(index);
    }

    /// Switches to `anim` immediately, dropping anything queued.
    pub fn change(&mut self, model_name: &str, model: &AliasModel, anim: &str) -> Result<(), RenderError> {
        let index = Self::find(model_name, model, anim)?;
        self.queue.clear();
        self.start(model, index);
        log::debug!("{}: change to {}", model_name, anim);
        Ok(())
    }

    /// Plays `anim` once the running sequence reaches its last frame.
    pub fn append(&mut self, model_name: &str, model: &AliasModel, anim: &str) -> Result<(), RenderError> {
        let index = Self::find(model_name, model, anim)?;
        if self.current.is_none() {
            self.start(model, index);
            return Ok(());
        }
        if self.queue.len() + 1 >= MAX_ANIMLIST {
            return Err(RenderError::AnimationQueueFull);
        }
        self.queue.push_back(index);
        Ok(())
    }

    /// Moves the state forward by `msec` milliseconds.
    pub fn advance(&mut self, model: &AliasModel, msec: f32) {
        let Some(mut index) = self.current else {
            return;
        };
        if self.time <= 0.0 || index >= model.anims.len() {
            return;
        }

        self.dt = (self.dt + msec.max(0.0)).min(f32::MAX);

        // each pass either consumes one queued sequence or settles the state,
        // so the loop is bounded by the queue length
        loop {
            let anim = &model.anims[index];
            if self.queue.is_empty() {
                let steps = (self.dt / self.time).floor();
                self.dt %= self.time;
                if steps >= 1.0 {
                    let len = (anim.to - anim.from + 1) as u64;
                    let pos = (self.frame.saturating_sub(anim.from) as u64).min(len - 1);
                    let k = (steps as u64) % len;
                    self.frame = anim.from + ((pos + k) % len) as usize;
                    self.oldframe = anim.from + ((pos + len - 1 + k) % len) as usize;
                }
                break;
            }

            let remaining = anim.to.saturating_sub(self.frame) + 1;
            let needed = remaining as f32 * self.time;
            if self.dt < needed {
                let steps = (self.dt / self.time).floor() as usize;
                self.dt -= steps as f32 * self.time;
                if steps > 0 {
                    self.oldframe = self.frame + steps - 1;
                    self.frame += steps;
                }
                break;
            }

            self.dt -= needed;
            self.oldframe = anim.to;
            let Some(next) = self.queue.pop_front() else {
                break;
            };
            index = next;
            self.current = Some(next);
            self.time = model.anims[next].time;
            self.frame = model.anims[next].from;
        }

        self.backlerp = (1.0 - self.dt / self.time).clamp(0.0, 1.0);
    }

    pub fn current_name<'a>(&self, model: &'a AliasModel) -> Option<&'a str> {
        self.current.and_then(|i| model.anims.get(i)).map(|a| a.name.as_str())
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

// ============================================================
// State pool
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnimStateId(pub usize);

/// Animation states owned by the client's entities, one per instance.
/// Entities sharing a model never share a state.
#[derive(Debug, Default)]
pub struct AnimStatePool {
    slots: Vec<Option<(ModelId, AnimState)>>,
}

impl AnimStatePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn create(&mut self, model: ModelId) -> AnimStateId {
        let entry = Some((model, AnimState::new()));
        match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = entry;
                AnimStateId(free)
            }
            None => {
                self.slots.push(entry);
                AnimStateId(self.slots.len() - 1)
            }
        }
    }

    pub fn release(&mut self, id: AnimStateId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            *slot = None;
        }
    }

    pub fn get(&self, id: AnimStateId) -> Option<(ModelId, &AnimState)> {
        self.slots.get(id.0)?.as_ref().map(|(m, s)| (*m, s))
    }

    pub fn get_mut(&mut self, id: AnimStateId) -> Option<(ModelId, &mut AnimState)> {
        self.slots.get_mut(id.0)?.as_mut().map(|(m, s)| (*m, s))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advances every running state by `msec`.
    pub fn advance_all(&mut self, models: &ModelRegistry, msec: f32) {
        for (model, state) in self.slots.iter_mut().flatten() {
            if let Some(alias) = models.get(*model).and_then(|m| m.alias()) {
                state.advance(alias, msec);
            }
        }
    }
}

// ============================================================
// Interpolation
// ============================================================

fn clamp_frame(frame: usize, num_frames: usize) -> usize {
    if frame >= num_frames {
        0
    } else {
        frame
    }
}

/// Blends two keyframes of a mesh into flat per-triangle streams.
pub fn fill_array_data(mesh: &AliasMesh, frame: usize, oldframe: usize, backlerp: f32, out: &mut AliasArrays) {
    let num_frames = mesh.frames.len();
    let frame = clamp_frame(frame, num_frames);
    let oldframe = clamp_frame(oldframe, num_frames);
    let frontlerp = 1.0 - backlerp;

    let cur = &mesh.frames[frame];
    let old = &mesh.frames[oldframe];
    let mv: Vec3 = [
        backlerp * old.translate[0] + frontlerp * cur.translate[0],
        backlerp * old.translate[1] + frontlerp * cur.translate[1],
        backlerp * old.translate[2] + frontlerp * cur.translate[2],
    ];

    let verts: Vec<(Vec3, Vec3)> = mesh
        .frame_vertexes(frame)
        .iter()
        .zip(mesh.frame_vertexes(oldframe))
        .map(|(v, ov)| {
            (
                [
                    mv[0] + ov.point[0] * backlerp + v.point[0] * frontlerp,
                    mv[1] + ov.point[1] * backlerp + v.point[1] * frontlerp,
                    mv[2] + ov.point[2] * backlerp + v.point[2] * frontlerp,
                ],
                [
                    v.normal[0] + (ov.normal[0] - v.normal[0]) * backlerp,
                    v.normal[1] + (ov.normal[1] - v.normal[1]) * backlerp,
                    v.normal[2] + (ov.normal[2] - v.normal[2]) * backlerp,
                ],
            )
        })
        .collect();

    out.vertices.clear();
    out.normals.clear();
    out.texcoords.clear();
    for &i in &mesh.indexes {
        let i = i as usize;
        out.vertices.push(verts[i].0);
        out.normals.push(verts[i].1);
        out.texcoords.push(mesh.texcoords[i]);
    }
}

/// Caches the streams of single-frame models once at load.
pub fn build_static_arrays(model: &mut AliasModel) {
    if model.num_frames != 1 {
        return;
    }
    for mesh in &mut model.meshes {
        let mut arrays = AliasArrays::default();
        fill_array_data(mesh, 0, 0, 0.0, &mut arrays);
        mesh.static_arrays = Some(arrays);
    }
}

/// Tag matrix blended between two frames, rotation columns re-normalised.
pub fn interpolate_tag(tags: &AliasTagData, tag: usize, frame: usize, oldframe: usize, backlerp: f32) -> Mat4 {
    let frame = clamp_frame(frame, tags.num_frames);
    let oldframe = clamp_frame(oldframe, tags.num_frames);
    let cur = tags.matrix(tag, frame);
    let old = tags.matrix(tag, oldframe);

    let mut m: Mat4 = [0.0; 16];
    for i in 0..16 {
        m[i] = (1.0 - backlerp) * cur[i] + backlerp * old[i];
    }
    for col in 0..3 {
        let mut axis = [m[col * 4], m[col * 4 + 1], m[col * 4 + 2]];
        vector_normalize(&mut axis);
        m[col * 4..col * 4 + 3].copy_from_slice(&axis);
    }
    m
}
