// r_model_types.rs — in-memory brush and alias model structures
//
// d* structures in qfiles are the on-disk representations,
// the types here are what the renderer keeps after loading.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use ufo_common::q_shared::{CPlane, Mat4, Vec2, Vec3};

use crate::r_image::TextureInfo;
use crate::r_lightmap::LightmapRect;
use crate::r_surface::SurfacePass;

// ============================================================
// Brush models
// ============================================================

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MSurfFlags: u32 {
        /// The surface faces away from its plane's normal.
        const PLANEBACK = 1 << 0;
        /// The surface carries a lightmap block.
        const LIGHTMAP = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BspTexInfo {
    /// `[s/t][xyz offset]`
    pub vecs: [[f32; 4]; 2],
    /// `SURF_*` flags from the map compiler.
    pub flags: i32,
    pub value: i32,
    pub image: TextureInfo,
}

impl BspTexInfo {
    /// Texture-space coordinate of `p` along axis 0 (s) or 1 (t).
    #[inline]
    pub fn project(&self, axis: usize, p: &Vec3) -> f32 {
        let v = &self.vecs[axis];
        p[0] * v[0] + p[1] * v[1] + p[2] * v[2] + v[3]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BspSurface {
    pub plane: usize,
    pub flags: MSurfFlags,
    pub texinfo: usize,
    pub pass: SurfacePass,

    /// Last frame this surface was found visible.
    pub frame: u64,

    pub mins: Vec3,
    pub maxs: Vec3,
    pub center: Vec3,

    /// Texture-space minimum, snapped to the lightmap scale.
    pub stmins: [i32; 2],
    /// Texture-space extent, snapped to the lightmap scale.
    pub stmaxs: [i32; 2],
    pub stcenter: Vec2,

    pub lightmap_scale: i32,
    pub styles: [u8; 4],
    /// Offset into the tile's lighting lump.
    pub lightofs: Option<usize>,
    pub lightmap: Option<LightmapRect>,
    /// Surface-local copy of the final lightmap, RGB.
    pub samples: Vec<u8>,
    /// Average lightmap colour, white for fullbright surfaces.
    pub color: Vec3,

    /// Range in the tile's vertex array, drawn as a triangle fan.
    pub first_vertex: usize,
    pub num_vertices: usize,
}

impl BspSurface {
    /// Lightmap block size in samples.
    pub fn lightmap_size(&self) -> (usize, usize) {
        let scale = self.lightmap_scale.max(1);
        (
            (self.stmaxs[0] / scale + 1) as usize,
            (self.stmaxs[1] / scale + 1) as usize,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Node {
        /// `None` for pathfinding nodes that only group their children.
        plane: Option<usize>,
        children: [usize; 2],
        first_surface: usize,
        num_surfaces: usize,
    },
    Leaf {
        contents: i32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BspNode {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub parent: Option<usize>,
    pub kind: NodeKind,
}

impl BspNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn contents(&self) -> Option<i32> {
        match self.kind {
            NodeKind::Leaf { contents } => Some(contents),
            NodeKind::Node { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BspSubmodel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub radius: f32,
    pub headnode: usize,
    pub first_face: usize,
    pub num_faces: usize,
}

/// Interleaved vertex as uploaded for a tile.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BspVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
    pub lm_texcoord: [f32; 2],
}

impl BspVertex {
    pub const SIZE: usize = std::mem::size_of::<BspVertex>();
}

/// One loaded map tile.
#[derive(Debug, Clone, Default)]
pub struct BspModel {
    pub name: String,
    /// World offset applied at load.
    pub shift: Vec3,
    pub planes: Vec<CPlane>,
    pub texinfo: Vec<BspTexInfo>,
    pub surfaces: Vec<BspSurface>,
    /// Nodes first, leafs from `first_leaf` on.
    pub nodes: Vec<BspNode>,
    pub first_leaf: usize,
    pub submodels: Vec<BspSubmodel>,
    /// The selected lighting lump, including its leading quantisation byte.
    pub lightdata: Option<Vec<u8>>,
    pub lightquant: u8,
    pub lightmap_scale: i32,
    pub vertices: Vec<BspVertex>,
    pub mins: Vec3,
    pub maxs: Vec3,
}

// ============================================================
// Alias models
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AliasVertex {
    pub point: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasFrame {
    pub name: String,
    pub scale: Vec3,
    pub translate: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasSkin {
    pub name: String,
    pub image: TextureInfo,
}

/// Flat, non-indexed streams: three entries per triangle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasArrays {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasMesh {
    pub name: String,
    /// Vertices after de-duplication of (position, texcoord) pairs.
    pub num_verts: usize,
    pub num_tris: usize,
    /// Three per triangle, each `< num_verts`.
    pub indexes: Vec<u32>,
    pub texcoords: Vec<Vec2>,
    pub frames: Vec<AliasFrame>,
    /// `num_frames * num_verts`, frame-major.
    pub vertexes: Vec<AliasVertex>,
    pub skins: Vec<AliasSkin>,
    /// Cached streams for single-frame meshes.
    pub static_arrays: Option<AliasArrays>,
}

impl AliasMesh {
    pub fn frame_vertexes(&self, frame: usize) -> &[AliasVertex] {
        let start = frame * self.num_verts;
        &self.vertexes[start..start + self.num_verts]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasAnim {
    pub name: String,
    pub from: usize,
    pub to: usize,
    /// Milliseconds per frame.
    pub time: f32,
}

/// Tag matrices, `matrices[tag * num_frames + frame]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTagData {
    pub names: Vec<String>,
    pub num_frames: usize,
    pub matrices: Vec<Mat4>,
}

impl AliasTagData {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn matrix(&self, tag: usize, frame: usize) -> &Mat4 {
        &self.matrices[tag * self.num_frames + frame]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasModel {
    pub num_frames: usize,
    pub meshes: Vec<AliasMesh>,
    pub anims: Vec<AliasAnim>,
    pub tags: Option<AliasTagData>,
}

impl AliasModel {
    pub fn find_anim(&self, name: &str) -> Option<&AliasAnim> {
        self.anims.iter().find(|a| a.name == name)
    }

    pub fn num_tris(&self) -> usize {
        self.meshes.iter().map(|m| m.num_tris).sum()
    }

    /// Whether the default skin needs blending.
    pub fn has_alpha(&self) -> bool {
        self.meshes
            .first()
            .and_then(|m| m.skins.first())
            .is_some_and(|s| s.image.has_alpha)
    }
}

// ============================================================
// Registered models
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum ModelKind {
    /// Inline brush model `*N`, a submodel of a loaded tile.
    BrushSubmodel { tile: usize, submodel: usize },
    Alias(AliasModel),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub radius: f32,
    pub kind: ModelKind,
}

impl Model {
    pub fn alias(&self) -> Option<&AliasModel> {
        match &self.kind {
            ModelKind::Alias(alias) => Some(alias),
            ModelKind::BrushSubmodel { .. } => None,
        }
    }
}
