// qfiles.rs — on-disk formats: map tile lump container, MD2 and MD3 alias models, tag files
//
// All multi-byte values are little-endian. Records are decoded field by field
// through `LeReader` so nothing here depends on host layout or alignment.

use crate::q_shared::{fixed_name, Vec3};
use thiserror::Error;

// ============================================================
// Errors
// ============================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    #[error("{what}: unexpected end of data (need {need} bytes at offset {offset}, have {len})")]
    Truncated {
        what: &'static str,
        offset: usize,
        need: usize,
        len: usize,
    },
    #[error("{what}: wrong identifier {found:#010x} (should be {expected:#010x})")]
    BadIdent {
        what: &'static str,
        expected: i32,
        found: i32,
    },
    #[error("{what}: wrong version number ({found} should be {expected})")]
    BadVersion {
        what: &'static str,
        expected: i32,
        found: i32,
    },
    #[error("{what}: funny lump size ({len} is not a multiple of {record})")]
    FunnyLumpSize {
        what: &'static str,
        len: usize,
        record: usize,
    },
    #[error("lump {lump} lies outside the file (offset {offset}, length {length}, file size {size})")]
    LumpOutOfRange {
        lump: usize,
        offset: i32,
        length: i32,
        size: usize,
    },
}

// ============================================================
// Little-endian reader
// ============================================================

/// Cursor over a byte slice that decodes little-endian scalars.
pub struct LeReader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> LeReader<'a> {
    pub fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    pub fn at(data: &'a [u8], offset: usize, what: &'static str) -> Self {
        Self { data, pos: offset, what }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let out = &self.data[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(FormatError::Truncated {
                what: self.what,
                offset: self.pos,
                need: n,
                len: self.data.len(),
            }),
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn i16(&mut self) -> Result<i16, FormatError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn u16(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, FormatError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub fn vec3(&mut self) -> Result<Vec3, FormatError> {
        Ok([self.f32()?, self.f32()?, self.f32()?])
    }

    pub fn short_vec3(&mut self) -> Result<[i16; 3], FormatError> {
        Ok([self.i16()?, self.i16()?, self.i16()?])
    }

    pub fn name(&mut self, len: usize) -> Result<String, FormatError> {
        Ok(fixed_name(self.bytes(len)?))
    }
}

/// A fixed-size record stored back to back inside a lump.
pub trait LumpRecord: Sized {
    const SIZE: usize;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError>;
}

/// Decodes a whole lump into records, rejecting lengths that are not a
/// multiple of the record size.
pub fn parse_records<T: LumpRecord>(data: &[u8], what: &'static str) -> Result<Vec<T>, FormatError> {
    if data.len() % T::SIZE != 0 {
        return Err(FormatError::FunnyLumpSize {
            what,
            len: data.len(),
            record: T::SIZE,
        });
    }
    let mut r = LeReader::new(data, what);
    (0..data.len() / T::SIZE).map(|_| T::read(&mut r)).collect()
}

// ============================================================
// Map tile (.bsp)
// ============================================================

pub const IDBSPHEADER: i32 = (b'P' as i32) << 24 | (b'S' as i32) << 16 | (b'B' as i32) << 8 | b'I' as i32;
pub const BSPVERSION: i32 = 73;

pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_VERTEXES: usize = 2;
pub const LUMP_ROUTING: usize = 3;
pub const LUMP_NODES: usize = 4;
pub const LUMP_TEXINFO: usize = 5;
pub const LUMP_FACES: usize = 6;
pub const LUMP_LIGHTING_NIGHT: usize = 7;
pub const LUMP_LIGHTING_DAY: usize = 8;
pub const LUMP_LEAFS: usize = 9;
pub const LUMP_LEAFBRUSHES: usize = 10;
pub const LUMP_EDGES: usize = 11;
pub const LUMP_SURFEDGES: usize = 12;
pub const LUMP_MODELS: usize = 13;
pub const LUMP_BRUSHES: usize = 14;
pub const LUMP_BRUSHSIDES: usize = 15;
pub const HEADER_LUMPS: usize = 16;

pub const BSP_HEADER_SIZE: usize = 8 + HEADER_LUMPS * 8;

/// Number of light styles a face can blend.
pub const MAXLIGHTMAPS: usize = 4;
/// Planenum of a node that belongs to the pathfinding tree and has no plane.
pub const PLANENUM_LEAF: i32 = -1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lump {
    pub fileofs: i32,
    pub filelen: i32,
}

/// A parsed lump directory over the borrowed file bytes.
#[derive(Debug)]
pub struct BspFile<'a> {
    pub data: &'a [u8],
    pub version: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

impl<'a> BspFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, FormatError> {
        let mut r = LeReader::new(data, "map header");
        let ident = r.i32()?;
        if ident != IDBSPHEADER {
            return Err(FormatError::BadIdent {
                what: "map header",
                expected: IDBSPHEADER,
                found: ident,
            });
        }
        let version = r.i32()?;
        if version != BSPVERSION {
            return Err(FormatError::BadVersion {
                what: "map header",
                expected: BSPVERSION,
                found: version,
            });
        }

        let mut lumps = [Lump::default(); HEADER_LUMPS];
        for (i, lump) in lumps.iter_mut().enumerate() {
            lump.fileofs = r.i32()?;
            lump.filelen = r.i32()?;
            let in_range = lump.fileofs >= 0
                && lump.filelen >= 0
                && (lump.fileofs as usize).saturating_add(lump.filelen as usize) <= data.len();
            if !in_range {
                return Err(FormatError::LumpOutOfRange {
                    lump: i,
                    offset: lump.fileofs,
                    length: lump.filelen,
                    size: data.len(),
                });
            }
        }

        Ok(Self { data, version, lumps })
    }

    /// Raw payload of lump `index`.
    pub fn lump(&self, index: usize) -> &'a [u8] {
        let l = self.lumps[index];
        let start = l.fileofs as usize;
        &self.data[start..start + l.filelen as usize]
    }

    pub fn records<T: LumpRecord>(&self, index: usize, what: &'static str) -> Result<Vec<T>, FormatError> {
        parse_records(self.lump(index), what)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DVertex {
    pub point: Vec3,
}

impl LumpRecord for DVertex {
    const SIZE: usize = 12;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self { point: r.vec3()? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: i32,
}

impl LumpRecord for DPlane {
    const SIZE: usize = 20;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            normal: r.vec3()?,
            dist: r.f32()?,
            plane_type: r.i32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DNode {
    /// `PLANENUM_LEAF` for pathfinding-only nodes.
    pub planenum: i32,
    /// Negative numbers are `-(leaf + 1)`.
    pub children: [i32; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16,
}

impl LumpRecord for DNode {
    const SIZE: usize = 28;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            planenum: r.i32()?,
            children: [r.i32()?, r.i32()?],
            mins: r.short_vec3()?,
            maxs: r.short_vec3()?,
            firstface: r.u16()?,
            numfaces: r.u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DLeaf {
    pub contents: i32,
    pub area: i16,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstleafbrush: u16,
    pub numleafbrushes: u16,
}

impl LumpRecord for DLeaf {
    const SIZE: usize = 24;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        let leaf = Self {
            contents: r.i32()?,
            area: r.i16()?,
            mins: r.short_vec3()?,
            maxs: r.short_vec3()?,
            firstleafbrush: r.u16()?,
            numleafbrushes: r.u16()?,
        };
        r.bytes(2)?; // pad
        Ok(leaf)
    }
}

pub const TEXINFO_NAME_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct DTexInfo {
    /// `[s/t][xyz offset]`
    pub vecs: [[f32; 4]; 2],
    pub surface_flags: i32,
    pub value: i32,
    pub texture: String,
}

impl LumpRecord for DTexInfo {
    const SIZE: usize = 32 + 8 + TEXINFO_NAME_LEN;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        let mut vecs = [[0.0f32; 4]; 2];
        for axis in vecs.iter_mut() {
            for v in axis.iter_mut() {
                *v = r.f32()?;
            }
        }
        Ok(Self {
            vecs,
            surface_flags: r.i32()?,
            value: r.i32()?,
            texture: r.name(TEXINFO_NAME_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DFace {
    pub planenum: u16,
    pub side: i16,
    pub firstedge: i32,
    pub numedges: i16,
    pub texinfo: i16,
    pub styles: [u8; MAXLIGHTMAPS],
    /// Offsets into the night and day lighting lumps, -1 for none.
    pub lightofs: [i32; 2],
}

impl LumpRecord for DFace {
    const SIZE: usize = 24;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            planenum: r.u16()?,
            side: r.i16()?,
            firstedge: r.i32()?,
            numedges: r.i16()?,
            texinfo: r.i16()?,
            styles: [r.u8()?, r.u8()?, r.u8()?, r.u8()?],
            lightofs: [r.i32()?, r.i32()?],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DEdge {
    pub v: [u16; 2],
}

impl LumpRecord for DEdge {
    const SIZE: usize = 4;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self { v: [r.u16()?, r.u16()?] })
    }
}

impl LumpRecord for i32 {
    const SIZE: usize = 4;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        r.i32()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

impl LumpRecord for DModel {
    const SIZE: usize = 48;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            mins: r.vec3()?,
            maxs: r.vec3()?,
            origin: r.vec3()?,
            headnode: r.i32()?,
            firstface: r.i32()?,
            numfaces: r.i32()?,
        })
    }
}

// ============================================================
// MD2 alias models
// ============================================================

pub const IDALIASHEADER: i32 = (b'2' as i32) << 24 | (b'P' as i32) << 16 | (b'D' as i32) << 8 | b'I' as i32;
pub const MD2_ALIAS_VERSION: i32 = 8;

pub const MD2_MAX_TRIANGLES: usize = 4096;
pub const MD2_MAX_VERTS: usize = 2048;
pub const MD2_MAX_FRAMES: usize = 512;
pub const MD2_MAX_SKINS: usize = 32;
pub const MD2_MAX_SKINNAME: usize = 64;
pub const MD2_FRAME_NAME_LEN: usize = 16;

pub const MD2_HEADER_SIZE: usize = 17 * 4;
/// scale[3] + translate[3] + name[16]
pub const MD2_FRAME_HEADER_SIZE: usize = 12 + 12 + MD2_FRAME_NAME_LEN;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DMdl {
    pub ident: i32,
    pub version: i32,
    pub skinwidth: i32,
    pub skinheight: i32,
    pub framesize: i32,
    pub num_skins: i32,
    pub num_xyz: i32,
    pub num_st: i32,
    pub num_tris: i32,
    pub num_glcmds: i32,
    pub num_frames: i32,
    pub ofs_skins: i32,
    pub ofs_st: i32,
    pub ofs_tris: i32,
    pub ofs_frames: i32,
    pub ofs_glcmds: i32,
    pub ofs_end: i32,
}

impl DMdl {
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        let mut r = LeReader::new(data, "md2 header");
        let mut f = [0i32; 17];
        for v in f.iter_mut() {
            *v = r.i32()?;
        }
        let hdr = Self {
            ident: f[0],
            version: f[1],
            skinwidth: f[2],
            skinheight: f[3],
            framesize: f[4],
            num_skins: f[5],
            num_xyz: f[6],
            num_st: f[7],
            num_tris: f[8],
            num_glcmds: f[9],
            num_frames: f[10],
            ofs_skins: f[11],
            ofs_st: f[12],
            ofs_tris: f[13],
            ofs_frames: f[14],
            ofs_glcmds: f[15],
            ofs_end: f[16],
        };
        if hdr.ident != IDALIASHEADER {
            return Err(FormatError::BadIdent {
                what: "md2 header",
                expected: IDALIASHEADER,
                found: hdr.ident,
            });
        }
        if hdr.version != MD2_ALIAS_VERSION {
            return Err(FormatError::BadVersion {
                what: "md2 header",
                expected: MD2_ALIAS_VERSION,
                found: hdr.version,
            });
        }
        Ok(hdr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DStVert {
    pub s: i16,
    pub t: i16,
}

impl LumpRecord for DStVert {
    const SIZE: usize = 4;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self { s: r.i16()?, t: r.i16()? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DTriangle {
    pub index_xyz: [i16; 3],
    pub index_st: [i16; 3],
}

impl LumpRecord for DTriangle {
    const SIZE: usize = 12;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            index_xyz: r.short_vec3()?,
            index_st: r.short_vec3()?,
        })
    }
}

/// Compressed frame vertex: position bytes plus a normal index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DTriVertx {
    pub v: [u8; 3],
    pub lightnormalindex: u8,
}

impl LumpRecord for DTriVertx {
    const SIZE: usize = 4;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            v: [r.u8()?, r.u8()?, r.u8()?],
            lightnormalindex: r.u8()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DAliasFrame {
    pub scale: Vec3,
    pub translate: Vec3,
    pub name: String,
    pub verts: Vec<DTriVertx>,
}

impl DAliasFrame {
    pub fn read(r: &mut LeReader<'_>, num_verts: usize) -> Result<Self, FormatError> {
        let scale = r.vec3()?;
        let translate = r.vec3()?;
        let name = r.name(MD2_FRAME_NAME_LEN)?;
        let verts = (0..num_verts)
            .map(|_| DTriVertx::read(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { scale, translate, name, verts })
    }
}

// ============================================================
// MD3 alias models
// ============================================================

pub const IDMD3HEADER: i32 = (b'3' as i32) << 24 | (b'P' as i32) << 16 | (b'D' as i32) << 8 | b'I' as i32;
pub const MD3_ALIAS_VERSION: i32 = 15;

pub const MD3_MAX_PATH: usize = 64;
pub const MD3_MAX_TRIANGLES: usize = 8192;
pub const MD3_MAX_VERTS: usize = 4096;
pub const MD3_MAX_SHADERS: usize = 256;
pub const MD3_MAX_FRAMES: usize = 1024;
pub const MD3_MAX_MESHES: usize = 32;
pub const MD3_MAX_TAGS: usize = 16;
/// Fixed point positions are stored in 1/64 units.
pub const MD3_XYZ_SCALE: f32 = 1.0 / 64.0;

pub const MD3_HEADER_SIZE: usize = 8 + MD3_MAX_PATH + 9 * 4;
pub const MD3_MESH_HEADER_SIZE: usize = 4 + MD3_MAX_PATH + 10 * 4;
pub const MD3_FRAME_NAME_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DMd3 {
    pub ident: i32,
    pub version: i32,
    pub filename: String,
    pub flags: i32,
    pub num_frames: i32,
    pub num_tags: i32,
    pub num_meshes: i32,
    pub num_skins: i32,
    pub ofs_frames: i32,
    pub ofs_tags: i32,
    pub ofs_meshes: i32,
    pub ofs_end: i32,
}

impl DMd3 {
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        let mut r = LeReader::new(data, "md3 header");
        let hdr = Self {
            ident: r.i32()?,
            version: r.i32()?,
            filename: r.name(MD3_MAX_PATH)?,
            flags: r.i32()?,
            num_frames: r.i32()?,
            num_tags: r.i32()?,
            num_meshes: r.i32()?,
            num_skins: r.i32()?,
            ofs_frames: r.i32()?,
            ofs_tags: r.i32()?,
            ofs_meshes: r.i32()?,
            ofs_end: r.i32()?,
        };
        if hdr.ident != IDMD3HEADER {
            return Err(FormatError::BadIdent {
                what: "md3 header",
                expected: IDMD3HEADER,
                found: hdr.ident,
            });
        }
        if hdr.version != MD3_ALIAS_VERSION {
            return Err(FormatError::BadVersion {
                what: "md3 header",
                expected: MD3_ALIAS_VERSION,
                found: hdr.version,
            });
        }
        Ok(hdr)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DMd3Frame {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub translate: Vec3,
    pub radius: f32,
    pub name: String,
}

impl LumpRecord for DMd3Frame {
    const SIZE: usize = 40 + MD3_FRAME_NAME_LEN;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            mins: r.vec3()?,
            maxs: r.vec3()?,
            translate: r.vec3()?,
            radius: r.f32()?,
            name: r.name(MD3_FRAME_NAME_LEN)?,
        })
    }
}

/// Attachment point: origin plus three axis vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct DMd3Tag {
    pub name: String,
    pub origin: Vec3,
    pub axis: [Vec3; 3],
}

impl LumpRecord for DMd3Tag {
    const SIZE: usize = MD3_MAX_PATH + 48;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            name: r.name(MD3_MAX_PATH)?,
            origin: r.vec3()?,
            axis: [r.vec3()?, r.vec3()?, r.vec3()?],
        })
    }
}

/// Mesh header; all offsets are relative to the start of the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DMd3Mesh {
    pub ident: i32,
    pub name: String,
    pub flags: i32,
    pub num_frames: i32,
    pub num_skins: i32,
    pub num_verts: i32,
    pub num_tris: i32,
    pub ofs_tris: i32,
    pub ofs_skins: i32,
    pub ofs_tcs: i32,
    pub ofs_verts: i32,
    pub meshsize: i32,
}

impl LumpRecord for DMd3Mesh {
    const SIZE: usize = MD3_MESH_HEADER_SIZE;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        let hdr = Self {
            ident: r.i32()?,
            name: r.name(MD3_MAX_PATH)?,
            flags: r.i32()?,
            num_frames: r.i32()?,
            num_skins: r.i32()?,
            num_verts: r.i32()?,
            num_tris: r.i32()?,
            ofs_tris: r.i32()?,
            ofs_skins: r.i32()?,
            ofs_tcs: r.i32()?,
            ofs_verts: r.i32()?,
            meshsize: r.i32()?,
        };
        if hdr.ident != IDMD3HEADER {
            return Err(FormatError::BadIdent {
                what: "md3 mesh",
                expected: IDMD3HEADER,
                found: hdr.ident,
            });
        }
        Ok(hdr)
    }
}

/// Packed vertex: fixed point position and a lat/long normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DMd3Vertex {
    pub point: [i16; 3],
    pub norm: u16,
}

impl LumpRecord for DMd3Vertex {
    const SIZE: usize = 8;
    fn read(r: &mut LeReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            point: r.short_vec3()?,
            norm: r.u16()?,
        })
    }
}

// ============================================================
// Tag files (.tag, attachment matrices for MD2 models)
// ============================================================

pub const TAG_VERSION: i32 = 1;
pub const MD2_MAX_TAGNAME: usize = 64;
pub const TAG_HEADER_SIZE: usize = 32;
/// Bytes per stored 3x4 tag matrix.
pub const TAG_DISK_MATRIX_SIZE: usize = 48;
/// Bytes per expanded 4x4 tag matrix.
pub const TAG_MATRIX_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DTagHeader {
    pub ident: i32,
    pub version: i32,
    pub num_tags: i32,
    pub num_frames: i32,
    pub ofs_names: i32,
    pub ofs_tags: i32,
    pub ofs_end: i32,
    pub ofs_extractend: i32,
}

impl DTagHeader {
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        let mut r = LeReader::new(data, "tag header");
        let hdr = Self {
            ident: r.i32()?,
            version: r.i32()?,
            num_tags: r.i32()?,
            num_frames: r.i32()?,
            ofs_names: r.i32()?,
            ofs_tags: r.i32()?,
            ofs_end: r.i32()?,
            ofs_extractend: r.i32()?,
        };
        if hdr.version != TAG_VERSION {
            return Err(FormatError::BadVersion {
                what: "tag header",
                expected: TAG_VERSION,
                found: hdr.version,
            });
        }
        Ok(hdr)
    }
}
