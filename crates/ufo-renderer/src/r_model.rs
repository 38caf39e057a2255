// r_model.rs — model registration: inline brush models and alias models by name

use std::collections::HashMap;

use ufo_common::q_shared::{com_strip_extension, NUM_REGULAR_MODELS};
use ufo_common::qfiles::{IDALIASHEADER, IDMD3HEADER};

use crate::error::ModelError;
use crate::r_image::TextureProvider;
use crate::r_model_md2::load_md2;
use crate::r_model_md3::load_md3;
use crate::r_model_types::{BspModel, Model, ModelId, ModelKind};

/// Where model files come from. The filesystem layer lives outside the renderer.
pub trait FileSource {
    fn load_file(&self, path: &str) -> Option<Vec<u8>>;
}

/// In-memory file table, used by tools and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryFiles {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        self.files.insert(path.to_string(), data.into());
    }
}

impl FileSource for MemoryFiles {
    fn load_file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).cloned()
    }
}

/// All models known for the current map.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<Model>,
    by_name: HashMap<String, ModelId>,
    inline_count: usize,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every model. Called when a new map is loaded.
    pub fn clear(&mut self) {
        self.models.clear();
        self.by_name.clear();
        self.inline_count = 0;
    }

    fn insert(&mut self, model: Model) -> ModelId {
        let id = ModelId(self.models.len());
        self.by_name.insert(model.name.clone(), id);
        self.models.push(model);
        id
    }

    /// Registers the submodels past the level models of a tile as `*N`.
    /// Numbering continues across tiles and starts at 1.
    pub fn register_inline_models(&mut self, tile_index: usize, tile: &BspModel) {
        for (submodel, sub) in tile.submodels.iter().enumerate().skip(NUM_REGULAR_MODELS) {
            self.inline_count += 1;
            let model = Model {
                name: format!("*{}", self.inline_count),
                mins: sub.mins,
                maxs: sub.maxs,
                radius: sub.radius,
                kind: ModelKind::BrushSubmodel { tile: tile_index, submodel },
            };
            self.insert(model);
        }
    }

    /// Looks up or loads a model. Models that fail to load are logged and
    /// yield `None`; the caller draws the placeholder instead.
    pub fn register_model(
        &mut self,
        name: &str,
        files: &dyn FileSource,
        textures: &mut dyn TextureProvider,
    ) -> Option<ModelId> {
        if name.is_empty() {
            return None;
        }
        if let Some(&id) = self.by_name.get(name) {
            return Some(id);
        }
        if name.starts_with('*') {
            log::warn!("bad inline model {}", name);
            return None;
        }

        match Self::load(name, files, textures) {
            Ok(model) => {
                log::info!("loaded model {} ({} frames)", name, model.alias().map_or(0, |a| a.num_frames));
                Some(self.insert(model))
            }
            Err(err) => {
                log::error!("{}", err);
                None
            }
        }
    }

    fn load(name: &str, files: &dyn FileSource, textures: &mut dyn TextureProvider) -> Result<Model, ModelError> {
        let data = files
            .load_file(name)
            .ok_or_else(|| ModelError::bad_alias(name, "not found"))?;

        let base = com_strip_extension(name);
        let anm = || {
            files
                .load_file(&format!("{}.anm", base))
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        };

        let ident = data.get(..4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        match ident {
            Some(IDALIASHEADER) => {
                let tag = files.load_file(&format!("{}.tag", base));
                load_md2(name, &data, tag.as_deref(), anm().as_deref(), textures)
            }
            Some(IDMD3HEADER) => load_md3(name, &data, anm().as_deref(), textures),
            _ => Err(ModelError::bad_alias(name, "unknown fileid")),
        }
    }

    pub fn get(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<ModelId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelId, &Model)> {
        self.models.iter().enumerate().map(|(i, m)| (ModelId(i), m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_image::{ImageRegistry, TextureInfo};
    use crate::r_model_md2::test_md2::{quad_md2, tag_bytes, translation};
    use crate::r_model_types::BspSubmodel;

    fn textures() -> ImageRegistry {
        ImageRegistry::new(TextureInfo::new(0, 8, 8))
    }

    fn tile_with_submodels(count: usize) -> BspModel {
        let sub = BspSubmodel {
            mins: [-8.0; 3],
            maxs: [8.0; 3],
            origin: [0.0; 3],
            radius: 13.0,
            headnode: 0,
            first_face: 0,
            num_faces: 1,
        };
        BspModel {
            submodels: vec![sub; count],
            ..Default::default()
        }
    }

    #[test]
    fn test_inline_models_numbered_across_tiles() {
        let mut reg = ModelRegistry::new();
        reg.register_inline_models(0, &tile_with_submodels(NUM_REGULAR_MODELS + 2));
        reg.register_inline_models(1, &tile_with_submodels(NUM_REGULAR_MODELS + 1));

        assert_eq!(reg.len(), 3);
        let id = reg.find("*3").unwrap();
        assert_eq!(
            reg.get(id).unwrap().kind,
            ModelKind::BrushSubmodel { tile: 1, submodel: NUM_REGULAR_MODELS }
        );
        let id = reg.find("*2").unwrap();
        assert_eq!(
            reg.get(id).unwrap().kind,
            ModelKind::BrushSubmodel { tile: 0, submodel: NUM_REGULAR_MODELS + 1 }
        );
    }

    #[test]
    fn test_level_models_are_not_registered() {
        let mut reg = ModelRegistry::new();
        reg.register_inline_models(0, &tile_with_submodels(NUM_REGULAR_MODELS));
        assert!(reg.is_empty());
        assert_eq!(reg.register_model("*1", &MemoryFiles::new(), &mut textures()), None);
    }

    #[test]
    fn test_register_md2_with_siblings() {
        let mut files = MemoryFiles::new();
        files.insert("models/soldier.md2", quad_md2(2).to_bytes());
        files.insert("models/soldier.tag", tag_bytes(&["tag_rweapon"], &[translation(1.0, 0.0, 0.0); 2], 2));
        files.insert("models/soldier.anm", "stand 0 1 10\n");

        let mut reg = ModelRegistry::new();
        let id = reg.register_model("models/soldier.md2", &files, &mut textures()).unwrap();
        let alias = reg.get(id).unwrap().alias().unwrap();
        assert!(alias.tags.as_ref().unwrap().find("tag_rweapon").is_some());
        assert_eq!(alias.anims.len(), 1);

        // cached by name
        assert_eq!(reg.register_model("models/soldier.md2", &files, &mut textures()), Some(id));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_md3_by_magic() {
        use crate::r_model_md3::test_md3::triangle_md3;

        let mut files = MemoryFiles::new();
        // the extension does not pick the loader
        files.insert("models/crab.mdl", triangle_md3(2).to_bytes());
        files.insert("models/crab.anm", "walk 0 1 10\n");

        let mut reg = ModelRegistry::new();
        let id = reg.register_model("models/crab.mdl", &files, &mut textures()).unwrap();
        let alias = reg.get(id).unwrap().alias().unwrap();
        assert_eq!(alias.num_frames, 2);
        assert_eq!(alias.meshes[0].name, "body");
        assert_eq!(alias.anims.len(), 1);
    }

    #[test]
    fn test_failed_models_yield_none() {
        let mut files = MemoryFiles::new();
        files.insert("models/garbage.md2", vec![0u8; 64]);
        files.insert("models/badanim.md2", quad_md2(1).to_bytes());
        files.insert("models/badanim.anm", "run 0 5 10");

        let mut reg = ModelRegistry::new();
        assert_eq!(reg.register_model("models/missing.md2", &files, &mut textures()), None);
        assert_eq!(reg.register_model("models/garbage.md2", &files, &mut textures()), None);
        assert_eq!(reg.register_model("models/badanim.md2", &files, &mut textures()), None);
        assert_eq!(reg.register_model("", &files, &mut textures()), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_clear_resets_inline_numbering() {
        let mut reg = ModelRegistry::new();
        reg.register_inline_models(0, &tile_with_submodels(NUM_REGULAR_MODELS + 1));
        reg.clear();
        reg.register_inline_models(0, &tile_with_submodels(NUM_REGULAR_MODELS + 1));
        assert!(reg.find("*1").is_some());
        assert!(reg.find("*2").is_none());
    }
}
