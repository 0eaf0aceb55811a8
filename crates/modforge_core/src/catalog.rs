/// Preset used when the user has not selected one.
pub const DEFAULT_PRESET_ID: &str = "minecraft_balance";
/// Instruction sent when the custom prompt is blank.
pub const DEFAULT_PROMPT: &str = "Enhance this mod with balanced improvements";
pub const DEFAULT_MODEL_CONFIG: &str = "default";

/// A named, priced AI-transformation template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub credit_cost: u32,
    pub game_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Read-only snapshot of the presets offered for this session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresetCatalog {
    presets: Vec<Preset>,
    state: CatalogState,
    warning: Option<String>,
}

impl PresetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the catalog as loading. Returns false when a load has already
    /// been started, which makes repeated load requests no-ops.
    pub fn begin_load(&mut self) -> bool {
        if self.state != CatalogState::Unloaded {
            return false;
        }
        self.state = CatalogState::Loading;
        true
    }

    pub fn apply_loaded(&mut self, presets: Vec<Preset>) {
        self.presets = presets;
        self.state = CatalogState::Loaded;
        self.warning = None;
    }

    /// A failed load leaves the catalog empty and records a warning.
    pub fn apply_failed(&mut self, message: impl Into<String>) {
        self.presets.clear();
        self.state = CatalogState::Failed;
        self.warning = Some(message.into());
    }

    pub fn state(&self) -> CatalogState {
        self.state
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn get_preset(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    /// Presets applicable to a classified mod. Presets without a game type
    /// apply to every mod.
    pub fn presets_for_mod_type(&self, mod_type: &str) -> Vec<&Preset> {
        self.presets
            .iter()
            .filter(|preset| {
                preset
                    .game_type
                    .as_deref()
                    .map_or(true, |game| game.eq_ignore_ascii_case(mod_type))
            })
            .collect()
    }
}

/// Body of a processing request, with the user's choices resolved against
/// the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingRequest {
    pub preset_id: String,
    pub prompt: String,
    pub model_config: String,
}

impl ProcessingRequest {
    pub fn new(preset_id: Option<&str>, prompt: &str) -> Self {
        let preset_id = preset_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_PRESET_ID);
        let prompt = if prompt.trim().is_empty() {
            DEFAULT_PROMPT
        } else {
            prompt
        };
        Self {
            preset_id: preset_id.to_string(),
            prompt: prompt.to_string(),
            model_config: DEFAULT_MODEL_CONFIG.to_string(),
        }
    }
}
