use std::collections::HashMap;
use std::path::PathBuf;

use colloquy_types::PersonaKind;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_CATALOG_PATH: &str = "colloquy/config/model-catalog.toml";
const BUILTIN_MODEL_CATALOG_TOML: &str = include_str!("../../config/model-catalog.example.toml");

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ModelConfigError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("missing API key environment variable: {0}")]
    MissingApiKey(String),
    #[error("no fallback model available")]
    NoFallbackAvailable,
}

/// Wire-level provider family a model is served through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    AnthropicCompatible {
        base_url: String,
        api_key_env: String,
        model: String,
        headers: HashMap<String, String>,
    },
    OpenAiGeneric {
        base_url: String,
        api_key_env: String,
        model: String,
        headers: HashMap<String, String>,
    },
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            Self::AnthropicCompatible { model, .. } => model,
            Self::OpenAiGeneric { model, .. } => model,
        }
    }

    pub fn api_key_env(&self) -> &str {
        match self {
            Self::AnthropicCompatible { api_key_env, .. } => api_key_env,
            Self::OpenAiGeneric { api_key_env, .. } => api_key_env,
        }
    }
}

/// Resolve the provider's API key from the environment. The single place
/// credentials are read, so MissingApiKey carries the exact variable name.
pub fn resolve_api_key(provider: &ProviderConfig) -> Result<String, ModelConfigError> {
    let env = provider.api_key_env();
    std::env::var(env)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ModelConfigError::MissingApiKey(env.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelResolutionSource {
    Request,
    App,
    User,
    EnvDefault,
    Fallback,
}

impl ModelResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::App => "app",
            Self::User => "user",
            Self::EnvDefault => "env_default",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub config: ModelConfig,
    pub source: ModelResolutionSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResolutionContext {
    pub request_model: Option<String>,
    pub app_preference: Option<String>,
    pub user_preference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    configs: HashMap<String, ModelConfig>,
    aliases: HashMap<String, String>,
    routing: ModelRoutingConfig,
}

/// On-disk catalog schema (TOML).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCatalog {
    pub default_model: Option<String>,
    pub allow_request_override: Option<bool>,
    pub allowed_models: Option<Vec<String>>,
    pub callsite_defaults: Option<HashMap<String, String>>,
    pub models: HashMap<String, ModelCatalogEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCatalogEntry {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub aliases: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ModelRoutingConfig {
    default_model: Option<String>,
    allow_request_override: bool,
    allowed_models: Option<Vec<String>>,
    callsite_defaults: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        let (configs, aliases, routing) = load_model_catalog_configs()
            .or_else(|| {
                tracing::warn!("Falling back to built-in model catalog");
                load_model_catalog_configs_from(&built_in_model_catalog())
            })
            .unwrap_or_else(|| {
                tracing::warn!("Built-in model catalog parse failed; registry will be empty");
                (
                    HashMap::new(),
                    HashMap::new(),
                    ModelRoutingConfig::default(),
                )
            });
        Self {
            configs,
            aliases,
            routing,
        }
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelConfig> {
        if let Some(canonical) = self.aliases.get(model_id) {
            return self.configs.get(canonical);
        }
        self.configs.get(model_id)
    }

    pub fn available_model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.configs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolution priority: explicit request, app preference, user
    /// preference, `COLLOQUY_DEFAULT_MODEL`, catalog default, then any
    /// available model. An explicit request naming an unknown model is an
    /// error rather than a silent fallback.
    pub fn resolve(
        &self,
        context: &ModelResolutionContext,
    ) -> Result<ResolvedModel, ModelConfigError> {
        if let Some(request_model) = context.request_model.as_ref() {
            let resolved = self
                .get(request_model)
                .cloned()
                .ok_or_else(|| ModelConfigError::UnknownModel(request_model.clone()))?;
            return Ok(ResolvedModel {
                config: resolved,
                source: ModelResolutionSource::Request,
            });
        }

        if let Some(app_model) = context.app_preference.as_ref() {
            if let Some(resolved) = self.get(app_model).cloned() {
                return Ok(ResolvedModel {
                    config: resolved,
                    source: ModelResolutionSource::App,
                });
            }
        }

        if let Some(user_model) = context.user_preference.as_ref() {
            if let Some(resolved) = self.get(user_model).cloned() {
                return Ok(ResolvedModel {
                    config: resolved,
                    source: ModelResolutionSource::User,
                });
            }
        }

        if let Ok(default_model) = std::env::var("COLLOQUY_DEFAULT_MODEL") {
            if let Some(resolved) = self.get(&default_model).cloned() {
                return Ok(ResolvedModel {
                    config: resolved,
                    source: ModelResolutionSource::EnvDefault,
                });
            }
        }

        if let Some(config_default) = self.routing.default_model.as_ref() {
            if let Some(resolved) = self.get(config_default).cloned() {
                return Ok(ResolvedModel {
                    config: resolved,
                    source: ModelResolutionSource::Fallback,
                });
            }
        }

        self.available_model_ids()
            .into_iter()
            .find_map(|id| self.get(&id).cloned())
            .map(|config| ResolvedModel {
                config,
                source: ModelResolutionSource::Fallback,
            })
            .ok_or(ModelConfigError::NoFallbackAvailable)
    }

    pub fn default_model_for_callsite(&self, callsite: &str) -> Option<String> {
        self.routing
            .callsite_defaults
            .get(callsite)
            .and_then(|id| self.get(id))
            .map(|cfg| cfg.id.clone())
            .or_else(|| {
                self.routing
                    .default_model
                    .as_ref()
                    .and_then(|id| self.get(id))
                    .map(|cfg| cfg.id.clone())
            })
    }

    /// Like [`resolve`](Self::resolve), scoped to one callsite: honors the
    /// catalog's per-callsite defaults, request-override policy, and
    /// allowlist.
    pub fn resolve_for_callsite(
        &self,
        callsite: &str,
        context: &ModelResolutionContext,
    ) -> Result<ResolvedModel, ModelConfigError> {
        let scoped_request = if self.routing.allow_request_override {
            context.request_model.clone()
        } else {
            None
        };

        let mut resolved = self.resolve(&ModelResolutionContext {
            request_model: scoped_request,
            app_preference: context
                .app_preference
                .clone()
                .or_else(|| self.routing.callsite_defaults.get(callsite).cloned())
                .or_else(|| self.routing.default_model.clone()),
            user_preference: context.user_preference.clone(),
        })?;

        let is_allowed = |model_id: &str| self.is_allowed_model(model_id);

        if !is_allowed(&resolved.config.id) {
            if let Some(fallback) = self
                .available_model_ids()
                .into_iter()
                .find(|candidate| is_allowed(candidate))
                .and_then(|candidate| self.get(&candidate).cloned())
            {
                resolved = ResolvedModel {
                    config: fallback,
                    source: ModelResolutionSource::Fallback,
                };
            } else {
                return Err(ModelConfigError::NoFallbackAvailable);
            }
        }

        Ok(resolved)
    }

    /// Persona-scoped resolution; callsite keys in the catalog are the
    /// snake_case persona names, so the fact-checker can run on a cheaper
    /// model than the panel.
    pub fn resolve_for_persona(
        &self,
        persona: PersonaKind,
        context: &ModelResolutionContext,
    ) -> Result<ResolvedModel, ModelConfigError> {
        self.resolve_for_callsite(&persona.to_string(), context)
    }

    fn is_allowed_model(&self, model_id: &str) -> bool {
        let allowlist_matches = |candidate: &str| {
            self.get(candidate)
                .map(|cfg| cfg.id == model_id)
                .unwrap_or(candidate == model_id)
        };
        self.routing
            .allowed_models
            .as_ref()
            .map(|models| models.iter().any(|m| allowlist_matches(m)))
            .unwrap_or(true)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_model_catalog() -> ModelCatalog {
    let explicit_path = std::env::var("COLLOQUY_MODEL_CATALOG_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);

    let path = explicit_path
        .or_else(|| find_default_catalog_path(DEFAULT_MODEL_CATALOG_PATH))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_CATALOG_PATH));

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "Failed to load model catalog file; using built-in defaults"
            );
            return built_in_model_catalog();
        }
    };
    toml::from_str(&content).unwrap_or_else(|err| {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "Failed to parse model catalog TOML; using built-in defaults"
        );
        built_in_model_catalog()
    })
}

fn built_in_model_catalog() -> ModelCatalog {
    toml::from_str(BUILTIN_MODEL_CATALOG_TOML).unwrap_or_else(|err| {
        tracing::error!(error = %err, "Failed to parse built-in model catalog");
        ModelCatalog::default()
    })
}

fn find_default_catalog_path(relative_path: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;
    loop {
        let candidate = current.join(relative_path);
        if candidate.exists() && candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            break;
        }
    }
    None
}

fn load_model_catalog_configs() -> Option<(
    HashMap<String, ModelConfig>,
    HashMap<String, String>,
    ModelRoutingConfig,
)> {
    let catalog = load_model_catalog();
    load_model_catalog_configs_from(&catalog)
}

fn load_model_catalog_configs_from(
    catalog: &ModelCatalog,
) -> Option<(
    HashMap<String, ModelConfig>,
    HashMap<String, String>,
    ModelRoutingConfig,
)> {
    if catalog.models.is_empty() {
        return None;
    }

    let mut configs = HashMap::new();
    let mut aliases = HashMap::new();

    for (id, entry) in &catalog.models {
        let Some(config) = model_config_from_catalog_entry(id, entry) else {
            continue;
        };

        aliases.insert(config.id.clone(), config.id.clone());
        if let Some(extra_aliases) = entry.aliases.as_ref() {
            for alias in extra_aliases {
                aliases.insert(alias.clone(), config.id.clone());
            }
        }
        configs.insert(config.id.clone(), config);
    }

    if configs.is_empty() {
        return None;
    }

    let routing = ModelRoutingConfig {
        default_model: catalog.default_model.clone(),
        allow_request_override: catalog.allow_request_override.unwrap_or(true),
        allowed_models: catalog.allowed_models.clone(),
        callsite_defaults: catalog.callsite_defaults.clone().unwrap_or_default(),
    };

    Some((configs, aliases, routing))
}

fn model_config_from_catalog_entry(id: &str, entry: &ModelCatalogEntry) -> Option<ModelConfig> {
    let Some(provider) = entry.provider.as_deref() else {
        tracing::warn!(model_id = %id, "Skipping catalog model with missing provider");
        return None;
    };
    let Some(model) = entry.model.as_deref() else {
        tracing::warn!(model_id = %id, "Skipping catalog model with missing model field");
        return None;
    };
    let Some(base_url) = entry.base_url.as_deref() else {
        tracing::warn!(model_id = %id, "Skipping catalog model with missing base_url");
        return None;
    };
    let Some(api_key_env) = entry.api_key_env.as_deref() else {
        tracing::warn!(model_id = %id, "Skipping catalog model with missing api_key_env");
        return None;
    };

    let provider = match provider {
        "anthropic" | "anthropic-compatible" => ProviderConfig::AnthropicCompatible {
            base_url: base_url.to_string(),
            api_key_env: api_key_env.to_string(),
            model: model.to_string(),
            headers: entry.headers.clone().unwrap_or_default(),
        },
        "openai-generic" => ProviderConfig::OpenAiGeneric {
            base_url: base_url.to_string(),
            api_key_env: api_key_env.to_string(),
            model: model.to_string(),
            headers: entry.headers.clone().unwrap_or_default(),
        },
        unknown => {
            tracing::warn!(
                model_id = %id,
                provider = %unknown,
                "Skipping catalog model with unknown provider"
            );
            return None;
        }
    };

    Some(ModelConfig {
        id: id.to_string(),
        name: entry.name.clone().unwrap_or_else(|| id.to_string()),
        provider,
    })
}
