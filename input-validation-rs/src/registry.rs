//! Schema registry
//!
//! Schemas are looked up by id in a local TTL cache, then in the shared
//! cache store. Built-in schemas are pinned locally and never expire. A
//! lookup that cannot be answered (unknown id, store failure, store timeout,
//! undecodable entry) is reported as [`SchemaLookup::NotFound`], which is
//! distinct from a schema that simply has no constraints.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use shared_types_rs::config::SchemaSettings;
use shared_types_rs::{CacheStore, TtlRegistry};

use crate::schema::{JsonSchema, PropertySchema, ValidationResult};
use crate::DEFAULT_MAX_DEPTH;

const STORE_KEY_PREFIX: &str = "schema:";

/// Default lifetime of dynamically registered schemas in the local cache
pub const DEFAULT_SCHEMA_TTL: Duration = Duration::from_secs(300);

/// Default budget for a cache store round trip
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaLookup {
    Found(Arc<JsonSchema>),
    NotFound,
}

impl SchemaLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, SchemaLookup::Found(_))
    }

    pub fn into_schema(self) -> Option<Arc<JsonSchema>> {
        match self {
            SchemaLookup::Found(schema) => Some(schema),
            SchemaLookup::NotFound => None,
        }
    }
}

pub struct SchemaRegistry {
    local: TtlRegistry<String, JsonSchema>,
    builtin_ids: RwLock<HashSet<String>>,
    store: Option<Arc<dyn CacheStore>>,
    store_timeout: Duration,
    max_depth: usize,
}

impl SchemaRegistry {
    /// Empty registry without a backing store
    pub fn new(ttl: Duration) -> Self {
        Self {
            local: TtlRegistry::new(ttl),
            builtin_ids: RwLock::new(HashSet::new()),
            store: None,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Registry preloaded with [`builtin_schemas`]
    pub fn with_defaults(ttl: Duration) -> Self {
        let registry = Self::new(ttl);
        for schema in builtin_schemas() {
            registry.pin(schema);
        }
        registry
    }

    pub fn from_settings(settings: &SchemaSettings) -> Self {
        let mut registry = Self::with_defaults(Duration::from_secs(settings.cache_ttl_secs));
        registry.store_timeout = Duration::from_millis(settings.store_timeout_ms);
        registry.max_depth = settings.max_depth;
        registry
    }

    pub fn with_store(mut self, store: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        self.store = Some(store);
        self.store_timeout = timeout;
        self
    }

    fn pin(&self, schema: JsonSchema) -> Arc<JsonSchema> {
        if let Ok(mut ids) = self.builtin_ids.write() {
            ids.insert(schema.id.clone());
        }
        self.local.pin(schema.id.clone(), schema)
    }

    fn is_builtin(&self, id: &str) -> bool {
        self.builtin_ids
            .read()
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }

    /// Register or replace a schema. The store write is best effort.
    pub async fn register(&self, schema: JsonSchema) -> Arc<JsonSchema> {
        let id = schema.id.clone();
        let serialized = serde_json::to_string(&schema);

        let registered = if self.is_builtin(&id) {
            self.local.pin(id.clone(), schema)
        } else {
            self.local.insert(id.clone(), schema)
        };
        log::info!("Registered schema '{}' (version {})", id, registered.version);

        if let (Some(store), Ok(serialized)) = (&self.store, serialized) {
            let key = format!("{}{}", STORE_KEY_PREFIX, id);
            let write = store.set_with_expiry(&key, serialized, self.local.ttl());
            match tokio::time::timeout(self.store_timeout, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Failed to persist schema '{}': {}", id, e),
                Err(_) => log::warn!("Timed out persisting schema '{}'", id),
            }
        }
        registered
    }

    /// Resolve a schema id
    pub async fn get(&self, id: &str) -> SchemaLookup {
        let key = id.to_string();
        if let Some(schema) = self.local.get(&key) {
            return SchemaLookup::Found(schema);
        }

        let store = match &self.store {
            Some(store) => store,
            None => return SchemaLookup::NotFound,
        };

        let store_key = format!("{}{}", STORE_KEY_PREFIX, id);
        let raw = match tokio::time::timeout(self.store_timeout, store.get(&store_key)).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => return SchemaLookup::NotFound,
            Ok(Err(e)) => {
                log::warn!("Schema store lookup for '{}' failed: {}", id, e);
                return SchemaLookup::NotFound;
            }
            Err(_) => {
                log::warn!("Schema store lookup for '{}' timed out", id);
                return SchemaLookup::NotFound;
            }
        };

        match serde_json::from_str::<JsonSchema>(&raw) {
            Ok(schema) if schema.id == id => SchemaLookup::Found(self.local.insert(key, schema)),
            Ok(schema) => {
                log::warn!("Stored schema under '{}' declares id '{}'", id, schema.id);
                SchemaLookup::NotFound
            }
            Err(e) => {
                log::warn!("Stored schema '{}' is undecodable: {}", id, e);
                SchemaLookup::NotFound
            }
        }
    }

    /// Validate against the schema registered under `id`; `None` when the
    /// schema cannot be resolved.
    pub async fn validate(&self, id: &str, value: &Value) -> Option<ValidationResult> {
        self.get(id)
            .await
            .into_schema()
            .map(|schema| schema.validate_with_max_depth(value, self.max_depth))
    }

    /// Ids currently held in the local cache
    pub fn local_ids(&self) -> Vec<String> {
        let mut ids = self.local.keys();
        ids.sort();
        ids
    }
}

/// The schemas every registry starts with
pub fn builtin_schemas() -> Vec<JsonSchema> {
    let identifier = || {
        PropertySchema::string()
            .pattern(r"^[A-Za-z0-9_-]{1,64}$")
            .build()
    };
    let free_form = || {
        PropertySchema::object(JsonSchema::permissive(""))
            .description("Free-form attributes")
            .build()
    };

    vec![
        JsonSchema::builder("entity")
            .required_property("id", identifier())
            .required_property("type", PropertySchema::string().min_length(1).max_length(64).build())
            .required_property("name", PropertySchema::string().min_length(1).max_length(256).build())
            .optional_property("description", PropertySchema::string().max_length(4096).build())
            .optional_property(
                "tags",
                PropertySchema::array(PropertySchema::string().min_length(1).max_length(64).build())
                    .max_items(32)
                    .build(),
            )
            .optional_property("properties", free_form())
            .build(),
        JsonSchema::builder("relationship")
            .required_property("sourceId", identifier())
            .required_property("targetId", identifier())
            .required_property(
                "relationType",
                PropertySchema::string()
                    .pattern(r"^[A-Z][A-Z0-9_]{0,63}$")
                    .build(),
            )
            .optional_property("weight", PropertySchema::number().minimum(0.0).maximum(1.0).build())
            .optional_property("properties", free_form())
            .build(),
        JsonSchema::builder("search_request")
            .required_property("query", PropertySchema::string().min_length(1).max_length(1000).build())
            .optional_property("limit", PropertySchema::integer().minimum(1.0).maximum(100.0).build())
            .optional_property("offset", PropertySchema::integer().minimum(0.0).build())
            .optional_property(
                "sort",
                PropertySchema::string()
                    .one_of(vec![json!("relevance"), json!("recent"), json!("name")])
                    .build(),
            )
            .optional_property("filters", free_form())
            .build(),
        JsonSchema::builder("command_input")
            .required_property(
                "command",
                PropertySchema::string()
                    .pattern(r"^[a-z][a-z0-9_.-]{0,127}$")
                    .build(),
            )
            .optional_property("arguments", free_form())
            .build(),
    ]
}
