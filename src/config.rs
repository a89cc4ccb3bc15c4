use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    Info, Parameter, Response, Schema, SchemaMap, Spec, CONTAINER_NAME, METALIST_NAME,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub samples: SamplesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub server: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_path: String,
    /// Recognized for compatibility; static assets are served by an outer
    /// layer, not by this service.
    pub static_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesConfig {
    /// Directory of `{type}.json` sample files induced at bootstrap.
    pub dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            samples: SamplesConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1".to_string(),
            port: 5984,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: "/api".to_string(),
            static_dirs: Vec::new(),
        }
    }
}

impl Default for SamplesConfig {
    fn default() -> Self {
        Self { dir: None }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional config file and
    /// environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);
        config = config.add_source(config::File::with_name("config").required(false));
        config = config.add_source(
            config::Environment::with_prefix("APIARY")
                .separator("_")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// The document database URL, overridable via `DATABASE_URL`.
    pub fn database_url(&self) -> String {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            return url;
        }
        format!("{}:{}", self.database.server, self.database.port)
    }

    /// The server bind address.
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// The two base schemas seeded into every specification: the response
    /// envelope and its metadata block.
    pub fn container_models(&self) -> SchemaMap {
        let mut metalist = Schema {
            title: Some(METALIST_NAME.to_string()),
            description: Some("Metadata about a result set".to_string()),
            ..Default::default()
        };
        for field in ["responseCode", "offset", "limit", "total", "count"] {
            metalist
                .properties
                .insert(field.to_string(), Schema::of_type("integer"));
        }
        metalist
            .properties
            .insert("responseMessage".to_string(), Schema::of_type("string"));

        let mut container = Schema {
            title: Some(CONTAINER_NAME.to_string()),
            description: Some("A wrapper for a list of results".to_string()),
            ..Default::default()
        };
        container
            .properties
            .insert("meta".to_string(), Schema::reference(METALIST_NAME));
        container
            .properties
            .insert("containerType".to_string(), Schema::of_type("string"));
        container
            .properties
            .insert("results".to_string(), Schema::of_type("array"));

        let mut models = SchemaMap::new();
        models.insert(CONTAINER_NAME.to_string(), container);
        models.insert(METALIST_NAME.to_string(), metalist);
        models
    }

    /// Pagination parameters prepended to every collection GET.
    pub fn common_get_params(&self) -> Vec<Parameter> {
        vec![
            Parameter {
                name: "limit".to_string(),
                in_: "query".to_string(),
                type_: Some("integer".to_string()),
                description: Some("Number of results to return".to_string()),
                ..Default::default()
            },
            Parameter {
                name: "offset".to_string(),
                in_: "query".to_string(),
                type_: Some("integer".to_string()),
                description: Some("Number of results to skip".to_string()),
                ..Default::default()
            },
        ]
    }

    /// Error responses shared by single-item operations.
    pub fn common_single_responses(&self) -> BTreeMap<String, Response> {
        let mut responses = self.common_collection_responses();
        responses.insert(
            "404".to_string(),
            Response {
                description: "Entity not found.".to_string(),
                ..Default::default()
            },
        );
        responses
    }

    /// Error responses shared by collection operations. An empty collection
    /// is not an error, so there is no 404 here.
    pub fn common_collection_responses(&self) -> BTreeMap<String, Response> {
        let mut responses = BTreeMap::new();
        responses.insert(
            "400".to_string(),
            Response {
                description: "Malformed request".to_string(),
                ..Default::default()
            },
        );
        responses.insert(
            "409".to_string(),
            Response {
                description: "Invalid or out-of-range parameter".to_string(),
                ..Default::default()
            },
        );
        responses.insert(
            "500".to_string(),
            Response {
                description: "Server error".to_string(),
                ..Default::default()
            },
        );
        responses
    }

    /// The default specification served when none has been persisted yet.
    pub fn spec_template(&self) -> Spec {
        Spec {
            swagger: Some("2.0".to_string()),
            info: Info {
                title: "apiary generated API".to_string(),
                description: Some(
                    "A REST API generated from sample data".to_string(),
                ),
                version: "1.0.0".to_string(),
            },
            base_path: self.api.base_path.clone(),
            produces: vec!["application/json;charset=utf-8".to_string()],
            consumes: vec!["application/json;charset=utf-8".to_string()],
            definitions: self.container_models(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::de_ref;

    #[test]
    fn container_seed_references_metalist() {
        let models = AppConfig::default().container_models();
        let container = &models[CONTAINER_NAME];
        assert_eq!(
            container.properties["meta"].ref_.as_deref().map(de_ref),
            Some(METALIST_NAME)
        );
        assert!(models.contains_key(METALIST_NAME));
    }

    #[test]
    fn template_carries_seeds_and_media_types() {
        let template = AppConfig::default().spec_template();
        assert!(template.definitions.contains_key(CONTAINER_NAME));
        assert_eq!(template.base_path, "/api");
        assert_eq!(template.produces, vec!["application/json;charset=utf-8"]);
        assert!(template.paths.is_empty());
    }

    #[test]
    fn pagination_params_are_integers() {
        let params = AppConfig::default().common_get_params();
        assert_eq!(params[0].name, "limit");
        assert_eq!(params[1].name, "offset");
        assert!(params.iter().all(|p| p.type_.as_deref() == Some("integer")));
    }
}
