//! Connector engine: runs one mapping document end to end.
//!
//! An execution resolves the document and its auth, maps the inbound payload,
//! builds the target request, authenticates it, calls the target with retry,
//! and maps either the response or the error body into the result.

use crate::auth::{self, AuthRegistry, TokenCache};
use crate::config::{
    AuthSpec, AuthType, ConnectorConfig, MappingDocument, ResilienceConfig, Settings,
    TargetApiSpec,
};
use crate::context::ExecutionContext;
use crate::error::{ConfigError, ConnectorError};
use crate::registry::{InMemoryRegistry, MappingRegistry};
use crate::transformer::{url, Diagnostics, MappingEngine, TransformCatalog};
use crate::transport::{HttpTransport, OutboundRequest, ReqwestTransport, RequestBody, TransportError};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What to execute: a registry key (id or name) or a document in hand.
#[derive(Debug, Clone)]
pub enum MappingTarget {
    Key(String),
    Document(Arc<MappingDocument>),
}

impl From<&str> for MappingTarget {
    fn from(key: &str) -> Self {
        MappingTarget::Key(key.to_string())
    }
}

impl From<String> for MappingTarget {
    fn from(key: String) -> Self {
        MappingTarget::Key(key)
    }
}

impl From<Arc<MappingDocument>> for MappingTarget {
    fn from(document: Arc<MappingDocument>) -> Self {
        MappingTarget::Document(document)
    }
}

impl From<MappingDocument> for MappingTarget {
    fn from(document: MappingDocument) -> Self {
        MappingTarget::Document(Arc::new(document))
    }
}

/// Result of a successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// Mapped response, or the mapped error body when `error_mapped`
    pub value: JsonValue,
    /// Target call attempts made
    pub attempts: u32,
    /// The target call failed and `errorMapping` produced `value`
    pub error_mapped: bool,
    /// Field failures from every mapping applied
    pub diagnostics: Diagnostics,
}

impl ExecutionOutput {
    pub fn into_value(self) -> JsonValue {
        self.value
    }

    /// `{ success: true, statusCode: 200, data }`
    pub fn envelope(&self) -> JsonValue {
        json!({
            "success": true,
            "statusCode": 200,
            "data": self.value,
        })
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub executions_total: u64,
    pub executions_failed: u64,
    pub retries_total: u64,
    pub errors_mapped: u64,
    pub field_failures: u64,
}

/// Executes mapping documents against their target APIs.
///
/// Shared across tasks behind an `Arc`; the only state kept between calls is
/// the token cache and the counters.
pub struct ConnectorEngine {
    settings: Settings,
    transport: Arc<dyn HttpTransport>,
    registry: Option<Arc<dyn MappingRegistry>>,
    mapper: MappingEngine,
    auth: AuthRegistry,
    /// Metrics: total executions started.
    executions_total: AtomicU64,
    /// Metrics: executions that returned an error.
    executions_failed: AtomicU64,
    /// Metrics: retry attempts made.
    retries_total: AtomicU64,
    /// Metrics: failed calls turned into results by an error mapping.
    errors_mapped: AtomicU64,
    /// Metrics: field failures recorded in diagnostics.
    field_failures: AtomicU64,
}

impl ConnectorEngine {
    /// Create an engine with default settings, no registry, and an empty
    /// transform catalog.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings: Settings::default(),
            transport,
            registry: None,
            mapper: MappingEngine::default(),
            auth: AuthRegistry::default(),
            executions_total: AtomicU64::new(0),
            executions_failed: AtomicU64::new(0),
            retries_total: AtomicU64::new(0),
            errors_mapped: AtomicU64::new(0),
            field_failures: AtomicU64::new(0),
        }
    }

    /// Create an engine from host configuration: a reqwest transport built
    /// from the settings and an in-memory registry of the configured mappings.
    pub fn from_config(config: ConnectorConfig) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(&config.settings)?;
        let mapping_count = config.mappings.len();
        let registry = InMemoryRegistry::from_documents(config.mappings);

        info!(
            transport = transport.name(),
            mappings = mapping_count,
            request_timeout_ms = config.settings.request_timeout_ms,
            "Connector engine initialized"
        );

        Ok(Self::new(Arc::new(transport))
            .with_settings(config.settings)
            .with_registry(Arc::new(registry)))
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ConnectorConfig = serde_yaml::from_str(yaml)?;
        Self::from_config(config)
    }

    /// Create from a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ConnectorConfig = serde_json::from_str(json)?;
        Self::from_config(config)
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn MappingRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use `catalog` to resolve custom transform and CUSTOM mapping names.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<TransformCatalog>) -> Self {
        self.mapper = MappingEngine::new(catalog);
        self
    }

    /// Share a token cache, e.g. between engines talking to the same issuers.
    #[must_use]
    pub fn with_token_cache(mut self, cache: Arc<TokenCache>) -> Self {
        self.auth = AuthRegistry::new(cache);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn mapper(&self) -> &MappingEngine {
        &self.mapper
    }

    pub fn auth(&self) -> &AuthRegistry {
        &self.auth
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            executions_total: self.executions_total.load(Ordering::Relaxed),
            executions_failed: self.executions_failed.load(Ordering::Relaxed),
            retries_total: self.retries_total.load(Ordering::Relaxed),
            errors_mapped: self.errors_mapped.load(Ordering::Relaxed),
            field_failures: self.field_failures.load(Ordering::Relaxed),
        }
    }

    /// Check a document's static configuration: a target URL and a complete
    /// stored auth spec.
    pub fn validate_document(&self, document: &MappingDocument) -> Result<(), ConnectorError> {
        target_api(document)?;
        if let Some(spec) = &document.auth_config {
            self.auth.validate(spec)?;
        }
        Ok(())
    }

    /// Run one execution.
    pub async fn execute(
        &self,
        target: impl Into<MappingTarget>,
        payload: JsonValue,
        ctx: ExecutionContext,
    ) -> Result<ExecutionOutput, ConnectorError> {
        self.executions_total.fetch_add(1, Ordering::Relaxed);

        let result = self.run(target.into(), payload, &ctx).await;
        match &result {
            Ok(output) => {
                self.field_failures
                    .fetch_add(output.diagnostics.len() as u64, Ordering::Relaxed);
            }
            Err(error) => {
                self.executions_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    error_type = ?error.kind(),
                    "Execution failed"
                );
            }
        }
        result
    }

    async fn run(
        &self,
        target: MappingTarget,
        payload: JsonValue,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionOutput, ConnectorError> {
        let document = self.resolve_document(target).await?;
        let target_api = target_api(&document)?;
        let auth = auth::resolve_auth(document.auth_config.as_ref(), ctx.auth.as_ref())?;
        if auth.auth_type != AuthType::None {
            self.auth.validate(&auth)?;
        }

        info!(
            correlation_id = %ctx.correlation_id,
            mapping = %document.id,
            source_system = %document.source_system,
            target_system = %document.target_system,
            "Executing mapping"
        );

        let mut diagnostics = Diagnostics::new();
        let request = self
            .build_request(&document, target_api, &auth, &payload, ctx, &mut diagnostics)
            .await?;

        let (outcome, attempts) = self
            .call_with_retry(&request, &target_api.resilience, ctx)
            .await;

        match outcome {
            Ok(response) => {
                let value = match &document.response_mapping {
                    Some(mapping) => self.mapper.transform_with_diagnostics(
                        &response,
                        mapping,
                        &document.transforms,
                        &mut diagnostics,
                    ),
                    None => response,
                };
                info!(
                    correlation_id = %ctx.correlation_id,
                    mapping = %document.id,
                    attempts,
                    field_failures = diagnostics.len(),
                    "Execution succeeded"
                );
                Ok(ExecutionOutput {
                    value,
                    attempts,
                    error_mapped: false,
                    diagnostics,
                })
            }
            Err(error) => match &document.error_mapping {
                Some(mapping) => {
                    let value = self.mapper.transform_with_diagnostics(
                        &error_payload(&error),
                        mapping,
                        &document.transforms,
                        &mut diagnostics,
                    );
                    self.errors_mapped.fetch_add(1, Ordering::Relaxed);
                    info!(
                        correlation_id = %ctx.correlation_id,
                        mapping = %document.id,
                        attempts,
                        status = ?error.status(),
                        "Target call failed, returning mapped error"
                    );
                    Ok(ExecutionOutput {
                        value,
                        attempts,
                        error_mapped: true,
                        diagnostics,
                    })
                }
                None => Err(error.into()),
            },
        }
    }

    async fn resolve_document(
        &self,
        target: MappingTarget,
    ) -> Result<Arc<MappingDocument>, ConnectorError> {
        let key = match target {
            MappingTarget::Document(document) => return Ok(document),
            MappingTarget::Key(key) => key,
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConnectorError::MissingConnectorKey);
        }

        let Some(registry) = &self.registry else {
            return Err(ConnectorError::MappingNotFound(key.to_string()));
        };
        registry
            .find_by_id_or_name(key)
            .await
            .map_err(|e| ConnectorError::Internal(format!("mapping lookup failed: {e:#}")))?
            .ok_or_else(|| ConnectorError::MappingNotFound(key.to_string()))
    }

    /// Steps 1-4: payload, URL, query, headers, auth.
    async fn build_request(
        &self,
        document: &MappingDocument,
        target_api: &TargetApiSpec,
        auth: &AuthSpec,
        payload: &JsonValue,
        ctx: &ExecutionContext,
        diagnostics: &mut Diagnostics,
    ) -> Result<OutboundRequest, ConnectorError> {
        let method = ctx
            .method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(target_api.method.as_str());

        let body = match &document.request_mapping {
            Some(mapping) if !mapping.is_passthrough() => self.mapper.transform_with_diagnostics(
                payload,
                mapping,
                &document.transforms,
                diagnostics,
            ),
            _ => payload.clone(),
        };

        let url = url::resolve_url(&target_api.url, &target_api.path_params, payload);
        let mut request = OutboundRequest::new(method, url);
        request.query = url::resolve_query(&target_api.query_params, &ctx.query_params, payload);
        request.body = request_body(&request.method, body);

        for (name, value) in target_api.headers.iter().chain(&ctx.headers) {
            request.set_header(name.as_str(), value.as_str());
        }

        if auth.auth_type != AuthType::None {
            self.auth
                .inject(&mut request, auth, ctx, self.transport.as_ref())
                .await?;
        }

        debug!(
            correlation_id = %ctx.correlation_id,
            transport = self.transport_name(),
            method = %request.method,
            url = %request.url,
            query_params = request.query.len(),
            "Prepared target request"
        );
        Ok(request)
    }

    /// Step 5: up to `retry_count + 1` attempts with a fixed delay.
    async fn call_with_retry(
        &self,
        request: &OutboundRequest,
        policy: &ResilienceConfig,
        ctx: &ExecutionContext,
    ) -> (Result<JsonValue, TransportError>, u32) {
        let delay_ms = policy
            .retry_delay_ms
            .unwrap_or(self.settings.default_retry_delay_ms);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.transport.send(request.clone()).await {
                Ok(body) => return (Ok(body), attempt),
                Err(error) if attempt <= policy.retry_count => {
                    self.retries_total.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        attempt,
                        delay_ms,
                        error = %error,
                        "Target call failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(error) => return (Err(error), attempt),
            }
        }
    }
}

fn target_api(document: &MappingDocument) -> Result<&TargetApiSpec, ConnectorError> {
    document
        .target_api
        .as_ref()
        .filter(|api| !api.url.trim().is_empty())
        .ok_or_else(|| ConnectorError::InvalidMapping(document.id.clone()))
}

/// GET and HEAD carry no body; a missing body on POST, PUT or PATCH becomes
/// an empty object.
fn request_body(method: &str, body: JsonValue) -> RequestBody {
    match (method, body) {
        ("GET" | "HEAD", _) => RequestBody::Empty,
        ("POST" | "PUT" | "PATCH", JsonValue::Null) => RequestBody::Json(JsonValue::Object(Map::new())),
        (_, JsonValue::Null) => RequestBody::Empty,
        (_, body) => RequestBody::Json(body),
    }
}

/// Source value for the error mapping: the target's error body, or
/// `{message}` when there is none.
fn error_payload(error: &TransportError) -> JsonValue {
    match error {
        TransportError::Status { body, .. } if !is_blank(body) => body.clone(),
        other => json!({ "message": other.to_string() }),
    }
}

fn is_blank(body: &JsonValue) -> bool {
    match body {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
