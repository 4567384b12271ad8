//! Configuration-driven integration engine.
//!
//! A mapping document describes how to call a target API on behalf of a
//! source system:
//!
//! - Reshape the inbound payload with JSONPath field rules (DIRECT, OBJECT,
//!   ARRAY and CUSTOM mappings, built-in and registered transforms)
//! - Fill URL placeholders and query parameters from the payload
//! - Authenticate the call (Basic, API key, Bearer, OAuth2 client credentials)
//!   with cached tokens
//! - Retry failures and map either the response or the error body into the
//!   result
//!
//! ## Configuration Example
//!
//! ```yaml
//! mappings:
//!   - id: "countries"
//!     targetApi:
//!       url: "https://countries.example.com/v3/all"
//!       method: GET
//!     responseMapping:
//!       type: ARRAY
//!       root: "$[*]"
//!       outputWrapper: "$.countries"
//!       mappings:
//!         - source: "$.name.common"
//!           target: "$.name"
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod registry;
pub mod transformer;
pub mod transport;

pub use auth::{AuthError, AuthRegistry, AuthStrategy, TokenCache};
pub use config::{
    AuthSpec, AuthType, ConnectorConfig, FieldRule, Mapping, MappingDocument, MappingKind,
    Settings, TargetApiSpec,
};
pub use context::ExecutionContext;
pub use engine::{ConnectorEngine, EngineStats, ExecutionOutput, MappingTarget};
pub use error::{ConfigError, ConnectorError, ErrorEnvelope, ErrorKind};
pub use registry::{InMemoryRegistry, MappingRegistry};
pub use transformer::{Diagnostics, MappingEngine, TransformCatalog, TransformError};
pub use transport::{HttpTransport, OutboundRequest, ReqwestTransport, TransportError};
