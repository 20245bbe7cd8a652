use serde::Serialize;
use tracing::{debug, warn};

use super::credential_material::{CredentialMaterial, ExecPlugin};
use super::kubeconfig_file::load_base_credentials;
use super::settings::{EnvSource, Settings, ENV_APPLY_RETRY_COUNT};
use crate::errors::ProviderResult;

pub const DEFAULT_QPS: f32 = 100.0;
pub const DEFAULT_BURST: u32 = 100;

/// Protocol version reported when the host does not send one.
const LEGACY_PROTOCOL_VERSION: &str = "0.11+compatible";

/// Client-side request budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimit {
    pub qps: f32,
    pub burst: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            qps: DEFAULT_QPS,
            burst: DEFAULT_BURST,
        }
    }
}

/// The tool driving this provider, stamped into the user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerInfo {
    pub tool: String,
    pub protocol_version: String,
}

impl Default for CallerInfo {
    fn default() -> Self {
        Self {
            tool: "Terraform".to_string(),
            protocol_version: String::new(),
        }
    }
}

impl CallerInfo {
    pub fn user_agent(&self) -> String {
        let version = if self.protocol_version.is_empty() {
            LEGACY_PROTOCOL_VERSION
        } else {
            &self.protocol_version
        };
        format!(
            "{}/{} {}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            self.tool,
            version
        )
    }
}

/// Final connection settings, read-only once built.
///
/// Consumers that need a variant clone it; nothing mutates a shared instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConnection {
    pub credentials: CredentialMaterial,
    pub rate_limit: RateLimit,
    pub user_agent: String,
    /// Attempts a write-path collaborator may make; carried here instead of global state.
    pub apply_retry_count: u64,
}

impl ResolvedConnection {
    pub fn host(&self) -> &str {
        &self.credentials.host
    }
}

/// Merge kubeconfig, fixed defaults, explicit settings and the exec plugin.
///
/// The layering order is file → defaults → explicit fields → exec → retry
/// count, and no network call is made.
pub fn resolve(
    settings: &Settings,
    caller: &CallerInfo,
    env: &dyn EnvSource,
) -> ProviderResult<ResolvedConnection> {
    let base = if settings.load_config_file {
        load_base_credentials(settings)?
    } else {
        debug!("Skipping kubeconfig file, load_config_file is false");
        None
    };

    let mut credentials = base.unwrap_or_default();
    let rate_limit = RateLimit::default();
    let user_agent = caller.user_agent();

    apply_explicit(&mut credentials, settings);

    if let Some(exec) = &settings.exec {
        credentials.exec = Some(ExecPlugin {
            api_version: exec.api_version.clone(),
            command: exec.command.clone(),
            args: exec.args.clone(),
            env: exec.env.clone(),
        });
    }

    let apply_retry_count = resolve_retry_count(settings.apply_retry_count, env);

    debug!(
        host = %credentials.host,
        credentials = ?credentials.credential_kinds(),
        apply_retry_count,
        "Resolved connection"
    );

    Ok(ResolvedConnection {
        credentials,
        rate_limit,
        user_agent,
        apply_retry_count,
    })
}

/// Every set field overwrites the file-derived one; unset fields leave it alone.
fn apply_explicit(credentials: &mut CredentialMaterial, settings: &Settings) {
    if !settings.host.is_empty() {
        credentials.host = settings.host.clone();
    }
    if !settings.username.is_empty() {
        credentials.username = settings.username.clone();
    }
    if !settings.password.is_empty() {
        credentials.password = settings.password.clone();
    }
    if settings.insecure {
        credentials.insecure = true;
    }
    if !settings.cluster_ca_certificate.is_empty() {
        credentials.cluster_ca_certificate = settings.cluster_ca_certificate.as_bytes().to_vec();
    }
    if !settings.client_certificate.is_empty() {
        credentials.client_certificate = settings.client_certificate.as_bytes().to_vec();
    }
    if !settings.client_key.is_empty() {
        credentials.client_key = settings.client_key.as_bytes().to_vec();
    }
    if !settings.token.is_empty() {
        credentials.bearer_token = settings.token.clone();
    }
}

/// The environment override is advisory: unparsable values keep the configured
/// count. Negative counts, configured or from the environment, clamp to zero.
fn resolve_retry_count(configured: i64, env: &dyn EnvSource) -> u64 {
    let mut count = configured;
    if let Some(raw) = env.var(ENV_APPLY_RETRY_COUNT) {
        match raw.trim().parse::<i64>() {
            Ok(v) => count = v,
            Err(_) => warn!(
                "Ignoring {}={:?}, not a valid integer",
                ENV_APPLY_RETRY_COUNT, raw
            ),
        }
    }
    u64::try_from(count).unwrap_or(0)
}
