use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::errors::{config_error, ProviderResult};

pub const ENV_HOST: &str = "KUBE_HOST";
pub const ENV_USER: &str = "KUBE_USER";
pub const ENV_PASSWORD: &str = "KUBE_PASSWORD";
pub const ENV_INSECURE: &str = "KUBE_INSECURE";
pub const ENV_CLIENT_CERT_DATA: &str = "KUBE_CLIENT_CERT_DATA";
pub const ENV_CLIENT_KEY_DATA: &str = "KUBE_CLIENT_KEY_DATA";
pub const ENV_CLUSTER_CA_CERT_DATA: &str = "KUBE_CLUSTER_CA_CERT_DATA";
/// Checked in order, first one set wins.
pub const ENV_CONFIG_PATHS: [&str; 2] = ["KUBE_CONFIG", "KUBECONFIG"];
pub const ENV_CTX: &str = "KUBE_CTX";
pub const ENV_CTX_AUTH_INFO: &str = "KUBE_CTX_AUTH_INFO";
pub const ENV_CTX_CLUSTER: &str = "KUBE_CTX_CLUSTER";
pub const ENV_TOKEN: &str = "KUBE_TOKEN";
pub const ENV_LOAD_CONFIG_FILE: &str = "KUBE_LOAD_CONFIG_FILE";
pub const ENV_APPLY_RETRY_COUNT: &str = "KUBECTL_PROVIDER_APPLY_RETRY_COUNT";

pub const DEFAULT_CONFIG_PATH: &str = "~/.kube/config";
pub const DEFAULT_APPLY_RETRY_COUNT: i64 = 1;

/// Read-only view of the process environment.
pub trait EnvSource {
    /// Returns the value of `name`, treating an empty value as unset.
    fn var(&self, name: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.is_empty()).cloned()
    }
}

/// `exec` block of the settings bag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ExecSettings {
    #[validate(length(min = 1, message = "api_version is required"))]
    pub api_version: String,
    #[validate(length(min = 1, message = "command is required"))]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The bag as handed over by the host, every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    apply_retry_count: Option<i64>,
    host: Option<String>,
    username: Option<String>,
    password: Option<String>,
    insecure: Option<bool>,
    client_certificate: Option<String>,
    client_key: Option<String>,
    cluster_ca_certificate: Option<String>,
    config_path: Option<String>,
    config_context: Option<String>,
    config_context_auth_info: Option<String>,
    config_context_cluster: Option<String>,
    token: Option<String>,
    load_config_file: Option<bool>,
    exec: Option<Value>,
}

/// Provider settings after environment defaults are applied.
///
/// Empty strings and `false` mean "not set" when layered over the kubeconfig.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct Settings {
    #[validate(range(min = 0, message = "must not be negative"))]
    pub apply_retry_count: i64,
    pub host: String,
    pub username: String,
    pub password: String,
    pub insecure: bool,
    pub client_certificate: String,
    pub client_key: String,
    pub cluster_ca_certificate: String,
    pub config_path: String,
    pub config_context: String,
    pub config_context_auth_info: String,
    pub config_context_cluster: String,
    pub token: String,
    pub load_config_file: bool,
    pub exec: Option<ExecSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            apply_retry_count: DEFAULT_APPLY_RETRY_COUNT,
            host: String::new(),
            username: String::new(),
            password: String::new(),
            insecure: false,
            client_certificate: String::new(),
            client_key: String::new(),
            cluster_ca_certificate: String::new(),
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            config_context: String::new(),
            config_context_auth_info: String::new(),
            config_context_cluster: String::new(),
            token: String::new(),
            load_config_file: true,
            exec: None,
        }
    }
}

impl Settings {
    /// Build settings from a flat JSON bag.
    ///
    /// Precedence per key: bag value, then its environment variable, then the
    /// static default. A `null` bag value counts as unset.
    pub fn from_bag(bag: &Value, env: &dyn EnvSource) -> ProviderResult<Self> {
        let raw: RawSettings = match bag {
            Value::Null => RawSettings::default(),
            other => serde_json::from_value(other.clone()).map_err(|e| config_error("settings", e))?,
        };

        let defaults = Settings::default();
        let text = |value: Option<String>, var: &str| value.or_else(|| env.var(var)).unwrap_or_default();

        let insecure = match raw.insecure {
            Some(v) => v,
            None => env_bool(env, ENV_INSECURE)?.unwrap_or(defaults.insecure),
        };
        let load_config_file = match raw.load_config_file {
            Some(v) => v,
            None => env_bool(env, ENV_LOAD_CONFIG_FILE)?.unwrap_or(defaults.load_config_file),
        };
        let config_path = raw
            .config_path
            .or_else(|| ENV_CONFIG_PATHS.iter().find_map(|var| env.var(var)))
            .unwrap_or(defaults.config_path);

        let exec = match raw.exec {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_exec(value)?),
        };

        let settings = Settings {
            apply_retry_count: raw.apply_retry_count.unwrap_or(defaults.apply_retry_count),
            host: text(raw.host, ENV_HOST),
            username: text(raw.username, ENV_USER),
            password: text(raw.password, ENV_PASSWORD),
            insecure,
            client_certificate: text(raw.client_certificate, ENV_CLIENT_CERT_DATA),
            client_key: text(raw.client_key, ENV_CLIENT_KEY_DATA),
            cluster_ca_certificate: text(raw.cluster_ca_certificate, ENV_CLUSTER_CA_CERT_DATA),
            config_path,
            config_context: text(raw.config_context, ENV_CTX),
            config_context_auth_info: text(raw.config_context_auth_info, ENV_CTX_AUTH_INFO),
            config_context_cluster: text(raw.config_context_cluster, ENV_CTX_CLUSTER),
            token: text(raw.token, ENV_TOKEN),
            load_config_file,
            exec,
        };

        settings
            .validate()
            .map_err(|e| config_error("apply_retry_count", e))?;

        Ok(settings)
    }
}

/// Accepts a single `exec` object, or a one-element list of them.
fn parse_exec(value: Value) -> ProviderResult<ExecSettings> {
    let value = match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        Value::Array(items) => {
            return Err(config_error(
                "exec",
                format!("expected exactly one exec block, got {}", items.len()),
            ))
        }
        other => other,
    };

    let exec: ExecSettings = serde_json::from_value(value).map_err(|e| config_error("exec", e))?;
    exec.validate().map_err(|e| config_error("exec", e))?;
    Ok(exec)
}

/// Boolean environment values, with the same spellings Go's `strconv.ParseBool` takes.
fn env_bool(env: &dyn EnvSource, var: &str) -> ProviderResult<Option<bool>> {
    let Some(raw) = env.var(var) else {
        return Ok(None);
    };
    match raw.as_str() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(Some(true)),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(Some(false)),
        _ => Err(config_error(var, format!("invalid boolean value '{}'", raw))),
    }
}
