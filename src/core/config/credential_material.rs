use std::collections::BTreeMap;
use std::fmt;

use kube::config::{AuthInfo, Cluster};
use serde::Serialize;

/// Exec credential plugin: a command run at connection time that mints a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecPlugin {
    pub api_version: String,
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment for the plugin process, ordered by name.
    pub env: BTreeMap<String, String>,
}

/// The cluster and user entries exactly as the kubeconfig file declares them.
///
/// Kept so that fields with no flattened counterpart (auth providers,
/// impersonation, proxy and TLS server name, token files) reach the client.
#[derive(Clone, Default)]
pub struct FileEntries {
    pub cluster: Cluster,
    pub auth_info: AuthInfo,
}

impl PartialEq for FileEntries {
    fn eq(&self, other: &Self) -> bool {
        serde_json::to_value(&self.cluster).ok() == serde_json::to_value(&other.cluster).ok()
            && serde_json::to_value(&self.auth_info).ok() == serde_json::to_value(&other.auth_info).ok()
    }
}

impl Eq for FileEntries {}

impl fmt::Debug for FileEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntries")
            .field("server", &self.cluster.server)
            .field("proxy_url", &self.cluster.proxy_url)
            .field("tls_server_name", &self.cluster.tls_server_name)
            .field("token_file", &self.auth_info.token_file)
            .field(
                "auth_provider",
                &self.auth_info.auth_provider.as_ref().map(|p| p.name.as_str()),
            )
            .field("impersonate", &self.auth_info.impersonate)
            .finish()
    }
}

/// Raw connection material gathered from the kubeconfig file and explicit settings.
///
/// TLS fields hold PEM bytes, never file paths; paths are read while the
/// kubeconfig is materialized. Several credentials may be present at once,
/// the client applies its own precedence when connecting.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialMaterial {
    pub host: String,
    pub username: String,
    pub password: String,
    pub bearer_token: String,
    pub client_certificate: Vec<u8>,
    pub client_key: Vec<u8>,
    pub cluster_ca_certificate: Vec<u8>,
    pub insecure: bool,
    pub exec: Option<ExecPlugin>,
    /// Entries the flattened fields were read from; `None` without a kubeconfig.
    pub file: Option<FileEntries>,
}

impl CredentialMaterial {
    pub fn has_basic_auth(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }

    pub fn has_client_certificate(&self) -> bool {
        !self.client_certificate.is_empty()
    }

    fn file_auth_info(&self) -> Option<&AuthInfo> {
        self.file.as_ref().map(|f| &f.auth_info)
    }

    /// Name of the auth provider plugin the kubeconfig user declares, e.g. `oidc`.
    pub fn auth_provider(&self) -> Option<&str> {
        self.file_auth_info()
            .and_then(|a| a.auth_provider.as_ref())
            .map(|p| p.name.as_str())
    }

    /// Names of the credential kinds present, in the order the client tries them.
    pub fn credential_kinds(&self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        if self.has_client_certificate() {
            kinds.push("client-certificate");
        }
        let token_file = self.file_auth_info().is_some_and(|a| a.token_file.is_some());
        if !self.bearer_token.is_empty() || token_file {
            kinds.push("token");
        }
        if self.has_basic_auth() {
            kinds.push("basic-auth");
        }
        if self.auth_provider().is_some() {
            kinds.push("auth-provider");
        }
        if self.exec.is_some() {
            kinds.push("exec");
        }
        kinds
    }
}

fn redact(present: bool) -> &'static str {
    if present {
        "<redacted>"
    } else {
        "<empty>"
    }
}

impl fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialMaterial")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &redact(!self.password.is_empty()))
            .field("bearer_token", &redact(!self.bearer_token.is_empty()))
            .field("client_certificate_len", &self.client_certificate.len())
            .field("client_key", &redact(!self.client_key.is_empty()))
            .field("cluster_ca_certificate_len", &self.cluster_ca_certificate.len())
            .field("insecure", &self.insecure)
            .field("exec", &self.exec)
            .field("file", &self.file)
            .finish()
    }
}
