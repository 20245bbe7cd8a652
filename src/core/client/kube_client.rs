use std::collections::HashMap;

use base64::{engine::general_purpose, Engine as _};
use http::header::{HeaderValue, USER_AGENT};
use kube::config::{
    Context, ExecConfig, KubeConfigOptions, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use kube::{Client, Config};
use secrecy::SecretString;
use tracing::debug;

use crate::core::config::credential_material::FileEntries;
use crate::core::config::{ExecPlugin, ResolvedConnection};
use crate::errors::{ProviderError, ProviderResult};

const PROJECTED_NAME: &str = "kubectl-query";

/// Hosts given without a scheme are assumed to speak HTTPS.
fn normalize_host(host: &str) -> String {
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn encode(bytes: &[u8]) -> Option<String> {
    (!bytes.is_empty()).then(|| general_purpose::STANDARD.encode(bytes))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

impl From<&ExecPlugin> for ExecConfig {
    fn from(exec: &ExecPlugin) -> Self {
        let env = exec
            .env
            .iter()
            .map(|(name, value)| {
                HashMap::from([
                    ("name".to_string(), name.clone()),
                    ("value".to_string(), value.clone()),
                ])
            })
            .collect::<Vec<_>>();
        ExecConfig {
            api_version: non_empty(&exec.api_version),
            command: non_empty(&exec.command),
            args: (!exec.args.is_empty()).then(|| exec.args.clone()),
            env: (!env.is_empty()).then_some(env),
            drop_env: None,
            interactive_mode: None,
            provide_cluster_info: false,
            cluster: None,
        }
    }
}

/// Single-context kubeconfig carrying exactly the resolved material.
///
/// Starts from the entries the kubeconfig file declared and layers the
/// resolved fields over them. The kube crate then owns TLS parsing,
/// auth providers and exec-plugin invocation.
pub fn projected_kubeconfig(conn: &ResolvedConnection) -> Kubeconfig {
    let creds = &conn.credentials;
    let FileEntries {
        mut cluster,
        mut auth_info,
    } = creds.file.clone().unwrap_or_default();

    cluster.server = Some(normalize_host(&creds.host));
    if let Some(ca) = encode(&creds.cluster_ca_certificate) {
        cluster.certificate_authority_data = Some(ca);
        cluster.certificate_authority = None;
    }
    if creds.insecure {
        cluster.insecure_skip_tls_verify = Some(true);
    }

    if let Some(username) = non_empty(&creds.username) {
        auth_info.username = Some(username);
    }
    if let Some(password) = non_empty(&creds.password) {
        auth_info.password = Some(SecretString::from(password));
    }
    if let Some(token) = non_empty(&creds.bearer_token) {
        auth_info.token = Some(SecretString::from(token));
    }
    if let Some(cert) = encode(&creds.client_certificate) {
        auth_info.client_certificate_data = Some(cert);
        auth_info.client_certificate = None;
    }
    if let Some(key) = encode(&creds.client_key) {
        auth_info.client_key_data = Some(SecretString::from(key));
        auth_info.client_key = None;
    }
    // keep the file's exec entry (interactive mode, cluster info) unless replaced
    let file_exec = auth_info.exec.as_ref().map(ExecPlugin::from);
    if creds.exec != file_exec {
        auth_info.exec = creds.exec.as_ref().map(ExecConfig::from);
    }

    Kubeconfig {
        clusters: vec![NamedCluster {
            name: PROJECTED_NAME.to_string(),
            cluster: Some(cluster),
        }],
        auth_infos: vec![NamedAuthInfo {
            name: PROJECTED_NAME.to_string(),
            auth_info: Some(auth_info),
        }],
        contexts: vec![NamedContext {
            name: PROJECTED_NAME.to_string(),
            context: Some(Context {
                cluster: PROJECTED_NAME.to_string(),
                user: Some(PROJECTED_NAME.to_string()),
                ..Default::default()
            }),
        }],
        current_context: Some(PROJECTED_NAME.to_string()),
        api_version: Some("v1".to_string()),
        kind: Some("Config".to_string()),
        ..Default::default()
    }
}

/// Creates a Kubernetes client for a resolved connection.
///
/// No request is sent here; bad TLS material surfaces as a connect error.
pub async fn build_kube_client(conn: &ResolvedConnection) -> ProviderResult<Client> {
    if conn.host().is_empty() {
        return Err(ProviderError::Connect(
            "no cluster host configured (set host, KUBE_HOST or a kubeconfig context)".to_string(),
        ));
    }

    let kubeconfig = projected_kubeconfig(conn);
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| ProviderError::Connect(format!("failed to configure: {}", e)))?;

    let user_agent = HeaderValue::from_str(&conn.user_agent)
        .map_err(|e| ProviderError::Connect(format!("invalid user agent: {}", e)))?;
    config.headers.push((USER_AGENT, user_agent));

    let client = Client::try_from(config)
        .map_err(|e| ProviderError::Connect(format!("failed to configure: {}", e)))?;

    debug!("Kubernetes client initialized for {}", conn.host());
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CredentialMaterial, RateLimit};
    use kube::config::{AuthInfo, Cluster, ExecInteractiveMode};
    use secrecy::ExposeSecret;

    fn connection(credentials: CredentialMaterial) -> ResolvedConnection {
        ResolvedConnection {
            credentials,
            rate_limit: RateLimit::default(),
            user_agent: "kubectl-query-core/test Terraform/1.9.0".into(),
            apply_retry_count: 1,
        }
    }

    fn oidc_entries() -> FileEntries {
        FileEntries {
            cluster: serde_yaml::from_str(
                "server: https://corp.example:6443\ntls-server-name: api.corp.internal\nproxy-url: http://proxy.corp:3128",
            )
            .unwrap(),
            auth_info: serde_yaml::from_str(
                "as: deployer\nauth-provider: {name: oidc, config: {id-token: eyJ.payload.sig}}",
            )
            .unwrap(),
        }
    }

    fn projected_parts(projected: &Kubeconfig) -> (&Cluster, &AuthInfo) {
        (
            projected.clusters[0].cluster.as_ref().unwrap(),
            projected.auth_infos[0].auth_info.as_ref().unwrap(),
        )
    }

    #[test]
    fn projection_encodes_pem_bytes_and_exec() {
        let conn = connection(CredentialMaterial {
            host: "10.0.0.1:6443".into(),
            bearer_token: "abc".into(),
            cluster_ca_certificate: b"CA-PEM".to_vec(),
            exec: Some(ExecPlugin {
                api_version: "client.authentication.k8s.io/v1beta1".into(),
                command: "aws".into(),
                args: vec!["eks".into()],
                env: [("AWS_PROFILE".to_string(), "ops".to_string())].into(),
            }),
            ..Default::default()
        });

        let projected = projected_kubeconfig(&conn);
        let (cluster, user) = projected_parts(&projected);
        assert_eq!(cluster.server.as_deref(), Some("https://10.0.0.1:6443"));
        assert_eq!(cluster.certificate_authority_data.as_deref(), Some("Q0EtUEVN"));
        assert_eq!(cluster.insecure_skip_tls_verify, None);

        assert_eq!(user.token.as_ref().map(|t| t.expose_secret()), Some("abc"));
        assert!(user.client_certificate_data.is_none());
        assert!(user.username.is_none());
        let exec = user.exec.as_ref().unwrap();
        let env = &exec.env.as_ref().unwrap()[0];
        assert_eq!(env.get("name").map(String::as_str), Some("AWS_PROFILE"));
        assert_eq!(env.get("value").map(String::as_str), Some("ops"));
        assert_eq!(projected.current_context.as_deref(), Some(PROJECTED_NAME));
    }

    #[test]
    fn projection_is_valid_kubeconfig_yaml() {
        let conn = connection(CredentialMaterial {
            host: "https://10.0.0.1:6443".into(),
            username: "admin".into(),
            password: "pw".into(),
            insecure: true,
            ..Default::default()
        });
        let yaml = serde_yaml::to_string(&projected_kubeconfig(&conn)).unwrap();
        let parsed = Kubeconfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.current_context.as_deref(), Some(PROJECTED_NAME));
        assert_eq!(parsed.clusters.len(), 1);
        assert!(yaml.contains("insecure-skip-tls-verify: true"));
    }

    #[test]
    fn projection_keeps_file_only_fields() {
        let conn = connection(CredentialMaterial {
            host: "https://corp.example:6443".into(),
            file: Some(oidc_entries()),
            ..Default::default()
        });

        let projected = projected_kubeconfig(&conn);
        let (cluster, user) = projected_parts(&projected);
        assert_eq!(cluster.tls_server_name.as_deref(), Some("api.corp.internal"));
        assert_eq!(cluster.proxy_url.as_deref(), Some("http://proxy.corp:3128"));
        assert_eq!(user.impersonate.as_deref(), Some("deployer"));
        let provider = user.auth_provider.as_ref().unwrap();
        assert_eq!(provider.name, "oidc");
        assert_eq!(provider.config.get("id-token").map(String::as_str), Some("eyJ.payload.sig"));
    }

    #[test]
    fn explicit_fields_layer_over_file_entries() {
        let mut entries = oidc_entries();
        entries.cluster.certificate_authority = Some("/etc/kube/ca.crt".into());
        let conn = connection(CredentialMaterial {
            host: "https://override:443".into(),
            bearer_token: "explicit".into(),
            cluster_ca_certificate: b"CA-PEM".to_vec(),
            file: Some(entries),
            ..Default::default()
        });

        let projected = projected_kubeconfig(&conn);
        let (cluster, user) = projected_parts(&projected);
        assert_eq!(cluster.server.as_deref(), Some("https://override:443"));
        assert_eq!(cluster.certificate_authority, None);
        assert_eq!(cluster.certificate_authority_data.as_deref(), Some("Q0EtUEVN"));
        assert_eq!(user.token.as_ref().map(|t| t.expose_secret()), Some("explicit"));
        assert_eq!(user.auth_provider.as_ref().map(|p| p.name.as_str()), Some("oidc"));
    }

    #[test]
    fn file_exec_entry_survives_unless_replaced() {
        let auth_info: AuthInfo = serde_yaml::from_str(
            "exec: {apiVersion: client.authentication.k8s.io/v1, command: gke-auth, interactiveMode: Never}",
        )
        .unwrap();
        let file_exec = auth_info.exec.as_ref().map(ExecPlugin::from);
        let mut credentials = CredentialMaterial {
            host: "https://gke:443".into(),
            exec: file_exec,
            file: Some(FileEntries {
                auth_info,
                ..Default::default()
            }),
            ..Default::default()
        };

        let projected = projected_kubeconfig(&connection(credentials.clone()));
        let exec = projected_parts(&projected).1.exec.clone().unwrap();
        assert_eq!(exec.interactive_mode, Some(ExecInteractiveMode::Never));

        credentials.exec = Some(ExecPlugin {
            command: "other-auth".into(),
            ..Default::default()
        });
        let projected = projected_kubeconfig(&connection(credentials));
        let exec = projected_parts(&projected).1.exec.clone().unwrap();
        assert_eq!(exec.command.as_deref(), Some("other-auth"));
        assert_eq!(exec.interactive_mode, None);
    }

    #[tokio::test]
    async fn auth_provider_connection_builds_a_client() {
        let conn = connection(CredentialMaterial {
            host: "https://corp.example:6443".into(),
            file: Some(oidc_entries()),
            ..Default::default()
        });
        assert!(build_kube_client(&conn).await.is_ok());
    }

    #[tokio::test]
    async fn missing_host_is_a_connect_error() {
        match build_kube_client(&connection(CredentialMaterial::default())).await {
            Err(err) => assert_eq!(err.subsystem(), "connect"),
            Ok(_) => panic!("a client was built without a host"),
        }
    }
}
