//! Kubeconfig selection and the "file → base credential" step of resolution.
//!
//! Parsing is left to `kube::config::Kubeconfig`, so every field the file
//! declares survives into the selected entries.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use kube::config::{AuthInfo, Cluster, ExecConfig, Kubeconfig, KubeconfigError};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::credential_material::{CredentialMaterial, ExecPlugin, FileEntries};
use super::settings::Settings;
use crate::errors::{ProviderError, ProviderResult};

/// Context, cluster and user name overrides applied before materializing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOverrides {
    pub context: Option<String>,
    pub cluster: Option<String>,
    pub auth_info: Option<String>,
}

impl ContextOverrides {
    pub fn from_settings(settings: &Settings) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            context: non_empty(&settings.config_context),
            cluster: non_empty(&settings.config_context_cluster),
            auth_info: non_empty(&settings.config_context_auth_info),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_none() && self.cluster.is_none() && self.auth_info.is_none()
    }

    /// Suffix used in log lines and load errors, e.g. `"; overriden context; cluster: prod"`.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "; default context".to_string();
        }
        let mut suffix = "; overriden context".to_string();
        if let Some(ctx) = &self.context {
            suffix.push_str(&format!("; config ctx: {}", ctx));
        }
        if let Some(auth_info) = &self.auth_info {
            suffix.push_str(&format!("; auth_info: {}", auth_info));
        }
        if let Some(cluster) = &self.cluster {
            suffix.push_str(&format!("; cluster: {}", cluster));
        }
        suffix
    }
}

/// Cluster and user entries picked out of a file for one context.
#[derive(Debug, Clone)]
pub struct SelectedContext {
    pub context_name: Option<String>,
    pub cluster_name: String,
    pub entries: FileEntries,
}

/// Pick the cluster and user for the overridden (or current) context.
///
/// Stricter than kube's own loader: a named user that is missing, or a
/// cluster without a server, fails here instead of at connect time.
pub fn select(config: &Kubeconfig, overrides: &ContextOverrides) -> Result<SelectedContext, String> {
    let context_name = overrides
        .context
        .clone()
        .or_else(|| config.current_context.clone().filter(|c| !c.is_empty()));

    let context = match &context_name {
        Some(name) => config
            .contexts
            .iter()
            .find(|c| &c.name == name)
            .map(|c| c.context.clone().unwrap_or_default())
            .map(Some)
            .ok_or_else(|| format!("context was not found for specified context: {}", name))?,
        None => None,
    };

    let cluster_name = overrides
        .cluster
        .clone()
        .or_else(|| context.as_ref().map(|c| c.cluster.clone()).filter(|c| !c.is_empty()))
        .ok_or_else(|| "no context selected and no cluster override given".to_string())?;

    let cluster: Cluster = config
        .clusters
        .iter()
        .find(|c| c.name == cluster_name)
        .map(|c| c.cluster.clone().unwrap_or_default())
        .ok_or_else(|| format!("cluster \"{}\" was not found", cluster_name))?;

    if cluster.server.as_deref().unwrap_or_default().is_empty() {
        return Err(format!("no server found for cluster \"{}\"", cluster_name));
    }

    let user_name = overrides
        .auth_info
        .clone()
        .or_else(|| context.as_ref().and_then(|c| c.user.clone()))
        .filter(|u| !u.is_empty());

    let auth_info: AuthInfo = match user_name {
        Some(name) => config
            .auth_infos
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.auth_info.clone().unwrap_or_default())
            .ok_or_else(|| format!("user \"{}\" was not found", name))?,
        None => AuthInfo::default(),
    };

    Ok(SelectedContext {
        context_name,
        cluster_name,
        entries: FileEntries { cluster, auth_info },
    })
}

impl From<&ExecConfig> for ExecPlugin {
    fn from(exec: &ExecConfig) -> Self {
        Self {
            api_version: exec.api_version.clone().unwrap_or_default(),
            command: exec.command.clone().unwrap_or_default(),
            args: exec.args.clone().unwrap_or_default(),
            env: exec
                .env
                .iter()
                .flatten()
                .filter_map(|var| Some((var.get("name")?.clone(), var.get("value")?.clone())))
                .collect::<BTreeMap<_, _>>(),
        }
    }
}

impl SelectedContext {
    /// Flatten the selected entries into raw credential material.
    ///
    /// File references are already absolute, kube rewrites them relative to
    /// the kubeconfig's directory on read. A `tokenFile` stays a path so the
    /// client keeps re-reading it.
    pub fn materialize(self) -> Result<CredentialMaterial, String> {
        let FileEntries { cluster, auth_info } = &self.entries;

        let client_key_data = auth_info
            .client_key_data
            .as_ref()
            .map(|k| k.expose_secret().to_string());

        Ok(CredentialMaterial {
            host: cluster.server.clone().unwrap_or_default(),
            insecure: cluster.insecure_skip_tls_verify.unwrap_or(false),
            cluster_ca_certificate: data_or_file(
                "certificate-authority",
                cluster.certificate_authority_data.as_deref(),
                cluster.certificate_authority.as_deref(),
            )?,
            username: auth_info.username.clone().unwrap_or_default(),
            password: auth_info
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default(),
            bearer_token: auth_info
                .token
                .as_ref()
                .map(|t| t.expose_secret().trim().to_string())
                .unwrap_or_default(),
            client_certificate: data_or_file(
                "client-certificate",
                auth_info.client_certificate_data.as_deref(),
                auth_info.client_certificate.as_deref(),
            )?,
            client_key: data_or_file(
                "client-key",
                client_key_data.as_deref(),
                auth_info.client_key.as_deref(),
            )?,
            exec: auth_info.exec.as_ref().map(ExecPlugin::from),
            file: Some(self.entries),
        })
    }
}

/// Inline base64 `*-data` wins over the file reference, as in kubectl.
fn data_or_file(field: &str, data: Option<&str>, file: Option<&str>) -> Result<Vec<u8>, String> {
    if let Some(data) = data.filter(|d| !d.is_empty()) {
        return general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| format!("{}-data is not valid base64: {}", field, e));
    }
    if let Some(file) = file.filter(|f| !f.is_empty()) {
        return fs::read(file).map_err(|e| format!("failed to read {} {}: {}", field, file, e));
    }
    Ok(Vec::new())
}

/// Load the base credential from `settings.config_path`.
///
/// Returns `Ok(None)` when the file does not exist; any other failure is fatal.
pub fn load_base_credentials(settings: &Settings) -> ProviderResult<Option<CredentialMaterial>> {
    let path = PathBuf::from(shellexpand::tilde(&settings.config_path).into_owned());
    let overrides = ContextOverrides::from_settings(settings);
    let suffix = overrides.describe();

    if !overrides.is_empty() {
        debug!("Using overridden context: {:?}", overrides);
    }

    let load_error = |message: String| ProviderError::ConfigLoad {
        path: path.display().to_string(),
        context: suffix.clone(),
        message,
    };

    let config = match Kubeconfig::read_from(&path) {
        Ok(config) => config,
        Err(KubeconfigError::ReadConfig(e, _)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("Unable to load config file as it doesn't exist at {:?}", path);
            return Ok(None);
        }
        Err(e) => return Err(load_error(e.to_string())),
    };

    let selected = select(&config, &overrides).map_err(load_error)?;
    let context_name = selected.context_name.clone();
    let cluster_name = selected.cluster_name.clone();
    let material = selected.materialize().map_err(load_error)?;

    info!(
        "Successfully loaded config file ({}{}), context {:?}, cluster {}",
        path.display(),
        suffix,
        context_name,
        cluster_name
    );
    Ok(Some(material))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
  - name: dev-cluster
    cluster:
      server: https://dev.example:6443
      certificate-authority-data: Q0EtUEVN
  - name: prod-cluster
    cluster:
      server: https://prod.example:6443
      insecure-skip-tls-verify: true
users:
  - name: dev-user
    user:
      token: dev-token
  - name: prod-user
    user:
      username: admin
      password: secret
      client-certificate: certs/client.crt
      exec:
        apiVersion: client.authentication.k8s.io/v1beta1
        command: aws
        args: ["eks", "get-token"]
        env:
          - name: AWS_PROFILE
            value: prod
contexts:
  - name: dev
    context:
      cluster: dev-cluster
      user: dev-user
  - name: prod
    context:
      cluster: prod-cluster
      user: prod-user
      namespace: payments
"#;

    fn write_config(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("config");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path.display().to_string()
    }

    fn settings_for(path: String) -> Settings {
        Settings {
            config_path: path,
            ..Default::default()
        }
    }

    #[test]
    fn current_context_is_materialized() {
        let dir = TempDir::new().unwrap();
        let settings = settings_for(write_config(&dir, KUBECONFIG));

        let material = load_base_credentials(&settings).unwrap().unwrap();
        assert_eq!(material.host, "https://dev.example:6443");
        assert_eq!(material.bearer_token, "dev-token");
        assert_eq!(material.cluster_ca_certificate, b"CA-PEM".to_vec());
        assert!(!material.insecure);
    }

    #[test]
    fn context_override_selects_other_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("certs")).unwrap();
        std::fs::write(dir.path().join("certs/client.crt"), b"CLIENT-PEM").unwrap();

        let mut settings = settings_for(write_config(&dir, KUBECONFIG));
        settings.config_context = "prod".into();

        let material = load_base_credentials(&settings).unwrap().unwrap();
        assert_eq!(material.host, "https://prod.example:6443");
        assert!(material.insecure);
        assert_eq!(material.username, "admin");
        assert_eq!(material.client_certificate, b"CLIENT-PEM".to_vec());
        let exec = material.exec.unwrap();
        assert_eq!(exec.command, "aws");
        assert_eq!(exec.env.get("AWS_PROFILE").map(String::as_str), Some("prod"));
    }

    #[test]
    fn cluster_and_auth_info_overrides_mix_entries() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_for(write_config(&dir, KUBECONFIG));
        settings.config_context_cluster = "prod-cluster".into();
        settings.config_context_auth_info = "dev-user".into();

        let material = load_base_credentials(&settings).unwrap().unwrap();
        assert_eq!(material.host, "https://prod.example:6443");
        assert_eq!(material.bearer_token, "dev-token");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let settings = settings_for(dir.path().join("nope").display().to_string());
        assert!(load_base_credentials(&settings).unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let settings = settings_for(write_config(&dir, "clusters: [this is: not valid"));
        let err = load_base_credentials(&settings).unwrap_err();
        assert!(matches!(err, ProviderError::ConfigLoad { .. }));
        assert!(err.to_string().contains("; default context"));
    }

    #[test]
    fn unknown_context_is_fatal_and_names_the_override() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_for(write_config(&dir, KUBECONFIG));
        settings.config_context = "staging".into();

        let err = load_base_credentials(&settings).unwrap_err().to_string();
        assert!(err.contains("config ctx: staging"));
        assert!(err.contains("context was not found"));
    }

    const OIDC_KUBECONFIG: &str = r#"
current-context: sso
clusters:
  - name: corp
    cluster:
      server: https://corp.example:6443
      tls-server-name: api.corp.internal
      proxy-url: http://proxy.corp:3128
users:
  - name: alice
    user:
      as: deployer
      as-groups: ["ops"]
      auth-provider:
        name: oidc
        config:
          client-id: kubectl
          id-token: eyJhbGciOiJSUzI1NiJ9.payload.sig
  - name: robot
    user:
      tokenFile: tokens/robot
contexts:
  - name: sso
    context: { cluster: corp, user: alice }
  - name: robot
    context: { cluster: corp, user: robot }
"#;

    #[test]
    fn auth_provider_user_is_carried_through() {
        let dir = TempDir::new().unwrap();
        let settings = settings_for(write_config(&dir, OIDC_KUBECONFIG));

        let material = load_base_credentials(&settings).unwrap().unwrap();
        assert_eq!(material.credential_kinds(), vec!["auth-provider"]);
        assert_eq!(material.auth_provider(), Some("oidc"));

        let file = material.file.as_ref().unwrap();
        let provider = file.auth_info.auth_provider.as_ref().unwrap();
        assert_eq!(
            provider.config.get("id-token").map(String::as_str),
            Some("eyJhbGciOiJSUzI1NiJ9.payload.sig")
        );
        assert_eq!(file.auth_info.impersonate.as_deref(), Some("deployer"));
        assert_eq!(file.auth_info.impersonate_groups, Some(vec!["ops".to_string()]));
        assert_eq!(file.cluster.tls_server_name.as_deref(), Some("api.corp.internal"));
        assert_eq!(file.cluster.proxy_url.as_deref(), Some("http://proxy.corp:3128"));
    }

    #[test]
    fn token_file_stays_a_path_relative_to_the_config() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_for(write_config(&dir, OIDC_KUBECONFIG));
        settings.config_context = "robot".into();

        let material = load_base_credentials(&settings).unwrap().unwrap();
        assert!(material.bearer_token.is_empty());
        assert_eq!(material.credential_kinds(), vec!["token"]);
        let token_file = material.file.unwrap().auth_info.token_file.unwrap();
        assert_eq!(PathBuf::from(token_file), dir.path().join("tokens/robot"));
    }

    #[test]
    fn missing_user_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_for(write_config(&dir, KUBECONFIG));
        settings.config_context_auth_info = "ghost".into();

        let err = load_base_credentials(&settings).unwrap_err().to_string();
        assert!(err.contains("user \"ghost\" was not found"));
        assert!(err.contains("auth_info: ghost"));
    }

    #[test]
    fn describe_lists_every_override() {
        let overrides = ContextOverrides {
            context: Some("a".into()),
            cluster: Some("c".into()),
            auth_info: Some("u".into()),
        };
        assert_eq!(
            overrides.describe(),
            "; overriden context; config ctx: a; auth_info: u; cluster: c"
        );
        assert_eq!(ContextOverrides::default().describe(), "; default context");
    }
}
