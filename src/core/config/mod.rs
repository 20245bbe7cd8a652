pub mod credential_material;
pub mod kubeconfig_file;
pub mod resolver;
pub mod settings;

pub use credential_material::{CredentialMaterial, ExecPlugin};
pub use resolver::{resolve, CallerInfo, RateLimit, ResolvedConnection};
pub use settings::{EnvSource, ExecSettings, ProcessEnv, Settings};
