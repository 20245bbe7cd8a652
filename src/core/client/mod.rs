// Kube-rs based Kubernetes client
pub mod kube_client;
pub mod kube_resources;
pub mod rate_limiter;
pub mod session;

// Typed read calls
pub mod pods;
pub mod server_version;
pub mod services;
