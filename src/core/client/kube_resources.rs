/// Re-export the Kubernetes resource types the snapshot kinds read from k8s-openapi

pub use k8s_openapi::api::core::v1::{
    LoadBalancerIngress,
    Pod,
    PodStatus,
    Service,
    ServicePort,
    ServiceSpec,
    ServiceStatus,
};

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub use k8s_openapi::apimachinery::pkg::version::Info as ServerVersionInfo;
