//! Probe targets and the HTTP prober

use super::WatchdogConfig;
use crate::models::ProbeOutcome;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::time::Duration;

/// One pod to probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub pod_name: String,
    pub address: String,
    pub port: i32,
}

impl ProbeTarget {
    pub fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        format!("http://{}:{}{}", self.address, self.port, path)
    }
}

/// Turn listed pods into probe targets.
///
/// Pods without an IP are left out and counted as skipped. The port is the
/// first container port the pod declares, or `default_port`.
pub fn targets_from_pods(pods: &[Pod], default_port: i32) -> (Vec<ProbeTarget>, usize) {
    let mut targets = Vec::with_capacity(pods.len());
    let mut skipped = 0;

    for pod in pods {
        let address = pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.as_deref())
            .filter(|ip| !ip.is_empty());

        let Some(address) = address else {
            skipped += 1;
            continue;
        };

        let port = pod
            .spec
            .as_ref()
            .into_iter()
            .flat_map(|spec| spec.containers.iter())
            .flat_map(|c| c.ports.iter().flatten())
            .map(|p| p.container_port)
            .next()
            .unwrap_or(default_port);

        targets.push(ProbeTarget {
            pod_name: pod.metadata.name.clone().unwrap_or_default(),
            address: address.to_string(),
            port,
        });
    }

    (targets, skipped)
}

/// Performs a single health probe
#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome;
}

/// Probes `GET http://{ip}:{port}{path}`; any 2xx answer is a success
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    path: String,
}

impl HttpProber {
    pub fn new(timeout: Duration, path: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            path: path.into(),
        })
    }

    pub fn from_config(config: &WatchdogConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.probe_timeout(), config.health_path.clone())
    }
}

#[async_trait]
impl HealthProber for HttpProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        match self.client.get(target.url(&self.path)).send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Success,
            Ok(response) => ProbeOutcome::failure(format!("status {}", response.status().as_u16())),
            Err(err) if err.is_timeout() => ProbeOutcome::failure("timeout"),
            Err(err) => ProbeOutcome::failure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use tokio::net::TcpListener;

    fn pod(name: &str, ip: Option<&str>, port: Option<i32>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    ports: port.map(|p| {
                        vec![ContainerPort {
                            container_port: p,
                            ..ContainerPort::default()
                        }]
                    }),
                    ..Container::default()
                }],
                ..PodSpec::default()
            }),
            status: Some(PodStatus {
                pod_ip: ip.map(str::to_string),
                ..PodStatus::default()
            }),
        }
    }

    async fn serve(router: Router) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        port
    }

    fn local_target(port: u16) -> ProbeTarget {
        ProbeTarget {
            pod_name: "local".to_string(),
            address: "127.0.0.1".to_string(),
            port: i32::from(port),
        }
    }

    #[test]
    fn test_targets_from_pods() {
        let pods = vec![
            pod("with-port", Some("10.0.0.5"), Some(9000)),
            pod("no-port", Some("10.0.0.6"), None),
            pod("pending", None, Some(9000)),
        ];

        let (targets, skipped) = targets_from_pods(&pods, 8080);
        assert_eq!(skipped, 1);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].url("/healthz"), "http://10.0.0.5:9000/healthz");
        assert_eq!(targets[1].port, 8080);
    }

    #[test]
    fn test_url_adds_leading_slash() {
        let target = ProbeTarget {
            pod_name: "p".to_string(),
            address: "10.0.0.1".to_string(),
            port: 80,
        };
        assert_eq!(target.url("ready"), "http://10.0.0.1:80/ready");
    }

    #[tokio::test]
    async fn test_http_probe_success_and_failure() {
        let router = Router::new()
            .route("/healthz", get(|| async { "ok" }))
            .route("/broken", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let port = serve(router).await;

        let healthy = HttpProber::new(Duration::from_secs(2), "/healthz").unwrap();
        assert_eq!(healthy.probe(&local_target(port)).await, ProbeOutcome::Success);

        let broken = HttpProber::new(Duration::from_secs(2), "/broken").unwrap();
        assert_eq!(
            broken.probe(&local_target(port)).await,
            ProbeOutcome::failure("status 503")
        );
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = HttpProber::new(Duration::from_secs(2), "/healthz").unwrap();
        assert!(!prober.probe(&local_target(port)).await.is_success());
    }
}
