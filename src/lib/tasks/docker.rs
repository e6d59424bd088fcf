use std::collections::HashMap;

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
        StartContainerOptions,
    },
    errors::Error as DockerError,
    image::CreateImageOptions,
    models::{HostConfig, RestartPolicy, RestartPolicyNameEnum},
};
use futures_util::stream::StreamExt;
use tracing::{debug, info, warn};

use super::executor::{ContainerInspection, Executor, ExecutorError, ExecutorResult};
use super::types::{PortBinding, PortMap, Task};

/// Runs tasks as Docker containers through the local daemon.
#[derive(Debug, Clone)]
pub struct DockerExecutor {
    client: Docker,
}

impl DockerExecutor {
    pub fn new() -> ExecutorResult<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| ExecutorError::Connect(e.to_string()))?;
        Ok(DockerExecutor { client })
    }

    async fn pull(&self, image: &str) -> ExecutorResult<()> {
        info!(%image, "pulling image");
        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(%image, %status, "pull progress");
                    }
                }
                Err(e) => {
                    return Err(ExecutorError::Pull {
                        image: image.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn container_config(task: &Task) -> Config<String> {
    let restart_policy = RestartPolicy {
        name: Some(task.restart_policy.parse().unwrap_or(RestartPolicyNameEnum::NO)),
        maximum_retry_count: None,
    };

    // Explicit bindings win; every other exposed port is published on a
    // random host port.
    let port_bindings: HashMap<String, Option<Vec<bollard::models::PortBinding>>> = task
        .port_bindings
        .iter()
        .map(|(container_port, host_port)| {
            let binding = bollard::models::PortBinding {
                host_ip: None,
                host_port: Some(host_port.clone()),
            };
            (container_port.clone(), Some(vec![binding]))
        })
        .collect();

    let host_config = HostConfig {
        restart_policy: Some(restart_policy),
        memory: (task.memory > 0).then_some(task.memory as i64),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        publish_all_ports: Some(true),
        ..Default::default()
    };

    Config {
        image: Some(task.image.clone()),
        exposed_ports: Some(
            task.exposed_ports
                .iter()
                .map(|port| (port.clone(), HashMap::new()))
                .collect(),
        ),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn convert_ports(ports: HashMap<String, Option<Vec<bollard::models::PortBinding>>>) -> PortMap {
    ports
        .into_iter()
        .map(|(port, bindings)| {
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|b| PortBinding {
                    host_ip: b.host_ip.unwrap_or_default(),
                    host_port: b.host_port.unwrap_or_default(),
                })
                .collect();
            (port, bindings)
        })
        .collect()
}

#[async_trait]
impl Executor for DockerExecutor {
    async fn start(&self, task: &Task) -> ExecutorResult<String> {
        self.pull(&task.image).await?;

        let options = Some(CreateContainerOptions {
            name: task.name.clone(),
            ..Default::default()
        });
        let created = self
            .client
            .create_container(options, container_config(task))
            .await
            .map_err(|e| ExecutorError::Create(e.to_string()))?;
        debug!(container_id = %created.id, task_id = %task.id, "container created");

        self.client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ExecutorError::Start(e.to_string()))?;

        info!(container_id = %created.id, task_id = %task.id, "container started");
        Ok(created.id)
    }

    async fn stop(&self, container_id: &str) -> ExecutorResult<()> {
        info!(%container_id, "stopping container");
        // Exited containers answer 304 here; they still need removing.
        if let Err(e) = self.client.stop_container(container_id, None).await {
            warn!(%container_id, error = %e, "stop failed, removing anyway");
        }

        let remove = Some(RemoveContainerOptions {
            v: true,
            force: true,
            ..Default::default()
        });
        match self.client.remove_container(container_id, remove).await {
            Ok(()) => Ok(()),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!(%container_id, "container already gone");
                Ok(())
            }
            Err(e) => Err(ExecutorError::Stop(e.to_string())),
        }
    }

    async fn inspect(&self, container_id: &str) -> ExecutorResult<Option<ContainerInspection>> {
        match self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(resp) => {
                let status = resp
                    .state
                    .and_then(|state| state.status)
                    .map(|status| status.to_string())
                    .unwrap_or_default();
                let host_ports = resp
                    .network_settings
                    .and_then(|settings| settings.ports)
                    .map(convert_ports)
                    .unwrap_or_default();
                Ok(Some(ContainerInspection { status, host_ports }))
            }
            Err(DockerError::DockerResponseServerError { status_code: 404, .. }) => Ok(None),
            Err(e) => Err(ExecutorError::Inspect(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_config_carries_task_requests() {
        let mut task = Task::new("echo", "strm/helloworld-http");
        task.memory = 64 * 1024 * 1024;
        task.exposed_ports = vec!["80/tcp".into()];
        task.restart_policy = "always".into();

        let config = container_config(&task);
        assert_eq!(config.image.as_deref(), Some("strm/helloworld-http"));
        assert!(config.exposed_ports.unwrap().contains_key("80/tcp"));

        let host = config.host_config.unwrap();
        assert_eq!(host.memory, Some(64 * 1024 * 1024));
        assert_eq!(host.publish_all_ports, Some(true));
        assert!(host.port_bindings.is_none());
        assert_eq!(
            host.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::ALWAYS)
        );
    }

    #[test]
    fn requested_port_bindings_reach_host_config() {
        let mut task = Task::new("echo", "strm/helloworld-http");
        task.exposed_ports = vec!["80/tcp".into(), "443/tcp".into()];
        task.port_bindings.insert("80/tcp".into(), "8080".into());

        let host = container_config(&task).host_config.unwrap();
        let bindings = host.port_bindings.unwrap();
        assert_eq!(bindings.len(), 1);
        let bound = bindings["80/tcp"].as_ref().unwrap();
        assert_eq!(bound[0].host_port.as_deref(), Some("8080"));
        assert_eq!(host.publish_all_ports, Some(true));
    }

    #[test]
    fn convert_ports_flattens_missing_bindings() {
        let mut ports = HashMap::new();
        ports.insert(
            "80/tcp".to_string(),
            Some(vec![bollard::models::PortBinding {
                host_ip: Some("0.0.0.0".into()),
                host_port: Some("32768".into()),
            }]),
        );
        ports.insert("443/tcp".to_string(), None);

        let converted = convert_ports(ports);
        assert_eq!(converted["80/tcp"][0].host_port, "32768");
        assert!(converted["443/tcp"].is_empty());
    }
}
