//! Docker Engine implementation of [`ContainerDaemon`] via `bollard`.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, EventsOptionsBuilder, InspectContainerOptions,
    ListContainersOptionsBuilder,
};
use bollard::models::EventMessageTypeEnum;
use bollard::Docker;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::trace;

use whaletalk_core::{ContainerEvent, ContainerEventKind, ContainerId, ContainerMeta};

use crate::daemon::{AttachStreams, ContainerDaemon, DaemonError, EventStream};

/// Capacity of the in-process pipes the attach demultiplexer writes into.
/// A slow consumer backpressures the pump rather than growing memory.
const ATTACH_PIPE_CAPACITY: usize = 8 * 1024;

/// `ContainerDaemon` backed by a local Docker Engine.
#[derive(Clone)]
pub struct DockerDaemon {
    client: Docker,
}

impl DockerDaemon {
    /// Connects using the standard Docker environment (DOCKER_HOST or the
    /// default local socket).
    pub fn connect() -> Result<Self, DaemonError> {
        let client = Docker::connect_with_local_defaults()?;
        Ok(Self { client })
    }

    /// Wraps an existing client, mainly for tests against a fixture
    /// endpoint.
    pub fn from_client(client: Docker) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContainerDaemon for DockerDaemon {
    async fn running_containers(&self) -> Result<Vec<ContainerId>, DaemonError> {
        let options = ListContainersOptionsBuilder::default().all(false).build();
        let summaries = self.client.list_containers(Some(options)).await?;

        Ok(summaries
            .into_iter()
            .filter_map(|summary| summary.id)
            .map(ContainerId::new)
            .collect())
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerMeta, DaemonError> {
        let response = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await?;

        let raw_name = response.name.ok_or(DaemonError::IncompleteInspect {
            id: id.to_string(),
            field: "name",
        })?;
        let interactive = response
            .config
            .and_then(|config| config.open_stdin)
            .unwrap_or(false);

        Ok(ContainerMeta::from_inspect(id.clone(), &raw_name, interactive))
    }

    async fn subscribe_events(&self) -> Result<EventStream, DaemonError> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        let options = EventsOptionsBuilder::default().filters(&filters).build();

        let stream = self.client.events(Some(options)).filter_map(|message| async {
            match message {
                Ok(message) => {
                    // The filter is applied daemon-side, but be defensive
                    // about the type and require a non-empty ID, matching
                    // what the event consumers assume.
                    if message.typ != Some(EventMessageTypeEnum::CONTAINER) {
                        return None;
                    }
                    let id = match message.actor.and_then(|actor| actor.id) {
                        Some(id) if !id.is_empty() => ContainerId::new(id),
                        _ => return None,
                    };
                    let kind = message
                        .action
                        .as_deref()
                        .and_then(ContainerEventKind::from_status)?;
                    Some(Ok(ContainerEvent::new(kind, id)))
                }
                Err(err) => Some(Err(DaemonError::from(err))),
            }
        });

        Ok(Box::pin(stream))
    }

    async fn attach(&self, id: &ContainerId) -> Result<AttachStreams, DaemonError> {
        let options = AttachContainerOptionsBuilder::default()
            .stdin(true)
            .stdout(true)
            .stderr(true)
            .stream(true)
            .build();

        let results = self
            .client
            .attach_container(id.as_str(), Some(options))
            .await?;

        // The engine multiplexes stdout and stderr into one frame stream;
        // the keepalive future demultiplexes it back into two byte pipes
        // so each side can be line-buffered independently.
        let (stdout_read, mut stdout_write) = tokio::io::duplex(ATTACH_PIPE_CAPACITY);
        let (stderr_read, mut stderr_write) = tokio::io::duplex(ATTACH_PIPE_CAPACITY);
        let mut output = results.output;

        let keepalive = Box::pin(async move {
            while let Some(frame) = output.next().await {
                match frame {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        if stdout_write.write_all(&message).await.is_err() {
                            trace!("stdout consumer gone, ending attach pump");
                            break;
                        }
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        if stderr_write.write_all(&message).await.is_err() {
                            trace!("stderr consumer gone, ending attach pump");
                            break;
                        }
                    }
                    Ok(LogOutput::StdIn { .. }) => {}
                    Err(err) => return Err(DaemonError::from(err)),
                }
            }
            Ok(())
        });

        Ok(AttachStreams {
            stdin: results.input,
            stdout: Box::new(stdout_read),
            stderr: Box::new(stderr_read),
            keepalive,
        })
    }
}
