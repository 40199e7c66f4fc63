//! Publisher sidecar: turns one Sensu event from stdin into a call of the metric forwarder.

use generator::records::Event;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const DEFAULT_FORWARDER: &str = "/usr/bin/ams-metric-to-queue";
pub const STDIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("no event received within {0:?}")]
    Timeout(Duration),
    #[error("could not read event: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode event: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("event has no {0}")]
    MissingField(&'static str),
    #[error("forwarder exited with {0}")]
    Forwarder(std::process::ExitStatus),
}

/// The fields the forwarder takes as positional arguments.
#[derive(Debug, PartialEq)]
pub struct Publication {
    pub hostname: String,
    pub service: String,
    pub metric: String,
    pub status: &'static str,
    pub summary: String,
    pub message: String,
}

impl Publication {
    pub fn from_event(event: &Event) -> Result<Self, PublishError> {
        let entity = &event.entity.metadata;
        let (name_service, name_host) = entity
            .name
            .split_once("__")
            .map(|(service, host)| (Some(service), Some(host)))
            .unwrap_or((None, None));

        let hostname = entity
            .labels
            .get("hostname")
            .map(String::as_str)
            .or(name_host)
            .ok_or(PublishError::MissingField("hostname"))?;
        let service = entity
            .labels
            .get("service")
            .map(String::as_str)
            .or(name_service)
            .ok_or(PublishError::MissingField("service"))?;

        let metric = event.check.metadata.name.as_str();
        if metric.is_empty() {
            return Err(PublishError::MissingField("check name"));
        }

        let output = event.check.output.trim();
        let (summary, message) = match output.split_once('\n') {
            Some((summary, message)) => (summary.trim(), message.trim()),
            None => (output, ""),
        };

        Ok(Publication {
            hostname: hostname.to_string(),
            service: service.to_string(),
            metric: metric.to_string(),
            status: match event.check.status {
                0 => "OK",
                1 => "WARNING",
                2 => "CRITICAL",
                _ => "UNKNOWN",
            },
            summary: summary.to_string(),
            message: message.to_string(),
        })
    }
}

/// Reads the whole event, giving up after `timeout`.
pub async fn read_event<R: AsyncRead + Unpin>(input: R, timeout: Duration) -> Result<Event, PublishError> {
    let mut raw = String::new();
    let mut input = input;
    tokio::time::timeout(timeout, input.read_to_string(&mut raw))
        .await
        .map_err(|_| PublishError::Timeout(timeout))??;

    Ok(serde_json::from_str(&raw)?)
}

pub async fn forward(forwarder: &Path, queue: &str, publication: &Publication) -> Result<(), PublishError> {
    let status = tokio::process::Command::new(forwarder)
        .args([
            queue,
            publication.hostname.as_str(),
            publication.service.as_str(),
            publication.metric.as_str(),
            publication.status,
            publication.summary.as_str(),
            publication.message.as_str(),
        ])
        .status()
        .await?;

    if !status.success() {
        return Err(PublishError::Forwarder(status));
    }

    tracing::debug!(
        "Published {} on {} ({}) to {queue}",
        publication.metric,
        publication.hostname,
        publication.status
    );
    Ok(())
}

pub async fn publish(forwarder: &Path, queue: &str) -> Result<(), PublishError> {
    let event = read_event(tokio::io::stdin(), STDIN_TIMEOUT).await?;
    let publication = Publication::from_event(&event)?;
    forward(forwarder, queue, &publication).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    const EVENT: &str = r#"{
        "check": {
            "metadata": {"name": "generic.http.connect", "namespace": "TENANT1"},
            "status": 2,
            "output": "CRITICAL - Socket timeout\nConnection to argo.ni4os.eu timed out\n",
            "occurrences": 3
        },
        "entity": {
            "entity_class": "proxy",
            "metadata": {
                "name": "argo.webui__argo.ni4os.eu",
                "namespace": "TENANT1",
                "labels": {"hostname": "argo.ni4os.eu", "service": "argo.webui"}
            }
        },
        "timestamp": 1679480000
    }"#;

    #[tokio::test]
    async fn test_publication() {
        let event = read_event(EVENT.as_bytes(), STDIN_TIMEOUT).await.unwrap();
        let publication = Publication::from_event(&event).unwrap();

        assert_eq!(
            publication,
            Publication {
                hostname: "argo.ni4os.eu".into(),
                service: "argo.webui".into(),
                metric: "generic.http.connect".into(),
                status: "CRITICAL",
                summary: "CRITICAL - Socket timeout".into(),
                message: "Connection to argo.ni4os.eu timed out".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_names_without_labels() {
        let mut event = read_event(EVENT.as_bytes(), STDIN_TIMEOUT).await.unwrap();
        event.entity.metadata.labels.clear();
        event.check.status = 0;
        event.check.output = "OK".into();

        let publication = Publication::from_event(&event).unwrap();
        assert_eq!(publication.hostname, "argo.ni4os.eu");
        assert_eq!(publication.service, "argo.webui");
        assert_eq!(publication.status, "OK");
        assert_eq!(publication.message, "");

        event.entity.metadata.name = "sensu-agent1".into();
        assert!(matches!(
            Publication::from_event(&event),
            Err(PublishError::MissingField("hostname"))
        ));
    }

    #[tokio::test]
    async fn test_malformed_event() {
        assert!(matches!(
            read_event(&b"{not json"[..], STDIN_TIMEOUT).await,
            Err(PublishError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (_writer, reader) = tokio::io::duplex(64);
        assert!(matches!(
            read_event(reader, Duration::from_millis(50)).await,
            Err(PublishError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_forward() {
        let dir = tempfile::tempdir().unwrap();
        let args_file = dir.path().join("args");
        let forwarder = dir.path().join("forwarder");
        {
            let mut script = std::fs::File::create(&forwarder).unwrap();
            writeln!(script, "#!/bin/sh").unwrap();
            writeln!(script, "printf '%s\\n' \"$@\" > {}", args_file.display()).unwrap();
        }
        std::fs::set_permissions(&forwarder, std::fs::Permissions::from_mode(0o755)).unwrap();

        let event = read_event(EVENT.as_bytes(), STDIN_TIMEOUT).await.unwrap();
        let publication = Publication::from_event(&event).unwrap();
        forward(&forwarder, "/var/spool/argo/metrics", &publication)
            .await
            .unwrap();

        let args = std::fs::read_to_string(&args_file).unwrap();
        assert_eq!(
            args.lines().collect::<Vec<_>>(),
            vec![
                "/var/spool/argo/metrics",
                "argo.ni4os.eu",
                "argo.webui",
                "generic.http.connect",
                "CRITICAL",
                "CRITICAL - Socket timeout",
                "Connection to argo.ni4os.eu timed out",
            ]
        );

        assert!(matches!(
            forward(Path::new("/bin/false"), "/tmp/q", &publication).await,
            Err(PublishError::Forwarder(_))
        ));
    }
}
