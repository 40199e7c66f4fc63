//! Shows, and optionally runs, the exact command the agent would run for a check on an entity.

use generator::GeneratorError;
use generator::records::{Check, Entity};
use generator::template;
use sensu::backend::get_as;
use sensu::{Backend, Kind, SensuError};

#[derive(thiserror::Error, Debug)]
pub enum RunCheckError {
    #[error("{0}")]
    Sensu(#[from] SensuError),
    #[error("could not render check command: {0}")]
    Template(#[from] GeneratorError),
    #[error("could not run check command: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, PartialEq)]
pub struct Execution {
    pub output: String,
    pub status: Option<i32>,
}

/// The check command with the entity's labels substituted.
pub async fn render(
    backend: &dyn Backend,
    namespace: &str,
    entity: &str,
    check: &str,
) -> Result<String, RunCheckError> {
    let entity: Entity = get_as(backend, namespace, Kind::Entities, entity).await?;
    let check: Check = get_as(backend, namespace, Kind::Checks, check).await?;

    Ok(template::render(&check.command, &entity.metadata.labels)?)
}

/// Runs a rendered command through `bash -c`, collecting stdout and stderr.
pub async fn execute(command: &str) -> Result<Execution, RunCheckError> {
    let output = tokio::process::Command::new("bash")
        .arg("-c")
        .arg(command)
        .output()
        .await?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(Execution {
        output: text,
        status: output.status.code(),
    })
}
