//! Operator commands acting on a single check: acknowledge and ad-hoc execution.

use generator::records::{Check, Entity, ObjectMeta, Silenced};
use sensu::backend::get_as;
use sensu::{Backend, Kind, SensuError};

/// Silences `check` on `entity` until the check resolves.
pub async fn ack(
    backend: &dyn Backend,
    namespace: &str,
    entity: &str,
    check: &str,
) -> Result<String, SensuError> {
    // Both must exist, otherwise the entry would silence nothing.
    get_as::<Entity>(backend, namespace, Kind::Entities, entity).await?;
    get_as::<Check>(backend, namespace, Kind::Checks, check).await?;

    let subscription = format!("entity:{entity}");
    let name = format!("{subscription}:{check}");
    let silenced = Silenced {
        metadata: ObjectMeta::new(&name, namespace),
        subscription: Some(subscription),
        check: Some(check.to_string()),
        expire_on_resolve: true,
    };

    backend
        .put(namespace, Kind::Silenced, &name, &serde_json::to_value(&silenced)?)
        .await?;
    tracing::info!("{namespace}: Check {check} on entity {entity} acknowledged");

    Ok(name)
}

/// Schedules an immediate run of `check` on all its subscribers.
pub async fn ad_hoc(backend: &dyn Backend, namespace: &str, check: &str) -> Result<(), SensuError> {
    get_as::<Check>(backend, namespace, Kind::Checks, check).await?;
    backend.execute(namespace, check).await?;
    tracing::info!("{namespace}: Check {check} scheduled for execution");
    Ok(())
}
