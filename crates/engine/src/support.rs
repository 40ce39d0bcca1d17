use sqlx::SqliteConnection;

use despesas_core::domain::actor::{Actor, Capability, UserId};
use despesas_core::domain::quote::{Quote, QuoteId};
use despesas_core::domain::requisition::{Requisition, RequisitionId};
use despesas_core::errors::{ApplicationError, NotFoundError, ValidationError};
use despesas_db::repositories::{directory, quotes, requisitions};

/// Resolves the caller and checks it holds `capability`.
pub(crate) async fn authorize(
    conn: &mut SqliteConnection,
    actor_id: UserId,
    capability: Capability,
) -> Result<Actor, ApplicationError> {
    let actor =
        directory::load_actor(conn, actor_id).await?.ok_or(NotFoundError::User(actor_id))?;

    if !actor.can(capability) {
        return Err(ValidationError::Forbidden { actor: actor_id, capability }.into());
    }

    Ok(actor)
}

pub(crate) async fn load_requisition(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Requisition, ApplicationError> {
    Ok(requisitions::find_requisition(conn, requisition_id)
        .await?
        .ok_or(NotFoundError::Requisition(requisition_id))?)
}

pub(crate) fn ensure_open(requisition: &Requisition) -> Result<(), ValidationError> {
    if requisition.is_terminal() {
        return Err(ValidationError::RequisitionTerminal {
            requisition: requisition.id,
            status: requisition.status,
        });
    }
    Ok(())
}

pub(crate) async fn load_quote(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    quote_id: QuoteId,
) -> Result<Quote, ApplicationError> {
    Ok(quotes::find_quote(conn, requisition_id, quote_id)
        .await?
        .ok_or(NotFoundError::Quote { requisition: requisition_id, quote: quote_id })?)
}
