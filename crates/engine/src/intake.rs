use std::collections::BTreeSet;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use despesas_core::domain::actor::{Capability, Role};
use despesas_core::domain::requisition::RequisitionId;
use despesas_core::errors::{ApplicationError, NotFoundError, ValidationError};
use despesas_core::intake::{self, NewRequisition};
use despesas_core::notification::NotificationTemplate;
use despesas_db::repositories::{directory, quotes, requisitions};
use despesas_db::{begin, commit, DbPool};

use crate::notify::{self, NotificationLinks};
use crate::support::authorize;

/// Creates requisitions together with their allocations, quotes and required managers.
pub struct RequisitionIntakeService {
    pool: DbPool,
    links: NotificationLinks,
}

impl RequisitionIntakeService {
    pub fn new(pool: DbPool, links: NotificationLinks) -> Self {
        Self { pool, links }
    }

    pub async fn create(&self, draft: NewRequisition) -> Result<RequisitionId, ApplicationError> {
        let validated = intake::validate(draft)?;
        let draft = &validated.draft;
        let now = Utc::now();

        let mut tx = begin(&self.pool).await?;

        authorize(&mut tx, draft.requester_id, Capability::CreateRequisition).await?;
        let director = directory::load_actor(&mut tx, draft.director_id)
            .await?
            .ok_or(NotFoundError::User(draft.director_id))?;
        if !director.has_role(Role::Director) {
            return Err(ValidationError::NotADirector { user: draft.director_id }.into());
        }

        let mut managers = BTreeSet::new();
        let mut unmanaged = Vec::new();
        for share in &draft.departments {
            let department = directory::find_department(&mut tx, share.department_id)
                .await?
                .ok_or(NotFoundError::Department(share.department_id))?;
            match department.manager_id {
                Some(manager) => {
                    let actor = directory::load_actor(&mut tx, manager)
                        .await?
                        .ok_or(NotFoundError::User(manager))?;
                    if !actor.has_role(Role::Manager) {
                        return Err(ValidationError::ManagerWithoutRole {
                            department: department.id,
                            user: manager,
                        }
                        .into());
                    }
                    managers.insert(manager);
                }
                None => unmanaged.push(department.id),
            }
        }
        if !unmanaged.is_empty() {
            return Err(ValidationError::NoManagerAssigned { departments: unmanaged }.into());
        }

        let requisition_id = requisitions::insert_requisition(
            &mut tx,
            draft.description.trim(),
            draft.requester_id,
            draft.director_id,
            now,
        )
        .await?;

        for share in &draft.departments {
            requisitions::insert_allocation(&mut tx, requisition_id, share.department_id, share.percent)
                .await?;
        }

        for (offer, total) in draft.suppliers.iter().zip(&validated.quote_totals) {
            let supplier_id = quotes::find_or_create_supplier(&mut tx, &offer.name, now).await?;
            let quote_id =
                quotes::insert_quote(&mut tx, requisition_id, supplier_id, *total, now).await?;
            for item in &offer.items {
                let item_id = quotes::insert_item(
                    &mut tx,
                    requisition_id,
                    item.description.trim(),
                    item.quantity,
                    item.unit_price,
                )
                .await?;
                quotes::link_item(&mut tx, quote_id, item_id, item.unit_price).await?;
            }
        }

        let managers = managers.into_iter().collect::<Vec<_>>();
        for manager in &managers {
            requisitions::insert_required_manager(&mut tx, requisition_id, *manager).await?;
        }

        let data = json!({
            "requisition_id": requisition_id,
            "description": draft.description.trim(),
            "requester_id": draft.requester_id,
            "quotes": draft.suppliers.len(),
        });
        notify::enqueue(
            &mut tx,
            &self.links,
            requisition_id,
            NotificationTemplate::ManagerApprovalRequested,
            &managers,
            data.clone(),
            now,
        )
        .await?;
        notify::enqueue(
            &mut tx,
            &self.links,
            requisition_id,
            NotificationTemplate::RequisitionCreated,
            &[draft.director_id],
            data,
            now,
        )
        .await?;

        commit(tx).await?;

        info!(
            event_name = "engine.requisition.created",
            requisition_id = %requisition_id,
            requester_id = %draft.requester_id,
            director_id = %draft.director_id,
            required_managers = managers.len(),
            quotes = draft.suppliers.len(),
            "requisition created"
        );

        Ok(requisition_id)
    }
}
