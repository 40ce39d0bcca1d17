use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqliteConnection;

use despesas_core::domain::actor::UserId;
use despesas_core::domain::allocation::DepartmentAllocation;
use despesas_core::domain::approval::{ManagerApproval, OverrideEvent};
use despesas_core::domain::quote::{Quote, QuoteItem};
use despesas_core::domain::requisition::{Requisition, RequisitionId, RequisitionStatus};

use super::{approvals, quotes, requisitions, tokens, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequisitionFilter {
    pub status: Option<RequisitionStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuoteView {
    #[serde(flatten)]
    pub quote: Quote,
    pub supplier_name: String,
    pub items: Vec<QuoteItem>,
}

/// Everything a reviewer needs to decide on one requisition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequisitionView {
    #[serde(flatten)]
    pub requisition: Requisition,
    pub allocations: Vec<DepartmentAllocation>,
    pub quotes: Vec<QuoteView>,
    pub manager_approvals: Vec<ManagerApproval>,
    pub required_managers: Vec<UserId>,
    pub pending_managers: Vec<UserId>,
    pub override_events: Vec<OverrideEvent>,
    pub has_verification_token: bool,
}

#[async_trait]
pub trait RequisitionReadRepository: Send + Sync {
    async fn list(&self, filter: &RequisitionFilter) -> Result<Vec<Requisition>, RepositoryError>;
    async fn view(&self, id: RequisitionId) -> Result<Option<RequisitionView>, RepositoryError>;
}

pub struct SqlRequisitionReadRepository {
    pool: DbPool,
}

impl SqlRequisitionReadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequisitionReadRepository for SqlRequisitionReadRepository {
    async fn list(&self, filter: &RequisitionFilter) -> Result<Vec<Requisition>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        requisitions::list_requisitions(&mut conn, filter.status).await
    }

    async fn view(&self, id: RequisitionId) -> Result<Option<RequisitionView>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_view(&mut conn, id).await
    }
}

pub async fn load_view(
    conn: &mut SqliteConnection,
    id: RequisitionId,
) -> Result<Option<RequisitionView>, RepositoryError> {
    let Some(requisition) = requisitions::find_requisition(conn, id).await? else {
        return Ok(None);
    };

    let allocations = requisitions::list_allocations(conn, id).await?;
    let mut quote_views = Vec::new();
    for quote in quotes::list_quotes(conn, id).await? {
        let supplier_name = quotes::find_supplier(conn, quote.supplier_id)
            .await?
            .map(|supplier| supplier.name)
            .unwrap_or_default();
        let items = quotes::list_quote_items(conn, quote.id).await?;
        quote_views.push(QuoteView { quote, supplier_name, items });
    }

    let manager_approvals = approvals::list_manager_approvals(conn, id).await?;
    let required_managers = requisitions::list_required_managers(conn, id).await?;
    let pending_managers = required_managers
        .iter()
        .copied()
        .filter(|manager| !manager_approvals.iter().any(|approval| approval.manager_id == *manager))
        .collect();
    let override_events = approvals::list_override_events(conn, id).await?;
    let has_verification_token = tokens::find_token(conn, id).await?.is_some();

    Ok(Some(RequisitionView {
        requisition,
        allocations,
        quotes: quote_views,
        manager_approvals,
        required_managers,
        pending_managers,
        override_events,
        has_verification_token,
    }))
}
