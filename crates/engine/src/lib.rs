//! Expense requisition workflow: intake, manager consensus, director sign-off,
//! rateio, rejection and master overrides over a shared SQLite store.
//!
//! Every public operation runs as one transaction. Notifications are written to
//! the outbox inside that transaction and delivered later by [`OutboxDispatcher`].

pub mod director;
pub mod intake;
pub mod manager;
pub mod master;
pub mod modules;
pub mod outbox;
pub mod rateio;
pub mod rejection;

mod notify;
mod support;

use std::sync::Arc;

use despesas_core::domain::actor::{Capability, UserId};
use despesas_core::domain::requisition::RequisitionId;
use despesas_core::errors::{ApplicationError, NotFoundError};
use despesas_core::token::VerificationTokenIssuer;
use despesas_db::repositories::{
    directory, read, RepositoryError, RequisitionFilter, RequisitionView, SqlRequisitionReadRepository,
};
use despesas_db::DbPool;

pub use director::{DirectorApprovalGate, DirectorApprovalOutcome};
pub use intake::RequisitionIntakeService;
pub use manager::{ManagerApprovalCoordinator, ManagerApprovalOutcome};
pub use master::{
    ForceConsensusOutcome, MasterOverrideController, MasterRejectionOutcome,
    SubstituteDirectorOutcome,
};
pub use modules::{
    ExpenseModule, ModuleKind, ModuleRegistry, RequestDetail, RequestModule, RequestSummary,
};
pub use notify::NotificationLinks;
pub use outbox::{DispatchSettings, DrainReport, OutboxDispatcher};
pub use rateio::{RateioCalculator, RateioOutcome};
pub use rejection::{RejectingRole, RejectionCascade, RejectionOutcome};

/// All workflow services wired against one pool.
pub struct Engine {
    pool: DbPool,
    intake: RequisitionIntakeService,
    managers: ManagerApprovalCoordinator,
    director: DirectorApprovalGate,
    rateio: RateioCalculator,
    rejections: RejectionCascade,
    master: MasterOverrideController,
    modules: ModuleRegistry,
}

impl Engine {
    pub fn new(
        pool: DbPool,
        issuer: Arc<dyn VerificationTokenIssuer>,
        link_base_url: impl Into<String>,
    ) -> Self {
        let links = NotificationLinks::new(link_base_url);

        let mut modules = ModuleRegistry::new();
        modules.register(Arc::new(ExpenseModule::new(Arc::new(
            SqlRequisitionReadRepository::new(pool.clone()),
        ))));

        Self {
            intake: RequisitionIntakeService::new(pool.clone(), links.clone()),
            managers: ManagerApprovalCoordinator::new(pool.clone(), links.clone()),
            director: DirectorApprovalGate::new(pool.clone(), issuer.clone(), links.clone()),
            rateio: RateioCalculator::new(pool.clone()),
            rejections: RejectionCascade::new(pool.clone(), links.clone()),
            master: MasterOverrideController::new(pool.clone(), issuer, links),
            modules,
            pool,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn intake(&self) -> &RequisitionIntakeService {
        &self.intake
    }

    pub fn managers(&self) -> &ManagerApprovalCoordinator {
        &self.managers
    }

    pub fn director(&self) -> &DirectorApprovalGate {
        &self.director
    }

    pub fn rateio(&self) -> &RateioCalculator {
        &self.rateio
    }

    pub fn rejections(&self) -> &RejectionCascade {
        &self.rejections
    }

    pub fn master(&self) -> &MasterOverrideController {
        &self.master
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Full state of one requisition, for any known user.
    pub async fn view(
        &self,
        requisition_id: RequisitionId,
        actor_id: UserId,
    ) -> Result<RequisitionView, ApplicationError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        if !directory::user_exists(&mut conn, actor_id).await? {
            return Err(NotFoundError::User(actor_id).into());
        }
        Ok(read::load_view(&mut conn, requisition_id)
            .await?
            .ok_or(NotFoundError::Requisition(requisition_id))?)
    }

    /// Master-only listing across request modules.
    pub async fn list_requests(
        &self,
        actor_id: UserId,
        module: &str,
        filter: &RequisitionFilter,
    ) -> Result<Vec<RequestSummary>, ApplicationError> {
        self.authorize_master(actor_id).await?;
        self.modules.resolve(module)?.list_all(filter).await
    }

    pub async fn request_detail(
        &self,
        actor_id: UserId,
        module: &str,
        id: i64,
    ) -> Result<RequestDetail, ApplicationError> {
        self.authorize_master(actor_id).await?;
        Ok(self
            .modules
            .resolve(module)?
            .get_by_id(id)
            .await?
            .ok_or(NotFoundError::Requisition(RequisitionId(id)))?)
    }

    async fn authorize_master(&self, actor_id: UserId) -> Result<(), ApplicationError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        support::authorize(&mut conn, actor_id, Capability::Override).await?;
        Ok(())
    }
}
