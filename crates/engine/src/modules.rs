//! Cross-module request lookup used by the master console.
//!
//! Each request module plugs in behind [`RequestModule`]; callers resolve it by
//! its public name through [`ModuleRegistry`] instead of branching on strings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use despesas_core::domain::requisition::{RequisitionId, RequisitionStatus};
use despesas_core::errors::{ApplicationError, NotFoundError};
use despesas_core::notification::EXPENSE_MODULE;
use despesas_db::repositories::{RequisitionFilter, RequisitionReadRepository, RequisitionView};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ModuleKind {
    #[serde(rename = "despesas")]
    Expense,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => EXPENSE_MODULE,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            EXPENSE_MODULE => Some(Self::Expense),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub module: ModuleKind,
    pub id: i64,
    pub description: String,
    pub status: RequisitionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "module", content = "request")]
pub enum RequestDetail {
    #[serde(rename = "despesas")]
    Expense(Box<RequisitionView>),
}

#[async_trait]
pub trait RequestModule: Send + Sync {
    fn kind(&self) -> ModuleKind;

    async fn list_all(
        &self,
        filter: &RequisitionFilter,
    ) -> Result<Vec<RequestSummary>, ApplicationError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<RequestDetail>, ApplicationError>;
}

#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<ModuleKind, Arc<dyn RequestModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn RequestModule>) {
        self.modules.insert(module.kind(), module);
    }

    pub fn kinds(&self) -> Vec<ModuleKind> {
        let mut kinds = self.modules.keys().copied().collect::<Vec<_>>();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn RequestModule>, NotFoundError> {
        ModuleKind::parse(name)
            .and_then(|kind| self.modules.get(&kind).cloned())
            .ok_or_else(|| NotFoundError::Module(name.to_string()))
    }
}

/// Expense requisitions, served from the read-side repository.
pub struct ExpenseModule {
    reads: Arc<dyn RequisitionReadRepository>,
}

impl ExpenseModule {
    pub fn new(reads: Arc<dyn RequisitionReadRepository>) -> Self {
        Self { reads }
    }
}

#[async_trait]
impl RequestModule for ExpenseModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Expense
    }

    async fn list_all(
        &self,
        filter: &RequisitionFilter,
    ) -> Result<Vec<RequestSummary>, ApplicationError> {
        let requisitions = self.reads.list(filter).await?;
        Ok(requisitions
            .into_iter()
            .map(|requisition| RequestSummary {
                module: ModuleKind::Expense,
                id: requisition.id.0,
                description: requisition.description,
                status: requisition.status,
                created_at: requisition.created_at,
            })
            .collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<RequestDetail>, ApplicationError> {
        let view = self.reads.view(RequisitionId(id)).await?;
        Ok(view.map(|view| RequestDetail::Expense(Box::new(view))))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use despesas_core::domain::actor::UserId;
    use despesas_core::domain::requisition::{Requisition, RequisitionId, RequisitionStatus};
    use despesas_core::errors::NotFoundError;
    use despesas_db::repositories::{
        RepositoryError, RequisitionFilter, RequisitionReadRepository, RequisitionView,
    };

    use super::{ExpenseModule, ModuleKind, ModuleRegistry};

    struct FixedReads(Vec<Requisition>);

    #[async_trait]
    impl RequisitionReadRepository for FixedReads {
        async fn list(
            &self,
            filter: &RequisitionFilter,
        ) -> Result<Vec<Requisition>, RepositoryError> {
            Ok(self
                .0
                .iter()
                .filter(|requisition| filter.status.map_or(true, |status| requisition.status == status))
                .cloned()
                .collect())
        }

        async fn view(&self, _: RequisitionId) -> Result<Option<RequisitionView>, RepositoryError> {
            Ok(None)
        }
    }

    fn requisition(id: i64, status: RequisitionStatus) -> Requisition {
        Requisition {
            id: RequisitionId(id),
            description: format!("Compra {id}"),
            requester_id: UserId(1),
            director_id: UserId(4),
            status,
            rateada: false,
            approved_quote_id: None,
            approved_by_director_id: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn registry() -> ModuleRegistry {
        let reads = FixedReads(vec![
            requisition(1, RequisitionStatus::Pending),
            requisition(2, RequisitionStatus::Rejected),
        ]);
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(ExpenseModule::new(Arc::new(reads))));
        registry
    }

    #[tokio::test]
    async fn expense_module_is_resolved_by_public_name() {
        let module = registry().resolve("despesas").expect("expense module");
        assert_eq!(module.kind(), ModuleKind::Expense);

        let pending = module
            .list_all(&RequisitionFilter { status: Some(RequisitionStatus::Pending) })
            .await
            .expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 1);
        assert!(module.get_by_id(99).await.expect("lookup").is_none());
    }

    #[test]
    fn unregistered_modules_are_not_found() {
        let error = registry().resolve("compras").err().expect("unknown module");
        assert_eq!(error, NotFoundError::Module("compras".to_string()));
    }
}
