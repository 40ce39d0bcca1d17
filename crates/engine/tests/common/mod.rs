#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use despesas_core::domain::actor::{Role, UserId};
use despesas_core::domain::allocation::DepartmentId;
use despesas_core::domain::quote::{Quote, QuoteId};
use despesas_core::domain::requisition::{Requisition, RequisitionId};
use despesas_core::errors::ExternalDependencyError;
use despesas_core::intake::{DepartmentShare, NewRequisition, OfferedItem, SupplierOffer};
use despesas_core::notification::NotificationTemplate;
use despesas_core::token::{
    EntityKind, HmacTokenIssuer, VerificationToken, VerificationTokenIssuer,
};
use despesas_db::repositories::{approvals, directory, outbox, quotes, read, requisitions};
use despesas_db::{connect_with_settings, migrations, DbPool};
use despesas_engine::Engine;

pub const LINK_BASE: &str = "https://intranet.example.test";

pub struct OfflineIssuer;

#[async_trait]
impl VerificationTokenIssuer for OfflineIssuer {
    async fn issue_token(
        &self,
        _: EntityKind,
        _: RequisitionId,
    ) -> Result<VerificationToken, ExternalDependencyError> {
        Err(ExternalDependencyError::TokenIssuance("issuer offline".to_string()))
    }
}

/// A directory with one requester, one director, one master and one managed
/// department per manager.
pub struct World {
    pub pool: DbPool,
    pub engine: Engine,
    pub requester: UserId,
    pub director: UserId,
    pub master: UserId,
    pub managers: Vec<UserId>,
    pub departments: Vec<DepartmentId>,
}

pub async fn pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");
    pool
}

pub async fn world(manager_count: usize) -> World {
    world_with_issuer(manager_count, Arc::new(HmacTokenIssuer::new(
        "engine-test-signing-key".to_string().into(),
    )))
    .await
}

pub async fn world_with_issuer(
    manager_count: usize,
    issuer: Arc<dyn VerificationTokenIssuer>,
) -> World {
    let pool = pool().await;
    let mut conn = pool.acquire().await.expect("acquire");

    let requester = directory::insert_user(&mut conn, "Ana", None, &[Role::Requester])
        .await
        .expect("requester");
    let director = directory::insert_user(&mut conn, "Dora", Some("dora@example.test"), &[
        Role::Director,
    ])
    .await
    .expect("director");
    let master =
        directory::insert_user(&mut conn, "Paulo", None, &[Role::Master]).await.expect("master");

    let mut managers = Vec::new();
    let mut departments = Vec::new();
    for index in 0..manager_count {
        let name = format!("Gerente {index}");
        let manager = directory::insert_user(
            &mut conn,
            &name,
            Some(&format!("gerente{index}@example.test")),
            &[Role::Manager],
        )
        .await
        .expect("manager");
        let department =
            directory::insert_department(&mut conn, &format!("Departamento {index}"), Some(manager))
                .await
                .expect("department");
        managers.push(manager);
        departments.push(department);
    }
    drop(conn);

    let engine = Engine::new(pool.clone(), issuer, LINK_BASE);
    World { pool, engine, requester, director, master, managers, departments }
}

pub fn offer(name: &str, lines: &[(&str, i64, i64)]) -> SupplierOffer {
    SupplierOffer {
        name: name.to_string(),
        items: lines
            .iter()
            .map(|(description, quantity, unit_price)| OfferedItem {
                description: (*description).to_string(),
                quantity: Decimal::from(*quantity),
                unit_price: Decimal::from(*unit_price),
            })
            .collect(),
    }
}

impl World {
    /// Near-equal shares across every department; the last one takes the remainder.
    pub fn draft(&self, suppliers: Vec<SupplierOffer>) -> NewRequisition {
        let count = Decimal::from(self.departments.len() as i64);
        let share = (Decimal::ONE_HUNDRED / count).round_dp(2);
        let mut remaining = Decimal::ONE_HUNDRED;
        let mut shares = Vec::new();
        for (index, department) in self.departments.iter().enumerate() {
            let percent = if index + 1 == self.departments.len() { remaining } else { share };
            remaining -= percent;
            shares.push(DepartmentShare { department_id: *department, percent });
        }
        self.draft_with_shares(shares, suppliers)
    }

    pub fn draft_with_shares(
        &self,
        departments: Vec<DepartmentShare>,
        suppliers: Vec<SupplierOffer>,
    ) -> NewRequisition {
        NewRequisition {
            description: "Notebooks para a equipe".to_string(),
            requester_id: self.requester,
            director_id: self.director,
            departments,
            suppliers,
        }
    }

    /// Two suppliers: Alfa at 1000 and Beta at 1200.
    pub async fn standard_requisition(&self) -> (RequisitionId, QuoteId, QuoteId) {
        let id = self
            .engine
            .intake()
            .create(self.draft(vec![
                offer("Fornecedor Alfa", &[("Notebook", 1, 1000)]),
                offer("Fornecedor Beta", &[("Notebook", 2, 600)]),
            ]))
            .await
            .expect("create requisition");
        let alfa = self.quote_by_supplier(id, "Fornecedor Alfa").await;
        let beta = self.quote_by_supplier(id, "Fornecedor Beta").await;
        (id, alfa, beta)
    }

    pub async fn quote_by_supplier(&self, id: RequisitionId, supplier: &str) -> QuoteId {
        let mut conn = self.pool.acquire().await.expect("acquire");
        let view = read::load_view(&mut conn, id).await.expect("view").expect("requisition");
        view.quotes
            .iter()
            .find(|quote| quote.supplier_name == supplier)
            .map(|quote| quote.quote.id)
            .expect("quote for supplier")
    }

    pub async fn requisition(&self, id: RequisitionId) -> Requisition {
        let mut conn = self.pool.acquire().await.expect("acquire");
        requisitions::find_requisition(&mut conn, id).await.expect("find").expect("requisition")
    }

    pub async fn quote(&self, id: RequisitionId, quote: QuoteId) -> Quote {
        let mut conn = self.pool.acquire().await.expect("acquire");
        quotes::find_quote(&mut conn, id, quote).await.expect("find").expect("quote")
    }

    pub async fn approval_count(&self, id: RequisitionId) -> usize {
        let mut conn = self.pool.acquire().await.expect("acquire");
        approvals::list_manager_approvals(&mut conn, id).await.expect("approvals").len()
    }

    pub async fn spent_values(&self, id: RequisitionId) -> Vec<Option<Decimal>> {
        let mut conn = self.pool.acquire().await.expect("acquire");
        requisitions::list_allocations(&mut conn, id)
            .await
            .expect("allocations")
            .into_iter()
            .map(|allocation| allocation.spent_value)
            .collect()
    }

    pub async fn templates(&self, id: RequisitionId) -> Vec<NotificationTemplate> {
        let mut conn = self.pool.acquire().await.expect("acquire");
        outbox::list_for_requisition(&mut conn, id)
            .await
            .expect("outbox")
            .into_iter()
            .map(|message| message.notification.template)
            .collect()
    }

    /// Changes a department's manager in the live directory.
    pub async fn reassign_department(&self, department: DepartmentId, manager: Option<UserId>) {
        let mut conn = self.pool.acquire().await.expect("acquire");
        sqlx::query("UPDATE department SET manager_id = ? WHERE id = ?")
            .bind(manager.map(|user| user.0))
            .bind(department.0)
            .execute(&mut *conn)
            .await
            .expect("reassign department");
    }

    /// Every manager approves `quote` through the normal path.
    pub async fn reach_consensus(&self, id: RequisitionId, quote: QuoteId) {
        for manager in &self.managers {
            self.engine.managers().approve_quote(id, quote, *manager).await.expect("approve");
        }
    }
}
