// src/db/audit_repo.rs

use serde_json::Value;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::common::error::AppError;

// Registro append-only de toda operação que afeta os livros: tag da
// operação, referência do documento e metadados livres.
#[derive(Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        action: &str,
        doc_type: &str,
        doc_name: &str,
        meta: Option<Value>,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO audit_log (tenant_id, action, doc_type, doc_name, meta)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant_id)
        .bind(action)
        .bind(doc_type)
        .bind(doc_name)
        .bind(meta)
        .execute(executor)
        .await?;
        Ok(())
    }
}
