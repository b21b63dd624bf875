// src/db/gl_repo.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::documents::VoucherType,
    models::finance::{Account, GlEntry, RootType},
};

#[derive(Clone)]
pub struct GlRepository {
    pool: PgPool,
}

impl GlRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  PLANO DE CONTAS
    // =========================================================================

    pub async fn find_account<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Account>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE tenant_id = $1 AND code = $2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(executor)
        .await?;
        Ok(account)
    }

    pub async fn create_account<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        code: &str,
        name: &str,
        root_type: RootType,
        account_type: Option<&str>,
    ) -> Result<Account, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (tenant_id, code, name, root_type, account_type)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, code) DO UPDATE SET name = accounts.name
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(code)
        .bind(name)
        .bind(root_type)
        .bind(account_type)
        .fetch_one(executor)
        .await?;
        Ok(account)
    }

    // =========================================================================
    //  LANÇAMENTOS
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_gl_entry<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        account_id: Uuid,
        debit_bc: Decimal,
        credit_bc: Decimal,
        currency: &str,
        voucher_type: VoucherType,
        voucher_no: &str,
        remarks: Option<&str>,
        posting_date: NaiveDate,
        posting_ts: DateTime<Utc>,
    ) -> Result<GlEntry, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, GlEntry>(
            r#"
            INSERT INTO gl_entries (
                tenant_id, account_id, debit_bc, credit_bc, currency,
                exchange_rate, voucher_type, voucher_no, remarks,
                posting_date, posting_ts
            )
            VALUES ($1, $2, $3, $4, $5, 1, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(account_id)
        .bind(debit_bc)
        .bind(credit_bc)
        .bind(currency)
        .bind(voucher_type)
        .bind(voucher_no)
        .bind(remarks)
        .bind(posting_date)
        .bind(posting_ts)
        .fetch_one(executor)
        .await?;
        Ok(entry)
    }

    pub async fn find_entries_by_voucher<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        voucher_type: VoucherType,
        voucher_no: &str,
    ) -> Result<Vec<GlEntry>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entries = sqlx::query_as::<_, GlEntry>(
            r#"
            SELECT * FROM gl_entries
            WHERE tenant_id = $1 AND voucher_type = $2 AND voucher_no = $3
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(voucher_type)
        .bind(voucher_no)
        .fetch_all(executor)
        .await?;
        Ok(entries)
    }
}
