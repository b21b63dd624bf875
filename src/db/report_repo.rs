// src/db/report_repo.rs
//
// Consultas de leitura dos relatórios. Tudo aqui é agregação sobre os
// livros (gl_entries + faturas em aberto); nenhuma escrita.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::documents::VoucherType,
    models::finance::TrialBalanceRow,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerLine {
    pub posting_date: NaiveDate,
    pub voucher_type: VoucherType,
    pub voucher_no: String,
    pub debit_bc: Decimal,
    pub credit_bc: Decimal,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OpenInvoiceRow {
    pub party: String,
    pub name: String,
    pub due_date: Option<NaiveDate>,
    pub outstanding_amount: Decimal,
}

#[derive(Clone)]
pub struct ReportRepository {
    pool: PgPool,
}

impl ReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Somatório por conta no intervalo (datas opcionais).
    pub async fn trial_balance<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TrialBalanceRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, TrialBalanceRow>(
            r#"
            SELECT a.code AS account_code, a.name AS account_name, a.root_type,
                   COALESCE(SUM(g.debit_bc), 0) AS total_debit,
                   COALESCE(SUM(g.credit_bc), 0) AS total_credit
            FROM gl_entries g
            JOIN accounts a ON a.id = g.account_id
            WHERE g.tenant_id = $1
              AND ($2::date IS NULL OR g.posting_date >= $2)
              AND ($3::date IS NULL OR g.posting_date <= $3)
            GROUP BY a.code, a.name, a.root_type
            ORDER BY a.code ASC
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Linhas de uma conta, na ordem de lançamento, para o razão com saldo
    /// corrente.
    pub async fn ledger_lines<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        account_code: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<LedgerLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, LedgerLine>(
            r#"
            SELECT g.posting_date, g.voucher_type, g.voucher_no, g.debit_bc, g.credit_bc, g.remarks
            FROM gl_entries g
            JOIN accounts a ON a.id = g.account_id
            WHERE g.tenant_id = $1 AND a.code = $2
              AND ($3::date IS NULL OR g.posting_date >= $3)
              AND ($4::date IS NULL OR g.posting_date <= $4)
            ORDER BY g.posting_date ASC, g.created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(account_code)
        .bind(from)
        .bind(to)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Fluxo de caixa: só contas Bank/Cash.
    pub async fn cash_flow_lines<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<LedgerLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, LedgerLine>(
            r#"
            SELECT g.posting_date, g.voucher_type, g.voucher_no, g.debit_bc, g.credit_bc, g.remarks
            FROM gl_entries g
            JOIN accounts a ON a.id = g.account_id
            WHERE g.tenant_id = $1 AND a.account_type IN ('Bank', 'Cash')
              AND ($2::date IS NULL OR g.posting_date >= $2)
              AND ($3::date IS NULL OR g.posting_date <= $3)
            ORDER BY g.posting_date ASC, g.created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Faturas em aberto (a receber ou a pagar) para o aging.
    pub async fn open_invoices<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        voucher_type: VoucherType,
    ) -> Result<Vec<OpenInvoiceRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let query = match voucher_type {
            VoucherType::Invoice => {
                r#"
                SELECT customer AS party, name, due_date, outstanding_amount
                FROM invoices
                WHERE tenant_id = $1 AND outstanding_amount > 0
                  AND status NOT IN ('DRAFT', 'CANCELLED')
                ORDER BY due_date ASC NULLS LAST, name ASC
                "#
            }
            VoucherType::PurchaseInvoice => {
                r#"
                SELECT supplier AS party, name, due_date, outstanding_amount
                FROM purchase_invoices
                WHERE tenant_id = $1 AND outstanding_amount > 0
                  AND status NOT IN ('DRAFT', 'CANCELLED')
                ORDER BY due_date ASC NULLS LAST, name ASC
                "#
            }
            _ => return Err(AppError::UnknownVoucher("aging".to_string())),
        };

        let rows = sqlx::query_as::<_, OpenInvoiceRow>(query)
            .bind(tenant_id)
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }
}
