// src/services/vouchers/bank_reconciliation.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{BankTxStatus, DocStatus, VoucherDoc, VoucherType},
    models::tenancy::Tenant,
    services::vouchers::{ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

/// Conciliação bancária: marca as transações casadas como RECONCILED e
/// sincroniza saldo e data da conta bancária.
pub struct BankReconciliationHandler;

#[async_trait]
impl VoucherHandler for BankReconciliationHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::BankReconciliation
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, BankReconciliation);
        ensure_name(&mut doc.name, VoucherType::BankReconciliation);
        Ok(())
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, BankReconciliation);

        let account = ctx
            .docs
            .get_bank_account(&mut *conn, tenant.id, &doc.bank_account_code)
            .await?
            .ok_or_else(|| AppError::UnknownVoucher(doc.bank_account_code.clone()))?;

        let mut balance_delta = Decimal::ZERO;
        for tx_no in &doc.transaction_nos {
            let tx = ctx
                .docs
                .get_bank_transaction(&mut *conn, tenant.id, tx_no)
                .await?
                .ok_or_else(|| AppError::UnknownVoucher(tx_no.clone()))?;

            // Transação já conciliada não conta duas vezes
            if tx.status == BankTxStatus::Reconciled {
                continue;
            }
            ctx.docs
                .mark_bank_transaction_reconciled(&mut *conn, tenant.id, tx_no)
                .await?;
            balance_delta += tx.amount;
        }

        ctx.docs
            .sync_bank_account(
                &mut *conn, tenant.id, &account.code, balance_delta, doc.posting_date,
            )
            .await?;
        tracing::info!(
            "Conciliação {}: saldo da conta {} ajustado em {}",
            doc.name, account.code, balance_delta
        );

        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::BankReconciliation, &doc.name,
                DocStatus::Submitted,
            )
            .await
    }

    async fn on_cancel(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        voucher_no: &str,
    ) -> Result<(), AppError> {
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::BankReconciliation, voucher_no,
                DocStatus::Cancelled,
            )
            .await
    }
}
