// src/services/vouchers/payment_entry.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{DocStatus, PaymentDirection, PaymentReference, VoucherDoc, VoucherType},
    models::finance::GlEntryInput,
    models::tenancy::Tenant,
    services::status,
    services::vouchers::{ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

pub struct PaymentEntryHandler;

/// Aplica o delta de alocação de uma referência e recalcula o status da
/// fatura apontada. `floor_at_zero` vale para o submit; o cancel devolve o
/// valor integral.
async fn apply_reference(
    ctx: &VoucherContext,
    conn: &mut PgConnection,
    tenant: &Tenant,
    reference: &PaymentReference,
    delta_sign: i64,
    floor_at_zero: bool,
) -> Result<(), AppError> {
    let delta = reference.allocated_amount * rust_decimal::Decimal::from(delta_sign);
    let (outstanding, grand_total, due_date) = ctx
        .docs
        .adjust_invoice_outstanding(
            &mut *conn,
            tenant.id,
            reference.ref_voucher_type,
            &reference.ref_voucher_no,
            delta,
            floor_at_zero,
        )
        .await?;

    let new_status =
        status::invoice_status(outstanding, grand_total, due_date, Utc::now().date_naive());
    ctx.docs
        .set_invoice_status(
            &mut *conn, tenant.id, reference.ref_voucher_type, &reference.ref_voucher_no,
            new_status,
        )
        .await
}

#[async_trait]
impl VoucherHandler for PaymentEntryHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::PaymentEntry
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, PaymentEntry);
        ensure_name(&mut doc.name, VoucherType::PaymentEntry);
        if doc.paid_amount <= rust_decimal::Decimal::ZERO {
            return Err(AppError::InvalidQuantity(doc.paid_amount));
        }
        Ok(())
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, PaymentEntry);

        // Receive: Dr paid_to / Cr paid_from (default Contas a Receber).
        // Pay:     Dr paid_to (default Contas a Pagar) / Cr paid_from.
        let (debit_account, credit_account) = match doc.direction {
            PaymentDirection::Receive => (
                doc.paid_to
                    .clone()
                    .ok_or_else(|| AppError::UnknownAccount("paid_to".to_string()))?,
                doc.paid_from
                    .clone()
                    .unwrap_or_else(|| "Accounts Receivable".to_string()),
            ),
            PaymentDirection::Pay => (
                doc.paid_to
                    .clone()
                    .unwrap_or_else(|| "Accounts Payable".to_string()),
                doc.paid_from
                    .clone()
                    .ok_or_else(|| AppError::UnknownAccount("paid_from".to_string()))?,
            ),
        };

        let gl = vec![
            GlEntryInput::debit(debit_account, doc.paid_amount),
            GlEntryInput::credit(credit_account, doc.paid_amount),
        ];
        ctx.gl
            .post(
                conn, tenant, VoucherType::PaymentEntry, &doc.name,
                doc.posting_date, doc.posting_ts, &gl,
            )
            .await?;

        // Abate o alocado das faturas referenciadas (piso em zero)
        for reference in &doc.references {
            apply_reference(ctx, conn, tenant, reference, -1, true).await?;
        }

        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::PaymentEntry, &doc.name, DocStatus::Submitted,
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
        let Some(doc) = ctx.docs.get_payment_entry(conn, tenant.id, voucher_no).await? else {
            return Err(AppError::UnknownVoucher(voucher_no.to_string()));
        };
        if doc.status == DocStatus::Cancelled {
            // Cancelar duas vezes é no-op
            return Ok(());
        }

        // Devolve o alocado integral às faturas
        for reference in &doc.references {
            apply_reference(ctx, conn, tenant, reference, 1, false).await?;
        }

        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::PaymentEntry, voucher_no, DocStatus::Cancelled,
            )
            .await
    }
}
