// src/services/vouchers/quotation.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{DocStatus, VoucherDoc, VoucherType},
    models::tenancy::Tenant,
    services::vouchers::{apply_taxes, ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

/// Cotação: totais e impostos como qualquer documento comercial, mas nenhum
/// livro é movimentado.
pub struct QuotationHandler;

#[async_trait]
impl VoucherHandler for QuotationHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::Quotation
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, Quotation);
        ensure_name(&mut doc.name, VoucherType::Quotation);

        let mut net = Decimal::ZERO;
        for item in &mut doc.items {
            item.amount = item.qty * item.rate;
            net += item.amount;
        }
        doc.net_total = net;
        let (total_taxes, grand_total) = apply_taxes(net, &mut doc.taxes);
        doc.total_taxes = total_taxes;
        doc.grand_total = grand_total;
        Ok(())
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, Quotation);
        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::Quotation, &doc.name, DocStatus::Submitted,
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
                &mut *conn, tenant.id, VoucherType::Quotation, voucher_no, DocStatus::Cancelled,
            )
            .await
    }
}
