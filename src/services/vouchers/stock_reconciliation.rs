// src/services/vouchers/stock_reconciliation.rs

use async_trait::async_trait;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{DocStatus, VoucherDoc, VoucherType},
    models::stock::{ReconcileStock, VoucherRef},
    models::tenancy::Tenant,
    services::naming,
    services::vouchers::{ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

pub struct StockReconciliationHandler;

#[async_trait]
impl VoucherHandler for StockReconciliationHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::StockReconciliation
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, StockReconciliation);
        ensure_name(&mut doc.name, VoucherType::StockReconciliation);
        Ok(())
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, StockReconciliation);

        for item in &doc.items {
            let input = ReconcileStock {
                posting_key: naming::posting_key(
                    VoucherType::StockReconciliation, &doc.name, item.id,
                ),
                voucher: VoucherRef {
                    voucher_type: VoucherType::StockReconciliation,
                    voucher_no: doc.name.clone(),
                    posting_ts: Some(doc.posting_ts),
                },
                item_code: item.item_code.clone(),
                warehouse_code: item.warehouse_code.clone(),
                location_code: item.location_code.clone(),
                batch_no: item.batch_no.clone(),
                target_qty: item.target_qty,
                increase_rate: item.increase_rate,
            };
            let delta = ctx.stock.reconcile_stock(conn, tenant, &input).await?;
            tracing::info!(
                "Reconciliação {} / {}: delta {}",
                doc.name, item.item_code, delta
            );
        }

        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::StockReconciliation, &doc.name,
                DocStatus::Submitted,
            )
            .await
    }

    async fn on_cancel(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        voucher_no: &str,
    ) -> Result<(), AppError> {
        // Acerto de inventário não tem reversa: o caminho correto é uma nova
        // reconciliação com a quantidade-alvo anterior.
        Err(AppError::InvalidStatusTransition(voucher_no.to_string()))
    }
}
