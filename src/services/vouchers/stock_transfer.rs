// src/services/vouchers/stock_transfer.rs

use async_trait::async_trait;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{DocStatus, VoucherDoc, VoucherType},
    models::stock::{TransferStock, VoucherRef},
    models::tenancy::Tenant,
    services::naming,
    services::vouchers::{ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

// Transferência não gera GL: o valor do estoque só muda de lugar, a taxa é
// preservada perna a perna nas camadas de destino.
pub struct StockTransferHandler;

#[async_trait]
impl VoucherHandler for StockTransferHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::StockTransfer
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, StockTransfer);
        ensure_name(&mut doc.name, VoucherType::StockTransfer);
        Ok(())
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, StockTransfer);

        for item in &doc.items {
            let input = TransferStock {
                posting_key: naming::posting_key(VoucherType::StockTransfer, &doc.name, item.id),
                voucher: VoucherRef {
                    voucher_type: VoucherType::StockTransfer,
                    voucher_no: doc.name.clone(),
                    posting_ts: Some(doc.posting_ts),
                },
                item_code: item.item_code.clone(),
                source_warehouse: item.source_warehouse.clone(),
                target_warehouse: item.target_warehouse.clone(),
                source_location_code: item.source_location_code.clone(),
                target_location_code: item.target_location_code.clone(),
                batch_no: item.batch_no.clone(),
                uom_code: item.uom_code.clone(),
                conversion_factor: item.conversion_factor,
                qty: item.qty,
                serial_nos: item.serial_nos.clone(),
            };
            ctx.stock.transfer_stock(conn, tenant, &input).await?;
        }

        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::StockTransfer, &doc.name, DocStatus::Submitted,
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
        ctx.cancel
            .cancel_stock_transfer(conn, tenant, VoucherType::StockTransfer, voucher_no)
            .await?;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::StockTransfer, voucher_no, DocStatus::Cancelled,
            )
            .await
    }
}
