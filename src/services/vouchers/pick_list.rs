// src/services/vouchers/pick_list.rs

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

/// Separação: move o estoque das posições de picking para a STAGING do mesmo
/// depósito, via transferência comum (mesmo par de pernas e linhagem de
/// camadas), sob o voucher Pick List.
pub struct PickListHandler;

#[async_trait]
impl VoucherHandler for PickListHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::PickList
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, PickList);
        ensure_name(&mut doc.name, VoucherType::PickList);
        Ok(())
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, PickList);

        for item in &doc.items {
            let warehouse = ctx
                .masters
                .find_warehouse_by_code(&mut *conn, tenant.id, &item.warehouse_code)
                .await?
                .ok_or_else(|| AppError::UnknownWarehouse(item.warehouse_code.clone()))?;
            let staging = ctx
                .masters
                .find_staging_location(&mut *conn, tenant.id, warehouse.id)
                .await?
                .ok_or_else(|| {
                    AppError::UnknownLocation("STAGING".to_string(), warehouse.code.clone())
                })?;

            let input = TransferStock {
                posting_key: naming::posting_key(VoucherType::PickList, &doc.name, item.id),
                voucher: VoucherRef {
                    voucher_type: VoucherType::PickList,
                    voucher_no: doc.name.clone(),
                    posting_ts: Some(doc.posting_ts),
                },
                item_code: item.item_code.clone(),
                source_warehouse: item.warehouse_code.clone(),
                target_warehouse: item.warehouse_code.clone(),
                source_location_code: item.from_location_code.clone(),
                target_location_code: Some(staging.code.clone()),
                batch_no: item.batch_no.clone(),
                uom_code: None,
                conversion_factor: None,
                qty: item.qty,
                serial_nos: item.serial_nos.clone(),
            };
            ctx.stock.transfer_stock(conn, tenant, &input).await?;
        }

        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::PickList, &doc.name, DocStatus::Submitted,
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
        // As camadas de destino foram criadas sob o próprio Pick List, então
        // o canceller de transferência resolve a linhagem normalmente.
        ctx.cancel
            .cancel_stock_transfer(conn, tenant, VoucherType::PickList, voucher_no)
            .await?;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::PickList, voucher_no, DocStatus::Cancelled,
            )
            .await
    }
}
