// src/services/vouchers/purchase_order.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{OrderStatus, VoucherDoc, VoucherType},
    models::tenancy::Tenant,
    services::vouchers::{apply_taxes, ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

/// Pedido de compra não movimenta estoque; só abre o ciclo
/// To Receive -> To Bill -> Completed alimentado por PR e PINV.
pub struct PurchaseOrderHandler;

#[async_trait]
impl VoucherHandler for PurchaseOrderHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::PurchaseOrder
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, PurchaseOrder);
        ensure_name(&mut doc.name, VoucherType::PurchaseOrder);

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
        let doc = expect_doc!(doc, PurchaseOrder);
        doc.status = OrderStatus::ToReceive;
        ctx.docs
            .set_order_status(
                &mut *conn, tenant.id, VoucherType::PurchaseOrder, &doc.name,
                OrderStatus::ToReceive,
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
            .set_order_status(
                &mut *conn, tenant.id, VoucherType::PurchaseOrder, voucher_no,
                OrderStatus::Cancelled,
            )
            .await
    }
}
