// src/services/vouchers/sales_order.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{OrderStatus, VoucherDoc, VoucherType},
    models::stock::{ReserveStock, VoucherRef},
    models::tenancy::Tenant,
    services::naming,
    services::vouchers::{apply_taxes, ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

pub struct SalesOrderHandler;

#[async_trait]
impl VoucherHandler for SalesOrderHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::SalesOrder
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, SalesOrder);
        ensure_name(&mut doc.name, VoucherType::SalesOrder);

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
        let doc = expect_doc!(doc, SalesOrder);

        // Reserva opcional das linhas com depósito definido
        if doc.reserve_stock {
            for item in &doc.items {
                let Some(warehouse_code) = &item.warehouse_code else {
                    continue;
                };
                let input = ReserveStock {
                    posting_key: naming::posting_key(VoucherType::SalesOrder, &doc.name, item.id),
                    voucher: VoucherRef {
                        voucher_type: VoucherType::SalesOrder,
                        voucher_no: doc.name.clone(),
                        posting_ts: Some(doc.posting_ts),
                    },
                    item_code: item.item_code.clone(),
                    warehouse_code: warehouse_code.clone(),
                    location_code: None,
                    batch_no: None,
                    qty: item.qty,
                };
                ctx.stock.reserve_stock(conn, tenant, &input).await?;
            }
        }

        doc.status = OrderStatus::ToDeliver;
        ctx.docs
            .set_order_status(
                &mut *conn, tenant.id, VoucherType::SalesOrder, &doc.name, OrderStatus::ToDeliver,
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
        let Some(so) = ctx.docs.get_sales_order(conn, tenant.id, voucher_no).await? else {
            return Err(AppError::UnknownVoucher(voucher_no.to_string()));
        };

        // Solta o que sobrou de reserva; o que já foi consumido pela entrega
        // é no-op.
        if so.reserve_stock {
            for item in &so.items {
                let Some(warehouse_code) = &item.warehouse_code else {
                    continue;
                };
                let input = ReserveStock {
                    posting_key: format!(
                        "{}:{}",
                        naming::cancel_key(VoucherType::SalesOrder, voucher_no),
                        item.id
                    ),
                    voucher: VoucherRef {
                        voucher_type: VoucherType::SalesOrder,
                        voucher_no: voucher_no.to_string(),
                        posting_ts: None,
                    },
                    item_code: item.item_code.clone(),
                    warehouse_code: warehouse_code.clone(),
                    location_code: None,
                    batch_no: None,
                    qty: item.qty,
                };
                ctx.stock.release_reservation(conn, tenant, &input).await?;
            }
        }

        ctx.docs
            .set_order_status(
                &mut *conn, tenant.id, VoucherType::SalesOrder, voucher_no, OrderStatus::Cancelled,
            )
            .await
    }
}
