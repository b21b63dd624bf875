// src/services/vouchers/purchase_receipt.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{DocStatus, VoucherDoc, VoucherType},
    models::finance::GlEntryInput,
    models::stock::{ReceiveStock, VoucherRef},
    models::tenancy::Tenant,
    services::naming,
    services::vouchers::{
        ensure_name, expect_doc, refresh_purchase_order_status, VoucherContext, VoucherHandler,
    },
};

pub struct PurchaseReceiptHandler;

#[async_trait]
impl VoucherHandler for PurchaseReceiptHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::PurchaseReceipt
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, PurchaseReceipt);
        ensure_name(&mut doc.name, VoucherType::PurchaseReceipt);
        for item in &mut doc.items {
            item.amount = item.qty * item.rate;
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
        let doc = expect_doc!(doc, PurchaseReceipt);

        let mut gl = Vec::new();
        let mut total = Decimal::ZERO;
        let mut touched_orders: Vec<String> = Vec::new();

        for item in &doc.items {
            let master = ctx
                .masters
                .find_item_by_code(&mut *conn, tenant.id, &item.item_code)
                .await?
                .ok_or_else(|| AppError::UnknownItem(item.item_code.clone()))?;

            if master.is_stock_item {
                let input = ReceiveStock {
                    posting_key: naming::posting_key(
                        VoucherType::PurchaseReceipt, &doc.name, item.id,
                    ),
                    voucher: VoucherRef {
                        voucher_type: VoucherType::PurchaseReceipt,
                        voucher_no: doc.name.clone(),
                        posting_ts: Some(doc.posting_ts),
                    },
                    item_code: item.item_code.clone(),
                    warehouse_code: item.warehouse_code.clone(),
                    location_code: item.location_code.clone(),
                    batch_no: item.batch_no.clone(),
                    batch_expiry: item.batch_expiry,
                    uom_code: item.uom_code.clone(),
                    conversion_factor: item.conversion_factor,
                    qty: item.qty,
                    incoming_rate: item.rate,
                    serial_nos: item.serial_nos.clone(),
                };
                ctx.stock.receive_stock(conn, tenant, &input).await?;
            }

            // Dr conta de estoque do item (ou despesa, para não-estocável)
            let debit_account = if master.is_stock_item {
                master.stock_account.clone().unwrap_or_else(|| "Stock Asset".to_string())
            } else {
                master.expense_account.clone().unwrap_or_else(|| "Expenses".to_string())
            };
            gl.push(GlEntryInput::debit(debit_account, item.amount));
            total += item.amount;

            if let Some(po_name) = &item.against_purchase_order {
                ctx.docs
                    .bump_purchase_order_progress(
                        &mut *conn, tenant.id, po_name, &item.item_code, item.qty, Decimal::ZERO,
                    )
                    .await?;
                if !touched_orders.contains(po_name) {
                    touched_orders.push(po_name.clone());
                }
            }
        }

        gl.push(GlEntryInput::credit("Creditors", total));
        ctx.gl
            .post(
                conn, tenant, VoucherType::PurchaseReceipt, &doc.name,
                doc.posting_date, doc.posting_ts, &gl,
            )
            .await?;

        for po_name in &touched_orders {
            refresh_purchase_order_status(ctx, conn, tenant.id, po_name).await?;
        }

        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::PurchaseReceipt, &doc.name,
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
        ctx.cancel.cancel_purchase_receipt(conn, tenant, voucher_no).await?;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::PurchaseReceipt, voucher_no,
                DocStatus::Cancelled,
            )
            .await
    }
}
