// src/services/vouchers/delivery_note.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{DocStatus, VoucherDoc, VoucherType},
    models::finance::GlEntryInput,
    models::stock::{IssueStock, VoucherRef},
    models::tenancy::Tenant,
    services::naming,
    services::vouchers::{
        ensure_name, expect_doc, refresh_sales_order_status, VoucherContext, VoucherHandler,
    },
};

pub struct DeliveryNoteHandler;

#[async_trait]
impl VoucherHandler for DeliveryNoteHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::DeliveryNote
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, DeliveryNote);
        ensure_name(&mut doc.name, VoucherType::DeliveryNote);
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
        let doc = expect_doc!(doc, DeliveryNote);

        let mut gl = Vec::new();
        let mut touched_orders: Vec<String> = Vec::new();

        for item in &mut doc.items {
            let master = ctx
                .masters
                .find_item_by_code(&mut *conn, tenant.id, &item.item_code)
                .await?
                .ok_or_else(|| AppError::UnknownItem(item.item_code.clone()))?;

            if master.is_stock_item {
                let input = IssueStock {
                    posting_key: naming::posting_key(VoucherType::DeliveryNote, &doc.name, item.id),
                    voucher: VoucherRef {
                        voucher_type: VoucherType::DeliveryNote,
                        voucher_no: doc.name.clone(),
                        posting_ts: Some(doc.posting_ts),
                    },
                    item_code: item.item_code.clone(),
                    warehouse_code: item.warehouse_code.clone(),
                    location_code: item.location_code.clone(),
                    batch_no: item.batch_no.clone(),
                    uom_code: item.uom_code.clone(),
                    conversion_factor: item.conversion_factor,
                    qty: item.qty,
                    strategy: None,
                    // Entrega contra pedido consome a reserva daquele pedido
                    consume_reservation: item.against_sales_order.is_some(),
                    serial_nos: item.serial_nos.clone(),
                };
                let result = ctx.stock.issue_stock(conn, tenant, &input).await?;

                // O custo ponderado da baixa é carimbado na linha; é ele que
                // vira o lançamento de CPV, não o preço de venda.
                if !result.is_noop() {
                    item.valuation_amount = Some(result.total_cost);
                    ctx.docs
                        .stamp_delivery_valuation(&mut *conn, tenant.id, item.id, result.total_cost)
                        .await?;
                }
            }

            let valuation = item.valuation_amount.unwrap_or(item.amount);
            let cogs_account = master
                .cogs_account
                .clone()
                .unwrap_or_else(|| "Cost of Goods Sold".to_string());
            let stock_account = master
                .stock_account
                .clone()
                .unwrap_or_else(|| "Stock Asset".to_string());
            gl.push(GlEntryInput::debit(cogs_account, valuation));
            gl.push(GlEntryInput::credit(stock_account, valuation));

            if let Some(so_name) = &item.against_sales_order {
                ctx.docs
                    .bump_sales_order_progress(
                        &mut *conn, tenant.id, so_name, &item.item_code, item.qty, Decimal::ZERO,
                    )
                    .await?;
                if !touched_orders.contains(so_name) {
                    touched_orders.push(so_name.clone());
                }
            }
        }

        ctx.gl
            .post(
                conn, tenant, VoucherType::DeliveryNote, &doc.name,
                doc.posting_date, doc.posting_ts, &gl,
            )
            .await?;

        for so_name in &touched_orders {
            refresh_sales_order_status(ctx, conn, tenant.id, so_name).await?;
        }

        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::DeliveryNote, &doc.name, DocStatus::Submitted,
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
        ctx.cancel.cancel_delivery_note(conn, tenant, voucher_no).await?;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::DeliveryNote, voucher_no, DocStatus::Cancelled,
            )
            .await
    }
}
