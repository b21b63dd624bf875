// src/services/vouchers/invoice.rs

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{InvoiceStatus, VoucherDoc, VoucherType},
    models::finance::GlEntryInput,
    models::tenancy::Tenant,
    services::status,
    services::vouchers::{
        apply_taxes, ensure_name, expect_doc, refresh_sales_order_status, VoucherContext,
        VoucherHandler,
    },
};

pub struct InvoiceHandler;

#[async_trait]
impl VoucherHandler for InvoiceHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::Invoice
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, Invoice);
        ensure_name(&mut doc.name, VoucherType::Invoice);

        let mut net = Decimal::ZERO;
        for item in &mut doc.items {
            item.amount = item.qty * item.rate;
            net += item.amount;
        }
        doc.net_total = net;
        let (total_taxes, grand_total) = apply_taxes(net, &mut doc.taxes);
        doc.total_taxes = total_taxes;
        doc.grand_total = grand_total;
        // O saldo em aberto nasce igual ao total
        doc.outstanding_amount = grand_total;
        Ok(())
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, Invoice);

        // Dr Contas a Receber pelo total; Cr receita por linha; Cr impostos
        let mut gl = vec![GlEntryInput::debit(doc.debit_to.clone(), doc.grand_total)];
        let mut touched_orders: Vec<String> = Vec::new();

        for item in &doc.items {
            let income_account = match &item.income_account {
                Some(account) => account.clone(),
                None => {
                    let master = ctx
                        .masters
                        .find_item_by_code(&mut *conn, tenant.id, &item.item_code)
                        .await?;
                    master
                        .and_then(|m| m.income_account)
                        .unwrap_or_else(|| "Sales".to_string())
                }
            };
            gl.push(GlEntryInput::credit(income_account, item.amount));

            if let Some(so_name) = &item.against_sales_order {
                ctx.docs
                    .bump_sales_order_progress(
                        &mut *conn, tenant.id, so_name, &item.item_code, Decimal::ZERO, item.qty,
                    )
                    .await?;
                if !touched_orders.contains(so_name) {
                    touched_orders.push(so_name.clone());
                }
            }
        }

        for tax in &doc.taxes {
            gl.push(GlEntryInput::credit(tax.account_head.clone(), tax.tax_amount));
        }

        ctx.gl
            .post(
                conn, tenant, VoucherType::Invoice, &doc.name,
                doc.posting_date, doc.posting_ts, &gl,
            )
            .await?;

        for so_name in &touched_orders {
            refresh_sales_order_status(ctx, conn, tenant.id, so_name).await?;
        }

        let new_status = status::invoice_status(
            doc.outstanding_amount,
            doc.grand_total,
            doc.due_date,
            Utc::now().date_naive(),
        );
        doc.status = new_status;
        ctx.docs
            .set_invoice_status(&mut *conn, tenant.id, VoucherType::Invoice, &doc.name, new_status)
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
            .set_invoice_status(
                &mut *conn, tenant.id, VoucherType::Invoice, voucher_no, InvoiceStatus::Cancelled,
            )
            .await
    }
}
