// src/services/vouchers/purchase_invoice.rs

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
        apply_taxes, ensure_name, expect_doc, refresh_purchase_order_status, VoucherContext,
        VoucherHandler,
    },
};

pub struct PurchaseInvoiceHandler;

#[async_trait]
impl VoucherHandler for PurchaseInvoiceHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::PurchaseInvoice
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, PurchaseInvoice);
        ensure_name(&mut doc.name, VoucherType::PurchaseInvoice);

        let mut net = Decimal::ZERO;
        for item in &mut doc.items {
            item.amount = item.qty * item.rate;
            net += item.amount;
        }
        doc.net_total = net;
        let (total_taxes, grand_total) = apply_taxes(net, &mut doc.taxes);
        doc.total_taxes = total_taxes;
        doc.grand_total = grand_total;
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
        let doc = expect_doc!(doc, PurchaseInvoice);

        // Dr estoque/despesa por linha; Cr Contas a Pagar pelo total;
        // impostos também a débito (custo da compra)
        let mut gl = Vec::new();
        let mut touched_orders: Vec<String> = Vec::new();

        for item in &doc.items {
            let master = ctx
                .masters
                .find_item_by_code(&mut *conn, tenant.id, &item.item_code)
                .await?;

            let debit_account = match &item.expense_account {
                Some(account) => account.clone(),
                None => match &master {
                    Some(m) if m.is_stock_item => m
                        .stock_account
                        .clone()
                        .unwrap_or_else(|| "Stock Asset".to_string()),
                    Some(m) => m
                        .expense_account
                        .clone()
                        .unwrap_or_else(|| "Expenses".to_string()),
                    None => "Expenses".to_string(),
                },
            };
            gl.push(GlEntryInput::debit(debit_account, item.amount));

            if let Some(po_name) = &item.against_purchase_order {
                ctx.docs
                    .bump_purchase_order_progress(
                        &mut *conn, tenant.id, po_name, &item.item_code, Decimal::ZERO, item.qty,
                    )
                    .await?;
                if !touched_orders.contains(po_name) {
                    touched_orders.push(po_name.clone());
                }
            }
        }

        for tax in &doc.taxes {
            gl.push(GlEntryInput::debit(tax.account_head.clone(), tax.tax_amount));
        }
        gl.push(GlEntryInput::credit(doc.credit_to.clone(), doc.grand_total));

        ctx.gl
            .post(
                conn, tenant, VoucherType::PurchaseInvoice, &doc.name,
                doc.posting_date, doc.posting_ts, &gl,
            )
            .await?;

        for po_name in &touched_orders {
            refresh_purchase_order_status(ctx, conn, tenant.id, po_name).await?;
        }

        let new_status = status::invoice_status(
            doc.outstanding_amount,
            doc.grand_total,
            doc.due_date,
            Utc::now().date_naive(),
        );
        doc.status = new_status;
        ctx.docs
            .set_invoice_status(
                &mut *conn, tenant.id, VoucherType::PurchaseInvoice, &doc.name, new_status,
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
            .set_invoice_status(
                &mut *conn, tenant.id, VoucherType::PurchaseInvoice, voucher_no,
                InvoiceStatus::Cancelled,
            )
            .await
    }
}
