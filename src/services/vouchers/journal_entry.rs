// src/services/vouchers/journal_entry.rs

use async_trait::async_trait;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{DocStatus, VoucherDoc, VoucherType},
    models::finance::GlEntryInput,
    models::tenancy::Tenant,
    services::gl_service,
    services::vouchers::{ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

pub struct JournalEntryHandler;

fn to_gl_inputs(doc: &crate::models::documents::JournalEntry) -> Vec<GlEntryInput> {
    doc.accounts
        .iter()
        .map(|line| GlEntryInput {
            account_code: line.account_code.clone(),
            debit: line.debit,
            credit: line.credit,
            remarks: line.remarks.clone(),
        })
        .collect()
}

#[async_trait]
impl VoucherHandler for JournalEntryHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::JournalEntry
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, JournalEntry);
        ensure_name(&mut doc.name, VoucherType::JournalEntry);
        // Diário desbalanceado nem vira rascunho
        gl_service::validate_balanced(&to_gl_inputs(doc))
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, JournalEntry);

        let gl = to_gl_inputs(doc);
        ctx.gl
            .post(
                conn, tenant, VoucherType::JournalEntry, &doc.name,
                doc.posting_date, doc.posting_ts, &gl,
            )
            .await?;

        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::JournalEntry, &doc.name, DocStatus::Submitted,
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
                &mut *conn, tenant.id, VoucherType::JournalEntry, voucher_no, DocStatus::Cancelled,
            )
            .await
    }
}
