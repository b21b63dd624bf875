// src/services/vouchers/pack_list.rs

use async_trait::async_trait;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{DocStatus, VoucherDoc, VoucherType},
    models::tenancy::Tenant,
    services::vouchers::{ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

/// Romaneio: só metadados de embalagem. Nenhum livro é tocado.
pub struct PackListHandler;

#[async_trait]
impl VoucherHandler for PackListHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::PackList
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, PackList);
        ensure_name(&mut doc.name, VoucherType::PackList);
        Ok(())
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, PackList);
        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::PackList, &doc.name, DocStatus::Submitted,
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
                &mut *conn, tenant.id, VoucherType::PackList, voucher_no, DocStatus::Cancelled,
            )
            .await
    }
}
