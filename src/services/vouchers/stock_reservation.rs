// src/services/vouchers/stock_reservation.rs

use async_trait::async_trait;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    models::documents::{DocStatus, VoucherDoc, VoucherType},
    models::stock::{ReserveStock, VoucherRef},
    models::tenancy::Tenant,
    services::naming,
    services::vouchers::{ensure_name, expect_doc, VoucherContext, VoucherHandler},
};

pub struct StockReservationHandler;

#[async_trait]
impl VoucherHandler for StockReservationHandler {
    fn kind(&self) -> VoucherType {
        VoucherType::StockReservation
    }

    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, StockReservation);
        ensure_name(&mut doc.name, VoucherType::StockReservation);
        Ok(())
    }

    async fn on_submit(
        &self,
        ctx: &VoucherContext,
        conn: &mut PgConnection,
        tenant: &Tenant,
        doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        let doc = expect_doc!(doc, StockReservation);

        for item in &doc.items {
            let input = ReserveStock {
                posting_key: naming::posting_key(VoucherType::StockReservation, &doc.name, item.id),
                voucher: VoucherRef {
                    voucher_type: VoucherType::StockReservation,
                    voucher_no: doc.name.clone(),
                    posting_ts: Some(doc.posting_ts),
                },
                item_code: item.item_code.clone(),
                warehouse_code: item.warehouse_code.clone(),
                location_code: item.location_code.clone(),
                batch_no: item.batch_no.clone(),
                qty: item.qty,
            };
            ctx.stock.reserve_stock(conn, tenant, &input).await?;
        }

        doc.status = DocStatus::Submitted;
        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::StockReservation, &doc.name,
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
        let Some(doc) = ctx
            .docs
            .get_stock_reservation(conn, tenant.id, voucher_no)
            .await?
        else {
            return Err(AppError::UnknownVoucher(voucher_no.to_string()));
        };

        // Libera o que ainda estiver reservado; reserva já consumida pela
        // entrega vira no-op.
        for item in &doc.items {
            let input = ReserveStock {
                posting_key: format!(
                    "{}:{}",
                    naming::cancel_key(VoucherType::StockReservation, voucher_no),
                    item.id
                ),
                voucher: VoucherRef {
                    voucher_type: VoucherType::StockReservation,
                    voucher_no: voucher_no.to_string(),
                    posting_ts: None,
                },
                item_code: item.item_code.clone(),
                warehouse_code: item.warehouse_code.clone(),
                location_code: item.location_code.clone(),
                batch_no: item.batch_no.clone(),
                qty: item.qty,
            };
            ctx.stock.release_reservation(conn, tenant, &input).await?;
        }

        ctx.docs
            .set_doc_status(
                &mut *conn, tenant.id, VoucherType::StockReservation, voucher_no,
                DocStatus::Cancelled,
            )
            .await
    }
}
