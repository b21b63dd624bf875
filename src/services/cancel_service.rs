// src/services/cancel_service.rs
//
// Os três cancelamentos de estoque. Regra de ouro: o fluxo de custo é
// append-only, então o cancelamento nunca desfaz além do primeiro consumidor
// a jusante; se algo já foi consumido, a operação falha alto e nada muda.
// Cada canceller tem sua própria chave CANCEL:<tipo>:<numero>; o segundo
// cancelamento do mesmo voucher é no-op.

use chrono::Utc;
use sqlx::PgConnection;

use crate::{
    common::{db_utils::acquire_stock_lock_pair, db_utils::acquire_stock_lock, error::AppError},
    db::StockRepository,
    models::documents::VoucherType,
    models::tenancy::Tenant,
    services::naming,
};

#[derive(Clone)]
pub struct CancelService {
    stock: StockRepository,
}

impl CancelService {
    pub fn new(stock: StockRepository) -> Self {
        Self { stock }
    }

    // =========================================================================
    //  CANCELAR RECEBIMENTO
    // =========================================================================

    /// Cancela um Purchase Receipt: zera as camadas criadas por ele, reverte
    /// saldos e apaga os seriais que o recebimento criou. Recusa se QUALQUER
    /// camada já foi parcialmente consumida.
    pub async fn cancel_purchase_receipt(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        voucher_no: &str,
    ) -> Result<bool, AppError> {
        let key = naming::cancel_key(VoucherType::PurchaseReceipt, voucher_no);
        if !self.stock.try_insert_posting(&mut *conn, tenant.id, &key).await? {
            tracing::info!("Cancelamento já aplicado: {}", key);
            return Ok(false);
        }

        let layers = self
            .stock
            .find_layers_by_voucher(conn, tenant.id, VoucherType::PurchaseReceipt, voucher_no)
            .await?;

        // Primeiro a verificação completa, depois a mutação: ou cancela tudo
        // ou não cancela nada.
        for layer in &layers {
            if layer.qty_remaining < layer.qty_original {
                return Err(AppError::CancelAfterConsumption(voucher_no.to_string()));
            }
        }

        let posting_ts = Utc::now();
        for layer in &layers {
            acquire_stock_lock(&mut *conn, tenant.id, layer.warehouse_id, layer.item_id).await?;

            let warehouse_ok = self
                .stock
                .update_warehouse_balance(
                    &mut *conn, tenant.id, layer.item_id, layer.warehouse_id,
                    -layer.qty_original, false,
                )
                .await?;
            let bin_ok = self
                .stock
                .update_bin_balance(
                    &mut *conn, tenant.id, layer.item_id, layer.warehouse_id,
                    layer.location_id, layer.batch_id, -layer.qty_original, false,
                )
                .await?;
            if warehouse_ok.is_none() || bin_ok.is_none() {
                return Err(AppError::CancelAfterConsumption(voucher_no.to_string()));
            }

            self.stock.cancel_layer(&mut *conn, tenant.id, layer.id).await?;

            self.stock
                .insert_ledger_entry(
                    &mut *conn, tenant.id, layer.item_id, layer.warehouse_id,
                    Some(layer.location_id), None, layer.batch_id,
                    -layer.qty_original, layer.incoming_rate,
                    -(layer.qty_original * layer.incoming_rate), Some(layer.id),
                    VoucherType::PurchaseReceipt, voucher_no, posting_ts,
                )
                .await?;
        }

        self.stock
            .delete_serials_created_by(conn, tenant.id, VoucherType::PurchaseReceipt, voucher_no)
            .await?;

        Ok(true)
    }

    // =========================================================================
    //  CANCELAR ENTREGA
    // =========================================================================

    /// Cancela um Delivery Note: devolve cada perna consumida à sua camada de
    /// origem (sem exceder a quantidade original), re-incrementa saldos no
    /// fromLocation original e reativa os seriais no bin de origem.
    pub async fn cancel_delivery_note(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        voucher_no: &str,
    ) -> Result<bool, AppError> {
        let key = naming::cancel_key(VoucherType::DeliveryNote, voucher_no);
        if !self.stock.try_insert_posting(&mut *conn, tenant.id, &key).await? {
            tracing::info!("Cancelamento já aplicado: {}", key);
            return Ok(false);
        }

        let entries = self
            .stock
            .find_issue_entries_by_voucher(&mut *conn, tenant.id, VoucherType::DeliveryNote, voucher_no)
            .await?;

        let posting_ts = Utc::now();
        for entry in &entries {
            acquire_stock_lock(&mut *conn, tenant.id, entry.warehouse_id, entry.item_id).await?;

            let layer_id = entry
                .fifo_layer_id
                .ok_or_else(|| AppError::MissingSourceLayer(voucher_no.to_string()))?;
            let layer = self
                .stock
                .get_layer(&mut *conn, tenant.id, layer_id)
                .await?
                .ok_or_else(|| AppError::MissingSourceLayer(voucher_no.to_string()))?;
            if layer.is_cancelled {
                return Err(AppError::MissingSourceLayer(voucher_no.to_string()));
            }

            let return_qty = -entry.qty; // entrada era negativa
            if !self
                .stock
                .restore_layer_qty(&mut *conn, tenant.id, layer.id, return_qty)
                .await?
            {
                return Err(AppError::ReturnExceedsLayer(voucher_no.to_string()));
            }

            let from_location = entry
                .from_location_id
                .ok_or_else(|| AppError::MissingSourceLayer(voucher_no.to_string()))?;

            self.stock
                .upsert_warehouse_balance(&mut *conn, tenant.id, entry.item_id, entry.warehouse_id, return_qty)
                .await?;
            self.stock
                .upsert_bin_balance(
                    &mut *conn, tenant.id, entry.item_id, entry.warehouse_id,
                    from_location, entry.batch_id, return_qty,
                )
                .await?;

            let cancel_entry = self
                .stock
                .insert_ledger_entry(
                    &mut *conn, tenant.id, entry.item_id, entry.warehouse_id,
                    None, Some(from_location), entry.batch_id,
                    return_qty, entry.valuation_rate, -entry.stock_value_difference,
                    Some(layer.id), VoucherType::DeliveryNote, voucher_no, posting_ts,
                )
                .await?;

            // Seriais voltam AVAILABLE para o bin de onde saíram
            let serials = self
                .stock
                .serials_for_entry(&mut *conn, tenant.id, entry.id)
                .await?;
            for serial in serials {
                self.stock
                    .place_serial(
                        &mut *conn, tenant.id, serial.id, entry.warehouse_id,
                        from_location, entry.batch_id,
                    )
                    .await?;
                self.stock
                    .link_serial_to_entry(&mut *conn, cancel_entry.id, serial.id)
                    .await?;
            }
        }

        Ok(true)
    }

    // =========================================================================
    //  CANCELAR TRANSFERÊNCIA
    // =========================================================================

    /// Cancela uma transferência (Stock Transfer ou Pick List): cancela as
    /// camadas de destino, devolve a quantidade às camadas de origem, ajusta
    /// os saldos dos dois lados e traz os seriais de volta. Recusa se
    /// qualquer camada de destino já foi consumida.
    pub async fn cancel_stock_transfer(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        voucher_type: VoucherType,
        voucher_no: &str,
    ) -> Result<bool, AppError> {
        let key = naming::cancel_key(voucher_type, voucher_no);
        if !self.stock.try_insert_posting(&mut *conn, tenant.id, &key).await? {
            tracing::info!("Cancelamento já aplicado: {}", key);
            return Ok(false);
        }

        let dest_layers: Vec<_> = self
            .stock
            .find_layers_by_voucher(conn, tenant.id, voucher_type, voucher_no)
            .await?
            .into_iter()
            .filter(|l| l.source_layer_id.is_some())
            .collect();

        for layer in &dest_layers {
            if layer.qty_remaining < layer.qty_original {
                return Err(AppError::CancelAfterConsumption(voucher_no.to_string()));
            }
        }

        let posting_ts = Utc::now();
        for dest in &dest_layers {
            let source_id = dest
                .source_layer_id
                .ok_or_else(|| AppError::MissingSourceLayer(voucher_no.to_string()))?;
            let source = self
                .stock
                .get_layer(&mut *conn, tenant.id, source_id)
                .await?
                .ok_or_else(|| AppError::MissingSourceLayer(voucher_no.to_string()))?;
            if source.is_cancelled {
                return Err(AppError::MissingSourceLayer(voucher_no.to_string()));
            }

            acquire_stock_lock_pair(
                &mut *conn, tenant.id, source.warehouse_id, dest.warehouse_id, dest.item_id,
            )
            .await?;

            // (a) cancela o destino
            self.stock.cancel_layer(&mut *conn, tenant.id, dest.id).await?;

            // (b) devolve à origem
            if !self
                .stock
                .restore_layer_qty(&mut *conn, tenant.id, source.id, dest.qty_original)
                .await?
            {
                return Err(AppError::ReturnExceedsLayer(voucher_no.to_string()));
            }

            // (c) saldos dos dois lados
            let dest_wh = self
                .stock
                .update_warehouse_balance(
                    &mut *conn, tenant.id, dest.item_id, dest.warehouse_id,
                    -dest.qty_original, false,
                )
                .await?;
            let dest_bin = self
                .stock
                .update_bin_balance(
                    &mut *conn, tenant.id, dest.item_id, dest.warehouse_id,
                    dest.location_id, dest.batch_id, -dest.qty_original, false,
                )
                .await?;
            if dest_wh.is_none() || dest_bin.is_none() {
                return Err(AppError::CancelAfterConsumption(voucher_no.to_string()));
            }
            self.stock
                .upsert_warehouse_balance(
                    &mut *conn, tenant.id, source.item_id, source.warehouse_id, dest.qty_original,
                )
                .await?;
            self.stock
                .upsert_bin_balance(
                    &mut *conn, tenant.id, source.item_id, source.warehouse_id,
                    source.location_id, source.batch_id, dest.qty_original,
                )
                .await?;

            // (d) par de pernas de cancelamento
            self.stock
                .insert_ledger_entry(
                    &mut *conn, tenant.id, dest.item_id, dest.warehouse_id,
                    Some(dest.location_id), None, dest.batch_id,
                    -dest.qty_original, dest.incoming_rate,
                    -(dest.qty_original * dest.incoming_rate), Some(dest.id),
                    voucher_type, voucher_no, posting_ts,
                )
                .await?;
            self.stock
                .insert_ledger_entry(
                    &mut *conn, tenant.id, source.item_id, source.warehouse_id,
                    None, Some(source.location_id), source.batch_id,
                    dest.qty_original, source.incoming_rate,
                    dest.qty_original * source.incoming_rate, Some(source.id),
                    voucher_type, voucher_no, posting_ts,
                )
                .await?;
        }

        // (e) seriais de volta ao bin de origem
        if !dest_layers.is_empty() {
            let in_entries = self
                .stock
                .find_receipt_entries_by_voucher(&mut *conn, tenant.id, voucher_type, voucher_no)
                .await?;
            for entry in &in_entries {
                let Some(dest) = dest_layers.iter().find(|l| Some(l.id) == entry.fifo_layer_id)
                else {
                    continue;
                };
                let source_id = dest
                    .source_layer_id
                    .ok_or_else(|| AppError::MissingSourceLayer(voucher_no.to_string()))?;
                let source = self
                    .stock
                    .get_layer(&mut *conn, tenant.id, source_id)
                    .await?
                    .ok_or_else(|| AppError::MissingSourceLayer(voucher_no.to_string()))?;

                let serials = self
                    .stock
                    .serials_for_entry(&mut *conn, tenant.id, entry.id)
                    .await?;
                for serial in serials {
                    self.stock
                        .place_serial(
                            &mut *conn, tenant.id, serial.id, source.warehouse_id,
                            source.location_id, source.batch_id,
                        )
                        .await?;
                }
            }
        }

        Ok(true)
    }
}
