// src/db/stock_repo.rs
//
// Persistência do motor de estoque: marcador de idempotência, saldos
// (depósito e bin), camadas FIFO com linhagem de consumo, livro de estoque
// e rastreio de seriais. Linhas de livro, camadas, pernas e marcadores são
// append-only; a única coluna mutável de camada é qty_remaining/is_cancelled.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::documents::VoucherType,
    models::masters::{Serial, SerialStatus},
    models::stock::{
        BinBalance, FifoLayerView, StockFifoLayer, StockLedgerEntry, WarehouseItemBalance,
    },
};

// Chave do índice único de bin com batch nulo
const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Clone)]
pub struct StockRepository {
    pool: PgPool,
}

impl StockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  IDEMPOTÊNCIA
    // =========================================================================

    /// Tenta gravar o marcador. `false` = a chave já existia e a operação
    /// inteira deve virar no-op. O marcador commita junto com as mutações,
    /// então um rollback não deixa marcador órfão.
    pub async fn try_insert_posting<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        posting_key: &str,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO stock_postings (tenant_id, posting_key)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id, posting_key) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(posting_key)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  SALDOS POR DEPÓSITO
    // =========================================================================

    pub async fn get_warehouse_balance<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<Option<WarehouseItemBalance>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let balance = sqlx::query_as::<_, WarehouseItemBalance>(
            r#"
            SELECT * FROM warehouse_item_balances
            WHERE tenant_id = $1 AND item_id = $2 AND warehouse_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .fetch_optional(executor)
        .await?;
        Ok(balance)
    }

    /// UPSERT atômico: cria a linha com o delta ou soma ao saldo existente.
    pub async fn upsert_warehouse_balance<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        delta: Decimal,
    ) -> Result<WarehouseItemBalance, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let balance = sqlx::query_as::<_, WarehouseItemBalance>(
            r#"
            INSERT INTO warehouse_item_balances (tenant_id, item_id, warehouse_id, actual_qty)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, item_id, warehouse_id)
            DO UPDATE SET actual_qty = warehouse_item_balances.actual_qty + $4,
                          updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(delta)
        .fetch_one(executor)
        .await?;
        Ok(balance)
    }

    /// Decremento guardado: com `allow_negative = false` a linha só atualiza
    /// se o resultado ficar >= 0. `None` = violaria a política.
    pub async fn update_warehouse_balance<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        delta: Decimal,
        allow_negative: bool,
    ) -> Result<Option<WarehouseItemBalance>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let balance = sqlx::query_as::<_, WarehouseItemBalance>(
            r#"
            UPDATE warehouse_item_balances
            SET actual_qty = actual_qty + $4, updated_at = NOW()
            WHERE tenant_id = $1 AND item_id = $2 AND warehouse_id = $3
              AND ($5 OR actual_qty + $4 >= 0)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(delta)
        .bind(allow_negative)
        .fetch_optional(executor)
        .await?;
        Ok(balance)
    }

    /// Ajuste de reserva com o invariante 0 <= reserved <= actual embutido
    /// no predicado. `None` = o ajuste violaria o invariante.
    pub async fn adjust_warehouse_reservation<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        delta: Decimal,
    ) -> Result<Option<WarehouseItemBalance>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let balance = sqlx::query_as::<_, WarehouseItemBalance>(
            r#"
            UPDATE warehouse_item_balances
            SET reserved_qty = reserved_qty + $4, updated_at = NOW()
            WHERE tenant_id = $1 AND item_id = $2 AND warehouse_id = $3
              AND reserved_qty + $4 >= 0
              AND reserved_qty + $4 <= actual_qty
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(delta)
        .fetch_optional(executor)
        .await?;
        Ok(balance)
    }

    // =========================================================================
    //  SALDOS POR BIN (warehouse, location, batch?)
    // =========================================================================

    pub async fn get_bin_balance<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        location_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<Option<BinBalance>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let balance = sqlx::query_as::<_, BinBalance>(
            r#"
            SELECT * FROM bin_balances
            WHERE tenant_id = $1 AND item_id = $2 AND warehouse_id = $3
              AND location_id = $4 AND batch_id IS NOT DISTINCT FROM $5
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(location_id)
        .bind(batch_id)
        .fetch_optional(executor)
        .await?;
        Ok(balance)
    }

    pub async fn upsert_bin_balance<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        location_id: Uuid,
        batch_id: Option<Uuid>,
        delta: Decimal,
    ) -> Result<BinBalance, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let balance = sqlx::query_as::<_, BinBalance>(&format!(
            r#"
            INSERT INTO bin_balances (tenant_id, item_id, warehouse_id, location_id, batch_id, actual_qty)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, item_id, warehouse_id, location_id,
                         COALESCE(batch_id, '{NIL_UUID}'::uuid))
            DO UPDATE SET actual_qty = bin_balances.actual_qty + $6,
                          updated_at = NOW()
            RETURNING *
            "#
        ))
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(location_id)
        .bind(batch_id)
        .bind(delta)
        .fetch_one(executor)
        .await?;
        Ok(balance)
    }

    pub async fn update_bin_balance<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        location_id: Uuid,
        batch_id: Option<Uuid>,
        delta: Decimal,
        allow_negative: bool,
    ) -> Result<Option<BinBalance>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let balance = sqlx::query_as::<_, BinBalance>(
            r#"
            UPDATE bin_balances
            SET actual_qty = actual_qty + $6, updated_at = NOW()
            WHERE tenant_id = $1 AND item_id = $2 AND warehouse_id = $3
              AND location_id = $4 AND batch_id IS NOT DISTINCT FROM $5
              AND ($7 OR actual_qty + $6 >= 0)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(location_id)
        .bind(batch_id)
        .bind(delta)
        .bind(allow_negative)
        .fetch_optional(executor)
        .await?;
        Ok(balance)
    }

    /// Reserva em bin só existe sobre saldo existente: UPDATE puro, com o
    /// invariante 0 <= reserved <= actual no predicado.
    pub async fn adjust_bin_reservation<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        location_id: Uuid,
        batch_id: Option<Uuid>,
        delta: Decimal,
    ) -> Result<Option<BinBalance>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let balance = sqlx::query_as::<_, BinBalance>(
            r#"
            UPDATE bin_balances
            SET reserved_qty = reserved_qty + $6, updated_at = NOW()
            WHERE tenant_id = $1 AND item_id = $2 AND warehouse_id = $3
              AND location_id = $4 AND batch_id IS NOT DISTINCT FROM $5
              AND reserved_qty + $6 >= 0
              AND reserved_qty + $6 <= actual_qty
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(location_id)
        .bind(batch_id)
        .bind(delta)
        .fetch_optional(executor)
        .await?;
        Ok(balance)
    }

    // =========================================================================
    //  CAMADAS FIFO
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_fifo_layer<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        location_id: Uuid,
        batch_id: Option<Uuid>,
        qty: Decimal,
        incoming_rate: Decimal,
        posting_ts: DateTime<Utc>,
        voucher_type: VoucherType,
        voucher_no: &str,
        source_layer_id: Option<Uuid>,
    ) -> Result<StockFifoLayer, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let layer = sqlx::query_as::<_, StockFifoLayer>(
            r#"
            INSERT INTO stock_fifo_layers (
                tenant_id, item_id, warehouse_id, location_id, batch_id,
                qty_original, qty_remaining, incoming_rate, posting_ts,
                voucher_type, voucher_no, source_layer_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(location_id)
        .bind(batch_id)
        .bind(qty)
        .bind(incoming_rate)
        .bind(posting_ts)
        .bind(voucher_type)
        .bind(voucher_no)
        .bind(source_layer_id)
        .fetch_one(executor)
        .await?;
        Ok(layer)
    }

    /// Carrega (e trava, FOR UPDATE) as camadas candidatas ao consumo no
    /// escopo pedido, com a validade do lote para a ordenação FEFO. A ordem
    /// final é decidida pelo planejador puro.
    pub async fn fetch_layers_for_consumption(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        location_id: Option<Uuid>,
        batch_id: Option<Uuid>,
    ) -> Result<Vec<FifoLayerView>, AppError> {
        let layers = sqlx::query_as::<_, FifoLayerView>(
            r#"
            SELECT l.id, l.location_id, l.batch_id, l.qty_remaining,
                   l.incoming_rate, l.posting_ts, b.exp_date AS batch_expiry
            FROM stock_fifo_layers l
            LEFT JOIN batches b ON b.id = l.batch_id
            WHERE l.tenant_id = $1 AND l.item_id = $2 AND l.warehouse_id = $3
              AND NOT l.is_cancelled AND l.qty_remaining > 0
              AND ($4::uuid IS NULL OR l.location_id = $4)
              AND ($5::uuid IS NULL OR l.batch_id = $5)
            ORDER BY l.posting_ts ASC, l.id ASC
            FOR UPDATE OF l
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(location_id)
        .bind(batch_id)
        .fetch_all(conn)
        .await?;
        Ok(layers)
    }

    /// Baixa `qty` de uma camada. O predicado garante que nunca passa do
    /// restante; sob o lock consultivo isso não deveria falhar nunca.
    pub async fn decrement_layer<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        layer_id: Uuid,
        qty: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE stock_fifo_layers
            SET qty_remaining = qty_remaining - $3
            WHERE tenant_id = $1 AND id = $2 AND qty_remaining >= $3 AND NOT is_cancelled
            "#,
        )
        .bind(tenant_id)
        .bind(layer_id)
        .bind(qty)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ConcurrencyConflict(format!(
                "camada {layer_id} mudou durante o consumo"
            )));
        }
        Ok(())
    }

    /// Devolve quantidade a uma camada (cancelamento de saída). `false` se a
    /// devolução excederia a quantidade original ou a camada está cancelada.
    pub async fn restore_layer_qty<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        layer_id: Uuid,
        qty: Decimal,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE stock_fifo_layers
            SET qty_remaining = qty_remaining + $3
            WHERE tenant_id = $1 AND id = $2 AND NOT is_cancelled
              AND qty_remaining + $3 <= qty_original
            "#,
        )
        .bind(tenant_id)
        .bind(layer_id)
        .bind(qty)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn cancel_layer<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        layer_id: Uuid,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE stock_fifo_layers
            SET qty_remaining = 0, is_cancelled = TRUE
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(layer_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn get_layer<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        layer_id: Uuid,
    ) -> Result<Option<StockFifoLayer>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let layer = sqlx::query_as::<_, StockFifoLayer>(
            "SELECT * FROM stock_fifo_layers WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(layer_id)
        .fetch_optional(executor)
        .await?;
        Ok(layer)
    }

    /// Camadas não canceladas criadas por um voucher (recibo ou destino de
    /// transferência), travadas para o cancelamento.
    pub async fn find_layers_by_voucher(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        voucher_type: VoucherType,
        voucher_no: &str,
    ) -> Result<Vec<StockFifoLayer>, AppError> {
        let layers = sqlx::query_as::<_, StockFifoLayer>(
            r#"
            SELECT * FROM stock_fifo_layers
            WHERE tenant_id = $1 AND voucher_type = $2 AND voucher_no = $3
              AND NOT is_cancelled
            ORDER BY created_at ASC
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(voucher_type)
        .bind(voucher_no)
        .fetch_all(conn)
        .await?;
        Ok(layers)
    }

    // =========================================================================
    //  LIVRO DE ESTOQUE
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_ledger_entry<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        warehouse_id: Uuid,
        from_location_id: Option<Uuid>,
        to_location_id: Option<Uuid>,
        batch_id: Option<Uuid>,
        qty: Decimal,
        valuation_rate: Decimal,
        stock_value_difference: Decimal,
        fifo_layer_id: Option<Uuid>,
        voucher_type: VoucherType,
        voucher_no: &str,
        posting_ts: DateTime<Utc>,
    ) -> Result<StockLedgerEntry, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, StockLedgerEntry>(
            r#"
            INSERT INTO stock_ledger_entries (
                tenant_id, item_id, warehouse_id, from_location_id, to_location_id,
                batch_id, qty, valuation_rate, stock_value_difference, fifo_layer_id,
                voucher_type, voucher_no, posting_date, posting_ts
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(from_location_id)
        .bind(to_location_id)
        .bind(batch_id)
        .bind(qty)
        .bind(valuation_rate)
        .bind(stock_value_difference)
        .bind(fifo_layer_id)
        .bind(voucher_type)
        .bind(voucher_no)
        .bind(posting_ts.date_naive())
        .bind(posting_ts)
        .fetch_one(executor)
        .await?;
        Ok(entry)
    }

    pub async fn insert_layer_consumption<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        layer_id: Uuid,
        ledger_entry_id: Uuid,
        qty: Decimal,
        rate: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO stock_layer_consumptions (tenant_id, layer_id, ledger_entry_id, qty, rate)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant_id)
        .bind(layer_id)
        .bind(ledger_entry_id)
        .bind(qty)
        .bind(rate)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Pernas de saída (qty < 0) de um voucher, na ordem de criação.
    pub async fn find_issue_entries_by_voucher<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        voucher_type: VoucherType,
        voucher_no: &str,
    ) -> Result<Vec<StockLedgerEntry>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entries = sqlx::query_as::<_, StockLedgerEntry>(
            r#"
            SELECT * FROM stock_ledger_entries
            WHERE tenant_id = $1 AND voucher_type = $2 AND voucher_no = $3 AND qty < 0
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(voucher_type)
        .bind(voucher_no)
        .fetch_all(executor)
        .await?;
        Ok(entries)
    }

    /// Pernas de entrada (qty > 0) de um voucher.
    pub async fn find_receipt_entries_by_voucher<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        voucher_type: VoucherType,
        voucher_no: &str,
    ) -> Result<Vec<StockLedgerEntry>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entries = sqlx::query_as::<_, StockLedgerEntry>(
            r#"
            SELECT * FROM stock_ledger_entries
            WHERE tenant_id = $1 AND voucher_type = $2 AND voucher_no = $3 AND qty > 0
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(voucher_type)
        .bind(voucher_no)
        .fetch_all(executor)
        .await?;
        Ok(entries)
    }

    // =========================================================================
    //  SERIAIS
    // =========================================================================

    pub async fn find_serial<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        serial_no: &str,
    ) -> Result<Option<Serial>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let serial = sqlx::query_as::<_, Serial>(
            "SELECT * FROM serials WHERE tenant_id = $1 AND serial_no = $2",
        )
        .bind(tenant_id)
        .bind(serial_no)
        .fetch_optional(executor)
        .await?;
        Ok(serial)
    }

    pub async fn create_serial<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        serial_no: &str,
        item_id: Uuid,
        warehouse_id: Uuid,
        location_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<Serial, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Serial>(
            r#"
            INSERT INTO serials (tenant_id, serial_no, item_id, status, warehouse_id, location_id, batch_id)
            VALUES ($1, $2, $3, 'AVAILABLE', $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(serial_no)
        .bind(item_id)
        .bind(warehouse_id)
        .bind(location_id)
        .bind(batch_id)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::SerialAlreadyExists(serial_no.to_string());
                }
            }
            e.into()
        })
    }

    /// Saída: serial vai para ISSUED e perde a localização.
    pub async fn mark_serial_issued<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        serial_id: Uuid,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE serials
            SET status = 'ISSUED', warehouse_id = NULL, location_id = NULL,
                batch_id = NULL, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(serial_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Transferência / reativação: serial AVAILABLE no bin informado.
    pub async fn place_serial<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        serial_id: Uuid,
        warehouse_id: Uuid,
        location_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE serials
            SET status = 'AVAILABLE', warehouse_id = $3, location_id = $4,
                batch_id = $5, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(serial_id)
        .bind(warehouse_id)
        .bind(location_id)
        .bind(batch_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn link_serial_to_entry<'e, E>(
        &self,
        executor: E,
        ledger_entry_id: Uuid,
        serial_id: Uuid,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO stock_ledger_entry_serials (ledger_entry_id, serial_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(ledger_entry_id)
        .bind(serial_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Seriais vinculados a uma perna do livro.
    pub async fn serials_for_entry<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        ledger_entry_id: Uuid,
    ) -> Result<Vec<Serial>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let serials = sqlx::query_as::<_, Serial>(
            r#"
            SELECT s.* FROM serials s
            JOIN stock_ledger_entry_serials les ON les.serial_id = s.id
            WHERE s.tenant_id = $1 AND les.ledger_entry_id = $2
            ORDER BY s.serial_no ASC
            "#,
        )
        .bind(tenant_id)
        .bind(ledger_entry_id)
        .fetch_all(executor)
        .await?;
        Ok(serials)
    }

    /// Apaga os seriais criados pelas entradas (qty > 0) de um voucher.
    /// Usado só pelo cancelamento de recebimento, que já garantiu que nada
    /// foi consumido a jusante.
    pub async fn delete_serials_created_by(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        voucher_type: VoucherType,
        voucher_no: &str,
    ) -> Result<u64, AppError> {
        let serial_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT les.serial_id
            FROM stock_ledger_entry_serials les
            JOIN stock_ledger_entries e ON e.id = les.ledger_entry_id
            WHERE e.tenant_id = $1 AND e.voucher_type = $2 AND e.voucher_no = $3
              AND e.qty > 0
            "#,
        )
        .bind(tenant_id)
        .bind(voucher_type)
        .bind(voucher_no)
        .fetch_all(&mut *conn)
        .await?;

        if serial_ids.is_empty() {
            return Ok(0);
        }

        sqlx::query("DELETE FROM stock_ledger_entry_serials WHERE serial_id = ANY($1)")
            .bind(&serial_ids)
            .execute(&mut *conn)
            .await?;

        let result = sqlx::query("DELETE FROM serials WHERE tenant_id = $1 AND id = ANY($2)")
            .bind(tenant_id)
            .bind(&serial_ids)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Valida que o serial está AVAILABLE na origem esperada e é do item.
    pub fn check_serial_at_source(
        serial: &Serial,
        item_id: Uuid,
        warehouse_id: Uuid,
        location_id: Option<Uuid>,
        batch_id: Option<Uuid>,
    ) -> bool {
        serial.status == SerialStatus::Available
            && serial.item_id == item_id
            && serial.warehouse_id == Some(warehouse_id)
            && (location_id.is_none() || serial.location_id == location_id)
            && (batch_id.is_none() || serial.batch_id == batch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_source_check_enforces_item_and_bin() {
        let item = Uuid::new_v4();
        let wh = Uuid::new_v4();
        let loc = Uuid::new_v4();
        let serial = Serial {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            serial_no: "SN-1".into(),
            item_id: item,
            status: SerialStatus::Available,
            warehouse_id: Some(wh),
            location_id: Some(loc),
            batch_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(StockRepository::check_serial_at_source(&serial, item, wh, Some(loc), None));
        // Local errado
        assert!(!StockRepository::check_serial_at_source(
            &serial, item, wh, Some(Uuid::new_v4()), None
        ));
        // Item errado
        assert!(!StockRepository::check_serial_at_source(
            &serial, Uuid::new_v4(), wh, Some(loc), None
        ));
        // Sem localização exigida: basta o depósito
        assert!(StockRepository::check_serial_at_source(&serial, item, wh, None, None));
    }

    #[test]
    fn issued_serial_is_never_at_source() {
        let item = Uuid::new_v4();
        let wh = Uuid::new_v4();
        let serial = Serial {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            serial_no: "SN-2".into(),
            item_id: item,
            status: SerialStatus::Issued,
            warehouse_id: None,
            location_id: None,
            batch_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!StockRepository::check_serial_at_source(&serial, item, wh, None, None));
    }
}
