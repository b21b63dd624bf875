// src/models/stock.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::documents::VoucherType;

// --- Saldos derivados ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseItemBalance {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub actual_qty: Decimal,
    pub reserved_qty: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BinBalance {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub actual_qty: Decimal,
    pub reserved_qty: Decimal,
    pub updated_at: DateTime<Utc>,
}

// --- Camadas de custo ---

// Cabeçalho imutável + qty_remaining corrente. O histórico de consumo fica
// na tabela de pernas (StockLayerConsumption), então o custo de qualquer
// época pode ser reconstruído.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockFifoLayer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub qty_original: Decimal,
    pub qty_remaining: Decimal,
    pub incoming_rate: Decimal,
    pub posting_ts: DateTime<Utc>,
    pub voucher_type: VoucherType,
    pub voucher_no: String,
    // Linhagem de transferência: aponta para a camada de origem consumida
    pub source_layer_id: Option<Uuid>,
    pub is_cancelled: bool,
    pub created_at: DateTime<Utc>,
}

/// Visão da camada usada pelo planejador puro de consumo (sem I/O).
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FifoLayerView {
    pub id: Uuid,
    pub location_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub qty_remaining: Decimal,
    pub incoming_rate: Decimal,
    pub posting_ts: DateTime<Utc>,
    pub batch_expiry: Option<NaiveDate>,
}

// --- Livro de estoque ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockLedgerEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub from_location_id: Option<Uuid>,
    pub to_location_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    // Negativo = saída
    pub qty: Decimal,
    pub valuation_rate: Decimal,
    pub stock_value_difference: Decimal,
    pub fifo_layer_id: Option<Uuid>,
    pub voucher_type: VoucherType,
    pub voucher_no: String,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockLayerConsumption {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub layer_id: Uuid,
    pub ledger_entry_id: Uuid,
    pub qty: Decimal,
    pub rate: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockPosting {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub posting_key: String,
    pub created_at: DateTime<Utc>,
}

// --- Entradas das operações públicas de estoque ---

/// Referência do voucher que origina o movimento.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherRef {
    pub voucher_type: VoucherType,
    pub voucher_no: String,
    pub posting_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveStock {
    pub posting_key: String,
    pub voucher: VoucherRef,
    pub item_code: String,
    pub warehouse_code: String,
    pub location_code: Option<String>,
    pub batch_no: Option<String>,
    pub batch_expiry: Option<NaiveDate>,
    pub uom_code: Option<String>,
    pub conversion_factor: Option<Decimal>,
    pub qty: Decimal,
    pub incoming_rate: Decimal,
    #[serde(default)]
    pub serial_nos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueStock {
    pub posting_key: String,
    pub voucher: VoucherRef,
    pub item_code: String,
    pub warehouse_code: String,
    pub location_code: Option<String>,
    pub batch_no: Option<String>,
    pub uom_code: Option<String>,
    pub conversion_factor: Option<Decimal>,
    pub qty: Decimal,
    pub strategy: Option<crate::models::tenancy::ConsumptionStrategy>,
    #[serde(default)]
    pub consume_reservation: bool,
    #[serde(default)]
    pub serial_nos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStock {
    pub posting_key: String,
    pub voucher: VoucherRef,
    pub item_code: String,
    pub source_warehouse: String,
    pub target_warehouse: String,
    pub source_location_code: Option<String>,
    pub target_location_code: Option<String>,
    pub batch_no: Option<String>,
    pub uom_code: Option<String>,
    pub conversion_factor: Option<Decimal>,
    pub qty: Decimal,
    #[serde(default)]
    pub serial_nos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveStock {
    pub posting_key: String,
    pub voucher: VoucherRef,
    pub item_code: String,
    pub warehouse_code: String,
    pub location_code: Option<String>,
    pub batch_no: Option<String>,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStock {
    pub posting_key: String,
    pub voucher: VoucherRef,
    pub item_code: String,
    pub warehouse_code: String,
    pub location_code: String,
    pub batch_no: Option<String>,
    pub target_qty: Decimal,
    pub increase_rate: Decimal,
}

// --- Saídas ---

/// Uma perna de saída: o que foi baixado de UMA camada.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLeg {
    pub layer_id: Uuid,
    pub location_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub qty: Decimal,
    pub rate: Decimal,
}

/// Resultado de uma baixa: pernas consumidas + custo médio ponderado.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResult {
    pub legs: Vec<IssueLeg>,
    pub total_qty: Decimal,
    pub total_cost: Decimal,
    pub weighted_rate: Decimal,
}

impl IssueResult {
    /// Resultado de um replay idempotente: nada foi movimentado.
    pub fn noop() -> Self {
        Self {
            legs: Vec::new(),
            total_qty: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            weighted_rate: Decimal::ZERO,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.legs.is_empty()
    }
}
