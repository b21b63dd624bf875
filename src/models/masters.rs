// src/models/masters.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// --- Enums (Mapeamento do Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "serial_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SerialStatus {
    Available,
    Issued,
}

// --- Structs Principais ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub stock_uom_code: String,
    pub has_batch: bool,
    pub has_serial: bool,
    pub is_stock_item: bool,

    // Contas padrão do item (códigos; a resolução acontece no GL writer)
    pub income_account: Option<String>,
    pub expense_account: Option<String>,
    pub stock_account: Option<String>,
    pub cogs_account: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Uom {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ItemUom {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub item_id: Uuid,
    pub uom_code: String,
    pub conversion_factor: rust_decimal::Decimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub default_receiving_location_id: Option<Uuid>,
    pub default_picking_location_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub warehouse_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub code: String,
    // Cadeia de códigos separada por barras, ex: "ROOT/RECEIVING"
    pub path: String,
    pub is_pickable: bool,
    pub is_putaway: bool,
    pub is_staging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub item_id: Uuid,
    pub batch_no: String,
    pub exp_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Serial {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub serial_no: String,
    pub item_id: Uuid,
    pub status: SerialStatus,
    // Um serial AVAILABLE tem exatamente uma localização; ISSUED não tem nenhuma
    pub warehouse_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
