// src/models/tenancy.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "consumption_strategy", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumptionStrategy {
    Fifo,
    Fefo,
}

// A configuração do tenant é carregada por transação: estratégia de consumo
// padrão e política de estoque negativo mudam o comportamento das baixas.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub base_currency: String,
    pub stock_consumption_strategy: ConsumptionStrategy,
    pub allow_negative_stock: bool,
    pub created_at: DateTime<Utc>,
}

/// Contexto do usuário que dispara os hooks de documento. O tenant_id é
/// obrigatório para qualquer escrita; a ausência é erro duro, não fallback.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
}

impl UserContext {
    pub fn require_tenant(&self) -> Result<Uuid, AppError> {
        self.tenant_id.ok_or(AppError::MissingTenant)
    }
}
