// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

// Nosso tipo de erro principal. As variantes seguem a taxonomia do domínio:
// validação, disponibilidade, conflito de estado, integridade, concorrência
// e sistema. Toda mensagem nomeia a entidade ofensora (código do item,
// depósito, voucher...) para o chamador conseguir agir.
#[derive(Debug, Error)]
pub enum AppError {

    // --- Validação ---

    #[error("Tenant ausente no contexto da operação")]
    MissingTenant,

    #[error("Quantidade inválida: {0} (precisa ser > 0)")]
    InvalidQuantity(Decimal),

    #[error("Taxa inválida: {0} (precisa ser >= 0)")]
    InvalidRate(Decimal),

    #[error("Item não encontrado: {0}")]
    UnknownItem(String),

    #[error("Depósito não encontrado: {0}")]
    UnknownWarehouse(String),

    #[error("Localização '{0}' não encontrada no depósito '{1}'")]
    UnknownLocation(String, String),

    #[error("Voucher não encontrado: {0}")]
    UnknownVoucher(String),

    #[error("Lote informado para item sem controle de lote: {0}")]
    BatchOnNonBatchItem(String),

    #[error("Validade divergente para o lote '{0}' (já registrada com outra data)")]
    BatchExpiryMismatch(String),

    #[error("Sem conversão de unidade cadastrada: item '{item}', unidade '{uom}'")]
    MissingUomConversion { item: String, uom: String },

    #[error("Fator de conversão inválido: {0} (precisa ser > 0)")]
    InvalidConversionFactor(Decimal),

    #[error("Depósito '{0}' não possui localização de recebimento padrão")]
    MissingReceivingLocation(String),

    #[error("Depósito '{0}' não possui localização de separação padrão")]
    MissingPickingLocation(String),

    #[error("Item serializado exige quantidade inteira, recebido {0}")]
    NonIntegerSerialQty(Decimal),

    #[error("Quantidade de seriais ({got}) diferente da quantidade movimentada ({expected})")]
    SerialCountMismatch { expected: Decimal, got: usize },

    #[error("Serial duplicado na entrada: {0}")]
    DuplicateSerialInput(String),

    #[error("Serial já cadastrado: {0}")]
    SerialAlreadyExists(String),

    #[error("Lançamento contábil desbalanceado: débito {debit} x crédito {credit}")]
    JournalNotBalanced { debit: Decimal, credit: Decimal },

    // --- Disponibilidade ---

    #[error("Estoque insuficiente do item '{item}' no depósito '{warehouse}': pedido {requested}, disponível {available}")]
    InsufficientStock {
        item: String,
        warehouse: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Estoque insuficiente do item '{item}' no bin '{location}': pedido {requested}, disponível {available}")]
    InsufficientBinStock {
        item: String,
        location: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Camadas FIFO insuficientes para o item '{item}' no depósito '{warehouse}': faltaram {shortfall}")]
    InsufficientFifoLayers {
        item: String,
        warehouse: String,
        shortfall: Decimal,
    },

    #[error("Reserva insuficiente do item '{item}' no depósito '{warehouse}'")]
    InsufficientReservation { item: String, warehouse: String },

    #[error("Serial '{0}' não está disponível na origem informada")]
    SerialNotAvailable(String),

    // --- Conflito de estado ---

    #[error("Cancelamento recusado: o voucher '{0}' já teve estoque consumido a jusante")]
    CancelAfterConsumption(String),

    #[error("Camada FIFO de origem ausente ou cancelada para o voucher '{0}'")]
    MissingSourceLayer(String),

    #[error("Devolução excederia a quantidade original da camada (voucher '{0}')")]
    ReturnExceedsLayer(String),

    #[error("Conta contábil desconhecida e sem padrão aplicável: {0}")]
    UnknownAccount(String),

    #[error("Transição de status inválida para o documento '{0}'")]
    InvalidStatusTransition(String),

    // --- Integridade ---

    #[error("Saldo ficaria negativo para o item '{item}' no depósito '{warehouse}'")]
    NegativeBalance { item: String, warehouse: String },

    #[error("Violação de restrição única: {0}")]
    UniqueConstraintViolation(String),

    // --- Concorrência (transitório; seguro repetir) ---

    #[error("Conflito de concorrência, tente novamente: {0}")]
    ConcurrencyConflict(String),

    // --- Sistema (wrappers) ---

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Código estável, legível por máquina, exposto junto da mensagem.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingTenant => "MISSING_TENANT",
            AppError::InvalidQuantity(_) => "INVALID_QTY",
            AppError::InvalidRate(_) => "INVALID_RATE",
            AppError::UnknownItem(_) => "UNKNOWN_ITEM",
            AppError::UnknownWarehouse(_) => "UNKNOWN_WAREHOUSE",
            AppError::UnknownLocation(_, _) => "UNKNOWN_LOCATION",
            AppError::UnknownVoucher(_) => "UNKNOWN_VOUCHER",
            AppError::BatchOnNonBatchItem(_) => "BATCH_ON_NON_BATCH_ITEM",
            AppError::BatchExpiryMismatch(_) => "BATCH_EXPIRY_MISMATCH",
            AppError::MissingUomConversion { .. } => "MISSING_UOM_CONVERSION",
            AppError::InvalidConversionFactor(_) => "INVALID_CONVERSION_FACTOR",
            AppError::MissingReceivingLocation(_) => "MISSING_RECEIVING_LOCATION",
            AppError::MissingPickingLocation(_) => "MISSING_PICKING_LOCATION",
            AppError::NonIntegerSerialQty(_) => "NON_INTEGER_SERIAL_QTY",
            AppError::SerialCountMismatch { .. } => "SERIAL_COUNT_MISMATCH",
            AppError::DuplicateSerialInput(_) => "DUPLICATE_SERIAL_INPUT",
            AppError::SerialAlreadyExists(_) => "SERIAL_ALREADY_EXISTS",
            AppError::JournalNotBalanced { .. } => "JOURNAL_NOT_BALANCED",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::InsufficientBinStock { .. } => "INSUFFICIENT_BIN_STOCK",
            AppError::InsufficientFifoLayers { .. } => "INSUFFICIENT_FIFO_LAYERS",
            AppError::InsufficientReservation { .. } => "INSUFFICIENT_RESERVATION",
            AppError::SerialNotAvailable(_) => "SERIAL_NOT_AVAILABLE",
            AppError::CancelAfterConsumption(_) => "CANCEL_AFTER_CONSUMPTION",
            AppError::MissingSourceLayer(_) => "MISSING_SOURCE_LAYER",
            AppError::ReturnExceedsLayer(_) => "RETURN_EXCEEDS_LAYER",
            AppError::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            AppError::InvalidStatusTransition(_) => "INVALID_STATUS_TRANSITION",
            AppError::NegativeBalance { .. } => "NEGATIVE_BALANCE",
            AppError::UniqueConstraintViolation(_) => "UNIQUE_VIOLATION",
            AppError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_ERROR",
        }
    }

    /// Erros de concorrência são transitórios: o chamador pode repetir a
    /// submissão e o marcador de idempotência evita lançamento duplo.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict(_))
    }
}

// --- Estrutura de Resposta da API (JSON) ---
#[derive(Serialize)]
pub struct ApiError {
    #[serde(skip)] // O status numérico vai no header HTTP, não no corpo
    pub status: StatusCode,

    pub code: &'static str,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl AppError {
    pub fn to_api_error(self) -> ApiError {
        // Logging antes de responder: warn para regra de negócio, error para
        // falha de infraestrutura.
        match &self {
            AppError::DatabaseError(e) => tracing::error!("🔥 ERRO DE BANCO: {:?}", e),
            AppError::InternalServerError(e) => tracing::error!("🔥 ERRO INTERNO: {:?}", e),
            AppError::ConcurrencyConflict(e) => tracing::warn!("⏳ Conflito de concorrência: {}", e),
            other => tracing::warn!("⚠️ Regra de negócio: {}", other),
        }

        let status = match &self {
            AppError::MissingTenant
            | AppError::InvalidQuantity(_)
            | AppError::InvalidRate(_)
            | AppError::InvalidConversionFactor(_)
            | AppError::NonIntegerSerialQty(_)
            | AppError::SerialCountMismatch { .. }
            | AppError::DuplicateSerialInput(_)
            | AppError::BatchOnNonBatchItem(_)
            | AppError::JournalNotBalanced { .. } => StatusCode::BAD_REQUEST,

            AppError::UnknownItem(_)
            | AppError::UnknownWarehouse(_)
            | AppError::UnknownLocation(_, _)
            | AppError::UnknownVoucher(_) => StatusCode::NOT_FOUND,

            AppError::BatchExpiryMismatch(_)
            | AppError::MissingUomConversion { .. }
            | AppError::MissingReceivingLocation(_)
            | AppError::MissingPickingLocation(_)
            | AppError::SerialAlreadyExists(_)
            | AppError::InsufficientStock { .. }
            | AppError::InsufficientBinStock { .. }
            | AppError::InsufficientFifoLayers { .. }
            | AppError::InsufficientReservation { .. }
            | AppError::SerialNotAvailable(_)
            | AppError::CancelAfterConsumption(_)
            | AppError::MissingSourceLayer(_)
            | AppError::ReturnExceedsLayer(_)
            | AppError::UnknownAccount(_)
            | AppError::InvalidStatusTransition(_)
            | AppError::NegativeBalance { .. }
            | AppError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,

            AppError::ConcurrencyConflict(_) => StatusCode::SERVICE_UNAVAILABLE,

            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Detalhes técnicos de infraestrutura não vazam para o usuário
        let message = match &self {
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                "Erro interno do servidor".to_string()
            }
            other => other.to_string(),
        };

        ApiError {
            status,
            code: self.code(),
            error: message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn codes_are_stable() {
        let err = AppError::InsufficientStock {
            item: "SKU-A".into(),
            warehouse: "WH1".into(),
            requested: dec!(5),
            available: dec!(3),
        };
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        assert!(err.to_string().contains("SKU-A"));
        assert!(err.to_string().contains("WH1"));
    }

    #[test]
    fn only_concurrency_is_retryable() {
        assert!(AppError::ConcurrencyConflict("deadlock".into()).is_retryable());
        assert!(!AppError::UnknownItem("X".into()).is_retryable());
        assert!(!AppError::CancelAfterConsumption("PR-1".into()).is_retryable());
    }
}
