// src/common/db_utils.rs

use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::common::error::AppError;

// ---
// Transação com escopo de tenant: a "chave" para o banco de dados
// ---
/// Abre uma transação, define a variável `app.tenant_id` (para RLS no banco,
/// caso habilitado) e aplica o statement_timeout da operação. Toda submissão
/// de voucher roda inteira dentro de UMA transação dessas: ledger, camadas,
/// saldos, GL e marcador de idempotência commitam ou abortam juntos.
pub async fn begin_tenant_tx(
    pool: &PgPool,
    tenant_id: Uuid,
    statement_timeout_ms: u64,
) -> Result<Transaction<'static, Postgres>, AppError> {
    let mut tx = pool.begin().await?;

    // O 'true' no final significa "is_local": vale só para esta transação
    sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
        .bind(tenant_id.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query("SELECT set_config('statement_timeout', $1, true)")
        .bind(statement_timeout_ms.to_string())
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

// ---
// Lock consultivo por (tenant, depósito, item)
// ---
// Serializa todas as mutações de saldo e de camadas FIFO daquela tupla.
// O lock é xact-scoped: o Postgres libera sozinho no COMMIT/ROLLBACK.

/// Hash estável (FNV-1a 64) da chave do lock. Precisa ser determinístico
/// entre processos e versões, então não usamos o SipHash da std.
pub fn stock_lock_key(tenant_id: Uuid, warehouse_id: Uuid, item_id: Uuid) -> i64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let composed = format!("{tenant_id}:{warehouse_id}:{item_id}");
    let mut hash = FNV_OFFSET;
    for byte in composed.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as i64
}

pub async fn acquire_stock_lock(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    warehouse_id: Uuid,
    item_id: Uuid,
) -> Result<(), AppError> {
    let key = stock_lock_key(tenant_id, warehouse_id, item_id);
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(key)
        .execute(conn)
        .await
        .map_err(map_transient)?;
    Ok(())
}

/// Para transferências entre dois depósitos: os dois locks em ordem
/// determinística (chave ordenada), senão duas transferências cruzadas
/// podem se abraçar em deadlock.
pub async fn acquire_stock_lock_pair(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    warehouse_a: Uuid,
    warehouse_b: Uuid,
    item_id: Uuid,
) -> Result<(), AppError> {
    let mut keys = [
        stock_lock_key(tenant_id, warehouse_a, item_id),
        stock_lock_key(tenant_id, warehouse_b, item_id),
    ];
    keys.sort_unstable();

    for key in keys {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(map_transient)?;
    }
    Ok(())
}

/// Classifica erros transitórios do Postgres (deadlock 40P01, serialization
/// 40001, lock timeout 55P03) para o chamador saber que pode repetir.
pub fn map_transient(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            if code == "40P01" || code == "40001" || code == "55P03" {
                return AppError::ConcurrencyConflict(db_err.message().to_string());
            }
        }
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_deterministic() {
        let t = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let w = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap();
        let i = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440002").unwrap();

        assert_eq!(stock_lock_key(t, w, i), stock_lock_key(t, w, i));
        // Tuplas diferentes, chaves diferentes
        assert_ne!(stock_lock_key(t, w, i), stock_lock_key(t, i, w));
    }

    #[test]
    fn pair_order_is_independent_of_argument_order() {
        let t = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let i = Uuid::new_v4();

        let mut ab = [stock_lock_key(t, a, i), stock_lock_key(t, b, i)];
        let mut ba = [stock_lock_key(t, b, i), stock_lock_key(t, a, i)];
        ab.sort_unstable();
        ba.sort_unstable();
        assert_eq!(ab, ba);
    }
}
