// src/db/masters_repo.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::masters::{Batch, Item, ItemUom, Location, Uom, Warehouse},
    models::tenancy::Tenant,
};

#[derive(Clone)]
pub struct MastersRepository {
    pool: PgPool,
}

impl MastersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Tenant
    // ---

    pub async fn get_tenant<'e, E>(&self, executor: E, tenant_id: Uuid) -> Result<Tenant, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::MissingTenant)
    }

    // ---
    // Itens e unidades
    // ---

    pub async fn find_item_by_code<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Item>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item = sqlx::query_as::<_, Item>(
            "SELECT * FROM items WHERE tenant_id = $1 AND code = $2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(executor)
        .await?;
        Ok(item)
    }

    /// Upsert por código: cadastros são idempotentes por (tenant, code).
    pub async fn upsert_item<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        code: &str,
        name: &str,
        stock_uom_code: &str,
        has_batch: bool,
        has_serial: bool,
        is_stock_item: bool,
    ) -> Result<Item, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item = sqlx::query_as::<_, Item>(
            r#"
            INSERT INTO items (tenant_id, code, name, stock_uom_code, has_batch, has_serial, is_stock_item)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, code)
            DO UPDATE SET name = $3, stock_uom_code = $4, has_batch = $5,
                          has_serial = $6, is_stock_item = $7, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(code)
        .bind(name)
        .bind(stock_uom_code)
        .bind(has_batch)
        .bind(has_serial)
        .bind(is_stock_item)
        .fetch_one(executor)
        .await?;
        Ok(item)
    }

    pub async fn upsert_uom<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        code: &str,
        name: &str,
    ) -> Result<Uom, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let uom = sqlx::query_as::<_, Uom>(
            r#"
            INSERT INTO uoms (tenant_id, code, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, code) DO UPDATE SET name = $3
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(code)
        .bind(name)
        .fetch_one(executor)
        .await?;
        Ok(uom)
    }

    pub async fn find_item_uom<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        uom_code: &str,
    ) -> Result<Option<ItemUom>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ItemUom>(
            r#"
            SELECT * FROM item_uoms
            WHERE tenant_id = $1 AND item_id = $2 AND uom_code = $3 AND is_active
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(uom_code)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    pub async fn upsert_item_uom<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        uom_code: &str,
        conversion_factor: Decimal,
    ) -> Result<ItemUom, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ItemUom>(
            r#"
            INSERT INTO item_uoms (tenant_id, item_id, uom_code, conversion_factor)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, item_id, uom_code)
            DO UPDATE SET conversion_factor = $4, is_active = TRUE
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(uom_code)
        .bind(conversion_factor)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    // ---
    // Depósitos e localizações
    // ---

    pub async fn find_warehouse_by_code<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Warehouse>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let wh = sqlx::query_as::<_, Warehouse>(
            "SELECT * FROM warehouses WHERE tenant_id = $1 AND code = $2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(executor)
        .await?;
        Ok(wh)
    }

    /// Cria o depósito já semeando a árvore de localizações padrão
    /// (ROOT > RECEIVING / PICKING / STAGING) e apontando os defaults.
    pub async fn create_warehouse(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        code: &str,
        name: &str,
    ) -> Result<Warehouse, AppError> {
        let wh = sqlx::query_as::<_, Warehouse>(
            r#"
            INSERT INTO warehouses (tenant_id, code, name)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(code)
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::UniqueConstraintViolation(code.to_string());
                }
            }
            e.into()
        })?;

        let root = self
            .create_location(&mut *conn, tenant_id, wh.id, None, "ROOT", "ROOT", false, false, false)
            .await?;
        let receiving = self
            .create_location(
                &mut *conn, tenant_id, wh.id, Some(root.id),
                "RECEIVING", "ROOT/RECEIVING", false, true, false,
            )
            .await?;
        let picking = self
            .create_location(
                &mut *conn, tenant_id, wh.id, Some(root.id),
                "PICKING", "ROOT/PICKING", true, false, false,
            )
            .await?;
        self.create_location(
            &mut *conn, tenant_id, wh.id, Some(root.id),
            "STAGING", "ROOT/STAGING", true, true, true,
        )
        .await?;

        let wh = sqlx::query_as::<_, Warehouse>(
            r#"
            UPDATE warehouses
            SET default_receiving_location_id = $1, default_picking_location_id = $2
            WHERE id = $3 AND tenant_id = $4
            RETURNING *
            "#,
        )
        .bind(receiving.id)
        .bind(picking.id)
        .bind(wh.id)
        .bind(tenant_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(wh)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_location<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        parent_id: Option<Uuid>,
        code: &str,
        path: &str,
        is_pickable: bool,
        is_putaway: bool,
        is_staging: bool,
    ) -> Result<Location, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let loc = sqlx::query_as::<_, Location>(
            r#"
            INSERT INTO locations (tenant_id, warehouse_id, parent_id, code, path,
                                   is_pickable, is_putaway, is_staging)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(warehouse_id)
        .bind(parent_id)
        .bind(code)
        .bind(path)
        .bind(is_pickable)
        .bind(is_putaway)
        .bind(is_staging)
        .fetch_one(executor)
        .await?;
        Ok(loc)
    }

    pub async fn find_location<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        code: &str,
    ) -> Result<Option<Location>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let loc = sqlx::query_as::<_, Location>(
            "SELECT * FROM locations WHERE tenant_id = $1 AND warehouse_id = $2 AND code = $3",
        )
        .bind(tenant_id)
        .bind(warehouse_id)
        .bind(code)
        .fetch_optional(executor)
        .await?;
        Ok(loc)
    }

    pub async fn get_location<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<Location>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let loc = sqlx::query_as::<_, Location>(
            "SELECT * FROM locations WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(location_id)
        .fetch_optional(executor)
        .await?;
        Ok(loc)
    }

    /// Localização de STAGING do depósito (destino do Pick List).
    pub async fn find_staging_location<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<Option<Location>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let loc = sqlx::query_as::<_, Location>(
            r#"
            SELECT * FROM locations
            WHERE tenant_id = $1 AND warehouse_id = $2 AND is_staging
            ORDER BY path ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(warehouse_id)
        .fetch_optional(executor)
        .await?;
        Ok(loc)
    }

    // ---
    // Lotes
    // ---

    pub async fn find_batch<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        batch_no: &str,
    ) -> Result<Option<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, Batch>(
            "SELECT * FROM batches WHERE tenant_id = $1 AND item_id = $2 AND batch_no = $3",
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(batch_no)
        .fetch_optional(executor)
        .await?;
        Ok(batch)
    }

    pub async fn create_batch<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        item_id: Uuid,
        batch_no: &str,
        exp_date: Option<NaiveDate>,
    ) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, Batch>(
            r#"
            INSERT INTO batches (tenant_id, item_id, batch_no, exp_date)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(item_id)
        .bind(batch_no)
        .bind(exp_date)
        .fetch_one(executor)
        .await?;
        Ok(batch)
    }

    /// Preenche a validade de um lote criado sem ela. A troca de uma validade
    /// já registrada é rejeitada no service (BatchExpiryMismatch).
    pub async fn set_batch_expiry<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        batch_id: Uuid,
        exp_date: NaiveDate,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE batches SET exp_date = $1 WHERE id = $2 AND tenant_id = $3")
            .bind(exp_date)
            .bind(batch_id)
            .bind(tenant_id)
            .execute(executor)
            .await?;
        Ok(())
    }
}
