// src/db/documents_repo.rs
//
// Persistência dos documentos orquestrados (cabeçalho + linhas + impostos) e
// dos campos de progresso que a máquina de status mantém (delivered_qty,
// billed_qty, received_qty, outstanding_amount).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::documents::*,
};

#[derive(Clone)]
pub struct DocumentsRepository {
    pool: PgPool,
}

impl DocumentsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  STATUS GENÉRICO (tabelas com doc_status)
    // =========================================================================

    fn doc_table(voucher_type: VoucherType) -> Option<&'static str> {
        match voucher_type {
            VoucherType::PurchaseReceipt => Some("purchase_receipts"),
            VoucherType::DeliveryNote => Some("delivery_notes"),
            VoucherType::StockTransfer => Some("stock_transfers"),
            VoucherType::StockReconciliation => Some("stock_reconciliations"),
            VoucherType::StockReservation => Some("stock_reservations"),
            VoucherType::PickList => Some("pick_lists"),
            VoucherType::PackList => Some("pack_lists"),
            VoucherType::PaymentEntry => Some("payment_entries"),
            VoucherType::JournalEntry => Some("journal_entries"),
            VoucherType::Quotation => Some("quotations"),
            VoucherType::BankReconciliation => Some("bank_reconciliations"),
            _ => None,
        }
    }

    pub async fn set_doc_status<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        voucher_type: VoucherType,
        name: &str,
        status: DocStatus,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let table = Self::doc_table(voucher_type)
            .ok_or_else(|| AppError::UnknownVoucher(name.to_string()))?;

        let query = format!("UPDATE {table} SET status = $1 WHERE tenant_id = $2 AND name = $3");
        let result = sqlx::query(&query)
            .bind(status)
            .bind(tenant_id)
            .bind(name)
            .execute(executor)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::UnknownVoucher(name.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    //  IMPOSTOS (tabela filha compartilhada)
    // =========================================================================

    async fn save_taxes(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        parent_type: VoucherType,
        parent_id: Uuid,
        taxes: &[TaxRow],
    ) -> Result<(), AppError> {
        for (idx, tax) in taxes.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO voucher_taxes (tenant_id, parent_type, parent_id, idx,
                                           charge_type, account_head, rate, tax_amount, row_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(tenant_id)
            .bind(parent_type)
            .bind(parent_id)
            .bind(idx as i32)
            .bind(tax.charge_type)
            .bind(&tax.account_head)
            .bind(tax.rate)
            .bind(tax.tax_amount)
            .bind(tax.row_total)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn load_taxes<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        parent_type: VoucherType,
        parent_id: Uuid,
    ) -> Result<Vec<TaxRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let taxes = sqlx::query_as::<_, TaxRow>(
            r#"
            SELECT charge_type, account_head, rate, tax_amount, row_total
            FROM voucher_taxes
            WHERE tenant_id = $1 AND parent_type = $2 AND parent_id = $3
            ORDER BY idx ASC
            "#,
        )
        .bind(tenant_id)
        .bind(parent_type)
        .bind(parent_id)
        .fetch_all(executor)
        .await?;
        Ok(taxes)
    }

    // =========================================================================
    //  VOUCHERS DE ESTOQUE
    // =========================================================================

    pub async fn save_purchase_receipt(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &PurchaseReceipt,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO purchase_receipts (id, tenant_id, name, supplier, status, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.supplier)
        .bind(doc.status)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO purchase_receipt_items (
                    id, tenant_id, parent_id, idx, item_code, warehouse_code, location_code,
                    batch_no, batch_expiry, uom_code, conversion_factor, qty, rate, amount,
                    serial_nos, against_purchase_order
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(&item.warehouse_code)
            .bind(&item.location_code)
            .bind(&item.batch_no)
            .bind(item.batch_expiry)
            .bind(&item.uom_code)
            .bind(item.conversion_factor)
            .bind(item.qty)
            .bind(item.rate)
            .bind(item.amount)
            .bind(&item.serial_nos)
            .bind(&item.against_purchase_order)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn save_delivery_note(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &DeliveryNote,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO delivery_notes (id, tenant_id, name, customer, status, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.customer)
        .bind(doc.status)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO delivery_note_items (
                    id, tenant_id, parent_id, idx, item_code, warehouse_code, location_code,
                    batch_no, uom_code, conversion_factor, qty, rate, amount,
                    valuation_amount, serial_nos, against_sales_order
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(&item.warehouse_code)
            .bind(&item.location_code)
            .bind(&item.batch_no)
            .bind(&item.uom_code)
            .bind(item.conversion_factor)
            .bind(item.qty)
            .bind(item.rate)
            .bind(item.amount)
            .bind(item.valuation_amount)
            .bind(&item.serial_nos)
            .bind(&item.against_sales_order)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Carimba o custo ponderado da baixa na linha (base do lançamento CPV).
    pub async fn stamp_delivery_valuation<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        line_id: Uuid,
        valuation_amount: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE delivery_note_items SET valuation_amount = $1 WHERE tenant_id = $2 AND id = $3",
        )
        .bind(valuation_amount)
        .bind(tenant_id)
        .bind(line_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn save_stock_transfer(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &StockTransferDoc,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO stock_transfers (id, tenant_id, name, status, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(doc.status)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO stock_transfer_items (
                    id, tenant_id, parent_id, idx, item_code, source_warehouse, target_warehouse,
                    source_location_code, target_location_code, batch_no, uom_code,
                    conversion_factor, qty, serial_nos
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(&item.source_warehouse)
            .bind(&item.target_warehouse)
            .bind(&item.source_location_code)
            .bind(&item.target_location_code)
            .bind(&item.batch_no)
            .bind(&item.uom_code)
            .bind(item.conversion_factor)
            .bind(item.qty)
            .bind(&item.serial_nos)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn save_stock_reconciliation(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &StockReconciliationDoc,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO stock_reconciliations (id, tenant_id, name, status, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(doc.status)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO stock_reconciliation_items (
                    id, tenant_id, parent_id, idx, item_code, warehouse_code,
                    location_code, batch_no, target_qty, increase_rate
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(&item.warehouse_code)
            .bind(&item.location_code)
            .bind(&item.batch_no)
            .bind(item.target_qty)
            .bind(item.increase_rate)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn save_stock_reservation(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &StockReservationDoc,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO stock_reservations (id, tenant_id, name, against_voucher_type,
                                            against_voucher_no, status, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(doc.against_voucher_type)
        .bind(&doc.against_voucher_no)
        .bind(doc.status)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO stock_reservation_items (
                    id, tenant_id, parent_id, idx, item_code, warehouse_code, location_code,
                    batch_no, qty
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(&item.warehouse_code)
            .bind(&item.location_code)
            .bind(&item.batch_no)
            .bind(item.qty)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn get_stock_reservation(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<StockReservationDoc>, AppError> {
        #[derive(sqlx::FromRow)]
        struct Header {
            id: Uuid,
            name: String,
            against_voucher_type: Option<VoucherType>,
            against_voucher_no: Option<String>,
            status: DocStatus,
            posting_ts: chrono::DateTime<chrono::Utc>,
        }

        let Some(header) = sqlx::query_as::<_, Header>(
            r#"
            SELECT id, name, against_voucher_type, against_voucher_no, status, posting_ts
            FROM stock_reservations WHERE tenant_id = $1 AND name = $2
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, StockReservationItem>(
            r#"
            SELECT id, idx, item_code, warehouse_code, location_code, batch_no, qty
            FROM stock_reservation_items
            WHERE tenant_id = $1 AND parent_id = $2
            ORDER BY idx ASC
            "#,
        )
        .bind(tenant_id)
        .bind(header.id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(StockReservationDoc {
            id: header.id,
            name: header.name,
            against_voucher_type: header.against_voucher_type,
            against_voucher_no: header.against_voucher_no,
            status: header.status,
            posting_ts: header.posting_ts,
            items,
        }))
    }

    pub async fn save_pick_list(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &PickList,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO pick_lists (id, tenant_id, name, sales_order, status, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.sales_order)
        .bind(doc.status)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO pick_list_items (
                    id, tenant_id, parent_id, idx, item_code, warehouse_code,
                    from_location_code, batch_no, qty, serial_nos
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(&item.warehouse_code)
            .bind(&item.from_location_code)
            .bind(&item.batch_no)
            .bind(item.qty)
            .bind(&item.serial_nos)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn save_pack_list<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        doc: &PackList,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO pack_lists (id, tenant_id, name, pick_list, status, meta)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.pick_list)
        .bind(doc.status)
        .bind(&doc.meta)
        .execute(executor)
        .await?;
        // Sem linhas filhas; replay (0 linhas afetadas) já é no-op
        let _ = result.rows_affected();
        Ok(())
    }

    // =========================================================================
    //  SALES ORDER / PURCHASE ORDER
    // =========================================================================

    pub async fn save_sales_order(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &SalesOrder,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO sales_orders (id, tenant_id, name, customer, status, reserve_stock,
                                      net_total, total_taxes, grand_total, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.customer)
        .bind(doc.status)
        .bind(doc.reserve_stock)
        .bind(doc.net_total)
        .bind(doc.total_taxes)
        .bind(doc.grand_total)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO sales_order_items (id, tenant_id, parent_id, idx, item_code,
                                               warehouse_code, qty, rate, amount,
                                               delivered_qty, billed_qty)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(&item.warehouse_code)
            .bind(item.qty)
            .bind(item.rate)
            .bind(item.amount)
            .bind(item.delivered_qty)
            .bind(item.billed_qty)
            .execute(&mut *conn)
            .await?;
        }

        self.save_taxes(conn, tenant_id, VoucherType::SalesOrder, doc.id, &doc.taxes)
            .await
    }

    pub async fn get_sales_order(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<SalesOrder>, AppError> {
        #[derive(sqlx::FromRow)]
        struct Header {
            id: Uuid,
            name: String,
            customer: String,
            status: OrderStatus,
            reserve_stock: bool,
            net_total: Decimal,
            total_taxes: Decimal,
            grand_total: Decimal,
            posting_date: NaiveDate,
            posting_ts: chrono::DateTime<chrono::Utc>,
        }

        let Some(header) = sqlx::query_as::<_, Header>(
            r#"
            SELECT id, name, customer, status, reserve_stock, net_total, total_taxes,
                   grand_total, posting_date, posting_ts
            FROM sales_orders WHERE tenant_id = $1 AND name = $2
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, SalesOrderItem>(
            r#"
            SELECT id, idx, item_code, warehouse_code, qty, rate, amount, delivered_qty, billed_qty
            FROM sales_order_items
            WHERE tenant_id = $1 AND parent_id = $2
            ORDER BY idx ASC
            "#,
        )
        .bind(tenant_id)
        .bind(header.id)
        .fetch_all(&mut *conn)
        .await?;

        let taxes = self
            .load_taxes(&mut *conn, tenant_id, VoucherType::SalesOrder, header.id)
            .await?;

        Ok(Some(SalesOrder {
            id: header.id,
            name: header.name,
            customer: header.customer,
            status: header.status,
            reserve_stock: header.reserve_stock,
            net_total: header.net_total,
            total_taxes: header.total_taxes,
            grand_total: header.grand_total,
            posting_date: header.posting_date,
            posting_ts: header.posting_ts,
            items,
            taxes,
        }))
    }

    /// Progresso de linha do SO (entregue/faturado), casado por item_code.
    pub async fn bump_sales_order_progress<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        so_name: &str,
        item_code: &str,
        delivered_delta: Decimal,
        billed_delta: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE sales_order_items i
            SET delivered_qty = i.delivered_qty + $1,
                billed_qty = i.billed_qty + $2
            FROM sales_orders o
            WHERE o.id = i.parent_id AND o.tenant_id = $3 AND o.name = $4
              AND i.item_code = $5
            "#,
        )
        .bind(delivered_delta)
        .bind(billed_delta)
        .bind(tenant_id)
        .bind(so_name)
        .bind(item_code)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn set_order_status<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        voucher_type: VoucherType,
        name: &str,
        status: OrderStatus,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let table = match voucher_type {
            VoucherType::SalesOrder => "sales_orders",
            VoucherType::PurchaseOrder => "purchase_orders",
            _ => return Err(AppError::UnknownVoucher(name.to_string())),
        };
        let query = format!("UPDATE {table} SET status = $1 WHERE tenant_id = $2 AND name = $3");
        sqlx::query(&query)
            .bind(status)
            .bind(tenant_id)
            .bind(name)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn save_purchase_order(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &PurchaseOrder,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO purchase_orders (id, tenant_id, name, supplier, status,
                                         net_total, total_taxes, grand_total, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.supplier)
        .bind(doc.status)
        .bind(doc.net_total)
        .bind(doc.total_taxes)
        .bind(doc.grand_total)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO purchase_order_items (id, tenant_id, parent_id, idx, item_code,
                                                  warehouse_code, qty, rate, amount,
                                                  received_qty, billed_qty)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(&item.warehouse_code)
            .bind(item.qty)
            .bind(item.rate)
            .bind(item.amount)
            .bind(item.received_qty)
            .bind(item.billed_qty)
            .execute(&mut *conn)
            .await?;
        }

        self.save_taxes(conn, tenant_id, VoucherType::PurchaseOrder, doc.id, &doc.taxes)
            .await
    }

    pub async fn get_purchase_order(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<PurchaseOrder>, AppError> {
        #[derive(sqlx::FromRow)]
        struct Header {
            id: Uuid,
            name: String,
            supplier: String,
            status: OrderStatus,
            net_total: Decimal,
            total_taxes: Decimal,
            grand_total: Decimal,
            posting_date: NaiveDate,
            posting_ts: chrono::DateTime<chrono::Utc>,
        }

        let Some(header) = sqlx::query_as::<_, Header>(
            r#"
            SELECT id, name, supplier, status, net_total, total_taxes, grand_total,
                   posting_date, posting_ts
            FROM purchase_orders WHERE tenant_id = $1 AND name = $2
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, PurchaseOrderItem>(
            r#"
            SELECT id, idx, item_code, warehouse_code, qty, rate, amount, received_qty, billed_qty
            FROM purchase_order_items
            WHERE tenant_id = $1 AND parent_id = $2
            ORDER BY idx ASC
            "#,
        )
        .bind(tenant_id)
        .bind(header.id)
        .fetch_all(&mut *conn)
        .await?;

        let taxes = self
            .load_taxes(&mut *conn, tenant_id, VoucherType::PurchaseOrder, header.id)
            .await?;

        Ok(Some(PurchaseOrder {
            id: header.id,
            name: header.name,
            supplier: header.supplier,
            status: header.status,
            net_total: header.net_total,
            total_taxes: header.total_taxes,
            grand_total: header.grand_total,
            posting_date: header.posting_date,
            posting_ts: header.posting_ts,
            items,
            taxes,
        }))
    }

    pub async fn bump_purchase_order_progress<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        po_name: &str,
        item_code: &str,
        received_delta: Decimal,
        billed_delta: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE purchase_order_items i
            SET received_qty = i.received_qty + $1,
                billed_qty = i.billed_qty + $2
            FROM purchase_orders o
            WHERE o.id = i.parent_id AND o.tenant_id = $3 AND o.name = $4
              AND i.item_code = $5
            "#,
        )
        .bind(received_delta)
        .bind(billed_delta)
        .bind(tenant_id)
        .bind(po_name)
        .bind(item_code)
        .execute(executor)
        .await?;
        Ok(())
    }

    // =========================================================================
    //  FATURAS
    // =========================================================================

    pub async fn save_invoice(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &Invoice,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoices (id, tenant_id, name, customer, debit_to, status,
                                  net_total, total_taxes, grand_total, outstanding_amount,
                                  posting_date, due_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.customer)
        .bind(&doc.debit_to)
        .bind(doc.status)
        .bind(doc.net_total)
        .bind(doc.total_taxes)
        .bind(doc.grand_total)
        .bind(doc.outstanding_amount)
        .bind(doc.posting_date)
        .bind(doc.due_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (id, tenant_id, parent_id, idx, item_code, qty, rate,
                                           amount, income_account, against_sales_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(item.qty)
            .bind(item.rate)
            .bind(item.amount)
            .bind(&item.income_account)
            .bind(&item.against_sales_order)
            .execute(&mut *conn)
            .await?;
        }

        self.save_taxes(conn, tenant_id, VoucherType::Invoice, doc.id, &doc.taxes)
            .await
    }

    pub async fn get_invoice(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<Invoice>, AppError> {
        #[derive(sqlx::FromRow)]
        struct Header {
            id: Uuid,
            name: String,
            customer: String,
            debit_to: String,
            status: InvoiceStatus,
            net_total: Decimal,
            total_taxes: Decimal,
            grand_total: Decimal,
            outstanding_amount: Decimal,
            posting_date: NaiveDate,
            due_date: Option<NaiveDate>,
            posting_ts: chrono::DateTime<chrono::Utc>,
        }

        let Some(header) = sqlx::query_as::<_, Header>(
            r#"
            SELECT id, name, customer, debit_to, status, net_total, total_taxes, grand_total,
                   outstanding_amount, posting_date, due_date, posting_ts
            FROM invoices WHERE tenant_id = $1 AND name = $2
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT id, idx, item_code, qty, rate, amount, income_account, against_sales_order
            FROM invoice_items
            WHERE tenant_id = $1 AND parent_id = $2
            ORDER BY idx ASC
            "#,
        )
        .bind(tenant_id)
        .bind(header.id)
        .fetch_all(&mut *conn)
        .await?;

        let taxes = self
            .load_taxes(&mut *conn, tenant_id, VoucherType::Invoice, header.id)
            .await?;

        Ok(Some(Invoice {
            id: header.id,
            name: header.name,
            customer: header.customer,
            debit_to: header.debit_to,
            status: header.status,
            net_total: header.net_total,
            total_taxes: header.total_taxes,
            grand_total: header.grand_total,
            outstanding_amount: header.outstanding_amount,
            posting_date: header.posting_date,
            due_date: header.due_date,
            posting_ts: header.posting_ts,
            items,
            taxes,
        }))
    }

    /// Aplica um delta ao saldo em aberto. Pagamento desconta com piso em
    /// zero; cancelamento de pagamento devolve o valor integral.
    pub async fn adjust_invoice_outstanding<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        voucher_type: VoucherType,
        name: &str,
        delta: Decimal,
        floor_at_zero: bool,
    ) -> Result<(Decimal, Decimal, Option<NaiveDate>), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let table = match voucher_type {
            VoucherType::Invoice => "invoices",
            VoucherType::PurchaseInvoice => "purchase_invoices",
            _ => return Err(AppError::UnknownVoucher(name.to_string())),
        };

        let query = format!(
            r#"
            UPDATE {table}
            SET outstanding_amount = CASE WHEN $4 THEN GREATEST(outstanding_amount + $1, 0)
                                          ELSE outstanding_amount + $1 END
            WHERE tenant_id = $2 AND name = $3
            RETURNING outstanding_amount, grand_total, due_date
            "#
        );

        let row: Option<(Decimal, Decimal, Option<NaiveDate>)> = sqlx::query_as(&query)
            .bind(delta)
            .bind(tenant_id)
            .bind(name)
            .bind(floor_at_zero)
            .fetch_optional(executor)
            .await?;

        row.ok_or_else(|| AppError::UnknownVoucher(name.to_string()))
    }

    pub async fn set_invoice_status<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        voucher_type: VoucherType,
        name: &str,
        status: InvoiceStatus,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let table = match voucher_type {
            VoucherType::Invoice => "invoices",
            VoucherType::PurchaseInvoice => "purchase_invoices",
            _ => return Err(AppError::UnknownVoucher(name.to_string())),
        };
        let query = format!("UPDATE {table} SET status = $1 WHERE tenant_id = $2 AND name = $3");
        sqlx::query(&query)
            .bind(status)
            .bind(tenant_id)
            .bind(name)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn save_purchase_invoice(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &PurchaseInvoice,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO purchase_invoices (id, tenant_id, name, supplier, credit_to, status,
                                           net_total, total_taxes, grand_total, outstanding_amount,
                                           posting_date, due_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.supplier)
        .bind(&doc.credit_to)
        .bind(doc.status)
        .bind(doc.net_total)
        .bind(doc.total_taxes)
        .bind(doc.grand_total)
        .bind(doc.outstanding_amount)
        .bind(doc.posting_date)
        .bind(doc.due_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO purchase_invoice_items (id, tenant_id, parent_id, idx, item_code, qty,
                                                    rate, amount, expense_account, against_purchase_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(item.qty)
            .bind(item.rate)
            .bind(item.amount)
            .bind(&item.expense_account)
            .bind(&item.against_purchase_order)
            .execute(&mut *conn)
            .await?;
        }

        self.save_taxes(conn, tenant_id, VoucherType::PurchaseInvoice, doc.id, &doc.taxes)
            .await
    }

    // =========================================================================
    //  PAGAMENTO / DIÁRIO / COTAÇÃO
    // =========================================================================

    pub async fn save_payment_entry(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &PaymentEntry,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_entries (id, tenant_id, name, direction, party, paid_from,
                                         paid_to, paid_amount, status, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(doc.direction)
        .bind(&doc.party)
        .bind(&doc.paid_from)
        .bind(&doc.paid_to)
        .bind(doc.paid_amount)
        .bind(doc.status)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for reference in &doc.references {
            sqlx::query(
                r#"
                INSERT INTO payment_entry_references (id, tenant_id, parent_id, idx,
                                                      ref_voucher_type, ref_voucher_no, allocated_amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(reference.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(reference.idx)
            .bind(reference.ref_voucher_type)
            .bind(&reference.ref_voucher_no)
            .bind(reference.allocated_amount)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn get_payment_entry(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<PaymentEntry>, AppError> {
        #[derive(sqlx::FromRow)]
        struct Header {
            id: Uuid,
            name: String,
            direction: PaymentDirection,
            party: Option<String>,
            paid_from: Option<String>,
            paid_to: Option<String>,
            paid_amount: Decimal,
            status: DocStatus,
            posting_date: NaiveDate,
            posting_ts: chrono::DateTime<chrono::Utc>,
        }

        let Some(header) = sqlx::query_as::<_, Header>(
            r#"
            SELECT id, name, direction, party, paid_from, paid_to, paid_amount, status,
                   posting_date, posting_ts
            FROM payment_entries WHERE tenant_id = $1 AND name = $2
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let references = sqlx::query_as::<_, PaymentReference>(
            r#"
            SELECT id, idx, ref_voucher_type, ref_voucher_no, allocated_amount
            FROM payment_entry_references
            WHERE tenant_id = $1 AND parent_id = $2
            ORDER BY idx ASC
            "#,
        )
        .bind(tenant_id)
        .bind(header.id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(PaymentEntry {
            id: header.id,
            name: header.name,
            direction: header.direction,
            party: header.party,
            paid_from: header.paid_from,
            paid_to: header.paid_to,
            paid_amount: header.paid_amount,
            status: header.status,
            posting_date: header.posting_date,
            posting_ts: header.posting_ts,
            references,
        }))
    }

    pub async fn save_journal_entry(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &JournalEntry,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO journal_entries (id, tenant_id, name, status, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(doc.status)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for account in &doc.accounts {
            sqlx::query(
                r#"
                INSERT INTO journal_entry_accounts (id, tenant_id, parent_id, idx, account_code,
                                                    debit, credit, remarks)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(account.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(account.idx)
            .bind(&account.account_code)
            .bind(account.debit)
            .bind(account.credit)
            .bind(&account.remarks)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn save_quotation(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &Quotation,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO quotations (id, tenant_id, name, customer, status, net_total,
                                    total_taxes, grand_total, posting_date, posting_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.customer)
        .bind(doc.status)
        .bind(doc.net_total)
        .bind(doc.total_taxes)
        .bind(doc.grand_total)
        .bind(doc.posting_date)
        .bind(doc.posting_ts)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for item in &doc.items {
            sqlx::query(
                r#"
                INSERT INTO quotation_items (id, tenant_id, parent_id, idx, item_code, qty, rate, amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id)
            .bind(tenant_id)
            .bind(doc.id)
            .bind(item.idx)
            .bind(&item.item_code)
            .bind(item.qty)
            .bind(item.rate)
            .bind(item.amount)
            .execute(&mut *conn)
            .await?;
        }

        self.save_taxes(conn, tenant_id, VoucherType::Quotation, doc.id, &doc.taxes)
            .await
    }

    // =========================================================================
    //  BANCO
    // =========================================================================

    pub async fn get_bank_account<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<BankAccount>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account = sqlx::query_as::<_, BankAccount>(
            "SELECT * FROM bank_accounts WHERE tenant_id = $1 AND code = $2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(executor)
        .await?;
        Ok(account)
    }

    pub async fn get_bank_transaction<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Option<BankTransaction>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let tx = sqlx::query_as::<_, BankTransaction>(
            "SELECT * FROM bank_transactions WHERE tenant_id = $1 AND name = $2",
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(executor)
        .await?;
        Ok(tx)
    }

    pub async fn mark_bank_transaction_reconciled<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE bank_transactions SET status = 'RECONCILED' WHERE tenant_id = $1 AND name = $2",
        )
        .bind(tenant_id)
        .bind(name)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn sync_bank_account<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        code: &str,
        balance_delta: Decimal,
        sync_date: NaiveDate,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE bank_accounts
            SET bank_balance = bank_balance + $1, last_sync_date = $2
            WHERE tenant_id = $3 AND code = $4
            "#,
        )
        .bind(balance_delta)
        .bind(sync_date)
        .bind(tenant_id)
        .bind(code)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::UnknownVoucher(code.to_string()));
        }
        Ok(())
    }

    pub async fn save_bank_reconciliation(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        doc: &BankReconciliation,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO bank_reconciliations (id, tenant_id, name, bank_account_code, status, posting_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(doc.id)
        .bind(tenant_id)
        .bind(&doc.name)
        .bind(&doc.bank_account_code)
        .bind(doc.status)
        .bind(doc.posting_date)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            // Documento já persistido (replay): não duplica as linhas
            return Ok(());
        }

        for (idx, tx_no) in doc.transaction_nos.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO bank_reconciliation_items (tenant_id, parent_id, idx, bank_transaction_no)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(tenant_id)
            .bind(doc.id)
            .bind(idx as i32)
            .bind(tx_no)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}
