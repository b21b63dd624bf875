// src/services/vouchers.rs
//
// A orquestração de vouchers: o trait VoucherHandler (beforeSave / onSubmit /
// onCancel), o registro fechado de handlers montado no startup e o serviço
// que abre a transação do tenant e despacha. Também vivem aqui as contas
// puras de totais e impostos que todo documento comercial usa.

pub mod bank_reconciliation;
pub mod delivery_note;
pub mod invoice;
pub mod journal_entry;
pub mod pack_list;
pub mod payment_entry;
pub mod pick_list;
pub mod purchase_invoice;
pub mod purchase_order;
pub mod purchase_receipt;
pub mod quotation;
pub mod sales_order;
pub mod stock_reconciliation;
pub mod stock_reservation;
pub mod stock_transfer;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{db_utils::{begin_tenant_tx, map_transient}, error::AppError},
    db::{AuditRepository, DocumentsRepository, MastersRepository},
    models::documents::{TaxChargeType, TaxRow, VoucherDoc, VoucherType},
    models::tenancy::{Tenant, UserContext},
    services::{
        cancel_service::CancelService, gl_service::GlService, naming,
        stock_service::StockService,
    },
};

// =============================================================================
//  TOTAIS E IMPOSTOS (puro)
// =============================================================================

/// Aplica as linhas de imposto NA ORDEM sobre o net_total e devolve
/// (total_taxes, grand_total). Cada linha também ganha tax_amount e
/// row_total (acumulado corrente).
pub fn apply_taxes(net_total: Decimal, taxes: &mut [TaxRow]) -> (Decimal, Decimal) {
    let hundred = Decimal::ONE_HUNDRED;
    let mut running = net_total;
    let mut total_taxes = Decimal::ZERO;

    for tax in taxes.iter_mut() {
        let amount = match tax.charge_type {
            TaxChargeType::OnNetTotal => net_total * tax.rate / hundred,
            TaxChargeType::OnPreviousRowTotal => running * tax.rate / hundred,
            // Valor informado direto; rate é ignorado
            TaxChargeType::Actual => tax.tax_amount,
        };
        tax.tax_amount = amount;
        running += amount;
        tax.row_total = running;
        total_taxes += amount;
    }

    (total_taxes, running)
}

// =============================================================================
//  CONTEXTO E TRAIT
// =============================================================================

/// As dependências injetadas em todo handler. O registro é uma tabela
/// simples montada no startup; nada de singleton global.
#[derive(Clone)]
pub struct VoucherContext {
    pub masters: MastersRepository,
    pub docs: DocumentsRepository,
    pub stock: StockService,
    pub cancel: CancelService,
    pub gl: GlService,
    pub audit: AuditRepository,
}

#[async_trait]
pub trait VoucherHandler: Send + Sync {
    fn kind(&self) -> VoucherType;

    /// Nome, valores de linha, totais, validações estruturais. Roda antes da
    /// persistência do documento.
    async fn before_save(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        _doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        Ok(())
    }

    /// Movimenta os livros (estoque, GL) e progride os status.
    async fn on_submit(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        _doc: &mut VoucherDoc,
    ) -> Result<(), AppError> {
        Ok(())
    }

    /// Reversa guardada pela chave CANCEL:<tipo>:<numero>.
    async fn on_cancel(
        &self,
        _ctx: &VoucherContext,
        _conn: &mut PgConnection,
        _tenant: &Tenant,
        _voucher_no: &str,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

/// Helper dos handlers: garante nome no padrão PREFIX-NNNNNN.
pub fn ensure_name(name: &mut String, voucher_type: VoucherType) {
    if name.is_empty() {
        *name = naming::voucher_name(voucher_type, Utc::now());
    }
}

/// Extrai a variante esperada ou acusa erro de programação do registro.
macro_rules! expect_doc {
    ($doc:expr, $variant:ident) => {
        match $doc {
            $crate::models::documents::VoucherDoc::$variant(inner) => inner,
            other => {
                return Err($crate::common::error::AppError::InternalServerError(
                    anyhow::anyhow!("handler recebeu documento {:?}", other.voucher_type()),
                ))
            }
        }
    };
}
pub(crate) use expect_doc;

/// Recarrega o SO e recalcula o status a partir do progresso das linhas.
pub async fn refresh_sales_order_status(
    ctx: &VoucherContext,
    conn: &mut PgConnection,
    tenant_id: Uuid,
    so_name: &str,
) -> Result<(), AppError> {
    let Some(so) = ctx.docs.get_sales_order(conn, tenant_id, so_name).await? else {
        return Err(AppError::UnknownVoucher(so_name.to_string()));
    };
    if so.status == crate::models::documents::OrderStatus::Cancelled {
        return Ok(());
    }

    let lines: Vec<_> = so
        .items
        .iter()
        .map(|l| crate::services::status::LineProgress {
            qty: l.qty,
            fulfilled_qty: l.delivered_qty,
            billed_qty: l.billed_qty,
        })
        .collect();
    let new_status = crate::services::status::sales_order_status(&lines);
    ctx.docs
        .set_order_status(&mut *conn, tenant_id, VoucherType::SalesOrder, so_name, new_status)
        .await
}

/// Idem para o PO (received/billed).
pub async fn refresh_purchase_order_status(
    ctx: &VoucherContext,
    conn: &mut PgConnection,
    tenant_id: Uuid,
    po_name: &str,
) -> Result<(), AppError> {
    let Some(po) = ctx.docs.get_purchase_order(conn, tenant_id, po_name).await? else {
        return Err(AppError::UnknownVoucher(po_name.to_string()));
    };
    if po.status == crate::models::documents::OrderStatus::Cancelled {
        return Ok(());
    }

    let lines: Vec<_> = po
        .items
        .iter()
        .map(|l| crate::services::status::LineProgress {
            qty: l.qty,
            fulfilled_qty: l.received_qty,
            billed_qty: l.billed_qty,
        })
        .collect();
    let new_status = crate::services::status::purchase_order_status(&lines);
    ctx.docs
        .set_order_status(&mut *conn, tenant_id, VoucherType::PurchaseOrder, po_name, new_status)
        .await
}

// =============================================================================
//  REGISTRO + SERVIÇO
// =============================================================================

pub struct VoucherRegistry {
    handlers: HashMap<VoucherType, Arc<dyn VoucherHandler>>,
}

impl VoucherRegistry {
    /// Tabela fechada, montada uma vez no startup.
    pub fn build() -> Self {
        let handlers: Vec<Arc<dyn VoucherHandler>> = vec![
            Arc::new(purchase_receipt::PurchaseReceiptHandler),
            Arc::new(delivery_note::DeliveryNoteHandler),
            Arc::new(stock_transfer::StockTransferHandler),
            Arc::new(stock_reconciliation::StockReconciliationHandler),
            Arc::new(stock_reservation::StockReservationHandler),
            Arc::new(pick_list::PickListHandler),
            Arc::new(pack_list::PackListHandler),
            Arc::new(sales_order::SalesOrderHandler),
            Arc::new(purchase_order::PurchaseOrderHandler),
            Arc::new(invoice::InvoiceHandler),
            Arc::new(purchase_invoice::PurchaseInvoiceHandler),
            Arc::new(payment_entry::PaymentEntryHandler),
            Arc::new(journal_entry::JournalEntryHandler),
            Arc::new(quotation::QuotationHandler),
            Arc::new(bank_reconciliation::BankReconciliationHandler),
        ];

        Self {
            handlers: handlers.into_iter().map(|h| (h.kind(), h)).collect(),
        }
    }

    fn get(&self, voucher_type: VoucherType) -> Result<&Arc<dyn VoucherHandler>, AppError> {
        self.handlers.get(&voucher_type).ok_or_else(|| {
            AppError::InternalServerError(anyhow::anyhow!(
                "nenhum handler registrado para {:?}",
                voucher_type
            ))
        })
    }
}

/// Fachada pública: uma submissão = UMA transação curta. Estoque, GL, status
/// e marcador de idempotência commitam ou abortam juntos.
#[derive(Clone)]
pub struct VoucherService {
    pool: PgPool,
    ctx: VoucherContext,
    registry: Arc<VoucherRegistry>,
    statement_timeout_ms: u64,
}

impl VoucherService {
    pub fn new(
        pool: PgPool,
        ctx: VoucherContext,
        registry: Arc<VoucherRegistry>,
        statement_timeout_ms: u64,
    ) -> Self {
        Self { pool, ctx, registry, statement_timeout_ms }
    }

    async fn tenant_tx(
        &self,
        user: &UserContext,
    ) -> Result<(sqlx::Transaction<'static, sqlx::Postgres>, Uuid), AppError> {
        let tenant_id = user.require_tenant()?;
        let tx = begin_tenant_tx(&self.pool, tenant_id, self.statement_timeout_ms).await?;
        Ok((tx, tenant_id))
    }

    /// beforeSave + persistência do rascunho.
    pub async fn save(&self, user: &UserContext, doc: &mut VoucherDoc) -> Result<(), AppError> {
        let (mut tx, tenant_id) = self.tenant_tx(user).await?;
        let tenant = self.ctx.masters.get_tenant(&mut *tx, tenant_id).await?;
        let handler = self.registry.get(doc.voucher_type())?;

        handler.before_save(&self.ctx, &mut tx, &tenant, doc).await?;
        persist_draft(&self.ctx.docs, &mut tx, tenant_id, doc).await?;

        self.ctx
            .audit
            .record(&mut *tx, tenant_id, "save", doc_type_tag(doc.voucher_type()), doc.name(), None)
            .await?;

        tx.commit().await.map_err(map_transient)?;
        tracing::info!("📄 Documento salvo: {}", doc.name());
        Ok(())
    }

    /// beforeSave + persistência + onSubmit, tudo na mesma transação. O
    /// submit inteiro é guardado por SUBMIT:<tipo>:<numero>: o replay com o
    /// mesmo payload devolve sucesso sem criar linha nenhuma (nem de GL).
    pub async fn submit(&self, user: &UserContext, doc: &mut VoucherDoc) -> Result<(), AppError> {
        let (mut tx, tenant_id) = self.tenant_tx(user).await?;
        let tenant = self.ctx.masters.get_tenant(&mut *tx, tenant_id).await?;
        let handler = self.registry.get(doc.voucher_type())?;

        handler.before_save(&self.ctx, &mut tx, &tenant, doc).await?;
        persist_draft(&self.ctx.docs, &mut tx, tenant_id, doc).await?;

        let submit_key = naming::submit_key(doc.voucher_type(), doc.name());
        if !self
            .ctx
            .stock
            .claim_posting_key(&mut tx, tenant_id, &submit_key)
            .await?
        {
            tx.commit().await.map_err(map_transient)?;
            tracing::info!("Replay de submit ignorado: {}", submit_key);
            return Ok(());
        }

        handler.on_submit(&self.ctx, &mut tx, &tenant, doc).await?;

        self.ctx
            .audit
            .record(
                &mut *tx, tenant_id, "submit", doc_type_tag(doc.voucher_type()), doc.name(),
                Some(serde_json::json!({ "voucherType": doc.voucher_type() })),
            )
            .await?;

        tx.commit().await.map_err(map_transient)?;
        tracing::info!("✅ Voucher submetido: {}", doc.name());
        Ok(())
    }

    /// onCancel: reversa idempotente.
    pub async fn cancel(
        &self,
        user: &UserContext,
        voucher_type: VoucherType,
        voucher_no: &str,
    ) -> Result<(), AppError> {
        let (mut tx, tenant_id) = self.tenant_tx(user).await?;
        let tenant = self.ctx.masters.get_tenant(&mut *tx, tenant_id).await?;
        let handler = self.registry.get(voucher_type)?;

        handler.on_cancel(&self.ctx, &mut tx, &tenant, voucher_no).await?;

        self.ctx
            .audit
            .record(&mut *tx, tenant_id, "cancel", doc_type_tag(voucher_type), voucher_no, None)
            .await?;

        tx.commit().await.map_err(map_transient)?;
        tracing::info!("↩️ Voucher cancelado: {}", voucher_no);
        Ok(())
    }
}

fn doc_type_tag(voucher_type: VoucherType) -> &'static str {
    match voucher_type {
        VoucherType::PurchaseReceipt => "Purchase Receipt",
        VoucherType::DeliveryNote => "Delivery Note",
        VoucherType::StockTransfer => "Stock Transfer",
        VoucherType::StockReconciliation => "Stock Reconciliation",
        VoucherType::StockReservation => "Stock Reservation",
        VoucherType::PickList => "Pick List",
        VoucherType::PackList => "Pack List",
        VoucherType::SalesOrder => "Sales Order",
        VoucherType::PurchaseOrder => "Purchase Order",
        VoucherType::Invoice => "Invoice",
        VoucherType::PurchaseInvoice => "Purchase Invoice",
        VoucherType::PaymentEntry => "Payment Entry",
        VoucherType::JournalEntry => "Journal Entry",
        VoucherType::Quotation => "Quotation",
        VoucherType::BankTransaction => "Bank Transaction",
        VoucherType::BankReconciliation => "Bank Reconciliation",
    }
}

async fn persist_draft(
    docs: &DocumentsRepository,
    conn: &mut PgConnection,
    tenant_id: Uuid,
    doc: &VoucherDoc,
) -> Result<(), AppError> {
    match doc {
        VoucherDoc::PurchaseReceipt(d) => docs.save_purchase_receipt(conn, tenant_id, d).await,
        VoucherDoc::DeliveryNote(d) => docs.save_delivery_note(conn, tenant_id, d).await,
        VoucherDoc::StockTransfer(d) => docs.save_stock_transfer(conn, tenant_id, d).await,
        VoucherDoc::StockReconciliation(d) => {
            docs.save_stock_reconciliation(conn, tenant_id, d).await
        }
        VoucherDoc::StockReservation(d) => docs.save_stock_reservation(conn, tenant_id, d).await,
        VoucherDoc::PickList(d) => docs.save_pick_list(conn, tenant_id, d).await,
        VoucherDoc::PackList(d) => docs.save_pack_list(&mut *conn, tenant_id, d).await,
        VoucherDoc::SalesOrder(d) => docs.save_sales_order(conn, tenant_id, d).await,
        VoucherDoc::PurchaseOrder(d) => docs.save_purchase_order(conn, tenant_id, d).await,
        VoucherDoc::Invoice(d) => docs.save_invoice(conn, tenant_id, d).await,
        VoucherDoc::PurchaseInvoice(d) => docs.save_purchase_invoice(conn, tenant_id, d).await,
        VoucherDoc::PaymentEntry(d) => docs.save_payment_entry(conn, tenant_id, d).await,
        VoucherDoc::JournalEntry(d) => docs.save_journal_entry(conn, tenant_id, d).await,
        VoucherDoc::Quotation(d) => docs.save_quotation(conn, tenant_id, d).await,
        VoucherDoc::BankReconciliation(d) => {
            docs.save_bank_reconciliation(conn, tenant_id, d).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tax(charge_type: TaxChargeType, rate: Decimal, amount: Decimal) -> TaxRow {
        TaxRow {
            charge_type,
            account_head: "Tax Payable".into(),
            rate,
            tax_amount: amount,
            row_total: Decimal::ZERO,
        }
    }

    #[test]
    fn on_net_total_tax_over_150_is_15() {
        // Duas linhas ($100 e $50) + imposto de 10%
        let mut taxes = vec![tax(TaxChargeType::OnNetTotal, dec!(10), Decimal::ZERO)];
        let (total_taxes, grand_total) = apply_taxes(dec!(150), &mut taxes);

        assert_eq!(total_taxes, dec!(15.0));
        assert_eq!(grand_total, dec!(165.0));
        assert_eq!(taxes[0].tax_amount, dec!(15.0));
        assert_eq!(taxes[0].row_total, dec!(165.0));
    }

    #[test]
    fn on_previous_row_total_compounds() {
        let mut taxes = vec![
            tax(TaxChargeType::OnNetTotal, dec!(10), Decimal::ZERO),
            tax(TaxChargeType::OnPreviousRowTotal, dec!(5), Decimal::ZERO),
        ];
        let (total_taxes, grand_total) = apply_taxes(dec!(100), &mut taxes);

        // 10% de 100 = 10; 5% de 110 = 5.50
        assert_eq!(taxes[0].tax_amount, dec!(10.0));
        assert_eq!(taxes[1].tax_amount, dec!(5.50));
        assert_eq!(total_taxes, dec!(15.50));
        assert_eq!(grand_total, dec!(115.50));
    }

    #[test]
    fn actual_tax_keeps_informed_amount() {
        let mut taxes = vec![tax(TaxChargeType::Actual, dec!(99), dec!(7.25))];
        let (total_taxes, grand_total) = apply_taxes(dec!(200), &mut taxes);

        assert_eq!(total_taxes, dec!(7.25));
        assert_eq!(grand_total, dec!(207.25));
    }

    #[test]
    fn registry_covers_every_orchestrated_kind() {
        let registry = VoucherRegistry::build();
        for kind in [
            VoucherType::PurchaseReceipt,
            VoucherType::DeliveryNote,
            VoucherType::StockTransfer,
            VoucherType::StockReconciliation,
            VoucherType::StockReservation,
            VoucherType::PickList,
            VoucherType::PackList,
            VoucherType::SalesOrder,
            VoucherType::PurchaseOrder,
            VoucherType::Invoice,
            VoucherType::PurchaseInvoice,
            VoucherType::PaymentEntry,
            VoucherType::JournalEntry,
            VoucherType::Quotation,
            VoucherType::BankReconciliation,
        ] {
            assert!(registry.get(kind).is_ok(), "sem handler para {kind:?}");
        }
    }
}
