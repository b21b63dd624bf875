// src/models/documents.rs
//
// Structs por voucher, com campos explícitos. O motor de metadados genérico
// (documentos definidos pelo usuário) fica fora do núcleo; aqui só existe o
// conjunto fechado de documentos que movimenta os livros.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "voucher_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherType {
    PurchaseReceipt,
    DeliveryNote,
    StockTransfer,
    StockReconciliation,
    StockReservation,
    PickList,
    PackList,
    SalesOrder,
    PurchaseOrder,
    Invoice,
    PurchaseInvoice,
    PaymentEntry,
    JournalEntry,
    Quotation,
    BankTransaction,
    BankReconciliation,
}

impl VoucherType {
    /// Prefixo usado na geração do nome do documento (PR-123456, INV-...).
    pub fn prefix(&self) -> &'static str {
        match self {
            VoucherType::PurchaseReceipt => "PR",
            VoucherType::DeliveryNote => "DN",
            VoucherType::StockTransfer => "ST",
            VoucherType::StockReconciliation => "SR",
            VoucherType::StockReservation => "SRV",
            VoucherType::PickList => "PL",
            VoucherType::PackList => "PK",
            VoucherType::SalesOrder => "SO",
            VoucherType::PurchaseOrder => "PO",
            VoucherType::Invoice => "INV",
            VoucherType::PurchaseInvoice => "PINV",
            VoucherType::PaymentEntry => "PE",
            VoucherType::JournalEntry => "JE",
            VoucherType::Quotation => "QTN",
            VoucherType::BankTransaction => "BT",
            VoucherType::BankReconciliation => "RECON",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "doc_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocStatus {
    Draft,
    Submitted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    ToDeliver,
    ToReceive,
    ToBill,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Unpaid,
    PartlyPaid,
    Paid,
    Overdue,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_direction", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentDirection {
    Receive,
    Pay,
}

// A ordem de aplicação importa: cada tipo lê uma base diferente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tax_charge_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxChargeType {
    OnNetTotal,
    OnPreviousRowTotal,
    Actual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bank_tx_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankTxStatus {
    Pending,
    Reconciled,
}

// --- Linha de imposto (compartilhada por SO/PO/INV/PINV/QTN) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TaxRow {
    pub charge_type: TaxChargeType,
    pub account_head: String,
    pub rate: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub row_total: Decimal,
}

// =============================================================================
//  VOUCHERS DE ESTOQUE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub id: Uuid,
    pub name: String,
    pub supplier: Option<String>,
    pub status: DocStatus,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<PurchaseReceiptItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceiptItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub warehouse_code: String,
    pub location_code: Option<String>,
    pub batch_no: Option<String>,
    pub batch_expiry: Option<NaiveDate>,
    pub uom_code: Option<String>,
    pub conversion_factor: Option<Decimal>,
    pub qty: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    #[serde(default)]
    pub serial_nos: Vec<String>,
    pub against_purchase_order: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryNote {
    pub id: Uuid,
    pub name: String,
    pub customer: Option<String>,
    pub status: DocStatus,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<DeliveryNoteItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryNoteItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub warehouse_code: String,
    pub location_code: Option<String>,
    pub batch_no: Option<String>,
    pub uom_code: Option<String>,
    pub conversion_factor: Option<Decimal>,
    pub qty: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    // Carimbado pelo orquestrador com o custo ponderado da baixa; é a base
    // do lançamento de CPV (COGS)
    pub valuation_amount: Option<Decimal>,
    #[serde(default)]
    pub serial_nos: Vec<String>,
    pub against_sales_order: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransferDoc {
    pub id: Uuid,
    pub name: String,
    pub status: DocStatus,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<StockTransferItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockTransferItem {
    pub id: Uuid,
    pub idx: i32,
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
pub struct StockReconciliationDoc {
    pub id: Uuid,
    pub name: String,
    pub status: DocStatus,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<StockReconciliationItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockReconciliationItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub warehouse_code: String,
    pub location_code: String,
    pub batch_no: Option<String>,
    pub target_qty: Decimal,
    pub increase_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReservationDoc {
    pub id: Uuid,
    pub name: String,
    pub against_voucher_type: Option<VoucherType>,
    pub against_voucher_no: Option<String>,
    pub status: DocStatus,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<StockReservationItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockReservationItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub warehouse_code: String,
    pub location_code: Option<String>,
    pub batch_no: Option<String>,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickList {
    pub id: Uuid,
    pub name: String,
    pub sales_order: Option<String>,
    pub status: DocStatus,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<PickListItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PickListItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub warehouse_code: String,
    pub from_location_code: Option<String>,
    pub batch_no: Option<String>,
    pub qty: Decimal,
    #[serde(default)]
    pub serial_nos: Vec<String>,
}

/// Romaneio de embalagem: só metadados, não movimenta livro nenhum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackList {
    pub id: Uuid,
    pub name: String,
    pub pick_list: Option<String>,
    pub status: DocStatus,
    pub meta: Option<serde_json::Value>,
}

// =============================================================================
//  PEDIDOS / FATURAS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrder {
    pub id: Uuid,
    pub name: String,
    pub customer: String,
    pub status: OrderStatus,
    // Se verdadeiro, o submit reserva o estoque das linhas
    pub reserve_stock: bool,
    pub net_total: Decimal,
    pub total_taxes: Decimal,
    pub grand_total: Decimal,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<SalesOrderItem>,
    pub taxes: Vec<TaxRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub warehouse_code: Option<String>,
    pub qty: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub delivered_qty: Decimal,
    pub billed_qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub name: String,
    pub supplier: String,
    pub status: OrderStatus,
    pub net_total: Decimal,
    pub total_taxes: Decimal,
    pub grand_total: Decimal,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<PurchaseOrderItem>,
    pub taxes: Vec<TaxRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub warehouse_code: Option<String>,
    pub qty: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub received_qty: Decimal,
    pub billed_qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub name: String,
    pub customer: String,
    // Conta devedora (Contas a Receber)
    pub debit_to: String,
    pub status: InvoiceStatus,
    pub net_total: Decimal,
    pub total_taxes: Decimal,
    pub grand_total: Decimal,
    pub outstanding_amount: Decimal,
    pub posting_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<InvoiceItem>,
    pub taxes: Vec<TaxRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub qty: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub income_account: Option<String>,
    pub against_sales_order: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseInvoice {
    pub id: Uuid,
    pub name: String,
    pub supplier: String,
    // Conta credora (Contas a Pagar)
    pub credit_to: String,
    pub status: InvoiceStatus,
    pub net_total: Decimal,
    pub total_taxes: Decimal,
    pub grand_total: Decimal,
    pub outstanding_amount: Decimal,
    pub posting_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<PurchaseInvoiceItem>,
    pub taxes: Vec<TaxRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseInvoiceItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub qty: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub expense_account: Option<String>,
    pub against_purchase_order: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntry {
    pub id: Uuid,
    pub name: String,
    pub direction: PaymentDirection,
    pub party: Option<String>,
    pub paid_from: Option<String>,
    pub paid_to: Option<String>,
    pub paid_amount: Decimal,
    pub status: DocStatus,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub references: Vec<PaymentReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReference {
    pub id: Uuid,
    pub idx: i32,
    pub ref_voucher_type: VoucherType,
    pub ref_voucher_no: String,
    pub allocated_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: Uuid,
    pub name: String,
    pub status: DocStatus,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub accounts: Vec<JournalEntryAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntryAccount {
    pub id: Uuid,
    pub idx: i32,
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    pub id: Uuid,
    pub name: String,
    pub customer: String,
    pub status: DocStatus,
    pub net_total: Decimal,
    pub total_taxes: Decimal,
    pub grand_total: Decimal,
    pub posting_date: NaiveDate,
    pub posting_ts: DateTime<Utc>,
    pub items: Vec<QuotationItem>,
    pub taxes: Vec<TaxRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuotationItem {
    pub id: Uuid,
    pub idx: i32,
    pub item_code: String,
    pub qty: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

// =============================================================================
//  BANCO
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub account_code: Option<String>,
    pub bank_balance: Decimal,
    pub last_sync_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BankTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub bank_account_code: String,
    pub tx_date: NaiveDate,
    pub amount: Decimal,
    pub status: BankTxStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankReconciliation {
    pub id: Uuid,
    pub name: String,
    pub bank_account_code: String,
    pub status: DocStatus,
    pub posting_date: NaiveDate,
    pub transaction_nos: Vec<String>,
}

// =============================================================================
//  O CONJUNTO FECHADO DE DOCUMENTOS
// =============================================================================

/// Variante fechada sobre os tipos de documento que o núcleo orquestra.
/// Substitui o despacho dinâmico por string do motor de metadados.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "docType")]
pub enum VoucherDoc {
    PurchaseReceipt(PurchaseReceipt),
    DeliveryNote(DeliveryNote),
    StockTransfer(StockTransferDoc),
    StockReconciliation(StockReconciliationDoc),
    StockReservation(StockReservationDoc),
    PickList(PickList),
    PackList(PackList),
    SalesOrder(SalesOrder),
    PurchaseOrder(PurchaseOrder),
    Invoice(Invoice),
    PurchaseInvoice(PurchaseInvoice),
    PaymentEntry(PaymentEntry),
    JournalEntry(JournalEntry),
    Quotation(Quotation),
    BankReconciliation(BankReconciliation),
}

impl VoucherDoc {
    pub fn voucher_type(&self) -> VoucherType {
        match self {
            VoucherDoc::PurchaseReceipt(_) => VoucherType::PurchaseReceipt,
            VoucherDoc::DeliveryNote(_) => VoucherType::DeliveryNote,
            VoucherDoc::StockTransfer(_) => VoucherType::StockTransfer,
            VoucherDoc::StockReconciliation(_) => VoucherType::StockReconciliation,
            VoucherDoc::StockReservation(_) => VoucherType::StockReservation,
            VoucherDoc::PickList(_) => VoucherType::PickList,
            VoucherDoc::PackList(_) => VoucherType::PackList,
            VoucherDoc::SalesOrder(_) => VoucherType::SalesOrder,
            VoucherDoc::PurchaseOrder(_) => VoucherType::PurchaseOrder,
            VoucherDoc::Invoice(_) => VoucherType::Invoice,
            VoucherDoc::PurchaseInvoice(_) => VoucherType::PurchaseInvoice,
            VoucherDoc::PaymentEntry(_) => VoucherType::PaymentEntry,
            VoucherDoc::JournalEntry(_) => VoucherType::JournalEntry,
            VoucherDoc::Quotation(_) => VoucherType::Quotation,
            VoucherDoc::BankReconciliation(_) => VoucherType::BankReconciliation,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            VoucherDoc::PurchaseReceipt(d) => &d.name,
            VoucherDoc::DeliveryNote(d) => &d.name,
            VoucherDoc::StockTransfer(d) => &d.name,
            VoucherDoc::StockReconciliation(d) => &d.name,
            VoucherDoc::StockReservation(d) => &d.name,
            VoucherDoc::PickList(d) => &d.name,
            VoucherDoc::PackList(d) => &d.name,
            VoucherDoc::SalesOrder(d) => &d.name,
            VoucherDoc::PurchaseOrder(d) => &d.name,
            VoucherDoc::Invoice(d) => &d.name,
            VoucherDoc::PurchaseInvoice(d) => &d.name,
            VoucherDoc::PaymentEntry(d) => &d.name,
            VoucherDoc::JournalEntry(d) => &d.name,
            VoucherDoc::Quotation(d) => &d.name,
            VoucherDoc::BankReconciliation(d) => &d.name,
        }
    }
}
