// src/services/status.rs
//
// Resolução de status derivada do progresso agregado das linhas. Funções
// puras: os orquestradores calculam aqui e persistem via documents_repo.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::documents::{InvoiceStatus, OrderStatus};

/// Progresso de uma linha de pedido: quantidade pedida, quantidade
/// atendida (entregue ou recebida) e quantidade faturada.
#[derive(Debug, Clone, Copy)]
pub struct LineProgress {
    pub qty: Decimal,
    pub fulfilled_qty: Decimal,
    pub billed_qty: Decimal,
}

/// Status de Sales Order a partir das linhas:
/// tudo entregue E faturado -> Completed; tudo entregue -> To Bill;
/// senão -> To Deliver.
pub fn sales_order_status(lines: &[LineProgress]) -> OrderStatus {
    order_status(lines, OrderStatus::ToDeliver)
}

/// Purchase Order espelha com To Receive no lugar de To Deliver.
pub fn purchase_order_status(lines: &[LineProgress]) -> OrderStatus {
    order_status(lines, OrderStatus::ToReceive)
}

fn order_status(lines: &[LineProgress], pending: OrderStatus) -> OrderStatus {
    if lines.is_empty() {
        return pending;
    }

    let all_fulfilled = lines.iter().all(|l| l.fulfilled_qty >= l.qty);
    let all_billed = lines.iter().all(|l| l.billed_qty >= l.qty);

    match (all_fulfilled, all_billed) {
        (true, true) => OrderStatus::Completed,
        (true, false) => OrderStatus::ToBill,
        _ => pending,
    }
}

/// Status de fatura a partir do saldo em aberto:
/// quitada -> Paid; vencida -> Overdue; paga em parte -> Partly Paid;
/// senão -> Unpaid.
pub fn invoice_status(
    outstanding: Decimal,
    grand_total: Decimal,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> InvoiceStatus {
    if outstanding <= Decimal::ZERO {
        return InvoiceStatus::Paid;
    }
    if let Some(due) = due_date {
        if due < today {
            return InvoiceStatus::Overdue;
        }
    }
    if outstanding < grand_total {
        return InvoiceStatus::PartlyPaid;
    }
    InvoiceStatus::Unpaid
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(qty: Decimal, fulfilled: Decimal, billed: Decimal) -> LineProgress {
        LineProgress { qty, fulfilled_qty: fulfilled, billed_qty: billed }
    }

    #[test]
    fn sales_order_walks_to_deliver_to_bill_completed() {
        let lines = vec![line(dec!(10), dec!(0), dec!(0))];
        assert_eq!(sales_order_status(&lines), OrderStatus::ToDeliver);

        let lines = vec![line(dec!(10), dec!(10), dec!(0))];
        assert_eq!(sales_order_status(&lines), OrderStatus::ToBill);

        let lines = vec![line(dec!(10), dec!(10), dec!(10))];
        assert_eq!(sales_order_status(&lines), OrderStatus::Completed);
    }

    #[test]
    fn partial_delivery_keeps_to_deliver() {
        let lines = vec![
            line(dec!(10), dec!(10), dec!(10)),
            line(dec!(5), dec!(2), dec!(0)),
        ];
        assert_eq!(sales_order_status(&lines), OrderStatus::ToDeliver);
    }

    #[test]
    fn billed_without_delivery_is_still_pending() {
        // Faturou tudo mas não entregou: continua To Deliver
        let lines = vec![line(dec!(10), dec!(0), dec!(10))];
        assert_eq!(sales_order_status(&lines), OrderStatus::ToDeliver);
    }

    #[test]
    fn purchase_order_uses_to_receive() {
        let lines = vec![line(dec!(4), dec!(0), dec!(0))];
        assert_eq!(purchase_order_status(&lines), OrderStatus::ToReceive);

        let lines = vec![line(dec!(4), dec!(4), dec!(0))];
        assert_eq!(purchase_order_status(&lines), OrderStatus::ToBill);
    }

    #[test]
    fn invoice_status_resolution() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let due_future = Some(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        let due_past = Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());

        assert_eq!(
            invoice_status(dec!(0), dec!(165), due_future, today),
            InvoiceStatus::Paid
        );
        // Quitada vence até a data: Paid ganha de Overdue
        assert_eq!(
            invoice_status(dec!(0), dec!(165), due_past, today),
            InvoiceStatus::Paid
        );
        assert_eq!(
            invoice_status(dec!(65), dec!(165), due_past, today),
            InvoiceStatus::Overdue
        );
        assert_eq!(
            invoice_status(dec!(65), dec!(165), due_future, today),
            InvoiceStatus::PartlyPaid
        );
        assert_eq!(
            invoice_status(dec!(165), dec!(165), due_future, today),
            InvoiceStatus::Unpaid
        );
        assert_eq!(invoice_status(dec!(165), dec!(165), None, today), InvoiceStatus::Unpaid);
    }
}
