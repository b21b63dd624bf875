// src/services/report_service.rs
//
// Read models dos relatórios, montados só a partir dos livros: balancete,
// balanço patrimonial, DRE, razão com saldo corrente, fluxo de caixa e
// aging de títulos. As partes aritméticas são funções puras.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::report_repo::{LedgerLine, OpenInvoiceRow, ReportRepository},
    models::documents::VoucherType,
    models::finance::{
        AgingBuckets, AgingRow, BalanceSheet, GeneralLedgerRow, ProfitAndLoss, RootType,
        TrialBalanceRow,
    },
};

#[derive(Clone)]
pub struct ReportService {
    repo: ReportRepository,
}

/// Saldo corrente linha a linha (débito positivo).
pub fn with_running_balance(lines: Vec<LedgerLine>) -> Vec<GeneralLedgerRow> {
    let mut balance = Decimal::ZERO;
    lines
        .into_iter()
        .map(|line| {
            balance += line.debit_bc - line.credit_bc;
            GeneralLedgerRow {
                posting_date: line.posting_date,
                voucher_type: line.voucher_type,
                voucher_no: line.voucher_no,
                debit: line.debit_bc,
                credit: line.credit_bc,
                running_balance: balance,
                remarks: line.remarks,
            }
        })
        .collect()
}

/// Classifica os títulos em aberto por dias de atraso.
pub fn bucket_open_invoices(rows: &[OpenInvoiceRow], today: NaiveDate) -> (AgingBuckets, Vec<AgingRow>) {
    let mut buckets = AgingBuckets::default();
    let mut detail = Vec::with_capacity(rows.len());

    for row in rows {
        let days_overdue = row
            .due_date
            .map(|due| (today - due).num_days())
            .unwrap_or(0)
            .max(0);

        let slot = match days_overdue {
            0 => &mut buckets.current,
            1..=30 => &mut buckets.d1_30,
            31..=60 => &mut buckets.d31_60,
            61..=90 => &mut buckets.d61_90,
            _ => &mut buckets.d90_plus,
        };
        *slot += row.outstanding_amount;

        detail.push(AgingRow {
            party: row.party.clone(),
            voucher_no: row.name.clone(),
            due_date: row.due_date,
            outstanding: row.outstanding_amount,
            days_overdue,
        });
    }

    (buckets, detail)
}

fn sum_balance(rows: &[TrialBalanceRow], debit_positive: bool) -> Decimal {
    rows.iter()
        .map(|r| {
            if debit_positive {
                r.total_debit - r.total_credit
            } else {
                r.total_credit - r.total_debit
            }
        })
        .sum()
}

impl ReportService {
    pub fn new(repo: ReportRepository) -> Self {
        Self { repo }
    }

    pub async fn trial_balance(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TrialBalanceRow>, AppError> {
        self.repo.trial_balance(conn, tenant_id, from, to).await
    }

    /// Balanço: ativos pelo saldo devedor, passivo/PL pelo saldo credor.
    pub async fn balance_sheet(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<BalanceSheet, AppError> {
        let rows = self
            .repo
            .trial_balance(&mut *conn, tenant_id, None, Some(as_of))
            .await?;

        let mut assets = Vec::new();
        let mut liabilities = Vec::new();
        let mut equity = Vec::new();
        // Resultado do período entra no PL como lucro acumulado
        let mut retained = Decimal::ZERO;

        for row in rows {
            match row.root_type {
                RootType::Asset => assets.push(row),
                RootType::Liability => liabilities.push(row),
                RootType::Equity => equity.push(row),
                RootType::Income => retained += row.total_credit - row.total_debit,
                RootType::Expense => retained -= row.total_debit - row.total_credit,
            }
        }

        let total_assets = sum_balance(&assets, true);
        let total_liabilities = sum_balance(&liabilities, false);
        let total_equity = sum_balance(&equity, false) + retained;

        Ok(BalanceSheet {
            as_of,
            assets,
            liabilities,
            equity,
            total_assets,
            total_liabilities,
            total_equity,
        })
    }

    pub async fn profit_and_loss(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ProfitAndLoss, AppError> {
        let rows = self
            .repo
            .trial_balance(&mut *conn, tenant_id, Some(from), Some(to))
            .await?;

        let mut income = Vec::new();
        let mut expenses = Vec::new();
        for row in rows {
            match row.root_type {
                RootType::Income => income.push(row),
                RootType::Expense => expenses.push(row),
                _ => {}
            }
        }

        let total_income = sum_balance(&income, false);
        let total_expense = sum_balance(&expenses, true);

        Ok(ProfitAndLoss {
            from,
            to,
            income,
            expenses,
            total_income,
            total_expense,
            net_profit: total_income - total_expense,
        })
    }

    pub async fn general_ledger(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        account_code: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<GeneralLedgerRow>, AppError> {
        let lines = self
            .repo
            .ledger_lines(conn, tenant_id, account_code, from, to)
            .await?;
        Ok(with_running_balance(lines))
    }

    pub async fn cash_flow(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<GeneralLedgerRow>, AppError> {
        let lines = self.repo.cash_flow_lines(conn, tenant_id, from, to).await?;
        Ok(with_running_balance(lines))
    }

    pub async fn receivable_aging(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        today: NaiveDate,
    ) -> Result<(AgingBuckets, Vec<AgingRow>), AppError> {
        let rows = self
            .repo
            .open_invoices(conn, tenant_id, VoucherType::Invoice)
            .await?;
        Ok(bucket_open_invoices(&rows, today))
    }

    pub async fn payable_aging(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        today: NaiveDate,
    ) -> Result<(AgingBuckets, Vec<AgingRow>), AppError> {
        let rows = self
            .repo
            .open_invoices(conn, tenant_id, VoucherType::PurchaseInvoice)
            .await?;
        Ok(bucket_open_invoices(&rows, today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(date: (i32, u32, u32), debit: Decimal, credit: Decimal) -> LedgerLine {
        LedgerLine {
            posting_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            voucher_type: VoucherType::JournalEntry,
            voucher_no: "JE-000001".into(),
            debit_bc: debit,
            credit_bc: credit,
            remarks: None,
        }
    }

    #[test]
    fn running_balance_accumulates_debit_minus_credit() {
        let rows = with_running_balance(vec![
            line((2025, 1, 1), dec!(100), dec!(0)),
            line((2025, 1, 2), dec!(0), dec!(30)),
            line((2025, 1, 3), dec!(10), dec!(0)),
        ]);

        assert_eq!(rows[0].running_balance, dec!(100));
        assert_eq!(rows[1].running_balance, dec!(70));
        assert_eq!(rows[2].running_balance, dec!(80));
    }

    fn open(due: Option<(i32, u32, u32)>, outstanding: Decimal) -> OpenInvoiceRow {
        OpenInvoiceRow {
            party: "ACME".into(),
            name: "INV-1".into(),
            due_date: due.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            outstanding_amount: outstanding,
        }
    }

    #[test]
    fn aging_buckets_split_by_days_overdue() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let rows = vec![
            open(Some((2025, 7, 10)), dec!(10)),  // ainda não venceu
            open(Some((2025, 6, 15)), dec!(20)),  // 15 dias
            open(Some((2025, 5, 15)), dec!(30)),  // 46 dias
            open(Some((2025, 4, 10)), dec!(40)),  // 81 dias
            open(Some((2025, 1, 1)), dec!(50)),   // 180 dias
            open(None, dec!(5)),                  // sem vencimento: current
        ];

        let (buckets, detail) = bucket_open_invoices(&rows, today);
        assert_eq!(buckets.current, dec!(15));
        assert_eq!(buckets.d1_30, dec!(20));
        assert_eq!(buckets.d31_60, dec!(30));
        assert_eq!(buckets.d61_90, dec!(40));
        assert_eq!(buckets.d90_plus, dec!(50));
        assert_eq!(detail.len(), 6);
        assert_eq!(detail[1].days_overdue, 15);
    }
}
