// src/services/gl_service.rs
//
// O escritor do razão. Recebe linhas (conta por código, débito, crédito),
// valida partida dobrada, resolve as contas — criando as contas padrão sob
// demanda — e grava uma GlEntry por linha não-zerada, tudo na moeda-base do
// tenant com câmbio 1.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    common::error::AppError,
    db::GlRepository,
    models::documents::VoucherType,
    models::finance::{Account, GlEntry, GlEntryInput, RootType},
    models::tenancy::Tenant,
};

/// Tabela de contas padrão criadas on-the-fly quando o código ainda não
/// existe no plano de contas do tenant.
const DEFAULT_ACCOUNTS: &[(&str, RootType, Option<&str>)] = &[
    ("Accounts Receivable", RootType::Asset, Some("Receivable")),
    ("Accounts Payable", RootType::Liability, Some("Payable")),
    ("Creditors", RootType::Liability, Some("Payable")),
    ("Stock Asset", RootType::Asset, Some("Stock")),
    ("Sales", RootType::Income, None),
    ("Cost of Goods Sold", RootType::Expense, Some("COGS")),
    ("Expenses", RootType::Expense, None),
];

pub fn default_account(code: &str) -> Option<(RootType, Option<&'static str>)> {
    DEFAULT_ACCOUNTS
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, root, kind)| (*root, *kind))
}

/// Tolerância de arredondamento da partida dobrada: um centavo.
fn tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// Soma débitos e créditos e exige |Σd - Σc| < 0.01.
pub fn validate_balanced(entries: &[GlEntryInput]) -> Result<(), AppError> {
    let debit: Decimal = entries.iter().map(|e| e.debit).sum();
    let credit: Decimal = entries.iter().map(|e| e.credit).sum();

    if (debit - credit).abs() >= tolerance() {
        return Err(AppError::JournalNotBalanced { debit, credit });
    }
    Ok(())
}

#[derive(Clone)]
pub struct GlService {
    repo: GlRepository,
}

impl GlService {
    pub fn new(repo: GlRepository) -> Self {
        Self { repo }
    }

    /// Resolve a conta por código; se não existir, consulta a tabela padrão e
    /// cria na hora. Código desconhecido sem padrão é erro.
    pub async fn ensure_account(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        code: &str,
    ) -> Result<Account, AppError> {
        if let Some(account) = self.repo.find_account(&mut *conn, tenant.id, code).await? {
            return Ok(account);
        }

        let (root_type, account_type) = default_account(code)
            .ok_or_else(|| AppError::UnknownAccount(code.to_string()))?;

        tracing::info!("Criando conta padrão '{}' para o tenant {}", code, tenant.id);
        self.repo
            .create_account(&mut *conn, tenant.id, code, code, root_type, account_type)
            .await
    }

    /// Grava o conjunto balanceado de lançamentos de um voucher.
    pub async fn post(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        voucher_type: VoucherType,
        voucher_no: &str,
        posting_date: NaiveDate,
        posting_ts: DateTime<Utc>,
        entries: &[GlEntryInput],
    ) -> Result<Vec<GlEntry>, AppError> {
        validate_balanced(entries)?;

        let mut written = Vec::new();
        for input in entries {
            // Linhas zeradas não viram linha no razão
            if input.debit.is_zero() && input.credit.is_zero() {
                continue;
            }

            let account = self.ensure_account(conn, tenant, &input.account_code).await?;
            let entry = self
                .repo
                .insert_gl_entry(
                    &mut *conn,
                    tenant.id,
                    account.id,
                    input.debit,
                    input.credit,
                    &tenant.base_currency,
                    voucher_type,
                    voucher_no,
                    input.remarks.as_deref(),
                    posting_date,
                    posting_ts,
                )
                .await?;
            written.push(entry);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tolerance_is_one_cent() {
        assert_eq!(tolerance(), dec!(0.01));
    }

    #[test]
    fn default_table_covers_posting_templates() {
        assert_eq!(
            default_account("Accounts Receivable"),
            Some((RootType::Asset, Some("Receivable")))
        );
        assert_eq!(
            default_account("Accounts Payable"),
            Some((RootType::Liability, Some("Payable")))
        );
        assert_eq!(default_account("Creditors"), Some((RootType::Liability, Some("Payable"))));
        assert_eq!(default_account("Stock Asset"), Some((RootType::Asset, Some("Stock"))));
        assert_eq!(default_account("Sales"), Some((RootType::Income, None)));
        assert_eq!(
            default_account("Cost of Goods Sold"),
            Some((RootType::Expense, Some("COGS")))
        );
        assert_eq!(default_account("Expenses"), Some((RootType::Expense, None)));
        assert_eq!(default_account("Conta Inventada"), None);
    }

    #[test]
    fn balanced_set_passes() {
        let entries = vec![
            GlEntryInput::debit("Accounts Receivable", dec!(165)),
            GlEntryInput::credit("Sales", dec!(150)),
            GlEntryInput::credit("Tax Payable", dec!(15)),
        ];
        assert!(validate_balanced(&entries).is_ok());
    }

    #[test]
    fn rounding_noise_below_a_cent_passes() {
        let entries = vec![
            GlEntryInput::debit("A", dec!(100.004)),
            GlEntryInput::credit("B", dec!(100.000)),
        ];
        assert!(validate_balanced(&entries).is_ok());
    }

    #[test]
    fn unbalanced_set_is_rejected() {
        let entries = vec![
            GlEntryInput::debit("A", dec!(100)),
            GlEntryInput::credit("B", dec!(90)),
        ];
        let err = validate_balanced(&entries).unwrap_err();
        assert_eq!(err.code(), "JOURNAL_NOT_BALANCED");
    }
}
