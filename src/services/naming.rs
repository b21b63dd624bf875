// src/services/naming.rs
//
// Nomes de voucher e chaves de idempotência. Ambos precisam ser
// determinísticos: o nome identifica o documento, a chave identifica a
// MUTAÇÃO (voucher + linha), e é ela que torna o replay inofensivo.

use chrono::{DateTime, Utc};

use crate::models::documents::VoucherType;

/// `PREFIX-NNNNNN`, onde o sufixo são os 6 dígitos menos significativos do
/// epoch em milissegundos.
pub fn voucher_name(voucher_type: VoucherType, now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis();
    format!("{}-{:06}", voucher_type.prefix(), millis.rem_euclid(1_000_000))
}

/// Chave de idempotência de uma linha: `tipo:numero:discriminador`.
pub fn posting_key(voucher_type: VoucherType, voucher_no: &str, line: impl std::fmt::Display) -> String {
    format!("{}:{}:{}", voucher_type.prefix(), voucher_no, line)
}

/// Chave da operação reversa do voucher inteiro.
pub fn cancel_key(voucher_type: VoucherType, voucher_no: &str) -> String {
    format!("CANCEL:{}:{}", voucher_type.prefix(), voucher_no)
}

/// Chave da submissão do voucher inteiro: replays do submit (estoque + GL +
/// status) viram no-op.
pub fn submit_key(voucher_type: VoucherType, voucher_no: &str) -> String {
    format!("SUBMIT:{}:{}", voucher_type.prefix(), voucher_no)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn name_uses_last_six_digits_of_epoch_millis() {
        let now = Utc.timestamp_millis_opt(1_735_700_123_456).unwrap();
        assert_eq!(voucher_name(VoucherType::PurchaseReceipt, now), "PR-123456");
        assert_eq!(voucher_name(VoucherType::Invoice, now), "INV-123456");
        assert_eq!(voucher_name(VoucherType::BankReconciliation, now), "RECON-123456");
    }

    #[test]
    fn name_pads_small_suffixes() {
        let now = Utc.timestamp_millis_opt(1_735_700_000_042).unwrap();
        assert_eq!(voucher_name(VoucherType::DeliveryNote, now), "DN-000042");
    }

    #[test]
    fn posting_keys_are_deterministic_and_distinct_per_line() {
        let a = posting_key(VoucherType::PurchaseReceipt, "PR-100001", 0);
        let b = posting_key(VoucherType::PurchaseReceipt, "PR-100001", 1);
        assert_eq!(a, "PR:PR-100001:0");
        assert_ne!(a, b);
    }

    #[test]
    fn cancel_key_has_cancel_prefix() {
        assert_eq!(
            cancel_key(VoucherType::StockTransfer, "ST-000007"),
            "CANCEL:ST:ST-000007"
        );
    }

    #[test]
    fn submit_and_cancel_keys_never_collide() {
        let submit = submit_key(VoucherType::PurchaseReceipt, "PR-100001");
        let cancel = cancel_key(VoucherType::PurchaseReceipt, "PR-100001");
        assert_eq!(submit, "SUBMIT:PR:PR-100001");
        assert_ne!(submit, cancel);
    }
}
