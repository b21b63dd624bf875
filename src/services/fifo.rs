// src/services/fifo.rs
//
// Planejador puro de consumo de camadas. Recebe as camadas candidatas já
// carregadas (e travadas) pelo repositório, decide QUANTO sai de CADA camada
// e devolve as pernas com o custo ponderado. Nenhum I/O aqui dentro: é o
// pedaço do motor que dá para testar sem banco.

use rust_decimal::Decimal;

use crate::models::{
    stock::{FifoLayerView, IssueLeg},
    tenancy::ConsumptionStrategy,
};

/// Plano de baixa: pernas na ordem de consumo + custo agregado.
#[derive(Debug, Clone)]
pub struct ConsumptionPlan {
    pub legs: Vec<IssueLeg>,
    pub total_qty: Decimal,
    pub total_cost: Decimal,
    pub weighted_rate: Decimal,
}

/// Demanda que as camadas candidatas não cobriram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shortfall {
    pub satisfied: Decimal,
    pub missing: Decimal,
}

/// Ordena as camadas conforme a estratégia:
/// - FIFO: posting_ts crescente, id como desempate.
/// - FEFO: validade do lote crescente (NULLs por último), depois posting_ts.
fn order_layers(layers: &mut [FifoLayerView], strategy: ConsumptionStrategy) {
    match strategy {
        ConsumptionStrategy::Fifo => {
            layers.sort_by(|a, b| a.posting_ts.cmp(&b.posting_ts).then(a.id.cmp(&b.id)));
        }
        ConsumptionStrategy::Fefo => {
            layers.sort_by(|a, b| {
                match (a.batch_expiry, b.batch_expiry) {
                    (Some(ea), Some(eb)) => ea.cmp(&eb),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
                .then(a.posting_ts.cmp(&b.posting_ts))
                .then(a.id.cmp(&b.id))
            });
        }
    }
}

/// Caminha as camadas baixando `min(restante_da_camada, demanda_restante)`
/// de cada uma até satisfazer a demanda. Falhar em satisfazer devolve o
/// quanto faltou, sem plano parcial.
pub fn plan_consumption(
    mut layers: Vec<FifoLayerView>,
    demand: Decimal,
    strategy: ConsumptionStrategy,
) -> Result<ConsumptionPlan, Shortfall> {
    order_layers(&mut layers, strategy);

    let mut remaining = demand;
    let mut legs = Vec::new();
    let mut total_cost = Decimal::ZERO;

    for layer in &layers {
        if remaining <= Decimal::ZERO {
            break;
        }
        if layer.qty_remaining <= Decimal::ZERO {
            continue;
        }

        let take = layer.qty_remaining.min(remaining);
        total_cost += take * layer.incoming_rate;
        legs.push(IssueLeg {
            layer_id: layer.id,
            location_id: layer.location_id,
            batch_id: layer.batch_id,
            qty: take,
            rate: layer.incoming_rate,
        });
        remaining -= take;
    }

    if remaining > Decimal::ZERO {
        return Err(Shortfall {
            satisfied: demand - remaining,
            missing: remaining,
        });
    }

    let weighted_rate = if demand.is_zero() {
        Decimal::ZERO
    } else {
        total_cost / demand
    };

    Ok(ConsumptionPlan {
        legs,
        total_qty: demand,
        total_cost,
        weighted_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn layer(
        ts_min: u32,
        qty: Decimal,
        rate: Decimal,
        expiry: Option<NaiveDate>,
    ) -> FifoLayerView {
        FifoLayerView {
            id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            batch_id: expiry.map(|_| Uuid::new_v4()),
            qty_remaining: qty,
            incoming_rate: rate,
            posting_ts: Utc.with_ymd_and_hms(2025, 1, 1, 8, ts_min, 0).unwrap(),
            batch_expiry: expiry,
        }
    }

    #[test]
    fn fifo_consumes_oldest_first() {
        // Recebe 10 @ 5.00, depois 10 @ 7.00; baixa 15.
        let layers = vec![
            layer(0, dec!(10), dec!(5.00), None),
            layer(10, dec!(10), dec!(7.00), None),
        ];

        let plan = plan_consumption(layers, dec!(15), ConsumptionStrategy::Fifo).unwrap();

        assert_eq!(plan.legs.len(), 2);
        assert_eq!(plan.legs[0].qty, dec!(10));
        assert_eq!(plan.legs[0].rate, dec!(5.00));
        assert_eq!(plan.legs[1].qty, dec!(5));
        assert_eq!(plan.legs[1].rate, dec!(7.00));

        // total = 10*5 + 5*7 = 85; ponderado = 85/15 = 5.666...
        assert_eq!(plan.total_cost, dec!(85.00));
        let expected = dec!(85.00) / dec!(15);
        assert_eq!(plan.weighted_rate, expected);
    }

    #[test]
    fn fefo_consumes_earliest_expiry_first() {
        // B1 vence em junho, B2 em março; B2 foi recebido DEPOIS mas sai primeiro.
        let b1 = layer(0, dec!(5), dec!(4.00), NaiveDate::from_ymd_opt(2025, 6, 1));
        let b2 = layer(10, dec!(5), dec!(4.50), NaiveDate::from_ymd_opt(2025, 3, 1));
        let b2_id = b2.id;

        let plan = plan_consumption(vec![b1, b2], dec!(6), ConsumptionStrategy::Fefo).unwrap();

        assert_eq!(plan.legs[0].layer_id, b2_id);
        assert_eq!(plan.legs[0].qty, dec!(5));
        assert_eq!(plan.legs[1].qty, dec!(1));

        // (5*4.50 + 1*4.00) / 6 = 4.41666...
        let expected = (dec!(5) * dec!(4.50) + dec!(1) * dec!(4.00)) / dec!(6);
        assert_eq!(plan.weighted_rate, expected);
    }

    #[test]
    fn fefo_puts_null_expiry_last() {
        let no_expiry = layer(0, dec!(10), dec!(1.00), None);
        let expiring = layer(10, dec!(10), dec!(2.00), NaiveDate::from_ymd_opt(2025, 2, 1));
        let expiring_id = expiring.id;

        let plan =
            plan_consumption(vec![no_expiry, expiring], dec!(3), ConsumptionStrategy::Fefo)
                .unwrap();

        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].layer_id, expiring_id);
    }

    #[test]
    fn shortfall_reports_missing_demand() {
        let layers = vec![layer(0, dec!(4), dec!(2.00), None)];

        let err = plan_consumption(layers, dec!(10), ConsumptionStrategy::Fifo).unwrap_err();
        assert_eq!(err.satisfied, dec!(4));
        assert_eq!(err.missing, dec!(6));
    }

    #[test]
    fn exhausted_layers_are_skipped() {
        let empty = layer(0, dec!(0), dec!(1.00), None);
        let full = layer(10, dec!(5), dec!(3.00), None);
        let full_id = full.id;

        let plan = plan_consumption(vec![empty, full], dec!(5), ConsumptionStrategy::Fifo).unwrap();
        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].layer_id, full_id);
    }

    #[test]
    fn out_of_order_arrival_still_consumes_by_posting_ts() {
        // A camada mais antiga chega por último no vetor; a ordenação resolve.
        let newer = layer(30, dec!(5), dec!(9.00), None);
        let older = layer(0, dec!(5), dec!(3.00), None);
        let older_id = older.id;

        let plan = plan_consumption(vec![newer, older], dec!(2), ConsumptionStrategy::Fifo).unwrap();
        assert_eq!(plan.legs[0].layer_id, older_id);
        assert_eq!(plan.legs[0].rate, dec!(3.00));
    }
}
