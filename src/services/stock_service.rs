// src/services/stock_service.rs
//
// As primitivas públicas de estoque: receber, baixar, transferir, reservar
// e reconciliar. Toda primitiva roda DENTRO da transação do chamador
// (&mut PgConnection), passa primeiro pelo marcador de idempotência e depois
// pelo lock consultivo de (tenant, depósito, item). O replay de uma chave já
// gravada devolve no-op sem tocar em nada.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{acquire_stock_lock, acquire_stock_lock_pair},
        error::AppError,
    },
    db::{MastersRepository, StockRepository},
    models::{
        masters::{Batch, Item, Location, Warehouse},
        stock::{
            IssueLeg, IssueResult, IssueStock, ReceiveStock, ReconcileStock, ReserveStock,
            TransferStock,
        },
        tenancy::Tenant,
    },
    services::fifo,
};

#[derive(Clone)]
pub struct StockService {
    masters: MastersRepository,
    stock: StockRepository,
}

/// Contexto resolvido de uma movimentação: ids internos prontos para uso.
struct ResolvedMove {
    item: Item,
    warehouse: Warehouse,
    batch: Option<Batch>,
}

impl StockService {
    pub fn new(masters: MastersRepository, stock: StockRepository) -> Self {
        Self { masters, stock }
    }

    /// Grava uma chave de idempotência avulsa (usada pelo orquestrador para
    /// o submit do voucher inteiro). `false` = replay.
    pub async fn claim_posting_key(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        posting_key: &str,
    ) -> Result<bool, AppError> {
        self.stock.try_insert_posting(&mut *conn, tenant_id, posting_key).await
    }

    // =========================================================================
    //  RESOLUÇÃO (identidade + unidade)
    // =========================================================================

    /// Resolve (item, depósito, lote?) a partir dos códigos. Cria o lote sob
    /// demanda quando o item é controlado por lote; rejeita lote para item
    /// sem controle e validade divergente da já registrada.
    async fn resolve_move(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        item_code: &str,
        warehouse_code: &str,
        batch_no: Option<&str>,
        batch_expiry: Option<chrono::NaiveDate>,
    ) -> Result<ResolvedMove, AppError> {
        let item = self
            .masters
            .find_item_by_code(&mut *conn, tenant_id, item_code)
            .await?
            .ok_or_else(|| AppError::UnknownItem(item_code.to_string()))?;

        let warehouse = self
            .masters
            .find_warehouse_by_code(&mut *conn, tenant_id, warehouse_code)
            .await?
            .ok_or_else(|| AppError::UnknownWarehouse(warehouse_code.to_string()))?;

        let batch = match batch_no {
            None => None,
            Some(batch_no) => {
                if !item.has_batch {
                    return Err(AppError::BatchOnNonBatchItem(item.code.clone()));
                }
                let existing = self
                    .masters
                    .find_batch(&mut *conn, tenant_id, item.id, batch_no)
                    .await?;

                match existing {
                    Some(batch) => {
                        match (batch.exp_date, batch_expiry) {
                            // Validade já registrada não muda
                            (Some(current), Some(incoming)) if current != incoming => {
                                return Err(AppError::BatchExpiryMismatch(batch_no.to_string()));
                            }
                            // Lote criado sem validade ganha a informada
                            (None, Some(incoming)) => {
                                self.masters
                                    .set_batch_expiry(&mut *conn, tenant_id, batch.id, incoming)
                                    .await?;
                            }
                            _ => {}
                        }
                        Some(batch)
                    }
                    None => Some(
                        self.masters
                            .create_batch(&mut *conn, tenant_id, item.id, batch_no, batch_expiry)
                            .await?,
                    ),
                }
            }
        };

        Ok(ResolvedMove { item, warehouse, batch })
    }

    /// Converte a quantidade do documento para a unidade de estoque do item.
    /// Devolve (qty_estoque, fator); a taxa do documento deve ser DIVIDIDA
    /// pelo fator para que a valoração do livro seja sempre por unidade de
    /// estoque.
    async fn resolve_stock_qty(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        item: &Item,
        qty: Decimal,
        uom_code: Option<&str>,
        conversion_factor: Option<Decimal>,
    ) -> Result<(Decimal, Decimal), AppError> {
        let factor = match uom_code {
            None => Decimal::ONE,
            Some(uom) if uom == item.stock_uom_code => Decimal::ONE,
            Some(uom) => match conversion_factor {
                // Fator explícito do chamador vence a tabela
                Some(factor) => factor,
                None => {
                    let row = self
                        .masters
                        .find_item_uom(&mut *conn, tenant_id, item.id, uom)
                        .await?
                        .ok_or_else(|| AppError::MissingUomConversion {
                            item: item.code.clone(),
                            uom: uom.to_string(),
                        })?;
                    row.conversion_factor
                }
            },
        };

        if factor <= Decimal::ZERO {
            return Err(AppError::InvalidConversionFactor(factor));
        }

        Ok((qty * factor, factor))
    }

    async fn resolve_receiving_location(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        warehouse: &Warehouse,
        location_code: Option<&str>,
    ) -> Result<Location, AppError> {
        if let Some(code) = location_code {
            return self
                .masters
                .find_location(&mut *conn, tenant_id, warehouse.id, code)
                .await?
                .ok_or_else(|| AppError::UnknownLocation(code.to_string(), warehouse.code.clone()));
        }

        match warehouse.default_receiving_location_id {
            Some(id) => self
                .masters
                .get_location(&mut *conn, tenant_id, id)
                .await?
                .ok_or_else(|| AppError::MissingReceivingLocation(warehouse.code.clone())),
            None => Err(AppError::MissingReceivingLocation(warehouse.code.clone())),
        }
    }

    /// Local de separação: explícito, senão o default do depósito, senão
    /// nenhum (a seleção de camadas passa a varrer todas as localizações).
    async fn resolve_picking_location(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        warehouse: &Warehouse,
        location_code: Option<&str>,
    ) -> Result<Option<Location>, AppError> {
        if let Some(code) = location_code {
            let loc = self
                .masters
                .find_location(&mut *conn, tenant_id, warehouse.id, code)
                .await?
                .ok_or_else(|| AppError::UnknownLocation(code.to_string(), warehouse.code.clone()))?;
            return Ok(Some(loc));
        }

        match warehouse.default_picking_location_id {
            Some(id) => Ok(self.masters.get_location(&mut *conn, tenant_id, id).await?),
            None => Ok(None),
        }
    }

    // =========================================================================
    //  VALIDAÇÃO DE SERIAIS
    // =========================================================================

    fn validate_serial_input(
        item: &Item,
        stock_qty: Decimal,
        serial_nos: &[String],
    ) -> Result<(), AppError> {
        if !item.has_serial {
            return Ok(());
        }
        if stock_qty != stock_qty.trunc() {
            return Err(AppError::NonIntegerSerialQty(stock_qty));
        }
        if Decimal::from(serial_nos.len()) != stock_qty {
            return Err(AppError::SerialCountMismatch {
                expected: stock_qty,
                got: serial_nos.len(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for serial_no in serial_nos {
            if !seen.insert(serial_no.as_str()) {
                return Err(AppError::DuplicateSerialInput(serial_no.clone()));
            }
        }
        Ok(())
    }

    /// Carrega e valida os seriais de uma saída: todos AVAILABLE na origem.
    async fn load_serials_for_issue(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        item: &Item,
        warehouse_id: Uuid,
        location_id: Option<Uuid>,
        batch_id: Option<Uuid>,
        serial_nos: &[String],
    ) -> Result<Vec<crate::models::masters::Serial>, AppError> {
        let mut serials = Vec::with_capacity(serial_nos.len());
        for serial_no in serial_nos {
            let serial = self
                .stock
                .find_serial(&mut *conn, tenant_id, serial_no)
                .await?
                .ok_or_else(|| AppError::SerialNotAvailable(serial_no.clone()))?;

            if !StockRepository::check_serial_at_source(
                &serial, item.id, warehouse_id, location_id, batch_id,
            ) {
                return Err(AppError::SerialNotAvailable(serial_no.clone()));
            }
            serials.push(serial);
        }
        Ok(serials)
    }

    // =========================================================================
    //  RECEIVE
    // =========================================================================

    /// Entrada de estoque: incrementa saldos, abre camada FIFO, grava uma
    /// perna positiva no livro e cria os seriais no bin de recebimento.
    /// Devolve `None` no replay idempotente.
    pub async fn receive_stock(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        input: &ReceiveStock,
    ) -> Result<Option<Uuid>, AppError> {
        if !self
            .stock
            .try_insert_posting(&mut *conn, tenant.id, &input.posting_key)
            .await?
        {
            tracing::info!("Replay idempotente ignorado: {}", input.posting_key);
            return Ok(None);
        }

        let resolved = self
            .resolve_move(
                conn,
                tenant.id,
                &input.item_code,
                &input.warehouse_code,
                input.batch_no.as_deref(),
                input.batch_expiry,
            )
            .await?;

        let (stock_qty, factor) = self
            .resolve_stock_qty(
                conn,
                tenant.id,
                &resolved.item,
                input.qty,
                input.uom_code.as_deref(),
                input.conversion_factor,
            )
            .await?;

        if stock_qty <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(stock_qty));
        }
        if input.incoming_rate < Decimal::ZERO {
            return Err(AppError::InvalidRate(input.incoming_rate));
        }
        // Valoração por unidade de ESTOQUE, não do documento
        let rate = input.incoming_rate / factor;

        acquire_stock_lock(&mut *conn, tenant.id, resolved.warehouse.id, resolved.item.id).await?;

        let location = self
            .resolve_receiving_location(
                conn,
                tenant.id,
                &resolved.warehouse,
                input.location_code.as_deref(),
            )
            .await?;

        Self::validate_serial_input(&resolved.item, stock_qty, &input.serial_nos)?;
        if resolved.item.has_serial {
            for serial_no in &input.serial_nos {
                if self
                    .stock
                    .find_serial(&mut *conn, tenant.id, serial_no)
                    .await?
                    .is_some()
                {
                    return Err(AppError::SerialAlreadyExists(serial_no.clone()));
                }
            }
        }

        let posting_ts = input.voucher.posting_ts.unwrap_or_else(Utc::now);
        let batch_id = resolved.batch.as_ref().map(|b| b.id);

        self.stock
            .upsert_warehouse_balance(&mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id, stock_qty)
            .await?;
        self.stock
            .upsert_bin_balance(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                location.id, batch_id, stock_qty,
            )
            .await?;

        let layer = self
            .stock
            .insert_fifo_layer(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                location.id, batch_id, stock_qty, rate, posting_ts,
                input.voucher.voucher_type, &input.voucher.voucher_no, None,
            )
            .await?;

        let entry = self
            .stock
            .insert_ledger_entry(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                None, Some(location.id), batch_id,
                stock_qty, rate, stock_qty * rate, Some(layer.id),
                input.voucher.voucher_type, &input.voucher.voucher_no, posting_ts,
            )
            .await?;

        if resolved.item.has_serial {
            for serial_no in &input.serial_nos {
                let serial = self
                    .stock
                    .create_serial(
                        &mut *conn, tenant.id, serial_no, resolved.item.id,
                        resolved.warehouse.id, location.id, batch_id,
                    )
                    .await?;
                self.stock
                    .link_serial_to_entry(&mut *conn, entry.id, serial.id)
                    .await?;
            }
        }

        Ok(Some(entry.id))
    }

    // =========================================================================
    //  ISSUE
    // =========================================================================

    /// Baixa de estoque por FIFO/FEFO. Uma perna negativa no livro por camada
    /// consumida, todas carregando a valoração média ponderada da baixa.
    pub async fn issue_stock(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        input: &IssueStock,
    ) -> Result<IssueResult, AppError> {
        if !self
            .stock
            .try_insert_posting(&mut *conn, tenant.id, &input.posting_key)
            .await?
        {
            tracing::info!("Replay idempotente ignorado: {}", input.posting_key);
            return Ok(IssueResult::noop());
        }

        let resolved = self
            .resolve_move(
                conn, tenant.id, &input.item_code, &input.warehouse_code,
                input.batch_no.as_deref(), None,
            )
            .await?;

        let (stock_qty, _factor) = self
            .resolve_stock_qty(
                conn, tenant.id, &resolved.item, input.qty,
                input.uom_code.as_deref(), input.conversion_factor,
            )
            .await?;

        if stock_qty <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(stock_qty));
        }

        acquire_stock_lock(&mut *conn, tenant.id, resolved.warehouse.id, resolved.item.id).await?;

        let location = self
            .resolve_picking_location(
                conn, tenant.id, &resolved.warehouse, input.location_code.as_deref(),
            )
            .await?;
        let batch_id = resolved.batch.as_ref().map(|b| b.id);

        // Disponível = físico - reservado (a menos que a baixa consuma a
        // própria reserva)
        let warehouse_balance = self
            .stock
            .get_warehouse_balance(&mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id)
            .await?;
        let (actual, reserved) = warehouse_balance
            .as_ref()
            .map(|b| (b.actual_qty, b.reserved_qty))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));

        let available = if input.consume_reservation {
            actual
        } else {
            actual - reserved
        };
        if !tenant.allow_negative_stock && available < stock_qty {
            return Err(AppError::InsufficientStock {
                item: resolved.item.code.clone(),
                warehouse: resolved.warehouse.code.clone(),
                requested: stock_qty,
                available,
            });
        }

        if let Some(loc) = &location {
            let bin = self
                .stock
                .get_bin_balance(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    loc.id, batch_id,
                )
                .await?;
            let (bin_actual, bin_reserved) = bin
                .as_ref()
                .map(|b| (b.actual_qty, b.reserved_qty))
                .unwrap_or((Decimal::ZERO, Decimal::ZERO));
            let bin_available = if input.consume_reservation {
                bin_actual
            } else {
                bin_actual - bin_reserved
            };
            if !tenant.allow_negative_stock && bin_available < stock_qty {
                return Err(AppError::InsufficientBinStock {
                    item: resolved.item.code.clone(),
                    location: loc.path.clone(),
                    requested: stock_qty,
                    available: bin_available,
                });
            }
        }

        // Plano de consumo sobre as camadas travadas
        let strategy = input.strategy.unwrap_or(tenant.stock_consumption_strategy);
        let layers = self
            .stock
            .fetch_layers_for_consumption(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                location.as_ref().map(|l| l.id), batch_id,
            )
            .await?;
        let plan = fifo::plan_consumption(layers, stock_qty, strategy).map_err(|shortfall| {
            AppError::InsufficientFifoLayers {
                item: resolved.item.code.clone(),
                warehouse: resolved.warehouse.code.clone(),
                shortfall: shortfall.missing,
            }
        })?;

        // Saldo do depósito
        let updated = self
            .stock
            .update_warehouse_balance(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                -stock_qty, tenant.allow_negative_stock,
            )
            .await?;
        if updated.is_none() {
            if tenant.allow_negative_stock {
                self.stock
                    .upsert_warehouse_balance(
                        &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id, -stock_qty,
                    )
                    .await?;
            } else {
                return Err(AppError::NegativeBalance {
                    item: resolved.item.code.clone(),
                    warehouse: resolved.warehouse.code.clone(),
                });
            }
        }

        // Consumo de reserva: nunca abaixo de zero
        if input.consume_reservation && reserved > Decimal::ZERO {
            let release = reserved.min(stock_qty);
            self.stock
                .adjust_warehouse_reservation(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id, -release,
                )
                .await?;
            if let Some(loc) = &location {
                if let Some(bin) = self
                    .stock
                    .get_bin_balance(
                        &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                        loc.id, batch_id,
                    )
                    .await?
                {
                    let bin_release = bin.reserved_qty.min(stock_qty);
                    if bin_release > Decimal::ZERO {
                        self.stock
                            .adjust_bin_reservation(
                                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                                loc.id, batch_id, -bin_release,
                            )
                            .await?;
                    }
                }
            }
        }

        let posting_ts = input.voucher.posting_ts.unwrap_or_else(Utc::now);

        // Seriais informados pelo chamador
        let serials = if resolved.item.has_serial {
            Self::validate_serial_input(&resolved.item, stock_qty, &input.serial_nos)?;
            self.load_serials_for_issue(
                conn, tenant.id, &resolved.item, resolved.warehouse.id,
                location.as_ref().map(|l| l.id), batch_id, &input.serial_nos,
            )
            .await?
        } else {
            Vec::new()
        };
        let mut serial_cursor = serials.iter();

        let mut legs_out: Vec<IssueLeg> = Vec::with_capacity(plan.legs.len());
        for leg in &plan.legs {
            self.stock
                .decrement_layer(&mut *conn, tenant.id, leg.layer_id, leg.qty)
                .await?;

            let bin_updated = self
                .stock
                .update_bin_balance(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    leg.location_id, leg.batch_id, -leg.qty, tenant.allow_negative_stock,
                )
                .await?;
            if bin_updated.is_none() {
                if tenant.allow_negative_stock {
                    self.stock
                        .upsert_bin_balance(
                            &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                            leg.location_id, leg.batch_id, -leg.qty,
                        )
                        .await?;
                } else {
                    return Err(AppError::NegativeBalance {
                        item: resolved.item.code.clone(),
                        warehouse: resolved.warehouse.code.clone(),
                    });
                }
            }

            let entry = self
                .stock
                .insert_ledger_entry(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    Some(leg.location_id), None, leg.batch_id,
                    -leg.qty, plan.weighted_rate, -(leg.qty * leg.rate), Some(leg.layer_id),
                    input.voucher.voucher_type, &input.voucher.voucher_no, posting_ts,
                )
                .await?;
            self.stock
                .insert_layer_consumption(&mut *conn, tenant.id, leg.layer_id, entry.id, leg.qty, leg.rate)
                .await?;

            // Distribui os seriais pelas pernas na ordem do consumo
            if resolved.item.has_serial {
                let leg_count = leg
                    .qty
                    .trunc()
                    .to_i64()
                    .ok_or(AppError::NonIntegerSerialQty(leg.qty))?;
                for _ in 0..leg_count {
                    if let Some(serial) = serial_cursor.next() {
                        self.stock
                            .mark_serial_issued(&mut *conn, tenant.id, serial.id)
                            .await?;
                        self.stock
                            .link_serial_to_entry(&mut *conn, entry.id, serial.id)
                            .await?;
                    }
                }
            }

            legs_out.push(leg.clone());
        }

        Ok(IssueResult {
            legs: legs_out,
            total_qty: plan.total_qty,
            total_cost: plan.total_cost,
            weighted_rate: plan.weighted_rate,
        })
    }

    // =========================================================================
    //  TRANSFER
    // =========================================================================

    /// Transferência entre depósitos: consome camadas na origem, cria camadas
    /// espelhadas no destino (linhagem via source_layer_id, taxa preservada
    /// perna a perna) e grava o par de pernas negativa/positiva no livro.
    pub async fn transfer_stock(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        input: &TransferStock,
    ) -> Result<IssueResult, AppError> {
        if !self
            .stock
            .try_insert_posting(&mut *conn, tenant.id, &input.posting_key)
            .await?
        {
            tracing::info!("Replay idempotente ignorado: {}", input.posting_key);
            return Ok(IssueResult::noop());
        }

        let source = self
            .resolve_move(
                conn, tenant.id, &input.item_code, &input.source_warehouse,
                input.batch_no.as_deref(), None,
            )
            .await?;
        let target_warehouse = self
            .masters
            .find_warehouse_by_code(&mut *conn, tenant.id, &input.target_warehouse)
            .await?
            .ok_or_else(|| AppError::UnknownWarehouse(input.target_warehouse.clone()))?;

        let (stock_qty, _factor) = self
            .resolve_stock_qty(
                conn, tenant.id, &source.item, input.qty,
                input.uom_code.as_deref(), input.conversion_factor,
            )
            .await?;
        if stock_qty <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(stock_qty));
        }

        // Os dois locks em ordem determinística
        acquire_stock_lock_pair(
            &mut *conn, tenant.id, source.warehouse.id, target_warehouse.id, source.item.id,
        )
        .await?;

        let source_location = self
            .resolve_picking_location(
                conn, tenant.id, &source.warehouse, input.source_location_code.as_deref(),
            )
            .await?
            .ok_or_else(|| AppError::MissingPickingLocation(source.warehouse.code.clone()))?;

        let target_location = self
            .resolve_receiving_location(
                conn, tenant.id, &target_warehouse, input.target_location_code.as_deref(),
            )
            .await?;

        let batch_id = source.batch.as_ref().map(|b| b.id);

        // Política de não-negativo na origem (depósito e bin)
        let warehouse_balance = self
            .stock
            .get_warehouse_balance(&mut *conn, tenant.id, source.item.id, source.warehouse.id)
            .await?;
        let (actual, reserved) = warehouse_balance
            .as_ref()
            .map(|b| (b.actual_qty, b.reserved_qty))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));
        if !tenant.allow_negative_stock && actual - reserved < stock_qty {
            return Err(AppError::InsufficientStock {
                item: source.item.code.clone(),
                warehouse: source.warehouse.code.clone(),
                requested: stock_qty,
                available: actual - reserved,
            });
        }

        let bin = self
            .stock
            .get_bin_balance(
                &mut *conn, tenant.id, source.item.id, source.warehouse.id,
                source_location.id, batch_id,
            )
            .await?;
        let bin_available = bin
            .as_ref()
            .map(|b| b.actual_qty - b.reserved_qty)
            .unwrap_or(Decimal::ZERO);
        if !tenant.allow_negative_stock && bin_available < stock_qty {
            return Err(AppError::InsufficientBinStock {
                item: source.item.code.clone(),
                location: source_location.path.clone(),
                requested: stock_qty,
                available: bin_available,
            });
        }

        let layers = self
            .stock
            .fetch_layers_for_consumption(
                &mut *conn, tenant.id, source.item.id, source.warehouse.id,
                Some(source_location.id), batch_id,
            )
            .await?;
        let plan = fifo::plan_consumption(layers, stock_qty, tenant.stock_consumption_strategy)
            .map_err(|shortfall| AppError::InsufficientFifoLayers {
                item: source.item.code.clone(),
                warehouse: source.warehouse.code.clone(),
                shortfall: shortfall.missing,
            })?;

        let posting_ts = input.voucher.posting_ts.unwrap_or_else(Utc::now);

        // Saldos de depósito: origem desce, destino sobe
        let updated = self
            .stock
            .update_warehouse_balance(
                &mut *conn, tenant.id, source.item.id, source.warehouse.id,
                -stock_qty, tenant.allow_negative_stock,
            )
            .await?;
        if updated.is_none() {
            return Err(AppError::NegativeBalance {
                item: source.item.code.clone(),
                warehouse: source.warehouse.code.clone(),
            });
        }
        self.stock
            .upsert_warehouse_balance(&mut *conn, tenant.id, source.item.id, target_warehouse.id, stock_qty)
            .await?;

        let serials = if source.item.has_serial {
            Self::validate_serial_input(&source.item, stock_qty, &input.serial_nos)?;
            self.load_serials_for_issue(
                conn, tenant.id, &source.item, source.warehouse.id,
                Some(source_location.id), batch_id, &input.serial_nos,
            )
            .await?
        } else {
            Vec::new()
        };
        let mut serial_cursor = serials.iter();

        for leg in &plan.legs {
            self.stock
                .decrement_layer(&mut *conn, tenant.id, leg.layer_id, leg.qty)
                .await?;

            let bin_updated = self
                .stock
                .update_bin_balance(
                    &mut *conn, tenant.id, source.item.id, source.warehouse.id,
                    leg.location_id, leg.batch_id, -leg.qty, tenant.allow_negative_stock,
                )
                .await?;
            if bin_updated.is_none() {
                return Err(AppError::NegativeBalance {
                    item: source.item.code.clone(),
                    warehouse: source.warehouse.code.clone(),
                });
            }
            self.stock
                .upsert_bin_balance(
                    &mut *conn, tenant.id, source.item.id, target_warehouse.id,
                    target_location.id, leg.batch_id, leg.qty,
                )
                .await?;

            // Camada destino espelhada, com a taxa da perna preservada
            let dest_layer = self
                .stock
                .insert_fifo_layer(
                    &mut *conn, tenant.id, source.item.id, target_warehouse.id,
                    target_location.id, leg.batch_id, leg.qty, leg.rate, posting_ts,
                    input.voucher.voucher_type, &input.voucher.voucher_no, Some(leg.layer_id),
                )
                .await?;

            let out_entry = self
                .stock
                .insert_ledger_entry(
                    &mut *conn, tenant.id, source.item.id, source.warehouse.id,
                    Some(leg.location_id), None, leg.batch_id,
                    -leg.qty, leg.rate, -(leg.qty * leg.rate), Some(leg.layer_id),
                    input.voucher.voucher_type, &input.voucher.voucher_no, posting_ts,
                )
                .await?;
            self.stock
                .insert_layer_consumption(&mut *conn, tenant.id, leg.layer_id, out_entry.id, leg.qty, leg.rate)
                .await?;

            let in_entry = self
                .stock
                .insert_ledger_entry(
                    &mut *conn, tenant.id, source.item.id, target_warehouse.id,
                    None, Some(target_location.id), leg.batch_id,
                    leg.qty, leg.rate, leg.qty * leg.rate, Some(dest_layer.id),
                    input.voucher.voucher_type, &input.voucher.voucher_no, posting_ts,
                )
                .await?;

            if source.item.has_serial {
                let leg_count = leg
                    .qty
                    .trunc()
                    .to_i64()
                    .ok_or(AppError::NonIntegerSerialQty(leg.qty))?;
                for _ in 0..leg_count {
                    if let Some(serial) = serial_cursor.next() {
                        self.stock
                            .place_serial(
                                &mut *conn, tenant.id, serial.id, target_warehouse.id,
                                target_location.id, leg.batch_id,
                            )
                            .await?;
                        self.stock
                            .link_serial_to_entry(&mut *conn, out_entry.id, serial.id)
                            .await?;
                        self.stock
                            .link_serial_to_entry(&mut *conn, in_entry.id, serial.id)
                            .await?;
                    }
                }
            }
        }

        Ok(IssueResult {
            legs: plan.legs,
            total_qty: plan.total_qty,
            total_cost: plan.total_cost,
            weighted_rate: plan.weighted_rate,
        })
    }

    // =========================================================================
    //  RESERVE / UNRESERVE
    // =========================================================================

    /// Reserva: sobe reserved_qty no depósito (e no bin, quando informado).
    /// Não movimenta custo nem escreve no livro.
    pub async fn reserve_stock(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        input: &ReserveStock,
    ) -> Result<bool, AppError> {
        if !self
            .stock
            .try_insert_posting(&mut *conn, tenant.id, &input.posting_key)
            .await?
        {
            return Ok(false);
        }

        let resolved = self
            .resolve_move(
                conn, tenant.id, &input.item_code, &input.warehouse_code,
                input.batch_no.as_deref(), None,
            )
            .await?;
        if input.qty <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(input.qty));
        }

        acquire_stock_lock(&mut *conn, tenant.id, resolved.warehouse.id, resolved.item.id).await?;

        let updated = self
            .stock
            .adjust_warehouse_reservation(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id, input.qty,
            )
            .await?;
        if updated.is_none() {
            let balance = self
                .stock
                .get_warehouse_balance(&mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id)
                .await?;
            let available = balance
                .map(|b| b.actual_qty - b.reserved_qty)
                .unwrap_or(Decimal::ZERO);
            return Err(AppError::InsufficientStock {
                item: resolved.item.code.clone(),
                warehouse: resolved.warehouse.code.clone(),
                requested: input.qty,
                available,
            });
        }

        if let Some(code) = input.location_code.as_deref() {
            let location = self
                .masters
                .find_location(&mut *conn, tenant.id, resolved.warehouse.id, code)
                .await?
                .ok_or_else(|| {
                    AppError::UnknownLocation(code.to_string(), resolved.warehouse.code.clone())
                })?;
            let batch_id = resolved.batch.as_ref().map(|b| b.id);
            let bin = self
                .stock
                .adjust_bin_reservation(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    location.id, batch_id, input.qty,
                )
                .await?;
            if bin.is_none() {
                return Err(AppError::InsufficientBinStock {
                    item: resolved.item.code.clone(),
                    location: location.path.clone(),
                    requested: input.qty,
                    available: Decimal::ZERO,
                });
            }
        }

        Ok(true)
    }

    /// Libera reserva; recusa se a reserva ficaria negativa.
    pub async fn unreserve_stock(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        input: &ReserveStock,
    ) -> Result<bool, AppError> {
        if !self
            .stock
            .try_insert_posting(&mut *conn, tenant.id, &input.posting_key)
            .await?
        {
            return Ok(false);
        }

        let resolved = self
            .resolve_move(
                conn, tenant.id, &input.item_code, &input.warehouse_code,
                input.batch_no.as_deref(), None,
            )
            .await?;
        if input.qty <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(input.qty));
        }

        acquire_stock_lock(&mut *conn, tenant.id, resolved.warehouse.id, resolved.item.id).await?;

        let updated = self
            .stock
            .adjust_warehouse_reservation(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id, -input.qty,
            )
            .await?;
        if updated.is_none() {
            return Err(AppError::InsufficientReservation {
                item: resolved.item.code.clone(),
                warehouse: resolved.warehouse.code.clone(),
            });
        }

        if let Some(code) = input.location_code.as_deref() {
            let location = self
                .masters
                .find_location(&mut *conn, tenant.id, resolved.warehouse.id, code)
                .await?
                .ok_or_else(|| {
                    AppError::UnknownLocation(code.to_string(), resolved.warehouse.code.clone())
                })?;
            let batch_id = resolved.batch.as_ref().map(|b| b.id);
            let bin = self
                .stock
                .adjust_bin_reservation(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    location.id, batch_id, -input.qty,
                )
                .await?;
            if bin.is_none() {
                return Err(AppError::InsufficientReservation {
                    item: resolved.item.code.clone(),
                    warehouse: resolved.warehouse.code.clone(),
                });
            }
        }

        Ok(true)
    }

    /// Liberação de reserva usada pelos cancelamentos de SO/reserva: solta
    /// `min(reservado, qty)` e devolve o quanto soltou. Reserva já consumida
    /// pela entrega vira no-op, não erro.
    pub async fn release_reservation(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        input: &ReserveStock,
    ) -> Result<Decimal, AppError> {
        if !self
            .stock
            .try_insert_posting(&mut *conn, tenant.id, &input.posting_key)
            .await?
        {
            return Ok(Decimal::ZERO);
        }

        let resolved = self
            .resolve_move(
                conn, tenant.id, &input.item_code, &input.warehouse_code,
                input.batch_no.as_deref(), None,
            )
            .await?;

        acquire_stock_lock(&mut *conn, tenant.id, resolved.warehouse.id, resolved.item.id).await?;

        let balance = self
            .stock
            .get_warehouse_balance(&mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id)
            .await?;
        let reserved = balance.map(|b| b.reserved_qty).unwrap_or(Decimal::ZERO);
        let release = reserved.min(input.qty);
        if release <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        self.stock
            .adjust_warehouse_reservation(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id, -release,
            )
            .await?;

        if let Some(code) = input.location_code.as_deref() {
            if let Some(location) = self
                .masters
                .find_location(&mut *conn, tenant.id, resolved.warehouse.id, code)
                .await?
            {
                let batch_id = resolved.batch.as_ref().map(|b| b.id);
                if let Some(bin) = self
                    .stock
                    .get_bin_balance(
                        &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                        location.id, batch_id,
                    )
                    .await?
                {
                    let bin_release = bin.reserved_qty.min(input.qty);
                    if bin_release > Decimal::ZERO {
                        self.stock
                            .adjust_bin_reservation(
                                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                                location.id, batch_id, -bin_release,
                            )
                            .await?;
                    }
                }
            }
        }

        Ok(release)
    }

    // =========================================================================
    //  RECONCILE
    // =========================================================================

    /// Acerto para quantidade-alvo no bin. Delta positivo entra como um
    /// recebimento com increase_rate; delta negativo consome camadas do bin
    /// como uma baixa. Devolve o delta aplicado (zero = nada a fazer).
    pub async fn reconcile_stock(
        &self,
        conn: &mut PgConnection,
        tenant: &Tenant,
        input: &ReconcileStock,
    ) -> Result<Decimal, AppError> {
        if !self
            .stock
            .try_insert_posting(&mut *conn, tenant.id, &input.posting_key)
            .await?
        {
            return Ok(Decimal::ZERO);
        }

        let resolved = self
            .resolve_move(
                conn, tenant.id, &input.item_code, &input.warehouse_code,
                input.batch_no.as_deref(), None,
            )
            .await?;
        if input.target_qty < Decimal::ZERO {
            return Err(AppError::InvalidQuantity(input.target_qty));
        }

        acquire_stock_lock(&mut *conn, tenant.id, resolved.warehouse.id, resolved.item.id).await?;

        let location = self
            .masters
            .find_location(&mut *conn, tenant.id, resolved.warehouse.id, &input.location_code)
            .await?
            .ok_or_else(|| {
                AppError::UnknownLocation(input.location_code.clone(), resolved.warehouse.code.clone())
            })?;
        let batch_id = resolved.batch.as_ref().map(|b| b.id);

        let current = self
            .stock
            .get_bin_balance(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                location.id, batch_id,
            )
            .await?
            .map(|b| b.actual_qty)
            .unwrap_or(Decimal::ZERO);

        let delta = input.target_qty - current;
        let posting_ts = input.voucher.posting_ts.unwrap_or_else(Utc::now);

        if delta.is_zero() {
            return Ok(Decimal::ZERO);
        }

        if delta > Decimal::ZERO {
            if input.increase_rate < Decimal::ZERO {
                return Err(AppError::InvalidRate(input.increase_rate));
            }

            self.stock
                .upsert_warehouse_balance(&mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id, delta)
                .await?;
            self.stock
                .upsert_bin_balance(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    location.id, batch_id, delta,
                )
                .await?;
            let layer = self
                .stock
                .insert_fifo_layer(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    location.id, batch_id, delta, input.increase_rate, posting_ts,
                    input.voucher.voucher_type, &input.voucher.voucher_no, None,
                )
                .await?;
            self.stock
                .insert_ledger_entry(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    None, Some(location.id), batch_id,
                    delta, input.increase_rate, delta * input.increase_rate, Some(layer.id),
                    input.voucher.voucher_type, &input.voucher.voucher_no, posting_ts,
                )
                .await?;
            return Ok(delta);
        }

        // Redução: consome camadas do bin, espelhando a baixa
        let reduce = -delta;
        let layers = self
            .stock
            .fetch_layers_for_consumption(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                Some(location.id), batch_id,
            )
            .await?;
        let plan = fifo::plan_consumption(layers, reduce, tenant.stock_consumption_strategy)
            .map_err(|shortfall| AppError::InsufficientFifoLayers {
                item: resolved.item.code.clone(),
                warehouse: resolved.warehouse.code.clone(),
                shortfall: shortfall.missing,
            })?;

        let updated = self
            .stock
            .update_warehouse_balance(
                &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                -reduce, tenant.allow_negative_stock,
            )
            .await?;
        if updated.is_none() {
            return Err(AppError::NegativeBalance {
                item: resolved.item.code.clone(),
                warehouse: resolved.warehouse.code.clone(),
            });
        }

        for leg in &plan.legs {
            self.stock
                .decrement_layer(&mut *conn, tenant.id, leg.layer_id, leg.qty)
                .await?;
            let bin_updated = self
                .stock
                .update_bin_balance(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    leg.location_id, leg.batch_id, -leg.qty, tenant.allow_negative_stock,
                )
                .await?;
            if bin_updated.is_none() {
                return Err(AppError::NegativeBalance {
                    item: resolved.item.code.clone(),
                    warehouse: resolved.warehouse.code.clone(),
                });
            }
            let entry = self
                .stock
                .insert_ledger_entry(
                    &mut *conn, tenant.id, resolved.item.id, resolved.warehouse.id,
                    Some(leg.location_id), None, leg.batch_id,
                    -leg.qty, plan.weighted_rate, -(leg.qty * leg.rate), Some(leg.layer_id),
                    input.voucher.voucher_type, &input.voucher.voucher_no, posting_ts,
                )
                .await?;
            self.stock
                .insert_layer_consumption(&mut *conn, tenant.id, leg.layer_id, entry.id, leg.qty, leg.rate)
                .await?;
        }

        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn item(has_serial: bool) -> Item {
        Item {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            code: "SKU-A".into(),
            name: "Item A".into(),
            stock_uom_code: "UN".into(),
            has_batch: false,
            has_serial,
            is_stock_item: true,
            income_account: None,
            expense_account: None,
            stock_account: None,
            cogs_account: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn serial_input_must_match_qty() {
        let item = item(true);
        let serials = vec!["SN-1".to_string(), "SN-2".to_string()];

        assert!(StockService::validate_serial_input(&item, dec!(2), &serials).is_ok());

        let err = StockService::validate_serial_input(&item, dec!(3), &serials).unwrap_err();
        assert_eq!(err.code(), "SERIAL_COUNT_MISMATCH");
    }

    #[test]
    fn serial_qty_must_be_integer() {
        let item = item(true);
        let err = StockService::validate_serial_input(&item, dec!(1.5), &["SN-1".to_string()])
            .unwrap_err();
        assert_eq!(err.code(), "NON_INTEGER_SERIAL_QTY");
    }

    #[test]
    fn duplicate_serials_are_rejected() {
        let item = item(true);
        let serials = vec!["SN-1".to_string(), "SN-1".to_string()];
        let err = StockService::validate_serial_input(&item, dec!(2), &serials).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_SERIAL_INPUT");
    }

    #[test]
    fn non_serial_items_skip_serial_validation() {
        let item = item(false);
        assert!(StockService::validate_serial_input(&item, dec!(5.5), &[]).is_ok());
    }
}
