// src/config.rs

use std::sync::Arc;
use std::{env, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::db::{
    AuditRepository, DocumentsRepository, GlRepository, MastersRepository, ReportRepository,
    StockRepository,
};
use crate::services::{
    cancel_service::CancelService,
    gl_service::GlService,
    report_service::ReportService,
    stock_service::StockService,
    vouchers::{VoucherContext, VoucherRegistry, VoucherService},
};

// Timeout padrão por operação; configurável via STATEMENT_TIMEOUT_MS
const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub statement_timeout_ms: u64,

    pub masters_repo: MastersRepository,
    pub stock_repo: StockRepository,
    pub gl_repo: GlRepository,
    pub documents_repo: DocumentsRepository,
    pub audit_repo: AuditRepository,
    pub report_repo: ReportRepository,

    pub stock_service: StockService,
    pub cancel_service: CancelService,
    pub gl_service: GlService,
    pub report_service: ReportService,
    pub voucher_service: VoucherService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");
        let statement_timeout_ms = env::var("STATEMENT_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_STATEMENT_TIMEOUT_MS);

        let db_pool = PgPoolOptions::new()
            .max_connections(
                env::var("DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(5),
            )
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let masters_repo = MastersRepository::new(db_pool.clone());
        let stock_repo = StockRepository::new(db_pool.clone());
        let gl_repo = GlRepository::new(db_pool.clone());
        let documents_repo = DocumentsRepository::new(db_pool.clone());
        let audit_repo = AuditRepository::new(db_pool.clone());
        let report_repo = ReportRepository::new(db_pool.clone());

        // Serviços
        let stock_service = StockService::new(masters_repo.clone(), stock_repo.clone());
        let cancel_service = CancelService::new(stock_repo.clone());
        let gl_service = GlService::new(gl_repo.clone());
        let report_service = ReportService::new(report_repo.clone());

        // Orquestradores: o registro é uma tabela plana montada aqui, uma vez
        let ctx = VoucherContext {
            masters: masters_repo.clone(),
            docs: documents_repo.clone(),
            stock: stock_service.clone(),
            cancel: cancel_service.clone(),
            gl: gl_service.clone(),
            audit: audit_repo.clone(),
        };
        let registry = Arc::new(VoucherRegistry::build());
        let voucher_service = VoucherService::new(
            db_pool.clone(),
            ctx,
            registry,
            statement_timeout_ms,
        );

        Ok(Self {
            db_pool,
            statement_timeout_ms,
            masters_repo,
            stock_repo,
            gl_repo,
            documents_repo,
            audit_repo,
            report_repo,
            stock_service,
            cancel_service,
            gl_service,
            report_service,
            voucher_service,
        })
    }
}
