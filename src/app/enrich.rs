use crate::adapters::document::HttpDocumentSource;
use crate::adapters::gemini::GeminiApi;
use crate::adapters::log_book::LogBook;
use crate::adapters::sheet::Sheet;
use crate::config::EnrichConfig;
use crate::core::batch::{
    load_job_description, BatchRunner, RowCheckpoint, RunPlan, StructureCheck,
};
use crate::core::column_index::ColumnMap;
use crate::core::model_client::ModelClient;
use crate::core::parser::ReplySchema;
use crate::core::prompt::PromptBuilder;
use crate::core::row_processor::RowProcessor;
use crate::domain::model::{BatchSummary, EnrichMode};
use crate::domain::ports::{
    DocumentSource, GenerativeApi, LogEntry, LogLevel, LogSink, Storage, TabularStore,
};
use crate::utils::error::Result;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Dry run: nothing was sent and nothing was saved.
    Planned(RunPlan),
    Completed(BatchSummary),
}

/// Writes the sheet and the journal back to storage.
struct PersistSheet<'a, S: Storage> {
    storage: &'a S,
    sheet_path: &'a str,
    log: &'a LogBook,
    log_path: &'a str,
}

impl<S: Storage> PersistSheet<'_, S> {
    /// 即使表格寫入失敗，日誌仍然要寫出；回傳第一個錯誤
    async fn persist(&self, sheet: &Sheet) -> Result<()> {
        let saved = sheet.save(self.storage, self.sheet_path).await;
        let flushed = self.log.flush(self.storage, self.log_path).await;
        saved.and(flushed)
    }
}

impl<S: Storage> RowCheckpoint<Sheet> for PersistSheet<'_, S> {
    fn save(&mut self, store: &Sheet) -> impl Future<Output = Result<()>> + Send {
        self.persist(store)
    }
}

/// Wires configuration, storage and the API together for one run.
pub struct EnrichApp<S: Storage> {
    storage: S,
    config: EnrichConfig,
}

impl<S: Storage> EnrichApp<S> {
    pub fn new(storage: S, config: EnrichConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    pub async fn run(&self, dry_run: bool) -> Result<RunReport> {
        let api = GeminiApi::new(
            self.config.endpoint().to_string(),
            self.config.model().to_string(),
            self.config.api_key().unwrap_or_default(),
        )
        .with_search_grounding(self.config.search_grounding())
        .with_timeout(self.config.timeout())?;

        self.run_with(api, &HttpDocumentSource::new(), dry_run).await
    }

    pub async fn run_with<A: GenerativeApi, D: DocumentSource>(
        &self,
        api: A,
        documents: &D,
        dry_run: bool,
    ) -> Result<RunReport> {
        let config = &self.config;
        let mut sheet = Sheet::load(&self.storage, &config.run.sheet).await?;
        let log = Arc::new(
            LogBook::load(&self.storage, config.log_path(), config.log_max_entries()).await?,
        );

        let prepared = self.prepare(&sheet, documents).await;
        let (builder, columns) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                log.append(LogEntry::new(
                    LogLevel::Error,
                    "Structural validation failed",
                    e.to_string(),
                ));
                log.flush(&self.storage, config.log_path()).await?;
                return Err(e);
            }
        };

        let schema = ReplySchema::for_builder(&builder)?;
        let client = ModelClient::new(api, log.clone())
            .with_retry(config.max_attempts(), config.base_delay());
        let policy = config.row_policy(&columns);
        let processor = RowProcessor::new(
            columns,
            builder,
            schema,
            client,
            log.clone(),
            policy,
        );
        let runner = BatchRunner::new_with_monitoring(
            processor,
            config.batch_options(),
            log.clone(),
            config.monitoring_enabled(),
        );

        if dry_run {
            let plan = runner.plan(&sheet);
            tracing::info!(
                "🔍 Dry run: {} rows pending, {} already processed, {} invalid",
                plan.pending.len(),
                plan.skipped,
                plan.invalid
            );
            return Ok(RunReport::Planned(plan));
        }

        let mut persist = PersistSheet {
            storage: &self.storage,
            sheet_path: &config.run.sheet,
            log: &log,
            log_path: config.log_path(),
        };
        let summary = runner.run_with_checkpoint(&mut sheet, &mut persist).await;

        persist.persist(&sheet).await?;
        tracing::info!("💾 Sheet saved to {}", config.run.sheet);

        Ok(RunReport::Completed(summary))
    }

    async fn prepare<D: DocumentSource>(
        &self,
        sheet: &Sheet,
        documents: &D,
    ) -> Result<(PromptBuilder, ColumnMap)> {
        let config = &self.config;

        let builder = match config.mode() {
            EnrichMode::Company => PromptBuilder::Company,
            EnrichMode::Evaluation => {
                let evaluation = config.evaluation.clone().unwrap_or_default();
                let job_description = load_job_description(
                    documents,
                    evaluation.job_description.as_deref(),
                    evaluation.job_description_url.as_deref(),
                )
                .await?;
                PromptBuilder::Evaluation {
                    job_description,
                    criteria: evaluation.criteria,
                }
            }
        };

        let columns = config.column_map(&sheet.get_row(1));
        let api_key = config.api_key().unwrap_or_default();
        let required_headers = config.required_headers();

        StructureCheck {
            api_key: &api_key,
            required_headers: &required_headers,
            columns: &columns,
            builder: &builder,
            error_target: config.error_target(&columns),
        }
        .run(sheet)?;

        Ok((builder, columns))
    }
}
