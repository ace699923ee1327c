use crate::core::column_index::{check_required_headers, ColumnMap};
use crate::core::prompt::{PromptBuilder, MAX_CRITERIA};
use crate::core::row_processor::{publish_status, ErrorTarget, RowProcessor};
use crate::domain::model::{BatchSummary, EvaluationCriterion, Field, RowOutcome};
use crate::domain::ports::{DocumentSource, GenerativeApi, LogEntry, LogLevel, LogSink, TabularStore};
use crate::utils::error::{EnrichError, Result};
use crate::utils::monitor::RunMonitor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_ROWS_PER_RUN: usize = 5;
pub const DEFAULT_INTER_ROW_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Successful rows after which the run stops.
    pub max_rows_per_run: usize,
    pub inter_row_delay: Duration,
    pub status_cell: Option<(usize, usize)>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_rows_per_run: DEFAULT_MAX_ROWS_PER_RUN,
            inter_row_delay: DEFAULT_INTER_ROW_DELAY,
            status_cell: None,
        }
    }
}

/// Everything checked before the first row is touched.
pub struct StructureCheck<'a> {
    pub api_key: &'a str,
    pub required_headers: &'a [String],
    pub columns: &'a ColumnMap,
    pub builder: &'a PromptBuilder,
    pub error_target: ErrorTarget,
}

impl StructureCheck<'_> {
    pub fn run<S: TabularStore>(&self, store: &S) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(EnrichError::StructuralValidation {
                message: "API key is not configured".to_string(),
            });
        }

        check_required_headers(&store.get_row(1), self.required_headers)?;

        let mode = self.builder.mode();
        let criteria = self.builder.criteria();
        let mut essential = mode.required_inputs().to_vec();
        essential.extend(mode.score_outputs(criteria.len()));
        self.columns.require(&essential)?;

        if self.error_target == ErrorTarget::Status
            && self.columns.resolve(Field::Status).is_none()
        {
            return Err(EnrichError::StructuralValidation {
                message: "error_target = \"status\" needs a status column; map one or use \"outputs\""
                    .to_string(),
            });
        }

        if let PromptBuilder::Evaluation {
            job_description, ..
        } = self.builder
        {
            check_criteria(criteria)?;
            if job_description.trim().is_empty() {
                return Err(EnrichError::StructuralValidation {
                    message: "job description is empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

pub fn check_criteria(criteria: &[EvaluationCriterion]) -> Result<()> {
    if criteria.is_empty() || criteria.len() > MAX_CRITERIA {
        return Err(EnrichError::StructuralValidation {
            message: format!(
                "between 1 and {} evaluation criteria are required, got {}",
                MAX_CRITERIA,
                criteria.len()
            ),
        });
    }

    if let Some(blank) = criteria.iter().position(|c| c.title.trim().is_empty()) {
        return Err(EnrichError::StructuralValidation {
            message: format!("evaluation criterion {} has no title", blank + 1),
        });
    }

    Ok(())
}

/// Inline text wins over a document URL. Document failures are structural.
pub async fn load_job_description<D: DocumentSource>(
    source: &D,
    inline: Option<&str>,
    url: Option<&str>,
) -> Result<String> {
    if let Some(text) = inline.map(str::trim).filter(|text| !text.is_empty()) {
        return Ok(text.to_string());
    }

    let Some(url) = url.map(str::trim).filter(|url| !url.is_empty()) else {
        return Err(EnrichError::StructuralValidation {
            message: "evaluation mode needs a job description or a job description URL".to_string(),
        });
    };

    tracing::info!("📄 Fetching job description from {}", url);
    source
        .fetch_text(url)
        .await
        .map_err(|e| EnrichError::StructuralValidation {
            message: e.to_string(),
        })
}

/// Persists progress after each row that touched the sheet.
pub trait RowCheckpoint<S: TabularStore>: Send {
    fn save(&mut self, store: &S) -> impl Future<Output = Result<()>> + Send;
}

/// 不保存任何東西，供測試與只在記憶體中執行的批次使用
impl<S: TabularStore> RowCheckpoint<S> for () {
    fn save(&mut self, _store: &S) -> impl Future<Output = Result<()>> + Send {
        std::future::ready(Ok(()))
    }
}

/// What a run would do, without calling the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    pub pending: Vec<usize>,
    pub skipped: usize,
    pub invalid: usize,
}

pub struct BatchRunner<A: GenerativeApi> {
    processor: RowProcessor<A>,
    options: BatchOptions,
    log: Arc<dyn LogSink>,
    monitor: RunMonitor,
}

impl<A: GenerativeApi> BatchRunner<A> {
    pub fn new(processor: RowProcessor<A>, options: BatchOptions, log: Arc<dyn LogSink>) -> Self {
        Self::new_with_monitoring(processor, options, log, false)
    }

    pub fn new_with_monitoring(
        processor: RowProcessor<A>,
        options: BatchOptions,
        log: Arc<dyn LogSink>,
        monitor_enabled: bool,
    ) -> Self {
        let processor = processor.with_status_cell(options.status_cell);
        Self {
            processor,
            options,
            log,
            monitor: RunMonitor::new(monitor_enabled),
        }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn plan<S: TabularStore>(&self, store: &S) -> RunPlan {
        let mut plan = RunPlan::default();
        for row in 2..=store.last_row() {
            let record = self.processor.read_record(store, row);
            if self.processor.is_processed(&record) {
                plan.skipped += 1;
            } else if !self.processor.missing_inputs(&record).is_empty() {
                plan.invalid += 1;
            } else if plan.pending.len() < self.options.max_rows_per_run {
                plan.pending.push(row);
            }
        }
        plan
    }

    pub async fn run<S: TabularStore>(&self, store: &mut S) -> BatchSummary {
        self.run_with_checkpoint(store, &mut ()).await
    }

    /// Like `run`, but hands the store to `checkpoint` after every row that was not skipped.
    /// A failed checkpoint is logged and the batch goes on.
    pub async fn run_with_checkpoint<S, C>(
        &self,
        store: &mut S,
        checkpoint: &mut C,
    ) -> BatchSummary
    where
        S: TabularStore,
        C: RowCheckpoint<S>,
    {
        let mut summary = BatchSummary::default();
        let last_row = store.last_row();
        let total = last_row.saturating_sub(1);

        self.monitor.log_progress("Batch start", 0);
        tracing::info!(
            "🚀 Starting batch: {} data rows, up to {} per run",
            total,
            self.options.max_rows_per_run
        );
        self.log.append(LogEntry::new(
            LogLevel::Info,
            "Batch started",
            format!("Rows: {}, Max per run: {}", total, self.options.max_rows_per_run),
        ));

        for row in 2..=last_row {
            if summary.processed >= self.options.max_rows_per_run {
                summary.cap_reached = true;
                tracing::info!(
                    "⏸️ Reached {} rows for this run, remaining rows wait for the next run",
                    self.options.max_rows_per_run
                );
                break;
            }
            summary.checked += 1;

            let record = self.processor.read_record(store, row);
            let will_call = !self.processor.is_processed(&record)
                && self.processor.missing_inputs(&record).is_empty();
            if will_call {
                let name = self.processor.display_name(&record).to_string();
                publish_status(
                    store,
                    self.options.status_cell,
                    &format!("Status: Procesare {}... ({}/{})", name, row - 1, total),
                );
            }

            let outcome = self.processor.process(store, row).await;
            let touched = !matches!(outcome, RowOutcome::Skipped);
            match outcome {
                RowOutcome::Skipped => summary.skipped += 1,
                RowOutcome::Invalid { .. } => summary.invalid += 1,
                RowOutcome::Success { conclusion, .. } => {
                    summary.processed += 1;
                    tracing::info!("✅ Row {}: {}", row, conclusion);
                }
                RowOutcome::Failed { error } => {
                    summary.failed += 1;
                    tracing::error!("❌ Row {} failed: {}", row, error);
                }
            }

            publish_status(
                store,
                self.options.status_cell,
                &format!(
                    "Status: Rând {}/{}: {} actualizate, {} sărite, {} invalide, {} eșuate",
                    row - 1,
                    total,
                    summary.processed,
                    summary.skipped,
                    summary.invalid,
                    summary.failed
                ),
            );

            if touched {
                if let Err(e) = checkpoint.save(store).await {
                    tracing::error!("💥 Checkpoint after row {} failed: {}", row, e);
                    self.log.append(LogEntry::new(
                        LogLevel::Error,
                        "Checkpoint failed",
                        format!("Row {}: {}", row, e),
                    ));
                }
            }

            if will_call && row < last_row && !self.options.inter_row_delay.is_zero() {
                tokio::time::sleep(self.options.inter_row_delay).await;
            }
        }

        publish_status(
            store,
            self.options.status_cell,
            &format!(
                "Status: Procesare completă. {} rânduri actualizate.",
                summary.processed
            ),
        );
        self.log.append(LogEntry::new(
            LogLevel::Info,
            "Batch finished",
            format!(
                "Processed: {}, Skipped: {}, Invalid: {}, Failed: {}, Checked: {}",
                summary.processed, summary.skipped, summary.invalid, summary.failed, summary.checked
            ),
        ));
        self.monitor.log_progress("Batch end", summary.processed);

        summary
    }
}
