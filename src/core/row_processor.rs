use crate::core::column_index::ColumnMap;
use crate::core::model_client::ModelClient;
use crate::core::parser::ReplySchema;
use crate::core::prompt::PromptBuilder;
use crate::domain::model::{EnrichMode, ExtractedResult, Field, Record, RowOutcome};
use crate::domain::ports::{
    GenerativeApi, LogEntry, LogLevel, LogSink, TabularStore, ERROR_TEXT_PREFIX,
};
use crate::utils::error::{EnrichError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const INVALID_STATUS: &str = "Date invalide sau incomplete";
pub const PROCESSING_STATUS: &str = "În procesare...";
pub const SUCCESS_STATUS: &str = "Procesat cu succes";

/// Where a permanent row failure is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTarget {
    #[default]
    Status,
    /// Every output-score cell gets the error text, which also marks the row as processed.
    Outputs,
}

#[derive(Debug, Clone)]
pub struct RowPolicy {
    pub cooldown: Duration,
    pub max_cooldowns: u32,
    pub error_target: ErrorTarget,
}

impl Default for RowPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(120),
            max_cooldowns: 3,
            error_target: ErrorTarget::Status,
        }
    }
}

/// Writes a run-level status string into the designated cell, if any.
pub fn publish_status<S: TabularStore>(store: &mut S, cell: Option<(usize, usize)>, message: &str) {
    if let Some((row, col)) = cell {
        store.set_cell(row, col, message);
    }
    tracing::debug!("🔄 {}", message);
}

/// Runs one row through skip check → validation → prompt → model → parse → write-back.
pub struct RowProcessor<A: GenerativeApi> {
    columns: ColumnMap,
    builder: PromptBuilder,
    schema: ReplySchema,
    client: ModelClient<A>,
    log: Arc<dyn LogSink>,
    policy: RowPolicy,
    status_cell: Option<(usize, usize)>,
}

impl<A: GenerativeApi> RowProcessor<A> {
    pub fn new(
        columns: ColumnMap,
        builder: PromptBuilder,
        schema: ReplySchema,
        client: ModelClient<A>,
        log: Arc<dyn LogSink>,
        policy: RowPolicy,
    ) -> Self {
        Self {
            columns,
            builder,
            schema,
            client,
            log,
            policy,
            status_cell: None,
        }
    }

    pub fn with_status_cell(mut self, cell: Option<(usize, usize)>) -> Self {
        self.status_cell = cell;
        self
    }

    pub fn mode(&self) -> EnrichMode {
        self.builder.mode()
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    fn score_outputs(&self) -> Vec<Field> {
        self.mode().score_outputs(self.builder.criteria().len())
    }

    pub fn read_record<S: TabularStore>(&self, store: &S, row: usize) -> Record {
        let cells = store.get_row(row);
        let mut record = Record::new(row);
        for (field, col) in self.columns.iter() {
            if let Some(value) = cells.get(col - 1) {
                record.data.insert(field, value.clone());
            }
        }
        record
    }

    /// A row is processed once every output-score cell holds something.
    pub fn is_processed(&self, record: &Record) -> bool {
        let outputs = self.score_outputs();
        !outputs.is_empty() && outputs.iter().all(|field| !record.is_blank(*field))
    }

    pub fn missing_inputs(&self, record: &Record) -> Vec<Field> {
        self.mode()
            .required_inputs()
            .iter()
            .copied()
            .filter(|field| record.is_blank(*field))
            .collect()
    }

    pub fn display_name<'r>(&self, record: &'r Record) -> &'r str {
        let field = match self.mode() {
            EnrichMode::Company => Field::CompanyName,
            EnrichMode::Evaluation => Field::FullName,
        };
        record.get(field).unwrap_or("(fără nume)")
    }

    pub async fn process<S: TabularStore>(&self, store: &mut S, row: usize) -> RowOutcome {
        let mut record = self.read_record(store, row);
        let mut cooldowns = 0;

        loop {
            if self.is_processed(&record) {
                self.log.append(LogEntry::new(
                    LogLevel::Info,
                    format!("Skipping processed row {}", row),
                    "",
                ));
                return RowOutcome::Skipped;
            }

            let missing = self.missing_inputs(&record);
            if !missing.is_empty() {
                self.write_status(store, row, INVALID_STATUS);
                let error = EnrichError::InvalidRecord {
                    row,
                    missing: missing
                        .iter()
                        .map(|f| f.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                };
                self.log
                    .append(LogEntry::new(LogLevel::Warning, error.to_string(), format!("Row: {}", row)));
                return RowOutcome::Invalid { missing };
            }

            let name = self.display_name(&record).to_string();
            self.log.append(LogEntry::new(
                LogLevel::Info,
                format!("Processing: {}", name),
                format!("Row: {}", row),
            ));
            self.write_status(store, row, PROCESSING_STATUS);

            match self.enrich(&record).await {
                Ok((result, conclusion)) => {
                    self.write_success(store, row, &result, &conclusion);
                    self.log.append(LogEntry::new(
                        LogLevel::Info,
                        format!("Successfully processed {}", name),
                        format!("Row: {}, {}", row, conclusion),
                    ));
                    return RowOutcome::Success { result, conclusion };
                }
                Err(e) if e.is_rate_limited() && cooldowns < self.policy.max_cooldowns => {
                    cooldowns += 1;
                    let wait_message = format!(
                        "Rate limit atins. Așteptăm {} secunde înainte de a continua... ({}/{})",
                        self.policy.cooldown.as_secs(),
                        cooldowns,
                        self.policy.max_cooldowns
                    );
                    self.write_status(store, row, &wait_message);
                    publish_status(store, self.status_cell, &format!("Status: {}", wait_message));
                    self.log.append(LogEntry::new(
                        LogLevel::Warning,
                        "Rate limit reached, waiting...",
                        format!("Row: {}, Error: {}", row, e),
                    ));

                    tokio::time::sleep(self.policy.cooldown).await;

                    // 重試同一列之前重新讀取該列狀態
                    record = self.read_record(store, row);
                }
                Err(e) => {
                    self.log.append(LogEntry::new(
                        LogLevel::Error,
                        format!("Error processing {}", name),
                        format!("Row: {}, Error: {}", row, e),
                    ));
                    self.write_failure(store, row, &e);
                    return RowOutcome::Failed {
                        error: e.to_string(),
                    };
                }
            }
        }
    }

    async fn enrich(&self, record: &Record) -> Result<(ExtractedResult, String)> {
        let request = self.builder.render(record)?;
        let reply = self.client.send(&request.prompt_text).await?;
        let result = self.schema.parse(&reply.raw_text)?;
        self.log.append(LogEntry::new(
            LogLevel::Debug,
            "Parsed response",
            format!("{:?}", result.values),
        ));
        let conclusion = self.schema.conclusion(&result);
        Ok((result, conclusion))
    }

    fn write_status<S: TabularStore>(&self, store: &mut S, row: usize, message: &str) {
        if let Some(col) = self.columns.resolve(Field::Status) {
            store.set_cell(row, col, message);
        }
    }

    fn write_success<S: TabularStore>(
        &self,
        store: &mut S,
        row: usize,
        result: &ExtractedResult,
        conclusion: &str,
    ) {
        for (field, value) in &result.values {
            if let Some(col) = self.columns.resolve(*field) {
                store.set_cell(row, col, &value.to_cell());
            }
        }
        if let Some(col) = self.columns.resolve(Field::Conclusion) {
            store.set_cell(row, col, conclusion);
        }
        self.write_status(store, row, SUCCESS_STATUS);
    }

    fn write_failure<S: TabularStore>(&self, store: &mut S, row: usize, error: &EnrichError) {
        let text = format!("{}{}", ERROR_TEXT_PREFIX, error);

        let targets: Vec<usize> = match self.policy.error_target {
            ErrorTarget::Status => self.columns.resolve(Field::Status).into_iter().collect(),
            ErrorTarget::Outputs => self
                .score_outputs()
                .into_iter()
                .filter_map(|field| self.columns.resolve(field))
                .collect(),
        };

        if targets.is_empty() {
            tracing::warn!("⚠️ Row {} failed but has no cell to show the error in", row);
        }
        for col in targets {
            store.set_cell(row, col, &text);
            store.mark_error(row, col);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::log_book::LogBook;
    use crate::adapters::sheet::Sheet;
    use crate::domain::model::{EvaluationCriterion, ModelReply, ModelRequest};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedApi {
        replies: Mutex<VecDeque<ModelReply>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GenerativeApi for ScriptedApi {
        async fn generate(&self, _request: &ModelRequest) -> Result<ModelReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.replies.lock().unwrap().pop_front().unwrap_or(ModelReply {
                status_code: 500,
                raw_text: "script exhausted".to_string(),
            }))
        }
    }

    fn ok(text: &str) -> ModelReply {
        ModelReply {
            status_code: 200,
            raw_text: serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": text}]}}]
            })
            .to_string(),
        }
    }

    fn status(code: u16) -> ModelReply {
        ModelReply {
            status_code: code,
            raw_text: format!("status {}", code),
        }
    }

    fn company_columns(with_status: bool) -> ColumnMap {
        let mut letters = BTreeMap::new();
        for (field, letter) in [
            (Field::CompanyName, "B"),
            (Field::Cui, "F"),
            (Field::Website, "G"),
            (Field::Revenue, "H"),
            (Field::Profit, "I"),
            (Field::Employees, "J"),
        ] {
            letters.insert(field, letter.to_string());
        }
        if with_status {
            letters.insert(Field::Status, "K".to_string());
        }
        ColumnMap::from_letters(&letters)
    }

    fn company_processor(
        replies: Vec<ModelReply>,
        policy: RowPolicy,
        with_status: bool,
    ) -> (RowProcessor<ScriptedApi>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let api = ScriptedApi {
            replies: Mutex::new(replies.into()),
            calls: calls.clone(),
        };
        let log = Arc::new(LogBook::new(100));
        let client = ModelClient::new(api, log.clone()).with_retry(1, Duration::from_millis(1));
        let processor = RowProcessor::new(
            company_columns(with_status),
            PromptBuilder::Company,
            ReplySchema::company(),
            client,
            log,
            policy,
        );
        (processor, calls)
    }

    fn company_sheet(rows: &[&[&str]]) -> Sheet {
        let mut all: Vec<Vec<String>> = vec![[
            "Nr", "Companie", "", "", "", "CUI", "Website", "Cifra afaceri (2023)", "Profit", "Nr. angajati", "Status",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()];
        for row in rows {
            all.push(row.iter().map(|s| s.to_string()).collect());
        }
        Sheet::from_rows(all)
    }

    #[tokio::test]
    async fn test_blank_required_field_is_invalid_without_api_call() {
        let (processor, calls) = company_processor(vec![ok("Site-ul: x.ro")], RowPolicy::default(), true);
        let mut sheet = company_sheet(&[&["1", "   "]]);

        let outcome = processor.process(&mut sheet, 2).await;

        assert_eq!(
            outcome,
            RowOutcome::Invalid {
                missing: vec![Field::CompanyName]
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sheet.get_cell(2, 11), INVALID_STATUS);
    }

    #[tokio::test]
    async fn test_processed_row_is_skipped() {
        let (processor, calls) = company_processor(vec![], RowPolicy::default(), true);
        let mut sheet = company_sheet(&[&["1", "ACME", "", "", "", "RO1", "acme.ro", "10", "1", "3"]]);

        assert_eq!(processor.process(&mut sheet, 2).await, RowOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_partially_filled_outputs_are_reprocessed() {
        let (processor, calls) = company_processor(
            vec![ok("Codul fiscal: RO9\nSite-ul: acme.ro\nProfit: 5\nNr de angajati: 2\nCifra de afaceri: 7")],
            RowPolicy::default(),
            true,
        );
        let mut sheet = company_sheet(&[&["1", "ACME", "", "", "", "RO1"]]);

        let outcome = processor.process(&mut sheet, 2).await;

        assert!(matches!(outcome, RowOutcome::Success { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sheet.get_cell(2, 6), "RO9");
        assert_eq!(sheet.get_cell(2, 10), "2");
        assert_eq!(sheet.get_cell(2, 11), SUCCESS_STATUS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_cooldown_retries_same_row() {
        let policy = RowPolicy {
            cooldown: Duration::from_secs(120),
            max_cooldowns: 3,
            error_target: ErrorTarget::Status,
        };
        let (processor, calls) = company_processor(
            vec![status(429), ok("Site-ul: acme.ro")],
            policy,
            true,
        );
        let mut sheet = company_sheet(&[&["1", "ACME"]]);

        let start = tokio::time::Instant::now();
        let outcome = processor.process(&mut sheet, 2).await;

        assert!(matches!(outcome, RowOutcome::Success { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(120));
        assert_eq!(sheet.get_cell(2, 7), "acme.ro");
        assert_eq!(sheet.get_cell(2, 6), "N/A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_cooldowns_are_bounded() {
        let policy = RowPolicy {
            cooldown: Duration::from_secs(120),
            max_cooldowns: 2,
            error_target: ErrorTarget::Status,
        };
        let (processor, calls) = company_processor(
            vec![status(429), status(429), status(429), status(429)],
            policy,
            true,
        );
        let mut sheet = company_sheet(&[&["1", "ACME"]]);

        let outcome = processor.process(&mut sheet, 2).await;

        assert!(matches!(outcome, RowOutcome::Failed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(sheet.get_cell(2, 11).starts_with("Eroare: Rate limit exceeded"));
        assert!(sheet.is_error(2, 11));
    }

    #[tokio::test]
    async fn test_permanent_failure_marks_status_cell() {
        let (processor, _) = company_processor(vec![status(500)], RowPolicy::default(), true);
        let mut sheet = company_sheet(&[&["1", "ACME"]]);

        let outcome = processor.process(&mut sheet, 2).await;

        assert_eq!(
            outcome,
            RowOutcome::Failed {
                error: "API returned code 500: status 500".to_string()
            }
        );
        assert_eq!(sheet.get_cell(2, 11), "Eroare: API returned code 500: status 500");
        assert!(sheet.is_error(2, 11));
        assert_eq!(sheet.get_cell(2, 6), "");
    }

    #[tokio::test]
    async fn test_malformed_reply_written_to_every_output_cell() {
        let policy = RowPolicy {
            error_target: ErrorTarget::Outputs,
            ..RowPolicy::default()
        };
        let malformed = ModelReply {
            status_code: 200,
            raw_text: r#"{"candidates": []}"#.to_string(),
        };
        let (processor, _) = company_processor(vec![malformed], policy, false);
        let mut sheet = company_sheet(&[&["1", "ACME"]]);

        let outcome = processor.process(&mut sheet, 2).await;

        assert!(matches!(outcome, RowOutcome::Failed { .. }));
        for col in 6..=10 {
            assert!(sheet.get_cell(2, col).starts_with("Eroare: Malformed model reply"));
            assert!(sheet.is_error(2, col));
        }
        // 錯誤寫入所有輸出欄位後，該列視為已處理
        let record = processor.read_record(&sheet, 2);
        assert!(processor.is_processed(&record));
    }

    #[tokio::test]
    async fn test_evaluation_row_writes_scores_and_conclusion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let api = ScriptedApi {
            replies: Mutex::new(
                vec![ok("Competențe tehnice: 90\nExperiență: 70\nRecomandări:\n- Mai mult Rust\n- Mai puțin Java")]
                    .into(),
            ),
            calls: calls.clone(),
        };
        let log = Arc::new(LogBook::new(100));
        let criteria = vec![
            EvaluationCriterion {
                title: "Competențe tehnice".to_string(),
                prompt_fragment: "stack".to_string(),
            },
            EvaluationCriterion {
                title: "Experiență".to_string(),
                prompt_fragment: "ani".to_string(),
            },
        ];

        let mut letters = BTreeMap::new();
        for (field, letter) in [
            (Field::FullName, "A"),
            (Field::LinkedinJobTitle, "B"),
            (Field::Criterion1Score, "C"),
            (Field::Criterion2Score, "D"),
            (Field::OverallScore, "E"),
            (Field::Recommendations, "F"),
            (Field::Conclusion, "G"),
        ] {
            letters.insert(field, letter.to_string());
        }

        let processor = RowProcessor::new(
            ColumnMap::from_letters(&letters),
            PromptBuilder::Evaluation {
                job_description: "Rust backend".to_string(),
                criteria: criteria.clone(),
            },
            ReplySchema::evaluation(&criteria).unwrap(),
            ModelClient::new(api, log.clone()),
            log,
            RowPolicy::default(),
        );
        let mut sheet = Sheet::from_rows(vec![
            vec!["Nume", "Titlu", "Tehnic", "Experiență", "Scor", "Recomandări", "Concluzie"],
            vec!["Ana Pop", "Backend Engineer"],
        ]);

        let outcome = processor.process(&mut sheet, 2).await;

        assert!(matches!(outcome, RowOutcome::Success { .. }));
        assert_eq!(sheet.get_cell(2, 3), "90");
        assert_eq!(sheet.get_cell(2, 4), "70");
        assert_eq!(sheet.get_cell(2, 5), "80");
        assert_eq!(sheet.get_cell(2, 6), "- Mai mult Rust\n- Mai puțin Java");
        assert_eq!(
            sheet.get_cell(2, 7),
            "Scor general: 80/100 (potrivire puternică). Recomandări: 2"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
