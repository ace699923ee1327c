use crate::domain::model::{EnrichMode, EvaluationCriterion, Field, ModelRequest, Record};
use crate::utils::error::{EnrichError, Result};

// Labels the model is told to answer with. The parser matches the same constants.
pub const LABEL_OFFICIAL_NAME: &str = "Numele oficial";
pub const LABEL_CUI: &str = "Codul fiscal";
pub const LABEL_REVENUE: &str = "Cifra de afaceri";
pub const LABEL_PROFIT: &str = "Profit";
pub const LABEL_EMPLOYEES: &str = "Nr de angajati";
pub const LABEL_WEBSITE: &str = "Site-ul";
pub const LABEL_RECOMMENDATIONS: &str = "Recomandări";

pub const MAX_CRITERIA: usize = 3;

/// Renders prompts for one run. The job description and criteria are fixed
/// for the whole run; only the record changes between rows.
#[derive(Debug, Clone)]
pub enum PromptBuilder {
    Company,
    Evaluation {
        job_description: String,
        criteria: Vec<EvaluationCriterion>,
    },
}

impl PromptBuilder {
    pub fn mode(&self) -> EnrichMode {
        match self {
            PromptBuilder::Company => EnrichMode::Company,
            PromptBuilder::Evaluation { .. } => EnrichMode::Evaluation,
        }
    }

    pub fn criteria(&self) -> &[EvaluationCriterion] {
        match self {
            PromptBuilder::Company => &[],
            PromptBuilder::Evaluation { criteria, .. } => criteria,
        }
    }

    pub fn render(&self, record: &Record) -> Result<ModelRequest> {
        let prompt_text = match self {
            PromptBuilder::Company => {
                let name = record.get(Field::CompanyName).ok_or_else(|| {
                    EnrichError::InvalidRecord {
                        row: record.row,
                        missing: Field::CompanyName.to_string(),
                    }
                })?;
                company_prompt(name)
            }
            PromptBuilder::Evaluation {
                job_description,
                criteria,
            } => evaluation_prompt(record, job_description, criteria),
        };

        Ok(ModelRequest { prompt_text })
    }
}

pub fn company_prompt(company_name: &str) -> String {
    format!(
        "Te rog caută și furnizează următoarele informații despre compania \"{name}\". \
Dacă numele este urmat de o paranteză, în paranteză găsești domeniul de activitate.
Alege cea mai probabilă companie românească și extrage detaliile pentru ea.
Important: răspunde doar cu valorile cerute, puse în locul celor dintre [].

1. Numele oficial complet al companiei
2. Codul Unic de Înregistrare (CUI)
3. Cifra de afaceri pentru anul 2023 (sau cel mai recent an disponibil)
4. Profitul pentru anul 2023 (sau cel mai recent an disponibil)
5. Numărul de angajați
6. Website-ul oficial

Caută informațiile pe listafirme.ro și alte surse oficiale românești.
Răspunde strict cu informațiile găsite, în formatul:
{official}: [nume]
{cui}: [CUI]
{revenue}: [suma]
{profit}: [suma]
{employees}: [număr]
{website}: [URL]",
        name = company_name.trim(),
        official = LABEL_OFFICIAL_NAME,
        cui = LABEL_CUI,
        revenue = LABEL_REVENUE,
        profit = LABEL_PROFIT,
        employees = LABEL_EMPLOYEES,
        website = LABEL_WEBSITE,
    )
}

fn profile_label(field: Field) -> &'static str {
    match field {
        Field::FullName => "Nume",
        Field::LinkedinJobTitle => "Titlu LinkedIn",
        Field::LinkedinCompany => "Companie curentă",
        Field::LinkedinLocation => "Locație",
        Field::LinkedinSummary => "Rezumat",
        Field::LinkedinSkills => "Competențe",
        _ => "Detalii",
    }
}

pub fn evaluation_prompt(
    record: &Record,
    job_description: &str,
    criteria: &[EvaluationCriterion],
) -> String {
    let mut prompt = String::from(
        "Ești un recrutor tehnic cu experiență. Evaluează candidatul de mai jos \
pentru postul descris, folosind strict criteriile indicate.\n\nPROFIL CANDIDAT:\n",
    );

    for field in EnrichMode::Evaluation.profile_inputs() {
        if let Some(value) = record.get(*field) {
            prompt.push_str(&format!("{}: {}\n", profile_label(*field), value));
        }
    }

    prompt.push_str("\nDESCRIEREA POSTULUI:\n");
    prompt.push_str(job_description.trim());
    prompt.push_str("\n\nCRITERII DE EVALUARE:\n");

    for (index, criterion) in criteria.iter().take(MAX_CRITERIA).enumerate() {
        prompt.push_str(&format!(
            "{}. {} (0-100): {}\n",
            index + 1,
            criterion.title.trim(),
            criterion.prompt_fragment.trim()
        ));
    }

    prompt.push_str("\nRăspunde STRICT în formatul următor, fără alt text:\n");
    for criterion in criteria.iter().take(MAX_CRITERIA) {
        prompt.push_str(&format!("{}: [scor]\n", criterion.title.trim()));
    }
    prompt.push_str(&format!("{}:\n", LABEL_RECOMMENDATIONS));
    prompt.push_str("- [recomandare 1]\n- [recomandare 2]\n- [recomandare 3, opțional]\n");

    prompt
}
