use crate::loads::LoadRecord;
use crate::models::{Exercise, LoadEntry, Plan, Student};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const STUDENTS_TABLE: &str = "clients";
const PLANS_TABLE: &str = "planos_de_treino";
const LOADS_TABLE: &str = "treinos_realizados";
const LOAD_CONFLICT_KEY: &str = "aluno_id,exercicio_nome,data_treino";

/// Determine the API key to use for store requests.
///
/// If the `TRAINING_STORE_API_KEY` environment variable is set, its value
/// takes precedence over any key provided in the application settings.
pub fn resolve_api_key(settings_key: Option<&str>) -> Option<String> {
    std::env::var("TRAINING_STORE_API_KEY")
        .ok()
        .or_else(|| settings_key.map(|s| s.to_string()))
}

pub fn resolve_store_url(settings_url: Option<&str>) -> Option<String> {
    std::env::var("TRAINING_STORE_URL")
        .ok()
        .or_else(|| settings_url.map(|s| s.to_string()))
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("store responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("request task failed: {0}")]
    TaskFailed(String),
}

/// The record store holding students, plans and load history.
#[allow(async_fn_in_trait)]
pub trait TrainingStore {
    async fn find_student_by_credential(&self, credential: &str) -> Result<Option<Student>, StoreError>;

    async fn find_student_by_id(&self, student_id: &str) -> Result<Option<Student>, StoreError>;

    /// Plans of a student, newest swap date first.
    async fn list_plans(&self, student_id: &str) -> Result<Vec<Plan>, StoreError>;

    /// Load history of a student for the given exercise names, newest first.
    async fn list_load_entries(
        &self,
        student_id: &str,
        exercise_names: &[String],
    ) -> Result<Vec<LoadEntry>, StoreError>;

    /// Insert or overwrite loads keyed on (student, exercise name, date).
    async fn upsert_load_entries(&self, records: &[LoadRecord]) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Wire records

#[derive(Debug, Deserialize)]
struct StudentRow {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    nome: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanRow {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    data_troca: Option<String>,
    #[serde(default)]
    observacoes: Option<String>,
    #[serde(default)]
    exercicios: Option<Vec<ExerciseRow>>,
}

#[derive(Debug, Deserialize)]
struct ExerciseRow {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    exercicio: Option<String>,
    #[serde(default)]
    series: Value,
    #[serde(default)]
    repeticoes: Value,
    #[serde(default)]
    tecnica: Option<String>,
    #[serde(default, rename = "grupoTecnicaId")]
    grupo_tecnica_id: Value,
    #[serde(default)]
    gif_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoadRow {
    #[serde(default)]
    aluno_id: Value,
    #[serde(default)]
    exercicio_nome: Option<String>,
    #[serde(default)]
    carga_kg: Value,
    #[serde(default)]
    data_treino: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoadWriteRow<'a> {
    aluno_id: &'a str,
    exercicio_nome: &'a str,
    carga_kg: f64,
    data_treino: String,
}

/// Ids arrive as strings or numbers depending on the table.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn parse_store_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.split('T').next().unwrap_or("");
    NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d").ok()
}

impl TryFrom<StudentRow> for Student {
    type Error = StoreError;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        let id = value_text(&row.id).ok_or_else(|| StoreError::Malformed("student without id".into()))?;
        Ok(Student {
            display_name: row.nome.unwrap_or_default().trim().to_string(),
            id,
        })
    }
}

impl TryFrom<ExerciseRow> for Exercise {
    type Error = StoreError;

    fn try_from(row: ExerciseRow) -> Result<Self, Self::Error> {
        let name = non_blank(row.exercicio)
            .ok_or_else(|| StoreError::Malformed("exercise without name".into()))?;
        let id = value_text(&row.id)
            .ok_or_else(|| StoreError::Malformed(format!("exercise {name:?} without id")))?;
        let set_count = match &row.series {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            StoreError::Malformed(format!("exercise {name:?} has invalid set count {}", row.series))
        })?;
        let rep_spec = match &row.repeticoes {
            Value::Null => String::new(),
            other => value_text(other).unwrap_or_default(),
        };
        Ok(Exercise {
            id,
            name,
            set_count,
            rep_spec,
            technique: non_blank(row.tecnica),
            technique_group: value_text(&row.grupo_tecnica_id),
            image_ref: non_blank(row.gif_url),
        })
    }
}

impl TryFrom<PlanRow> for Plan {
    type Error = StoreError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let id = value_text(&row.id).ok_or_else(|| StoreError::Malformed("plan without id".into()))?;
        let name = non_blank(row.name)
            .ok_or_else(|| StoreError::Malformed(format!("plan {id} without name")))?;
        let swap_date = row
            .data_troca
            .as_deref()
            .and_then(parse_store_date)
            .ok_or_else(|| StoreError::Malformed(format!("plan {id} has no valid swap date")))?;
        let exercises = row
            .exercicios
            .unwrap_or_default()
            .into_iter()
            .map(Exercise::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Plan {
            id,
            name,
            swap_date,
            notes: non_blank(row.observacoes),
            exercises,
        })
    }
}

impl TryFrom<LoadRow> for LoadEntry {
    type Error = StoreError;

    fn try_from(row: LoadRow) -> Result<Self, Self::Error> {
        let exercise_name = non_blank(row.exercicio_nome)
            .ok_or_else(|| StoreError::Malformed("load entry without exercise name".into()))?;
        let load = match &row.carga_kg {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| StoreError::Malformed(format!("load entry for {exercise_name:?} has no load")))?;
        let recorded_on = row
            .data_treino
            .as_deref()
            .and_then(parse_store_date)
            .ok_or_else(|| StoreError::Malformed(format!("load entry for {exercise_name:?} has no date")))?;
        Ok(LoadEntry {
            student_id: value_text(&row.aluno_id).unwrap_or_default(),
            exercise_name,
            load,
            recorded_on,
        })
    }
}

// ---------------------------------------------------------------------------
// REST store

/// Record store reached over a PostgREST-style HTTP API.
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

fn map_error(err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(401, r) => StoreError::Unauthorized(r.into_string().unwrap_or_default()),
        ureq::Error::Status(403, r) => StoreError::Forbidden(r.into_string().unwrap_or_default()),
        ureq::Error::Status(status, r) => StoreError::Status {
            status,
            body: r.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(t) => StoreError::Transport(t.to_string()),
    }
}

/// PostgREST `in.(...)` filter with every name quoted.
fn in_filter(names: &[String]) -> String {
    let quoted: Vec<String> = names
        .iter()
        .map(|n| format!("\"{}\"", n.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authorized(&self, req: ureq::Request) -> ureq::Request {
        req.set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Accept", "application/json")
    }

    fn get_rows<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>, StoreError> {
        let mut req = self.authorized(self.agent.get(&self.table_url(table)));
        for (key, value) in query {
            req = req.query(key, value);
        }
        let body = req
            .call()
            .map_err(map_error)?
            .into_string()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| StoreError::Malformed(format!("{table}: {e}")))
    }

    fn fetch_student(&self, column: &str, value: &str) -> Result<Option<Student>, StoreError> {
        let rows: Vec<StudentRow> = self.get_rows(
            STUDENTS_TABLE,
            &[
                ("select", "id,nome".to_string()),
                (column, format!("eq.{value}")),
                ("limit", "1".to_string()),
            ],
        )?;
        rows.into_iter().next().map(Student::try_from).transpose()
    }

    pub fn fetch_plans(&self, student_id: &str) -> Result<Vec<Plan>, StoreError> {
        let rows: Vec<PlanRow> = self.get_rows(
            PLANS_TABLE,
            &[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{student_id}")),
                ("order", "data_troca.desc".to_string()),
            ],
        )?;
        rows.into_iter().map(Plan::try_from).collect()
    }

    pub fn fetch_load_entries(&self, student_id: &str, names: &[String]) -> Result<Vec<LoadEntry>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<LoadRow> = self.get_rows(
            LOADS_TABLE,
            &[
                ("select", "aluno_id,exercicio_nome,carga_kg,data_treino".to_string()),
                ("aluno_id", format!("eq.{student_id}")),
                ("exercicio_nome", in_filter(names)),
                ("order", "data_treino.desc".to_string()),
            ],
        )?;
        rows.into_iter().map(LoadEntry::try_from).collect()
    }

    pub fn upsert_loads(&self, records: &[LoadRecord]) -> Result<(), StoreError> {
        let rows: Vec<LoadWriteRow> = records
            .iter()
            .map(|r| LoadWriteRow {
                aluno_id: &r.student_id,
                exercicio_nome: &r.exercise_name,
                carga_kg: r.load,
                data_treino: r.recorded_on.format("%Y-%m-%d").to_string(),
            })
            .collect();
        self.authorized(self.agent.post(&self.table_url(LOADS_TABLE)))
            .query("on_conflict", LOAD_CONFLICT_KEY)
            .set("Prefer", "resolution=merge-duplicates,return=minimal")
            .send_json(&rows)
            .map_err(map_error)?;
        Ok(())
    }

    async fn run_blocking<T, F>(&self, job: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(RestStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || job(store))
            .await
            .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

impl TrainingStore for RestStore {
    async fn find_student_by_credential(&self, credential: &str) -> Result<Option<Student>, StoreError> {
        let credential = credential.to_string();
        self.run_blocking(move |s| s.fetch_student("credencial", &credential))
            .await
    }

    async fn find_student_by_id(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        let id = student_id.to_string();
        self.run_blocking(move |s| s.fetch_student("id", &id)).await
    }

    async fn list_plans(&self, student_id: &str) -> Result<Vec<Plan>, StoreError> {
        let id = student_id.to_string();
        self.run_blocking(move |s| s.fetch_plans(&id)).await
    }

    async fn list_load_entries(
        &self,
        student_id: &str,
        exercise_names: &[String],
    ) -> Result<Vec<LoadEntry>, StoreError> {
        let id = student_id.to_string();
        let names = exercise_names.to_vec();
        self.run_blocking(move |s| s.fetch_load_entries(&id, &names))
            .await
    }

    async fn upsert_load_entries(&self, records: &[LoadRecord]) -> Result<(), StoreError> {
        let records = records.to_vec();
        self.run_blocking(move |s| s.upsert_loads(&records)).await
    }
}
