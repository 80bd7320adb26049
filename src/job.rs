//! Job record and its status lifecycle.
//!
//! A job moves strictly forward along
//! `extracting → generating → compiling → ready`, with a one-way escape to
//! `failed` from any non-terminal state. [`JobLifecycle`] is the only thing
//! that moves a job: it validates each transition before persisting it, so a
//! job can never reach `ready` by any other route.

use crate::error::{PipelineError, StoreError};
use crate::store::JobStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Opaque job identifier, assigned at admission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Extracting,
    Generating,
    Compiling,
    Ready,
    Failed,
}

impl JobStatus {
    /// `ready` and `failed` end the lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Failed)
    }

    /// Whether `self → next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Extracting, JobStatus::Generating)
            | (JobStatus::Generating, JobStatus::Compiling)
            | (JobStatus::Compiling, JobStatus::Ready) => true,
            (current, JobStatus::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Extracting => "extracting",
            JobStatus::Generating => "generating",
            JobStatus::Compiling => "compiling",
            JobStatus::Ready => "ready",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Kind of source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Word-processor document (`.docx`).
    Docx,
    /// Page-image document (`.pdf`).
    Pdf,
}

impl FileType {
    /// Guess the file type from a path's extension.
    pub fn from_extension(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            FileType::Docx => "docx",
            FileType::Pdf => "pdf",
        }
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docx" | "word" => Ok(FileType::Docx),
            "pdf" => Ok(FileType::Pdf),
            other => Err(format!("unsupported file type '{other}' (expected docx or pdf)")),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Docx => f.write_str("docx"),
            FileType::Pdf => f.write_str("pdf"),
        }
    }
}

/// Descriptive metadata supplied at admission and embedded in the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMeta {
    pub program: String,
    pub subject: String,
    pub chapter: String,
}

impl JobMeta {
    pub fn new(
        program: impl Into<String>,
        subject: impl Into<String>,
        chapter: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            subject: subject.into(),
            chapter: chapter.into(),
        }
    }

    /// Short running-header string used in the rendered page header.
    pub fn header_text(&self) -> String {
        [&self.program, &self.subject, &self.chapter]
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// The persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub meta: JobMeta,
    pub file_type: FileType,
    pub status: JobStatus,
    /// Extracted source text. Transient: never persisted.
    #[serde(skip)]
    pub extracted_text: Option<String>,
    pub manual_text: Option<String>,
    pub pdf_location: Option<String>,
    pub docx_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly admitted job, already in `extracting`.
    pub fn new(id: JobId, meta: JobMeta, file_type: FileType) -> Self {
        let now = Utc::now();
        Self {
            id,
            meta,
            file_type,
            status: JobStatus::Extracting,
            extracted_text: None,
            manual_text: None,
            pdf_location: None,
            docx_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Write the fields carried by `update` onto this record.
    ///
    /// Does not validate the transition; that is [`JobLifecycle`]'s job.
    pub fn apply(&mut self, update: &JobUpdate, at: DateTime<Utc>) {
        self.status = update.status();
        self.updated_at = at;
        match update {
            JobUpdate::Generating { extracted_text } => {
                self.extracted_text = Some(extracted_text.clone());
            }
            JobUpdate::Failed => {}
            JobUpdate::Compiling { manual_text } => {
                self.manual_text = Some(manual_text.clone());
            }
            JobUpdate::Ready {
                pdf_location,
                docx_location,
            } => {
                self.pdf_location = Some(pdf_location.clone());
                self.docx_location = Some(docx_location.clone());
            }
        }
    }
}

/// One persisted status change, with exactly the fields that step records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Generating { extracted_text: String },
    Compiling { manual_text: String },
    Ready {
        pdf_location: String,
        docx_location: String,
    },
    /// Status and timestamp only; failed jobs carry no partial artifacts.
    Failed,
}

impl JobUpdate {
    pub fn status(&self) -> JobStatus {
        match self {
            JobUpdate::Generating { .. } => JobStatus::Generating,
            JobUpdate::Compiling { .. } => JobStatus::Compiling,
            JobUpdate::Ready { .. } => JobStatus::Ready,
            JobUpdate::Failed => JobStatus::Failed,
        }
    }
}

/// Drives one job's status through the store, refusing illegal steps.
pub struct JobLifecycle<'a> {
    job_id: JobId,
    status: JobStatus,
    history: Vec<JobStatus>,
    store: &'a dyn JobStore,
}

impl<'a> JobLifecycle<'a> {
    /// Start tracking a job admitted in `extracting`.
    pub fn new(job_id: JobId, store: &'a dyn JobStore) -> Self {
        Self {
            job_id,
            status: JobStatus::Extracting,
            history: Vec::new(),
            store,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Statuses this lifecycle has left, oldest first.
    pub fn history(&self) -> &[JobStatus] {
        &self.history
    }

    /// Validate and persist a transition.
    pub async fn advance(&mut self, update: JobUpdate) -> Result<(), PipelineError> {
        let next = update.status();
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.status,
                to: next,
            });
        }

        self.store
            .persist(&self.job_id, &update, Utc::now())
            .await
            .map_err(PipelineError::from)?;

        debug!(job_id = %self.job_id, "status {} → {}", self.status, next);
        self.history.push(self.status);
        self.status = next;
        Ok(())
    }

    /// Move to `failed`, if the job is not already terminal.
    pub async fn fail(&mut self) -> Result<(), StoreError> {
        if self.status.is_terminal() {
            return Ok(());
        }
        self.store
            .persist(&self.job_id, &JobUpdate::Failed, Utc::now())
            .await?;
        info!(job_id = %self.job_id, "job failed during {}", self.status);
        self.history.push(self.status);
        self.status = JobStatus::Failed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryJobStore;

    fn admitted(store: &InMemoryJobStore) -> JobId {
        let id = JobId::from("job-1");
        store.insert(Job::new(
            id.clone(),
            JobMeta::new("Foundation", "Physics", "Kinematics"),
            FileType::Docx,
        ));
        id
    }

    fn generating() -> JobUpdate {
        JobUpdate::Generating {
            extracted_text: "1. Q".into(),
        }
    }

    #[test]
    fn legal_transitions() {
        use JobStatus::*;
        assert!(Extracting.can_transition_to(Generating));
        assert!(Generating.can_transition_to(Compiling));
        assert!(Compiling.can_transition_to(Ready));
        for s in [Extracting, Generating, Compiling] {
            assert!(s.can_transition_to(Failed), "{s} → failed");
        }
    }

    #[test]
    fn illegal_transitions() {
        use JobStatus::*;
        assert!(!Extracting.can_transition_to(Compiling));
        assert!(!Extracting.can_transition_to(Ready));
        assert!(!Generating.can_transition_to(Ready));
        assert!(!Compiling.can_transition_to(Generating));
        assert!(!Ready.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Extracting));
        assert!(!Ready.can_transition_to(Ready));
    }

    #[tokio::test]
    async fn happy_path_persists_fields() {
        let store = InMemoryJobStore::default();
        let id = admitted(&store);
        let mut lc = JobLifecycle::new(id.clone(), &store);

        lc.advance(JobUpdate::Generating {
            extracted_text: "1. Q\n(a) x".into(),
        })
        .await
        .unwrap();
        lc.advance(JobUpdate::Compiling {
            manual_text: "1. Q".into(),
        })
        .await
        .unwrap();
        lc.advance(JobUpdate::Ready {
            pdf_location: "a.pdf".into(),
            docx_location: "a.docx".into(),
        })
        .await
        .unwrap();

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Ready);
        assert_eq!(job.extracted_text.as_deref(), Some("1. Q\n(a) x"));
        assert_eq!(job.manual_text.as_deref(), Some("1. Q"));
        assert_eq!(job.pdf_location.as_deref(), Some("a.pdf"));
        assert_eq!(job.docx_location.as_deref(), Some("a.docx"));
        assert_eq!(
            lc.history(),
            &[JobStatus::Extracting, JobStatus::Generating, JobStatus::Compiling]
        );
    }

    #[tokio::test]
    async fn skipping_a_stage_is_rejected() {
        let store = InMemoryJobStore::default();
        let id = admitted(&store);
        let mut lc = JobLifecycle::new(id.clone(), &store);

        let err = lc
            .advance(JobUpdate::Ready {
                pdf_location: "x".into(),
                docx_location: "y".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Extracting);
    }

    #[tokio::test]
    async fn fail_records_no_artifacts() {
        let store = InMemoryJobStore::default();
        let id = admitted(&store);
        let mut lc = JobLifecycle::new(id.clone(), &store);

        lc.advance(generating()).await.unwrap();
        lc.fail().await.unwrap();

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.manual_text.is_none());
        assert!(job.pdf_location.is_none());

        // terminal: a second fail is a no-op, further advances are refused
        lc.fail().await.unwrap();
        assert!(lc.advance(generating()).await.is_err());
    }

    #[test]
    fn file_type_parsing() {
        assert_eq!("DOCX".parse::<FileType>().unwrap(), FileType::Docx);
        assert_eq!("pdf".parse::<FileType>().unwrap(), FileType::Pdf);
        assert!("odt".parse::<FileType>().is_err());
        assert_eq!(
            FileType::from_extension(std::path::Path::new("ws/ch1.docx")),
            Some(FileType::Docx)
        );
    }

    #[test]
    fn header_text_skips_blank_fields() {
        let meta = JobMeta::new("Olympiad", "", "Algebra");
        assert_eq!(meta.header_text(), "Olympiad | Algebra");
    }
}
