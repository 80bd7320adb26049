//! Whole-pipeline tests against scripted stand-ins for the LLM, pandoc and
//! the LaTeX engine. No network access and no real toolchain required.

#![cfg(unix)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use worksheet_manual::{
    CompileError, CompletionClient, CompletionError, CompletionRequest, ConfigurationError,
    FileType, FsArtifactStore, InMemoryJobStore, Job, JobId, JobMeta, JobStatus, JobStore,
    JobUpdate, Pipeline, PipelineConfig, PipelineError, StoreError,
};

// ── Stand-ins ────────────────────────────────────────────────────────────────

/// Answers every numbered question in the prompt's worksheet block.
#[derive(Default)]
struct ScriptedClient {
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.prompt;
        let worksheet = prompt.rsplitn(3, "\"\"\"").nth(1).unwrap_or("");

        let mut out = String::new();
        if prompt.contains("Start the manual with") {
            out.push_str(
                "Solutions Manual: JEE Physics\n\
                 Worksheet: Kinematics\n\
                 Syllabus Topics Covered: motion\n\
                 Answer Key & Detailed Solutions\n\n",
            );
        }
        for line in worksheet.lines() {
            if let Some((num, rest)) = line.trim().split_once(". ") {
                if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) {
                    out.push_str(&format!(
                        "{num}. {rest}\nKey: (a)\nSolution:\n• Apply $v = u + at$.\n\n"
                    ));
                }
            }
        }
        Ok(out)
    }
}

/// Records every persisted status on top of an in-memory store.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryJobStore,
    statuses: Mutex<Vec<JobStatus>>,
}

impl RecordingStore {
    fn statuses(&self) -> Vec<JobStatus> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn persist(
        &self,
        id: &JobId,
        update: &JobUpdate,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.statuses.lock().unwrap().push(update.status());
        self.inner.persist(id, update, at).await
    }
}

fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

/// Refuses to read docx (so extraction falls back to native paragraphs) and
/// copies its input to `-o` for every other conversion.
fn fake_pandoc(dir: &Path) -> String {
    script(
        dir,
        "pandoc",
        r#"src="$1"; shift
reader=""; out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -f) reader="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ "$reader" = "docx" ]; then echo "no docx reader here" >&2; exit 2; fi
cp "$src" "$out""#,
    )
}

/// "Typesets" by copying the LaTeX source to the PDF.
fn fake_latex(dir: &Path) -> String {
    script(dir, "latex", "cp manual.tex manual.pdf")
}

fn broken_latex(dir: &Path) -> String {
    script(
        dir,
        "latex",
        "echo '! Missing $ inserted.' > manual.log\necho 'l.42 x^2' >> manual.log\nexit 1",
    )
}

fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<w:document xmlns:w="urn:w" xmlns:m="urn:m"><w:body>{body}</w:body></w:document>"#
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

const FIVE_QUESTIONS: &[&str] = &[
    "1. A car starts from rest. Find v after 2 s.",
    "(a) 2 (b) 4 (c) 6 (d) 8",
    "2. Define displacement.",
    "3. Define velocity.",
    "4. Define acceleration.",
    "5. A ball is dropped from 20 m. Find t.",
];

struct Harness {
    pipeline: Pipeline,
    jobs: Arc<RecordingStore>,
    client: Arc<ScriptedClient>,
    out: tempfile::TempDir,
    _bin: tempfile::TempDir,
}

fn harness(latex: fn(&Path) -> String) -> Harness {
    let bin = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::default());
    let config = PipelineConfig::builder()
        .chunk_size(4)
        .pandoc_program(fake_pandoc(bin.path()))
        .latex_program(latex(bin.path()))
        .ocr_command(Vec::new())
        .completion_client(client.clone())
        .build()
        .unwrap();
    let jobs = Arc::new(RecordingStore::default());
    let pipeline = Pipeline::new(
        config,
        jobs.clone(),
        Arc::new(FsArtifactStore::new(out.path())),
    )
    .unwrap();
    Harness {
        pipeline,
        jobs,
        client,
        out,
        _bin: bin,
    }
}

fn admit(h: &Harness, file_type: FileType) -> (JobId, JobMeta) {
    let id = JobId::new();
    let meta = JobMeta::new("JEE", "Physics", "Kinematics");
    h.jobs
        .inner
        .insert(Job::new(id.clone(), meta.clone(), file_type));
    (id, meta)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn docx_worksheet_reaches_ready_with_both_artifacts() {
    let h = harness(fake_latex);
    let (id, meta) = admit(&h, FileType::Docx);

    h.pipeline
        .run_pipeline(&id, &docx(FIVE_QUESTIONS), FileType::Docx, &meta)
        .await
        .unwrap();

    // five questions at four per chunk
    assert_eq!(h.client.calls(), 2);
    assert_eq!(
        h.jobs.statuses(),
        vec![JobStatus::Generating, JobStatus::Compiling, JobStatus::Ready]
    );

    let job = h.jobs.inner.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Ready);
    let extracted = job.extracted_text.as_deref().unwrap_or("");
    assert!(extracted.contains("1. A car starts from rest"), "{extracted}");

    let manual = job.manual_text.unwrap();
    assert_eq!(manual.matches("Solutions Manual").count(), 1);
    for n in 1..=5 {
        assert!(manual.contains(&format!("{n}. ")), "question {n} missing");
    }

    let pdf_path = job.pdf_location.unwrap();
    let docx_path = job.docx_location.unwrap();
    assert!(Path::new(&pdf_path).starts_with(h.out.path()));
    let tex = std::fs::read_to_string(&pdf_path).unwrap();
    assert!(tex.contains("\\documentclass"));
    assert!(tex.contains("Answer Key \\& Detailed Solutions"));
    assert!(!std::fs::read(&docx_path).unwrap().is_empty());
}

#[tokio::test]
async fn latex_failure_marks_job_failed_with_log_tail() {
    let h = harness(broken_latex);
    let (id, meta) = admit(&h, FileType::Docx);

    let err = h
        .pipeline
        .run_pipeline(&id, &docx(FIVE_QUESTIONS), FileType::Docx, &meta)
        .await
        .unwrap_err();

    match err {
        PipelineError::Compile(CompileError::Failed { log_tail, .. }) => {
            assert!(log_tail.contains("Missing $ inserted"), "{log_tail}");
            assert!(log_tail.contains("l.42"), "{log_tail}");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        h.jobs.statuses(),
        vec![JobStatus::Generating, JobStatus::Compiling, JobStatus::Failed]
    );
    let job = h.jobs.inner.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.pdf_location.is_none());
    assert!(job.docx_location.is_none());
}

#[tokio::test]
async fn unreadable_upload_fails_before_generation() {
    let h = harness(fake_latex);
    let (id, meta) = admit(&h, FileType::Docx);

    let err = h
        .pipeline
        .run_pipeline(&id, b"not a zip archive", FileType::Docx, &meta)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Extraction(_)), "{err}");
    assert_eq!(h.client.calls(), 0);
    assert_eq!(h.jobs.statuses(), vec![JobStatus::Failed]);
}

#[tokio::test]
async fn missing_tools_fail_the_job_without_any_calls() {
    let out = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::default());
    let config = PipelineConfig::builder()
        .pandoc_program("no-such-pandoc-binary")
        .latex_program("no-such-latex-binary")
        .completion_client(client.clone())
        .build()
        .unwrap();
    let jobs = Arc::new(InMemoryJobStore::default());
    let pipeline = Pipeline::new(
        config,
        jobs.clone(),
        Arc::new(FsArtifactStore::new(out.path())),
    )
    .unwrap();

    let id = JobId::new();
    let meta = JobMeta::new("JEE", "Physics", "Kinematics");
    jobs.insert(Job::new(id.clone(), meta.clone(), FileType::Docx));

    let err = pipeline
        .run_pipeline(&id, &docx(FIVE_QUESTIONS), FileType::Docx, &meta)
        .await
        .unwrap_err();

    match err {
        PipelineError::Configuration(ConfigurationError::MissingTools { tools }) => {
            assert_eq!(tools.len(), 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.calls(), 0);
    assert_eq!(jobs.get(&id).unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn independent_jobs_run_concurrently() {
    let h = harness(fake_latex);
    let (a, meta_a) = admit(&h, FileType::Docx);
    let (b, meta_b) = admit(&h, FileType::Docx);

    let first = h
        .pipeline
        .spawn(a.clone(), docx(FIVE_QUESTIONS), FileType::Docx, meta_a);
    let second = h
        .pipeline
        .spawn(b.clone(), docx(&FIVE_QUESTIONS[..2]), FileType::Docx, meta_b);
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let job_a = h.jobs.inner.get(&a).unwrap();
    let job_b = h.jobs.inner.get(&b).unwrap();
    assert_eq!(job_a.status, JobStatus::Ready);
    assert_eq!(job_b.status, JobStatus::Ready);
    assert_ne!(job_a.pdf_location, job_b.pdf_location);
    // 2 chunks for the first job, 1 for the second
    assert_eq!(h.client.calls(), 3);
}
