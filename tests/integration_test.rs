//! Integration tests for the conversational pipeline.
//!
//! These tests drive full turns through the orchestrator and the HTTP
//! handlers with scripted capabilities, so no LLM or embedding server is
//! needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use parking_lot::Mutex;

use doc_inquiry::api::chat::post_turn;
use doc_inquiry::config::{Config, PipelineConfig};
use doc_inquiry::error::{PipelineError, TurnError, TurnStage};
use doc_inquiry::llm::prompt::INSUFFICIENT_EVIDENCE_ANSWER;
use doc_inquiry::llm::Generator;
use doc_inquiry::models::{ChatMessage, Mode, Passage, PassageMetadata, TurnRequest};
use doc_inquiry::orchestrator::TurnOrchestrator;
use doc_inquiry::search::vector::{CorpusEntry, VectorStore};
use doc_inquiry::search::Retriever;
use doc_inquiry::session::Session;
use doc_inquiry::state::AppState;

/// Generator that answers each pipeline step with a fixed reply and records
/// every request it receives.
struct ScriptedGenerator {
    expansion: &'static str,
    rewrite: &'static str,
    answer: Result<&'static str, PipelineError>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGenerator {
    fn new(expansion: &'static str, answer: Result<&'static str, PipelineError>) -> Self {
        Self {
            expansion,
            rewrite: "rewritten query",
            answer,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn synthesis_requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .iter()
            .filter(|messages| messages[0].role == "system" && !is_rewrite(messages))
            .cloned()
            .collect()
    }
}

fn is_rewrite(messages: &[ChatMessage]) -> bool {
    messages[0].content.contains("standalone search query")
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, PipelineError> {
        self.requests.lock().push(messages.to_vec());
        if messages[0].content.contains("query expander") {
            Ok(self.expansion.to_string())
        } else if is_rewrite(messages) {
            Ok(self.rewrite.to_string())
        } else {
            self.answer.clone().map(str::to_string)
        }
    }
}

/// Retriever that returns canned passages per query, optionally after a delay.
struct CannedRetriever {
    respond: Box<dyn Fn(&str) -> (Vec<Passage>, u64) + Send + Sync>,
}

impl CannedRetriever {
    fn always(passages: Vec<Passage>) -> Self {
        Self {
            respond: Box::new(move |_| (passages.clone(), 0)),
        }
    }
}

#[async_trait]
impl Retriever for CannedRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, PipelineError> {
        let (passages, delay_ms) = (self.respond)(query);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        Ok(passages)
    }
}

fn hr_passage() -> Passage {
    Passage::new("Leave policy: 20 days/year", "hr.pdf", 0.82)
}

fn orchestrator(
    retriever: CannedRetriever,
    generator: Arc<ScriptedGenerator>,
) -> TurnOrchestrator {
    TurnOrchestrator::new(Arc::new(retriever), generator, PipelineConfig::default())
}

#[tokio::test]
async fn test_leave_policy_inquiry_end_to_end() {
    let generator = Arc::new(ScriptedGenerator::new(
        r#"["annual leave allowance", "vacation days per year"]"#,
        Ok("Employees receive 20 days of leave per year."),
    ));
    let orchestrator = orchestrator(CannedRetriever::always(vec![hr_passage()]), generator.clone());
    let mut session = Session::new();

    let response = orchestrator
        .handle_turn(&mut session, Mode::Inquiry, "What is the leave policy?")
        .await
        .unwrap();

    assert!(response.answer.contains("20 days"));
    assert_eq!(response.input, "What is the leave policy?");
    // Three queries hit the same passage; it is kept once.
    assert_eq!(response.context.len(), 1);
    assert_eq!(response.context.as_slice()[0].source(), "hr.pdf");

    let synthesis = generator.synthesis_requests();
    assert_eq!(synthesis.len(), 1);
    assert!(synthesis[0][0].content.contains("Leave policy: 20 days/year"));

    assert_eq!(session.turns().len(), 2);
    assert_eq!(session.raw_history().len(), 2);
    session.check_invariants().unwrap();
}

#[tokio::test]
async fn test_first_turn_skips_rewrite() {
    let generator = Arc::new(ScriptedGenerator::new("[]", Ok("answer")));
    let orchestrator = orchestrator(CannedRetriever::always(vec![hr_passage()]), generator.clone());
    let mut session = Session::new();

    orchestrator
        .handle_turn(&mut session, Mode::Inquiry, "What is the leave policy?")
        .await
        .unwrap();

    assert!(!generator.requests.lock().iter().any(|m| is_rewrite(m)));
}

#[tokio::test]
async fn test_synthesis_failure_commits_nothing() {
    let generator = Arc::new(ScriptedGenerator::new(
        "[]",
        Err(PipelineError::generation("model crashed")),
    ));
    let orchestrator = orchestrator(CannedRetriever::always(vec![hr_passage()]), generator);
    let mut session = Session::new();

    let err = orchestrator
        .handle_turn(&mut session, Mode::Inquiry, "What is the leave policy?")
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::Synthesis(_)));
    assert_eq!(err.stage(), TurnStage::AwaitingSynthesis);
    assert!(session.turns().is_empty());
    assert!(session.raw_history().is_empty());
    assert!(session.last_mode.is_none());
}

#[tokio::test]
async fn test_no_evidence_answers_without_generation() {
    let generator = Arc::new(ScriptedGenerator::new(
        r#"["something else"]"#,
        Ok("should never be used"),
    ));
    let orchestrator = orchestrator(CannedRetriever::always(Vec::new()), generator.clone());
    let mut session = Session::new();

    let response = orchestrator
        .handle_turn(&mut session, Mode::Inquiry, "What is the parking policy?")
        .await
        .unwrap();

    assert_eq!(response.answer, INSUFFICIENT_EVIDENCE_ANSWER);
    assert!(response.context.is_empty());
    assert!(generator.synthesis_requests().is_empty());
    assert_eq!(session.turns().len(), 2);
}

#[tokio::test]
async fn test_duplicate_passages_keep_highest_score() {
    let generator = Arc::new(ScriptedGenerator::new(r#"["leave rules"]"#, Ok("20 days.")));
    let retriever = CannedRetriever {
        respond: Box::new(|query| {
            let score = if query == "leave rules" { 0.9 } else { 0.7 };
            (vec![Passage::new("Leave policy: 20 days/year", "hr.pdf", score)], 0)
        }),
    };
    let orchestrator = orchestrator(retriever, generator);
    let mut session = Session::new();

    let response = orchestrator
        .handle_turn(&mut session, Mode::Inquiry, "What is the leave policy?")
        .await
        .unwrap();

    assert_eq!(response.context.len(), 1);
    assert!((response.context.as_slice()[0].score - 0.9).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_merge_is_independent_of_completion_order() {
    let generator = Arc::new(ScriptedGenerator::new(r#"["second", "third"]"#, Ok("ok")));
    let retriever = CannedRetriever {
        respond: Box::new(|query| {
            let delay = match query {
                "first" => 60,
                "second" => 30,
                _ => 0,
            };
            (vec![Passage::new(format!("about {query}"), format!("{query}.pdf"), 0.5)], delay)
        }),
    };
    let orchestrator = orchestrator(retriever, generator);

    let mut texts = Vec::new();
    for _ in 0..2 {
        let mut session = Session::new();
        let response = orchestrator
            .handle_turn(&mut session, Mode::DocumentSearch, "first")
            .await
            .unwrap();
        texts.push(
            response
                .context
                .iter()
                .map(|p| p.text.clone())
                .collect::<Vec<_>>(),
        );
    }

    assert_eq!(texts[0], vec!["about first", "about second", "about third"]);
    assert_eq!(texts[0], texts[1]);
}

#[tokio::test]
async fn test_histories_stay_paired_across_turns() {
    let generator = Arc::new(ScriptedGenerator::new("[]", Ok("20 days.")));
    let orchestrator = orchestrator(CannedRetriever::always(vec![hr_passage()]), generator.clone());
    let mut session = Session::new();

    let utterances = ["What is the leave policy?", "Does it carry over?", "And for contractors?"];
    for (i, utterance) in utterances.iter().enumerate() {
        let mode = if i % 2 == 0 { Mode::Inquiry } else { Mode::DocumentSearch };
        orchestrator
            .handle_turn(&mut session, mode, utterance)
            .await
            .unwrap();

        assert_eq!(session.turns().len(), 2 * (i + 1));
        assert_eq!(session.raw_history().len(), session.turns().len());
        session.check_invariants().unwrap();
    }

    // Later syntheses see the original utterances, never the rewrite.
    let synthesis = generator.synthesis_requests();
    let last = synthesis.last().unwrap();
    assert!(last.iter().all(|m| m.content != "rewritten query"));
    assert_eq!(last.last().unwrap().content, "And for contractors?");
}

#[tokio::test]
async fn test_turn_endpoint_commits_and_reports_locations() {
    let generator = Arc::new(ScriptedGenerator::new("[]", Ok("See hr.pdf.")));
    let mut passage = hr_passage();
    passage.metadata = PassageMetadata {
        file_name: Some("HR Handbook.pdf".to_string()),
        page: Some(3),
        ..PassageMetadata::new("hr.pdf")
    };
    let state = AppState::with_orchestrator(
        Config::default(),
        orchestrator(CannedRetriever::always(vec![passage]), generator),
    );
    let id = state.create_session().unwrap();

    let Json(response) = post_turn(
        State(state.clone()),
        Path(id),
        Json(TurnRequest {
            mode: Mode::DocumentSearch,
            message: "  Where is leave described?  ".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.response.input, "Where is leave described?");
    assert_eq!(response.locations.len(), 1);
    assert_eq!(response.locations[0].display_name, "HR Handbook.pdf");
    assert_eq!(response.locations[0].page, Some(4));

    let handle = state.session(&id).unwrap();
    assert_eq!(handle.session.lock().turns().len(), 2);
}

#[tokio::test]
async fn test_turn_endpoint_rejects_bad_requests() {
    let generator = Arc::new(ScriptedGenerator::new("[]", Ok("unused")));
    let state = AppState::with_orchestrator(
        Config::default(),
        orchestrator(CannedRetriever::always(Vec::new()), generator),
    );

    let id = state.create_session().unwrap();
    let (status, _) = post_turn(
        State(state.clone()),
        Path(id),
        Json(TurnRequest {
            mode: Mode::Inquiry,
            message: "   ".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing left once chat-template control tokens are stripped.
    let (status, _) = post_turn(
        State(state.clone()),
        Path(id),
        Json(TurnRequest {
            mode: Mode::Inquiry,
            message: " <|im_start|> <|im_end|> ".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(state.session(&id).unwrap().session.lock().turns().is_empty());

    let (status, _) = post_turn(
        State(state.clone()),
        Path(uuid::Uuid::new_v4()),
        Json(TurnRequest {
            mode: Mode::Inquiry,
            message: "hello".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_new_turn_supersedes_running_turn() {
    let generator = Arc::new(ScriptedGenerator::new("[]", Ok("20 days.")));
    let retriever = CannedRetriever {
        respond: Box::new(|query| {
            let delay = if query == "slow question" { 10_000 } else { 0 };
            (vec![hr_passage()], delay)
        }),
    };
    let state = AppState::with_orchestrator(Config::default(), orchestrator(retriever, generator));
    let id = state.create_session().unwrap();

    let request = |message: &str| {
        Json(TurnRequest {
            mode: Mode::Inquiry,
            message: message.to_string(),
        })
    };

    let first = tokio::spawn(post_turn(
        State(state.clone()),
        Path(id),
        request("slow question"),
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let Json(second) = post_turn(State(state.clone()), Path(id), request("What is the leave policy?"))
        .await
        .unwrap();
    assert_eq!(second.response.input, "What is the leave policy?");

    let (status, _) = tokio::time::timeout(Duration::from_secs(5), first)
        .await
        .expect("superseded turn should end promptly")
        .unwrap()
        .unwrap_err();
    assert_eq!(status, StatusCode::CONFLICT);

    let handle = state.session(&id).unwrap();
    let session = handle.session.lock();
    assert_eq!(session.turns().len(), 2);
    assert_eq!(session.turns()[0].content, "What is the leave policy?");
    session.check_invariants().unwrap();
}

#[tokio::test]
async fn test_session_limit_is_enforced() {
    let generator = Arc::new(ScriptedGenerator::new("[]", Ok("unused")));
    let config = Config {
        max_sessions: 1,
        ..Config::default()
    };
    let state = AppState::with_orchestrator(
        config,
        orchestrator(CannedRetriever::always(Vec::new()), generator),
    );

    let id = state.create_session().unwrap();
    assert!(state.create_session().is_none());
    assert!(state.remove_session(&id));
    assert!(state.create_session().is_some());
}

#[test]
fn test_vector_store_ranks_by_similarity() {
    let entry = |text: &str, source: &str, embedding: Vec<f32>| CorpusEntry {
        text: text.to_string(),
        metadata: PassageMetadata::new(source),
        embedding,
    };
    let store = VectorStore::from_entries(vec![
        entry("Leave policy: 20 days/year", "hr.pdf", vec![0.9, 0.1, 0.1]),
        entry("Expense claims within 30 days", "finance.pdf", vec![0.1, 0.9, 0.1]),
        entry("Office opens at 9", "https://intranet/office", vec![0.1, 0.1, 0.9]),
    ]);

    let results = store.search(&[0.95, 0.05, 0.05], 2);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].source(), "hr.pdf");
}
