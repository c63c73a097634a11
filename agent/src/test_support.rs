//! Scripted collaborators and fixtures for tests.
//!
//! Every double replays a fixed script and records what it was asked, so
//! tests can drive the research loop deterministically without processes or
//! network access.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;

use anyhow::{Context, Result, anyhow};

use crate::agents::planner::Planner;
use crate::agents::reasoner::Reasoner;
use crate::core::failure::{FailureClass, FailureEvent};
use crate::core::types::{
    ContextBlock, FetchedPage, PlannerReply, PlannerSnapshot, ReasoningOutput, VerifiedClaim,
};
use crate::io::evidence_store::EvidenceStore;
use crate::io::executor::{ExecRequest, Executor};
use crate::io::fetch::Fetcher;
use crate::io::retrieval::Retriever;
use crate::io::search::Searcher;

/// Executor that writes predetermined final messages instead of spawning a process.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    outputs: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub fn new(outputs: Vec<&str>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into_iter().map(str::to_string).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn last_request(&self) -> Option<ExecRequest> {
        self.requests.borrow().last().cloned()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        self.requests.borrow_mut().push(request.clone());
        let output = self
            .outputs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("executor script exhausted"))?;
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        fs::write(&request.output_path, output)
            .with_context(|| format!("write {}", request.output_path.display()))
    }
}

/// Planner replaying replies in order. An exhausted script is an error.
#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    replies: RefCell<VecDeque<Result<PlannerReply, String>>>,
    snapshots: RefCell<Vec<PlannerSnapshot>>,
}

impl ScriptedPlanner {
    pub fn new(replies: Vec<PlannerReply>) -> Self {
        Self::from_results(replies.into_iter().map(Ok).collect())
    }

    pub fn from_results(replies: Vec<Result<PlannerReply, String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            snapshots: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.snapshots.borrow().len()
    }

    pub fn snapshots(&self) -> Vec<PlannerSnapshot> {
        self.snapshots.borrow().clone()
    }
}

impl Planner for ScriptedPlanner {
    fn plan(&self, snapshot: &PlannerSnapshot) -> Result<PlannerReply> {
        self.snapshots.borrow_mut().push(snapshot.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("planner script exhausted")),
        }
    }
}

/// Fetcher with a response script per URL.
///
/// Each URL replays its responses in order and then keeps repeating the last
/// one. Unscripted URLs fail with a semantic failure.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    responses: RefCell<HashMap<String, VecDeque<Result<FetchedPage, FailureEvent>>>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` as a 200 HTML page for `url`.
    pub fn page(self, url: &str, body: &str) -> Self {
        self.respond(url, vec![Ok(html_page(url, body))])
    }

    pub fn respond(self, url: &str, responses: Vec<Result<FetchedPage, FailureEvent>>) -> Self {
        self.responses
            .borrow_mut()
            .insert(url.to_string(), responses.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FailureEvent> {
        self.calls.borrow_mut().push(url.to_string());
        let mut responses = self.responses.borrow_mut();
        let Some(script) = responses.get_mut(url) else {
            return Err(FailureEvent::new(
                FailureClass::Semantic,
                None,
                format!("unscripted url {url}"),
            ));
        };
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.unwrap_or_else(|| {
            Err(FailureEvent::new(
                FailureClass::Semantic,
                None,
                format!("empty script for {url}"),
            ))
        })
    }
}

/// Searcher with a fixed result list per query. Unknown queries find nothing.
#[derive(Debug, Default)]
pub struct ScriptedSearcher {
    results: BTreeMap<String, Vec<String>>,
    queries: RefCell<Vec<(String, usize)>>,
}

impl ScriptedSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(mut self, query: &str, urls: &[&str]) -> Self {
        self.results.insert(
            query.to_string(),
            urls.iter().map(|url| url.to_string()).collect(),
        );
        self
    }

    /// Queries received, with the requested result count.
    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.borrow().clone()
    }
}

impl Searcher for ScriptedSearcher {
    fn search(&self, query: &str, max_results: usize) -> Vec<String> {
        self.queries
            .borrow_mut()
            .push((query.to_string(), max_results));
        self.results
            .get(query)
            .map(|urls| urls.iter().take(max_results).cloned().collect())
            .unwrap_or_default()
    }
}

/// Retriever replaying block lists in order; empty once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedRetriever {
    batches: RefCell<VecDeque<Vec<ContextBlock>>>,
    calls: RefCell<usize>,
}

impl ScriptedRetriever {
    pub fn new(batches: Vec<Vec<ContextBlock>>) -> Self {
        Self {
            batches: RefCell::new(batches.into()),
            calls: RefCell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl Retriever for ScriptedRetriever {
    fn retrieve(&self, _query: &str, _store: &EvidenceStore) -> Result<Vec<ContextBlock>> {
        *self.calls.borrow_mut() += 1;
        Ok(self.batches.borrow_mut().pop_front().unwrap_or_default())
    }
}

/// Reasoner replaying outputs in order. An exhausted script is an error.
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    outputs: RefCell<VecDeque<Result<ReasoningOutput, String>>>,
    seen_blocks: RefCell<Vec<Vec<ContextBlock>>>,
}

impl ScriptedReasoner {
    pub fn new(outputs: Vec<ReasoningOutput>) -> Self {
        Self::from_results(outputs.into_iter().map(Ok).collect())
    }

    pub fn from_results(outputs: Vec<Result<ReasoningOutput, String>>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            seen_blocks: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen_blocks.borrow().len()
    }

    /// Blocks passed on each call.
    pub fn seen_blocks(&self) -> Vec<Vec<ContextBlock>> {
        self.seen_blocks.borrow().clone()
    }
}

impl Reasoner for ScriptedReasoner {
    fn reason(&self, _question: &str, blocks: &[ContextBlock]) -> Result<ReasoningOutput> {
        self.seen_blocks.borrow_mut().push(blocks.to_vec());
        match self.outputs.borrow_mut().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("reasoner script exhausted")),
        }
    }
}

/// A 200 HTML page for `url`.
pub fn html_page(url: &str, body: &str) -> FetchedPage {
    FetchedPage {
        url: url.to_string(),
        status: 200,
        headers: BTreeMap::from([(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        )]),
        body: body.as_bytes().to_vec(),
    }
}

/// Short prose page whose byte statistics pass the integrity evaluator.
pub fn healthy_body(topic: &str) -> String {
    format!(
        "<html><body><h1>{topic}</h1><p>Rust enforces ownership rules at compile time, \
         so {topic} bugs such as data races are rejected before a program runs. \
         Borrowed references never outlive their owner.</p></body></html>"
    )
}

/// A body that the integrity evaluator quarantines.
pub fn degenerate_body() -> String {
    "a".repeat(2_048)
}

pub fn context_block(evidence_id: &str, chunk_text: &str) -> ContextBlock {
    ContextBlock {
        chunk_id: format!("{evidence_id}:00000000"),
        evidence_id: evidence_id.to_string(),
        source_url: format!("https://example.com/{evidence_id}"),
        chunk_text: chunk_text.to_string(),
        integrity_score: 0.9,
    }
}

/// Reasoning output carrying one verified claim at `confidence`.
pub fn reasoning(answer: &str, confidence: f64) -> ReasoningOutput {
    ReasoningOutput {
        answer: answer.to_string(),
        claims: vec![VerifiedClaim {
            statement: answer.to_string(),
            chunk_id: "e1:00000000".to_string(),
            evidence_id: "e1".to_string(),
            similarity_score: 1.0,
        }],
        confidence,
        conflicts: Vec::new(),
    }
}
