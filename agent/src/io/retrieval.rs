//! Retrieval collaborator: ranked context blocks from gate-approved evidence.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::chunker::{chunk_id, chunk_text};
use crate::core::gate::allow_reasoning;
use crate::core::text::{html_to_text, lexical_overlap_score};
use crate::core::types::ContextBlock;
use crate::io::evidence_store::EvidenceStore;

/// Maximum number of blocks handed to the reasoner.
pub const TOP_K: usize = 5;

/// Query plus evidence store to at most [`TOP_K`] ranked context blocks.
///
/// Implementations must only draw from evidence the reasoning gate admits.
pub trait Retriever {
    fn retrieve(&self, query: &str, store: &EvidenceStore) -> Result<Vec<ContextBlock>>;
}

/// Lexical-overlap retriever over the local evidence store.
#[derive(Debug, Clone, Default)]
pub struct EvidenceRetriever;

impl Retriever for EvidenceRetriever {
    #[instrument(skip(self, store))]
    fn retrieve(&self, query: &str, store: &EvidenceStore) -> Result<Vec<ContextBlock>> {
        let mut scored: Vec<(f64, ContextBlock)> = Vec::new();

        for evidence_id in store.evidence_ids()? {
            if !allow_reasoning(store.read_state(&evidence_id)?) {
                continue;
            }
            let metadata = store
                .read_metadata(&evidence_id)
                .with_context(|| format!("load evidence {evidence_id}"))?;
            let integrity_score = store
                .read_envelopes(&evidence_id)?
                .last()
                .map_or(0.0, |envelope| envelope.integrity_score);
            let text = html_to_text(&store.read_blob(&evidence_id)?);

            for chunk in chunk_text(&text) {
                let score = lexical_overlap_score(query, &chunk);
                if score <= 0.0 {
                    continue;
                }
                scored.push((
                    score,
                    ContextBlock {
                        chunk_id: chunk_id(&evidence_id, &chunk),
                        evidence_id: evidence_id.clone(),
                        source_url: metadata.url.clone(),
                        chunk_text: chunk,
                        integrity_score,
                    },
                ));
            }
        }

        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        let blocks: Vec<ContextBlock> = scored
            .into_iter()
            .take(TOP_K)
            .map(|(_, block)| block)
            .collect();
        debug!(count = blocks.len(), "retrieved context blocks");
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::{EvidenceState, integrate_integrity_at};
    use crate::core::integrity::evaluate;
    use crate::core::types::FetchedPage;
    use std::collections::BTreeMap;

    fn persist(store: &EvidenceStore, url: &str, body: &str, state: EvidenceState) -> String {
        let page = FetchedPage {
            url: url.to_string(),
            status: 200,
            headers: BTreeMap::new(),
            body: body.as_bytes().to_vec(),
        };
        let id = store.write(&page).expect("write");
        let (_, envelope) =
            integrate_integrity_at(&id, &evaluate(&page.body), "2025-01-01T00:00:00.000Z".into());
        store.append_envelope(&id, &envelope).expect("envelope");
        store.write_state(&id, state).expect("state");
        id
    }

    #[test]
    fn only_gate_approved_evidence_is_retrieved() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = EvidenceStore::open(temp.path()).expect("open");
        let accepted = persist(
            &store,
            "https://ok.example/",
            "<p>Rust ownership rules prevent data races.</p>",
            EvidenceState::RawAccepted,
        );
        persist(
            &store,
            "https://bad.example/",
            "<p>Rust ownership quarantined copy of the text.</p>",
            EvidenceState::QuarantinedLowIntegrity,
        );

        let blocks = EvidenceRetriever
            .retrieve("rust ownership", &store)
            .expect("retrieve");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].evidence_id, accepted);
        assert_eq!(blocks[0].source_url, "https://ok.example/");
        assert_eq!(blocks[0].chunk_text, "Rust ownership rules prevent data races.");
        assert!(blocks[0].chunk_id.starts_with(&format!("{accepted}:")));
        assert!(blocks[0].integrity_score > 0.0);
    }

    #[test]
    fn evidence_without_state_is_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = EvidenceStore::open(temp.path()).expect("open");
        store
            .write(&FetchedPage {
                url: "https://raw.example/".to_string(),
                status: 200,
                headers: BTreeMap::new(),
                body: b"rust ownership".to_vec(),
            })
            .expect("write");
        assert!(EvidenceRetriever.retrieve("rust", &store).expect("retrieve").is_empty());
    }

    #[test]
    fn ranks_by_overlap_and_caps_results() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = EvidenceStore::open(temp.path()).expect("open");
        let oversized: String = (0..8)
            .map(|i| format!("<p>{}rust paragraph {i}</p>", "filler words here ".repeat(70)))
            .collect();
        persist(&store, "https://many.example/", &oversized, EvidenceState::RawAccepted);
        persist(
            &store,
            "https://best.example/",
            "<p>rust borrow checker</p>",
            EvidenceState::RawAccepted,
        );

        let blocks = EvidenceRetriever
            .retrieve("rust borrow checker", &store)
            .expect("retrieve");
        assert_eq!(blocks.len(), TOP_K);
        assert_eq!(blocks[0].source_url, "https://best.example/");
        assert!(blocks[1..].windows(2).all(|pair| pair[0].chunk_id < pair[1].chunk_id));
    }

    #[test]
    fn no_overlap_yields_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = EvidenceStore::open(temp.path()).expect("open");
        persist(&store, "https://x.example/", "<p>unrelated</p>", EvidenceState::RawAccepted);
        assert!(EvidenceRetriever.retrieve("rust", &store).expect("retrieve").is_empty());
    }
}
