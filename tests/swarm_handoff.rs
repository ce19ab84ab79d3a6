//! Multi-agent path: decomposition, hand-off chains and the depth bound.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Behaviour, MockSource, ScriptedProvider, engine, item};
use crosscite::swarm::DecompositionSource;
use crosscite::{
    CircuitConfig, EngineConfig, EngineWarning, ErrorKind, Query, QueryStatus, SourceFamily,
    SourceId, SourceStatus, StrategyName, SwarmConfig, SwarmState,
};

const DECOMPOSITION: &str = r#"{"sub_queries": [{"family": "tickets", "query": "PROJ-1 crash"}]}"#;

/// Tickets mention a commit, the commit touches a file, the file points at
/// another ticket.
fn chained_sources() -> Vec<Arc<MockSource>> {
    vec![
        MockSource::new(
            "jira",
            SourceFamily::Tickets,
            Behaviour::Keyed(vec![(
                "PROJ-1",
                item("jira", "PROJ-1", "Session crash", "Regression from commit a1b2c3d", 0.9),
            )]),
        ),
        MockSource::new(
            "git",
            SourceFamily::Commits,
            Behaviour::Keyed(vec![(
                "a1b2c3d",
                item("git", "a1b2c3d", "Drain sessions on restart", "Changed src/session/manager.rs", 0.8),
            )]),
        ),
        MockSource::new(
            "src",
            SourceFamily::Code,
            Behaviour::Keyed(vec![(
                "src/session/manager.rs",
                item("src", "src/session/manager.rs", "Session manager", "Restart logic; follow-up in PROJ-2", 0.7),
            )]),
        ),
    ]
}

fn provider() -> Arc<ScriptedProvider> {
    Arc::new(
        ScriptedProvider::answering("The crash is a regression from commit a1b2c3d [E1].")
            .with_decomposition(DECOMPOSITION),
    )
}

#[tokio::test]
async fn test_handoff_chain_stops_at_depth_bound() {
    let engine = engine(EngineConfig::default(), &chained_sources(), Some(provider()));

    let response = engine
        .query(Query::new("why does PROJ-1 crash", StrategyName::Swarm))
        .await;

    assert_eq!(response.status, QueryStatus::PartialOk);
    assert!(response.has_warning(ErrorKind::Exhausted));
    assert!(response.warnings.contains(&EngineWarning::Exhausted {
        max_depth: 2,
        dropped: 1,
    }));

    let trace = response.swarm.as_ref().unwrap_or_else(|| unreachable!());
    assert_eq!(trace.decomposition, DecompositionSource::Agent);
    assert!(trace.exhausted);
    assert_eq!(trace.dropped_handoffs, 1);
    assert_eq!(trace.state, SwarmState::Done);
    assert!(trace.transitions.contains(&SwarmState::AwaitingHandoff));

    let chain: Vec<(SourceFamily, SourceFamily, &str, usize)> = trace
        .handoffs
        .iter()
        .map(|h| (h.from, h.to, h.sub_query.as_str(), h.depth))
        .collect();
    assert_eq!(
        chain,
        vec![
            (SourceFamily::Tickets, SourceFamily::Commits, "a1b2c3d", 1),
            (SourceFamily::Commits, SourceFamily::Code, "src/session/manager.rs", 2),
        ]
    );
    assert_eq!(trace.handoffs[0].trigger_id, "PROJ-1");

    let ids: Vec<&str> = response.evidence.iter().map(|e| e.item.external_id.as_str()).collect();
    assert_eq!(ids, vec!["PROJ-1", "a1b2c3d", "src/session/manager.rs"]);

    let answer = response.answer.unwrap_or_else(|| unreachable!());
    assert_eq!(answer.handoffs.len(), 2);
    assert_eq!(answer.citations.len(), 1);
}

#[tokio::test]
async fn test_deeper_bound_follows_the_whole_chain() {
    let config = EngineConfig::builder()
        .swarm(SwarmConfig::default().with_max_handoff_depth(3))
        .build()
        .unwrap_or_else(|_| unreachable!());
    let engine = engine(config, &chained_sources(), Some(provider()));

    let response = engine
        .query(Query::new("why does PROJ-1 crash", StrategyName::Swarm))
        .await;

    assert_eq!(response.status, QueryStatus::Ok);
    assert!(!response.has_warning(ErrorKind::Exhausted));
    let trace = response.swarm.unwrap_or_else(|| unreachable!());
    assert!(!trace.exhausted);
    assert_eq!(trace.handoffs.len(), 3);
    assert_eq!(trace.handoffs[2].to, SourceFamily::Tickets);
    assert_eq!(trace.handoffs[2].sub_query, "PROJ-2");
    assert!(trace.sub_queries.iter().all(|s| s.depth <= 3));
}

#[tokio::test]
async fn test_heuristic_decomposition_without_provider() {
    let engine = engine(EngineConfig::default(), &chained_sources(), None);

    let response = engine
        .query(Query::new("why does PROJ-1 crash", StrategyName::Swarm))
        .await;

    let trace = response.swarm.as_ref().unwrap_or_else(|| unreachable!());
    assert_eq!(trace.decomposition, DecompositionSource::Heuristic);
    let initial: Vec<SourceFamily> = trace
        .sub_queries
        .iter()
        .filter(|s| s.depth == 0)
        .map(|s| s.family)
        .collect();
    assert_eq!(
        initial,
        vec![SourceFamily::Tickets, SourceFamily::Commits, SourceFamily::Code]
    );
    // Swarm synthesis is mandatory; without a provider only evidence comes back.
    assert_eq!(response.status, QueryStatus::EvidenceOnly);
    assert!(response.answer.is_none());
    assert!(trace.exhausted);
}

#[tokio::test]
async fn test_open_circuit_outside_decomposition_is_degraded() {
    let sources = vec![
        MockSource::new(
            "jira",
            SourceFamily::Tickets,
            Behaviour::Keyed(vec![(
                "PROJ-1",
                item("jira", "PROJ-1", "Session crash", "Crash on logout, cause unknown", 0.9),
            )]),
        ),
        MockSource::new(
            "src",
            SourceFamily::Code,
            Behaviour::Items(vec![item("src", "src/session/manager.rs", "Session manager", "Restart logic", 0.7)]),
        ),
    ];
    let config = EngineConfig::builder()
        .circuit(CircuitConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
            max_cooldown: Duration::from_secs(60),
        })
        .build()
        .unwrap_or_else(|_| unreachable!());
    let engine = engine(config, &sources, Some(provider()));
    let code = SourceId::new("src");
    engine.breakers().record_failure(&code);
    assert!(engine.breakers().is_open(&code));

    let response = engine
        .query(Query::new("why does PROJ-1 crash", StrategyName::Swarm))
        .await;

    let trace = response.swarm.as_ref().unwrap_or_else(|| unreachable!());
    assert!(trace.sub_queries.iter().all(|s| s.family == SourceFamily::Tickets));
    assert_eq!(sources[1].calls(), 0);
    assert_eq!(response.degraded_sources, vec![code.clone()]);
    let report = response
        .sources
        .iter()
        .find(|r| r.source == code)
        .unwrap_or_else(|| unreachable!());
    assert_eq!(report.status, SourceStatus::Skipped);
    assert_eq!(response.status, QueryStatus::PartialOk);
}
