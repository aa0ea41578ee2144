use super::*;
use serde_json::json;
use switchyard_llm::{MockOutcome, MockProvider};

fn router() -> TierRouter {
    TierRouter::new(RouterConfig::default())
}

struct FixedRefiner(Result<RefinedRoute>);

#[async_trait]
impl RoutingRefiner for FixedRefiner {
    async fn refine(&self, _command: &Command, _heuristic: &RoutingDecision) -> Result<RefinedRoute> {
        match &self.0 {
            Ok(route) => Ok(route.clone()),
            Err(e) => Err(Error::Internal(e.to_string())),
        }
    }
}

struct SlowRefiner;

#[async_trait]
impl RoutingRefiner for SlowRefiner {
    async fn refine(&self, _command: &Command, _heuristic: &RoutingDecision) -> Result<RefinedRoute> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(Error::Internal("unreachable".into()))
    }
}

fn refined(tier: &str, score: f64) -> RefinedRoute {
    RefinedRoute {
        tier: tier.to_string(),
        score,
        recommended_agent: Some("workflow_runner".to_string()),
        reason: "multi-step".to_string(),
    }
}

fn refining_router(refiner: impl RoutingRefiner + 'static) -> TierRouter {
    TierRouter::new(RouterConfig::default().with_llm_refinement(true)).with_refiner(Arc::new(refiner))
}

#[test]
fn test_base_scores_without_adjustments() {
    let router = router();
    for command_type in CommandType::ALL {
        // an action outside the deep list and a neutral priority
        let cmd = Command::new("u", command_type, "plain");
        let decision = router.analyze_heuristic(&cmd);
        assert_eq!(decision.metadata.base_score, base_score(command_type));
        assert_eq!(decision.score, base_score(command_type), "{command_type}");
        assert!(decision.metadata.adjustments.is_empty());
        assert_eq!(decision.chosen_agent, static_agent(command_type));
    }
}

#[test]
fn test_scenario_simple_ask_is_fast() {
    let cmd = Command::new("u", CommandType::Ask, "query").with_field("query", "x");
    let decision = router().analyze_heuristic(&cmd);
    assert_eq!(decision.score, 0.2);
    assert_eq!(decision.tier, Tier::Fast);
    assert!(!decision.requires_escalation);
    assert_eq!(decision.chosen_agent, AGENT_ASSISTANT);
}

#[test]
fn test_scenario_full_petition_is_deep_and_clamped() {
    let cmd = Command::new("u", CommandType::HighValue, "full_petition")
        .with_field("documents", json!(["d1", "d2", "d3", "d4"]))
        .with_field("requires_human_review", true)
        .with_priority(1);
    let decision = router().analyze_heuristic(&cmd);

    let names: Vec<&str> = decision.metadata.adjustments.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["documents", "human_review", "deep_action", "urgent_priority"]);
    assert_eq!(decision.metadata.adjustments[0].delta, 0.12);
    assert_eq!(decision.score, 0.99);
    assert_eq!(decision.tier, Tier::Deep);
    assert!(decision.requires_escalation);
}

#[test]
fn test_tier_boundaries_inclusive() {
    let router = router();
    // 0.3 + 0.1 lands exactly on the graph threshold
    let graph = Command::new("u", CommandType::Search, "documents").with_field("requires_human_review", true);
    let d = router.analyze_heuristic(&graph);
    assert_eq!(d.score, 0.4);
    assert_eq!(d.tier, Tier::Graph);

    // workflow base is exactly the deep threshold
    let deep = Command::new("u", CommandType::Workflow, "run");
    assert_eq!(router.analyze_heuristic(&deep).tier, Tier::Deep);

    // 0.65 + 0.10 reaches deep
    let generate = Command::new("u", CommandType::Generate, "draft").with_field("requires_human_review", true);
    assert_eq!(router.analyze_heuristic(&generate).tier, Tier::Deep);
}

#[test]
fn test_adjustment_caps() {
    let mut cmd = Command::new("u", CommandType::Ask, "query")
        .with_field("documents", json!((0..20).collect::<Vec<_>>()));
    for i in 0..12 {
        cmd = cmd.with_field(format!("f{i}"), i);
    }
    let decision = router().analyze_heuristic(&cmd);
    let deltas: Vec<f64> = decision.metadata.adjustments.iter().map(|a| a.delta).collect();
    assert_eq!(deltas, [0.10, 0.20]);
    assert_eq!(decision.score, 0.5);
}

#[test]
fn test_parallel_and_priority_adjustments() {
    let cmd = Command::new("u", CommandType::Tool, "invoke")
        .with_field("parallel_execution", true)
        .with_priority(2);
    let decision = router().analyze_heuristic(&cmd);
    assert_eq!(decision.score, 0.45);
    assert_eq!(decision.tier, Tier::Graph);
}

#[test]
fn test_deep_actions_configurable() {
    let config = RouterConfig {
        deep_actions: vec!["Case_Review".into()],
        ..RouterConfig::default()
    };
    let router = TierRouter::new(config);
    let cmd = Command::new("u", CommandType::Case, "case_review");
    assert_eq!(router.analyze_heuristic(&cmd).score, 0.7);
    let petition = Command::new("u", CommandType::HighValue, "full_petition");
    assert_eq!(router.analyze_heuristic(&petition).score, 0.85);
}

#[tokio::test]
async fn test_routing_is_idempotent() {
    let router = router();
    let cmd = Command::new("u", CommandType::Validate, "document")
        .with_field("document", "text")
        .with_field("documents", json!(["a"]));
    let first = router.analyze(&cmd).await;
    let second = router.analyze(&cmd).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_refinement_accepted() {
    let router = refining_router(FixedRefiner(Ok(refined("graph", 1.4))));
    let cmd = Command::new("u", CommandType::Ask, "query").with_field("query", "x");
    let decision = router.analyze(&cmd).await;

    assert_eq!(decision.tier, Tier::Graph);
    assert_eq!(decision.score, 0.99);
    assert!(!decision.requires_escalation);
    assert_eq!(decision.chosen_agent, "workflow_runner");
    assert_eq!(decision.metadata.source, DecisionSource::LlmRefined);
    assert_eq!(decision.metadata.heuristic_score, Some(0.2));
}

#[tokio::test]
async fn test_refinement_with_bad_tier_discarded() {
    let router = refining_router(FixedRefiner(Ok(refined("turbo", 0.5))));
    let cmd = Command::new("u", CommandType::Ask, "query");
    let decision = router.analyze(&cmd).await;
    assert_eq!(decision.metadata.source, DecisionSource::Heuristic);
    assert_eq!(decision.tier, Tier::Fast);
}

#[tokio::test]
async fn test_refinement_error_and_timeout_fall_back() {
    let failing = refining_router(FixedRefiner(Err(Error::Internal("down".into()))));
    let cmd = Command::new("u", CommandType::Case, "read");
    assert_eq!(failing.analyze(&cmd).await, failing.analyze_heuristic(&cmd));

    let slow = TierRouter::new(
        RouterConfig::default()
            .with_llm_refinement(true)
            .with_refinement_timeout(Duration::from_millis(20)),
    )
    .with_refiner(Arc::new(SlowRefiner));
    let started = std::time::Instant::now();
    let decision = slow.analyze(&cmd).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(decision.metadata.source, DecisionSource::Heuristic);
}

#[tokio::test]
async fn test_refinement_disabled_by_payload_or_config() {
    let cmd = Command::new("u", CommandType::Ask, "query").with_field("disable_llm_routing", true);
    let router = refining_router(FixedRefiner(Ok(refined("deep", 0.9))));
    assert_eq!(router.analyze(&cmd).await.tier, Tier::Fast);

    let off = TierRouter::new(RouterConfig::default()).with_refiner(Arc::new(FixedRefiner(Ok(refined("deep", 0.9)))));
    let plain = Command::new("u", CommandType::Ask, "query");
    assert_eq!(off.analyze(&plain).await.tier, Tier::Fast);
}

#[tokio::test]
async fn test_llm_refiner_parses_json_from_reply() {
    let provider = MockProvider::new("m").with_outcomes([MockOutcome::Reply(
        "Sure. {\"tier\": \"deep\", \"score\": 0.8, \"reason\": \"many documents\"} Done.".into(),
    )]);
    let mut providers = ProviderRouter::new();
    providers.register(Arc::new(provider));
    let refiner = LlmRefiner::new(Arc::new(providers), RoutingPolicy::new(["m"]));
    let router = refining_router(refiner);

    let decision = router.analyze(&Command::new("u", CommandType::Search, "documents")).await;
    assert_eq!(decision.tier, Tier::Deep);
    assert_eq!(decision.score, 0.8);
    assert!(decision.requires_escalation);
    assert_eq!(decision.chosen_agent, AGENT_WORKFLOW_RUNNER);
    assert_eq!(decision.reason, "many documents");
}

#[test]
fn test_parse_refinement_rejects_prose() {
    assert!(parse_refinement("no json here").is_err());
    assert!(parse_refinement("{\"tier\": 3}").is_err());
}

#[tokio::test]
async fn test_override_and_static_decisions() {
    let router = router();

    let pinned = Command::new("u", CommandType::HighValue, "full_petition")
        .with_field("documents", json!(["a", "b"]))
        .with_agent("assistant");
    let decision = router.decide(&pinned).await;
    assert_eq!(decision.tier, Tier::Fast);
    assert_eq!(decision.chosen_agent, "assistant");
    assert_eq!(decision.metadata.source, DecisionSource::Override);

    let tier_only = Command::new("u", CommandType::Case, "read").with_tier(Tier::Deep);
    let decision = router.decide(&tier_only).await;
    assert_eq!(decision.chosen_agent, AGENT_CASE);
    assert!(decision.requires_escalation);

    let manual = Command::new("u", CommandType::HighValue, "full_petition").without_auto_route();
    let decision = router.decide(&manual).await;
    assert_eq!(decision.tier, Tier::Fast);
    assert_eq!(decision.chosen_agent, AGENT_PETITION);
    assert_eq!(decision.metadata.source, DecisionSource::StaticTable);
}

#[test]
fn test_downgrade_records_origin() {
    let cmd = Command::new("u", CommandType::Workflow, "run");
    let decision = router().analyze_heuristic(&cmd).downgraded_to(Tier::Graph);
    assert_eq!(decision.tier, Tier::Graph);
    assert!(!decision.requires_escalation);
    assert_eq!(decision.metadata.downgraded_from, Some(Tier::Deep));
}
