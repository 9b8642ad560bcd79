mod common;

use common::{collect_events, PerModelGenerator};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use warden_core::{
    create_default_policy, get_model_policy_chain, resolve_model, validate_model_policy_chain,
    ChainError, ConfirmationBus, ConfirmationKind, ContentRequest, ErrorState, FallbackAction,
    FallbackRouter, ModelChainConfig, ModelPolicy, ModelPolicyChain, NonInteractiveHandler,
    ProviderError, RoutingError, WardenEvent,
};

fn transient_fallback_chain() -> ModelPolicyChain {
    ModelPolicyChain::new(vec![
        create_default_policy("model-a")
            .with_action(ErrorState::Transient, FallbackAction::Fallback),
        create_default_policy("model-b").last_resort(),
    ])
    .unwrap()
}

#[test]
fn test_chains_never_share_state() {
    let config = ModelChainConfig::new(["pro", "flash"]);
    let first = get_model_policy_chain(&config).unwrap();
    let second = get_model_policy_chain(&config).unwrap();

    let mut edited = first.into_policies();
    edited[0]
        .actions
        .insert(ErrorState::Terminal, FallbackAction::Silent);
    edited[0].model = "edited".to_string();

    assert_eq!(second.get(0).unwrap().model, "pro");
    assert_eq!(
        second.get(0).unwrap().action_for(ErrorState::Terminal),
        FallbackAction::Prompt
    );
    assert_eq!(get_model_policy_chain(&config).unwrap(), second);
}

#[test]
fn test_last_resort_count_is_validated() {
    let none = vec![create_default_policy("a"), create_default_policy("b")];
    assert!(matches!(
        validate_model_policy_chain(&none),
        Err(ChainError::NoLastResort { .. })
    ));

    let one = vec![create_default_policy("a"), create_default_policy("b").last_resort()];
    assert!(validate_model_policy_chain(&one).is_ok());

    let two: Vec<ModelPolicy> = vec![
        create_default_policy("a").last_resort(),
        create_default_policy("b").last_resort(),
    ];
    let err = validate_model_policy_chain(&two).unwrap_err();
    assert!(err.to_string().contains("a, b"));
    assert!(ModelPolicyChain::new(two).is_err());
}

#[test]
fn test_model_policy_from_json() {
    let policy: ModelPolicy = serde_json::from_str(
        r#"{
            "model": "model-a",
            "actions": {"transient": "fallback", "not_found": "silent"},
            "state_transitions": {"transient": "terminal"}
        }"#,
    )
    .unwrap();
    assert_eq!(policy.action_for(ErrorState::Transient), FallbackAction::Fallback);
    assert_eq!(policy.action_for(ErrorState::NotFound), FallbackAction::Silent);
    assert_eq!(policy.action_for(ErrorState::Unknown), FallbackAction::Prompt);
    assert!(!policy.is_last_resort);
}

#[test]
fn test_transient_error_resolves_to_second_model() {
    let chain = transient_fallback_chain();
    let resolution = resolve_model(
        &chain,
        0,
        &ProviderError::RateLimited("quota window".into()),
    );
    assert_eq!(resolution.state, ErrorState::Transient);
    assert_eq!(resolution.action, FallbackAction::Fallback);
    assert_eq!(resolution.next_index, Some(1));
    assert_eq!(chain.get(1).unwrap().model, "model-b");
}

#[tokio::test(start_paused = true)]
async fn test_router_falls_back_on_transient_error() {
    let generator = Arc::new(
        PerModelGenerator::new()
            .reply("model-a", Err(ProviderError::RateLimited("busy".into())))
            .reply("model-b", Ok("hello from b")),
    );
    let (hooks, events) = collect_events();
    let router =
        FallbackRouter::new(generator.clone(), transient_fallback_chain()).with_hooks(hooks);

    let routed = router
        .generate(ContentRequest::new("model-a", "hi"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(routed.model, "model-b");
    assert_eq!(routed.response.text(), "hello from b");
    assert_eq!(routed.attempts, 2);
    assert_eq!(generator.calls(), vec!["model-a", "model-b"]);
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        WardenEvent::ModelFallback {
            action: FallbackAction::Fallback,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_configured_chain_retries_once_before_falling_back() {
    let generator = Arc::new(
        PerModelGenerator::new()
            .reply("pro", Err(ProviderError::ServiceUnavailable("overloaded".into())))
            .reply("pro", Err(ProviderError::ServiceUnavailable("overloaded".into())))
            .reply("flash", Ok("ok")),
    );
    let chain = get_model_policy_chain(&ModelChainConfig::new(["pro", "flash"])).unwrap();
    let router = FallbackRouter::new(generator.clone(), chain);

    let routed = router
        .generate(ContentRequest::new("pro", "hi"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(routed.model, "flash");
    assert_eq!(generator.calls(), vec!["pro", "pro", "flash"]);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_error_prompts_through_bus() {
    let chain = get_model_policy_chain(&ModelChainConfig::new(["pro", "flash"])).unwrap();
    let auth_failure = || ProviderError::Authentication("key revoked".into());

    // Accepted switch
    let bus = ConfirmationBus::new();
    bus.subscribe(
        ConfirmationKind::AskUser,
        Arc::new(NonInteractiveHandler::approve_all()),
    );
    let generator = Arc::new(
        PerModelGenerator::new()
            .reply("pro", Err(auth_failure()))
            .reply("flash", Ok("ok")),
    );
    let routed = FallbackRouter::new(generator, chain.clone())
        .with_bus(bus)
        .generate(ContentRequest::new("pro", "hi"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(routed.model, "flash");

    // Declined switch
    let bus = ConfirmationBus::new();
    bus.subscribe(
        ConfirmationKind::AskUser,
        Arc::new(NonInteractiveHandler::deny_all()),
    );
    let generator = Arc::new(PerModelGenerator::new().reply("pro", Err(auth_failure())));
    let err = FallbackRouter::new(generator.clone(), chain)
        .with_bus(bus)
        .generate(ContentRequest::new("pro", "hi"), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        RoutingError::Failed { model, state, .. } => {
            assert_eq!(model, "pro");
            assert_eq!(state, ErrorState::Terminal);
        }
        other => panic!("expected terminal failure, got {:?}", other),
    }
    assert_eq!(generator.calls(), vec!["pro"]);
}

#[tokio::test]
async fn test_cancelled_routing_stops_immediately() {
    let generator = Arc::new(PerModelGenerator::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = FallbackRouter::new(generator, transient_fallback_chain())
        .generate(ContentRequest::new("model-a", "hi"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::Cancelled));
}
