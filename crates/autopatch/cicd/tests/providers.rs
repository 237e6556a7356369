//! HTTP provider dispatch and polling against mocked CI/CD APIs

use autopatch_cicd::{CicdProvider, HttpCicdProvider, PipelineState, ProviderConfig};
use autopatch_types::{DeploymentTrigger, PolicyEvaluation, RiskLevel, UpdateDecision};
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn trigger() -> DeploymentTrigger {
    let evaluation = PolicyEvaluation {
        component: "billing".to_string(),
        version: "3.1.0".to_string(),
        decision: UpdateDecision::Approve,
        risk_level: RiskLevel::Low,
        risk_score: 0,
        matched_policies: vec!["security-patch-auto-approve".to_string()],
        reasons: Vec::new(),
        deployment_window: None,
        evaluated_at: Utc::now(),
    };
    DeploymentTrigger::new(evaluation, json!({"environment": "production"})).unwrap()
}

fn provider(config: ProviderConfig) -> HttpCicdProvider {
    HttpCicdProvider::new(config, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn github_actions_dispatch_and_poll() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/billing/actions/workflows/deploy.yml/dispatches"))
        .and(header("authorization", "Bearer gh-token"))
        .and(body_partial_json(json!({
            "ref": "release",
            "inputs": {"component": "billing", "version": "3.1.0"}
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/billing/actions/workflows/deploy.yml/runs"))
        .and(query_param("event", "workflow_dispatch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflow_runs": [{"status": "completed", "conclusion": "success"}]
        })))
        .mount(&server)
        .await;

    let provider = provider(ProviderConfig::GithubActions {
        api_url: server.uri(),
        web_url: "https://github.example".to_string(),
        owner: "acme".to_string(),
        repo: "billing".to_string(),
        workflow: "deploy.yml".to_string(),
        git_ref: "release".to_string(),
        token: "gh-token".to_string(),
    });
    let trigger = trigger();
    let receipt = provider.dispatch(&trigger).await.unwrap();
    assert_eq!(
        receipt.pipeline_url.as_deref(),
        Some("https://github.example/acme/billing/actions/workflows/deploy.yml")
    );
    assert_eq!(provider.poll(&trigger, &receipt).await.unwrap(), PipelineState::Succeeded);
}

#[tokio::test]
async fn gitlab_trigger_records_pipeline_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/projects/42/trigger/pipeline"))
        .and(body_string_contains("token=trig"))
        .and(body_string_contains("variables%5BVERSION%5D=3.1.0"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 991,
            "web_url": "https://gitlab.example/acme/billing/-/pipelines/991"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/991"))
        .and(header("PRIVATE-TOKEN", "api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .mount(&server)
        .await;

    let provider = provider(ProviderConfig::GitlabCi {
        base_url: server.uri(),
        project: "42".to_string(),
        trigger_token: "trig".to_string(),
        api_token: Some("api".to_string()),
        git_ref: "main".to_string(),
    });
    let trigger = trigger();
    let receipt = provider.dispatch(&trigger).await.unwrap();
    assert_eq!(receipt.external_id.as_deref(), Some("991"));
    assert_eq!(provider.poll(&trigger, &receipt).await.unwrap(), PipelineState::Running);
}

#[tokio::test]
async fn jenkins_build_with_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/job/deploy-billing/buildWithParameters"))
        .and(header("authorization", "Basic Ym90OnNlY3JldA=="))
        .and(body_string_contains("COMPONENT=billing"))
        .respond_with(
            ResponseTemplate::new(201).insert_header("Location", "https://jenkins.example/queue/item/7/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/job/deploy-billing/lastBuild/api/json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"building": false, "result": "FAILURE"})),
        )
        .mount(&server)
        .await;

    let provider = provider(ProviderConfig::Jenkins {
        base_url: server.uri(),
        job: "deploy-billing".to_string(),
        username: "bot".to_string(),
        api_token: "secret".to_string(),
    });
    let trigger = trigger();
    let receipt = provider.dispatch(&trigger).await.unwrap();
    assert_eq!(
        receipt.external_id.as_deref(),
        Some("https://jenkins.example/queue/item/7/")
    );
    assert_eq!(
        provider.poll(&trigger, &receipt).await.unwrap(),
        PipelineState::Failed("build result FAILURE".to_string())
    );
}

#[tokio::test]
async fn circleci_pipeline_workflows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/project/gh/acme/billing/pipeline"))
        .and(header("Circle-Token", "cc"))
        .and(body_partial_json(json!({"branch": "main", "parameters": {"component": "billing"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "pipe-1", "number": 12})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pipeline/pipe-1/workflow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"status": "success"}, {"status": "success"}]
        })))
        .mount(&server)
        .await;

    let provider = provider(ProviderConfig::CircleCi {
        api_url: server.uri(),
        project_slug: "gh/acme/billing".to_string(),
        branch: "main".to_string(),
        token: "cc".to_string(),
    });
    let trigger = trigger();
    let receipt = provider.dispatch(&trigger).await.unwrap();
    assert_eq!(
        receipt.pipeline_url.as_deref(),
        Some("https://app.circleci.com/pipelines/gh/acme/billing/12")
    );
    assert_eq!(provider.poll(&trigger, &receipt).await.unwrap(), PipelineState::Succeeded);
}

#[tokio::test]
async fn internal_endpoint_receives_trigger_payload() {
    let server = MockServer::start().await;
    let trigger = trigger();
    let bare_id = trigger.id().as_uuid().to_string();

    Mock::given(method("POST"))
        .and(path("/deployments"))
        .and(header("authorization", "Bearer internal"))
        .and(body_partial_json(json!({
            "component": "billing",
            "version": "3.1.0",
            "trigger_id": bare_id,
            "deployment_config": {"environment": "production"}
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": "dep-5"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/deployments/{bare_id}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "failed", "error": "health gate"})),
        )
        .mount(&server)
        .await;

    let provider = provider(ProviderConfig::Internal {
        endpoint: server.uri(),
        token: Some("internal".to_string()),
    });
    let receipt = provider.dispatch(&trigger).await.unwrap();
    assert_eq!(receipt.external_id.as_deref(), Some("dep-5"));
    assert_eq!(
        provider.poll(&trigger, &receipt).await.unwrap(),
        PipelineState::Failed("health gate".to_string())
    );
}

#[tokio::test]
async fn rejected_dispatch_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/deployments"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let provider = provider(ProviderConfig::Internal {
        endpoint: server.uri(),
        token: None,
    });
    let err = provider.dispatch(&trigger()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("403"), "{message}");
    assert!(message.contains("forbidden"), "{message}");
}
