//! HTTP version sources against a mock registry

use autopatch_detector::{
    DetectorConfig, HttpEndpoint, HttpVersionSource, VersionDetector, VersionSource,
};
use autopatch_types::{SourceKind, UpdatePriority};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(endpoint: HttpEndpoint) -> HttpVersionSource {
    HttpVersionSource::new("mock", endpoint, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn package_registry_versions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/packages/svc/versions"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            "1.0.0",
            {"version": "1.1.0", "priority": "high", "checksum": "sha256:abc"}
        ])))
        .mount(&server)
        .await;

    let registry = source(HttpEndpoint::PackageRegistry {
        base_url: server.uri(),
        package: "svc".into(),
    })
    .with_bearer_token("s3cret");

    let versions = registry.fetch_versions("svc").await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].priority, UpdatePriority::High);
    assert_eq!(versions[1].checksum.as_deref(), Some("sha256:abc"));
    assert_eq!(versions[1].source, SourceKind::PackageRegistry);
}

#[tokio::test]
async fn container_registry_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/team/svc/tags/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "team/svc", "tags": ["latest", "2.4.1"]})),
        )
        .mount(&server)
        .await;

    let registry = source(HttpEndpoint::ContainerRegistry {
        base_url: server.uri(),
        image: "team/svc".into(),
    });
    let versions = registry.fetch_versions("svc").await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, "2.4.1");
}

#[tokio::test]
async fn artifact_repository_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/artifacts/org.example/svc/versions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let repo = source(HttpEndpoint::ArtifactRepository {
        base_url: server.uri(),
        group: "org.example".into(),
        artifact: "svc".into(),
    });
    let err = repo.fetch_versions("svc").await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn detector_keeps_partial_results_when_one_source_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases/svc.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "versions": [{"version": "1.2.0", "breaking_changes": true}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/packages/svc/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let detector = VersionDetector::new(DetectorConfig::default());
    detector
        .add_source(
            "svc",
            Arc::new(source(HttpEndpoint::GenericApi {
                url: format!("{}/releases/{{component}}.json", server.uri()),
            })),
        )
        .await;
    detector
        .add_source(
            "svc",
            Arc::new(source(HttpEndpoint::PackageRegistry {
                base_url: server.uri(),
                package: "svc".into(),
            })),
        )
        .await;
    detector.set_current_version("svc", "1.0.0");

    let report = detector.poll_once().await;
    assert_eq!(report.failed_sources().count(), 1);

    let cmp = detector.compare_versions("svc").unwrap();
    assert!(cmp.breaking_changes);
    assert_eq!(cmp.version_distance, 2);
    assert!(cmp.recommendation.contains("review"));
}
