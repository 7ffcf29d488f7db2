//! Live deployment observed through the request path.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use app_runtime::deploy::{DeploySource, DeploymentError};
use common::{build_archive, start_runtime, start_runtime_with, versioned_manifest, write_app};

async fn status(router: &Router, uri: &str) -> StatusCode {
    router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_publish_replace_and_rollback() {
    let test = start_runtime();
    let manager = &test.runtime.manager;
    let router = test.runtime.http_server().router();

    let v1 = test.path("upload/blog-1.tar");
    let v2 = test.path("upload/blog-2.tar");
    build_archive(&v1, &versioned_manifest(1), &[]);
    build_archive(&v2, &versioned_manifest(2), &[]);

    manager.publish_source("blog", DeploySource::Archive(v1)).unwrap();
    assert_eq!(status(&router, "/blog/v1").await, StatusCode::OK);

    manager.publish_source("blog", DeploySource::Archive(v2)).unwrap();
    assert_eq!(status(&router, "/blog/v1").await, StatusCode::NOT_FOUND);
    assert_eq!(status(&router, "/blog/v2").await, StatusCode::OK);
    assert_eq!(manager.backups("blog").unwrap().len(), 1);

    manager.rollback("blog").unwrap();
    assert_eq!(status(&router, "/blog/v1").await, StatusCode::OK);
    assert_eq!(status(&router, "/blog/v2").await, StatusCode::NOT_FOUND);
    assert!(manager.backups("blog").unwrap().is_empty());

    match manager.rollback("blog") {
        Err(DeploymentError::NoBackup(name)) => assert_eq!(name, "blog"),
        other => panic!("expected NoBackup, got {:?}", other.map(|a| a.version())),
    }
    assert_eq!(status(&router, "/blog/v1").await, StatusCode::OK);
}

#[tokio::test]
async fn test_failed_publish_keeps_live_version() {
    let test = start_runtime();
    let manager = &test.runtime.manager;
    let router = test.runtime.http_server().router();

    let good = test.path("upload/good.tar");
    build_archive(&good, &versioned_manifest(1), &[]);
    manager.publish_source("blog", DeploySource::Archive(good)).unwrap();

    let broken = test.path("upload/broken.tar");
    build_archive(
        &broken,
        "[[route]]\npath = \"/x\"\nhandler = \"no-such-handler\"\n",
        &[],
    );
    let err = manager
        .publish_source("blog", DeploySource::Archive(broken))
        .unwrap_err();
    assert!(matches!(err, DeploymentError::BuildFailure { .. }));

    assert_eq!(status(&router, "/blog/v1").await, StatusCode::OK);
    assert!(manager.backups("blog").unwrap().is_empty());
}

#[tokio::test]
async fn test_default_application_receives_unmatched_prefixes() {
    let test = start_runtime_with(
        |root| {
            write_app(
                &root.join("apps/root"),
                "[[route]]\npath = \"/about\"\nmethods = [\"GET\"]\nhandler = \"hello\"\n",
                &[],
            );
            write_app(&root.join("apps/shop"), &versioned_manifest(1), &[]);
        },
        |_| {},
    );
    let router = test.runtime.http_server().router();

    let response = router
        .clone()
        .oneshot(Request::get("/about").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_string(response).await, "Hello from root");

    assert_eq!(status(&router, "/shop/v1").await, StatusCode::OK);
    test.runtime.manager.unpublish("shop").unwrap();
    // Now routed to the default application with the full path
    assert_eq!(status(&router, "/shop/v1").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_removes_application() {
    let test = start_runtime();
    let manager = &test.runtime.manager;
    let router = test.runtime.http_server().router();

    for marker in 1..=3 {
        let archive = test.path(&format!("upload/blog-{}.tar", marker));
        build_archive(&archive, &versioned_manifest(marker), &[]);
        manager.publish_source("blog", DeploySource::Archive(archive)).unwrap();
    }
    assert_eq!(manager.backups("blog").unwrap().len(), 2);

    manager.delete("blog").unwrap();
    assert_eq!(status(&router, "/blog/v3").await, StatusCode::NOT_FOUND);
    assert!(!test.path("apps/blog.tar").exists());
    assert!(!test.path("backups/blog").exists());
    assert!(matches!(
        manager.backups("blog"),
        Err(DeploymentError::NotFound(_))
    ));

    // The name can be reused after deletion
    manager.create_application("blog", None).unwrap();
}

#[tokio::test]
async fn test_startup_recovers_archives_and_backups() {
    let test = start_runtime_with(
        |root| {
            build_archive(&root.join("apps/blog.tar"), &versioned_manifest(2), &[]);
            build_archive(
                &root.join("backups/blog/1700000000000.tar"),
                &versioned_manifest(1),
                &[],
            );
        },
        |_| {},
    );
    let manager = &test.runtime.manager;
    let router = test.runtime.http_server().router();

    assert_eq!(status(&router, "/blog/v2").await, StatusCode::OK);
    assert_eq!(manager.backups("blog").unwrap().len(), 1);

    manager.rollback("blog").unwrap();
    assert_eq!(status(&router, "/blog/v1").await, StatusCode::OK);
}
