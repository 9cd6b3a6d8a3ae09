// ============================================================================
// Gateway Proxy Tests
// ============================================================================
//
// End-to-end behaviour of /manage, /memos and /event against mock backends:
// authorization, body forwarding, response translation, failure mapping.
//
// ============================================================================


use serde_json::{json, Value};
use std::time::Duration;
use test_utils::{closed_port_url, serve, spawn_app, spawn_app_with_timeout, test_config};
use wiremock::matchers::{any, body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_public_scheduling_paths_need_no_token() {
    let app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/api/future-activity/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "title": "Picnic"}])),
        )
        .expect(1)
        .mount(&app.scheduling)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/scheduled-events/2024/05/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&app.scheduling)
        .await;

    let response = app.client.get(app.url("/event/future-activity")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!([{"id": 1, "title": "Picnic"}]));

    let response = app
        .client
        .get(app.url("/event/scheduled-events/2024/05"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_protected_routes_reject_without_calling_backend() {
    let app = spawn_app().await;

    for url in [
        "/manage/workspaces",
        "/memos/memories/",
        "/event/events",
        "/event/future-activityX",
        "/event/",
        "/manage",
    ] {
        let response = app.client.get(app.url(url)).send().await.unwrap();
        assert_eq!(response.status(), 401, "{} should require a token", url);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error_code"], "AUTH_ERROR");
    }

    let response = app
        .client
        .post(app.url("/manage/workspaces"))
        .bearer_auth("not-a-valid-token")
        .json(&json!({"name": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // A refresh token is not an access token
    let refresh = app
        .auth_manager
        .create_refresh_token(&uuid::Uuid::new_v4())
        .unwrap()
        .token;
    let response = app
        .client
        .get(app.url("/memos/memories"))
        .bearer_auth(refresh)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    assert!(app.management.received_requests().await.unwrap().is_empty());
    assert!(app.repository.received_requests().await.unwrap().is_empty());
    assert!(app.scheduling.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dot_segments_cannot_escape_the_allowlist() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"private": true})))
        .mount(&app.scheduling)
        .await;

    for target in [
        "/event/future-activity/../events",
        "/event/future-activity/../../admin/",
        "/event/future-activity/%2e%2e/events",
        "/event/scheduled-events/%2E%2E/events/1",
        "/event/future-activity/./",
    ] {
        let response = app.raw_get(target, None).await;
        assert!(response.starts_with("HTTP/1.1 400"), "{} answered: {}", target, response);
        assert!(!response.contains("private"));
    }

    assert!(app.scheduling.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dot_segments_cannot_leave_the_backend_base() {
    let app = spawn_app().await;
    let (_, token) = app.access_token();

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"admin": true})))
        .mount(&app.management)
        .await;

    let response = app.raw_get("/manage/workspaces/../../admin/", Some(&token)).await;
    assert!(response.starts_with("HTTP/1.1 400"), "answered: {}", response);
    assert!(app.management.received_requests().await.unwrap().is_empty());

    // Ordinary paths still go through on the same socket helper
    let response = app.raw_get("/manage/workspaces/3", Some(&token)).await;
    assert!(response.starts_with("HTTP/1.1 200"), "answered: {}", response);
}

#[tokio::test]
async fn test_unknown_prefix_is_not_found() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/admin/users")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "NOT_FOUND");
}

// ============================================================================
// Request forwarding
// ============================================================================

#[tokio::test]
async fn test_json_body_is_forwarded_and_echoed() {
    let app = spawn_app().await;
    let (user_id, token) = app.access_token();
    let payload = json!({"name": "Family trip", "members": [1, 2, 3], "meta": {"color": "blue"}});

    Mock::given(method("POST"))
        .and(path("/api/workspaces/"))
        .and(body_json(payload.clone()))
        .and(header("content-type", "application/json"))
        .and(header("x-user-id", user_id.to_string().as_str()))
        .and(header_exists("authorization"))
        .and(header_exists("x-request-id"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": 9, "name": "Family trip"})),
        )
        .expect(1)
        .mount(&app.management)
        .await;

    let response = app
        .client
        .post(app.url("/manage/workspaces"))
        .bearer_auth(&token)
        .json(&payload)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"id": 9, "name": "Family trip"}));
}

#[tokio::test]
async fn test_spoofed_user_header_is_replaced() {
    let app = spawn_app().await;
    let (user_id, token) = app.access_token();

    Mock::given(method("GET"))
        .and(path("/api/memories/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&app.repository)
        .await;

    let response = app
        .client
        .get(app.url("/memos/memories"))
        .bearer_auth(&token)
        .header("x-user-id", "00000000-0000-0000-0000-000000000000")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let received = app.repository.received_requests().await.unwrap();
    let values: Vec<_> = received[0].headers.get_all("x-user-id").iter().collect();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].to_str().unwrap(), user_id.to_string());
}

#[tokio::test]
async fn test_empty_post_sends_empty_json_object() {
    let app = spawn_app().await;
    let (_, token) = app.access_token();

    Mock::given(method("POST"))
        .and(path("/api/events/4/confirm/"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"confirmed": true})))
        .expect(1)
        .mount(&app.scheduling)
        .await;

    let response = app
        .client
        .post(app.url("/event/events/4/confirm"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_malformed_json_is_rejected_before_forwarding() {
    let app = spawn_app().await;
    let (_, token) = app.access_token();

    let response = app
        .client
        .post(app.url("/manage/workspaces"))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{\"name\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    assert!(app.management.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_multipart_upload_is_reencoded() {
    let app = spawn_app().await;
    let (_, token) = app.access_token();
    let file_bytes: Vec<u8> = (0u8..=255).cycle().take(4096).collect();

    Mock::given(method("POST"))
        .and(path("/api/memories/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 31})))
        .expect(1)
        .mount(&app.repository)
        .await;

    let form = reqwest::multipart::Form::new()
        .text("title", "Beach day")
        .text("workspace", "9")
        .part(
            "image",
            reqwest::multipart::Part::bytes(file_bytes.clone())
                .file_name("beach.jpg")
                .mime_str("image/jpeg")
                .unwrap(),
        );
    let client_boundary = form.boundary().to_string();

    let response = app
        .client
        .post(app.url("/memos/memories"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], 31);

    let received = app.repository.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let request = &received[0];

    let content_type = request.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    assert!(!content_type.contains(&client_boundary));
    assert_eq!(request.headers.get_all("content-type").iter().count(), 1);

    let body = &request.body;
    let contains = |needle: &[u8]| body.windows(needle.len()).any(|w| w == needle);
    assert!(contains(&file_bytes));
    assert!(contains(b"filename=\"beach.jpg\""));
    assert!(contains(b"name=\"image\""));
    assert!(contains(b"image/jpeg"));
    assert!(contains(b"name=\"title\""));
    assert!(contains(b"Beach day"));
}

#[tokio::test]
async fn test_query_parameters_travel_separately() {
    let app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/api/future-activity/"))
        .and(query_param("from", "2024-01-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&app.scheduling)
        .await;

    let response = app
        .client
        .get(app.url("/event/future-activity?from=2024-01-01&tag=a&tag=b"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let received = app.scheduling.received_requests().await.unwrap();
    let url = &received[0].url;
    assert_eq!(url.path(), "/api/future-activity/");
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(
        pairs,
        vec![
            ("from".to_string(), "2024-01-01".to_string()),
            ("tag".to_string(), "a".to_string()),
            ("tag".to_string(), "b".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_delete_carries_no_body() {
    let app = spawn_app().await;
    let (_, token) = app.access_token();

    Mock::given(method("DELETE"))
        .and(path("/api/workspaces/3/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&app.management)
        .await;

    let response = app
        .client
        .delete(app.url("/manage/workspaces/3/"))
        .bearer_auth(&token)
        .json(&json!({"ignored": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let received = app.management.received_requests().await.unwrap();
    assert!(received[0].body.is_empty());
}

#[tokio::test]
async fn test_unsupported_method_is_rejected() {
    let app = spawn_app().await;
    let (_, token) = app.access_token();

    let response = app
        .client
        .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), app.url("/manage/workspaces"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
    assert!(app.management.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_identical_gets_get_identical_responses() {
    let app = spawn_app().await;
    let (_, token) = app.access_token();

    Mock::given(method("GET"))
        .and(path("/api/memories/5/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5, "title": "Lake"})))
        .expect(2)
        .mount(&app.repository)
        .await;

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let response = app
            .client
            .get(app.url("/memos/memories/5"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        bodies.push(response.bytes().await.unwrap());
    }
    assert_eq!(bodies[0], bodies[1]);
}

// ============================================================================
// Response translation
// ============================================================================

#[tokio::test]
async fn test_binary_download_passes_through() {
    let app = spawn_app().await;
    let (_, token) = app.access_token();
    let pdf: Vec<u8> = b"%PDF-1.7\n"
        .iter()
        .copied()
        .chain((0u8..=255).cycle().take(2048))
        .collect();

    Mock::given(method("GET"))
        .and(path("/api/workspaces/9/export/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(pdf.clone(), "application/pdf")
                .insert_header("content-disposition", "attachment; filename=\"trip.pdf\""),
        )
        .mount(&app.management)
        .await;

    let response = app
        .client
        .get(app.url("/manage/workspaces/9/export"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"trip.pdf\""
    );
    let body = response.bytes().await.unwrap();
    assert_eq!(body.as_ref(), pdf.as_slice());
}

#[tokio::test]
async fn test_backend_errors_pass_through_unchanged() {
    let app = spawn_app().await;
    let (_, token) = app.access_token();

    Mock::given(method("GET"))
        .and(path("/api/workspaces/404/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .mount(&app.management)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/workspaces/1/"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"name": ["This field may not be blank."]})),
        )
        .mount(&app.management)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/workspaces/crash/"))
        .respond_with(
            ResponseTemplate::new(500).set_body_raw("<h1>Server Error</h1>", "application/json"),
        )
        .mount(&app.management)
        .await;

    let response = app
        .client
        .get(app.url("/manage/workspaces/404"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"detail": "Not found."}));

    let response = app
        .client
        .patch(app.url("/manage/workspaces/1"))
        .bearer_auth(&token)
        .json(&json!({"name": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"name": ["This field may not be blank."]})
    );

    // Declared JSON that is not JSON: status kept, raw body passed through
    let response = app
        .client
        .get(app.url("/manage/workspaces/crash"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(response.text().await.unwrap(), "<h1>Server Error</h1>");
}

// ============================================================================
// Failure mapping
// ============================================================================

#[tokio::test]
async fn test_unreachable_backend_is_service_unavailable() {
    let closed = closed_port_url().await;
    let scheduling = MockServer::start().await;
    let config = test_config(&closed, &closed, &scheduling.uri(), 2);
    let token = memoria_gateway::auth::AuthManager::new(&config.security)
        .unwrap()
        .create_access_token(&uuid::Uuid::new_v4())
        .unwrap()
        .token;
    let address = serve(config).await;
    let client = reqwest::Client::builder().no_proxy().build().unwrap();

    let response = client
        .get(format!("{}/manage/workspaces", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "SERVICE_UNAVAILABLE");
    assert!(!body.to_string().contains("127.0.0.1"));

    // The scheduling backend is up; its unmatched-route 404 passes through
    let response = client
        .get(format!("{}/event/future-activity", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_slow_backend_is_gateway_timeout() {
    let app = spawn_app_with_timeout(1).await;
    let (_, token) = app.access_token();

    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"late": true}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&app.repository)
        .await;

    let response = app
        .client
        .get(app.url("/memos/memories"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 504);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "GATEWAY_TIMEOUT");
}

// ============================================================================
// Ambient endpoints
// ============================================================================

#[tokio::test]
async fn test_health_and_metrics() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    // Produce at least one rejection so the counter family is exported
    let _ = app.client.get(app.url("/manage/anything")).send().await.unwrap();

    let response = app.client.get(app.url("/metrics")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    assert!(text.contains("gateway_auth_rejections_total"));
}

#[tokio::test]
async fn test_cors_preflight_for_allowed_origin() {
    let app = spawn_app().await;

    let response = app
        .client
        .request(reqwest::Method::OPTIONS, app.url("/manage/workspaces"))
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );
    assert!(app.management.received_requests().await.unwrap().is_empty());
}
