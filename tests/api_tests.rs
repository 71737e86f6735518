use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use bizpanel::api::{self, AppState};
use bizpanel::config::{Config, SecurityConfig};
use bizpanel::db::NewUser;
use bizpanel::db::repositories::turn::NewTurn;
use bizpanel::db::repositories::user::hash_password;
use bizpanel::permissions::{CapabilitySet, Permission, Resource};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

const PASSWORD: &str = "correct-horse-battery";

const BOUNDARY: &str = "----bizpanel-test-boundary";

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    media_root: PathBuf,
}

fn fast_security() -> SecurityConfig {
    SecurityConfig {
        argon2_memory_cost_kib: 1024,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
    }
}

async fn spawn_app() -> TestApp {
    let media_root =
        std::env::temp_dir().join(format!("bizpanel-test-{}", uuid::Uuid::new_v4().simple()));

    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.auth.jwt_secret = Some("integration-test-secret-0123456789".to_string());
    config.security = fast_security();
    config.media.root = media_root.to_string_lossy().into_owned();
    config.observability.metrics_enabled = false;

    let state = api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    TestApp {
        router: api::router(state.clone()),
        state,
        media_root,
    }
}

impl TestApp {
    /// Inserts a user straight through the store, with [`PASSWORD`].
    async fn create_user(&self, username: &str, admin: Option<i32>, group: &str) -> i32 {
        let hash = hash_password(PASSWORD, Some(&fast_security())).unwrap();
        self.state
            .store()
            .user_repo()
            .create(
                NewUser {
                    username: username.to_string(),
                    password_hash: Some(hash),
                    admin_id: admin,
                    ..Default::default()
                },
                Some(group),
            )
            .await
            .unwrap()
            .id
    }

    async fn create_superuser(&self, username: &str) -> i32 {
        let hash = hash_password(PASSWORD, Some(&fast_security())).unwrap();
        self.state
            .store()
            .user_repo()
            .create(
                NewUser {
                    username: username.to_string(),
                    password_hash: Some(hash),
                    is_superuser: true,
                    ..Default::default()
                },
                Some("admin_user"),
            )
            .await
            .unwrap()
            .id
    }

    async fn grant(&self, user_id: i32, permissions: &[Permission]) {
        let set: CapabilitySet = permissions.iter().copied().collect();
        self.state
            .store()
            .permission_repo()
            .replace_direct(user_id, set)
            .await
            .unwrap();
    }

    async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/api/auth/token",
                None,
                Some(json!({"username": username, "password": PASSWORD})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["data"]["access"].as_str().unwrap().to_string()
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", mime::APPLICATION_JSON.as_ref())
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.call(request).await
    }

    /// Sends `user` and `image` as `multipart/form-data`.
    async fn send_image(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        user: Option<i32>,
        image: Option<(&str, &str, &[u8])>,
    ) -> (StatusCode, Value) {
        let mut body = Vec::new();
        if let Some(user) = user {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"user\"\r\n\r\n{user}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, content_type, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .header(
                "Content-Type",
                format!("{}; boundary={BOUNDARY}", mime::MULTIPART_FORM_DATA),
            )
            .body(Body::from(body))
            .unwrap();
        self.call(request).await
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.media_root);
    }
}

#[tokio::test]
async fn test_authentication() {
    let app = spawn_app().await;
    app.create_user("alice", None, "admin_user").await;

    let (status, _) = app.send("GET", "/api/users/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send("GET", "/api/users/", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/token",
            None,
            Some(json!({"username": "alice", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, body) = app
        .send("POST", "/api/auth/token", None, Some(json!({"username": "alice"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["password"].is_array());

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/token",
            None,
            Some(json!({"username": "alice", "password": PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["data"]["access"].as_str().unwrap().to_string();
    let refresh = body["data"]["refresh"].as_str().unwrap().to_string();

    let (status, _) = app.send("GET", "/api/users/", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);

    // refresh tokens are not accepted as bearer credentials
    let (status, _) = app.send("GET", "/api/users/", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/token/refresh",
            None,
            Some(json!({"refresh": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let renewed = body["data"]["access"].as_str().unwrap();

    let (status, _) = app.send("GET", "/api/users/", Some(renewed), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            "POST",
            "/api/auth/token/refresh",
            None,
            Some(json!({"refresh": access})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_edits_own_sub_user_only() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    app.create_user("bob", None, "admin_user").await;
    let alice_token = app.login("alice").await;
    let bob_token = app.login("bob").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/users/",
            Some(&alice_token),
            Some(json!({
                "username": "sara",
                "password": "sara-password",
                "email": "sara@example.com",
                "mobile": "9121234567",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["admin"], alice);
    assert!(body["data"]["create_date_time"]["jalali"].is_string());
    let sara = body["data"]["id"].as_i64().unwrap();

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/api/users/{sara}/"),
            Some(&alice_token),
            Some(json!({"first_name": "Sara", "email": null})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["first_name"], "Sara");
    assert!(body["data"]["email"].is_null());
    assert_eq!(body["data"]["mobile"], "9121234567");

    let (status, _) = app
        .send(
            "PATCH",
            &format!("/api/users/{sara}/"),
            Some(&bob_token),
            Some(json!({"first_name": "Mallory"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("GET", &format!("/api/users/{sara}/"), Some(&bob_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.send("GET", "/api/users/", Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (_, body) = app
        .send("GET", "/api/users/", Some(&alice_token), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["username"], "sara");
}

#[tokio::test]
async fn test_user_validation_and_uniqueness() {
    let app = spawn_app().await;
    app.create_user("alice", None, "admin_user").await;
    let token = app.login("alice").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/users/",
            Some(&token),
            Some(json!({
                "username": "bad name",
                "email": "nope",
                "mobile": "09121234567",
                "commission": 120,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    for field in ["username", "email", "mobile", "commission"] {
        assert!(body["fields"][field].is_array(), "missing {field}: {body}");
    }

    let (status, _) = app
        .send(
            "POST",
            "/api/users/",
            Some(&token),
            Some(json!({"username": "reza", "email": "reza@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            "POST",
            "/api/users/",
            Some(&token),
            Some(json!({"username": "reza", "email": "reza@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["username"].is_array());
    assert!(body["fields"]["email"].is_array());

    let (status, _) = app
        .send(
            "POST",
            "/api/users/",
            Some(&token),
            Some(json!({"username": "neda", "gender": "Robot"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_employees_and_coworkers_are_filtered_by_group() {
    let app = spawn_app().await;
    app.create_user("alice", None, "admin_user").await;
    let token = app.login("alice").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/employees/",
            Some(&token),
            Some(json!({"username": "worker"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let worker = body["data"]["id"].as_i64().unwrap();

    let (_, body) = app
        .send("GET", "/api/employees/", Some(&token), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .send("GET", "/api/coworkers/", Some(&token), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (_, body) = app.send("GET", "/api/users/", Some(&token), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send("GET", &format!("/api/coworkers/{worker}/"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send("GET", &format!("/api/employees/{worker}/"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_cycle_is_rejected() {
    let app = spawn_app().await;
    let root = app.create_superuser("root").await;
    let s1 = app.create_user("s1", Some(root), "end_user").await;
    let s2 = app.create_user("s2", Some(s1), "end_user").await;
    let other = app.create_user("other", Some(root), "end_user").await;
    let token = app.login("root").await;

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/api/users/{s1}/"),
            Some(&token),
            Some(json!({"admin": s2})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["admin"].is_array());

    let (status, _) = app
        .send(
            "PATCH",
            &format!("/api/users/{s1}/"),
            Some(&token),
            Some(json!({"admin": s1})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/api/users/{other}/"),
            Some(&token),
            Some(json!({"admin": s1})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["admin"], s1);
}

#[tokio::test]
async fn test_ticket_ownership() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    app.create_user("end1", Some(alice), "end_user").await;
    app.create_user("end2", Some(alice), "end_user").await;
    let end1 = app.login("end1").await;
    let end2 = app.login("end2").await;
    let admin = app.login("alice").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/tickets/",
            Some(&end1),
            Some(json!({"subject": "Broken", "text": "It broke", "message_type": "Support"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "Waiting");
    assert_eq!(body["data"]["message_type_display"], "پشتیبانی");
    let ticket = body["data"]["id"].as_i64().unwrap();
    let url = format!("/api/tickets/{ticket}/");

    let (status, _) = app.send("GET", &url, Some(&end1), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send("GET", &url, Some(&end2), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // no admin override on tickets
    let (status, _) = app.send("GET", &url, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send("PATCH", &url, Some(&admin), Some(json!({"status": "Closed"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("PATCH", &url, Some(&end2), Some(json!({"status": "Closed"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for next in ["Closed", "Waiting", "Pending", "Closed"] {
        let (status, body) = app
            .send("PATCH", &url, Some(&end1), Some(json!({"status": next})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], next);
    }

    let (status, _) = app
        .send("PATCH", &url, Some(&end1), Some(json!({"status": "Open"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send("PATCH", &url, Some(&end1), Some(json!({"subject": "  "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["subject"].is_array());

    let (status, _) = app.send("DELETE", &url, Some(&end1), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send("GET", &url, Some(&end1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_turn_scheduling() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    let bob = app.create_user("bob", None, "admin_user").await;
    let emp = app.create_user("emp", Some(alice), "employee_user").await;
    app.create_user("emp2", Some(alice), "employee_user").await;
    let customer = app.create_user("cust", Some(alice), "end_user").await;
    let stranger = app.create_user("stranger", Some(bob), "end_user").await;

    app.grant(
        emp,
        &[
            Permission::add(Resource::Turn),
            Permission::view(Resource::Turn),
        ],
    )
    .await;
    app.grant(customer, &[Permission::view(Resource::Turn)]).await;

    let emp_token = app.login("emp").await;
    let emp2_token = app.login("emp2").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/turns/",
            Some(&emp_token),
            Some(json!({
                "user": customer,
                "date_visit": "1401-01-20 10:30",
                "description": "first visit",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["coworker"], emp);
    assert_eq!(body["data"]["visit_date_time"]["jalali"], "1401/01/20 10:30");
    assert_eq!(
        body["data"]["visit_date_time"]["gregorian"],
        "2022/04/09 10:30"
    );
    let turn = body["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .send("GET", &format!("/api/turns/{turn}/"), Some(&emp_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            "POST",
            "/api/turns/",
            Some(&emp2_token),
            Some(json!({"user": customer, "date_visit": "2022-04-09 10:30"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            "POST",
            "/api/turns/",
            Some(&emp_token),
            Some(json!({"user": customer, "date_visit": "next week"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["date_visit"].is_array());

    let (status, _) = app
        .send(
            "POST",
            "/api/turns/",
            Some(&emp_token),
            Some(json!({"user": stranger, "date_visit": "2022-04-09 10:30"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let cust_token = app.login("cust").await;
    let (status, body) = app
        .send("GET", "/api/readTurns/", Some(&cust_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send(
            "GET",
            &format!("/api/readTurns/{turn}/"),
            Some(&cust_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .send("GET", "/api/readTurns/", Some(&emp_token), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_read_turns_covers_the_whole_tenant() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    app.create_user("bob", None, "admin_user").await;
    let emp = app.create_user("emp", Some(alice), "employee_user").await;
    let customer = app.create_user("cust", Some(alice), "end_user").await;
    app.grant(emp, &[Permission::view(Resource::Turn)]).await;

    let turn = app
        .state
        .store()
        .turn_repo()
        .create(NewTurn {
            user_id: customer,
            coworker_id: None,
            product_id: None,
            date_visit: chrono::Utc::now(),
            description: None,
        })
        .await
        .unwrap();
    let url = format!("/api/readTurns/{}/", turn.id);

    for username in ["alice", "emp"] {
        let token = app.login(username).await;
        let (status, body) = app.send("GET", &url, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK, "{username}: {body}");
        assert_eq!(body["data"]["user"], customer);

        let (status, body) = app.send("GET", "/api/readTurns/", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    let bob_token = app.login("bob").await;
    let (status, _) = app.send("GET", &url, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app
        .send("GET", "/api/readTurns/", Some(&bob_token), None)
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_user_permission_lists() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    app.create_user("bob", None, "admin_user").await;
    let sub = app.create_user("sub", Some(alice), "end_user").await;
    let alice_token = app.login("alice").await;
    let bob_token = app.login("bob").await;

    let (status, body) = app
        .send(
            "GET",
            &format!("/api/UserPermissionList/{sub}"),
            Some(&alice_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["groups"], json!(["end_user"]));
    assert_eq!(body["data"]["permissions"].as_array().unwrap().len(), 0);
    assert!(
        body["data"]["effective"]
            .as_array()
            .unwrap()
            .contains(&json!("add_ticket"))
    );

    let (status, _) = app
        .send(
            "PATCH",
            &format!("/api/ChangeUserPermissionList/{sub}"),
            Some(&alice_token),
            Some(json!({"permission_id": [1, "add_turn"]})),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app
        .send(
            "GET",
            &format!("/api/UserPermissionList/{sub}"),
            Some(&alice_token),
            None,
        )
        .await;
    let codenames: Vec<&str> = body["data"]["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["codename"].as_str().unwrap())
        .collect();
    assert_eq!(codenames, vec!["view_user", "add_turn"]);

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/api/ChangeUserPermissionList/{sub}"),
            Some(&alice_token),
            Some(json!({"permission_id": [99]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["permission_id"].is_array());

    let (status, _) = app
        .send(
            "GET",
            &format!("/api/UserPermissionList/{sub}"),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            "PATCH",
            &format!("/api/ChangeUserPermissionList/{sub}"),
            Some(&bob_token),
            Some(json!({"permission_id": []})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_grants_limited_to_held_permissions() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    let manager = app.create_user("manager", Some(alice), "employee_user").await;
    let target = app.create_user("target", Some(manager), "end_user").await;
    app.grant(
        manager,
        &[
            Permission::view(Resource::User),
            Permission::change(Resource::User),
        ],
    )
    .await;
    let token = app.login("manager").await;
    let url = format!("/api/ChangeUserPermissionList/{target}");

    let (status, _) = app
        .send(
            "PATCH",
            &url,
            Some(&token),
            Some(json!({"permission_id": ["view_ticket", "users.view_user"]})),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(
            "PATCH",
            &url,
            Some(&token),
            Some(json!({"permission_id": ["delete_user"]})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_image_upload_and_delete() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    app.create_user("bob", None, "admin_user").await;
    let sub = app.create_user("sub", Some(alice), "end_user").await;
    let alice_token = app.login("alice").await;
    let bob_token = app.login("bob").await;

    let png: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png";

    let (status, body) = app
        .send_image(
            "POST",
            "/api/usersImage/",
            &alice_token,
            Some(sub),
            Some(("face.png", "image/png", png)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["user"], sub);
    let path = body["data"]["path"].as_str().unwrap().to_string();
    assert!(path.starts_with("images/") && path.ends_with(".png"));
    assert_eq!(body["data"]["url"], format!("/files/{path}"));
    assert!(app.media_root.join(&path).exists());
    let image = body["data"]["id"].as_i64().unwrap();

    let request = Request::builder()
        .uri(format!("/files/{path}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.call(request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send_image("POST", "/api/usersImage/", &alice_token, Some(sub), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["image"].is_array());

    let (status, body) = app
        .send_image(
            "POST",
            "/api/usersImage/",
            &alice_token,
            Some(sub),
            Some(("notes.txt", "text/plain", b"hello")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["image"].is_array());

    let (status, _) = app
        .send_image(
            "POST",
            "/api/usersImage/",
            &bob_token,
            Some(sub),
            Some(("face.png", "image/png", png)),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let url = format!("/api/usersImage/{image}/");
    let (status, _) = app.send("GET", &url, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send("DELETE", &url, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("DELETE", &url, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!app.media_root.join(&path).exists());

    let (status, _) = app.send("GET", &url, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_user_removes_subtree() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    app.create_user("bob", None, "admin_user").await;
    let sub = app.create_user("sub", Some(alice), "end_user").await;
    let grandchild = app.create_user("grandchild", Some(sub), "end_user").await;
    let alice_token = app.login("alice").await;
    let bob_token = app.login("bob").await;

    let url = format!("/api/users/{sub}/");
    let (status, _) = app.send("DELETE", &url, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("DELETE", &url, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send("GET", &url, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let users = app.state.store().user_repo();
    assert!(users.get(sub).await.unwrap().is_none());
    assert!(users.get(grandchild).await.unwrap().is_none());
    assert!(users.get(alice).await.unwrap().is_some());
}

#[tokio::test]
async fn test_notifications() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    app.create_user("bob", None, "admin_user").await;
    let sub = app.create_user("sub", Some(alice), "end_user").await;
    let alice_token = app.login("alice").await;
    let bob_token = app.login("bob").await;
    let sub_token = app.login("sub").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/notifications/",
            Some(&alice_token),
            Some(json!({"user": sub, "text": "Invoice ready", "types": ["news", "billing"]})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["types"], json!(["billing", "news"]));
    let notification = body["data"]["id"].as_i64().unwrap();
    let url = format!("/api/notifications/{notification}/");

    let (_, body) = app
        .send("GET", "/api/notifications/", Some(&sub_token), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .send("GET", "/api/notifications/", Some(&alice_token), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, _) = app.send("GET", &url, Some(&sub_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            "POST",
            "/api/notifications/",
            Some(&bob_token),
            Some(json!({"user": sub, "text": "Spam"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send("GET", "/api/notificationTypes/", Some(&alice_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let types = body["data"].as_array().unwrap();
    assert_eq!(types.len(), 2);
    assert!(types.iter().all(|t| t["notifications"] == 1));

    // end users hold no notification permissions
    let (status, _) = app.send("DELETE", &url, Some(&sub_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("DELETE", &url, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("DELETE", &url, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send("GET", &url, Some(&sub_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_edit_profile() {
    let app = spawn_app().await;
    let alice = app.create_user("alice", None, "admin_user").await;
    let token = app.login("alice").await;

    let (status, body) = app.send("GET", "/api/EditProfile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");

    let (status, body) = app
        .send(
            "PATCH",
            "/api/EditProfile",
            Some(&token),
            Some(json!({"first_name": "Alice", "gender": "Female"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["first_name"], "Alice");
    assert_eq!(body["data"]["gender_display"], "زن");

    let (status, body) = app
        .send(
            "PATCH",
            "/api/EditProfile",
            Some(&token),
            Some(json!({"admin": 7})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["admin"].is_array());

    let end = app.create_user("endu", Some(alice), "end_user").await;
    let end_token = app.login("endu").await;
    let (status, body) = app
        .send(
            "PATCH",
            "/api/EditProfile",
            Some(&end_token),
            Some(json!({
                "credit": 999_999_999,
                "point": 50,
                "remained_sms": 100_000,
                "commission": 100,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    for field in ["credit", "point", "remained_sms", "commission"] {
        assert!(body["fields"][field].is_array(), "{field}: {body}");
    }
    let stored = app.state.store().user_repo().get(end).await.unwrap().unwrap();
    assert_eq!(stored.credit, 0);
    assert_eq!(stored.point, 0);
    assert_eq!(stored.remained_sms, 0);
    assert_eq!(stored.commission, None);

    let (status, body) = app
        .send(
            "PATCH",
            "/api/EditProfile",
            Some(&token),
            Some(json!({"password": "brand-new-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["current_password"].is_array());

    let (status, _) = app
        .send(
            "PATCH",
            "/api/EditProfile",
            Some(&token),
            Some(json!({"password": "brand-new-password", "current_password": PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            "POST",
            "/api/auth/token",
            None,
            Some(json!({"username": "alice", "password": "brand-new-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_locations_and_city_reference() {
    let app = spawn_app().await;
    app.create_user("alice", None, "admin_user").await;
    let token = app.login("alice").await;

    let locations = app.state.store().location_repo();
    let country = locations.add_country("Iran", "98").await.unwrap();
    let province = locations.add_province(country.id, "Tehran").await.unwrap();
    let city = locations.add_city(province.id, "Tehran").await.unwrap();

    let (status, body) = app.send("GET", "/api/countries/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["phone_code"], "98");

    let (_, body) = app
        .send(
            "GET",
            &format!("/api/countries/{}/provinces/", country.id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .send(
            "GET",
            &format!("/api/provinces/{}/cities/", province.id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(body["data"][0]["id"], city.id);

    let (status, _) = app
        .send("GET", "/api/countries/999/provinces/", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            "POST",
            "/api/users/",
            Some(&token),
            Some(json!({"username": "tehrani", "city": city.id})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["city"], city.id);

    let (status, body) = app
        .send(
            "POST",
            "/api/users/",
            Some(&token),
            Some(json!({"username": "nowhere", "city": 999})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["city"].is_array());
}

#[tokio::test]
async fn test_health_and_request_log() {
    let app = spawn_app().await;
    app.create_user("alice", None, "admin_user").await;

    let (status, body) = app.send("GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");

    let token = app.login("alice").await;
    let request = Request::builder()
        .uri("/api/users/")
        .header("Authorization", format!("Bearer {token}"))
        .header("X-Forwarded-For", "203.0.113.9")
        .header("User-Agent", "integration-test")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.call(request).await;
    assert_eq!(status, StatusCode::OK);

    // health, login and the listing above
    let logged = app.state.store().request_log_repo().count().await.unwrap();
    assert_eq!(logged, 3);
}
