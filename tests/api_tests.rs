use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use std::sync::Arc;
use std::time::Duration;
use user_service::application::account_service::AccountService;
use user_service::data::user_repository::InMemoryUserRepository;
use user_service::domain::user::{LoginRequest, NewUser, PointAward, TokenRequest};
use user_service::infrastructure::point_client::HttpPointGateway;
use user_service::infrastructure::token::TokenCodec;
use user_service::presentation::handlers::{
    AppState, AuthResponse, RegistrationResponse, UserResponse, configure,
};
use user_service::presentation::middleware::RequestTracing;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

macro_rules! setup_test {
    ($point_status:expr) => {{
        let point_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/points"))
            .respond_with(ResponseTemplate::new($point_status))
            .mount(&point_server)
            .await;

        let point_gateway =
            HttpPointGateway::new(point_server.uri(), Duration::from_secs(2)).unwrap();
        let tokens = TokenCodec::new("test-secret-key-for-api-tests", Duration::from_secs(3600));
        let state = web::Data::new(AppState {
            accounts: AccountService::new(
                Arc::new(InMemoryUserRepository::new()),
                Arc::new(point_gateway),
                tokens,
                100,
            ),
        });

        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .wrap(RequestTracing)
                .configure(configure),
        )
        .await;

        (app, point_server)
    }};
    () => {
        setup_test!(201)
    };
}

/// Registers a user with password "password" and logs in as them.
macro_rules! register_and_login {
    ($app:expr, $email:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/users")
            .set_json(new_user($email))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(LoginRequest {
                email: $email.to_string(),
                password: "password".to_string(),
            })
            .to_request();
        let auth: AuthResponse = test::call_and_read_body_json(&$app, req).await;
        auth
    }};
}

fn new_user(email: &str) -> NewUser {
    NewUser::new("test", email, "password")
}

#[actix_web::test]
async fn test_health_check() {
    let (app, _points) = setup_test!();

    let req = test::TestRequest::get().uri("/api/health").to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["status"], "ok");
}

#[actix_web::test]
async fn test_create_user_hides_password() {
    let (app, _points) = setup_test!();

    let req = test::TestRequest::post()
        .uri("/api/users")
        .set_json(new_user("test@co.jp"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["email"], "test@co.jp");
    assert!(body["user"].get("password").is_none());
    assert_eq!(body["point_award"]["status"], "awarded");
    assert_eq!(body["point_award"]["points"], 100);
}

#[actix_web::test]
async fn test_create_user_reports_failed_point_award() {
    let (app, _points) = setup_test!(503);

    let req = test::TestRequest::post()
        .uri("/api/users")
        .set_json(new_user("test@co.jp"))
        .to_request();
    let resp: RegistrationResponse = test::call_and_read_body_json(&app, req).await;

    assert!(matches!(resp.point_award, PointAward::Failed { .. }));
    assert_eq!(resp.user.email, "test@co.jp");
}

#[actix_web::test]
async fn test_create_user_duplicate_email_conflicts() {
    let (app, _points) = setup_test!();

    for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
        let req = test::TestRequest::post()
            .uri("/api/users")
            .set_json(new_user("dup@co.jp"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected);
    }
}

#[actix_web::test]
async fn test_user_crud_flow() {
    let (app, _points) = setup_test!();

    let auth = register_and_login!(app, "crud@co.jp");
    let id = auth.user.id;
    let bearer = ("Authorization", format!("Bearer {}", auth.token));

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}", id))
        .to_request();
    let fetched: UserResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched, auth.user);

    let req = test::TestRequest::put()
        .uri(&format!("/api/users/{}", id))
        .insert_header(bearer.clone())
        .set_json(NewUser::new("not", "not@co.jp", "notpassword"))
        .to_request();
    let updated: UserResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated.id, id);
    assert_eq!(updated.name, "not");
    assert_eq!(updated.email, "not@co.jp");

    let req = test::TestRequest::get().uri("/api/users").to_request();
    let all: Vec<UserResponse> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(all.len(), 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/{}", id))
        .insert_header(bearer)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_mutations_without_token_are_unauthorized() {
    let (app, _points) = setup_test!();
    let auth = register_and_login!(app, "owner@co.jp");
    let uri = format!("/api/users/{}", auth.user.id);

    let req = test::TestRequest::put()
        .uri(&uri)
        .set_json(new_user("hijack@co.jp"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::delete().uri(&uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::delete()
        .uri(&uri)
        .insert_header(("Authorization", "Bearer testToken"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get().uri(&uri).to_request();
    let still_there: UserResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(still_there.email, "owner@co.jp");
}

#[actix_web::test]
async fn test_mutations_with_other_users_token_are_forbidden() {
    let (app, _points) = setup_test!();
    let owner = register_and_login!(app, "owner@co.jp");
    let intruder = register_and_login!(app, "intruder@co.jp");
    let uri = format!("/api/users/{}", owner.user.id);
    let bearer = ("Authorization", format!("Bearer {}", intruder.token));

    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(bearer.clone())
        .set_json(new_user("hijack@co.jp"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::delete()
        .uri(&uri)
        .insert_header(bearer)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get().uri("/api/users").to_request();
    let all: Vec<UserResponse> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(all.len(), 2);
}

#[actix_web::test]
async fn test_token_of_deleted_user_cannot_mutate() {
    let (app, _points) = setup_test!();
    let auth = register_and_login!(app, "gone@co.jp");
    let uri = format!("/api/users/{}", auth.user.id);
    let bearer = ("Authorization", format!("Bearer {}", auth.token));

    let req = test::TestRequest::delete()
        .uri(&uri)
        .insert_header(bearer.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(bearer)
        .set_json(new_user("back@co.jp"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_invalid_id_is_bad_request() {
    let (app, _points) = setup_test!();

    let req = test::TestRequest::get().uri("/api/users/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("abc"));
}

#[actix_web::test]
async fn test_login_and_token_auth_flow() {
    let (app, _points) = setup_test!();

    let req = test::TestRequest::post()
        .uri("/api/users")
        .set_json(new_user("flow@co.jp"))
        .to_request();
    let created: RegistrationResponse = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(LoginRequest {
            email: "flow@co.jp".to_string(),
            password: "password".to_string(),
        })
        .to_request();
    let auth: AuthResponse = test::call_and_read_body_json(&app, req).await;
    assert!(!auth.token.is_empty());
    assert_eq!(auth.user, created.user);

    let req = test::TestRequest::post()
        .uri("/api/auth/token")
        .set_json(TokenRequest { token: auth.token })
        .to_request();
    let user: UserResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(user, created.user);
}

#[actix_web::test]
async fn test_login_failures_are_unauthorized() {
    let (app, _points) = setup_test!();

    let req = test::TestRequest::post()
        .uri("/api/users")
        .set_json(new_user("known@co.jp"))
        .to_request();
    test::call_service(&app, req).await;

    for (email, password) in [("unknown@co.jp", "password"), ("known@co.jp", "wrong")] {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}

#[actix_web::test]
async fn test_token_auth_rejects_garbage() {
    let (app, _points) = setup_test!();

    let req = test::TestRequest::post()
        .uri("/api/auth/token")
        .set_json(TokenRequest {
            token: "testToken".to_string(),
        })
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_demo_data_can_be_created_repeatedly() {
    let (app, _points) = setup_test!();

    for expected_users in [2, 4] {
        let req = test::TestRequest::post().uri("/api/demo").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let auth: AuthResponse = test::read_body_json(resp).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/token")
            .set_json(TokenRequest { token: auth.token })
            .to_request();
        let user: UserResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(user, auth.user);

        let req = test::TestRequest::get().uri("/api/users").to_request();
        let all: Vec<UserResponse> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(all.len(), expected_users);
    }
}

#[actix_web::test]
async fn test_request_id_is_echoed() {
    let (app, _points) = setup_test!();

    let req = test::TestRequest::get()
        .uri("/api/health")
        .insert_header(("x-request-id", "req-123"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.headers().get("x-request-id").unwrap(), "req-123");
    assert!(resp.headers().contains_key("x-response-time"));
}

#[actix_web::test]
async fn test_request_id_is_generated() {
    let (app, _points) = setup_test!();

    let req = test::TestRequest::get().uri("/api/health").to_request();
    let resp = test::call_service(&app, req).await;

    let id = resp.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(!id.is_empty());
}
