//! Integration tests for the login handshake
//!
//! These tests use wiremock to stand in for the member and content hosts.

use pdf_concierge::config::UserAgentConfig;
use pdf_concierge::session::{
    AuthError, Authenticator, Credentials, HandshakePhase, SessionEndpoints, SessionManager,
};
use pdf_concierge::source::build_session_client;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manager(server: &MockServer) -> SessionManager {
    let client = build_session_client(&UserAgentConfig::default()).unwrap();
    SessionManager::new(client, SessionEndpoints::with_hosts(&server.uri(), &server.uri()))
}

fn credentials() -> Credentials {
    Credentials::new("reader", "secret")
}

async fn mount_login(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/member_login_process.php"))
        .and(body_string_contains("user_id=reader"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_handshake_accumulates_cookies() {
    let server = MockServer::start().await;
    mount_login(&server, 200).await;

    // The action endpoint redirects; its cookies must survive
    Mock::given(method("POST"))
        .and(path("/mem/v1/action.php"))
        .and(body_string_contains("c=login_action"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/loginAction.asp")
                .insert_header("set-cookie", "SID=abc; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Main/Index.asp"))
        .and(header("cookie", "SID=abc"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "ASP=x; HttpOnly"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/loginAction.asp"))
        .and(header("cookie", "ASP=x; SID=abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let context = manager(&server).establish(&credentials()).await.unwrap();

    assert_eq!(context.cookies().len(), 2);
    assert_eq!(context.cookies().get("SID"), Some("abc"));
    assert_eq!(context.cookie_header().as_deref(), Some("ASP=x; SID=abc"));
    assert!(context.is_valid_at(context.established_at()));
}

#[tokio::test]
async fn test_failing_action_phase_is_reported() {
    let server = MockServer::start().await;
    mount_login(&server, 200).await;

    Mock::given(method("POST"))
        .and(path("/mem/v1/action.php"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = manager(&server).establish(&credentials()).await;
    assert!(matches!(
        result,
        Err(AuthError::Status {
            phase: HandshakePhase::Action,
            status: 500
        })
    ));
}

#[tokio::test]
async fn test_rejected_login_stops_handshake() {
    let server = MockServer::start().await;
    mount_login(&server, 403).await;

    Mock::given(method("POST"))
        .and(path("/mem/v1/action.php"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = manager(&server).establish(&credentials()).await;
    assert!(matches!(
        result,
        Err(AuthError::Status {
            phase: HandshakePhase::Login,
            status: 403
        })
    ));
}

#[tokio::test]
async fn test_handshake_without_cookies_fails() {
    let server = MockServer::start().await;
    mount_login(&server, 200).await;

    for (verb, route) in [
        ("POST", "/mem/v1/action.php"),
        ("GET", "/Main/Index.asp"),
        ("GET", "/loginAction.asp"),
    ] {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
    }

    let result = manager(&server).establish(&credentials()).await;
    assert!(matches!(result, Err(AuthError::NoSessionCookie)));
}
