//! Refresh-token and JWT-bearer exchanges against a mock token endpoint

use cloudmirror_core::domain::errors::AuthError;
use cloudmirror_core::ports::authenticator::IAuthenticator;
use cloudmirror_gdrive::auth::{AssertionClaims, CredentialsFileAuthenticator, DRIVE_SCOPE};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn authorized_user(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("credentials.json");
    std::fs::write(
        &path,
        json!({
            "type": "authorized_user",
            "client_id": "client-123.apps.googleusercontent.com",
            "client_secret": "shh",
            "refresh_token": "1//refresh"
        })
        .to_string(),
    )
    .unwrap();
    path
}

#[tokio::test]
async fn test_refresh_token_exchange() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let credentials = authorized_user(&dir);

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh",
            "token_type": "Bearer",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/drive"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = CredentialsFileAuthenticator::new()
        .with_token_url(format!("{}/token", server.uri()))
        .authenticate(&credentials)
        .await
        .unwrap();

    assert_eq!(credential.access_token, "ya29.fresh");
    assert!(credential.expires_at.is_some());
    assert!(!credential.is_expired());
}

#[tokio::test]
async fn test_rejected_refresh_token_is_exchange_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let credentials = authorized_user(&dir);

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let err = CredentialsFileAuthenticator::new()
        .with_token_url(format!("{}/token", server.uri()))
        .authenticate(&credentials)
        .await
        .unwrap_err();

    match err {
        AuthError::Exchange(message) => assert!(message.contains("invalid_grant"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
}

const SERVICE_ACCOUNT_KEY: &str = include_str!("../fixtures/service_account_key.pem");
const SERVICE_ACCOUNT_PUBLIC_KEY: &str = include_str!("../fixtures/service_account_pub.pem");
const CLIENT_EMAIL: &str = "mirror-bot@example-project.iam.gserviceaccount.com";

fn service_account(dir: &tempfile::TempDir, token_uri: &str) -> std::path::PathBuf {
    let path = dir.path().join("service-account.json");
    std::fs::write(
        &path,
        json!({
            "type": "service_account",
            "project_id": "example-project",
            "private_key_id": "key-1",
            "private_key": SERVICE_ACCOUNT_KEY,
            "client_email": CLIENT_EMAIL,
            "client_id": "1234567890",
            "token_uri": token_uri
        })
        .to_string(),
    )
    .unwrap();
    path
}

#[tokio::test]
async fn test_service_account_jwt_bearer_exchange() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let token_uri = format!("{}/token", server.uri());
    let credentials = service_account(&dir, &token_uri);

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.service",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = CredentialsFileAuthenticator::new()
        .authenticate(&credentials)
        .await
        .unwrap();
    assert_eq!(credential.access_token, "ya29.service");
    assert!(credential.expires_at.is_some());

    // The assertion is signed with the key from the file and addressed to
    // the file's token_uri.
    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let assertion = body
        .split('&')
        .find_map(|pair| pair.strip_prefix("assertion="))
        .unwrap();

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[token_uri.as_str()]);
    let key = DecodingKey::from_rsa_pem(SERVICE_ACCOUNT_PUBLIC_KEY.as_bytes()).unwrap();
    let claims = jsonwebtoken::decode::<AssertionClaims>(assertion, &key, &validation)
        .unwrap()
        .claims;
    assert_eq!(claims.iss, CLIENT_EMAIL);
    assert_eq!(claims.scope, DRIVE_SCOPE);
}

#[tokio::test]
async fn test_rejected_assertion_is_exchange_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let credentials = service_account(&dir, "https://oauth2.googleapis.com/token");

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = CredentialsFileAuthenticator::new()
        .with_token_url(format!("{}/token", server.uri()))
        .authenticate(&credentials)
        .await
        .unwrap_err();

    match err {
        AuthError::Exchange(message) => {
            assert_eq!(message, "HTTP 400: invalid_grant: Invalid JWT Signature.");
        }
        other => panic!("unexpected error: {other}"),
    }
}
