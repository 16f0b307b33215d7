//! Token endpoint integration tests.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mepauth_token_core::{AkState, TrackerConfig};

    use crate::{ACCESS_KEY, APP_INSTANCE_ID, SECRET_KEY, TestServer, decode_token};

    const CLIENT_IP: &str = "172.16.0.5";

    #[tokio::test]
    async fn test_should_issue_token_for_signed_request() {
        let server = TestServer::start().await;

        let resp = server
            .request_token("/mepauth/v1/token", SECRET_KEY, CLIENT_IP)
            .await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["server"], "mepauth");
        assert!(resp.headers().contains_key("x-request-id"));

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 3600);

        let claims = decode_token(body["access_token"].as_str().unwrap());
        assert_eq!(claims.sub, APP_INSTANCE_ID);
        assert_eq!(claims.iss, "mepauth");
        assert_eq!(claims.claims.clientip, CLIENT_IP);
    }

    #[tokio::test]
    async fn test_should_serve_short_token_path() {
        let server = TestServer::start().await;
        let resp = server.request_token("/token", SECRET_KEY, CLIENT_IP).await;
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_should_reject_bad_signature_with_json_error() {
        let server = TestServer::start().await;

        let resp = server.request_token("/token", b"not-the-secret", CLIENT_IP).await;
        assert_eq!(resp.status(), 401);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "Unauthorized");
        assert_eq!(server.issuer.tracker().failure_count(ACCESS_KEY), 1);
    }

    #[tokio::test]
    async fn test_should_block_access_key_after_repeated_failures() {
        let server = TestServer::start().await;

        for _ in 0..3 {
            let resp = server.request_token("/token", b"wrong", CLIENT_IP).await;
            assert_eq!(resp.status(), 401);
        }
        assert_eq!(
            server.issuer.tracker().state(ACCESS_KEY),
            Some(AkState::UnderBlockList)
        );

        let resp = server.request_token("/token", SECRET_KEY, CLIENT_IP).await;
        assert_eq!(resp.status(), 403);
    }

    #[tokio::test]
    async fn test_should_lift_block_after_block_window() {
        let server = TestServer::start_with(TrackerConfig {
            validation_window: Duration::from_millis(200),
            block_window: Duration::from_millis(300),
            block_threshold: 2,
        })
        .await;

        for _ in 0..2 {
            let _ = server.request_token("/token", b"wrong", CLIENT_IP).await;
        }
        let resp = server.request_token("/token", SECRET_KEY, CLIENT_IP).await;
        assert_eq!(resp.status(), 403);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let resp = server.request_token("/token", SECRET_KEY, CLIENT_IP).await;
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_should_reject_missing_client_ip() {
        let server = TestServer::start().await;

        let resp = reqwest::Client::new()
            .post(server.url("/token"))
            .header("authorization", "SDK-HMAC-SHA256 Access=x")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_should_answer_health_and_reject_unknown_routes() {
        let server = TestServer::start().await;
        let client = reqwest::Client::new();

        let resp = client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "running");

        let resp = client.get(server.url("/token")).send().await.unwrap();
        assert_eq!(resp.status(), 405);

        let resp = client.post(server.url("/unknown")).send().await.unwrap();
        assert_eq!(resp.status(), 404);
    }
}
