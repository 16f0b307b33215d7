//! Integration tests for the mepauth server.
//!
//! Each test starts a server in-process on `127.0.0.1:0` with a fresh key
//! directory and talks to it over real TCP.
//!
//! Run them with:
//! ```text
//! cargo test -p mepauth-integration
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Once};

use mepauth_core::MemoryAccessKeyStore;
use mepauth_http::MepAuthHttpService;
use mepauth_keys::{KeyHierarchy, KeyPaths, MIN_USER_COMPONENT_LEN};
use mepauth_token_core::{CredentialService, TokenIssuer, TokenSigner, TrackerConfig};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use zeroize::Zeroizing;

/// Access key provisioned on every test server.
pub const ACCESS_KEY: &str = "QVUJMSUMgS0VZLS0tLS0";

/// Secret key provisioned on every test server.
pub const SECRET_KEY: &[u8] = b"00000000";

/// Application instance owning [`ACCESS_KEY`].
pub const APP_INSTANCE_ID: &str = "5abe4782-2c70-4e47-9a4e-0ee3a1a0fd1f";

/// Encrypted PKCS#8 signing key and its password.
pub const SIGNING_KEY: &str =
    include_str!("../../../crates/mepauth-token-core/testdata/jwt_encrypted_privatekey.pem");
/// Password of [`SIGNING_KEY`].
pub const SIGNING_KEY_PASSWORD: &[u8] = b"mepauth-test-password";
/// Public half of [`SIGNING_KEY`].
pub const PUBLIC_KEY: &str =
    include_str!("../../../crates/mepauth-token-core/testdata/jwt_publickey.pem");

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A running in-process server.
#[derive(Debug)]
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// The issuer behind the server, for inspecting tracker state.
    pub issuer: Arc<TokenIssuer>,
    shutdown: Option<oneshot::Sender<()>>,
    _key_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start a server with the default tracker windows.
    pub async fn start() -> Self {
        Self::start_with(TrackerConfig::default()).await
    }

    /// Start a server with custom tracker windows.
    pub async fn start_with(tracker: TrackerConfig) -> Self {
        init_tracing();

        let key_dir = tempfile::tempdir().expect("create key dir");
        let keys = KeyHierarchy::new(
            KeyPaths::in_dir(key_dir.path()),
            Zeroizing::new(vec![b'c'; MIN_USER_COMPONENT_LEN]),
        )
        .expect("valid key component");
        keys.init_root_key_and_work_key().expect("bootstrap keys");

        let credentials =
            CredentialService::new(Arc::new(MemoryAccessKeyStore::new()), Arc::new(keys));
        credentials
            .provision(APP_INSTANCE_ID, ACCESS_KEY, SECRET_KEY)
            .expect("provision credentials");

        let signer = TokenSigner::from_pem(SIGNING_KEY, Some(SIGNING_KEY_PASSWORD), "mepauth", 3600)
            .expect("load signing key");
        let issuer = Arc::new(TokenIssuer::new(Arc::new(credentials), signer, tracker));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel();
        let service = MepAuthHttpService::new(Arc::clone(&issuer));
        tokio::spawn(mepauth_http::serve(listener, service, async {
            rx.await.ok();
        }));

        Self {
            addr,
            issuer,
            shutdown: Some(tx),
            _key_dir: key_dir,
        }
    }

    /// Base URL of the server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Send a token request signed with `secret_key` from `client_ip`.
    pub async fn request_token(
        &self,
        path: &str,
        secret_key: &[u8],
        client_ip: &str,
    ) -> reqwest::Response {
        let mut request = http::Request::builder()
            .method("POST")
            .uri(self.url(path))
            .header("content-type", "json")
            .body(())
            .expect("valid request");
        mepauth_sign::authorize(&mut request, ACCESS_KEY, secret_key).expect("sign request");

        let mut builder = reqwest::Client::new().post(self.url(path));
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        builder
            .header("x-real-ip", client_ip)
            .send()
            .await
            .expect("send token request")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Decode and verify a token issued by a [`TestServer`].
#[must_use]
pub fn decode_token(token: &str) -> mepauth_token_core::Claims {
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.validate_aud = false;
    let key = jsonwebtoken::DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).expect("public key");
    jsonwebtoken::decode::<mepauth_token_core::Claims>(token, &key, &validation)
        .expect("valid token")
        .claims
}

mod test_token;
