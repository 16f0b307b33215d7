//! SDK-HMAC-SHA256 signature computation.
//!
//! 1. Build the canonical request from the method, path and every header of
//!    the request.
//! 2. Build the string to sign from the algorithm, the `x-sdk-date` value and
//!    the SHA-256 of the canonical request.
//! 3. HMAC-SHA256 the string to sign with the caller's secret key.
//!
//! The main entry points are [`sign`] (server and client) and [`authorize`]
//! (client).

use chrono::Utc;
use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::canonical::{build_canonical_request, build_signed_headers_string};
use crate::error::SignError;

/// Algorithm identifier, first line of the string to sign and first token of
/// the `Authorization` header.
pub const ALGORITHM: &str = "SDK-HMAC-SHA256";

/// Header carrying the signing timestamp.
pub const DATE_HEADER: &str = "x-sdk-date";

/// `chrono` format of the [`DATE_HEADER`] value (`YYYYMMDDTHHMMSSZ`).
pub const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Both SHA-256 pad states inside the MAC are wiped on drop.
type HmacSha256 = Hmac<Sha256>;

/// Build the string to sign.
///
/// # Examples
///
/// ```
/// use mepauth_sign::signer::build_string_to_sign;
///
/// let sts = build_string_to_sign("20200101T000000Z", "abc123");
/// assert_eq!(sts, "SDK-HMAC-SHA256\n20200101T000000Z\nabc123");
/// ```
#[must_use]
pub fn build_string_to_sign(date: &str, canonical_request_hash: &str) -> String {
    format!("{ALGORITHM}\n{date}\n{canonical_request_hash}")
}

/// HMAC-SHA256 `string_to_sign` with `secret_key` and hex-encode the result.
pub fn compute_signature(secret_key: &[u8], string_to_sign: &str) -> Result<String, SignError> {
    let mut mac = HmacSha256::new_from_slice(secret_key).map_err(|_| SignError::Digest)?;
    mac.update(string_to_sign.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(signature)
}

/// Compute the signature of `request` with `secret_key`.
///
/// Every header present on the request is part of the canonical request, so
/// verifiers pass a request that carries exactly the signed headers.
///
/// # Errors
///
/// Returns [`SignError::MissingHeader`] when `x-sdk-date` is absent and
/// [`SignError::InvalidHeaderValue`] when a header value is not visible ASCII.
pub fn sign<B>(request: &http::Request<B>, secret_key: &[u8]) -> Result<String, SignError> {
    let headers = collect_headers(request.headers())?;
    let date = request
        .headers()
        .get(DATE_HEADER)
        .ok_or_else(|| SignError::MissingHeader(DATE_HEADER.to_owned()))?
        .to_str()
        .map_err(|_| SignError::InvalidHeaderValue(DATE_HEADER.to_owned()))?;

    let canonical_request =
        build_canonical_request(request.method().as_str(), request.uri().path(), &headers);
    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));

    debug!(canonical_request, "Built canonical request");

    let string_to_sign = build_string_to_sign(date, &canonical_hash);
    compute_signature(secret_key, &string_to_sign)
}

/// Sign an outgoing request in place.
///
/// Stamps `x-sdk-date` with the current UTC time and `Host` with the URI
/// authority when they are absent, then sets the `Authorization` header
/// covering every other header on the request.
///
/// # Examples
///
/// ```
/// use mepauth_sign::{authorize, parse_authorization};
///
/// let mut request = http::Request::builder()
///     .method("POST")
///     .uri("http://127.0.0.1:8080/mepauth/v1/token")
///     .header("content-type", "json")
///     .body(())
///     .unwrap();
/// authorize(&mut request, "QVUJMSUMgS0VZLS0tLS0", b"secret").unwrap();
///
/// let header = request.headers()["authorization"].to_str().unwrap();
/// let parsed = parse_authorization(header).unwrap();
/// assert_eq!(parsed.signed_headers, ["content-type", "host", "x-sdk-date"]);
/// ```
pub fn authorize<B>(
    request: &mut http::Request<B>,
    access_key: &str,
    secret_key: &[u8],
) -> Result<(), SignError> {
    request.headers_mut().remove(http::header::AUTHORIZATION);

    if !request.headers().contains_key(DATE_HEADER) {
        let now = Utc::now().format(DATE_FORMAT).to_string();
        let value = http::HeaderValue::from_str(&now)
            .map_err(|_| SignError::InvalidHeaderValue(DATE_HEADER.to_owned()))?;
        request.headers_mut().insert(DATE_HEADER, value);
    }

    if !request.headers().contains_key(http::header::HOST) {
        if let Some(authority) = request.uri().authority() {
            let value = http::HeaderValue::from_str(authority.as_str())
                .map_err(|_| SignError::InvalidHeaderValue("host".to_owned()))?;
            request.headers_mut().insert(http::header::HOST, value);
        }
    }

    let signature = sign(request, secret_key)?;
    let signed_headers = build_signed_headers_string(&collect_headers(request.headers())?);

    let authorization = format!(
        "{ALGORITHM} Access={access_key}, SignedHeaders={signed_headers}, Signature={signature}"
    );
    let value = http::HeaderValue::from_str(&authorization)
        .map_err(|_| SignError::InvalidHeaderValue("authorization".to_owned()))?;
    request
        .headers_mut()
        .insert(http::header::AUTHORIZATION, value);

    Ok(())
}

/// Collect every header as a `(name, value)` pair, keeping repeated names.
fn collect_headers(headers: &http::HeaderMap) -> Result<Vec<(&str, &str)>, SignError> {
    headers
        .iter()
        .map(|(name, value)| {
            value
                .to_str()
                .map(|v| (name.as_str(), v))
                .map_err(|_| SignError::InvalidHeaderValue(name.as_str().to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::parse_authorization;

    const TEST_SECRET: &[u8] = b"00000000";
    const TEST_DATE: &str = "20200101T000000Z";

    fn token_request(headers: &[(&str, &str)]) -> http::Request<()> {
        let mut builder = http::Request::builder()
            .method("POST")
            .uri("/mepauth/mepauth/v1/token");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_should_sign_token_request_deterministically() {
        let request = token_request(&[
            ("content-type", "json"),
            ("host", "127.0.0.1:8080"),
            ("x-sdk-date", TEST_DATE),
        ]);

        let first = sign(&request, TEST_SECRET).unwrap();
        let second = sign(&request, TEST_SECRET).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_eq!(
            first,
            "000d8a89bfbb49a40bca5a96e9fe2d05c184c8eadb9ddec731957a8893cb00a8"
        );
    }

    #[test]
    fn test_should_sign_identically_for_permuted_header_order() {
        let forward = token_request(&[
            ("content-type", "json"),
            ("host", "127.0.0.1:8080"),
            ("x-sdk-date", TEST_DATE),
        ]);
        let backward = token_request(&[
            ("x-sdk-date", TEST_DATE),
            ("host", "127.0.0.1:8080"),
            ("content-type", "json"),
        ]);

        assert_eq!(
            sign(&forward, TEST_SECRET).unwrap(),
            sign(&backward, TEST_SECRET).unwrap()
        );
    }

    #[test]
    fn test_should_produce_different_signature_for_different_secret() {
        let request = token_request(&[("host", "127.0.0.1:8080"), ("x-sdk-date", TEST_DATE)]);
        assert_ne!(
            sign(&request, TEST_SECRET).unwrap(),
            sign(&request, b"11111111").unwrap()
        );
    }

    #[test]
    fn test_should_fail_without_date_header() {
        let request = token_request(&[("host", "127.0.0.1:8080")]);
        let result = sign(&request, TEST_SECRET);
        assert!(matches!(result, Err(SignError::MissingHeader(h)) if h == DATE_HEADER));
    }

    #[test]
    fn test_should_fail_on_non_ascii_header_value() {
        let mut request = token_request(&[("x-sdk-date", TEST_DATE)]);
        request.headers_mut().insert(
            "x-custom",
            http::HeaderValue::from_bytes(&[0xe4, 0xb8, 0xad]).unwrap(),
        );
        let result = sign(&request, TEST_SECRET);
        assert!(matches!(result, Err(SignError::InvalidHeaderValue(_))));
    }

    #[test]
    fn test_should_accept_empty_secret_key() {
        let request = token_request(&[("x-sdk-date", TEST_DATE)]);
        assert!(sign(&request, b"").is_ok());
    }

    #[test]
    fn test_should_authorize_request_verifiable_by_sign() {
        let mut request = http::Request::builder()
            .method("POST")
            .uri("http://127.0.0.1:8080/mepauth/mepauth/v1/token")
            .header("content-type", "json")
            .header("x-sdk-date", TEST_DATE)
            .body(())
            .unwrap();
        authorize(&mut request, "QVUJMSUMgS0VZLS0tLS0", TEST_SECRET).unwrap();

        let header = request.headers()[http::header::AUTHORIZATION]
            .to_str()
            .unwrap()
            .to_owned();
        let parsed = parse_authorization(&header).unwrap();
        assert_eq!(parsed.access_key, "QVUJMSUMgS0VZLS0tLS0");
        assert_eq!(parsed.signed_headers, ["content-type", "host", "x-sdk-date"]);
        assert_eq!(
            parsed.signature,
            "000d8a89bfbb49a40bca5a96e9fe2d05c184c8eadb9ddec731957a8893cb00a8"
        );
    }

    #[test]
    fn test_should_wipe_hmac_state_on_drop() {
        use hmac::block_api::HmacCore;
        use sha2::digest::block_api::{Buffer, CoreProxy};
        use sha2::digest::zeroize::ZeroizeOnDrop;

        fn assert_wiped_on_drop<T: ZeroizeOnDrop>() {}

        // `HmacCore` keeps the inner and outer pad states as two of these.
        assert_wiped_on_drop::<<Sha256 as CoreProxy>::Core>();
        assert_wiped_on_drop::<Buffer<HmacCore<Sha256>>>();
        assert_wiped_on_drop::<Sha256>();
    }

    #[test]
    fn test_should_stamp_date_header_when_absent() {
        let mut request = http::Request::builder()
            .method("POST")
            .uri("http://localhost/token")
            .body(())
            .unwrap();
        authorize(&mut request, "QVUJMSUMgS0VZLS0tLS0", TEST_SECRET).unwrap();

        let date = request.headers()[DATE_HEADER].to_str().unwrap();
        assert!(crate::authorization::parse_sdk_date(date).is_ok());
        assert_eq!(request.headers()[http::header::HOST], "localhost");
    }
}
