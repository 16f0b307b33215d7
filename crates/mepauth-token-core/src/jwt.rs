//! RS256 token signing.
//!
//! The signing key is an RSA private key in PEM form, normally an encrypted
//! PKCS#8 document (`ENCRYPTED PRIVATE KEY`) whose password is itself sealed
//! under the work key. The decrypted PKCS#1 DER is held in a wiping buffer and
//! a short-lived `EncodingKey` is built from it for every token.

use std::fmt;
use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pkcs8::der::Decode;
use pkcs8::{EncryptedPrivateKeyInfo, ObjectIdentifier, PrivateKeyInfo, SecretDocument};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const RSA_ENCRYPTION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// Errors raised while loading the signing key or signing a token.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// The key file could not be read.
    #[error("failed to read token signing key: {0}")]
    Io(#[from] std::io::Error),

    /// The PEM document is not a supported RSA private key.
    #[error("token signing key is not a supported RSA private key")]
    InvalidKey,

    /// The key is encrypted and no password was supplied.
    #[error("token signing key is encrypted but no password was supplied")]
    PasswordRequired,

    /// The key could not be decrypted with the supplied password.
    #[error("token signing key could not be decrypted")]
    Decryption,

    /// Encoding the token failed.
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Claims private to mepauth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientClaims {
    /// IP address the token was issued to.
    pub clientip: String,
}

/// Claims of an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer, the signing key id.
    pub iss: String,
    /// Subject, the application instance id.
    pub sub: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// mepauth-specific claims.
    pub claims: ClientClaims,
}

/// A freshly minted token, wiped from memory on drop.
pub struct IssuedToken {
    /// The compact JWS.
    pub access_token: Zeroizing<String>,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Mints RS256 tokens.
pub struct TokenSigner {
    der: Zeroizing<Vec<u8>>,
    key_id: String,
    ttl_secs: u64,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("key_id", &self.key_id)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Load the signing key from a PEM string.
    ///
    /// Accepts `ENCRYPTED PRIVATE KEY` (requires `password`), `PRIVATE KEY`
    /// and `RSA PRIVATE KEY` documents.
    pub fn from_pem(
        pem: &str,
        password: Option<&[u8]>,
        key_id: impl Into<String>,
        ttl_secs: u64,
    ) -> Result<Self, JwtError> {
        let (label, document) = SecretDocument::from_pem(pem).map_err(|_| JwtError::InvalidKey)?;

        let der = match label {
            "ENCRYPTED PRIVATE KEY" => {
                let password = password.ok_or(JwtError::PasswordRequired)?;
                let encrypted = EncryptedPrivateKeyInfo::from_der(document.as_bytes())
                    .map_err(|_| JwtError::InvalidKey)?;
                let decrypted = encrypted
                    .decrypt(password)
                    .map_err(|_| JwtError::Decryption)?;
                rsa_key_from_pkcs8(decrypted.as_bytes())?
            }
            "PRIVATE KEY" => rsa_key_from_pkcs8(document.as_bytes())?,
            "RSA PRIVATE KEY" => Zeroizing::new(document.as_bytes().to_vec()),
            _ => return Err(JwtError::InvalidKey),
        };

        Ok(Self {
            der,
            key_id: key_id.into(),
            ttl_secs,
        })
    }

    /// Load the signing key from a PEM file.
    pub fn from_pem_file(
        path: &Path,
        password: Option<&[u8]>,
        key_id: impl Into<String>,
        ttl_secs: u64,
    ) -> Result<Self, JwtError> {
        let pem = Zeroizing::new(std::fs::read_to_string(path)?);
        Self::from_pem(&pem, password, key_id, ttl_secs)
    }

    /// The key id placed in the token header and `iss` claim.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Lifetime of minted tokens, in seconds.
    #[must_use]
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Mint a token for `app_instance_id` issued to `client_ip`.
    pub fn mint(&self, app_instance_id: &str, client_ip: &str) -> Result<IssuedToken, JwtError> {
        let iat = Utc::now().timestamp();
        let exp = iat.saturating_add(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX));

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key_id.clone());

        let claims = Claims {
            iss: self.key_id.clone(),
            sub: app_instance_id.to_owned(),
            iat,
            exp,
            claims: ClientClaims {
                clientip: client_ip.to_owned(),
            },
        };

        let key = EncodingKey::from_rsa_der(&self.der);
        let access_token = Zeroizing::new(jsonwebtoken::encode(&header, &claims, &key)?);

        Ok(IssuedToken {
            access_token,
            expires_in: self.ttl_secs,
        })
    }
}

/// Extract the PKCS#1 RSA key from a PKCS#8 `PrivateKeyInfo`.
fn rsa_key_from_pkcs8(der: &[u8]) -> Result<Zeroizing<Vec<u8>>, JwtError> {
    let info = PrivateKeyInfo::from_der(der).map_err(|_| JwtError::InvalidKey)?;
    if info.algorithm.oid != RSA_ENCRYPTION_OID {
        return Err(JwtError::InvalidKey);
    }
    Ok(Zeroizing::new(info.private_key.to_vec()))
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{DecodingKey, Validation};

    use super::*;

    const ENCRYPTED_KEY: &str = include_str!("../testdata/jwt_encrypted_privatekey.pem");
    const PLAIN_KEY: &str = include_str!("../testdata/jwt_privatekey.pem");
    const PUBLIC_KEY: &str = include_str!("../testdata/jwt_publickey.pem");
    const PASSWORD: &[u8] = b"mepauth-test-password";

    fn decode(token: &str) -> Claims {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        let key = DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap();
        jsonwebtoken::decode::<Claims>(token, &key, &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn test_should_mint_verifiable_token_from_encrypted_key() {
        let signer = TokenSigner::from_pem(ENCRYPTED_KEY, Some(PASSWORD), "mepauth", 3600).unwrap();
        let token = signer.mint("app-1", "10.0.0.1").unwrap();
        assert_eq!(token.expires_in, 3600);

        let header = jsonwebtoken::decode_header(token.access_token.as_str()).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("mepauth"));

        let claims = decode(&token.access_token);
        assert_eq!(claims.iss, "mepauth");
        assert_eq!(claims.sub, "app-1");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.claims.clientip, "10.0.0.1");
    }

    #[test]
    fn test_should_load_unencrypted_pkcs8_key() {
        let signer = TokenSigner::from_pem(PLAIN_KEY, None, "kid-1", 60).unwrap();
        let token = signer.mint("app-2", "::1").unwrap();
        assert_eq!(decode(&token.access_token).sub, "app-2");
    }

    #[test]
    fn test_should_require_password_for_encrypted_key() {
        let result = TokenSigner::from_pem(ENCRYPTED_KEY, None, "mepauth", 3600);
        assert!(matches!(result, Err(JwtError::PasswordRequired)));
    }

    #[test]
    fn test_should_fail_with_wrong_password() {
        let result = TokenSigner::from_pem(ENCRYPTED_KEY, Some(b"wrong"), "mepauth", 3600);
        assert!(matches!(result, Err(JwtError::Decryption)));
    }

    #[test]
    fn test_should_reject_non_key_pem() {
        assert!(matches!(
            TokenSigner::from_pem(PUBLIC_KEY, None, "mepauth", 3600),
            Err(JwtError::InvalidKey)
        ));
        assert!(matches!(
            TokenSigner::from_pem("not a pem", None, "mepauth", 3600),
            Err(JwtError::InvalidKey)
        ));
    }

    #[test]
    fn test_should_redact_token_in_debug_output() {
        let signer = TokenSigner::from_pem(PLAIN_KEY, None, "mepauth", 3600).unwrap();
        let token = signer.mint("app-1", "10.0.0.1").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains(token.access_token.as_str()));
    }
}
