//! Session tokens: JWTs signed with the identity provider's Ed25519 key

use anyhow::{anyhow, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    #[serde(default = "default_role")]
    pub role: Role,
    pub exp: u64,
    pub iat: u64,
}

fn default_role() -> Role {
    Role::User
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub user_id: String,
    pub role: Role,
}

impl AuthInfo {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Verifies tokens against one configured public key
#[derive(Clone)]
pub struct TokenVerifier {
    key: VerifyingKey,
}

impl TokenVerifier {
    pub fn from_public_key_hex(public_key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(public_key_hex.trim())
            .map_err(|e| anyhow!("Invalid auth public key hex: {}", e))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Invalid public key length"))?;
        let key = VerifyingKey::from_bytes(&bytes)?;
        Ok(Self { key })
    }

    /// Verify a JWT token signed with Ed25519
    pub fn verify_jwt(&self, token: &str) -> Result<AuthInfo> {
        let header = decode_header(token)?;
        if header.alg != Algorithm::EdDSA {
            return Err(anyhow!(
                "Invalid algorithm: expected EdDSA, got {:?}",
                header.alg
            ));
        }

        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(anyhow!("Invalid JWT format"));
        }

        // Claims are parsed here; the signature is checked below with the pinned key
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.insecure_disable_signature_validation();
        let token_data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
        let claims = token_data.claims;

        let message = format!("{}.{}", parts[0], parts[1]);
        let signature_bytes: [u8; 64] = base64_url_decode(parts[2])?
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Invalid signature length"))?;
        let signature = Signature::from_bytes(&signature_bytes);

        self.key
            .verify(message.as_bytes(), &signature)
            .map_err(|_| anyhow!("Invalid signature"))?;

        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        if claims.exp <= now {
            return Err(anyhow!("Token expired"));
        }
        if claims.sub.trim().is_empty() {
            return Err(anyhow!("Token has no subject"));
        }

        Ok(AuthInfo {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

/// Create a JWT token (for tests and local tooling)
pub fn create_jwt(
    private_key_bytes: &[u8],
    user_id: &str,
    role: Role,
    duration_secs: u64,
) -> Result<String> {
    use ed25519_dalek::{Signer, SigningKey};

    let private_key: [u8; 32] = private_key_bytes
        .try_into()
        .map_err(|_| anyhow!("Invalid private key length"))?;
    let signing_key = SigningKey::from_bytes(&private_key);

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: now + duration_secs,
        iat: now,
    };

    let header = r#"{"alg":"EdDSA","typ":"JWT"}"#;
    let header_b64 = base64_url_encode(header.as_bytes());
    let payload_b64 = base64_url_encode(serde_json::to_string(&claims)?.as_bytes());

    let message = format!("{}.{}", header_b64, payload_b64);
    let signature = signing_key.sign(message.as_bytes());

    Ok(format!(
        "{}.{}",
        message,
        base64_url_encode(&signature.to_bytes())
    ))
}

/// Base64URL encode (without padding)
fn base64_url_encode(data: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, data)
}

/// Base64URL decode (without padding)
fn base64_url_decode(data: &str) -> Result<Vec<u8>> {
    Ok(base64::Engine::decode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        data,
    )?)
}
