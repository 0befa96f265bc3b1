use std::collections::HashSet;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use chrono::{DateTime, Utc};
use http::{header, Response, StatusCode};
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub type ApiRequest = http::Request<Vec<u8>>;
pub type ApiResponse = Response<Vec<u8>>;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> anyhow::Result<ApiResponse> {
    let mut response = Response::new(serde_json::to_vec(value)?);
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

pub fn ok_json<T: Serialize>(value: &T) -> anyhow::Result<ApiResponse> {
    json_response(StatusCode::OK, value)
}

/// Argon2id hashing with a configurable cost.
#[derive(Clone)]
pub struct PasswordHashing {
    argon2: Argon2<'static>,
    // hashed with the same cost, verified against for unknown accounts
    decoy: String,
}

impl PasswordHashing {
    pub fn new(memory_kib: u32, iterations: u32) -> anyhow::Result<Self> {
        let params = Params::new(memory_kib, iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {}", e))?;
        let mut hashing = Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            decoy: String::new(),
        };
        hashing.decoy = hashing.hash("decoy-password")?;
        Ok(hashing)
    }

    pub fn hash(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
    }

    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Verifies against a throwaway hash, so an unknown account costs the
    /// same as a wrong password.
    pub fn verify_decoy(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.decoy);
        false
    }
}

pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{:x}?s=200&r=pg&d=mm", digest)
}

/// Strips every HTML tag, keeping only text. The result is plain text, not
/// HTML: entities ammonia writes back out are decoded.
pub fn sanitize_text(text: &str) -> String {
    let cleaned = Builder::default().tags(HashSet::new()).clean(text).to_string();
    html_escape::decode_html_entities(&cleaned).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHashing {
        PasswordHashing::new(1024, 1).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let hashing = cheap();
        let hash = hashing.hash("secret123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hashing.verify("secret123", &hash));
        assert!(!hashing.verify("secret124", &hash));
    }

    #[test]
    fn salts_differ() {
        let hashing = cheap();
        assert_ne!(hashing.hash("same").unwrap(), hashing.hash("same").unwrap());
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!cheap().verify("anything", "not-a-phc-string"));
        assert!(!cheap().verify_decoy("anything"));
    }

    #[test]
    fn decoy_is_a_real_hash_at_the_instance_cost() {
        let hashing = cheap();
        assert!(hashing.decoy.starts_with("$argon2id$v=19$m=1024,t=1,"));
        assert!(hashing.verify("decoy-password", &hashing.decoy));
        assert!(!hashing.verify_decoy("decoy-password"));

        let costlier = PasswordHashing::new(2048, 2).unwrap();
        assert!(costlier.decoy.starts_with("$argon2id$v=19$m=2048,t=2,"));
    }

    #[test]
    fn invalid_cost_is_rejected() {
        assert!(PasswordHashing::new(1, 1).is_err());
    }

    #[test]
    fn gravatar_is_case_insensitive() {
        assert_eq!(gravatar_url("Ada@Example.com"), gravatar_url(" ada@example.com"));
        assert!(gravatar_url("a@b.com").starts_with("https://www.gravatar.com/avatar/"));
    }

    #[test]
    fn sanitize_strips_markup() {
        assert_eq!(sanitize_text("<script>alert(1)</script>hello <b>world</b>"), "hello world");
    }

    #[test]
    fn sanitize_leaves_plain_text_alone() {
        assert_eq!(sanitize_text("AT&T Fan"), "AT&T Fan");
        assert_eq!(sanitize_text("Tom & Jerry, 1 < 2 > 0"), "Tom & Jerry, 1 < 2 > 0");
        assert_eq!(sanitize_text("say \"hi\" it's <i>fine</i>"), "say \"hi\" it's fine");
        assert_eq!(sanitize_text(&"&".repeat(50)), "&".repeat(50));
    }

    #[test]
    fn json_response_sets_content_type() {
        let response = ok_json(&serde_json::json!({"msg": "ok"})).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
