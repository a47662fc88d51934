use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Roles are a fixed set; permissions come from the seeded role rows but the
/// set of names the code branches on lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Teacher => "Teacher",
            Role::Student => "Student",
            Role::Parent => "Parent",
        }
    }

    pub fn from_name(name: &str) -> Option<Role> {
        match name {
            "Admin" => Some(Role::Admin),
            "Teacher" => Some(Role::Teacher),
            "Student" => Some(Role::Student),
            "Parent" => Some(Role::Parent),
            _ => None,
        }
    }

    pub fn default_permissions(self) -> &'static [&'static str] {
        match self {
            Role::Admin => &["*"],
            Role::Teacher => &["manage_attendance", "view_students"],
            Role::Student => &["view_grades", "view_attendance"],
            Role::Parent => &["view_child_records"],
        }
    }
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hash failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(plain: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// A freshly minted bearer token. The plaintext is `"<id>|<secret>"` and is
/// returned to the client exactly once; only the secret's SHA-256 is stored.
pub struct IssuedToken {
    pub id: String,
    pub plaintext: String,
    pub token_hash: String,
}

pub fn mint_token() -> IssuedToken {
    let id = Uuid::new_v4().to_string();
    let secret = format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    let token_hash = digest_hex(&secret);
    IssuedToken {
        plaintext: format!("{}|{}", id, secret),
        id,
        token_hash,
    }
}

pub fn digest_hex(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

pub fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("password").expect("hash");
        assert!(verify_password("password", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn minted_token_splits_into_id_and_secret() {
        let token = mint_token();
        let (id, secret) = token.plaintext.split_once('|').expect("id|secret");
        assert_eq!(id, token.id);
        assert_eq!(digest_hex(secret), token.token_hash);
    }

    #[test]
    fn digest_compare_rejects_near_miss() {
        let token = mint_token();
        assert!(digests_match(&token.token_hash, &token.token_hash));
        let mut other = token.token_hash.clone();
        other.pop();
        other.push('0');
        // Could collide with the real last nibble; only assert on a change.
        if other != token.token_hash {
            assert!(!digests_match(&token.token_hash, &other));
        }
    }

    #[test]
    fn role_names_round_trip() {
        for role in [Role::Admin, Role::Teacher, Role::Student, Role::Parent] {
            assert_eq!(Role::from_name(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_name("Janitor"), None);
    }
}
