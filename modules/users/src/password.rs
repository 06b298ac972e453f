use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub memory_kb: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl PasswordPolicy {
    pub fn argon2(&self) -> Result<Argon2<'static>, String> {
        use argon2::{Algorithm, Params, Version};
        let params = Params::new(self.memory_kb, self.iterations, self.parallelism, None)
            .map_err(|e| format!("invalid argon2 params: {e}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

pub fn hash_password(policy: &PasswordPolicy, password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = policy.argon2()?;
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| e.to_string())?
        .to_string();
    Ok(hash)
}

pub fn verify_password(policy: &PasswordPolicy, password: &str, stored_hash: &str) -> Result<bool, String> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| e.to_string())?;
    let argon2 = policy.argon2()?;
    Ok(argon2.verify_password(password.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PasswordPolicy {
        PasswordPolicy {
            memory_kb: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password(&policy(), "correct horse").unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password(&policy(), "correct horse", &hash).unwrap());
        assert!(!verify_password(&policy(), "wrong", &hash).unwrap());
    }

    #[test]
    fn test_invalid_params_are_reported() {
        let bad = PasswordPolicy {
            memory_kb: 1,
            iterations: 1,
            parallelism: 1,
        };
        assert!(hash_password(&bad, "pw").is_err());
    }
}
