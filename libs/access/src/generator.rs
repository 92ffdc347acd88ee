//! Unique identifier generation for access codes and payment references
//!
//! Uniqueness is enforced by the store's unique constraint. Generation draws
//! a random token, tries to insert it and draws again on conflict, up to
//! [`GenerationPolicy::max_attempts`].

use rand::Rng;
use std::future::Future;
use tracing::warn;

use crate::error::{AccessError, AccessResult, StoreError, StoreResult};

/// Uppercase letters and digits without the look-alikes 0, O, 1 and I
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Prefix of every payment reference
pub const PAYMENT_REFERENCE_PREFIX: &str = "PAY";

/// Source of candidate identifiers
pub trait TokenSource: Send + Sync {
    fn next_token(&self) -> String;
}

/// Random tokens over [`CODE_ALPHABET`]
#[derive(Debug, Clone)]
pub struct RandomTokens {
    prefix: &'static str,
    length: usize,
}

impl RandomTokens {
    /// Human-typed access code strings
    pub fn access_codes(length: usize) -> Self {
        Self {
            prefix: "",
            length: length.max(4),
        }
    }

    /// Payment references used as the bank-transfer memo
    pub fn payment_references(length: usize) -> Self {
        Self {
            prefix: PAYMENT_REFERENCE_PREFIX,
            length: length.max(4),
        }
    }
}

impl TokenSource for RandomTokens {
    fn next_token(&self) -> String {
        let mut rng = rand::thread_rng();
        let body: String = (0..self.length)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        format!("{}{}", self.prefix, body)
    }
}

/// Retry bound for identifier generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationPolicy {
    pub max_attempts: u32,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Draw tokens from `source` and hand each to `insert` until one is accepted.
///
/// Only [`StoreError::Conflict`] triggers another draw; any other failure is
/// returned immediately.
pub async fn insert_unique<T, F, Fut>(
    source: &dyn TokenSource,
    policy: GenerationPolicy,
    what: &str,
    mut insert: F,
) -> AccessResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let token = source.next_token();
        match insert(token.clone()).await {
            Ok(value) => return Ok(value),
            Err(StoreError::Conflict(_)) => {
                warn!(
                    "Generated {} '{}' is already taken (attempt {}/{})",
                    what, token, attempt, attempts
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AccessError::GenerationExhausted { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<&'static str>>);

    impl TokenSource for Scripted {
        fn next_token(&self) -> String {
            self.0.lock().unwrap().remove(0).to_string()
        }
    }

    #[test]
    fn test_random_tokens_use_the_unambiguous_alphabet() {
        let tokens = RandomTokens::access_codes(8);
        for _ in 0..200 {
            let token = tokens.next_token();
            assert_eq!(token.len(), 8);
            assert!(token.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert!(!token.contains(['0', 'O', '1', 'I']));
        }
    }

    #[test]
    fn test_payment_references_are_prefixed() {
        let token = RandomTokens::payment_references(6).next_token();
        assert!(token.starts_with(PAYMENT_REFERENCE_PREFIX));
        assert_eq!(token.len(), PAYMENT_REFERENCE_PREFIX.len() + 6);
    }

    #[tokio::test]
    async fn test_insert_unique_retries_past_collisions() {
        let source = Scripted(Mutex::new(vec!["TAKEN", "TAKEN", "FREE"]));
        let result = insert_unique(&source, GenerationPolicy::default(), "code", |token| async move {
            if token == "TAKEN" {
                Err(StoreError::Conflict("code"))
            } else {
                Ok(token)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "FREE");
    }

    #[tokio::test]
    async fn test_insert_unique_gives_up_after_the_bound() {
        let source = Scripted(Mutex::new(vec!["TAKEN"; 3]));
        let policy = GenerationPolicy { max_attempts: 3 };
        let err = insert_unique(&source, policy, "code", |_| async {
            Err::<(), _>(StoreError::Conflict("code"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AccessError::GenerationExhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_insert_unique_does_not_retry_other_failures() {
        let source = Scripted(Mutex::new(vec!["A", "B"]));
        let err = insert_unique(&source, GenerationPolicy::default(), "code", |_| async {
            Err::<(), _>(StoreError::Corrupt("bad row".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AccessError::Store(StoreError::Corrupt(_))));
    }
}
