use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionProof {
    #[serde(default)]
    pub photo_urls: Vec<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[async_trait]
pub trait ProofValidator: Send + Sync {
    async fn validate(&self, task_id: Uuid, proof: &CompletionProof) -> Result<(), AppError>;
}

/// Accepts a proof carrying at least one photo URL or a non-blank signature.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicProofValidator;

#[async_trait]
impl ProofValidator for BasicProofValidator {
    async fn validate(&self, _task_id: Uuid, proof: &CompletionProof) -> Result<(), AppError> {
        let has_photo = proof.photo_urls.iter().any(|url| !url.trim().is_empty());
        let has_signature = proof
            .signature
            .as_deref()
            .is_some_and(|signature| !signature.trim().is_empty());

        if has_photo || has_signature {
            Ok(())
        } else {
            Err(AppError::ProofRejected(
                "a photo or signature is required".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{BasicProofValidator, CompletionProof, ProofValidator};

    #[tokio::test]
    async fn empty_proof_is_rejected() {
        let result = BasicProofValidator
            .validate(Uuid::new_v4(), &CompletionProof::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn signature_alone_is_enough() {
        let proof = CompletionProof {
            signature: Some("data:image/png;base64,AAAA".to_string()),
            ..CompletionProof::default()
        };
        assert!(BasicProofValidator.validate(Uuid::new_v4(), &proof).await.is_ok());
    }
}
