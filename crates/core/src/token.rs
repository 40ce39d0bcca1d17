use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::requisition::RequisitionId;
use crate::errors::ExternalDependencyError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Expense,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "despesas",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "despesas" => Some(Self::Expense),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationToken {
    pub entity_kind: EntityKind,
    pub requisition_id: RequisitionId,
    pub token: String,
}

/// Issues the opaque code printed on an approved requisition.
///
/// Unlike notifications this collaborator is load-bearing: an error here must
/// abort the approval that asked for the token.
#[async_trait]
pub trait VerificationTokenIssuer: Send + Sync {
    async fn issue_token(
        &self,
        kind: EntityKind,
        requisition_id: RequisitionId,
    ) -> Result<VerificationToken, ExternalDependencyError>;
}

pub struct HmacTokenIssuer {
    signing_key: SecretString,
}

impl HmacTokenIssuer {
    pub fn new(signing_key: SecretString) -> Self {
        Self { signing_key }
    }

    fn sign(&self, material: &str) -> Result<String, ExternalDependencyError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_key.expose_secret().as_bytes())
            .map_err(|error| ExternalDependencyError::TokenIssuance(error.to_string()))?;
        mac.update(material.as_bytes());
        Ok(encode_hex(mac.finalize().into_bytes().as_slice()))
    }
}

#[async_trait]
impl VerificationTokenIssuer for HmacTokenIssuer {
    async fn issue_token(
        &self,
        kind: EntityKind,
        requisition_id: RequisitionId,
    ) -> Result<VerificationToken, ExternalDependencyError> {
        let material = format!("{}:{}:{}", kind.as_str(), requisition_id, Uuid::new_v4());
        let token = self.sign(&material)?;
        Ok(VerificationToken { entity_kind: kind, requisition_id, token })
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
