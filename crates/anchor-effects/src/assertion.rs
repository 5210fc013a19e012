//! Authenticator assertion signatures
//!
//! A delegation signed through an authenticator is not a bare signature: the
//! authenticator signs `authenticator_data || sha256(client_data_json)`, and
//! the client data embeds the challenge it was asked to sign. The three parts
//! travel together as one self-describing CBOR map in the signature slot.

use crate::crypto::verify_ed25519;
use anchor_core::effects::Assertion;
use anchor_core::{AnchorError, AnchorResult, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// CBOR self-describe tag (55799) as it appears on the wire
pub const CBOR_SELF_DESCRIBE: [u8; 3] = [0xd9, 0xd9, 0xf7];

/// Client data type of an assertion ceremony
pub const ASSERTION_TYPE: &str = "webauthn.get";

#[derive(Serialize, Deserialize)]
struct AssertionEnvelope {
    #[serde(with = "serde_bytes")]
    authenticator_data: Vec<u8>,
    #[serde(with = "serde_bytes")]
    client_data_json: Vec<u8>,
    #[serde(with = "serde_bytes")]
    signature: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct ClientData {
    #[serde(rename = "type")]
    kind: String,
    challenge: String,
}

/// Client data an authenticator reports for `challenge`
pub fn client_data_json(challenge: &[u8]) -> AnchorResult<Vec<u8>> {
    Ok(serde_json::to_vec(&ClientData {
        kind: ASSERTION_TYPE.to_string(),
        challenge: hex::encode(challenge),
    })?)
}

/// Bytes an authenticator signs for the given assertion parts
pub fn assertion_signing_input(authenticator_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(authenticator_data.len() + 32);
    input.extend_from_slice(authenticator_data);
    input.extend_from_slice(&Sha256::digest(client_data_json));
    input
}

/// Encode an assertion as a self-describing CBOR signature
pub fn encode_assertion(assertion: &Assertion) -> AnchorResult<Signature> {
    let envelope = AssertionEnvelope {
        authenticator_data: assertion.authenticator_data.clone(),
        client_data_json: assertion.client_data_json.clone(),
        signature: assertion.signature.clone(),
    };
    let mut out = Vec::new();
    let mut serializer = serde_cbor::Serializer::new(&mut out);
    serializer
        .self_describe()
        .map_err(|e| AnchorError::serialization(e.to_string()))?;
    envelope
        .serialize(&mut serializer)
        .map_err(|e| AnchorError::serialization(e.to_string()))?;
    Ok(Signature::from_bytes(out))
}

/// Whether `signature` carries an encoded assertion rather than a bare signature
pub fn is_assertion(signature: &Signature) -> bool {
    let bytes = signature.as_bytes();
    bytes.len() != ed25519_dalek::SIGNATURE_LENGTH && bytes.starts_with(&CBOR_SELF_DESCRIBE)
}

/// Verify an encoded assertion over `message` against `public_key`
pub fn verify_assertion(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> AnchorResult<()> {
    let envelope: AssertionEnvelope = serde_cbor::from_slice(signature.as_bytes())
        .map_err(|e| AnchorError::serialization(format!("malformed assertion: {e}")))?;
    let client_data: ClientData = serde_json::from_slice(&envelope.client_data_json)?;

    if client_data.kind != ASSERTION_TYPE {
        return Err(AnchorError::crypto(format!(
            "unexpected client data type {}",
            client_data.kind
        )));
    }
    if client_data.challenge != hex::encode(message) {
        return Err(AnchorError::crypto("assertion signs a different challenge"));
    }

    verify_ed25519(
        public_key,
        &assertion_signing_input(&envelope.authenticator_data, &envelope.client_data_json),
        &Signature::from_bytes(envelope.signature),
    )
}

/// Verify either form of device signature over `message`
pub fn verify_device_signature(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> AnchorResult<()> {
    if is_assertion(signature) {
        verify_assertion(public_key, message, signature)
    } else {
        verify_ed25519(public_key, message, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519KeyMaterial;
    use anchor_core::effects::KeyMaterial;
    use anchor_core::CredentialId;

    async fn assertion(key: &Ed25519KeyMaterial, challenge: &[u8]) -> Assertion {
        let authenticator_data = vec![0x49; 37];
        let client_data_json = client_data_json(challenge).unwrap();
        let signature = key
            .sign(&assertion_signing_input(&authenticator_data, &client_data_json))
            .await
            .unwrap();
        Assertion {
            credential_id: CredentialId::new(vec![1]).unwrap(),
            authenticator_data,
            client_data_json,
            signature: signature.into_bytes(),
        }
    }

    #[tokio::test]
    async fn test_assertion_verifies_against_challenge() {
        let key = Ed25519KeyMaterial::from_seed(&[3; 32]);
        let sig = encode_assertion(&assertion(&key, b"payload").await).unwrap();

        assert_eq!(&sig.as_bytes()[..3], &CBOR_SELF_DESCRIBE);
        verify_device_signature(&key.der_public_key(), b"payload", &sig).unwrap();
        assert!(verify_device_signature(&key.der_public_key(), b"other", &sig).is_err());

        let stranger = Ed25519KeyMaterial::from_seed(&[4; 32]);
        assert!(verify_device_signature(&stranger.der_public_key(), b"payload", &sig).is_err());
    }

    #[tokio::test]
    async fn test_bare_signature_still_accepted() {
        let key = Ed25519KeyMaterial::from_seed(&[5; 32]);
        let sig = key.sign(b"payload").await.unwrap();
        assert!(!is_assertion(&sig));
        verify_device_signature(&key.der_public_key(), b"payload", &sig).unwrap();
    }
}
