//! Decoding and normalization of the client's signed response.
//!
//! Passkeys created inside an Android app wrapper declare an origin of the
//! form `android:apk-key-hash:<hash>` instead of a web origin. Those are
//! rewritten to the relying party's trusted origin here, before the
//! response is decoded and handed to verification. The substituted value is
//! always the operator-configured origin, never anything the caller sent.
//!
//! Only the origin value changes; every other byte of the client data is
//! kept. The rewritten client data still hashes differently from what the
//! authenticator saw, so app-embedded responses verify only with `none`
//! attestation, which is what passkey registration requests. A `packed`
//! attestation from an app wrapper fails its signature check and is
//! rejected.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use nocaptcha_common::constants::{APP_EMBEDDED_ORIGIN_PREFIX, fields};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("A passkey response must be specified")]
    Missing,

    #[error("The passkey response must be a JSON object")]
    NotAnObject,

    #[error("The passkey response is missing client data")]
    MissingClientData,

    #[error("The passkey client data is not valid base64url")]
    ClientDataEncoding(#[source] base64::DecodeError),

    #[error("The passkey client data is not valid JSON")]
    ClientDataJson(#[source] serde_json::Error),

    #[error("The passkey client data does not declare an origin")]
    MissingOrigin,

    #[error("The passkey response is malformed: {0}")]
    Credential(#[source] serde_json::Error),
}

/// A decoded client response, ready for verification
#[derive(Debug)]
pub struct ClientResponse<T> {
    pub credential: T,
    /// Origin as declared by the client
    pub declared_origin: String,
    /// True when the declared origin was replaced by the trusted origin
    pub origin_rewritten: bool,
}

impl<T: DeserializeOwned> ClientResponse<T> {
    /// Decode `raw`, substituting `trusted_origin` for an app-embedded origin.
    pub fn decode(raw: Value, trusted_origin: &str) -> Result<Self, DecodeError> {
        let mut raw = match raw {
            Value::Null => return Err(DecodeError::Missing),
            Value::Object(_) => raw,
            _ => return Err(DecodeError::NotAnObject),
        };

        let encoded = raw
            .pointer_mut("/response/clientDataJSON")
            .ok_or(DecodeError::MissingClientData)?;
        let encoded_str = encoded.as_str().ok_or(DecodeError::MissingClientData)?;

        let (bytes, mut client_data) = decode_client_data(encoded_str)?;
        let declared_origin = client_data
            .get(fields::ORIGIN)
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingOrigin)?
            .to_string();

        let origin_rewritten = declared_origin.starts_with(APP_EMBEDDED_ORIGIN_PREFIX);
        if origin_rewritten {
            let rewritten = match splice_origin(&bytes, &declared_origin, trusted_origin)? {
                Some(spliced) => spliced,
                None => {
                    client_data[fields::ORIGIN] = Value::String(trusted_origin.to_string());
                    serde_json::to_vec(&client_data).map_err(DecodeError::ClientDataJson)?
                }
            };
            *encoded = Value::String(URL_SAFE_NO_PAD.encode(rewritten));
        }

        let credential = serde_json::from_value(raw).map_err(DecodeError::Credential)?;

        Ok(Self {
            credential,
            declared_origin,
            origin_rewritten,
        })
    }
}

/// Client data may arrive padded; both forms are accepted
fn decode_client_data(encoded: &str) -> Result<(Vec<u8>, Value), DecodeError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(DecodeError::ClientDataEncoding)?;

    let value: Value = serde_json::from_slice(&bytes).map_err(DecodeError::ClientDataJson)?;
    if value.is_object() {
        Ok((bytes, value))
    } else {
        Err(DecodeError::MissingOrigin)
    }
}

/// Replace the quoted origin in the raw client data, leaving other bytes as
/// sent. `None` when the origin does not appear exactly once as written.
fn splice_origin(
    raw: &[u8],
    declared: &str,
    trusted: &str,
) -> Result<Option<Vec<u8>>, DecodeError> {
    let Ok(text) = std::str::from_utf8(raw) else {
        return Ok(None);
    };
    let needle = serde_json::to_string(declared).map_err(DecodeError::ClientDataJson)?;
    let replacement = serde_json::to_string(trusted).map_err(DecodeError::ClientDataJson)?;

    if text.matches(needle.as_str()).count() != 1 {
        return Ok(None);
    }
    Ok(Some(text.replacen(needle.as_str(), &replacement, 1).into_bytes()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    const TRUSTED: &str = "https://example.com";

    pub(crate) fn encode_client_data(origin: &str) -> String {
        let client_data = json!({
            "type": "webauthn.create",
            "challenge": "Y2hhbGxlbmdl",
            "origin": origin,
        });
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&client_data).unwrap())
    }

    pub(crate) fn credential(origin: &str) -> Value {
        json!({
            "id": "cred",
            "rawId": "Y3JlZA",
            "type": "public-key",
            "response": {
                "attestationObject": "AA",
                "clientDataJSON": encode_client_data(origin),
            }
        })
    }

    fn client_origin(value: &Value) -> String {
        let encoded = value["response"]["clientDataJSON"].as_str().unwrap();
        decode_client_data(encoded).unwrap().1["origin"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_web_origin_is_untouched() {
        let raw = credential("https://example.com");
        let decoded = ClientResponse::<Value>::decode(raw.clone(), TRUSTED).unwrap();

        assert!(!decoded.origin_rewritten);
        assert_eq!(decoded.declared_origin, "https://example.com");
        assert_eq!(decoded.credential, raw);
    }

    #[test]
    fn test_app_embedded_origin_is_rewritten() {
        let raw = credential("android:apk-key-hash:AbCdEf0123");
        let decoded = ClientResponse::<Value>::decode(raw, TRUSTED).unwrap();

        assert!(decoded.origin_rewritten);
        assert_eq!(decoded.declared_origin, "android:apk-key-hash:AbCdEf0123");
        assert_eq!(client_origin(&decoded.credential), TRUSTED);
        // Everything else in the client data survives the rewrite.
        let encoded = decoded.credential["response"]["clientDataJSON"].as_str().unwrap();
        assert_eq!(decode_client_data(encoded).unwrap().1["type"], "webauthn.create");
    }

    #[test]
    fn test_rewrite_keeps_remaining_client_data_bytes() {
        let original = concat!(
            r#"{"type":"webauthn.create", "challenge":"Y2hhbGxlbmdl","#,
            r#""origin":"android:apk-key-hash:AbCdEf0123","androidPackageName":"com.example"}"#
        );
        let mut raw = credential(TRUSTED);
        raw["response"]["clientDataJSON"] = json!(URL_SAFE_NO_PAD.encode(original));

        let decoded = ClientResponse::<Value>::decode(raw, TRUSTED).unwrap();
        let encoded = decoded.credential["response"]["clientDataJSON"].as_str().unwrap();
        let (bytes, _) = decode_client_data(encoded).unwrap();

        let expected = original.replace("android:apk-key-hash:AbCdEf0123", TRUSTED);
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn test_ambiguous_origin_falls_back_to_reencoding() {
        let original = concat!(
            r#"{"type":"webauthn.create","origin":"android:apk-key-hash:X","#,
            r#""topOrigin":"android:apk-key-hash:X"}"#
        );
        let mut raw = credential(TRUSTED);
        raw["response"]["clientDataJSON"] = json!(URL_SAFE_NO_PAD.encode(original));

        let decoded = ClientResponse::<Value>::decode(raw, TRUSTED).unwrap();
        let encoded = decoded.credential["response"]["clientDataJSON"].as_str().unwrap();
        let (_, client_data) = decode_client_data(encoded).unwrap();

        assert_eq!(client_data["origin"], TRUSTED);
        assert_eq!(client_data["topOrigin"], "android:apk-key-hash:X");
    }

    #[test]
    fn test_other_foreign_origins_are_not_rewritten() {
        let raw = credential("https://evil.example.net");
        let decoded = ClientResponse::<Value>::decode(raw, TRUSTED).unwrap();

        assert!(!decoded.origin_rewritten);
        assert_eq!(client_origin(&decoded.credential), "https://evil.example.net");
    }

    #[test]
    fn test_padded_client_data_is_accepted() {
        let mut raw = credential(TRUSTED);
        let padded = format!("{}==", raw["response"]["clientDataJSON"].as_str().unwrap());
        raw["response"]["clientDataJSON"] = Value::String(padded);

        assert!(ClientResponse::<Value>::decode(raw, TRUSTED).is_ok());
    }

    #[test]
    fn test_malformed_responses() {
        assert!(matches!(
            ClientResponse::<Value>::decode(Value::Null, TRUSTED),
            Err(DecodeError::Missing)
        ));
        assert!(matches!(
            ClientResponse::<Value>::decode(json!("text"), TRUSTED),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            ClientResponse::<Value>::decode(json!({ "response": {} }), TRUSTED),
            Err(DecodeError::MissingClientData)
        ));
        assert!(matches!(
            ClientResponse::<Value>::decode(
                json!({ "response": { "clientDataJSON": "!!!" } }),
                TRUSTED
            ),
            Err(DecodeError::ClientDataEncoding(_))
        ));

        let no_origin = URL_SAFE_NO_PAD.encode(br#"{"type":"webauthn.create"}"#);
        assert!(matches!(
            ClientResponse::<Value>::decode(
                json!({ "response": { "clientDataJSON": no_origin } }),
                TRUSTED
            ),
            Err(DecodeError::MissingOrigin)
        ));
    }

    #[test]
    fn test_typed_decode_failure() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Strict {
            id: String,
            required_field: u32,
        }

        let err = ClientResponse::<Strict>::decode(credential(TRUSTED), TRUSTED).unwrap_err();
        assert!(matches!(err, DecodeError::Credential(_)));
    }
}
