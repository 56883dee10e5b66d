use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::VoiceError;

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

type HmacSha1 = Hmac<Sha1>;

/// Builds the string Twilio signs: the full URL followed by every POST parameter,
/// key then value, sorted by key.
pub fn signing_payload(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|left, right| left.0.cmp(&right.0).then_with(|| left.1.cmp(&right.1)));

    let mut payload = String::from(url);
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload
}

pub fn compute_signature(
    secret: &str,
    url: &str,
    params: &[(String, String)],
) -> Result<String, VoiceError> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| VoiceError::Signature("invalid signing key".to_owned()))?;
    mac.update(signing_payload(url, params).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verifies `X-Twilio-Signature` in constant time.
pub fn validate_signature(
    secret: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> Result<(), VoiceError> {
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| VoiceError::Signature("signature is not valid base64".to_owned()))?;

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| VoiceError::Signature("invalid signing key".to_owned()))?;
    mac.update(signing_payload(url, params).as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| VoiceError::Signature("signature mismatch".to_owned()))
}

/// Compares a presented shared secret with the configured one in constant time.
///
/// Both sides are reduced to an HMAC keyed by the configured secret, so the comparison
/// time does not depend on where the inputs differ or on their lengths.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    let Ok(mut reference) = HmacSha1::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    reference.update(expected.as_bytes());
    let reference = reference.finalize().into_bytes();

    let Ok(mut candidate) = HmacSha1::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    candidate.update(presented.as_bytes());
    candidate.verify_slice(&reference).is_ok()
}

#[cfg(test)]
mod tests {
    use super::{compute_signature, secrets_match, signing_payload, validate_signature};

    const AUTH_TOKEN: &str = "12345";
    const URL: &str = "https://mycompany.com/myapp.php?foo=1&bar=2";

    fn documented_params() -> Vec<(String, String)> {
        [
            ("CallSid", "CA1234567890ABCDE"),
            ("Caller", "+14158675309"),
            ("Digits", "1234"),
            ("From", "+14158675309"),
            ("To", "+18005551212"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
    }

    #[test]
    fn payload_sorts_parameters_by_key() {
        let params = vec![
            ("To".to_owned(), "+1800".to_owned()),
            ("CallSid".to_owned(), "CA1".to_owned()),
        ];
        assert_eq!(signing_payload("https://h/x", &params), "https://h/xCallSidCA1To+1800");
    }

    #[test]
    fn documented_example_is_accepted() {
        let signature = compute_signature(AUTH_TOKEN, URL, &documented_params()).expect("sign");
        assert_eq!(signature, "RSOYDt4T1cUTdK1PDd93/VVr8B8=");
        assert!(validate_signature(AUTH_TOKEN, URL, &documented_params(), &signature).is_ok());
    }

    #[test]
    fn any_modified_parameter_is_rejected() {
        let signature = compute_signature(AUTH_TOKEN, URL, &documented_params()).expect("sign");

        for index in 0..documented_params().len() {
            let mut params = documented_params();
            params[index].1.push('0');
            assert!(
                validate_signature(AUTH_TOKEN, URL, &params, &signature).is_err(),
                "tampered {} should be rejected",
                params[index].0
            );
        }

        assert!(validate_signature("other-token", URL, &documented_params(), &signature).is_err());
        assert!(validate_signature(AUTH_TOKEN, URL, &documented_params(), "not base64!").is_err());
    }

    #[test]
    fn secrets_match_only_on_identical_values() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cres", "s3cret"));
        assert!(!secrets_match("s3cret ", "s3cret"));
        assert!(!secrets_match("", "s3cret"));
    }
}
